//! Activity tree flattening.
//!
//! Turns a test's activity summaries into a draft step tree, correlating
//! failure summaries with the activities that reference them and picking
//! out case-link containers. Nothing here talks to the extraction tool:
//! attachments stay as [`AttachmentRecord`]s until the caller fetches them.
//!
//! ```text
//! activity (level 0)                  retained ─► DraftStep
//! ├── activity (level 1, internal)    pruned   ─► attachments, comments and
//! │   └── activity (level 2)                      failure hoisted upward,
//! └── ...                                         retained children spliced
//! ```

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::schema::{ActivitySummary, AttachmentRecord, FailureSummary};

pub const INTERNAL_ACTIVITY: &str = "com.apple.dt.xctest.activity-type.internal";
pub const DELETED_ATTACHMENT_ACTIVITY: &str = "com.apple.dt.xctest.activity-type.deletedAttachment";
pub const ATTACHMENT_CONTAINER_ACTIVITY: &str =
    "com.apple.dt.xctest.activity-type.attachmentContainer";

/// Attachment name that carries a case-link JSON payload.
pub const CASE_LINK_ATTACHMENT: &str = "Qase config";

/// Which activities become steps.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum StepLevel {
    /// Every activity, diagnostics included.
    All,
    /// Every activity except internal and deleted-attachment ones.
    User,
    /// Top-level activities only, without internal ones.
    #[default]
    #[serde(alias = "first-level")]
    #[value(alias = "first-level")]
    First,
}

impl StepLevel {
    /// Lenient parse: anything other than `all` or `user` means `first`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "all" => StepLevel::All,
            "user" => StepLevel::User,
            _ => StepLevel::First,
        }
    }

    fn prunes(&self, activity: &ActivitySummary, level: usize) -> bool {
        let internal = activity.activity_type == INTERNAL_ACTIVITY
            || activity.activity_type == DELETED_ATTACHMENT_ACTIVITY;
        match self {
            StepLevel::All => false,
            StepLevel::User => internal,
            StepLevel::First => internal || level > 0,
        }
    }
}

/// A step whose attachments have not been fetched yet.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftStep {
    pub title: String,
    pub failed: bool,
    pub start: Option<String>,
    pub finish: Option<String>,
    pub comment: String,
    pub attachments: Vec<AttachmentRecord>,
    pub steps: Vec<DraftStep>,
}

/// Per-test decode state, threaded through the recursive walk.
pub struct DecodeContext<'a> {
    failures: HashMap<&'a str, &'a FailureSummary>,
    matched: HashSet<&'a str>,
    case_links: Vec<AttachmentRecord>,
}

impl<'a> DecodeContext<'a> {
    pub fn new(failures: &'a [FailureSummary]) -> Self {
        Self {
            failures: failures
                .iter()
                .filter_map(|f| f.uuid.as_deref().map(|id| (id, f)))
                .collect(),
            matched: HashSet::new(),
            case_links: Vec::new(),
        }
    }
}

/// Output of flattening one test.
#[derive(Debug, Default)]
pub struct FlattenedTest {
    pub steps: Vec<DraftStep>,
    /// Attachments with no retained step to live on.
    pub attachments: Vec<AttachmentRecord>,
    /// Case-link payloads in depth-first order.
    pub case_links: Vec<AttachmentRecord>,
}

#[derive(Default)]
struct Level {
    steps: Vec<DraftStep>,
    failed: bool,
    attachments: Vec<AttachmentRecord>,
    comments: Vec<String>,
}

/// Flattens `activities` and attaches unmatched failures' attachments to the
/// test itself.
pub fn flatten(
    activities: &[ActivitySummary],
    failures: &[FailureSummary],
    policy: StepLevel,
) -> FlattenedTest {
    let mut ctx = DecodeContext::new(failures);
    let top = walk(activities, 0, policy, &mut ctx);

    let mut attachments = top.attachments;
    for failure in failures {
        let matched = failure
            .uuid
            .as_deref()
            .is_some_and(|id| ctx.matched.contains(id));
        if !matched {
            attachments.extend(failure.attachments.iter().cloned());
        }
    }

    FlattenedTest {
        steps: top.steps,
        attachments,
        case_links: ctx.case_links,
    }
}

/// Attachments carried directly by top-level activities, case links excluded.
///
/// These also belong to the test itself, whether or not their activity is
/// kept as a step.
pub fn test_level_attachments(activities: &[ActivitySummary]) -> Vec<AttachmentRecord> {
    activities
        .iter()
        .filter(|activity| !is_case_link(activity))
        .flat_map(|activity| activity.attachments.iter().cloned())
        .collect()
}

fn is_case_link(activity: &ActivitySummary) -> bool {
    activity.activity_type == ATTACHMENT_CONTAINER_ACTIVITY
        && activity.attachments.len() == 1
        && activity.attachments[0].name == CASE_LINK_ATTACHMENT
}

fn walk<'a>(
    activities: &'a [ActivitySummary],
    level: usize,
    policy: StepLevel,
    ctx: &mut DecodeContext<'a>,
) -> Level {
    let mut out = Level::default();

    for activity in activities {
        if is_case_link(activity) {
            ctx.case_links.extend(activity.attachments.iter().cloned());
            continue;
        }

        let mut failed = false;
        let mut comments = Vec::new();
        let mut attachments = activity.attachments.clone();

        for id in &activity.failure_summary_ids {
            if let Some((key, failure)) = ctx.failures.get_key_value(id.as_str()) {
                let (key, failure) = (*key, *failure);
                ctx.matched.insert(key);
                failed = true;
                let line = failure
                    .line_number
                    .map(|n| n.to_string())
                    .unwrap_or_default();
                comments.push(format!("Line: {}\n{}", line, failure.message));
                attachments.extend(failure.attachments.iter().cloned());
            }
        }

        let children = walk(&activity.subactivities, level + 1, policy, ctx);
        failed |= children.failed;
        attachments.extend(children.attachments);
        comments.extend(children.comments);

        out.failed |= failed;

        if policy.prunes(activity, level) {
            out.steps.extend(children.steps);
            out.attachments.extend(attachments);
            out.comments.extend(comments);
            continue;
        }

        out.steps.push(DraftStep {
            title: activity.title.clone(),
            failed,
            start: activity.start.clone(),
            finish: activity.finish.clone(),
            comment: comments.join("\n"),
            attachments,
            steps: children.steps,
        });
    }

    out
}
