//! Allure results decoder.
//!
//! Reads `*-result.json` files. Attachments are referenced relative to the
//! results directory. Labels become fields, with `suite`/`package` labels
//! also providing the suite path (dot separated) and a `tms` link providing
//! the case id.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::{ParserResult, ReportParser, decode_each, discover_files};
use crate::model::{Attachment, Relation, Status, Step, StepStatus, TestResult};

const RESULT_SUFFIX: &str = "-result.json";
const KNOWN_LAYERS: [&str; 4] = ["unknown", "e2e", "api", "unit"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllureTest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    status_details: StatusDetails,
    #[serde(default)]
    steps: Vec<AllureStep>,
    #[serde(default)]
    attachments: Vec<AllureAttachment>,
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    labels: Vec<NameValue>,
    #[serde(default)]
    parameters: Vec<NameValue>,
    #[serde(default)]
    description: Option<String>,
    /// Milliseconds since the epoch.
    #[serde(default)]
    start: Option<f64>,
    #[serde(default)]
    stop: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusDetails {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    trace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AllureStep {
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    start: Option<f64>,
    #[serde(default)]
    stop: Option<f64>,
    #[serde(default)]
    attachments: Vec<AllureAttachment>,
    #[serde(default)]
    steps: Vec<AllureStep>,
}

#[derive(Debug, Deserialize)]
struct AllureAttachment {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    content_type: Option<String>,
    source: String,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct NameValue {
    name: String,
    #[serde(default)]
    value: String,
}

/// Decoder for an Allure results directory (or a single result file).
pub struct AllureParser {
    path: PathBuf,
}

impl AllureParser {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Directory that attachment sources are relative to.
    fn root(&self) -> PathBuf {
        if self.path.is_dir() {
            self.path.clone()
        } else {
            self.path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        }
    }
}

#[async_trait]
impl ReportParser for AllureParser {
    async fn parse(&self) -> ParserResult<Vec<TestResult>> {
        let files = discover_files(&self.path, |p| {
            p.file_name()
                .is_some_and(|n| n.to_string_lossy().contains(RESULT_SUFFIX))
        })?;
        let root = self.root();
        Ok(decode_each(&files, |file| {
            let content = std::fs::read_to_string(file)?;
            let test: AllureTest = serde_json::from_str(&content)?;
            Ok(vec![convert_test(test, &root)])
        }))
    }

    fn name(&self) -> &'static str {
        "allure"
    }
}

fn convert_test(test: AllureTest, root: &Path) -> TestResult {
    let mut result = TestResult::new(test.name, Status::coerce(&test.status, Status::Invalid));

    result.case_id = test
        .links
        .iter()
        .find(|link| link.kind == "tms")
        .and_then(|link| case_id_from_link(&link.name));
    result.execution.start_time = test.start;
    result.execution.end_time = test.stop;
    result.execution.duration = span(test.start, test.stop);
    result.execution.stack_trace = test.status_details.trace;
    result.message = test.status_details.message;
    result.attachments = convert_attachments(test.attachments, root);
    result.steps = test
        .steps
        .into_iter()
        .map(|step| convert_step(step, root))
        .collect();

    for param in test.parameters {
        result.params.insert(param.name, param.value);
    }

    for label in test.labels {
        match label.name.as_str() {
            "thread" => result.execution.thread = Some(label.value.clone()),
            "suite" | "package" => {
                result.relations = Relation::from_titles(label.value.split('.'));
            }
            _ => {}
        }

        let field = if label.name == "layer" && !KNOWN_LAYERS.contains(&label.value.as_str()) {
            "custom layer".to_string()
        } else {
            label.name
        };
        result.fields.insert(field, label.value);
    }

    if let Some(description) = test.description {
        result.fields.insert("description".to_string(), description);
    }

    result
}

fn convert_step(step: AllureStep, root: &Path) -> Step {
    let mut converted = Step::new(step.name, StepStatus::coerce(&step.status, StepStatus::Blocked));
    converted.execution.start_time = step.start;
    converted.execution.end_time = step.stop;
    converted.execution.duration = span(step.start, step.stop);
    converted.execution.attachments = convert_attachments(step.attachments, root);
    converted.steps = step
        .steps
        .into_iter()
        .map(|s| convert_step(s, root))
        .collect();
    converted
}

fn convert_attachments(attachments: Vec<AllureAttachment>, root: &Path) -> Vec<Attachment> {
    attachments
        .into_iter()
        .map(|a| {
            let attachment = Attachment::from_path(a.name, root.join(a.source));
            match a.content_type {
                Some(content_type) => attachment.with_content_type(content_type),
                None => attachment,
            }
        })
        .collect()
}

fn span(start: Option<f64>, stop: Option<f64>) -> Option<f64> {
    Some(stop? - start?)
}

/// `"PRJ-42"` links to case 42.
fn case_id_from_link(name: &str) -> Option<i64> {
    let last = name.rsplit('-').next()?.trim();
    if last.is_empty() {
        return None;
    }
    match last.parse() {
        Ok(id) => Some(id),
        Err(_) => {
            warn!("Failed to parse case id from link {:?}", name);
            None
        }
    }
}
