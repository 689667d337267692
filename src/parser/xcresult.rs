//! xcresult bundle decoder.
//!
//! The bundle is only reachable through `xcresulttool`, which exposes it as
//! a type-tagged JSON graph (see [`graph`]). Decoding happens in two phases:
//!
//! ```text
//!  json(None) ──► ActionsInvocationRecord          (index, fatal on error)
//!                   │  one testsRef per action
//!                   ▼
//!  json(testsRef) ──► ActionTestPlanRunSummaries    (per root, isolated)
//!                       │  configuration / target / group tree
//!                       ▼
//!  json(summaryRef) ──► ActionTestSummary           (per test, isolated)
//!                         │  steps::flatten()
//!                         ▼
//!  raw(payloadRef) ──► attachment bytes             (per attachment, isolated)
//! ```
//!
//! Roots are materialized concurrently and in no particular order; tests
//! within a root keep their tree order.

pub mod graph;
pub mod schema;
pub mod sniff;
pub mod steps;
pub mod tool;

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::DateTime;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use self::graph::Node;
use self::schema::{
    ActionTestMetadata, ActionTestPlanRunSummaries, ActionTestSummary, ActionsInvocationRecord,
    AttachmentRecord, Reference, TestNode,
};
use self::steps::DraftStep;
use super::{ParserError, ParserResult, ReportParser};
use crate::model::{Attachment, Status, Step, StepStatus, TestResult};

pub use self::graph::{Decode, DecodeError, DecodeResult};
pub use self::steps::StepLevel;
pub use self::tool::{Memoized, XcresultTool, XcrunTool};

const BUNDLE_EXTENSION: &str = ".xcresult";
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";
const ROOT_CONCURRENCY: usize = 4;
const PAYLOAD_CONCURRENCY: usize = 8;

/// Maps an xcresult test status into the canonical vocabulary.
pub fn map_status(raw: &str) -> Status {
    match raw {
        "Success" => Status::Passed,
        "Failure" => Status::Failed,
        "Error" => Status::Invalid,
        "Skipped" => Status::Skipped,
        "Expected Failure" => Status::Passed,
        other => Status::coerce(other, Status::Invalid),
    }
}

/// Decoder for one `.xcresult` bundle.
pub struct XcresultParser<T> {
    path: PathBuf,
    tool: Memoized<T>,
    step_level: StepLevel,
}

/// One action's test tree and the context its tests inherit.
struct ActionRoot {
    tests_ref: Reference,
    device: String,
    /// Action start and end, used when a test has no activity timing.
    started: Option<f64>,
    ended: Option<f64>,
}

/// Where a leaf test sits in the bundle.
struct LeafTest<'a> {
    metadata: ActionTestMetadata,
    suites: Vec<String>,
    root: &'a ActionRoot,
    configuration: String,
}

#[derive(Deserialize)]
struct CaseLink {
    #[serde(rename = "caseId")]
    case_id: i64,
}

impl<T: XcresultTool> XcresultParser<T> {
    /// # Errors
    ///
    /// Returns [`ParserError::InvalidPath`] unless `path` names an
    /// `.xcresult` bundle.
    pub fn new(path: impl Into<PathBuf>, tool: T) -> ParserResult<Self> {
        let path = path.into();
        let display = path.to_string_lossy();
        if !display.trim_end_matches('/').ends_with(BUNDLE_EXTENSION) {
            return Err(ParserError::InvalidPath(format!(
                "{} is not an {} bundle",
                display, BUNDLE_EXTENSION
            )));
        }
        Ok(Self {
            path,
            tool: Memoized::new(tool),
            step_level: StepLevel::default(),
        })
    }

    pub fn with_step_level(mut self, level: StepLevel) -> Self {
        self.step_level = level;
        self
    }

    async fn roots(&self) -> ParserResult<Vec<ActionRoot>> {
        let value = self.tool.json(None).await?;
        let record: ActionsInvocationRecord = Node::new(&value)?.decode()?;

        Ok(record
            .actions
            .into_iter()
            .filter_map(|action| {
                let tests_ref = action.tests_ref?;
                Some(ActionRoot {
                    tests_ref,
                    device: action.run_destination.unwrap_or_default(),
                    started: action.started_time.as_deref().and_then(parse_time),
                    ended: action.ended_time.as_deref().and_then(parse_time),
                })
            })
            .collect())
    }

    async fn materialize_root(&self, root: &ActionRoot) -> ParserResult<Vec<TestResult>> {
        let tests_ref = &root.tests_ref;
        let value = self.tool.json(Some(&tests_ref.id)).await?;
        let summaries: ActionTestPlanRunSummaries = Node::new(&value)?.decode()?;

        let mut leaves = Vec::new();
        for plan in summaries.summaries {
            for testable in plan.testable_summaries {
                for test in testable.tests {
                    // The outermost group is the target-wide "All tests"
                    // bucket, so its own name is not part of the path.
                    let nodes = match test {
                        TestNode::Group(group) => group.subtests,
                        leaf @ TestNode::Metadata(_) => vec![leaf],
                    };
                    collect_leaves(
                        nodes,
                        vec![testable.name.clone()],
                        root,
                        &plan.name,
                        &mut leaves,
                    );
                }
            }
        }

        debug!("Root {} has {} tests", tests_ref.id, leaves.len());

        let mut results = Vec::with_capacity(leaves.len());
        for leaf in leaves {
            let name = leaf.metadata.name.clone();
            match self.decode_leaf(leaf).await {
                Ok(result) => results.push(result),
                Err(e) => error!("Skipping test {}: {}", name, e),
            }
        }
        Ok(results)
    }

    async fn decode_leaf(&self, leaf: LeafTest<'_>) -> ParserResult<TestResult> {
        let LeafTest {
            metadata,
            suites,
            root,
            configuration,
        } = leaf;

        let summary = match &metadata.summary_ref {
            Some(summary_ref) => {
                let value = self.tool.json(Some(&summary_ref.id)).await?;
                Some(Node::new(&value)?.decode::<ActionTestSummary>()?)
            }
            None => None,
        };

        let raw_status = summary
            .as_ref()
            .and_then(|s| s.test_status.as_deref())
            .or(metadata.test_status.as_deref())
            .unwrap_or_default();

        let mut result = TestResult::new(&metadata.name, map_status(raw_status)).with_suites(suites);
        result.signature = metadata.identifier_url.clone();
        result.execution.duration = metadata
            .duration
            .or(summary.as_ref().and_then(|s| s.duration))
            .map(|secs| secs * 1000.0);
        result.params.insert("Device".to_string(), root.device.clone());
        result
            .params
            .insert("Configuration".to_string(), configuration);
        result.execution.start_time = root.started;
        result.execution.end_time = root.ended;

        let Some(summary) = summary else {
            return Ok(result);
        };

        let activities = &summary.activity_summaries;
        if let Some(start) = activities
            .first()
            .and_then(|a| a.start.as_deref())
            .and_then(parse_time)
        {
            result.execution.start_time = Some(start);
        }
        if let Some(end) = activities
            .last()
            .and_then(|a| a.finish.as_deref())
            .and_then(parse_time)
        {
            result.execution.end_time = Some(end);
        }

        if !summary.failure_summaries.is_empty() {
            let trace: String = summary
                .failure_summaries
                .iter()
                .map(|f| format!("{}\n", f.message))
                .collect();
            result.execution.stack_trace = Some(trace);
        }

        let flat = steps::flatten(activities, &summary.failure_summaries, self.step_level);

        result.case_id = self.first_case_link(&flat.case_links).await;

        let mut test_attachments = flat.attachments.clone();
        for record in steps::test_level_attachments(activities) {
            if !test_attachments
                .iter()
                .any(|known| known.payload_ref == record.payload_ref)
            {
                test_attachments.push(record);
            }
        }

        let payloads = self.fetch_payloads(&flat.steps, &test_attachments).await;
        result.steps = flat
            .steps
            .iter()
            .map(|draft| build_step(draft, &payloads))
            .collect();
        result.attachments = lookup(&test_attachments, &payloads);

        Ok(result)
    }

    /// The case id from the first case-link payload that decodes.
    async fn first_case_link(&self, candidates: &[AttachmentRecord]) -> Option<i64> {
        for record in candidates {
            let Some(payload) = &record.payload_ref else {
                continue;
            };
            match self.tool.raw(&payload.id).await {
                Ok(bytes) => match serde_json::from_slice::<CaseLink>(&bytes) {
                    Ok(link) => return Some(link.case_id),
                    Err(e) => warn!("Ignoring malformed case link {}: {}", payload.id, e),
                },
                Err(e) => warn!("Failed to read case link {}: {}", payload.id, e),
            }
        }
        None
    }

    /// Fetches every attachment referenced by the draft tree, keyed by
    /// payload id. Failed fetches are logged and left out.
    async fn fetch_payloads(
        &self,
        steps: &[DraftStep],
        extra: &[AttachmentRecord],
    ) -> HashMap<String, Attachment> {
        let mut records: Vec<&AttachmentRecord> = extra.iter().collect();
        collect_records(steps, &mut records);

        let mut seen = std::collections::HashSet::new();
        records.retain(|r| {
            r.payload_ref
                .as_ref()
                .is_some_and(|p| seen.insert(p.id.clone()))
        });

        stream::iter(records)
            .map(|record| async move {
                let id = record.payload_ref.as_ref().map(|p| p.id.clone())?;
                match self.tool.raw(&id).await {
                    Ok(bytes) => Some((id, to_attachment(record, bytes.to_vec()))),
                    Err(e) => {
                        error!("Failed to read attachment {:?}: {}", record.filename, e);
                        None
                    }
                }
            })
            .buffer_unordered(PAYLOAD_CONCURRENCY)
            .boxed()
            .filter_map(|entry| async move { entry })
            .collect()
            .await
    }
}

#[async_trait]
impl<T: XcresultTool> ReportParser for XcresultParser<T> {
    async fn parse(&self) -> ParserResult<Vec<TestResult>> {
        debug!("Decoding {}", self.path.display());

        let roots = self.roots().await?;
        info!("Found {} test roots in {}", roots.len(), self.path.display());

        let per_root: Vec<_> = stream::iter(roots.iter())
            .map(|root| async move { (root, self.materialize_root(root).await) })
            .buffer_unordered(ROOT_CONCURRENCY)
            .boxed()
            .collect()
            .await;

        let mut results = Vec::new();
        for (root, outcome) in per_root {
            match outcome {
                Ok(mut decoded) => results.append(&mut decoded),
                Err(e) => error!("Skipping tests under {}: {}", root.tests_ref.id, e),
            }
        }
        Ok(results)
    }

    fn name(&self) -> &'static str {
        "xcresult"
    }
}

fn collect_leaves<'a>(
    nodes: Vec<TestNode>,
    suites: Vec<String>,
    root: &'a ActionRoot,
    configuration: &str,
    out: &mut Vec<LeafTest<'a>>,
) {
    for node in nodes {
        match node {
            TestNode::Metadata(metadata) => out.push(LeafTest {
                metadata,
                suites: suites.clone(),
                root,
                configuration: configuration.to_string(),
            }),
            TestNode::Group(group) => {
                let mut nested = suites.clone();
                nested.push(group.name);
                collect_leaves(group.subtests, nested, root, configuration, out);
            }
        }
    }
}

fn collect_records<'a>(steps: &'a [DraftStep], out: &mut Vec<&'a AttachmentRecord>) {
    for step in steps {
        out.extend(step.attachments.iter());
        collect_records(&step.steps, out);
    }
}

fn lookup(records: &[AttachmentRecord], payloads: &HashMap<String, Attachment>) -> Vec<Attachment> {
    records
        .iter()
        .filter_map(|r| r.payload_ref.as_ref())
        .filter_map(|p| payloads.get(&p.id).cloned())
        .collect()
}

fn build_step(draft: &DraftStep, payloads: &HashMap<String, Attachment>) -> Step {
    let status = if draft.failed {
        StepStatus::Failed
    } else {
        StepStatus::Passed
    };
    let mut step = Step::new(&draft.title, status);
    step.execution.start_time = draft.start.as_deref().and_then(parse_time);
    step.execution.end_time = draft.finish.as_deref().and_then(parse_time);
    if let (Some(start), Some(end)) = (step.execution.start_time, step.execution.end_time) {
        step.execution.duration = Some(end - start);
    }
    step.execution.comment = draft.comment.clone();
    step.execution.attachments = lookup(&draft.attachments, payloads);
    step.steps = draft
        .steps
        .iter()
        .map(|child| build_step(child, payloads))
        .collect();
    step
}

/// Names the fetched payload, sniffing an extension when the declared
/// file name has none.
fn to_attachment(record: &AttachmentRecord, bytes: Vec<u8>) -> Attachment {
    let declared = if record.filename.is_empty() {
        &record.name
    } else {
        &record.filename
    };
    let mut name = declared.replacen(".heic", ".jpeg", 1);
    if (!name.contains('.') || name.ends_with('.'))
        && let Some(ext) = sniff::detect_extension(&bytes)
    {
        if name.ends_with('.') {
            name.pop();
        }
        name.push_str(ext);
    }

    let attachment = Attachment::from_content(name, bytes);
    match record.uniform_type_identifier.as_deref().and_then(mime_for_uti) {
        Some(mime) => attachment.with_content_type(mime),
        None => attachment,
    }
}

fn mime_for_uti(uti: &str) -> Option<&'static str> {
    match uti {
        "public.png" => Some("image/png"),
        "public.jpeg" => Some("image/jpeg"),
        "public.heic" => Some("image/heic"),
        "public.plain-text" | "public.utf8-plain-text" => Some("text/plain"),
        "public.json" => Some("application/json"),
        "com.adobe.pdf" => Some("application/pdf"),
        _ => None,
    }
}

/// Milliseconds since the epoch.
fn parse_time(raw: &str) -> Option<f64> {
    match DateTime::parse_from_str(raw, TIME_FORMAT) {
        Ok(time) => Some(time.timestamp_millis() as f64),
        Err(e) => {
            warn!("Failed to parse time {:?}: {}", raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttachmentSource;
    use serde_json::{Value, json};
    use std::sync::Arc;

    /// Serves canned graphs and payloads keyed by object id.
    #[derive(Default)]
    struct FixtureTool {
        graphs: HashMap<Option<String>, Value>,
        payloads: HashMap<String, Vec<u8>>,
    }

    impl FixtureTool {
        fn graph(mut self, id: Option<&str>, value: Value) -> Self {
            self.graphs.insert(id.map(str::to_string), value);
            self
        }

        fn payload(mut self, id: &str, bytes: &[u8]) -> Self {
            self.payloads.insert(id.to_string(), bytes.to_vec());
            self
        }
    }

    #[async_trait]
    impl XcresultTool for FixtureTool {
        async fn json(&self, id: Option<&str>) -> ParserResult<Arc<Value>> {
            self.graphs
                .get(&id.map(str::to_string))
                .cloned()
                .map(Arc::new)
                .ok_or_else(|| ParserError::Tool(format!("no graph for {:?}", id)))
        }

        async fn raw(&self, id: &str) -> ParserResult<Arc<Vec<u8>>> {
            self.payloads
                .get(id)
                .cloned()
                .map(Arc::new)
                .ok_or_else(|| ParserError::Tool(format!("no payload {}", id)))
        }
    }

    fn t(name: &str) -> Value {
        json!({"_name": name})
    }

    fn sub(name: &str, supertype: &str) -> Value {
        json!({"_name": name, "_supertype": {"_name": supertype}})
    }

    fn s(v: &str) -> Value {
        json!({"_type": t("String"), "_value": v})
    }

    fn date(v: &str) -> Value {
        json!({"_type": t("Date"), "_value": v})
    }

    fn array(values: Vec<Value>) -> Value {
        json!({"_type": t("Array"), "_values": values})
    }

    fn reference(id: &str) -> Value {
        json!({"_type": t("Reference"), "id": s(id)})
    }

    fn attachment(name: &str, filename: &str, payload: &str) -> Value {
        json!({
            "_type": t("ActionTestAttachment"),
            "name": s(name),
            "filename": s(filename),
            "payloadRef": reference(payload)
        })
    }

    fn activity(title: &str, kind: &str, extra: Value) -> Value {
        let mut node = json!({
            "_type": t("ActionTestActivitySummary"),
            "title": s(title),
            "activityType": s(kind),
        });
        if let (Some(node), Some(extra)) = (node.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                node.insert(k.clone(), v.clone());
            }
        }
        node
    }

    fn metadata(name: &str, summary: Option<&str>) -> Value {
        let mut node = json!({
            "_type": sub("ActionTestMetadata", "ActionTestSummaryIdentifiableObject"),
            "name": s(name),
            "identifierURL": s(&format!("test://com.apple.xcode/App/AppTests/{}", name)),
            "testStatus": s("Success"),
            "duration": {"_type": t("Double"), "_value": "0.5"}
        });
        if let Some(id) = summary {
            node["summaryRef"] = reference(id);
        }
        node
    }

    fn root_graph(tests_refs: &[&str]) -> Value {
        let actions: Vec<Value> = tests_refs
            .iter()
            .map(|id| {
                json!({
                    "_type": t("ActionRecord"),
                    "startedTime": date("2024-03-01T09:59:00.000+0000"),
                    "endedTime": date("2024-03-01T10:05:00.000+0000"),
                    "runDestination": {
                        "_type": t("ActionRunDestinationRecord"),
                        "displayName": s("iPhone 15")
                    },
                    "actionResult": {
                        "_type": t("ActionResult"),
                        "testsRef": reference(id)
                    }
                })
            })
            .collect();
        json!({"_type": t("ActionsInvocationRecord"), "actions": array(actions)})
    }

    fn plan_graph(tests: Vec<Value>) -> Value {
        json!({
            "_type": t("ActionTestPlanRunSummaries"),
            "summaries": array(vec![json!({
                "_type": sub("ActionTestPlanRunSummary", "ActionAbstractTestSummary"),
                "name": s("Debug"),
                "testableSummaries": array(vec![json!({
                    "_type": sub("ActionTestableSummary", "ActionAbstractTestSummary"),
                    "name": s("AppTests"),
                    "tests": array(vec![json!({
                        "_type": sub("ActionTestSummaryGroup", "ActionTestSummaryIdentifiableObject"),
                        "name": s("All tests"),
                        "subtests": array(vec![json!({
                            "_type": sub("ActionTestSummaryGroup", "ActionTestSummaryIdentifiableObject"),
                            "name": s("LoginTests"),
                            "subtests": array(tests)
                        })])
                    })])
                })])
            })])
        })
    }

    fn summary_graph(activities: Vec<Value>, failures: Vec<Value>) -> Value {
        json!({
            "_type": sub("ActionTestSummary", "ActionTestSummaryIdentifiableObject"),
            "name": s("testLogin()"),
            "testStatus": s("Failure"),
            "activitySummaries": array(activities),
            "failureSummaries": array(failures)
        })
    }

    fn bundle() -> PathBuf {
        PathBuf::from("/tmp/Run.xcresult")
    }

    const USER: &str = "com.apple.dt.xctest.activity-type.userCreated";
    const CONTAINER: &str = "com.apple.dt.xctest.activity-type.attachmentContainer";

    #[test]
    fn test_rejects_non_bundle_path() {
        let err = XcresultParser::new("/tmp/report.json", FixtureTool::default())
            .err()
            .unwrap();
        assert!(matches!(err, ParserError::InvalidPath(_)));
        assert!(XcresultParser::new("/tmp/Run.xcresult/", FixtureTool::default()).is_ok());
    }

    #[test]
    fn test_map_status() {
        assert_eq!(map_status("Success"), Status::Passed);
        assert_eq!(map_status("Failure"), Status::Failed);
        assert_eq!(map_status("Error"), Status::Invalid);
        assert_eq!(map_status("Skipped"), Status::Skipped);
        assert_eq!(map_status("Mixed"), Status::Invalid);
    }

    #[tokio::test]
    async fn test_decodes_leaf_with_steps_and_failures() {
        let diag = activity(
            "Synthesize event",
            steps::INTERNAL_ACTIVITY,
            json!({"attachments": array(vec![attachment("trace", "trace", "p-trace")])}),
        );
        let nested = activity("Wait", USER, json!({"subactivities": array(vec![diag])}));
        let assertion = activity(
            "Assert title",
            USER,
            json!({
                "start": date("2024-03-01T10:00:00.000+0000"),
                "finish": date("2024-03-01T10:00:02.500+0000"),
                "failureSummaryIDs": array(vec![s("f-1")]),
                "subactivities": array(vec![nested])
            }),
        );
        let failure = json!({
            "_type": t("ActionTestFailureSummary"),
            "uuid": s("f-1"),
            "message": s("XCTAssertEqual failed"),
            "lineNumber": {"_type": t("Int"), "_value": "42"}
        });

        let tool = FixtureTool::default()
            .graph(None, root_graph(&["tests-1"]))
            .graph(Some("tests-1"), plan_graph(vec![metadata("testLogin()", Some("sum-1"))]))
            .graph(Some("sum-1"), summary_graph(vec![assertion], vec![failure]))
            .payload("p-trace", b"plain trace text");

        let parser = XcresultParser::new(bundle(), tool)
            .unwrap()
            .with_step_level(StepLevel::First);
        let results = parser.parse().await.unwrap();

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.title, "testLogin()");
        assert_eq!(result.status(), Status::Failed);
        assert_eq!(result.relations.titles(), vec!["AppTests", "LoginTests"]);
        assert_eq!(
            result.signature.as_deref(),
            Some("test://com.apple.xcode/App/AppTests/testLogin()")
        );
        assert_eq!(result.params.get("Device").map(String::as_str), Some("iPhone 15"));
        assert_eq!(result.params.get("Configuration").map(String::as_str), Some("Debug"));
        assert_eq!(result.execution.duration, Some(500.0));
        assert_eq!(result.execution.start_time, Some(1_709_287_200_000.0));
        assert_eq!(result.execution.end_time, Some(1_709_287_202_500.0));
        assert_eq!(
            result.execution.stack_trace.as_deref(),
            Some("XCTAssertEqual failed\n")
        );

        assert_eq!(result.steps.len(), 1);
        let step = &result.steps[0];
        assert_eq!(step.data.action, "Assert title");
        assert_eq!(step.execution.status, StepStatus::Failed);
        assert_eq!(step.execution.comment, "Line: 42\nXCTAssertEqual failed");
        assert!(step.steps.is_empty());
        assert_eq!(step.execution.attachments.len(), 1);
        assert_eq!(step.execution.attachments[0].name, "trace.txt");
        assert_eq!(
            step.execution.attachments[0].source,
            AttachmentSource::Content(b"plain trace text".to_vec())
        );
        assert!(result.attachments.is_empty());
    }

    #[tokio::test]
    async fn test_first_case_link_wins() {
        let first = activity(
            "Added attachment",
            CONTAINER,
            json!({"attachments": array(vec![attachment("Qase config", "cfg", "cfg-1")])}),
        );
        let second = activity(
            "Added attachment",
            CONTAINER,
            json!({"attachments": array(vec![attachment("Qase config", "cfg", "cfg-2")])}),
        );

        let tool = FixtureTool::default()
            .graph(None, root_graph(&["tests-1"]))
            .graph(Some("tests-1"), plan_graph(vec![metadata("testLink()", Some("sum-1"))]))
            .graph(Some("sum-1"), summary_graph(vec![first, second], vec![]))
            .payload("cfg-1", br#"{"caseId": 101}"#)
            .payload("cfg-2", br#"{"caseId": 202}"#);

        let results = XcresultParser::new(bundle(), tool)
            .unwrap()
            .with_step_level(StepLevel::All)
            .parse()
            .await
            .unwrap();

        assert_eq!(results[0].case_id, Some(101));
        assert!(results[0].steps.is_empty());
    }

    #[tokio::test]
    async fn test_failed_root_is_isolated() {
        let tool = FixtureTool::default()
            .graph(None, root_graph(&["tests-ok", "tests-missing"]))
            .graph(Some("tests-ok"), plan_graph(vec![metadata("testOk()", None)]));

        let results = XcresultParser::new(bundle(), tool)
            .unwrap()
            .parse()
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "testOk()");
        assert_eq!(results[0].status(), Status::Passed);
    }

    #[tokio::test]
    async fn test_failed_leaf_is_isolated() {
        let tool = FixtureTool::default()
            .graph(None, root_graph(&["tests-1"]))
            .graph(
                Some("tests-1"),
                plan_graph(vec![
                    metadata("testGone()", Some("sum-missing")),
                    metadata("testHere()", None),
                ]),
            );

        let results = XcresultParser::new(bundle(), tool)
            .unwrap()
            .parse()
            .await
            .unwrap();

        let titles: Vec<_> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["testHere()"]);
    }

    #[tokio::test]
    async fn test_root_index_failure_is_fatal() {
        let results = XcresultParser::new(bundle(), FixtureTool::default())
            .unwrap()
            .parse()
            .await;
        assert!(results.is_err());
    }

    #[tokio::test]
    async fn test_unknown_subtest_type_only_drops_that_node() {
        let unknown = json!({
            "_type": sub("ActionTestSummaryPerformance", "ActionAbstractTestSummary"),
            "name": s("perf")
        });
        let tool = FixtureTool::default()
            .graph(None, root_graph(&["tests-1"]))
            .graph(
                Some("tests-1"),
                plan_graph(vec![unknown, metadata("testKept()", None)]),
            );

        let results = XcresultParser::new(bundle(), tool)
            .unwrap()
            .parse()
            .await
            .unwrap();

        let titles: Vec<_> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["testKept()"]);
    }

    #[tokio::test]
    async fn test_action_times_fill_missing_activity_timing() {
        let untimed = activity("Open app", USER, json!({}));
        let tool = FixtureTool::default()
            .graph(None, root_graph(&["tests-1"]))
            .graph(
                Some("tests-1"),
                plan_graph(vec![
                    metadata("testUntimed()", Some("sum-1")),
                    metadata("testNoSummary()", None),
                ]),
            )
            .graph(Some("sum-1"), summary_graph(vec![untimed], vec![]));

        let results = XcresultParser::new(bundle(), tool)
            .unwrap()
            .parse()
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        for result in &results {
            assert_eq!(result.execution.start_time, Some(1_709_287_140_000.0));
            assert_eq!(result.execution.end_time, Some(1_709_287_500_000.0));
        }
    }

    #[tokio::test]
    async fn test_top_level_activity_attachments_reach_the_result() {
        let screenshot = activity(
            "Launch",
            USER,
            json!({"attachments": array(vec![attachment("Screen", "screen.png", "p-screen")])}),
        );
        let link = activity(
            "Added attachment",
            CONTAINER,
            json!({"attachments": array(vec![attachment("Qase config", "cfg", "cfg-1")])}),
        );

        let tool = FixtureTool::default()
            .graph(None, root_graph(&["tests-1"]))
            .graph(Some("tests-1"), plan_graph(vec![metadata("testLaunch()", Some("sum-1"))]))
            .graph(Some("sum-1"), summary_graph(vec![screenshot, link], vec![]))
            .payload("p-screen", b"\x89PNG\r\n\x1a\n....")
            .payload("cfg-1", br#"{"caseId": 7}"#);

        let results = XcresultParser::new(bundle(), tool)
            .unwrap()
            .with_step_level(StepLevel::First)
            .parse()
            .await
            .unwrap();

        let result = &results[0];
        assert_eq!(result.case_id, Some(7));
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.steps[0].execution.attachments.len(), 1);

        let names: Vec<_> = result.attachments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["screen.png"]);
    }

    #[test]
    fn test_to_attachment_naming() {
        let record = |filename: &str| AttachmentRecord {
            name: "Screenshot".into(),
            filename: filename.into(),
            uniform_type_identifier: Some("public.png".into()),
            payload_ref: None,
        };

        let png = b"\x89PNG\r\n\x1a\n....";
        assert_eq!(to_attachment(&record("shot"), png.to_vec()).name, "shot.png");
        assert_eq!(to_attachment(&record("shot."), png.to_vec()).name, "shot.png");
        assert_eq!(
            to_attachment(&record("Screenshot.heic"), png.to_vec()).name,
            "Screenshot.jpeg"
        );
        let sniffed = to_attachment(&record("log.txt"), b"\x01\x02\x03\x04".to_vec());
        assert_eq!(sniffed.name, "log.txt");
        assert_eq!(sniffed.content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(
            parse_time("2024-03-01T12:00:00.250+0200"),
            Some(1_709_287_200_250.0)
        );
        assert_eq!(parse_time("yesterday"), None);
    }
}
