//! Typed xcresult records.
//!
//! Only the fields the flattener reads are decoded. Test trees mix group
//! and metadata nodes in one `subtests` array; those are decoded through
//! [`TestNode`], a closed sum type backed by a name → constructor registry.

use tracing::error;

use super::graph::{Decode, DecodeError, DecodeResult, Node};

/// An object id pointing at another part of the bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub id: String,
    pub target_type: Option<String>,
}

impl Decode for Reference {
    const TYPE_NAME: &'static str = "Reference";

    fn decode(node: Node<'_>) -> DecodeResult<Self> {
        let target_type = match node.field("targetType")? {
            Some(target) => target.opt_string("name")?,
            None => None,
        };
        Ok(Self {
            id: node.string("id")?,
            target_type,
        })
    }
}

/// Root of the bundle: one action per test target/destination.
#[derive(Debug, Clone)]
pub struct ActionsInvocationRecord {
    pub actions: Vec<ActionRecord>,
}

impl Decode for ActionsInvocationRecord {
    const TYPE_NAME: &'static str = "ActionsInvocationRecord";

    fn decode(node: Node<'_>) -> DecodeResult<Self> {
        Ok(Self {
            actions: node.array("actions")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ActionRecord {
    pub started_time: Option<String>,
    pub ended_time: Option<String>,
    pub run_destination: Option<String>,
    pub tests_ref: Option<Reference>,
}

impl Decode for ActionRecord {
    const TYPE_NAME: &'static str = "ActionRecord";

    fn decode(node: Node<'_>) -> DecodeResult<Self> {
        let run_destination = match node.field("runDestination")? {
            Some(destination) => destination.opt_string("displayName")?,
            None => None,
        };
        let tests_ref = match node.field("actionResult")? {
            Some(result) => result.opt_object("testsRef")?,
            None => None,
        };
        Ok(Self {
            started_time: node.opt_date("startedTime")?,
            ended_time: node.opt_date("endedTime")?,
            run_destination,
            tests_ref,
        })
    }
}

/// Target of an action's `testsRef`.
#[derive(Debug, Clone)]
pub struct ActionTestPlanRunSummaries {
    pub summaries: Vec<ActionTestPlanRunSummary>,
}

impl Decode for ActionTestPlanRunSummaries {
    const TYPE_NAME: &'static str = "ActionTestPlanRunSummaries";

    fn decode(node: Node<'_>) -> DecodeResult<Self> {
        Ok(Self {
            summaries: node.require("summaries")?.decode_array()?,
        })
    }
}

/// One test plan configuration.
#[derive(Debug, Clone)]
pub struct ActionTestPlanRunSummary {
    pub name: String,
    pub testable_summaries: Vec<ActionTestableSummary>,
}

impl Decode for ActionTestPlanRunSummary {
    const TYPE_NAME: &'static str = "ActionTestPlanRunSummary";

    fn decode(node: Node<'_>) -> DecodeResult<Self> {
        Ok(Self {
            name: node.opt_string("name")?.unwrap_or_default(),
            testable_summaries: node.array("testableSummaries")?,
        })
    }
}

/// One test target (bundle) within a configuration.
#[derive(Debug, Clone)]
pub struct ActionTestableSummary {
    pub name: String,
    pub tests: Vec<TestNode>,
}

impl Decode for ActionTestableSummary {
    const TYPE_NAME: &'static str = "ActionTestableSummary";

    fn decode(node: Node<'_>) -> DecodeResult<Self> {
        Ok(Self {
            name: node.opt_string("name")?.unwrap_or_default(),
            tests: TestNode::decode_all(node.field("tests")?)?,
        })
    }
}

/// An element of a `tests` or `subtests` array.
#[derive(Debug, Clone)]
pub enum TestNode {
    Group(ActionTestSummaryGroup),
    Metadata(ActionTestMetadata),
}

type Constructor = fn(Node<'_>) -> DecodeResult<TestNode>;

const TEST_NODE_REGISTRY: &[(&str, Constructor)] = &[
    (ActionTestSummaryGroup::TYPE_NAME, group_node),
    (ActionTestMetadata::TYPE_NAME, metadata_node),
];

fn group_node(node: Node<'_>) -> DecodeResult<TestNode> {
    ActionTestSummaryGroup::decode(node).map(TestNode::Group)
}

fn metadata_node(node: Node<'_>) -> DecodeResult<TestNode> {
    ActionTestMetadata::decode(node).map(TestNode::Metadata)
}

impl TestNode {
    /// Picks the constructor for the most specific registered type in the
    /// node's chain. Unregistered types are an error.
    pub fn from_node(node: Node<'_>) -> DecodeResult<Self> {
        for type_name in node.type_chain() {
            if let Some((_, construct)) = TEST_NODE_REGISTRY
                .iter()
                .find(|(registered, _)| *registered == type_name)
            {
                return construct(node);
            }
        }
        Err(DecodeError::UnknownType(node.type_name().to_string()))
    }

    /// Decodes every element of a `tests`/`subtests` array. An element that
    /// fails to decode is logged and dropped; its siblings are kept.
    fn decode_all(array: Option<Node<'_>>) -> DecodeResult<Vec<Self>> {
        let Some(array) = array else {
            return Ok(Vec::new());
        };
        let mut nodes = Vec::new();
        for item in array.items()? {
            match Self::from_node(item) {
                Ok(node) => nodes.push(node),
                Err(e) => error!("Skipping {} test node: {}", item.type_name(), e),
            }
        }
        Ok(nodes)
    }
}

#[derive(Debug, Clone)]
pub struct ActionTestSummaryGroup {
    pub name: String,
    pub subtests: Vec<TestNode>,
}

impl Decode for ActionTestSummaryGroup {
    const TYPE_NAME: &'static str = "ActionTestSummaryGroup";

    fn decode(node: Node<'_>) -> DecodeResult<Self> {
        Ok(Self {
            name: node.string("name")?,
            subtests: TestNode::decode_all(node.field("subtests")?)?,
        })
    }
}

/// A leaf test. Details live behind `summary_ref`.
#[derive(Debug, Clone)]
pub struct ActionTestMetadata {
    pub name: String,
    pub identifier_url: Option<String>,
    pub duration: Option<f64>,
    pub test_status: Option<String>,
    pub summary_ref: Option<Reference>,
}

impl Decode for ActionTestMetadata {
    const TYPE_NAME: &'static str = "ActionTestMetadata";

    fn decode(node: Node<'_>) -> DecodeResult<Self> {
        Ok(Self {
            name: node.string("name")?,
            identifier_url: node.opt_string("identifierURL")?,
            duration: node.opt_double("duration")?,
            test_status: node.opt_string("testStatus")?,
            summary_ref: node.opt_object("summaryRef")?,
        })
    }
}

/// Full detail of one test, fetched by the metadata's `summaryRef`.
#[derive(Debug, Clone)]
pub struct ActionTestSummary {
    pub test_status: Option<String>,
    pub duration: Option<f64>,
    pub activity_summaries: Vec<ActivitySummary>,
    pub failure_summaries: Vec<FailureSummary>,
}

impl Decode for ActionTestSummary {
    const TYPE_NAME: &'static str = "ActionTestSummary";

    fn decode(node: Node<'_>) -> DecodeResult<Self> {
        Ok(Self {
            test_status: node.opt_string("testStatus")?,
            duration: node.opt_double("duration")?,
            activity_summaries: node.array("activitySummaries")?,
            failure_summaries: node.array("failureSummaries")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ActivitySummary {
    pub title: String,
    pub activity_type: String,
    pub start: Option<String>,
    pub finish: Option<String>,
    pub attachments: Vec<AttachmentRecord>,
    pub subactivities: Vec<ActivitySummary>,
    pub failure_summary_ids: Vec<String>,
}

impl Decode for ActivitySummary {
    const TYPE_NAME: &'static str = "ActionTestActivitySummary";

    fn decode(node: Node<'_>) -> DecodeResult<Self> {
        let failure_summary_ids = match node.field("failureSummaryIDs")? {
            Some(ids) => ids
                .items()?
                .iter()
                .map(|id| id.as_string().map(str::to_string))
                .collect::<DecodeResult<_>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            title: node.opt_string("title")?.unwrap_or_default(),
            activity_type: node.opt_string("activityType")?.unwrap_or_default(),
            start: node.opt_date("start")?,
            finish: node.opt_date("finish")?,
            attachments: node.array("attachments")?,
            subactivities: node.array("subactivities")?,
            failure_summary_ids,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FailureSummary {
    pub uuid: Option<String>,
    pub message: String,
    pub line_number: Option<i64>,
    pub attachments: Vec<AttachmentRecord>,
}

impl Decode for FailureSummary {
    const TYPE_NAME: &'static str = "ActionTestFailureSummary";

    fn decode(node: Node<'_>) -> DecodeResult<Self> {
        Ok(Self {
            uuid: node.opt_string("uuid")?,
            message: node.opt_string("message")?.unwrap_or_default(),
            line_number: node.opt_int("lineNumber")?,
            attachments: node.array("attachments")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRecord {
    pub name: String,
    pub filename: String,
    pub uniform_type_identifier: Option<String>,
    pub payload_ref: Option<Reference>,
}

impl Decode for AttachmentRecord {
    const TYPE_NAME: &'static str = "ActionTestAttachment";

    fn decode(node: Node<'_>) -> DecodeResult<Self> {
        Ok(Self {
            name: node.opt_string("name")?.unwrap_or_default(),
            filename: node.opt_string("filename")?.unwrap_or_default(),
            uniform_type_identifier: node.opt_string("uniformTypeIdentifier")?,
            payload_ref: node.opt_object("payloadRef")?,
        })
    }
}
