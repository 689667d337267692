//! Wire schema for bulk result creation.
//!
//! Attachments are uploaded separately and referenced by hash. Conversion
//! takes those hashes as an iterator consumed in the order of
//! [`TestResult::all_attachments`]: the result's own attachments first, then
//! each step's attachments depth first. A `None` hash drops that attachment.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::model::{Execution, Step, TestResult};

/// Field names the service knows natively. Anything else travels as an
/// additional property.
const KNOWN_FIELDS: &[&str] = &[
    "author",
    "description",
    "preconditions",
    "postconditions",
    "layer",
    "severity",
    "priority",
    "behavior",
    "type",
    "muted",
    "isFlaky",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkResults {
    pub results: Vec<ResultCreate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultCreate {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testops_id: Option<i64>,
    pub execution: ResultExecution,
    pub fields: ResultFields,
    pub attachments: Vec<String>,
    pub steps: Vec<ResultStep>,
    pub steps_type: &'static str,
    pub params: HashMap<String, String>,
    pub param_groups: Vec<Vec<String>>,
    pub relations: ResultRelations,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub defect: bool,
}

/// Times are seconds since the epoch; duration is whole milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultExecution {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultFields {
    #[serde(flatten)]
    pub known: BTreeMap<String, String>,
    #[serde(flatten)]
    pub additional: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultStep {
    pub data: ResultStepData,
    pub execution: ResultStepExecution,
    pub steps: Vec<ResultStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultStepData {
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultStepExecution {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    pub comment: String,
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRelations {
    pub suite: RelationSuite,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationSuite {
    pub data: Vec<RelationSuiteItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationSuiteItem {
    pub title: String,
}

impl ResultCreate {
    pub fn from_result<I>(result: &TestResult, hashes: &mut I) -> Self
    where
        I: Iterator<Item = Option<String>>,
    {
        let attachments = take_hashes(result.attachments.len(), hashes);
        let steps = result
            .steps
            .iter()
            .map(|step| ResultStep::from_step(step, hashes))
            .collect();

        Self {
            title: result.title.clone(),
            signature: result.signature.clone(),
            testops_id: result.case_id,
            execution: ResultExecution::from(&result.execution),
            fields: ResultFields::from_map(&result.fields),
            attachments,
            steps,
            steps_type: "classic",
            params: result.params.clone(),
            param_groups: result.param_groups.clone(),
            relations: ResultRelations {
                suite: RelationSuite {
                    data: result
                        .relations
                        .titles()
                        .into_iter()
                        .filter(|title| !title.is_empty())
                        .map(|title| RelationSuiteItem {
                            title: title.to_string(),
                        })
                        .collect(),
                },
            },
            message: result.message.clone(),
            defect: false,
        }
    }
}

impl From<&Execution> for ResultExecution {
    fn from(execution: &Execution) -> Self {
        Self {
            status: execution.status.as_str(),
            start_time: execution.start_time.map(|ms| ms / 1000.0),
            end_time: execution.end_time.map(|ms| ms / 1000.0),
            duration: execution.duration.map(|ms| ms as i64),
            stacktrace: execution.stack_trace.clone(),
            thread: execution.thread.clone(),
        }
    }
}

impl ResultFields {
    fn from_map(fields: &HashMap<String, String>) -> Self {
        let mut out = Self::default();
        for (key, value) in fields {
            if KNOWN_FIELDS.contains(&key.as_str()) {
                let key = if key == "isFlaky" { "is_flaky" } else { key.as_str() };
                out.known.insert(key.to_string(), value.clone());
            } else {
                out.additional.insert(key.clone(), value.clone());
            }
        }
        out
    }
}

impl ResultStep {
    fn from_step<I>(step: &Step, hashes: &mut I) -> Self
    where
        I: Iterator<Item = Option<String>>,
    {
        let execution = &step.execution;
        let attachments = take_hashes(execution.attachments.len(), hashes);
        Self {
            data: ResultStepData {
                action: step.data.action.clone(),
            },
            execution: ResultStepExecution {
                status: execution.status.as_str(),
                duration: execution.duration.map(|ms| ms as i64),
                comment: execution.comment.clone(),
                attachments,
            },
            steps: step
                .steps
                .iter()
                .map(|child| ResultStep::from_step(child, hashes))
                .collect(),
        }
    }
}

fn take_hashes<I>(count: usize, hashes: &mut I) -> Vec<String>
where
    I: Iterator<Item = Option<String>>,
{
    hashes.by_ref().take(count).flatten().collect()
}
