//! Pure result transformations applied before batching.
//!
//! Each transform consumes the results and returns transformed copies. The
//! uploader applies them in a fixed order: suite prefix, status remapping,
//! parameter stripping, attachment filtering.

use std::collections::HashMap;

use tracing::warn;

use super::{UploadError, UploadResult};
use crate::model::{Attachment, Status, Step, SuiteData, TestResult};

/// Puts `title` at position 0 of every result's suite path.
pub fn inject_suite(results: Vec<TestResult>, title: &str) -> Vec<TestResult> {
    results
        .into_iter()
        .map(|mut result| {
            result.relations.suite.data.insert(
                0,
                SuiteData {
                    title: title.to_string(),
                    public_id: None,
                },
            );
            result
        })
        .collect()
}

/// Drops `params` and `param_groups` from every result.
pub fn strip_params(results: Vec<TestResult>) -> Vec<TestResult> {
    results
        .into_iter()
        .map(|mut result| {
            result.params.clear();
            result.param_groups.clear();
            result
        })
        .collect()
}

/// Status replacement table. Statuses absent from the table pass through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusMap {
    table: HashMap<Status, Status>,
}

impl StatusMap {
    /// Builds the table from raw `from → to` pairs.
    ///
    /// Matching ignores case. Targets must belong to the status vocabulary;
    /// sources outside it can never match and are only warned about.
    pub fn from_pairs<I, K, V>(pairs: I) -> UploadResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut table = HashMap::new();
        for (from, to) in pairs {
            let (from, to) = (from.as_ref(), to.as_ref());
            let target: Status = to.parse().map_err(|_| {
                UploadError::InvalidParams(format!(
                    "cannot replace {:?} with unknown status {:?}",
                    from, to
                ))
            })?;
            match from.parse::<Status>() {
                Ok(source) => {
                    table.insert(source, target);
                }
                Err(_) => warn!("Status {:?} never occurs in results, ignoring", from),
            }
        }
        Ok(Self { table })
    }

    /// Parses a flat JSON object such as `{"skipped": "failed"}`.
    pub fn from_json(json: &str) -> UploadResult<Self> {
        let pairs: HashMap<String, String> = serde_json::from_str(json).map_err(|e| {
            UploadError::InvalidParams(format!(
                "failed to parse statuses: {}. pass like '{{\"skipped\": \"failed\"}}'",
                e
            ))
        })?;
        Self::from_pairs(pairs)
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn map(&self, status: Status) -> Status {
        self.table.get(&status).copied().unwrap_or(status)
    }

    pub fn apply(&self, results: Vec<TestResult>) -> Vec<TestResult> {
        if self.is_empty() {
            return results;
        }
        results
            .into_iter()
            .map(|mut result| {
                result.execution.status = self.map(result.execution.status);
                result
            })
            .collect()
    }
}

/// Allow-list of attachment file extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter {
    /// Lowercase, without the leading dot.
    extensions: Vec<String>,
}

impl ExtensionFilter {
    /// Parses a comma-separated list such as `".png, JPG,txt"`.
    ///
    /// Returns `None` when the list names no extension.
    pub fn parse(list: &str) -> Option<Self> {
        let extensions: Vec<String> = list
            .split(',')
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        if extensions.is_empty() {
            None
        } else {
            Some(Self { extensions })
        }
    }

    pub fn allows(&self, attachment: &Attachment) -> bool {
        let name = attachment.file_name().to_ascii_lowercase();
        self.extensions
            .iter()
            .any(|ext| name.ends_with(&format!(".{}", ext)))
    }

    /// Keeps only allowed attachments, on results and on steps at any depth.
    pub fn apply(&self, results: Vec<TestResult>) -> Vec<TestResult> {
        results
            .into_iter()
            .map(|mut result| {
                result.attachments.retain(|a| self.allows(a));
                self.filter_steps(&mut result.steps);
                result
            })
            .collect()
    }

    fn filter_steps(&self, steps: &mut [Step]) {
        for step in steps {
            step.execution.attachments.retain(|a| self.allows(a));
            self.filter_steps(&mut step.steps);
        }
    }
}
