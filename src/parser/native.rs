//! Native JSON decoder.
//!
//! Each `*.json` file holds one result in the canonical serde shape (see
//! [`crate::model`]). Attachment paths that no longer exist are re-rooted
//! under an `attachments/` directory next to the report.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{ParserResult, ReportParser, decode_each, discover_files, has_extension};
use crate::model::{Attachment, AttachmentSource, Step, TestResult};

/// Decoder for native JSON result files.
pub struct NativeParser {
    path: PathBuf,
}

impl NativeParser {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn attachments_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
            .join("attachments")
    }
}

#[async_trait]
impl ReportParser for NativeParser {
    async fn parse(&self) -> ParserResult<Vec<TestResult>> {
        let files = discover_files(&self.path, |p| has_extension(p, "json"))?;
        let fallback_dir = self.attachments_dir();
        Ok(decode_each(&files, |file| {
            let content = std::fs::read_to_string(file)?;
            let result: TestResult = serde_json::from_str(&content)?;
            Ok(vec![normalize(result, &fallback_dir)])
        }))
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

fn normalize(mut result: TestResult, fallback_dir: &Path) -> TestResult {
    reroot_attachments(&mut result.attachments, fallback_dir);
    reroot_steps(&mut result.steps, fallback_dir);

    let exec = &mut result.execution;
    if exec.duration.is_none()
        && let (Some(start), Some(end)) = (exec.start_time, exec.end_time)
    {
        exec.duration = Some(end - start);
    }

    result
}

fn reroot_steps(steps: &mut [Step], fallback_dir: &Path) {
    for step in steps {
        reroot_attachments(&mut step.execution.attachments, fallback_dir);
        reroot_steps(&mut step.steps, fallback_dir);
    }
}

fn reroot_attachments(attachments: &mut [Attachment], fallback_dir: &Path) {
    for attachment in attachments {
        if let AttachmentSource::Path(path) = &mut attachment.source
            && !path.exists()
            && let Some(file_name) = path.file_name()
        {
            *path = fallback_dir.join(file_name);
        }
    }
}
