//! Report decoders.
//!
//! Every supported input format has a [`ReportParser`] implementation that
//! turns a file or directory into canonical [`TestResult`] values.
//!
//! ```text
//!   path ──► discover_files() ──► [file, file, ...]
//!                                    │
//!                                    ▼  decode each independently
//!                              Ok(results) ──► collected
//!                              Err(e)      ──► logged, file skipped
//! ```
//!
//! # Built-in Decoders
//!
//! | Implementation | Input | Candidate files |
//! |----------------|-------|-----------------|
//! | [`junit::JunitParser`] | JUnit XML | `*.xml` |
//! | [`allure::AllureParser`] | Allure results | `*-result.json` |
//! | [`native::NativeParser`] | Native JSON | `*.json` |
//! | [`xcresult::XcresultParser`] | xcresult bundle | the bundle itself |
//!
//! A malformed file never aborts a directory scan, and zero matching files
//! is an empty result set rather than an error.

pub mod allure;
pub mod junit;
pub mod native;
pub mod xcresult;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::model::TestResult;

pub use xcresult::{DecodeError, StepLevel};

/// Result type for decoder operations.
pub type ParserResult<T> = Result<T, ParserError>;

/// Errors raised while decoding reports.
#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    /// The input path is unusable for the selected format.
    #[error("Invalid report path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse XML: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The external extraction tool failed or could not be started.
    #[error("Extraction tool failed: {0}")]
    Tool(String),

    /// The xcresult object graph did not have the expected shape.
    #[error("Failed to decode xcresult: {0}")]
    Decode(#[from] DecodeError),

    #[error("Parser error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Decodes one report source into canonical results.
#[async_trait]
pub trait ReportParser: Send + Sync {
    /// Decodes every candidate file under the configured path.
    async fn parse(&self) -> ParserResult<Vec<TestResult>>;

    /// Short format name for logging.
    fn name(&self) -> &'static str;
}

/// Input format, selected explicitly by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Junit,
    Allure,
    /// The native JSON format, one result per file.
    #[value(alias = "qase")]
    Native,
    Xcresult,
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportFormat::Junit => "junit",
            ReportFormat::Allure => "allure",
            ReportFormat::Native => "native",
            ReportFormat::Xcresult => "xcresult",
        };
        f.write_str(name)
    }
}

/// Knobs that only some decoders read.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub step_level: StepLevel,
    /// Command used to reach the xcresult extraction tool.
    pub xcresult_program: String,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            step_level: StepLevel::default(),
            xcresult_program: "xcrun".to_string(),
        }
    }
}

/// Creates the decoder for `format`.
///
/// # Errors
///
/// Returns [`ParserError::InvalidPath`] when an xcresult path does not name
/// a bundle. Other formats validate their path when parsing.
pub fn build_parser(
    format: ReportFormat,
    path: impl Into<PathBuf>,
    options: &ParserOptions,
) -> ParserResult<Box<dyn ReportParser>> {
    let path = path.into();
    let parser: Box<dyn ReportParser> = match format {
        ReportFormat::Junit => Box::new(junit::JunitParser::new(path)),
        ReportFormat::Allure => Box::new(allure::AllureParser::new(path)),
        ReportFormat::Native => Box::new(native::NativeParser::new(path)),
        ReportFormat::Xcresult => {
            let tool = xcresult::XcrunTool::new(&path, &options.xcresult_program);
            Box::new(xcresult::XcresultParser::new(path, tool)?.with_step_level(options.step_level))
        }
    };
    Ok(parser)
}

/// Lists candidate files under `root` in a stable order.
///
/// A single file is returned as-is when it matches. Unreadable directory
/// entries are logged and skipped.
pub(crate) fn discover_files(
    root: &Path,
    matches: impl Fn(&Path) -> bool,
) -> ParserResult<Vec<PathBuf>> {
    let metadata = std::fs::metadata(root).map_err(|e| {
        ParserError::InvalidPath(format!("{}: {}", root.display(), e))
    })?;

    if !metadata.is_dir() {
        if matches(root) {
            return Ok(vec![root.to_path_buf()]);
        }
        debug!("Skipping {}: not a candidate file", root.display());
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by(|a, b| a.file_name().cmp(b.file_name())) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if entry.file_type().is_file() && matches(entry.path()) {
            files.push(entry.into_path());
        }
    }

    if files.is_empty() {
        info!("No report files found under {}", root.display());
    }

    Ok(files)
}

/// Decodes each file with `decode`, logging and skipping failures.
pub(crate) fn decode_each<F>(files: &[PathBuf], mut decode: F) -> Vec<TestResult>
where
    F: FnMut(&Path) -> ParserResult<Vec<TestResult>>,
{
    let mut results = Vec::new();
    for file in files {
        debug!("Parsing {}", file.display());
        match decode(file) {
            Ok(mut decoded) => results.append(&mut decoded),
            Err(e) => error!("Failed to parse {}: {}", file.display(), e),
        }
    }
    results
}

pub(crate) fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
}
