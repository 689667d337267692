//! Canonical result model shared by every decoder and the uploader.
//!
//! Decoders produce [`TestResult`] values once; the upload pipeline
//! transforms owned copies of them and hands them to the transport
//! boundary. Nothing here performs I/O except [`Attachment::materialize`].
//!
//! ```text
//! TestResult
//! ├── Execution            status, timing (ms since epoch), stack trace
//! ├── fields / params      free-form string maps
//! ├── attachments          Vec<Attachment>
//! ├── steps                Vec<Step>  (recursive)
//! │   └── StepExecution    status, timing, comment, attachments
//! └── relations            Relation ─► Suite ─► Vec<SuiteData>
//! ```
//!
//! The serde representation doubles as the native JSON report format.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Final status of a test result.
///
/// The vocabulary is closed. Format-specific statuses are coerced into it
/// with [`Status::coerce`]; raw strings never reach the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Passed,
    Failed,
    Skipped,
    Invalid,
    Blocked,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Passed,
        Status::Failed,
        Status::Skipped,
        Status::Invalid,
        Status::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Passed => "passed",
            Status::Failed => "failed",
            Status::Skipped => "skipped",
            Status::Invalid => "invalid",
            Status::Blocked => "blocked",
        }
    }

    /// Maps `raw` into the vocabulary, returning `fallback` for anything
    /// unrecognized. Matching ignores case and surrounding whitespace.
    pub fn coerce(raw: &str, fallback: Status) -> Status {
        raw.parse().unwrap_or(fallback)
    }
}

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Status::coerce(&raw, Status::Invalid))
    }
}

/// Status of a single step. Steps cannot be `invalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
    Blocked,
}

impl StepStatus {
    pub const ALL: [StepStatus; 4] = [
        StepStatus::Passed,
        StepStatus::Failed,
        StepStatus::Skipped,
        StepStatus::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Passed => "passed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::Blocked => "blocked",
        }
    }

    pub fn coerce(raw: &str, fallback: StepStatus) -> StepStatus {
        raw.parse().unwrap_or(fallback)
    }
}

impl FromStr for StepStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        StepStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StepStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StepStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(StepStatus::coerce(&raw, StepStatus::Blocked))
    }
}

/// A status string outside the closed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status: {0:?}")]
pub struct UnknownStatus(pub String);

/// Outcome and timing of one test execution.
///
/// Times are milliseconds since the Unix epoch; `duration` is milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub status: Status,

    #[serde(default)]
    pub start_time: Option<f64>,

    #[serde(default)]
    pub end_time: Option<f64>,

    #[serde(default)]
    pub duration: Option<f64>,

    #[serde(default, rename = "stacktrace")]
    pub stack_trace: Option<String>,

    #[serde(default)]
    pub thread: Option<String>,
}

impl Execution {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            start_time: None,
            end_time: None,
            duration: None,
            stack_trace: None,
            thread: None,
        }
    }
}

/// One test execution in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    #[serde(default)]
    pub id: Option<Uuid>,

    pub title: String,

    /// Opaque identity used by the receiving service to correlate runs.
    #[serde(default)]
    pub signature: Option<String>,

    /// Pre-existing remote case this result belongs to.
    #[serde(default, rename = "testops_id")]
    pub case_id: Option<i64>,

    pub execution: Execution,

    #[serde(default)]
    pub fields: HashMap<String, String>,

    #[serde(default)]
    pub attachments: Vec<Attachment>,

    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default)]
    pub params: HashMap<String, String>,

    #[serde(default)]
    pub param_groups: Vec<Vec<String>>,

    #[serde(default)]
    pub relations: Relation,

    #[serde(default)]
    pub muted: bool,

    #[serde(default)]
    pub message: Option<String>,
}

impl TestResult {
    pub fn new(title: impl Into<String>, status: Status) -> Self {
        Self {
            id: None,
            title: title.into(),
            signature: None,
            case_id: None,
            execution: Execution::new(status),
            fields: HashMap::new(),
            attachments: Vec::new(),
            steps: Vec::new(),
            params: HashMap::new(),
            param_groups: Vec::new(),
            relations: Relation::default(),
            muted: false,
            message: None,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_suites<I, S>(mut self, titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relations = Relation::from_titles(titles);
        self
    }

    pub fn with_start_time(mut self, millis: f64) -> Self {
        self.execution.start_time = Some(millis);
        self
    }

    pub fn status(&self) -> Status {
        self.execution.status
    }

    /// Every attachment on the result and on any step, depth first.
    pub fn all_attachments(&self) -> Vec<&Attachment> {
        fn collect<'a>(steps: &'a [Step], out: &mut Vec<&'a Attachment>) {
            for step in steps {
                out.extend(step.execution.attachments.iter());
                collect(&step.steps, out);
            }
        }

        let mut out: Vec<&Attachment> = self.attachments.iter().collect();
        collect(&self.steps, &mut out);
        out
    }
}

/// A node of the step tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub data: StepData,
    pub execution: StepExecution,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Step {
    pub fn new(action: impl Into<String>, status: StepStatus) -> Self {
        Self {
            data: StepData {
                action: action.into(),
            },
            execution: StepExecution::new(status),
            steps: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepData {
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub status: StepStatus,

    #[serde(default)]
    pub start_time: Option<f64>,

    #[serde(default)]
    pub end_time: Option<f64>,

    #[serde(default)]
    pub duration: Option<f64>,

    #[serde(default)]
    pub comment: String,

    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl StepExecution {
    pub fn new(status: StepStatus) -> Self {
        Self {
            status,
            start_time: None,
            end_time: None,
            duration: None,
            comment: String::new(),
            attachments: Vec::new(),
        }
    }
}

/// Where an attachment's bytes come from.
///
/// Exactly one source exists at a time; the uploader reads it lazily.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    Path(PathBuf),
    Content(Vec<u8>),
}

/// A file attached to a result or a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAttachment", into = "RawAttachment")]
pub struct Attachment {
    pub id: Option<Uuid>,
    pub name: String,
    pub content_type: Option<String>,
    pub source: AttachmentSource,
}

impl Attachment {
    pub fn from_path(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: None,
            name: name.into(),
            content_type: None,
            source: AttachmentSource::Path(path.into()),
        }
    }

    pub fn from_content(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            id: None,
            name: name.into(),
            content_type: None,
            source: AttachmentSource::Content(content),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// The name used for extension matching and upload: the declared name,
    /// or the file name of the backing path when no name was declared.
    pub fn file_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        match &self.source {
            AttachmentSource::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            AttachmentSource::Content(_) => String::new(),
        }
    }

    /// Reads the attachment bytes from whichever source is present.
    pub async fn materialize(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            AttachmentSource::Content(bytes) => Ok(bytes.clone()),
            AttachmentSource::Path(path) => tokio::fs::read(path).await,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            AttachmentSource::Path(path) => Some(path),
            AttachmentSource::Content(_) => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawAttachment {
    #[serde(default)]
    id: Option<Uuid>,
    #[serde(default, rename = "file_name")]
    name: String,
    #[serde(default, rename = "mime_type")]
    content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_path: Option<PathBuf>,
    /// Base64 encoded bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

impl TryFrom<RawAttachment> for Attachment {
    type Error = String;

    fn try_from(raw: RawAttachment) -> Result<Self, Self::Error> {
        let source = match (raw.content, raw.file_path) {
            (Some(content), _) => AttachmentSource::Content(
                BASE64
                    .decode(content.trim())
                    .map_err(|e| format!("invalid base64 attachment content: {}", e))?,
            ),
            (None, Some(path)) => AttachmentSource::Path(path),
            (None, None) => {
                return Err(format!(
                    "attachment {:?} has neither file_path nor content",
                    raw.name
                ));
            }
        };

        Ok(Attachment {
            id: raw.id,
            name: raw.name,
            content_type: raw.content_type,
            source,
        })
    }
}

impl From<Attachment> for RawAttachment {
    fn from(attachment: Attachment) -> Self {
        let (file_path, content) = match attachment.source {
            AttachmentSource::Path(path) => (Some(path), None),
            AttachmentSource::Content(bytes) => (None, Some(BASE64.encode(bytes))),
        };
        RawAttachment {
            id: attachment.id,
            name: attachment.name,
            content_type: attachment.content_type,
            file_path,
            content,
        }
    }
}

/// Hierarchical classification of a result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    #[serde(default)]
    pub suite: Suite,
}

impl Relation {
    pub fn from_titles<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            suite: Suite {
                data: titles
                    .into_iter()
                    .map(|title| SuiteData {
                        title: title.into(),
                        public_id: None,
                    })
                    .collect(),
            },
        }
    }

    /// Suite titles from root to leaf.
    pub fn titles(&self) -> Vec<&str> {
        self.suite.data.iter().map(|d| d.title.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suite {
    #[serde(default)]
    pub data: Vec<SuiteData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteData {
    pub title: String,
    #[serde(default)]
    pub public_id: Option<i64>,
}
