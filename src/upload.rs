//! Upload orchestration.
//!
//! ```text
//!   Vec<TestResult>
//!        │  empty? ──► UploadError::NoResults (no network)
//!        ▼
//!   RunLifecycle::resolve ──► existing id, or create run
//!        │
//!        ▼
//!   transform: suite prefix → status map → strip params → attachment filter
//!        │
//!        ▼
//!   batch::partition ──► Vec<Vec<TestResult>>
//!        │
//!        ▼
//!   WorkerPool ──► client.upload_results() per batch (fail fast)
//!        │
//!        ▼
//!   RunLifecycle::complete   (only for runs created here)
//! ```
//!
//! # Errors
//!
//! | Error | Meaning |
//! |-------|---------|
//! | [`NoResults`](UploadError::NoResults) | nothing was decoded |
//! | [`CreateRun`](UploadError::CreateRun) | nothing was transmitted |
//! | [`Upload`](UploadError::Upload) | some batches may have been transmitted |
//! | [`CompleteRun`](UploadError::CompleteRun) | all data is in; the run is still open |

pub mod batch;
pub mod pool;
pub mod run;
pub mod transform;

use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::client::{ClientError, TestOpsClient};
use crate::model::{Status, TestResult};
use crate::report::Reporter;

pub use pool::WorkerPool;
pub use run::{ResolvedRun, RunLifecycle};
pub use transform::{ExtensionFilter, StatusMap};

/// Result type for upload operations.
pub type UploadResult<T> = Result<T, UploadError>;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no results to upload")]
    NoResults,

    #[error("invalid upload parameters: {0}")]
    InvalidParams(String),

    #[error("failed to create run: {0}")]
    CreateRun(#[source] ClientError),

    #[error("failed to upload results: {0}")]
    Upload(#[source] ClientError),

    #[error("failed to complete run: {source}")]
    CompleteRun {
        run_id: i64,
        #[source]
        source: ClientError,
    },
}

/// Destination run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunTarget {
    /// A run the caller owns. It is neither created nor completed.
    Existing(i64),
    /// A run to create before uploading and complete afterwards.
    Create(RunSpec),
}

/// Attributes of a run to create. Names are resolved to ids on creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSpec {
    pub title: String,
    pub description: Option<String>,
    /// Environment slug.
    pub environment: Option<String>,
    /// Milestone title.
    pub milestone: Option<String>,
    /// Test plan title.
    pub plan: Option<String>,
    pub tags: Vec<String>,
}

impl RunSpec {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadParams {
    pub project: String,
    pub target: RunTarget,
    pub batch_size: usize,
    /// Title injected at the root of every suite path.
    pub suite: Option<String>,
    pub statuses: StatusMap,
    pub skip_params: bool,
    /// Attachment allow-list. `None` keeps every attachment.
    pub attachments: Option<ExtensionFilter>,
    /// How far a created run is back-dated before the earliest result.
    pub lead_in: Duration,
}

impl UploadParams {
    pub fn new(project: impl Into<String>, target: RunTarget) -> Self {
        Self {
            project: project.into(),
            target,
            batch_size: 200,
            suite: None,
            statuses: StatusMap::default(),
            skip_params: false,
            attachments: None,
            lead_in: Duration::from_secs(10),
        }
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_suite(mut self, suite: impl Into<String>) -> Self {
        self.suite = Some(suite.into());
        self
    }

    pub fn with_statuses(mut self, statuses: StatusMap) -> Self {
        self.statuses = statuses;
        self
    }

    pub fn with_skip_params(mut self, skip: bool) -> Self {
        self.skip_params = skip;
        self
    }

    pub fn with_attachments(mut self, filter: Option<ExtensionFilter>) -> Self {
        self.attachments = filter;
        self
    }

    pub fn with_lead_in(mut self, lead_in: Duration) -> Self {
        self.lead_in = lead_in;
        self
    }

    fn validate(&self) -> UploadResult<()> {
        if self.project.trim().is_empty() {
            return Err(UploadError::InvalidParams("project is required".into()));
        }
        if self.batch_size == 0 {
            return Err(UploadError::InvalidParams(
                "batch size must be positive".into(),
            ));
        }
        match &self.target {
            RunTarget::Existing(id) if *id <= 0 => Err(UploadError::InvalidParams(format!(
                "invalid run id {}",
                id
            ))),
            RunTarget::Create(spec) if spec.title.trim().is_empty() => Err(
                UploadError::InvalidParams("run title must not be empty".into()),
            ),
            _ => Ok(()),
        }
    }

    /// Applies every configured transform in order.
    pub fn prepare(&self, mut results: Vec<TestResult>) -> Vec<TestResult> {
        if let Some(suite) = &self.suite {
            results = transform::inject_suite(results, suite);
        }
        results = self.statuses.apply(results);
        if self.skip_params {
            results = transform::strip_params(results);
        }
        if let Some(filter) = &self.attachments {
            results = filter.apply(results);
        }
        results
    }
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSummary {
    pub run_id: i64,
    pub run_created: bool,
    pub total: usize,
    pub batches: usize,
    /// Results per status, in [`Status::ALL`] order.
    pub statuses: Vec<(Status, usize)>,
}

impl UploadSummary {
    pub fn count(&self, status: Status) -> usize {
        self.statuses
            .iter()
            .find(|(s, _)| *s == status)
            .map_or(0, |(_, n)| *n)
    }
}

/// Drives one upload from decoded results to a completed run.
pub struct Uploader<C, R> {
    client: C,
    reporter: R,
}

impl<C, R> Uploader<C, R>
where
    C: TestOpsClient,
    R: Reporter,
{
    pub fn new(client: C, reporter: R) -> Self {
        Self { client, reporter }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Uploads `results` according to `params`.
    ///
    /// Must be called from a multi-threaded tokio runtime.
    ///
    /// # Errors
    ///
    /// See the module table. A failed batch cancels the remaining ones and
    /// leaves a created run open.
    pub async fn upload(
        &self,
        results: Vec<TestResult>,
        params: &UploadParams,
    ) -> UploadResult<UploadSummary> {
        if results.is_empty() {
            return Err(UploadError::NoResults);
        }
        params.validate()?;

        let lifecycle = RunLifecycle::new(&self.client, &params.project);
        let start_time = run::run_start_time(&results, params.lead_in);
        let run = lifecycle.resolve(&params.target, start_time).await?;

        let results = params.prepare(results);
        let total = results.len();
        let statuses = Status::ALL
            .iter()
            .map(|status| {
                let n = results.iter().filter(|r| r.status() == *status).count();
                (*status, n)
            })
            .collect();

        let batches = batch::partition(results, params.batch_size);
        let batch_count = batches.len();
        let pool = WorkerPool::for_jobs(batch_count);
        info!(
            "Uploading {} results in {} batches to run {} with {} workers",
            total,
            batch_count,
            run.id,
            pool.workers()
        );
        self.reporter
            .on_upload_start(run.id, total, batch_count)
            .await;

        let client = &self.client;
        let reporter = &self.reporter;
        let project = params.project.as_str();
        pool.run(batches, |batch: Vec<TestResult>| async move {
            client.upload_results(project, run.id, &batch).await?;
            reporter.on_batch_complete(batch.len()).await;
            Ok::<(), ClientError>(())
        })
        .map_err(UploadError::Upload)?;

        if run.created {
            lifecycle.complete(run.id).await?;
        }

        let summary = UploadSummary {
            run_id: run.id,
            run_created: run.created,
            total,
            batches: batch_count,
            statuses,
        };
        self.reporter.on_upload_complete(&summary).await;
        Ok(summary)
    }
}
