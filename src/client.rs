//! Remote test-management API.
//!
//! [`TestOpsClient`] is the seam between the uploader and the service. The
//! production implementation is [`http::HttpClient`]; tests substitute a
//! recording fake.
//!
//! | Call | Used for |
//! |------|----------|
//! | [`environments`](TestOpsClient::environments) | environment slug → id |
//! | [`milestones`](TestOpsClient::milestones) | milestone title → id |
//! | [`plans`](TestOpsClient::plans) | plan title → id |
//! | [`create_run`](TestOpsClient::create_run) | opening a run |
//! | [`upload_results`](TestOpsClient::upload_results) | one batch of results |
//! | [`complete_run`](TestOpsClient::complete_run) | closing a run the uploader opened |
//! | [`create_environment`](TestOpsClient::create_environment) | `env create` |
//! | [`create_milestone`](TestOpsClient::create_milestone) | `milestone create` |
//! | [`runs`](TestOpsClient::runs) / [`delete_run`](TestOpsClient::delete_run) | `run delete` |
//! | [`plan`](TestOpsClient::plan) | case filters built from a plan |
//! | [`custom_fields`](TestOpsClient::custom_fields) / [`delete_custom_field`](TestOpsClient::delete_custom_field) | `field custom delete` |

#[cfg(test)]
pub(crate) mod fake;
pub mod http;
pub mod wire;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::model::TestResult;

pub use http::HttpClient;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors from talking to the remote service.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The service answered with a non-success status.
    #[error("{message}. Reason: {body}")]
    Api { message: String, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing configuration: {0}")]
    MissingConfig(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Environment {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Milestone {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Plan {
    pub id: i64,
    pub title: String,
}

/// A run as listed by the service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Run {
    pub id: i64,
    #[serde(default)]
    pub title: String,
}

/// Bounds on run start time, in seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunWindow {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

/// A test plan with the cases it includes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlanDetail {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub cases: Vec<PlanCase>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlanCase {
    pub case_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CustomField {
    pub id: i64,
    #[serde(default)]
    pub title: String,
}

/// Body of a create-environment request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnvironmentCreate {
    pub title: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneStatus {
    Active,
    Completed,
}

/// Body of a create-milestone request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MilestoneCreate {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MilestoneStatus>,
    /// Seconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<i64>,
}

/// Body of a create-run request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunCreate {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_start_time"
    )]
    pub start_time: Option<DateTime<Utc>>,
}

impl RunCreate {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// The service expects `YYYY-MM-DD HH:MM:SS` in UTC.
fn serialize_start_time<S: Serializer>(
    time: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match time {
        Some(time) => serializer.serialize_str(&time.format("%Y-%m-%d %H:%M:%S").to_string()),
        None => serializer.serialize_none(),
    }
}

/// Operations the uploader and the project commands need from the remote
/// service.
#[async_trait]
pub trait TestOpsClient: Send + Sync {
    /// Every environment of `project`.
    async fn environments(&self, project: &str) -> ClientResult<Vec<Environment>>;

    /// Milestones of `project` whose title matches `search`.
    async fn milestones(&self, project: &str, search: &str) -> ClientResult<Vec<Milestone>>;

    /// Every test plan of `project`.
    async fn plans(&self, project: &str) -> ClientResult<Vec<Plan>>;

    /// Opens a run and returns its id.
    async fn create_run(&self, project: &str, run: &RunCreate) -> ClientResult<i64>;

    async fn complete_run(&self, project: &str, run_id: i64) -> ClientResult<()>;

    /// Submits one batch of results to `run_id`.
    async fn upload_results(
        &self,
        project: &str,
        run_id: i64,
        results: &[TestResult],
    ) -> ClientResult<()>;

    /// Creates an environment and returns its id.
    async fn create_environment(
        &self,
        project: &str,
        environment: &EnvironmentCreate,
    ) -> ClientResult<i64>;

    /// Creates a milestone and returns its id.
    async fn create_milestone(
        &self,
        project: &str,
        milestone: &MilestoneCreate,
    ) -> ClientResult<i64>;

    /// Every run of `project` that started within `window`.
    async fn runs(&self, project: &str, window: RunWindow) -> ClientResult<Vec<Run>>;

    async fn delete_run(&self, project: &str, run_id: i64) -> ClientResult<()>;

    async fn plan(&self, project: &str, plan_id: i64) -> ClientResult<PlanDetail>;

    /// Every custom field of the workspace.
    async fn custom_fields(&self) -> ClientResult<Vec<CustomField>>;

    async fn delete_custom_field(&self, field_id: i64) -> ClientResult<()>;
}
