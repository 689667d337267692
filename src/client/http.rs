//! reqwest implementation of [`TestOpsClient`].
//!
//! Runs, lookups and attachments go through the v1 API; results are created
//! in bulk through v2. Every request carries the `Token` header. Failed
//! requests are not retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::wire::{BulkResults, ResultCreate};
use super::{
    ClientError, ClientResult, CustomField, Environment, EnvironmentCreate, Milestone,
    MilestoneCreate, Plan, PlanDetail, Run, RunCreate, RunWindow, TestOpsClient,
};
use crate::config::ApiConfig;
use crate::model::{Attachment, TestResult};

const USER_AGENT_VALUE: &str = concat!("testops/", env!("CARGO_PKG_VERSION"));
const TOKEN_HEADER: &str = "Token";
const PAGE_SIZE: usize = 100;
const TIMEOUT_SECS: u64 = 300;

/// Standard response wrapper: `{"status": true, "result": ...}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    total: usize,
    #[serde(default = "Vec::new")]
    entities: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    hash: String,
}

/// Client for the remote service.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpClient {
    /// `host` is the API root; `/v1` and `/v2` paths are appended to it.
    pub fn new(host: &str, token: impl Into<String>) -> ClientResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .default_headers(default_headers)
            .build()?;

        Ok(Self {
            client,
            base_url: host.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// # Errors
    ///
    /// Returns [`ClientError::MissingConfig`] when no token is configured.
    pub fn from_config(api: &ApiConfig) -> ClientResult<Self> {
        let token = api
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ClientError::MissingConfig("api token".to_string()))?;
        Self::new(&api.host, token)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> ClientResult<Response> {
        let response = request.header(TOKEN_HEADER, &self.token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = error_body(response.text().await, what);
        Err(ClientError::Api {
            message: format!("{} failed with HTTP {}", what, status.as_u16()),
            body,
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> ClientResult<T> {
        let response = self.send(request, what).await?;
        let bytes = response.bytes().await?;
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;
        Ok(envelope.result)
    }

    /// Follows limit/offset pages until `total` entities were seen. `filters`
    /// are sent with every page.
    async fn paginate<T: DeserializeOwned>(
        &self,
        path: &str,
        filters: &[(&str, String)],
        what: &str,
    ) -> ClientResult<Vec<T>> {
        let mut items = Vec::new();
        let mut offset = 0;
        loop {
            let request = self
                .client
                .get(self.url(path))
                .query(&[("limit", PAGE_SIZE), ("offset", offset)])
                .query(filters);
            let page: Page<T> = self.json(request, what).await?;
            let fetched = page.entities.len();
            items.extend(page.entities);
            offset += PAGE_SIZE;
            if fetched == 0 || offset >= page.total {
                break;
            }
        }
        Ok(items)
    }

    async fn upload_attachment(&self, project: &str, attachment: &Attachment) -> ClientResult<String> {
        let bytes = attachment.materialize().await?;
        let mut part = Part::bytes(bytes).file_name(attachment.file_name());
        if let Some(mime) = &attachment.content_type {
            part = part.mime_str(mime)?;
        }

        let request = self
            .client
            .post(self.url(&format!("/v1/attachment/{}", project)))
            .multipart(Form::new().part("file", part));
        let files: Vec<UploadedFile> = self.json(request, "upload attachment").await?;

        files
            .into_iter()
            .next()
            .map(|f| f.hash)
            .ok_or_else(|| ClientError::Api {
                message: "upload attachment returned no file".to_string(),
                body: String::new(),
            })
    }

    /// One hash per attachment, in [`TestResult::all_attachments`] order.
    /// Attachments that cannot be read or uploaded yield `None`.
    async fn attachment_hashes(&self, project: &str, result: &TestResult) -> Vec<Option<String>> {
        let mut hashes = Vec::new();
        for attachment in result.all_attachments() {
            match self.upload_attachment(project, attachment).await {
                Ok(hash) => hashes.push(Some(hash)),
                Err(e) => {
                    warn!("Skipping attachment {}: {}", attachment.file_name(), e);
                    hashes.push(None);
                }
            }
        }
        hashes
    }
}

/// The body of a failed response, or a note on why it could not be read.
fn error_body(body: reqwest::Result<String>, what: &str) -> String {
    match body {
        Ok(body) => body,
        Err(e) => {
            warn!("Failed to read {} error response: {}", what, e);
            format!("<unreadable response body: {}>", e)
        }
    }
}

#[async_trait]
impl TestOpsClient for HttpClient {
    async fn environments(&self, project: &str) -> ClientResult<Vec<Environment>> {
        debug!("Fetching environments of {}", project);
        self.paginate(&format!("/v1/environment/{}", project), &[], "get environments")
            .await
    }

    async fn milestones(&self, project: &str, search: &str) -> ClientResult<Vec<Milestone>> {
        debug!("Searching milestones of {} for {:?}", project, search);
        let request = self
            .client
            .get(self.url(&format!("/v1/milestone/{}", project)))
            .query(&[("search", search)]);
        let page: Page<Milestone> = self.json(request, "get milestones").await?;
        Ok(page.entities)
    }

    async fn plans(&self, project: &str) -> ClientResult<Vec<Plan>> {
        debug!("Fetching plans of {}", project);
        self.paginate(&format!("/v1/plan/{}", project), &[], "get plans")
            .await
    }

    async fn create_run(&self, project: &str, run: &RunCreate) -> ClientResult<i64> {
        debug!("Creating run {:?} in {}", run.title, project);
        let request = self
            .client
            .post(self.url(&format!("/v1/run/{}", project)))
            .json(run);
        let created: Created = self.json(request, "create run").await?;
        info!("Created run {} in {}", created.id, project);
        Ok(created.id)
    }

    async fn complete_run(&self, project: &str, run_id: i64) -> ClientResult<()> {
        let request = self
            .client
            .post(self.url(&format!("/v1/run/{}/{}/complete", project, run_id)));
        self.send(request, "complete run").await?;
        info!("Completed run {} in {}", run_id, project);
        Ok(())
    }

    async fn upload_results(
        &self,
        project: &str,
        run_id: i64,
        results: &[TestResult],
    ) -> ClientResult<()> {
        debug!("Uploading {} results to run {}", results.len(), run_id);

        let mut converted = Vec::with_capacity(results.len());
        for result in results {
            let mut hashes = self.attachment_hashes(project, result).await.into_iter();
            converted.push(ResultCreate::from_result(result, &mut hashes));
        }

        let request = self
            .client
            .post(self.url(&format!("/v2/{}/run/{}/results", project, run_id)))
            .json(&BulkResults { results: converted });
        self.send(request, "upload results").await?;
        Ok(())
    }

    async fn create_environment(
        &self,
        project: &str,
        environment: &EnvironmentCreate,
    ) -> ClientResult<i64> {
        let request = self
            .client
            .post(self.url(&format!("/v1/environment/{}", project)))
            .json(environment);
        let created: Created = self.json(request, "create environment").await?;
        info!("Created environment {} ({}) in {}", environment.slug, created.id, project);
        Ok(created.id)
    }

    async fn create_milestone(
        &self,
        project: &str,
        milestone: &MilestoneCreate,
    ) -> ClientResult<i64> {
        let request = self
            .client
            .post(self.url(&format!("/v1/milestone/{}", project)))
            .json(milestone);
        let created: Created = self.json(request, "create milestone").await?;
        info!("Created milestone {:?} ({}) in {}", milestone.title, created.id, project);
        Ok(created.id)
    }

    async fn runs(&self, project: &str, window: RunWindow) -> ClientResult<Vec<Run>> {
        debug!("Fetching runs of {} within {:?}", project, window);
        let mut filters = Vec::new();
        if let Some(from) = window.from {
            filters.push(("from_start_time", from.to_string()));
        }
        if let Some(to) = window.to {
            filters.push(("to_start_time", to.to_string()));
        }
        self.paginate(&format!("/v1/run/{}", project), &filters, "get runs")
            .await
    }

    async fn delete_run(&self, project: &str, run_id: i64) -> ClientResult<()> {
        let request = self
            .client
            .delete(self.url(&format!("/v1/run/{}/{}", project, run_id)));
        self.send(request, "delete run").await?;
        info!("Deleted run {} in {}", run_id, project);
        Ok(())
    }

    async fn plan(&self, project: &str, plan_id: i64) -> ClientResult<PlanDetail> {
        debug!("Fetching plan {} of {}", plan_id, project);
        let request = self
            .client
            .get(self.url(&format!("/v1/plan/{}/{}", project, plan_id)));
        self.json(request, "get plan").await
    }

    async fn custom_fields(&self) -> ClientResult<Vec<CustomField>> {
        debug!("Fetching custom fields");
        self.paginate("/v1/custom_field", &[], "get custom fields")
            .await
    }

    async fn delete_custom_field(&self, field_id: i64) -> ClientResult<()> {
        let request = self
            .client
            .delete(self.url(&format!("/v1/custom_field/{}", field_id)));
        self.send(request, "delete custom field").await?;
        info!("Deleted custom field {}", field_id);
        Ok(())
    }
}
