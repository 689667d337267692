//! Destination run lifecycle.
//!
//! A run is either supplied by the caller, in which case the caller owns it
//! and it is neither created nor completed here, or created from a
//! [`RunSpec`] and completed once every batch is in.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{RunSpec, RunTarget, UploadError, UploadResult};
use crate::client::{RunCreate, TestOpsClient};
use crate::model::TestResult;

/// The run results are uploaded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRun {
    pub id: i64,
    /// Whether this process created the run and therefore completes it.
    pub created: bool,
}

/// Start time for a created run: the earliest result start minus `lead_in`.
///
/// `None` when no result carries a start time.
pub fn run_start_time(results: &[TestResult], lead_in: Duration) -> Option<DateTime<Utc>> {
    let earliest = results
        .iter()
        .filter_map(|r| r.execution.start_time)
        .fold(None, |min: Option<f64>, t| Some(min.map_or(t, |m| m.min(t))))?;

    let start = DateTime::from_timestamp_millis(earliest as i64)?;
    let lead_in = chrono::Duration::from_std(lead_in).ok()?;
    start.checked_sub_signed(lead_in)
}

pub struct RunLifecycle<'a, C: ?Sized> {
    client: &'a C,
    project: &'a str,
}

impl<'a, C> RunLifecycle<'a, C>
where
    C: TestOpsClient + ?Sized,
{
    pub fn new(client: &'a C, project: &'a str) -> Self {
        Self { client, project }
    }

    pub async fn resolve(
        &self,
        target: &RunTarget,
        start_time: Option<DateTime<Utc>>,
    ) -> UploadResult<ResolvedRun> {
        match target {
            RunTarget::Existing(id) => {
                info!("Uploading to existing run {}", id);
                Ok(ResolvedRun {
                    id: *id,
                    created: false,
                })
            }
            RunTarget::Create(spec) => {
                let id = self.create(spec, start_time).await?;
                Ok(ResolvedRun { id, created: true })
            }
        }
    }

    /// Resolves the run's environment, milestone and plan names, then opens it.
    pub async fn create(
        &self,
        spec: &RunSpec,
        start_time: Option<DateTime<Utc>>,
    ) -> UploadResult<i64> {
        let mut run = RunCreate::new(&spec.title);
        run.description = spec.description.clone();
        run.tags = spec.tags.clone();
        run.start_time = start_time;

        if let Some(slug) = &spec.environment {
            run.environment_id = self.environment_id(slug).await;
        }
        if let Some(title) = &spec.milestone {
            run.milestone_id = self.milestone_id(title).await;
        }
        if let Some(title) = &spec.plan {
            run.plan_id = self.plan_id(title).await;
        }

        let id = self
            .client
            .create_run(self.project, &run)
            .await
            .map_err(UploadError::CreateRun)?;
        info!("Created run {} ({:?})", id, spec.title);
        Ok(id)
    }

    pub async fn complete(&self, run_id: i64) -> UploadResult<()> {
        self.client
            .complete_run(self.project, run_id)
            .await
            .map_err(|source| UploadError::CompleteRun { run_id, source })?;
        info!("Completed run {}", run_id);
        Ok(())
    }

    /// Lookup failures and misses leave the run without an environment.
    pub async fn environment_id(&self, slug: &str) -> Option<i64> {
        match self.client.environments(self.project).await {
            Ok(environments) => {
                let id = environments
                    .into_iter()
                    .find(|e| e.slug == slug)
                    .map(|e| e.id);
                log_lookup("environment", slug, id);
                id
            }
            Err(e) => {
                warn!("Failed to look up environment {:?}: {}", slug, e);
                None
            }
        }
    }

    pub async fn milestone_id(&self, title: &str) -> Option<i64> {
        match self.client.milestones(self.project, title).await {
            Ok(milestones) => {
                let id = milestones
                    .into_iter()
                    .find(|m| m.title == title)
                    .map(|m| m.id);
                log_lookup("milestone", title, id);
                id
            }
            Err(e) => {
                warn!("Failed to look up milestone {:?}: {}", title, e);
                None
            }
        }
    }

    pub async fn plan_id(&self, title: &str) -> Option<i64> {
        match self.client.plans(self.project).await {
            Ok(plans) => {
                let id = plans.into_iter().find(|p| p.title == title).map(|p| p.id);
                log_lookup("plan", title, id);
                id
            }
            Err(e) => {
                warn!("Failed to look up plan {:?}: {}", title, e);
                None
            }
        }
    }
}

fn log_lookup(kind: &str, name: &str, id: Option<i64>) {
    match id {
        Some(id) => debug!("Resolved {} {:?} to {}", kind, name, id),
        None => warn!("No {} named {:?}, creating run without it", kind, name),
    }
}
