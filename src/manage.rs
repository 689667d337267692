//! Project administration: environments, milestones, runs, custom fields
//! and case filters.
//!
//! Every operation talks to the service through [`TestOpsClient`] and is
//! sequential. Environments and milestones are get-or-create, so repeating a
//! command returns the same id.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use crate::client::{ClientError, EnvironmentCreate, MilestoneCreate, RunWindow, TestOpsClient};

/// Result type for project administration.
pub type ManageResult<T> = Result<T, ManageError>;

#[derive(Debug, Error)]
pub enum ManageError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("no cases found in plan {0}")]
    EmptyPlan(i64),

    #[error("failed to delete run {run_id}: {source}")]
    DeleteRun {
        run_id: i64,
        #[source]
        source: ClientError,
    },

    #[error("failed to remove custom field {id} with title {title}: {source}")]
    RemoveField {
        id: i64,
        title: String,
        #[source]
        source: ClientError,
    },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("failed to write {path}: {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Id of an environment or milestone, and whether this call created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ensured {
    pub id: i64,
    pub created: bool,
}

/// Which runs to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunSelection {
    Ids(Vec<i64>),
    /// Every run that started within the window.
    All(RunWindow),
}

/// Which custom fields to delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSelection {
    One(i64),
    All,
}

/// Test frameworks a case filter can be rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FilterFramework {
    /// A `--grep` pattern matching `Qase ID: <n>` annotations
    Playwright,
}

/// Playwright grep pattern for the given case ids: `(Qase ID: 1|2|3)`.
pub fn playwright_pattern(ids: &[i64]) -> String {
    let ids: Vec<String> = ids.iter().map(i64::to_string).collect();
    format!("(Qase ID: {})", ids.join("|"))
}

/// Writes `KEY=value` to `path`, replacing its contents.
///
/// CI jobs source the file to pick up ids created by an earlier step.
pub fn write_env_file(path: &Path, key: &str, value: &str) -> ManageResult<()> {
    std::fs::write(path, format!("{}={}", key, value)).map_err(|source| ManageError::Output {
        path: path.display().to_string(),
        source,
    })?;
    debug!("Wrote {} to {}", key, path.display());
    Ok(())
}

pub struct ProjectAdmin<'a, C: ?Sized> {
    client: &'a C,
    project: &'a str,
}

impl<'a, C> ProjectAdmin<'a, C>
where
    C: TestOpsClient + ?Sized,
{
    pub fn new(client: &'a C, project: &'a str) -> Self {
        Self { client, project }
    }

    /// Returns the environment with `spec.slug`, creating it when missing.
    pub async fn ensure_environment(&self, spec: &EnvironmentCreate) -> ManageResult<Ensured> {
        if spec.slug.is_empty() || spec.slug.contains(char::is_whitespace) {
            return Err(ManageError::InvalidParams(format!(
                "slug {:?} must be non-empty and contain no spaces",
                spec.slug
            )));
        }

        let existing = self.client.environments(self.project).await?;
        if let Some(env) = existing.into_iter().find(|e| e.slug == spec.slug) {
            info!("Environment {} already exists with id {}", spec.slug, env.id);
            return Ok(Ensured {
                id: env.id,
                created: false,
            });
        }

        let id = self.client.create_environment(self.project, spec).await?;
        Ok(Ensured { id, created: true })
    }

    /// Returns the milestone titled exactly `spec.title`, creating it when
    /// missing.
    pub async fn ensure_milestone(&self, spec: &MilestoneCreate) -> ManageResult<Ensured> {
        if spec.title.trim().is_empty() {
            return Err(ManageError::InvalidParams(
                "milestone title is empty".to_string(),
            ));
        }

        let found = self.client.milestones(self.project, &spec.title).await?;
        if let Some(milestone) = found.into_iter().find(|m| m.title == spec.title) {
            info!(
                "Milestone {:?} already exists with id {}",
                spec.title, milestone.id
            );
            return Ok(Ensured {
                id: milestone.id,
                created: false,
            });
        }

        let id = self.client.create_milestone(self.project, spec).await?;
        Ok(Ensured { id, created: true })
    }

    /// Deletes the selected runs in order and returns how many were deleted.
    /// Stops at the first failure.
    pub async fn delete_runs(&self, selection: &RunSelection) -> ManageResult<usize> {
        let ids = match selection {
            RunSelection::Ids(ids) if ids.is_empty() => {
                return Err(ManageError::InvalidParams("no run ids given".to_string()));
            }
            RunSelection::Ids(ids) => ids.clone(),
            RunSelection::All(window) => {
                if let (Some(from), Some(to)) = (window.from, window.to)
                    && from > to
                {
                    return Err(ManageError::InvalidParams(
                        "start date is after end date".to_string(),
                    ));
                }
                let runs = self.client.runs(self.project, *window).await?;
                debug!("Found {} runs to delete", runs.len());
                runs.into_iter().map(|r| r.id).collect()
            }
        };

        for &run_id in &ids {
            self.client
                .delete_run(self.project, run_id)
                .await
                .map_err(|source| ManageError::DeleteRun { run_id, source })?;
        }
        info!("Deleted {} runs", ids.len());
        Ok(ids.len())
    }

    /// Deletes the selected custom fields and returns how many were deleted.
    pub async fn delete_custom_fields(&self, selection: FieldSelection) -> ManageResult<usize> {
        match selection {
            FieldSelection::One(id) => {
                self.client.delete_custom_field(id).await?;
                Ok(1)
            }
            FieldSelection::All => {
                let fields = self.client.custom_fields().await?;
                for field in &fields {
                    self.client
                        .delete_custom_field(field.id)
                        .await
                        .map_err(|source| ManageError::RemoveField {
                            id: field.id,
                            title: field.title.clone(),
                            source,
                        })?;
                }
                info!("Deleted {} custom fields", fields.len());
                Ok(fields.len())
            }
        }
    }

    /// Renders the cases of `plan_id` as a filter for `framework`.
    pub async fn case_filter(
        &self,
        plan_id: i64,
        framework: FilterFramework,
    ) -> ManageResult<String> {
        let plan = self.client.plan(self.project, plan_id).await?;
        if plan.cases.is_empty() {
            return Err(ManageError::EmptyPlan(plan_id));
        }

        let ids: Vec<i64> = plan.cases.iter().map(|c| c.case_id).collect();
        debug!("Plan {} has {} cases", plan_id, ids.len());
        Ok(match framework {
            FilterFramework::Playwright => playwright_pattern(&ids),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::{Call, RecordingClient};
    use crate::client::{CustomField, Environment, Milestone, Run};

    fn staging() -> EnvironmentCreate {
        EnvironmentCreate {
            title: "Staging".into(),
            slug: "staging".into(),
            ..EnvironmentCreate::default()
        }
    }

    #[test]
    fn test_playwright_pattern() {
        assert_eq!(playwright_pattern(&[1, 2, 3]), "(Qase ID: 1|2|3)");
        assert_eq!(playwright_pattern(&[42]), "(Qase ID: 42)");
    }

    #[test]
    fn test_env_file_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qase.env");
        std::fs::write(&path, "QASE_TESTOPS_RUN_ID=1\nSTALE=1\n").unwrap();

        write_env_file(&path, "QASE_MILESTONE", "12").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "QASE_MILESTONE=12");
    }

    #[tokio::test]
    async fn test_existing_environment_is_reused() {
        let client = RecordingClient {
            environments: vec![Environment {
                id: 11,
                title: "Staging".into(),
                slug: "staging".into(),
            }],
            ..RecordingClient::default()
        };

        let env = ProjectAdmin::new(&client, "PRJ")
            .ensure_environment(&staging())
            .await
            .unwrap();
        assert_eq!(env, Ensured { id: 11, created: false });
        assert_eq!(client.calls(), vec![Call::Environments]);
    }

    #[tokio::test]
    async fn test_missing_environment_is_created() {
        let client = RecordingClient::default();
        let env = ProjectAdmin::new(&client, "PRJ")
            .ensure_environment(&staging())
            .await
            .unwrap();

        assert_eq!(env, Ensured { id: client.run_id, created: true });
        assert_eq!(
            client.calls(),
            vec![Call::Environments, Call::CreateEnvironment(staging())]
        );
    }

    #[tokio::test]
    async fn test_slug_with_spaces_is_rejected() {
        let client = RecordingClient::default();
        let spec = EnvironmentCreate {
            slug: "my env".into(),
            ..staging()
        };

        let err = ProjectAdmin::new(&client, "PRJ")
            .ensure_environment(&spec)
            .await
            .unwrap_err();
        assert!(matches!(err, ManageError::InvalidParams(_)));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_milestone_needs_exact_title() {
        let client = RecordingClient {
            milestones: vec![Milestone {
                id: 20,
                title: "Release 2.1".into(),
            }],
            ..RecordingClient::default()
        };
        let spec = MilestoneCreate {
            title: "Release 2".into(),
            ..MilestoneCreate::default()
        };

        let milestone = ProjectAdmin::new(&client, "PRJ")
            .ensure_milestone(&spec)
            .await
            .unwrap();
        assert!(milestone.created);
        assert_eq!(
            client.calls(),
            vec![
                Call::Milestones("Release 2".into()),
                Call::CreateMilestone(spec)
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_all_runs_in_window() {
        let client = RecordingClient {
            runs: vec![
                Run { id: 3, title: "a".into() },
                Run { id: 4, title: "b".into() },
            ],
            ..RecordingClient::default()
        };
        let window = RunWindow {
            from: Some(1_704_153_600),
            to: None,
        };

        let deleted = ProjectAdmin::new(&client, "PRJ")
            .delete_runs(&RunSelection::All(window))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(
            client.calls(),
            vec![Call::Runs(window), Call::DeleteRun(3), Call::DeleteRun(4)]
        );
    }

    #[tokio::test]
    async fn test_delete_runs_stops_at_first_failure() {
        let client = RecordingClient {
            fail_delete: Some(2),
            ..RecordingClient::default()
        };

        let err = ProjectAdmin::new(&client, "PRJ")
            .delete_runs(&RunSelection::Ids(vec![1, 2, 3]))
            .await
            .unwrap_err();
        assert!(matches!(err, ManageError::DeleteRun { run_id: 2, .. }));
        assert_eq!(client.calls(), vec![Call::DeleteRun(1), Call::DeleteRun(2)]);
    }

    #[tokio::test]
    async fn test_inverted_window_is_rejected() {
        let client = RecordingClient::default();
        let window = RunWindow {
            from: Some(200),
            to: Some(100),
        };

        let err = ProjectAdmin::new(&client, "PRJ")
            .delete_runs(&RunSelection::All(window))
            .await
            .unwrap_err();
        assert!(matches!(err, ManageError::InvalidParams(_)));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_custom_fields_names_the_failing_field() {
        let client = RecordingClient {
            custom_fields: vec![
                CustomField { id: 1, title: "Browser".into() },
                CustomField { id: 2, title: "Build".into() },
            ],
            fail_delete: Some(2),
            ..RecordingClient::default()
        };

        let err = ProjectAdmin::new(&client, "PRJ")
            .delete_custom_fields(FieldSelection::All)
            .await
            .unwrap_err();
        assert!(
            err.to_string()
                .starts_with("failed to remove custom field 2 with title Build")
        );
    }

    #[tokio::test]
    async fn test_delete_one_custom_field_skips_listing() {
        let client = RecordingClient::default();
        let deleted = ProjectAdmin::new(&client, "PRJ")
            .delete_custom_fields(FieldSelection::One(9))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(client.calls(), vec![Call::DeleteCustomField(9)]);
    }

    #[tokio::test]
    async fn test_case_filter_for_playwright() {
        let client = RecordingClient {
            plan_cases: vec![5, 8, 13],
            ..RecordingClient::default()
        };
        let pattern = ProjectAdmin::new(&client, "PRJ")
            .case_filter(4, FilterFramework::Playwright)
            .await
            .unwrap();
        assert_eq!(pattern, "(Qase ID: 5|8|13)");
    }

    #[tokio::test]
    async fn test_empty_plan_is_an_error() {
        let client = RecordingClient::default();
        let err = ProjectAdmin::new(&client, "PRJ")
            .case_filter(4, FilterFramework::Playwright)
            .await
            .unwrap_err();
        assert!(matches!(err, ManageError::EmptyPlan(4)));
    }
}
