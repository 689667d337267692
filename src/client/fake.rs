//! Recording stand-in for the remote service.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{
    ClientError, ClientResult, CustomField, Environment, EnvironmentCreate, Milestone,
    MilestoneCreate, Plan, PlanCase, PlanDetail, Run, RunCreate, RunWindow, TestOpsClient,
};
use crate::model::TestResult;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Environments,
    Milestones(String),
    Plans,
    CreateRun(RunCreate),
    Upload { run_id: i64, titles: Vec<String> },
    CompleteRun(i64),
    CreateEnvironment(EnvironmentCreate),
    CreateMilestone(MilestoneCreate),
    Runs(RunWindow),
    DeleteRun(i64),
    Plan(i64),
    CustomFields,
    DeleteCustomField(i64),
}

pub struct RecordingClient {
    pub calls: Mutex<Vec<Call>>,
    pub environments: Vec<Environment>,
    pub milestones: Vec<Milestone>,
    pub plans: Vec<Plan>,
    pub runs: Vec<Run>,
    pub plan_cases: Vec<i64>,
    pub custom_fields: Vec<CustomField>,
    /// Id returned by every create call
    pub run_id: i64,
    pub fail_lookups: bool,
    pub fail_create: bool,
    pub fail_complete: bool,
    /// Deleting this run or custom field fails
    pub fail_delete: Option<i64>,
    /// Batches containing a result with this title are rejected
    pub reject_title: Option<String>,
}

impl Default for RecordingClient {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            environments: Vec::new(),
            milestones: Vec::new(),
            plans: Vec::new(),
            runs: Vec::new(),
            plan_cases: Vec::new(),
            custom_fields: Vec::new(),
            run_id: 77,
            fail_lookups: false,
            fail_create: false,
            fail_complete: false,
            fail_delete: None,
            reject_title: None,
        }
    }
}

impl RecordingClient {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn rejected(what: &str) -> ClientError {
        ClientError::Api {
            message: format!("{} failed with HTTP 500", what),
            body: "{\"status\":false}".into(),
        }
    }
}

#[async_trait]
impl TestOpsClient for RecordingClient {
    async fn environments(&self, _project: &str) -> ClientResult<Vec<Environment>> {
        self.record(Call::Environments);
        if self.fail_lookups {
            return Err(Self::rejected("Environment lookup"));
        }
        Ok(self.environments.clone())
    }

    async fn milestones(&self, _project: &str, search: &str) -> ClientResult<Vec<Milestone>> {
        self.record(Call::Milestones(search.to_string()));
        if self.fail_lookups {
            return Err(Self::rejected("Milestone lookup"));
        }
        Ok(self.milestones.clone())
    }

    async fn plans(&self, _project: &str) -> ClientResult<Vec<Plan>> {
        self.record(Call::Plans);
        if self.fail_lookups {
            return Err(Self::rejected("Plan lookup"));
        }
        Ok(self.plans.clone())
    }

    async fn create_run(&self, _project: &str, run: &RunCreate) -> ClientResult<i64> {
        self.record(Call::CreateRun(run.clone()));
        if self.fail_create {
            return Err(Self::rejected("Run creation"));
        }
        Ok(self.run_id)
    }

    async fn complete_run(&self, _project: &str, run_id: i64) -> ClientResult<()> {
        self.record(Call::CompleteRun(run_id));
        if self.fail_complete {
            return Err(Self::rejected("Run completion"));
        }
        Ok(())
    }

    async fn upload_results(
        &self,
        _project: &str,
        run_id: i64,
        results: &[TestResult],
    ) -> ClientResult<()> {
        let titles: Vec<String> = results.iter().map(|r| r.title.clone()).collect();
        let rejected = self
            .reject_title
            .as_ref()
            .is_some_and(|t| titles.contains(t));
        self.record(Call::Upload { run_id, titles });
        if rejected {
            return Err(Self::rejected("Result upload"));
        }
        Ok(())
    }

    async fn create_environment(
        &self,
        _project: &str,
        environment: &EnvironmentCreate,
    ) -> ClientResult<i64> {
        self.record(Call::CreateEnvironment(environment.clone()));
        if self.fail_create {
            return Err(Self::rejected("Environment creation"));
        }
        Ok(self.run_id)
    }

    async fn create_milestone(
        &self,
        _project: &str,
        milestone: &MilestoneCreate,
    ) -> ClientResult<i64> {
        self.record(Call::CreateMilestone(milestone.clone()));
        if self.fail_create {
            return Err(Self::rejected("Milestone creation"));
        }
        Ok(self.run_id)
    }

    async fn runs(&self, _project: &str, window: RunWindow) -> ClientResult<Vec<Run>> {
        self.record(Call::Runs(window));
        if self.fail_lookups {
            return Err(Self::rejected("Run lookup"));
        }
        Ok(self.runs.clone())
    }

    async fn delete_run(&self, _project: &str, run_id: i64) -> ClientResult<()> {
        self.record(Call::DeleteRun(run_id));
        if self.fail_delete == Some(run_id) {
            return Err(Self::rejected("Run deletion"));
        }
        Ok(())
    }

    async fn plan(&self, _project: &str, plan_id: i64) -> ClientResult<PlanDetail> {
        self.record(Call::Plan(plan_id));
        if self.fail_lookups {
            return Err(Self::rejected("Plan lookup"));
        }
        Ok(PlanDetail {
            id: plan_id,
            title: format!("Plan {}", plan_id),
            cases: self
                .plan_cases
                .iter()
                .map(|&case_id| PlanCase { case_id })
                .collect(),
        })
    }

    async fn custom_fields(&self) -> ClientResult<Vec<CustomField>> {
        self.record(Call::CustomFields);
        if self.fail_lookups {
            return Err(Self::rejected("Custom field lookup"));
        }
        Ok(self.custom_fields.clone())
    }

    async fn delete_custom_field(&self, field_id: i64) -> ClientResult<()> {
        self.record(Call::DeleteCustomField(field_id));
        if self.fail_delete == Some(field_id) {
            return Err(Self::rejected("Custom field deletion"));
        }
        Ok(())
    }
}
