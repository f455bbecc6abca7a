use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::client::GitHubApi;
use crate::error::GitHubError;

/// Where the agent workflow lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub runner_repo: String,
    pub workflow_file: String,
    pub workflow_ref: String,
}

impl WorkflowSettings {
    pub fn new(runner_repo: impl Into<String>) -> Self {
        Self {
            runner_repo: runner_repo.into(),
            workflow_file: "run.yml".to_string(),
            workflow_ref: "main".to_string(),
        }
    }
}

/// Inputs handed to the workflow, passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchInputs {
    pub fork_repo: String,
    pub upstream_repo: String,
    pub prompt: String,
    pub job_id: String,
    /// Sent as `""` when absent; workflow inputs are strings.
    #[serde(serialize_with = "empty_if_none")]
    pub callback_url: Option<String>,
}

fn empty_if_none<S: serde::Serializer>(
    value: &Option<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(value.as_deref().unwrap_or(""))
}

pub struct WorkflowDispatcher {
    api: Arc<dyn GitHubApi>,
    settings: WorkflowSettings,
}

impl WorkflowDispatcher {
    pub fn new(api: Arc<dyn GitHubApi>, settings: WorkflowSettings) -> Self {
        Self { api, settings }
    }

    pub fn dispatch_path(&self) -> String {
        format!(
            "/repos/{}/actions/workflows/{}/dispatches",
            self.settings.runner_repo, self.settings.workflow_file
        )
    }

    /// Fire one workflow run.
    ///
    /// Anything but `204 No Content` is an error, and nothing is retried:
    /// a repeated dispatch could start the workflow twice.
    pub async fn dispatch(&self, inputs: &DispatchInputs) -> Result<(), GitHubError> {
        let body = json!({
            "ref": self.settings.workflow_ref,
            "inputs": inputs,
        });
        let response = self.api.post(&self.dispatch_path(), &body).await?;
        if response.status != 204 {
            return Err(GitHubError::from_response(
                format!("dispatch workflow {}", self.settings.workflow_file),
                &response,
            ));
        }

        info!(
            job_id = %inputs.job_id,
            runner_repo = %self.settings.runner_repo,
            workflow = %self.settings.workflow_file,
            "workflow dispatched"
        );
        Ok(())
    }
}
