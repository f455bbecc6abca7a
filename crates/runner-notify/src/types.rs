use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    Completed,
    Failed,
}

/// Body of the terminal-status webhook. Absent fields are omitted from the
/// JSON rather than sent as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub job_id: String,
    pub status: CallbackStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub upstream_repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fork_repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl CallbackPayload {
    pub fn completed(
        job_id: impl Into<String>,
        upstream_repo: impl Into<String>,
        fork_repo: Option<String>,
        branch: Option<String>,
        pr_url: Option<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            status: CallbackStatus::Completed,
            pr_url,
            error: None,
            upstream_repo: upstream_repo.into(),
            fork_repo,
            branch,
        }
    }

    pub fn failed(
        job_id: impl Into<String>,
        upstream_repo: impl Into<String>,
        fork_repo: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            status: CallbackStatus::Failed,
            pr_url: None,
            error: Some(error.into()),
            upstream_repo: upstream_repo.into(),
            fork_repo,
            branch: None,
        }
    }

    /// The exact bytes that are signed and sent.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
