use std::time::Duration;

use runner_core::types::RepoSlugError;

use crate::client::ApiResponse;

#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("validation failed: {message}")]
    Validation { message: String },
    #[error(
        "repository {fork_repo} exists but is not a fork of {upstream_repo}; \
         rename or delete the conflicting repository"
    )]
    Conflict {
        fork_repo: String,
        upstream_repo: String,
    },
    #[error("fork {fork_repo} did not become ready within {waited:?}")]
    Timeout { fork_repo: String, waited: Duration },
    #[error("permission denied ({context}): {message}")]
    Permission { context: String, message: String },
    #[error("transient failure ({context}): {status} - {body}")]
    Transient {
        context: String,
        status: u16,
        body: String,
    },
    #[error("transport error ({context}): {source}")]
    Transport {
        context: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{context} failed: {status} - {body}")]
    RemoteApi {
        context: String,
        status: u16,
        body: String,
    },
    #[error("no existing pull request found for head '{head}'")]
    PullRequestNotFound { head: String },
    #[error("unexpected response body ({context}): {message}")]
    Decode { context: String, message: String },
}

impl GitHubError {
    /// Classify a non-success response.
    pub fn from_response(context: impl Into<String>, response: &ApiResponse) -> Self {
        let context = context.into();
        let body = response.text.clone();
        match response.status {
            401 | 403 => GitHubError::Permission {
                context,
                message: format!("HTTP {}: {}", response.status, body),
            },
            429 | 500..=599 => GitHubError::Transient {
                context,
                status: response.status,
                body,
            },
            status => GitHubError::RemoteApi {
                context,
                status,
                body,
            },
        }
    }

    /// Network failures and throttling/server errors. Only the callback
    /// notifier retries these; everything here surfaces them immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GitHubError::Transient { .. } | GitHubError::Transport { .. }
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GitHubError::Transient { status, .. } | GitHubError::RemoteApi { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

impl From<RepoSlugError> for GitHubError {
    fn from(err: RepoSlugError) -> Self {
        GitHubError::Validation {
            message: err.to_string(),
        }
    }
}
