use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use runner_core::types::RepoSlug;

use crate::client::GitHubApi;
use crate::error::GitHubError;
use crate::types::PullRequestInfo;

const ALREADY_EXISTS_MARKER: &str = "already exists";

/// `<fork_owner>:<branch>`, the cross-repository head reference.
pub fn head_ref(fork_owner: &str, branch: &str) -> String {
    format!("{fork_owner}:{branch}")
}

/// True when a failed create-PR response says the PR is already open.
///
/// Matches the marker case-insensitively in the top-level `message` and in
/// every `errors[].message`. This depends on GitHub's wording; a reworded
/// message turns idempotent reruns into hard failures.
pub fn indicates_existing_pr(body: &Value) -> bool {
    let top_level = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let field_messages = body
        .get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .filter_map(|error| error.get("message").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    [top_level, field_messages.as_str()]
        .iter()
        .any(|text| text.to_lowercase().contains(ALREADY_EXISTS_MARKER))
}

/// Opens the upstream pull request for a fork branch, or finds the one a
/// previous run opened.
pub struct PullRequestReconciler {
    api: Arc<dyn GitHubApi>,
}

impl PullRequestReconciler {
    pub fn new(api: Arc<dyn GitHubApi>) -> Self {
        Self { api }
    }

    /// Create a pull request from `fork_repo:branch` into upstream's current
    /// default branch and return its URL. Reruns against the same branch
    /// return the already-open PR instead of failing.
    pub async fn create_pr(
        &self,
        upstream_repo: &str,
        fork_repo: &str,
        branch: &str,
        title: &str,
        body: &str,
    ) -> Result<String, GitHubError> {
        let upstream = RepoSlug::parse(upstream_repo)?;
        let fork = RepoSlug::parse(fork_repo)?;
        if branch.trim().is_empty() {
            return Err(GitHubError::Validation {
                message: "pull request branch must not be empty".to_string(),
            });
        }

        let base = self.api.default_branch(upstream_repo).await?;
        let head = head_ref(fork.owner(), branch);

        let response = self
            .api
            .post(
                &format!("/repos/{upstream}/pulls"),
                &json!({
                    "title": title,
                    "head": head,
                    "base": base,
                    "body": body,
                }),
            )
            .await?;

        if response.status == 201 {
            let created: PullRequestInfo = response.json("create pull request")?;
            let pr_url = html_url(created, "create pull request")?;
            info!(upstream_repo, %head, %pr_url, "pull request created");
            return Ok(pr_url);
        }

        if indicates_existing_pr(&response.body) {
            warn!(upstream_repo, %head, "pull request already exists; looking it up");
            return self.find_existing_pr(upstream_repo, &head, "open").await;
        }

        Err(GitHubError::from_response(
            format!("create pull request {head} -> {upstream}:{base}"),
            &response,
        ))
    }

    /// URL of the first pull request in `state` whose head is `head`.
    pub async fn find_existing_pr(
        &self,
        upstream_repo: &str,
        head: &str,
        state: &str,
    ) -> Result<String, GitHubError> {
        let response = self
            .api
            .get(
                &format!("/repos/{upstream_repo}/pulls"),
                &[("head", head), ("state", state), ("per_page", "1")],
            )
            .await?;

        if response.status == 200 {
            let found: Vec<PullRequestInfo> = response.json("list pull requests")?;
            if let Some(pr) = found.into_iter().next() {
                return html_url(pr, "list pull requests");
            }
        }

        Err(GitHubError::PullRequestNotFound {
            head: head.to_string(),
        })
    }
}

/// A pull request without a URL cannot be reported to the caller.
fn html_url(pr: PullRequestInfo, context: &str) -> Result<String, GitHubError> {
    if pr.html_url.trim().is_empty() {
        return Err(GitHubError::Decode {
            context: context.to_string(),
            message: "pull request has no html_url".to_string(),
        });
    }
    Ok(pr.html_url)
}
