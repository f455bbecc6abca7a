//! Fork lifecycle: locate or create the bot's fork, wait until it is
//! clonable, and keep it in sync with upstream.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use runner_core::types::RepoSlug;

use crate::client::GitHubApi;
use crate::error::GitHubError;
use crate::types::RepoInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkSettings {
    pub bot_username: String,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
}

impl ForkSettings {
    pub fn new(bot_username: impl Into<String>) -> Self {
        Self {
            bot_username: bot_username.into(),
            ready_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Fork operations. Holds no per-repository state: every call re-reads the
/// remote because users and earlier runs may have changed it.
pub struct ForkManager {
    api: Arc<dyn GitHubApi>,
    settings: ForkSettings,
}

impl ForkManager {
    pub fn new(api: Arc<dyn GitHubApi>, settings: ForkSettings) -> Self {
        Self { api, settings }
    }

    /// Expected fork path (`bot_username/name`) for an upstream repository.
    pub fn fork_repo_name(&self, upstream_repo: &str) -> Result<RepoSlug, GitHubError> {
        let upstream = RepoSlug::parse(upstream_repo)?;
        Ok(upstream.fork_for(&self.settings.bot_username))
    }

    /// Reuse the bot's fork of `upstream_repo`, or create it and wait until
    /// it is clonable.
    ///
    /// Fails with `Conflict` when `bot_username/name` exists but is not a
    /// fork of this upstream; that repository is never touched.
    ///
    /// The existence check and the create request are not atomic on the
    /// remote side: two jobs forking the same upstream at the same moment
    /// can both see "missing" and both request the fork. GitHub resolves
    /// the duplicate request to the same fork, so both jobs converge.
    pub async fn create_or_get_fork(&self, upstream_repo: &str) -> Result<RepoSlug, GitHubError> {
        let upstream = RepoSlug::parse(upstream_repo)?;
        let fork = upstream.fork_for(&self.settings.bot_username);
        let fork_name = fork.to_string();
        let upstream_name = upstream.to_string();

        let context = format!("look up fork {fork_name}");
        let response = self.api.get(&format!("/repos/{fork_name}"), &[]).await?;
        match response.status {
            200 => {
                let existing: RepoInfo = response.json(&context)?;
                return self.reuse_fork(fork, &upstream_name, &existing).await;
            }
            404 => {}
            _ => return Err(GitHubError::from_response(context, &response)),
        }

        info!(upstream_repo = %upstream_name, fork_repo = %fork_name, "creating fork");
        let response = self
            .api
            .post(
                &format!("/repos/{upstream_name}/forks"),
                &json!({ "default_branch_only": true }),
            )
            .await?;
        if !matches!(response.status, 200 | 202) {
            return Err(GitHubError::from_response(
                format!("create fork of {upstream_name}"),
                &response,
            ));
        }

        self.wait_for_fork(&fork_name).await?;
        Ok(fork)
    }

    async fn reuse_fork(
        &self,
        fork: RepoSlug,
        upstream_name: &str,
        existing: &RepoInfo,
    ) -> Result<RepoSlug, GitHubError> {
        let fork_name = fork.to_string();
        if !existing.is_fork_of(upstream_name) {
            warn!(
                fork_repo = %fork_name,
                upstream_repo = %upstream_name,
                parent = existing.parent_name().unwrap_or("n/a"),
                "fork path is taken by an unrelated repository"
            );
            return Err(GitHubError::Conflict {
                fork_repo: fork_name,
                upstream_repo: upstream_name.to_string(),
            });
        }
        if existing.push_denied() {
            return Err(GitHubError::Permission {
                context: format!("push to fork {fork_name}"),
                message: "bot token does not have push access".to_string(),
            });
        }

        info!(fork_repo = %fork_name, "using existing fork");
        if !self.sync_fork(&fork_name, upstream_name).await {
            warn!(fork_repo = %fork_name, "continuing with an unsynced fork");
        }
        Ok(fork)
    }

    /// Poll until the fork answers and lists at least one branch.
    ///
    /// Gives up with `Timeout` once `ready_timeout` has elapsed; the last
    /// sleep is shortened so the deadline is never overshot by a whole
    /// poll interval.
    pub async fn wait_for_fork(&self, fork_repo: &str) -> Result<(), GitHubError> {
        let started = Instant::now();
        let deadline = started + self.settings.ready_timeout;

        loop {
            if self.fork_is_ready(fork_repo).await? {
                info!(fork_repo, waited = ?started.elapsed(), "fork is ready");
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            debug!(fork_repo, "waiting for fork to become ready");
            sleep(self.settings.poll_interval.min(deadline - now)).await;
        }

        Err(GitHubError::Timeout {
            fork_repo: fork_repo.to_string(),
            waited: started.elapsed(),
        })
    }

    async fn fork_is_ready(&self, fork_repo: &str) -> Result<bool, GitHubError> {
        let repo = self.api.get(&format!("/repos/{fork_repo}"), &[]).await?;
        if repo.status != 200 {
            return Ok(false);
        }

        let branches = self
            .api
            .get(&format!("/repos/{fork_repo}/branches"), &[])
            .await?;
        Ok(branches.status == 200
            && branches
                .body
                .as_array()
                .is_some_and(|list| !list.is_empty()))
    }

    /// Fast-forward the fork's default branch from upstream.
    ///
    /// Best effort: `true` when merged or already current (409), `false`
    /// on any other outcome. Never fails the caller.
    pub async fn sync_fork(&self, fork_repo: &str, upstream_repo: &str) -> bool {
        let branch = match self.api.default_branch(upstream_repo).await {
            Ok(branch) => branch,
            Err(err) => {
                warn!(upstream_repo, error = %err, "could not read upstream default branch for sync");
                return false;
            }
        };

        let response = match self
            .api
            .post(
                &format!("/repos/{fork_repo}/merge-upstream"),
                &json!({ "branch": branch }),
            )
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(fork_repo, error = %err, "could not sync fork");
                return false;
            }
        };

        match response.status {
            200 => {
                info!(fork_repo, %branch, "fork synced with upstream");
                true
            }
            409 => {
                debug!(fork_repo, %branch, "fork already up to date");
                true
            }
            status => {
                warn!(fork_repo, status, "could not sync fork");
                false
            }
        }
    }
}
