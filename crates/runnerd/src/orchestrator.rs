//! Drives one job from fork to callback.
//!
//! The orchestrator is the only writer of a [`Job`]. Remote failures are
//! recorded on the job (status `Failed` plus `error`) instead of being
//! returned; the `Err` side is reserved for calls that are invalid for the
//! job's current status.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use runner_core::config::{RunnerConfig, RunnerSecrets};
use runner_core::state::JobStatus;
use runner_core::types::{Job, JobId, RepoSlug, RepoSlugError, WorkflowReport};
use runner_github::{
    DispatchInputs, ForkManager, ForkSettings, GitHubApi, GitHubClient, GitHubError,
    PullRequestReconciler, WorkflowDispatcher, WorkflowSettings,
};
use runner_notify::{payload_for_job, CallbackNotifier, CallbackSigner, DeliveryOutcome, RetryPolicy};

use crate::state_machine::{
    cancel_job, complete_job, fail_job, transition_job, StateMachineError,
};

const PR_TITLE_PREFIX: &str = "bot: ";
const PR_TITLE_PROMPT_CHARS: usize = 60;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    StateMachine(#[from] StateMachineError),
    #[error(transparent)]
    InvalidRepo(#[from] RepoSlugError),
}

/// `bot: <first 60 characters of the prompt>`, on one line.
pub fn pr_title(prompt: &str) -> String {
    let first_line = prompt.trim().lines().next().unwrap_or_default();
    let summary: String = first_line.chars().take(PR_TITLE_PROMPT_CHARS).collect();
    format!("{PR_TITLE_PREFIX}{}", summary.trim_end())
}

pub fn pr_body(job_id: &JobId, prompt: &str) -> String {
    let quoted = prompt
        .trim()
        .lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("Automated change for job `{job_id}`.\n\nPrompt:\n\n{quoted}\n")
}

pub struct JobOrchestrator {
    forks: ForkManager,
    dispatcher: WorkflowDispatcher,
    pulls: PullRequestReconciler,
    notifier: CallbackNotifier,
    client: Option<Arc<GitHubClient>>,
}

impl JobOrchestrator {
    pub fn new(
        forks: ForkManager,
        dispatcher: WorkflowDispatcher,
        pulls: PullRequestReconciler,
        notifier: CallbackNotifier,
    ) -> Self {
        Self {
            forks,
            dispatcher,
            pulls,
            notifier,
            client: None,
        }
    }

    /// Wire every component from configuration against one shared API
    /// handle. Each component gets its timeouts and retry limits here rather
    /// than from process-wide defaults.
    pub fn with_api(
        api: Arc<dyn GitHubApi>,
        config: &RunnerConfig,
        webhook_secret: Option<String>,
    ) -> Self {
        let forks = ForkManager::new(
            api.clone(),
            ForkSettings {
                bot_username: config.github.bot_username.clone(),
                ready_timeout: config.fork.ready_timeout(),
                poll_interval: config.fork.poll_interval(),
            },
        );
        let dispatcher = WorkflowDispatcher::new(
            api.clone(),
            WorkflowSettings {
                runner_repo: config.github.runner_repo.clone(),
                workflow_file: config.github.workflow_file.clone(),
                workflow_ref: config.github.workflow_ref.clone(),
            },
        );
        let pulls = PullRequestReconciler::new(api);
        let notifier = CallbackNotifier::new(
            CallbackSigner::new(webhook_secret).allow_insecure(config.callback.allow_insecure),
            RetryPolicy {
                timeout: config.callback.timeout(),
                max_attempts: config.callback.max_attempts,
                backoff: config.callback.backoff(),
            },
        );
        Self::new(forks, dispatcher, pulls, notifier)
    }

    /// Like [`JobOrchestrator::with_api`] over a [`GitHubClient`] the
    /// orchestrator owns; [`JobOrchestrator::close`] releases its pool.
    pub fn from_config(config: &RunnerConfig, secrets: &RunnerSecrets) -> Self {
        let client = Arc::new(
            GitHubClient::with_base_url(
                config.github.api_base.as_str(),
                secrets.bot_token.as_str(),
                config.github.request_timeout(),
            )
            .with_api_version(config.github.api_version.as_str()),
        );
        let mut orchestrator =
            Self::with_api(client.clone(), config, secrets.webhook_secret.clone());
        orchestrator.client = Some(client);
        orchestrator
    }

    /// Whether callbacks carry an `X-Signature-256` header.
    pub fn signs_callbacks(&self) -> bool {
        self.notifier.signer().has_secret()
    }

    /// Release the owned API connection pool. A no-op for orchestrators
    /// built with [`JobOrchestrator::with_api`], whose caller owns the handle.
    pub fn close(&self) {
        if let Some(client) = &self.client {
            client.close();
        }
    }

    /// Create a `Pending` job. The upstream identifier is checked up front so
    /// a malformed one never reaches the remote API.
    pub fn new_job(
        &self,
        upstream_repo: &str,
        prompt: &str,
        callback_url: Option<String>,
    ) -> Result<Job, OrchestratorError> {
        let upstream = RepoSlug::parse(upstream_repo)?;
        let job = Job::new(JobId::generate(), upstream.to_string(), prompt, callback_url);
        info!(job_id = %job.job_id, upstream_repo = %upstream, "job created");
        Ok(job)
    }

    /// Fork, then dispatch. Leaves the job `Triggered` on success or
    /// `Failed` (with a failure callback) on the first error.
    pub async fn start(&self, job: &mut Job) -> Result<(), OrchestratorError> {
        transition_job(job, JobStatus::Forking, Utc::now())?;
        info!(job_id = %job.job_id, upstream_repo = %job.upstream_repo, "forking upstream");

        let fork = match self.forks.create_or_get_fork(&job.upstream_repo).await {
            Ok(fork) => fork,
            Err(err) => return self.fail_remote(job, "fork failed", err).await,
        };
        job.fork_repo = Some(fork.to_string());
        transition_job(job, JobStatus::ForkReady, Utc::now())?;

        let inputs = DispatchInputs {
            fork_repo: fork.to_string(),
            upstream_repo: job.upstream_repo.clone(),
            prompt: job.prompt.clone(),
            job_id: job.job_id.to_string(),
            callback_url: job.callback_url.clone(),
        };
        if let Err(err) = self.dispatcher.dispatch(&inputs).await {
            return self.fail_remote(job, "workflow dispatch failed", err).await;
        }

        transition_job(job, JobStatus::Triggered, Utc::now())?;
        info!(job_id = %job.job_id, fork_repo = %fork, "workflow triggered");
        Ok(())
    }

    /// Record that the remote workflow picked the job up.
    pub fn mark_running(
        &self,
        job: &mut Job,
        workflow_run_id: Option<u64>,
    ) -> Result<(), OrchestratorError> {
        transition_job(job, JobStatus::Running, Utc::now())?;
        if workflow_run_id.is_some() {
            job.workflow_run_id = workflow_run_id;
        }
        info!(job_id = %job.job_id, workflow_run_id = ?job.workflow_run_id, "workflow running");
        Ok(())
    }

    /// Apply the workflow's final report: open (or find) the pull request when
    /// there are changes, then settle the job and send its callback.
    ///
    /// A `Triggered` job whose running report was never observed is moved
    /// through `Running` first.
    pub async fn finish(
        &self,
        job: &mut Job,
        report: WorkflowReport,
    ) -> Result<(), OrchestratorError> {
        if job.status == JobStatus::Triggered {
            transition_job(job, JobStatus::Running, Utc::now())?;
        }
        if job.status != JobStatus::Running {
            return Err(StateMachineError::InvalidTransition {
                from: job.status,
                to: JobStatus::Completed,
            }
            .into());
        }

        match report {
            WorkflowReport::Failed { error } => self.fail(job, error).await,
            WorkflowReport::Succeeded {
                branch,
                has_changes,
            } => {
                job.branch = Some(branch.clone());
                if !has_changes {
                    info!(job_id = %job.job_id, %branch, "no changes; completing without a pull request");
                    return self.complete(job, None).await;
                }
                let Some(fork_repo) = job.fork_repo.clone() else {
                    return self.fail(job, "job has no fork repository").await;
                };

                let title = pr_title(&job.prompt);
                let body = pr_body(&job.job_id, &job.prompt);
                match self
                    .pulls
                    .create_pr(&job.upstream_repo, &fork_repo, &branch, &title, &body)
                    .await
                {
                    Ok(pr_url) => self.complete(job, Some(pr_url)).await,
                    Err(err) => self.fail_remote(job, "pull request failed", err).await,
                }
            }
        }
    }

    /// Cancel a job that has not finished. No callback is sent.
    pub fn cancel(&self, job: &mut Job) -> Result<(), OrchestratorError> {
        cancel_job(job, Utc::now())?;
        warn!(job_id = %job.job_id, "job cancelled");
        Ok(())
    }

    async fn complete(
        &self,
        job: &mut Job,
        pr_url: Option<String>,
    ) -> Result<(), OrchestratorError> {
        complete_job(job, pr_url, Utc::now())?;
        info!(job_id = %job.job_id, pr_url = job.pr_url.as_deref().unwrap_or(""), "job completed");
        self.notify(job).await;
        Ok(())
    }

    async fn fail(&self, job: &mut Job, reason: impl Into<String>) -> Result<(), OrchestratorError> {
        fail_job(job, reason, Utc::now())?;
        error!(job_id = %job.job_id, error = job.error.as_deref().unwrap_or(""), "job failed");
        self.notify(job).await;
        Ok(())
    }

    async fn fail_remote(
        &self,
        job: &mut Job,
        step: &str,
        err: GitHubError,
    ) -> Result<(), OrchestratorError> {
        warn!(
            job_id = %job.job_id,
            step,
            status = ?err.status(),
            transient = err.is_transient(),
            "GitHub API call failed"
        );
        self.fail(job, format!("{step}: {err}")).await
    }

    /// One delivery sequence per terminal job. The outcome is logged and
    /// never changes the job.
    async fn notify(&self, job: &Job) -> DeliveryOutcome {
        let Some(payload) = payload_for_job(job) else {
            return DeliveryOutcome::Skipped;
        };
        let url = job.callback_url.as_deref().unwrap_or_default();
        let outcome = self.notifier.send_callback(url, &payload).await;
        if let DeliveryOutcome::Failed { attempts, last_error } = &outcome {
            warn!(job_id = %job.job_id, attempts, error = %last_error, "callback not delivered");
        }
        outcome
    }
}
