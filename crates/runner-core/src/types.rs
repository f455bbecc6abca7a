//! Core types shared by every runner crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::JobStatus;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random v4 identifier for callers that did not supply one.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid repository '{value}': expected owner/name")]
pub struct RepoSlugError {
    pub value: String,
}

/// A repository identifier of the form `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoSlug {
    owner: String,
    name: String,
}

impl RepoSlug {
    pub fn parse(value: &str) -> Result<Self, RepoSlugError> {
        let invalid = || RepoSlugError {
            value: value.to_string(),
        };
        let (owner, name) = value.split_once('/').ok_or_else(invalid)?;
        if !is_valid_segment(owner) || !is_valid_segment(name) {
            return Err(invalid());
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fork this bot account would own for this repository.
    ///
    /// Derived on every call; whether the fork exists is remote state.
    pub fn fork_for(&self, bot_username: &str) -> RepoSlug {
        RepoSlug {
            owner: bot_username.to_string(),
            name: self.name.clone(),
        }
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl std::fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl std::str::FromStr for RepoSlug {
    type Err = RepoSlugError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        RepoSlug::parse(value)
    }
}

impl TryFrom<String> for RepoSlug {
    type Error = RepoSlugError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RepoSlug::parse(&value)
    }
}

impl From<RepoSlug> for String {
    fn from(value: RepoSlug) -> Self {
        value.to_string()
    }
}

/// A single fork → workflow → pull request run.
///
/// Only the orchestrator mutates a job. `status` and `updated_at` are
/// written together, and `error` is present exactly when the job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub upstream_repo: String,
    pub prompt: String,
    #[serde(default)]
    pub callback_url: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub fork_repo: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub pr_url: Option<String>,
    #[serde(default)]
    pub workflow_run_id: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        job_id: JobId,
        upstream_repo: impl Into<String>,
        prompt: impl Into<String>,
        callback_url: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            upstream_repo: upstream_repo.into(),
            prompt: prompt.into(),
            callback_url: callback_url.filter(|url| !url.trim().is_empty()),
            status: JobStatus::Pending,
            fork_repo: None,
            branch: None,
            pr_url: None,
            workflow_run_id: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Final report of the remote workflow, observed out-of-band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkflowReport {
    /// The agent ran; `has_changes` is false when nothing was committed
    /// ahead of the upstream base.
    Succeeded { branch: String, has_changes: bool },
    Failed { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_slug_parses_owner_and_name() {
        let slug = RepoSlug::parse("octo/demo").expect("valid slug");
        assert_eq!(slug.owner(), "octo");
        assert_eq!(slug.name(), "demo");
        assert_eq!(slug.to_string(), "octo/demo");
    }

    #[test]
    fn repo_slug_rejects_malformed_values() {
        for bad in [
            "",
            "octo",
            "/demo",
            "octo/",
            "octo/demo/extra",
            "octo demo/x",
            "octo/de mo",
        ] {
            let err = RepoSlug::parse(bad).expect_err(bad);
            assert_eq!(err.value, bad);
        }
    }

    #[test]
    fn repo_slug_accepts_dots_dashes_underscores() {
        let slug = RepoSlug::parse("my-org/my_repo.rs").expect("valid slug");
        assert_eq!(slug.name(), "my_repo.rs");
    }

    #[test]
    fn fork_for_swaps_owner_for_bot() {
        let upstream = RepoSlug::parse("octo/demo").unwrap();
        assert_eq!(upstream.fork_for("agent-bot").to_string(), "agent-bot/demo");
    }

    #[test]
    fn repo_slug_serializes_as_plain_string() {
        let slug = RepoSlug::parse("octo/demo").unwrap();
        assert_eq!(serde_json::to_string(&slug).unwrap(), "\"octo/demo\"");
        let err = serde_json::from_str::<RepoSlug>("\"nope\"").unwrap_err();
        assert!(err.to_string().contains("expected owner/name"));
    }

    #[test]
    fn new_job_starts_pending_with_equal_timestamps() {
        let job = Job::new(JobId::new("J1"), "octo/demo", "fix typo", None);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.created_at, job.updated_at);
        assert!(job.error.is_none());
        assert!(job.pr_url.is_none());
    }

    #[test]
    fn new_job_drops_blank_callback_url() {
        let job = Job::new(
            JobId::new("J1"),
            "octo/demo",
            "fix typo",
            Some("  ".to_string()),
        );
        assert!(job.callback_url.is_none());
    }

    #[test]
    fn generated_job_ids_are_unique() {
        assert_ne!(JobId::generate(), JobId::generate());
    }

    #[test]
    fn job_json_snapshot_roundtrip() {
        let mut job = Job::new(
            JobId::new("J1"),
            "octo/demo",
            "fix typo",
            Some("https://ci.example/hook".to_string()),
        );
        job.status = JobStatus::Triggered;
        job.fork_repo = Some("agent-bot/demo".to_string());

        let encoded = serde_json::to_string(&job).expect("serialize job");
        assert!(encoded.contains("\"status\":\"triggered\""));
        let decoded: Job = serde_json::from_str(&encoded).expect("deserialize job");
        assert_eq!(decoded, job);
    }

    #[test]
    fn workflow_report_is_tagged_by_outcome() {
        let report: WorkflowReport =
            serde_json::from_str(r#"{"outcome":"succeeded","branch":"bot/j1","has_changes":false}"#)
                .expect("decode report");
        assert_eq!(
            report,
            WorkflowReport::Succeeded {
                branch: "bot/j1".to_string(),
                has_changes: false
            }
        );
    }
}
