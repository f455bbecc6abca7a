//! Validation for runner configuration.

use serde::{Deserialize, Serialize};

use crate::config::RunnerConfig;
use crate::types::RepoSlug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: &'static str,
    pub message: String,
}

pub trait Validate {
    fn validate(&self) -> Vec<ValidationIssue>;
}

impl Validate for RunnerConfig {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        let api_base = self.github.api_base.trim();
        if !api_base.starts_with("http://") && !api_base.starts_with("https://") {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "github.api_base.invalid",
                message: format!("api_base must start with http:// or https:// (got '{api_base}')"),
            });
        }

        if self.github.bot_username.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "github.bot_username.empty",
                message: "bot_username is empty; fork paths cannot be derived".to_string(),
            });
        }

        if RepoSlug::parse(&self.github.runner_repo).is_err() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "github.runner_repo.invalid",
                message: format!(
                    "runner_repo '{}' is not of the form owner/name",
                    self.github.runner_repo
                ),
            });
        }

        if self.github.workflow_file.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "github.workflow_file.empty",
                message: "workflow_file must name the workflow to dispatch".to_string(),
            });
        }

        if self.github.request_timeout_secs == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "github.request_timeout.zero",
                message: "request timeout cannot be 0".to_string(),
            });
        }

        if self.fork.poll_interval_secs == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "fork.poll_interval.zero",
                message: "fork poll interval cannot be 0".to_string(),
            });
        } else if self.fork.poll_interval_secs > self.fork.ready_timeout_secs {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "fork.poll_interval.exceeds_timeout",
                message: format!(
                    "poll interval {}s exceeds ready timeout {}s; readiness is checked at most once",
                    self.fork.poll_interval_secs, self.fork.ready_timeout_secs
                ),
            });
        }

        if self.callback.max_attempts == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "callback.max_attempts.zero",
                message: "callback max_attempts must be at least 1".to_string(),
            });
        }

        if self.callback.allow_insecure {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "callback.allow_insecure",
                message: "unsigned webhooks are accepted when no secret is configured".to_string(),
            });
        }

        issues
    }
}
