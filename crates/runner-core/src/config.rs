//! Runner configuration file model.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_API_VERSION: &str = "2022-11-28";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config at {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to create config parent directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("required environment variable {name} is not set")]
    MissingSecret { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunnerConfig {
    pub github: GithubConfig,
    pub fork: ForkConfig,
    pub callback: CallbackConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_base: String,
    pub api_version: String,
    /// Account that owns the forks.
    pub bot_username: String,
    /// Repository hosting the agent workflow.
    pub runner_repo: String,
    pub workflow_file: String,
    pub workflow_ref: String,
    pub request_timeout_secs: u64,
    /// Name of the environment variable holding the bearer token.
    pub token_env: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            bot_username: "agent-bot".to_string(),
            runner_repo: "agent-bot/agent-runner".to_string(),
            workflow_file: "run.yml".to_string(),
            workflow_ref: "main".to_string(),
            request_timeout_secs: 30,
            token_env: "BOT_TOKEN".to_string(),
        }
    }
}

impl GithubConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForkConfig {
    pub ready_timeout_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for ForkConfig {
    fn default() -> Self {
        Self {
            ready_timeout_secs: 120,
            poll_interval_secs: 5,
        }
    }
}

impl ForkConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_secs: u64,
    /// Accept unsigned webhooks when no secret is configured.
    pub allow_insecure: bool,
    /// Name of the environment variable holding the webhook secret.
    pub secret_env: String,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_attempts: 3,
            backoff_secs: 1,
            allow_insecure: false,
            secret_env: "WEBHOOK_SECRET".to_string(),
        }
    }
}

impl CallbackConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

/// Credentials resolved from the environment; never written to disk.
#[derive(Clone, PartialEq, Eq)]
pub struct RunnerSecrets {
    pub bot_token: String,
    pub webhook_secret: Option<String>,
}

impl std::fmt::Debug for RunnerSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerSecrets")
            .field("bot_token", &"<redacted>")
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

pub fn parse_runner_config(contents: &str) -> Result<RunnerConfig, toml::de::Error> {
    toml::from_str(contents)
}

pub fn load_runner_config(path: impl AsRef<Path>) -> Result<RunnerConfig, ConfigError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    parse_runner_config(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}

pub fn save_runner_config(
    path: impl AsRef<Path>,
    config: &RunnerConfig,
) -> Result<(), ConfigError> {
    let path_ref = path.as_ref();
    if let Some(parent_dir) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent_dir).map_err(|source| ConfigError::CreateDir {
            path: parent_dir.to_path_buf(),
            source,
        })?;
    }

    let body = toml::to_string_pretty(config).map_err(|source| ConfigError::Serialize {
        path: path_ref.to_path_buf(),
        source,
    })?;
    fs::write(path_ref, body).map_err(|source| ConfigError::Write {
        path: path_ref.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Read the bot token and webhook secret from the process environment.
pub fn resolve_secrets(config: &RunnerConfig) -> Result<RunnerSecrets, ConfigError> {
    resolve_secrets_with(config, |name| std::env::var(name).ok())
}

pub fn resolve_secrets_with<F>(config: &RunnerConfig, lookup: F) -> Result<RunnerSecrets, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    let bot_token =
        non_empty(&config.github.token_env).ok_or_else(|| ConfigError::MissingSecret {
            name: config.github.token_env.clone(),
        })?;
    let webhook_secret = non_empty(&config.callback.secret_env);

    Ok(RunnerSecrets {
        bot_token,
        webhook_secret,
    })
}
