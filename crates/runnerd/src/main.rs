use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{error, warn};

use runner_core::config::{
    load_runner_config, resolve_secrets, save_runner_config, RunnerConfig, RunnerSecrets,
};
use runner_core::state::JobStatus;
use runner_core::types::{Job, WorkflowReport};
use runner_core::validation::{Validate, ValidationLevel};
use runner_notify::CallbackSigner;
use runnerd::{init_logging, load_job, save_job, JobOrchestrator, DEFAULT_LOG_FILTER};

const DEFAULT_CONFIG_PATH: &str = "config/runner.toml";

#[derive(Parser, Debug)]
#[command(name = "runnerd")]
#[command(about = "Fork a repository, run the agent workflow, and open the resulting pull request")]
struct Cli {
    /// Runner configuration (TOML). Built-in defaults apply when absent.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = DEFAULT_LOG_FILTER)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a job, fork the upstream and dispatch the workflow
    Start {
        #[arg(long)]
        upstream: String,
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        callback_url: Option<String>,
        /// Where to write the job snapshot. Defaults to `jobs/<job_id>.json`.
        #[arg(long)]
        job_file: Option<PathBuf>,
    },
    /// Record that the workflow run started
    Running {
        #[arg(long)]
        job_file: PathBuf,
        #[arg(long)]
        run_id: Option<u64>,
    },
    /// Apply the workflow's final report and send the callback
    Finish {
        #[arg(long)]
        job_file: PathBuf,
        /// Branch the workflow pushed to the fork
        #[arg(long, required_unless_present = "error", conflicts_with = "error")]
        branch: Option<String>,
        /// The workflow committed nothing; complete without a pull request
        #[arg(long, requires = "branch")]
        no_changes: bool,
        /// The workflow failed with this message
        #[arg(long)]
        error: Option<String>,
    },
    /// Cancel an unfinished job
    Cancel {
        #[arg(long)]
        job_file: PathBuf,
    },
    /// Check an `X-Signature-256` header against a payload file
    VerifySignature {
        #[arg(long)]
        payload_file: PathBuf,
        #[arg(long)]
        signature: String,
    },
    /// Validate the configuration and print any issues
    CheckConfig,
    /// Write the built-in defaults to the configuration path
    InitConfig {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    // `init-config` may be replacing a file that no longer parses.
    let config = match cli.command {
        Command::InitConfig { .. } => RunnerConfig::default(),
        _ => load_config(&cli.config)?,
    };
    if cli_requires_valid_config(&cli.command) {
        ensure_valid(&config)?;
    }

    match cli.command {
        Command::Start {
            upstream,
            prompt,
            callback_url,
            job_file,
        } => {
            let orchestrator = build_orchestrator(&config, true)?;
            let mut job = orchestrator.new_job(&upstream, &prompt, callback_url)?;
            let path = job_file.unwrap_or_else(|| default_job_path(&job));
            save_job(&path, &job)?;
            let started = orchestrator.start(&mut job).await;
            orchestrator.close();
            started?;
            save_job(&path, &job)?;
            Ok(report(&job, &path))
        }
        Command::Running { job_file, run_id } => {
            let orchestrator = build_orchestrator(&config, false)?;
            let mut job = load_job(&job_file)?;
            orchestrator.mark_running(&mut job, run_id)?;
            save_job(&job_file, &job)?;
            Ok(report(&job, &job_file))
        }
        Command::Finish {
            job_file,
            branch,
            no_changes,
            error,
        } => {
            let workflow_report = match (branch, error) {
                (_, Some(error)) => WorkflowReport::Failed { error },
                (Some(branch), None) => WorkflowReport::Succeeded {
                    branch,
                    has_changes: !no_changes,
                },
                (None, None) => bail!("either --branch or --error is required"),
            };
            let orchestrator = build_orchestrator(&config, true)?;
            let mut job = load_job(&job_file)?;
            let finished = orchestrator.finish(&mut job, workflow_report).await;
            orchestrator.close();
            finished?;
            save_job(&job_file, &job)?;
            Ok(report(&job, &job_file))
        }
        Command::Cancel { job_file } => {
            let orchestrator = build_orchestrator(&config, false)?;
            let mut job = load_job(&job_file)?;
            orchestrator.cancel(&mut job)?;
            save_job(&job_file, &job)?;
            Ok(report(&job, &job_file))
        }
        Command::VerifySignature {
            payload_file,
            signature,
        } => {
            let payload = fs::read(&payload_file)
                .with_context(|| format!("failed to read {}", payload_file.display()))?;
            let secret = std::env::var(&config.callback.secret_env).ok();
            let signer =
                CallbackSigner::new(secret).allow_insecure(config.callback.allow_insecure);
            if signer.verify_signature(&payload, &signature) {
                println!("signature valid");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("signature invalid");
                Ok(ExitCode::FAILURE)
            }
        }
        Command::CheckConfig => {
            let issues = config.validate();
            for issue in &issues {
                let level = match issue.level {
                    ValidationLevel::Error => "error",
                    ValidationLevel::Warning => "warning",
                };
                println!("{level}: {} ({})", issue.message, issue.code);
            }
            if issues
                .iter()
                .any(|issue| issue.level == ValidationLevel::Error)
            {
                return Ok(ExitCode::FAILURE);
            }
            println!("config ok: {}", cli.config.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::InitConfig { force } => {
            init_config(&cli.config, force)?;
            println!("wrote default config: {}", cli.config.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<RunnerConfig> {
    if !path.exists() {
        warn!(path = %path.display(), "config file not found; using defaults");
        return Ok(RunnerConfig::default());
    }
    Ok(load_runner_config(path)?)
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to replace it", path.display());
    }
    save_runner_config(path, &RunnerConfig::default())?;
    Ok(())
}

fn cli_requires_valid_config(command: &Command) -> bool {
    !matches!(
        command,
        Command::CheckConfig | Command::VerifySignature { .. } | Command::InitConfig { .. }
    )
}

fn ensure_valid(config: &RunnerConfig) -> anyhow::Result<()> {
    let mut errors = Vec::new();
    for issue in config.validate() {
        match issue.level {
            ValidationLevel::Warning => warn!(code = issue.code, "{}", issue.message),
            ValidationLevel::Error => {
                error!(code = issue.code, "{}", issue.message);
                errors.push(issue.code);
            }
        }
    }
    if !errors.is_empty() {
        bail!("invalid configuration: {}", errors.join(", "));
    }
    Ok(())
}

/// `running` and `cancel` never reach the remote API, so they work without
/// a bot token.
fn build_orchestrator(config: &RunnerConfig, needs_token: bool) -> anyhow::Result<JobOrchestrator> {
    let secrets = match resolve_secrets(config) {
        Ok(secrets) => secrets,
        Err(err) if needs_token => return Err(err.into()),
        Err(_) => RunnerSecrets {
            bot_token: String::new(),
            webhook_secret: None,
        },
    };
    let orchestrator = JobOrchestrator::from_config(config, &secrets);
    if !orchestrator.signs_callbacks() {
        warn!(
            env = %config.callback.secret_env,
            "no webhook secret configured; callbacks will be unsigned"
        );
    }
    Ok(orchestrator)
}

fn default_job_path(job: &Job) -> PathBuf {
    PathBuf::from("jobs").join(format!("{}.json", job.job_id))
}

fn report(job: &Job, path: &Path) -> ExitCode {
    println!("{} {} ({})", job.job_id, job.status, path.display());
    if let Some(pr_url) = &job.pr_url {
        println!("pull request: {pr_url}");
    }
    if let Some(error) = &job.error {
        println!("error: {error}");
    }
    if job.status == JobStatus::Failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
