//! Job status transitions.

use chrono::{DateTime, Utc};
use runner_core::state::JobStatus;
use runner_core::types::Job;

#[derive(Debug, thiserror::Error)]
pub enum StateMachineError {
    #[error("invalid job status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: JobStatus,
    pub to: JobStatus,
    pub at: DateTime<Utc>,
}

/// Move a job to a new status.
///
/// `at` is clamped so `updated_at` never falls behind `created_at` or the
/// previous `updated_at`.
pub fn transition_job(
    job: &mut Job,
    to: JobStatus,
    at: DateTime<Utc>,
) -> Result<StateTransition, StateMachineError> {
    let from = job.status;
    if !is_transition_allowed(from, to) {
        return Err(StateMachineError::InvalidTransition { from, to });
    }

    let at = at.max(job.updated_at).max(job.created_at);
    job.status = to;
    job.updated_at = at;

    Ok(StateTransition { from, to, at })
}

/// Move a job to `Failed` and record why.
pub fn fail_job(
    job: &mut Job,
    error: impl Into<String>,
    at: DateTime<Utc>,
) -> Result<StateTransition, StateMachineError> {
    let transition = transition_job(job, JobStatus::Failed, at)?;
    job.error = Some(error.into());
    Ok(transition)
}

/// Move a job to `Completed`. `pr_url` is `None` when the run produced no
/// changes.
pub fn complete_job(
    job: &mut Job,
    pr_url: Option<String>,
    at: DateTime<Utc>,
) -> Result<StateTransition, StateMachineError> {
    let transition = transition_job(job, JobStatus::Completed, at)?;
    job.pr_url = pr_url;
    Ok(transition)
}

pub fn cancel_job(job: &mut Job, at: DateTime<Utc>) -> Result<StateTransition, StateMachineError> {
    transition_job(job, JobStatus::Cancelled, at)
}

/// Check if a status transition is valid.
///
/// ```text
/// Pending → Forking → ForkReady → Triggered → Running → Completed
///              ↓          ↓           ↓          ↓
///              └──────────┴───────────┴──────────┴──→ Failed
/// ```
///
/// Any non-terminal status may be cancelled. Terminal statuses never move,
/// not even to themselves.
pub fn is_transition_allowed(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;

    if from.is_terminal() {
        return false;
    }

    match (from, to) {
        (Pending, Forking) => true,
        (Forking, ForkReady) => true,
        (ForkReady, Triggered) => true,
        (Triggered, Running) => true,
        (Running, Completed) => true,
        (Forking | ForkReady | Triggered | Running, Failed) => true,
        (_, Cancelled) => true,
        _ => false,
    }
}
