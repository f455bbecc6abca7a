//! Map terminal jobs to callback payloads.

use runner_core::state::JobStatus;
use runner_core::types::Job;

use crate::types::CallbackPayload;

/// Build the webhook body for a job, if its status carries one.
///
/// Only `Completed` and `Failed` notify; cancellation and every in-flight
/// status map to `None`.
pub fn payload_for_job(job: &Job) -> Option<CallbackPayload> {
    match job.status {
        JobStatus::Completed => Some(CallbackPayload::completed(
            job.job_id.to_string(),
            job.upstream_repo.clone(),
            job.fork_repo.clone(),
            job.branch.clone(),
            job.pr_url.clone(),
        )),
        JobStatus::Failed => Some(CallbackPayload::failed(
            job.job_id.to_string(),
            job.upstream_repo.clone(),
            job.fork_repo.clone(),
            job.error
                .clone()
                .unwrap_or_else(|| "job failed".to_string()),
        )),
        _ => None,
    }
}
