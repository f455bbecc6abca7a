//! Job status model.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a job.
///
/// ```text
/// Pending → Forking → ForkReady → Triggered → Running → Completed
///              ↓          ↓           ↓          ↓
///              └──────────┴───────────┴──────────┴──→ Failed
/// ```
///
/// `Cancelled` is reachable from every non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job created, not yet started
    #[default]
    Pending,
    /// Locating or creating the fork
    Forking,
    /// Fork exists and is clonable
    ForkReady,
    /// Remote workflow dispatched
    Triggered,
    /// Remote workflow reported that it is running
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 8] = [
        JobStatus::Pending,
        JobStatus::Forking,
        JobStatus::ForkReady,
        JobStatus::Triggered,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Forking => "forking",
            JobStatus::ForkReady => "fork_ready",
            JobStatus::Triggered => "triggered",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Returns true if no further transition can leave this status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Returns true for the two statuses that carry a callback.
    pub fn notifies_callback(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_lowercase();
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "invalid job status '{wanted}'. valid values: pending, forking, fork_ready, \
                     triggered, running, completed, failed, cancelled"
                )
            })
    }
}
