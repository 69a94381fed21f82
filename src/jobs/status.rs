use std::fmt;

use alloy::primitives::BlockNumber;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a job: `queued -> running -> finished | error | cancelled`.
///
/// A queued job may also be cancelled before it starts. Terminal states are final.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Finished,
    Error,
    Cancelled,
}

impl JobState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Finished | JobState::Error | JobState::Cancelled)
    }

    #[must_use]
    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Running | JobState::Cancelled)
                | (JobState::Running, JobState::Finished | JobState::Error | JobState::Cancelled)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Finished => "finished",
            JobState::Error => "error",
            JobState::Cancelled => "cancelled",
        })
    }
}

/// Live counters of a running job.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub chunks_completed: u64,
    pub events_written: u64,
    pub last_processed_block: Option<BlockNumber>,
}

/// Point-in-time view of a job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    #[serde(rename = "status")]
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub progress: JobProgress,
}

impl JobStatus {
    #[must_use]
    pub fn queued(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            state: JobState::Queued,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            progress: JobProgress::default(),
        }
    }

    /// Moves to `next` if the lifecycle allows it. Entering a terminal state stamps the finish
    /// time; `error` is kept only for [`JobState::Error`].
    pub fn transition(&mut self, next: JobState, error: Option<String>) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        if next == JobState::Error {
            self.error = Some(error.unwrap_or_else(|| "unknown error".to_owned()));
        }
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        true
    }
}

/// Result of a cancel request on a known job.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was queued or running and is now cancelled.
    Cancelled,
    /// The job had already ended in the given state; nothing changed.
    AlreadyTerminal(JobState),
}
