use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a scheduled job does when it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// Deliver one reminder occurrence. The `(reminder_id, occurrence_utc)`
    /// pair is the idempotence key — re-enqueueing the same occurrence is
    /// a no-op.
    ReminderDelivery {
        reminder_id: String,
        user_id: String,
        occurrence_utc: DateTime<Utc>,
    },
    /// Send one user their morning summary.
    MorningSummary { user_id: String },
    /// Once-a-day fan-out that schedules the per-user morning summaries
    /// and re-enqueues itself for the next day.
    DailyRollout,
}

/// Lifecycle state of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its run_at time.
    Pending,
    /// Handed to the worker pool.
    Running,
    /// Finished successfully.
    Completed,
    /// Exhausted its attempts.
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A persisted queue entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// UUIDv7 string — primary key.
    pub id: String,
    pub kind: JobKind,
    /// When the job becomes due.
    pub run_at_utc: DateTime<Utc>,
    pub status: JobStatus,
    /// Completed delivery attempts so far.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
