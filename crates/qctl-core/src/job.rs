//! The `Job` entity and the user-supplied spec used to create one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A job's position in its state machine.
///
/// `failed` from the original design is deliberately not a variant here: a
/// job that has failed but still has retries left is represented as
/// `Pending` with `attempts > 0` (see `Job::is_retry_pending`). Only
/// `Completed` and `Dead` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Dead,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobState::Pending),
            "processing" => Some(JobState::Processing),
            "completed" => Some(JobState::Completed),
            "dead" => Some(JobState::Dead),
            _ => None,
        }
    }
}

/// A durable unit of work: a shell command plus scheduling and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub command: String,
    pub priority: i64,
    pub max_retries: i64,
    pub attempts: i64,
    pub timeout_seconds: i64,
    pub run_at: DateTime<Utc>,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub last_error: Option<String>,
    pub exit_code: Option<i64>,
}

impl Job {
    /// True when this job represents a "failed, retry scheduled" job per the
    /// design's treatment of `failed` as a synonym for pending-with-attempts.
    pub fn is_retry_pending(&self) -> bool {
        self.state == JobState::Pending && self.attempts > 0
    }
}

/// User-supplied payload for `Store::enqueue`, as decoded from the CLI's JSON
/// job spec (see the External Interfaces section of the spec). Unknown keys
/// are rejected at this boundary rather than silently ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub max_retries: Option<i64>,
    #[serde(default)]
    pub timeout_seconds: Option<i64>,
    #[serde(default)]
    pub run_at: Option<DateTime<Utc>>,
}
