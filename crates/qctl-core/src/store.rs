//! The storage contract. `qctl-core` depends only on this trait; the
//! concrete SQLite-backed implementation lives in `qctl-store-sqlite`,
//! mirroring a storage-agnostic core crate with a per-backend adapter crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::ResolvedConfig;
use crate::error::Result;
use crate::job::{Job, JobSpec, JobState};

/// A filter for `Store::list`. `state = None` means "any state"; the
/// `failed` pseudo-state from the design notes is modeled as
/// `retry_pending_only`, since it isn't a real `JobState`.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub state: Option<JobState>,
    pub id_prefix: Option<String>,
    /// When true, additionally restrict to pending jobs with `attempts > 0`
    /// (the "failed" view from the design notes).
    pub retry_pending_only: bool,
}

/// The only purge selector the spec calls for.
#[derive(Debug, Clone, Copy)]
pub enum PurgePredicate {
    Completed,
}

/// The supervisor record: identifies the one supervisor process allowed to
/// run against this store at a time.
#[derive(Debug, Clone)]
pub struct SupervisorRecord {
    pub pid: i64,
    pub started_at: DateTime<Utc>,
    pub worker_count: i64,
    pub shutdown_requested: bool,
}

/// Durable persistence of jobs and config, with transactional claim, state
/// transition, and query operations. Workers and the admin API never mutate
/// job rows directly — every state transition goes through one of these
/// methods.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Validate and insert a new job in `Pending` state. Fails atomically
    /// with `DuplicateId` on id collision, or `InvalidSpec` if a field is
    /// out of range. Defaults absent in `spec` are filled from `config`.
    async fn enqueue(&self, spec: JobSpec, config: &ResolvedConfig, now: DateTime<Utc>) -> Result<String>;

    /// Atomically claim the single highest-priority eligible job, ordered by
    /// `(priority DESC, run_at ASC, created_at ASC)`. Two concurrent callers
    /// must never observe the same job as claimed.
    async fn claim(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>>;

    /// Record a successful execution: `state = completed`, `claimed_by` cleared.
    async fn finalize_success(&self, job_id: &str, exit_code: i64, now: DateTime<Utc>) -> Result<()>;

    /// Record a failed execution. Increments `attempts`; transitions to
    /// `dead` if that exceeds `max_retries`, otherwise reschedules with
    /// exponential backoff.
    async fn finalize_failure(
        &self,
        job_id: &str,
        exit_code: Option<i64>,
        error: &str,
        config: &ResolvedConfig,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Reset a dead job back to pending with `attempts = 0`. `NotFound` if
    /// the id doesn't exist, `NotDead` if it isn't currently dead.
    async fn requeue_dead(&self, job_id: &str, now: DateTime<Utc>) -> Result<()>;

    /// Scan all `processing` rows; for each whose `claimed_by` fails
    /// `is_live`, apply a failure with error `"worker-crashed"`. Returns the
    /// number of jobs reclaimed.
    async fn reclaim_orphans(
        &self,
        config: &ResolvedConfig,
        now: DateTime<Utc>,
        is_live: &(dyn Fn(&str) -> bool + Send + Sync),
    ) -> Result<u64>;

    /// Read-only query, filtered by state and/or id prefix, ordered by
    /// `(priority DESC, run_at ASC)`.
    async fn list(&self, filter: ListFilter) -> Result<Vec<Job>>;

    /// Delete rows matching `predicate`. Returns the count removed.
    async fn purge(&self, predicate: PurgePredicate) -> Result<u64>;

    async fn config_get(&self, key: &str) -> Result<Option<String>>;
    async fn config_set(&self, key: &str, value: &str) -> Result<()>;

    /// Fetch every recognized key, falling back to defaults for unset ones.
    async fn resolved_config(&self) -> Result<ResolvedConfig>;

    /// Register a new supervisor. `AlreadyRunning` if a live one is recorded.
    async fn supervisor_start(&self, pid: i64, worker_count: i64, now: DateTime<Utc>) -> Result<()>;

    /// Clear the supervisor record (called by the supervisor itself on clean shutdown).
    async fn supervisor_clear(&self) -> Result<()>;

    /// Flip the shutdown flag on the recorded supervisor, if any.
    async fn supervisor_request_shutdown(&self) -> Result<()>;

    async fn supervisor_record(&self) -> Result<Option<SupervisorRecord>>;
}
