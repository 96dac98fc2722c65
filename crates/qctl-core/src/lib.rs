//! # qctl-core
//!
//! A durable, single-node, multi-worker background job queue.
//!
//! ## Architecture
//!
//! ```text
//! Admin API ──────► Store (mutations)
//!
//! Supervisor ──► Worker pool ──► (Store: claim) ──► Executor ──► (Store: finalize)
//!
//! Dashboard (external) ──► Admin API (read-only queries)
//! ```
//!
//! The durable job store and its atomic claim protocol, plus the worker
//! runtime that drives jobs through the store's state machine under
//! concurrent, crash-prone conditions, are the core of this crate. Storage
//! is backend-agnostic here: `qctl-store-sqlite` provides the concrete
//! `JobStore` implementation this crate's types are written against.
//!
//! ## Key invariants
//!
//! 1. A job is in exactly one state; `completed` and `dead` are terminal.
//! 2. `claimed_by` is set iff `state = processing`.
//! 3. `attempts <= max_retries + 1` always holds.
//! 4. `updated_at` is monotonic non-decreasing per job.
//! 5. Claim atomicity: two concurrent claimants never observe the same
//!    eligible job.

mod admin;
mod config;
mod error;
mod executor;
mod job;
mod process_group;
mod shutdown;
mod store;
mod supervisor;
mod worker;

pub use admin::AdminApi;
pub use config::{
    default_value, validate, ResolvedConfig, BACKOFF_BASE, DEFAULT_TIMEOUT, MAX_RETRIES,
    POLL_INTERVAL_MS, RECOGNIZED_KEYS,
};
pub use error::{Categorizable, QctlError, Result};
pub use executor::{default_log_dir, ExecutionOutcome, Executor, FileLogSink, LogSink, KILL_GRACE};
pub use job::{Job, JobSpec, JobState};
pub use process_group::process_exists;
pub use shutdown::Shutdown;
pub use store::{JobStore, ListFilter, PurgePredicate, SupervisorRecord};
pub use supervisor::{Supervisor, SupervisorStatus, STOP_TIMEOUT};
pub use worker::Worker;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn job_state_round_trips_through_str() {
        for state in [
            JobState::Pending,
            JobState::Processing,
            JobState::Completed,
            JobState::Dead,
        ] {
            assert_eq!(JobState::parse(state.as_str()), Some(state));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_wakes_cancellable_sleep_immediately() {
        let shutdown = Shutdown::new();
        let start = tokio::time::Instant::now();

        let shutdown_ref = std::sync::Arc::new(shutdown);
        let waiter = shutdown_ref.clone();
        let handle = tokio::spawn(async move {
            waiter.cancellable_sleep(Duration::from_secs(30)).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_ref.request();
        handle.await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
