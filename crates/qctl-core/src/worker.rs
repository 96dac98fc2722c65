//! The claim-execute-finalize loop driven by one worker.
//!
//! Ordering guarantee: within a single worker, the finalize of job N
//! happens-before the claim of job N+1 — the loop body is strictly
//! sequential. Across workers, the store's claim atomicity is the only
//! ordering promised.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::ResolvedConfig;
use crate::executor::{Executor, LogSink};
use crate::shutdown::Shutdown;
use crate::store::JobStore;

pub struct Worker {
    pub id: String,
    store: Arc<dyn JobStore>,
    log_sink: Arc<dyn LogSink>,
    shutdown: Arc<Shutdown>,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        store: Arc<dyn JobStore>,
        log_sink: Arc<dyn LogSink>,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        Self {
            id: id.into(),
            store,
            log_sink,
            shutdown,
        }
    }

    /// Run until shutdown is requested. Re-reads config each iteration so a
    /// `config set` takes effect for the worker's next claim/backoff without
    /// a restart.
    pub async fn run(self) {
        info!(worker_id = %self.id, "worker starting");

        loop {
            if self.shutdown.is_requested() {
                break;
            }

            let config = match self.store.resolved_config().await {
                Ok(c) => c,
                Err(err) => {
                    error!(worker_id = %self.id, error = %err, "failed to read config, using defaults");
                    ResolvedConfig::default()
                }
            };

            match self.store.claim(&self.id, Utc::now()).await {
                Ok(Some(job)) => {
                    debug!(worker_id = %self.id, job_id = %job.id, "claimed job");
                    let outcome = Executor::run(
                        &job.id,
                        &job.command,
                        job.timeout_seconds,
                        self.log_sink.as_ref(),
                        self.shutdown.as_ref(),
                    )
                    .await;

                    if outcome.is_success() {
                        info!(worker_id = %self.id, job_id = %job.id, "job completed");
                        if let Err(err) = self
                            .store
                            .finalize_success(&job.id, outcome.exit_code.unwrap_or(0), Utc::now())
                            .await
                        {
                            error!(worker_id = %self.id, job_id = %job.id, error = %err, "failed to finalize success");
                        }
                    } else {
                        let message = outcome
                            .error
                            .clone()
                            .unwrap_or_else(|| format!("exit code {:?}", outcome.exit_code));
                        warn!(worker_id = %self.id, job_id = %job.id, error = %message, "job failed");
                        if let Err(err) = self
                            .store
                            .finalize_failure(&job.id, outcome.exit_code, &message, &config, Utc::now())
                            .await
                        {
                            error!(worker_id = %self.id, job_id = %job.id, error = %err, "failed to finalize failure");
                        }
                    }
                }
                Ok(None) => {
                    self.shutdown
                        .cancellable_sleep(Duration::from_millis(config.poll_interval_ms as u64))
                        .await;
                }
                Err(err) => {
                    error!(worker_id = %self.id, error = %err, "claim failed");
                    self.shutdown
                        .cancellable_sleep(Duration::from_millis(config.poll_interval_ms as u64))
                        .await;
                }
            }
        }

        info!(worker_id = %self.id, "worker stopped");
    }
}
