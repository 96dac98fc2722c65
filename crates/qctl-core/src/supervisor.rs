//! Owns the worker pool: starts it, tracks the persisted supervisor record,
//! and propagates graceful shutdown from SIGINT/SIGTERM.

use std::collections::HashMap;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{QctlError, Result};
use crate::executor::LogSink;
use crate::process_group;
use crate::shutdown::Shutdown;
use crate::store::{JobStore, ListFilter, SupervisorRecord};
use crate::worker::Worker;

/// How long `stop()` waits for the recorded supervisor to clear its record
/// before giving up.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SupervisorStatus {
    pub running: bool,
    pub pid: Option<i64>,
    pub started_at: Option<chrono::DateTime<Utc>>,
    pub worker_count: i64,
    /// Job counts by state, e.g. "pending" -> 4.
    pub job_counts: HashMap<String, i64>,
}

pub struct Supervisor {
    store: Arc<dyn JobStore>,
    log_sink: Arc<dyn LogSink>,
    shutdown: Arc<Shutdown>,
    worker_count: i64,
}

impl Supervisor {
    pub fn new(store: Arc<dyn JobStore>, log_sink: Arc<dyn LogSink>, worker_count: i64) -> Self {
        Self {
            store,
            log_sink,
            shutdown: Arc::new(Shutdown::new()),
            worker_count,
        }
    }

    /// Register this process as the supervisor, reclaim orphaned jobs from
    /// any prior run, then spawn the worker pool and block until shutdown.
    pub async fn start(self) -> Result<()> {
        let pid = process::id() as i64;
        let now = Utc::now();

        if let Some(record) = self.store.supervisor_record().await? {
            if process_group::process_exists(record.pid) {
                return Err(QctlError::AlreadyRunning(record.pid));
            }
            warn!(stale_pid = record.pid, "ignoring stale supervisor record");
        }

        self.store.supervisor_start(pid, self.worker_count, now).await?;

        let config = self.store.resolved_config().await?;
        let reclaimed = self
            .store
            .reclaim_orphans(&config, Utc::now(), &|worker_id| worker_live(worker_id))
            .await?;
        if reclaimed > 0 {
            info!(reclaimed, "reclaimed orphaned jobs from a prior run");
        }

        self.install_signal_handler();

        let mut handles = Vec::new();
        for n in 0..self.worker_count {
            let worker = Worker::new(
                format!("{pid}-w{n}"),
                self.store.clone(),
                self.log_sink.clone(),
                self.shutdown.clone(),
            );
            handles.push(tokio::spawn(worker.run()));
        }

        for handle in handles {
            let _ = handle.await;
        }

        self.store.supervisor_clear().await?;
        info!("supervisor stopped");
        Ok(())
    }

    /// Installs a task that requests shutdown on the first SIGINT/SIGTERM and
    /// escalates (cancelling in-flight jobs rather than waiting for them) on
    /// a second.
    #[cfg(unix)]
    fn install_signal_handler(&self) {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
            let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");

            tokio::select! {
                _ = sigint.recv() => {}
                _ = sigterm.recv() => {}
            }
            info!("shutdown signal received, finishing in-flight jobs");
            shutdown.request();

            tokio::select! {
                _ = sigint.recv() => {}
                _ = sigterm.recv() => {}
            }
            warn!("second shutdown signal received, cancelling in-flight jobs");
            shutdown.request();
        });
    }

    #[cfg(not(unix))]
    fn install_signal_handler(&self) {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received, finishing in-flight jobs");
            shutdown.request();

            let _ = tokio::signal::ctrl_c().await;
            warn!("second shutdown signal received, cancelling in-flight jobs");
            shutdown.request();
        });
    }

    /// Request shutdown of whatever supervisor is currently recorded, by
    /// sending it SIGTERM, then wait (bounded) for it to clear the record.
    pub async fn stop(store: &dyn JobStore) -> Result<()> {
        let Some(record) = store.supervisor_record().await? else {
            return Ok(());
        };

        signal_supervisor(record.pid)?;
        store.supervisor_request_shutdown().await?;

        let deadline = tokio::time::Instant::now() + STOP_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            if store.supervisor_record().await?.is_none() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        warn!(pid = record.pid, "supervisor did not clear its record within the stop timeout");
        Ok(())
    }

    pub async fn status(store: &dyn JobStore) -> Result<SupervisorStatus> {
        let record: Option<SupervisorRecord> = store.supervisor_record().await?;
        let jobs = store.list(ListFilter::default()).await?;

        let mut job_counts = HashMap::new();
        for job in &jobs {
            *job_counts.entry(job.state.as_str().to_string()).or_insert(0) += 1;
        }

        Ok(SupervisorStatus {
            running: record.is_some(),
            pid: record.as_ref().map(|r| r.pid),
            started_at: record.as_ref().map(|r| r.started_at),
            worker_count: record.as_ref().map(|r| r.worker_count).unwrap_or(0),
            job_counts,
        })
    }
}

#[cfg(unix)]
fn signal_supervisor(pid: i64) -> Result<()> {
    let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(QctlError::StoreError(
                anyhow::Error::new(err).context("failed to signal supervisor"),
            ));
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn signal_supervisor(_pid: i64) -> Result<()> {
    Ok(())
}

/// Liveness predicate for `reclaim_orphans`: a worker id is `"<pid>-w<n>"`;
/// the worker is live iff its owning supervisor process still exists.
fn worker_live(worker_id: &str) -> bool {
    let Some((pid_str, _)) = worker_id.split_once("-w") else {
        return false;
    };
    match pid_str.parse::<i64>() {
        Ok(pid) => process_group::process_exists(pid),
        Err(_) => false,
    }
}
