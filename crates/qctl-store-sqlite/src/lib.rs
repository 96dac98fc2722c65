//! SQLite implementation of `qctl-core`'s `JobStore` contract.
//!
//! Durable persistence of jobs and config over a single embedded database
//! file. The pool is capped at one connection: `qctl` is a single-writer
//! store (spec §4.A), and a one-connection pool turns every operation —
//! including the claim's select-then-update and the two-statement
//! finalize-failure transaction — into a strictly serialized sequence
//! without SQLite's `BUSY` retries ever coming into play in practice.
//! Schema creation runs inline at pool-open time; there is no separate
//! migration framework.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE jobs (
//!     id TEXT PRIMARY KEY,
//!     command TEXT NOT NULL,
//!     priority INTEGER NOT NULL,
//!     max_retries INTEGER NOT NULL,
//!     attempts INTEGER NOT NULL,
//!     timeout_seconds INTEGER NOT NULL,
//!     run_at TEXT NOT NULL,
//!     state TEXT NOT NULL,
//!     created_at TEXT NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     claimed_by TEXT,
//!     last_error TEXT,
//!     exit_code INTEGER
//! );
//! CREATE INDEX idx_jobs_claim ON jobs (state, priority, run_at);
//!
//! CREATE TABLE config (key TEXT PRIMARY KEY, value TEXT NOT NULL);
//!
//! CREATE TABLE supervisor (
//!     id INTEGER PRIMARY KEY CHECK (id = 1),
//!     pid INTEGER NOT NULL,
//!     started_at TEXT NOT NULL,
//!     worker_count INTEGER NOT NULL,
//!     shutdown_requested INTEGER NOT NULL
//! );
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{ConnectOptions, Row, SqlitePool};
use tracing::{debug, warn};

use qctl_core::{
    default_value, validate, Job, JobSpec, JobState, JobStore, ListFilter, PurgePredicate,
    QctlError, ResolvedConfig, Result, SupervisorRecord, BACKOFF_BASE, DEFAULT_TIMEOUT,
    MAX_RETRIES, POLL_INTERVAL_MS, RECOGNIZED_KEYS,
};

/// How long a connection waits on `SQLITE_BUSY` before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Open (creating if necessary) the database file at `path` and ensure
    /// its schema exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .disable_statement_logging();

        // Single connection: this store is single-writer by design (spec
        // §4.A/§5), so one pooled connection gives exactly-once claim
        // semantics for free instead of relying on SQLite's locking alone.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(store_err)?;

        let store = Self { pool };
        store.migrate().await?;
        debug!("schema ensured");
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                command TEXT NOT NULL,
                priority INTEGER NOT NULL,
                max_retries INTEGER NOT NULL,
                attempts INTEGER NOT NULL,
                timeout_seconds INTEGER NOT NULL,
                run_at TEXT NOT NULL,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                claimed_by TEXT,
                last_error TEXT,
                exit_code INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs (state, priority, run_at)")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS config (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS supervisor (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                pid INTEGER NOT NULL,
                started_at TEXT NOT NULL,
                worker_count INTEGER NOT NULL,
                shutdown_requested INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    /// Apply a failure to `job_id` within the caller's transaction: bump
    /// `attempts`, and either move to `dead` or reschedule with backoff.
    /// Shared by `finalize_failure` and `reclaim_orphans`.
    async fn apply_failure(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        job_id: &str,
        exit_code: Option<i64>,
        error: &str,
        config: &ResolvedConfig,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let row = sqlx::query("SELECT attempts, max_retries FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(store_err)?
            .ok_or_else(|| QctlError::NotFound(job_id.to_string()))?;

        let attempts: i64 = row.try_get("attempts").map_err(store_err)?;
        let max_retries: i64 = row.try_get("max_retries").map_err(store_err)?;
        let new_attempts = attempts + 1;

        if new_attempts > max_retries {
            sqlx::query(
                r#"
                UPDATE jobs
                SET state = 'dead', claimed_by = NULL, last_error = ?, exit_code = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(error)
            .bind(exit_code)
            .bind(now)
            .bind(job_id)
            .execute(&mut **tx)
            .await
            .map_err(store_err)?;
        } else {
            let delay_seconds = config.backoff_base.pow(new_attempts as u32);
            let run_at = now + chrono::Duration::seconds(delay_seconds);

            sqlx::query(
                r#"
                UPDATE jobs
                SET state = 'pending', claimed_by = NULL, attempts = ?, last_error = ?,
                    exit_code = ?, run_at = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(new_attempts)
            .bind(error)
            .bind(exit_code)
            .bind(run_at)
            .bind(now)
            .bind(job_id)
            .execute(&mut **tx)
            .await
            .map_err(store_err)?;
        }

        Ok(())
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enqueue(&self, spec: JobSpec, config: &ResolvedConfig, now: DateTime<Utc>) -> Result<String> {
        if spec.id.trim().is_empty() {
            return Err(QctlError::InvalidSpec("id must not be empty".to_string()));
        }
        if spec.command.trim().is_empty() {
            return Err(QctlError::InvalidSpec("command must not be empty".to_string()));
        }

        let priority = spec.priority.unwrap_or(0);
        let max_retries = spec.max_retries.unwrap_or(config.max_retries);
        if max_retries < 0 {
            return Err(QctlError::InvalidSpec("max_retries must be >= 0".to_string()));
        }
        let timeout_seconds = spec.timeout_seconds.unwrap_or(config.default_timeout);
        if timeout_seconds <= 0 {
            return Err(QctlError::InvalidSpec("timeout_seconds must be > 0".to_string()));
        }
        let run_at = spec.run_at.unwrap_or(now);

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (
                id, command, priority, max_retries, attempts, timeout_seconds, run_at,
                state, created_at, updated_at, claimed_by, last_error, exit_code
            ) VALUES (?, ?, ?, ?, 0, ?, ?, 'pending', ?, ?, NULL, NULL, NULL)
            "#,
        )
        .bind(&spec.id)
        .bind(&spec.command)
        .bind(priority)
        .bind(max_retries)
        .bind(timeout_seconds)
        .bind(run_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(spec.id),
            Err(err) => {
                if is_unique_violation(&err) {
                    Err(QctlError::DuplicateId(spec.id))
                } else {
                    Err(store_err(err))
                }
            }
        }
    }

    async fn claim(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>> {
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'processing', claimed_by = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM jobs
                WHERE state = 'pending' AND run_at <= ?
                ORDER BY priority DESC, run_at ASC, created_at ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(|r| row_to_job(&r)).transpose()
    }

    async fn finalize_success(&self, job_id: &str, exit_code: i64, now: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'completed', claimed_by = NULL, exit_code = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(exit_code)
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(QctlError::NotFound(job_id.to_string()));
        }
        Ok(())
    }

    async fn finalize_failure(
        &self,
        job_id: &str,
        exit_code: Option<i64>,
        error: &str,
        config: &ResolvedConfig,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        Self::apply_failure(&mut tx, job_id, exit_code, error, config, now).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn requeue_dead(&self, job_id: &str, now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let state: Option<String> = sqlx::query_scalar("SELECT state FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?;

        match state.as_deref() {
            None => return Err(QctlError::NotFound(job_id.to_string())),
            Some(s) if s != JobState::Dead.as_str() => {
                return Err(QctlError::NotDead(job_id.to_string()))
            }
            _ => {}
        }

        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending', attempts = 0, run_at = ?, claimed_by = NULL,
                last_error = NULL, exit_code = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(job_id)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn reclaim_orphans(
        &self,
        config: &ResolvedConfig,
        now: DateTime<Utc>,
        is_live: &(dyn Fn(&str) -> bool + Send + Sync),
    ) -> Result<u64> {
        let rows = sqlx::query("SELECT id, claimed_by FROM jobs WHERE state = 'processing'")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        let mut reclaimed = 0u64;
        for row in rows {
            let id: String = row.try_get("id").map_err(store_err)?;
            let claimed_by: Option<String> = row.try_get("claimed_by").map_err(store_err)?;
            let live = claimed_by.as_deref().map(is_live).unwrap_or(false);
            if live {
                continue;
            }

            let mut tx = self.pool.begin().await.map_err(store_err)?;
            Self::apply_failure(&mut tx, &id, None, "worker-crashed", config, now).await?;
            tx.commit().await.map_err(store_err)?;
            warn!(job_id = %id, claimed_by = ?claimed_by, "reclaimed job from dead worker");
            reclaimed += 1;
        }

        Ok(reclaimed)
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<Job>> {
        let mut sql = String::from("SELECT * FROM jobs WHERE 1 = 1");
        if filter.retry_pending_only {
            sql.push_str(" AND state = 'pending' AND attempts > 0");
        } else if filter.state.is_some() {
            sql.push_str(" AND state = ?");
        }
        if filter.id_prefix.is_some() {
            sql.push_str(" AND id LIKE ?");
        }
        sql.push_str(" ORDER BY priority DESC, run_at ASC");

        let mut query = sqlx::query(&sql);
        if !filter.retry_pending_only {
            if let Some(state) = filter.state {
                query = query.bind(state.as_str().to_string());
            }
        }
        if let Some(prefix) = &filter.id_prefix {
            query = query.bind(format!("{prefix}%"));
        }

        let rows = query.fetch_all(&self.pool).await.map_err(store_err)?;
        rows.iter().map(row_to_job).collect()
    }

    async fn purge(&self, predicate: PurgePredicate) -> Result<u64> {
        match predicate {
            PurgePredicate::Completed => {
                let result = sqlx::query("DELETE FROM jobs WHERE state = 'completed'")
                    .execute(&self.pool)
                    .await
                    .map_err(store_err)?;
                Ok(result.rows_affected())
            }
        }
    }

    async fn config_get(&self, key: &str) -> Result<Option<String>> {
        if !RECOGNIZED_KEYS.contains(&key) {
            return Err(QctlError::UnknownConfig(key.to_string()));
        }
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(value.or_else(|| default_value(key).map(str::to_string)))
    }

    async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        validate(key, value)?;

        sqlx::query(
            r#"
            INSERT INTO config (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn resolved_config(&self) -> Result<ResolvedConfig> {
        let rows = sqlx::query("SELECT key, value FROM config")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        let mut map: HashMap<String, String> = HashMap::new();
        for row in rows {
            let key: String = row.try_get("key").map_err(store_err)?;
            let value: String = row.try_get("value").map_err(store_err)?;
            map.insert(key, value);
        }

        let parse = |key: &str, default: i64| -> Result<i64> {
            match map.get(key) {
                Some(v) => v
                    .parse()
                    .map_err(|_| QctlError::InvalidSpec(format!("stored config '{key}' is not an integer"))),
                None => Ok(default),
            }
        };

        Ok(ResolvedConfig {
            backoff_base: parse(BACKOFF_BASE, 2)?,
            max_retries: parse(MAX_RETRIES, 3)?,
            default_timeout: parse(DEFAULT_TIMEOUT, 30)?,
            poll_interval_ms: parse(POLL_INTERVAL_MS, 500)?,
        })
    }

    async fn supervisor_start(&self, pid: i64, worker_count: i64, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO supervisor (id, pid, started_at, worker_count, shutdown_requested)
            VALUES (1, ?, ?, ?, 0)
            ON CONFLICT(id) DO UPDATE SET
                pid = excluded.pid,
                started_at = excluded.started_at,
                worker_count = excluded.worker_count,
                shutdown_requested = 0
            "#,
        )
        .bind(pid)
        .bind(now)
        .bind(worker_count)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn supervisor_clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM supervisor WHERE id = 1")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn supervisor_request_shutdown(&self) -> Result<()> {
        sqlx::query("UPDATE supervisor SET shutdown_requested = 1 WHERE id = 1")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn supervisor_record(&self) -> Result<Option<SupervisorRecord>> {
        let row = sqlx::query("SELECT pid, started_at, worker_count, shutdown_requested FROM supervisor WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row.map(|r| {
            let shutdown_requested: i64 = r.try_get("shutdown_requested").map_err(store_err)?;
            Ok(SupervisorRecord {
                pid: r.try_get("pid").map_err(store_err)?,
                started_at: r.try_get("started_at").map_err(store_err)?,
                worker_count: r.try_get("worker_count").map_err(store_err)?,
                shutdown_requested: shutdown_requested != 0,
            })
        })
        .transpose()
    }
}

fn row_to_job(row: &SqliteRow) -> Result<Job> {
    let state_str: String = row.try_get("state").map_err(store_err)?;
    let state = JobState::parse(&state_str)
        .ok_or_else(|| store_err(anyhow::anyhow!("unrecognized job state '{state_str}' in store")))?;

    Ok(Job {
        id: row.try_get("id").map_err(store_err)?,
        command: row.try_get("command").map_err(store_err)?,
        priority: row.try_get("priority").map_err(store_err)?,
        max_retries: row.try_get("max_retries").map_err(store_err)?,
        attempts: row.try_get("attempts").map_err(store_err)?,
        timeout_seconds: row.try_get("timeout_seconds").map_err(store_err)?,
        run_at: row.try_get("run_at").map_err(store_err)?,
        state,
        created_at: row.try_get("created_at").map_err(store_err)?,
        updated_at: row.try_get("updated_at").map_err(store_err)?,
        claimed_by: row.try_get("claimed_by").map_err(store_err)?,
        last_error: row.try_get("last_error").map_err(store_err)?,
        exit_code: row.try_get("exit_code").map_err(store_err)?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.kind() == sqlx::error::ErrorKind::UniqueViolation)
        .unwrap_or(false)
}

fn store_err(err: impl Into<anyhow::Error>) -> QctlError {
    QctlError::StoreError(err.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qctl_core::JobSpec;
    use std::sync::Arc;

    async fn open_temp() -> (SqliteJobStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qctl.db");
        let store = SqliteJobStore::open(path.to_str().unwrap()).await.unwrap();
        (store, dir)
    }

    fn spec(id: &str, command: &str) -> JobSpec {
        JobSpec {
            id: id.to_string(),
            command: command.to_string(),
            priority: None,
            max_retries: None,
            timeout_seconds: None,
            run_at: None,
        }
    }

    #[tokio::test]
    async fn enqueue_then_list_round_trips_fields() {
        let (store, _dir) = open_temp().await;
        let config = ResolvedConfig::default();
        let now = Utc::now();

        store.enqueue(spec("a", "exit 0"), &config, now).await.unwrap();

        let jobs = store.list(ListFilter::default()).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "a");
        assert_eq!(jobs[0].command, "exit 0");
        assert_eq!(jobs[0].state, JobState::Pending);
        assert_eq!(jobs[0].attempts, 0);
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let (store, _dir) = open_temp().await;
        let config = ResolvedConfig::default();
        let now = Utc::now();

        store.enqueue(spec("c", "true"), &config, now).await.unwrap();
        let err = store.enqueue(spec("c", "true"), &config, now).await.unwrap_err();
        assert!(matches!(err, QctlError::DuplicateId(id) if id == "c"));
    }

    #[tokio::test]
    async fn claim_is_exclusive_across_concurrent_callers() {
        let (store, _dir) = open_temp().await;
        let store = Arc::new(store);
        let config = ResolvedConfig::default();
        let now = Utc::now();

        store.enqueue(spec("only", "true"), &config, now).await.unwrap();

        let a = store.clone();
        let b = store.clone();
        let (r1, r2) = tokio::join!(
            a.claim("worker-a", Utc::now()),
            b.claim("worker-b", Utc::now()),
        );

        let claims = [r1.unwrap(), r2.unwrap()];
        let claimed_count = claims.iter().filter(|c| c.is_some()).count();
        assert_eq!(claimed_count, 1);
    }

    #[tokio::test]
    async fn finalize_failure_reschedules_with_backoff_then_deads_out() {
        let (store, _dir) = open_temp().await;
        let config = ResolvedConfig {
            backoff_base: 2,
            max_retries: 2,
            default_timeout: 30,
            poll_interval_ms: 500,
        };
        let mut now = Utc::now();

        store
            .enqueue(
                JobSpec {
                    id: "b".to_string(),
                    command: "exit 2".to_string(),
                    priority: None,
                    max_retries: Some(2),
                    timeout_seconds: None,
                    run_at: None,
                },
                &config,
                now,
            )
            .await
            .unwrap();

        // Job's initial `run_at` is its enqueue time.
        let mut prior_run_at = now;

        for expected_attempts in 1..=2i64 {
            let claimed = store.claim("w", now).await.unwrap().unwrap();
            store
                .finalize_failure(&claimed.id, Some(2), "exit code 2", &config, now)
                .await
                .unwrap();
            let job = store
                .list(ListFilter::default())
                .await
                .unwrap()
                .into_iter()
                .next()
                .unwrap();
            assert_eq!(job.attempts, expected_attempts);
            assert_eq!(job.state, JobState::Pending);

            // S2 / property 5: the k-th retry's `run_at` grows by at least
            // `backoff_base ^ k` over the prior `run_at`.
            let min_delay = chrono::Duration::seconds(config.backoff_base.pow(expected_attempts as u32));
            assert!(job.run_at >= prior_run_at + min_delay);
            prior_run_at = job.run_at;

            // Advance past the rescheduled `run_at` so it's eligible for the next claim.
            now = job.run_at + chrono::Duration::seconds(1);
        }

        let claimed = store.claim("w", now).await.unwrap().unwrap();
        store
            .finalize_failure(&claimed.id, Some(2), "exit code 2", &config, now)
            .await
            .unwrap();

        let job = store
            .list(ListFilter::default())
            .await
            .unwrap()
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(job.attempts, 3);
        assert_eq!(job.state, JobState::Dead);
    }

    #[tokio::test]
    async fn requeue_dead_resets_attempts_and_state() {
        let (store, _dir) = open_temp().await;
        let config = ResolvedConfig {
            backoff_base: 2,
            max_retries: 0,
            default_timeout: 30,
            poll_interval_ms: 500,
        };
        let now = Utc::now();

        store
            .enqueue(
                JobSpec {
                    id: "d".to_string(),
                    command: "false".to_string(),
                    priority: None,
                    max_retries: Some(0),
                    timeout_seconds: None,
                    run_at: None,
                },
                &config,
                now,
            )
            .await
            .unwrap();

        let claimed = store.claim("w", now).await.unwrap().unwrap();
        store
            .finalize_failure(&claimed.id, Some(1), "exit code 1", &config, now)
            .await
            .unwrap();

        let dead = store
            .list(ListFilter {
                state: Some(JobState::Dead),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(dead.len(), 1);

        store.requeue_dead("d", now).await.unwrap();

        let pending = store
            .list(ListFilter {
                state: Some(JobState::Pending),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 0);
        assert!(pending[0].last_error.is_none());
    }

    #[tokio::test]
    async fn requeue_dead_on_non_dead_job_fails() {
        let (store, _dir) = open_temp().await;
        let config = ResolvedConfig::default();
        let now = Utc::now();

        store.enqueue(spec("e", "true"), &config, now).await.unwrap();

        let err = store.requeue_dead("e", now).await.unwrap_err();
        assert!(matches!(err, QctlError::NotDead(id) if id == "e"));

        let err = store.requeue_dead("missing", now).await.unwrap_err();
        assert!(matches!(err, QctlError::NotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn purge_removes_only_completed_jobs() {
        let (store, _dir) = open_temp().await;
        let config = ResolvedConfig::default();
        let now = Utc::now();

        store.enqueue(spec("f", "true"), &config, now).await.unwrap();
        store.enqueue(spec("g", "true"), &config, now).await.unwrap();

        let claimed = store.claim("w", now).await.unwrap().unwrap();
        store.finalize_success(&claimed.id, 0, now).await.unwrap();

        let removed = store.purge(PurgePredicate::Completed).await.unwrap();
        assert_eq!(removed, 1);

        let remaining = store.list(ListFilter::default()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].state, JobState::Pending);
    }

    #[tokio::test]
    async fn reclaim_orphans_applies_failure_to_dead_workers_only() {
        let (store, _dir) = open_temp().await;
        let config = ResolvedConfig::default();
        let now = Utc::now();

        store.enqueue(spec("h", "sleep 100"), &config, now).await.unwrap();
        store.claim("worker-dead", now).await.unwrap();

        let reclaimed = store
            .reclaim_orphans(&config, now, &|worker_id| worker_id != "worker-dead")
            .await
            .unwrap();
        assert_eq!(reclaimed, 1);

        let job = store.list(ListFilter::default()).await.unwrap().remove(0);
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.last_error.as_deref(), Some("worker-crashed"));
    }

    #[tokio::test]
    async fn config_round_trips_and_rejects_unknown_keys() {
        let (store, _dir) = open_temp().await;

        store.config_set(BACKOFF_BASE, "3").await.unwrap();
        assert_eq!(
            store.config_get(BACKOFF_BASE).await.unwrap(),
            Some("3".to_string())
        );

        let err = store.config_set("nonsense", "1").await.unwrap_err();
        assert!(matches!(err, QctlError::UnknownConfig(k) if k == "nonsense"));

        let resolved = store.resolved_config().await.unwrap();
        assert_eq!(resolved.backoff_base, 3);
        assert_eq!(resolved.max_retries, 3);
    }

    #[tokio::test]
    async fn supervisor_record_tracks_start_and_clear() {
        let (store, _dir) = open_temp().await;
        let now = Utc::now();

        assert!(store.supervisor_record().await.unwrap().is_none());

        store.supervisor_start(1234, 2, now).await.unwrap();
        let record = store.supervisor_record().await.unwrap().unwrap();
        assert_eq!(record.pid, 1234);
        assert_eq!(record.worker_count, 2);
        assert!(!record.shutdown_requested);

        store.supervisor_request_shutdown().await.unwrap();
        let record = store.supervisor_record().await.unwrap().unwrap();
        assert!(record.shutdown_requested);

        store.supervisor_clear().await.unwrap();
        assert!(store.supervisor_record().await.unwrap().is_none());
    }
}
