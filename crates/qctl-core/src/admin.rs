//! Thin façade used by the CLI and (in principle) a read-only dashboard.
//! Every method is a single `Store` call; no worker-loop logic lives here.

use std::sync::Arc;

use chrono::Utc;

use crate::error::Result;
use crate::job::{Job, JobSpec};
use crate::store::{JobStore, ListFilter, PurgePredicate};

pub struct AdminApi {
    store: Arc<dyn JobStore>,
}

impl AdminApi {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn enqueue(&self, spec: JobSpec) -> Result<String> {
        let config = self.store.resolved_config().await?;
        self.store.enqueue(spec, &config, Utc::now()).await
    }

    pub async fn list(&self, filter: ListFilter) -> Result<Vec<Job>> {
        self.store.list(filter).await
    }

    pub async fn status(&self) -> Result<crate::supervisor::SupervisorStatus> {
        crate::supervisor::Supervisor::status(self.store.as_ref()).await
    }

    pub async fn purge(&self, predicate: PurgePredicate) -> Result<u64> {
        self.store.purge(predicate).await
    }

    /// The DLQ is not a separate store, just a filtered view over `dead` jobs.
    pub async fn dlq_list(&self) -> Result<Vec<Job>> {
        self.store
            .list(ListFilter {
                state: Some(crate::job::JobState::Dead),
                ..Default::default()
            })
            .await
    }

    pub async fn dlq_retry(&self, job_id: &str) -> Result<()> {
        self.store.requeue_dead(job_id, Utc::now()).await
    }

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.store.config_get(key).await
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.store.config_set(key, value).await
    }
}
