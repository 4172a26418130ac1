//! Catalog-wide synchronization driver
//!
//! Entities are split into consecutive chunks of `concurrency`. Chunks run
//! strictly one after another; inside a chunk every entity runs concurrently
//! and the chunk completes only when all of them have finished.
//!
//! Per entity the store decides the action:
//! - absent: fetch and insert
//! - present and stale (or forced): fetch and merge-update
//! - otherwise: skip
//!
//! A fetch failure is counted as `errored` and never stops the job. A
//! not-found signal removes the stored entity. A store failure aborts the job.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{BatchProgress, EntityOutcome, JobReport};
use crate::services::resilient_client::FetchError;
use crate::services::store::{Document, Filter, Store, StoreError, UpsertOutcome};

/// One synchronization job over a list of entities
#[async_trait]
pub trait SyncJob: Send + Sync {
    type Entity: Send + Sync;

    fn name(&self) -> &str;

    /// Target collection
    fn collection(&self) -> &str;

    /// Store filter addressing the entity's document
    fn key(&self, entity: &Self::Entity) -> Filter;

    /// List the entities this job covers
    async fn entities(&self) -> Result<Vec<Self::Entity>>;

    /// Display label used in logs
    fn label(&self, entity: &Self::Entity) -> String;

    /// Whether a stored document must be re-fetched
    fn needs_refresh(&self, entity: &Self::Entity, existing: &Document) -> bool;

    /// Fetch the fields to write; the store merges them into any existing document
    async fn fetch(
        &self,
        entity: &Self::Entity,
        existing: Option<&Document>,
    ) -> std::result::Result<Document, FetchError>;
}

pub struct BatchOrchestrator {
    store: Arc<dyn Store>,
    batch_delay: Duration,
    force_refresh: bool,
    dry_run: bool,
}

impl BatchOrchestrator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            batch_delay: Duration::ZERO,
            force_refresh: false,
            dry_run: false,
        }
    }

    /// Pause between chunks
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Re-fetch every stored entity regardless of `needs_refresh`
    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// Fetch and count, but never write
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub async fn run<J, F>(
        &self,
        job: &J,
        entities: Vec<J::Entity>,
        concurrency: usize,
        mut on_progress: F,
    ) -> std::result::Result<JobReport, StoreError>
    where
        J: SyncJob,
        F: FnMut(&BatchProgress),
    {
        let concurrency = concurrency.max(1);
        let total_chunks = entities.len().div_ceil(concurrency);
        let mut progress = BatchProgress::new(entities.len(), total_chunks);
        let start = Instant::now();

        info!(
            job = job.name(),
            entities = entities.len(),
            concurrency = concurrency,
            chunks = total_chunks,
            dry_run = self.dry_run,
            "Starting sync job"
        );

        for (chunk_idx, chunk) in entities.chunks(concurrency).enumerate() {
            let chunk_start = Instant::now();
            let tasks = chunk.iter().map(|entity| self.process(job, entity));
            let results = join_all(tasks).await;

            let mut fatal = None;
            for result in results {
                match result {
                    Ok(outcome) => progress.record(outcome),
                    Err(e) => {
                        fatal.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = fatal {
                warn!(job = job.name(), chunk = chunk_idx + 1, error = %e, "Store failure, aborting job");
                return Err(e);
            }

            progress.chunks_done = chunk_idx + 1;
            progress.update_timing(start.elapsed());
            info!(
                job = job.name(),
                chunk = chunk_idx + 1,
                total_chunks = total_chunks,
                duration_s = chunk_start.elapsed().as_secs_f64(),
                "{}",
                progress.format_display()
            );
            on_progress(&progress);

            if chunk_idx + 1 < total_chunks && !self.batch_delay.is_zero() {
                debug!(delay_ms = self.batch_delay.as_millis() as u64, "Pausing between chunks");
                sleep(self.batch_delay).await;
            }
        }

        progress.update_timing(start.elapsed());
        Ok(JobReport {
            job: job.name().to_string(),
            chunks: progress.chunks_done,
            progress,
        })
    }

    async fn process<J: SyncJob>(
        &self,
        job: &J,
        entity: &J::Entity,
    ) -> std::result::Result<EntityOutcome, StoreError> {
        let collection = job.collection();
        let filter = job.key(entity);
        let existing = self.store.find_one(collection, &filter).await?;

        if let Some(doc) = &existing {
            if !self.force_refresh && !job.needs_refresh(entity, doc) {
                return Ok(EntityOutcome::Skipped);
            }
        }

        match job.fetch(entity, existing.as_ref()).await {
            Ok(data) => {
                if self.dry_run {
                    return Ok(if existing.is_some() { EntityOutcome::Updated } else { EntityOutcome::New });
                }
                match self.store.upsert(collection, &filter, data).await? {
                    UpsertOutcome::Inserted => Ok(EntityOutcome::New),
                    UpsertOutcome::Updated => Ok(EntityOutcome::Updated),
                }
            }
            Err(e) if e.is_not_found() => {
                if existing.is_none() {
                    debug!(job = job.name(), entity = %job.label(entity), "Not found upstream and not stored");
                    return Ok(EntityOutcome::Skipped);
                }
                info!(job = job.name(), entity = %job.label(entity), "Removed upstream, deleting");
                if !self.dry_run {
                    self.store.delete(collection, &filter).await?;
                }
                Ok(EntityOutcome::Removed)
            }
            Err(e) => {
                warn!(job = job.name(), entity = %job.label(entity), error = %e, "Entity sync failed");
                Ok(EntityOutcome::Errored)
            }
        }
    }
}
