use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::models::{BatchProgress, ClientConfig, JobReport, ProxyConfig, SyncConfig, SyncKind};
use crate::services::batch_orchestrator::{BatchOrchestrator, SyncJob};
use crate::services::item_sync::ItemCatalogJob;
use crate::services::market_api::MarketApi;
use crate::services::pacing::PacedScheduler;
use crate::services::price_sync::PriceJob;
use crate::services::proxy_pool::{ChainedSource, ProxyPool, ProxySource};
use crate::services::relic_sync::RelicJob;
use crate::services::resilient_client::{ResilientClient, RetryPolicy};
use crate::services::riven_sync::RivenJob;
use crate::services::store::Store;
use crate::services::transport::{HttpTransport, Transport};

/// Everything a sync run needs, built once per process
pub struct SyncContext {
    pub config: SyncConfig,
    pub store: Arc<dyn Store>,
    pub api: Arc<MarketApi>,
    pub proxies: Option<Arc<ProxyPool>>,
    dry_run: bool,
}

impl SyncContext {
    /// Build the HTTP stack (transport, optional proxy pool, client, API) on top of `store`
    pub async fn build(
        config: SyncConfig,
        client_config: &ClientConfig,
        proxy_config: ProxyConfig,
        store: Arc<dyn Store>,
    ) -> Result<Self> {
        let transport: Arc<dyn Transport> =
            Arc::new(HttpTransport::new().map_err(|e| AppError::Network(e.to_string()))?);

        let proxies = if config.use_proxies {
            Some(Arc::new(load_proxy_pool(proxy_config).await?))
        } else {
            None
        };

        Ok(Self::with_transport(config, client_config, transport, proxies, store))
    }

    /// Assemble from an existing transport (tests, alternative transports)
    pub fn with_transport(
        config: SyncConfig,
        client_config: &ClientConfig,
        transport: Arc<dyn Transport>,
        proxies: Option<Arc<ProxyPool>>,
        store: Arc<dyn Store>,
    ) -> Self {
        let policy = RetryPolicy::default().with_max_retries(config.max_retries);
        let mut client = ResilientClient::new(transport, policy)
            .with_pacing(PacedScheduler::new(config.min_delay_ms, config.max_delay_ms))
            .with_timeouts(client_config.proxied_timeout, client_config.direct_timeout);
        if let Some(pool) = &proxies {
            client = client.with_proxies(pool.clone());
        }

        let api = Arc::new(MarketApi::new(Arc::new(client), client_config, &config));

        Self {
            config,
            store,
            api,
            proxies,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn orchestrator(&self) -> BatchOrchestrator {
        BatchOrchestrator::new(self.store.clone())
            .with_batch_delay(self.config.batch_delay())
            .with_force_refresh(self.config.force_refresh)
            .with_dry_run(self.dry_run)
    }

    /// Run one sync job to completion
    pub async fn run_kind(&self, kind: SyncKind, on_progress: &mut dyn FnMut(&BatchProgress)) -> Result<JobReport> {
        let report = match kind {
            SyncKind::Items => self.run_job(&ItemCatalogJob::new(self.api.clone()), on_progress).await,
            SyncKind::Prices => {
                let job = PriceJob::new(self.api.clone(), self.store.clone(), &self.config);
                self.run_job(&job, on_progress).await
            }
            SyncKind::Rivens => self.run_job(&RivenJob::new(self.api.clone()), on_progress).await,
            SyncKind::Relics => self.run_job(&RelicJob::new(self.api.clone()), on_progress).await,
        };

        self.persist_proxies();
        report
    }

    async fn run_job<J: SyncJob>(&self, job: &J, on_progress: &mut dyn FnMut(&BatchProgress)) -> Result<JobReport> {
        let mut entities = job.entities().await?;
        if let Some(limit) = self.config.limit {
            entities.truncate(limit);
        }
        info!(job = job.name(), entities = entities.len(), "Entities listed");

        let report = self
            .orchestrator()
            .run(job, entities, self.config.concurrency, |p| on_progress(p))
            .await?;
        Ok(report)
    }

    fn persist_proxies(&self) {
        if let Some(pool) = &self.proxies {
            if let Err(e) = pool.persist() {
                warn!(error = %e, "Failed to persist proxy cursor");
            }
        }
    }
}

/// Load the persisted pool; an empty pool is seeded from the configured source
pub async fn load_proxy_pool(config: ProxyConfig) -> Result<ProxyPool> {
    let source = ChainedSource::from_config(&config)?.map(|s| Box::new(s) as Box<dyn ProxySource>);
    let pool = ProxyPool::load(config, source)?;

    if pool.is_empty() {
        match pool.reload().await {
            Ok(count) => info!(proxies = count, "Seeded proxy pool"),
            Err(e) => warn!(error = %e, "Proxy pool is empty and could not be seeded"),
        }
    }

    info!(proxies = pool.len(), cursor = pool.cursor(), "Proxy pool ready");
    Ok(pool)
}
