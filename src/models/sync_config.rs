use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    BANNED_PROXY_FILE, BATCH_DELAY_MS, BULK_MAX_DELAY_MS, BULK_MIN_DELAY_MS, DEFAULT_CONCURRENCY,
    DEFAULT_MAX_RETRIES, DIRECT_TIMEOUT_SECS, LOOKUP_MAX_DELAY_MS, LOOKUP_MIN_DELAY_MS,
    MARKET_API_BASE, ORDER_STATUS_FALLBACK, PRICE_AVG_DEPTH, PROXIED_TIMEOUT_SECS,
    PROXY_CURSOR_FILE, PROXY_LIST_FILE, RELIC_FEED_URL,
};
use crate::utils::{env_flag, env_list, env_or, get_data_dir};

/// Synchronization jobs the engine can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncKind {
    /// Item catalog + item detail enrichment
    Items,
    /// Order-book prices for stored items
    Prices,
    /// Riven weapons + auctions
    Rivens,
    /// Relic drop tables
    Relics,
}

impl SyncKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncKind::Items => "items",
            SyncKind::Prices => "prices",
            SyncKind::Rivens => "rivens",
            SyncKind::Relics => "relics",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "items" | "catalog" => Ok(SyncKind::Items),
            "prices" | "orders" => Ok(SyncKind::Prices),
            "rivens" => Ok(SyncKind::Rivens),
            "relics" => Ok(SyncKind::Relics),
            _ => Err(format!(
                "Invalid sync job: {}. Valid options: items, prices, rivens, relics, all",
                s
            )),
        }
    }

    /// Parse comma-separated jobs or "all" (catalog first so prices see fresh items)
    pub fn parse_kinds(s: &str) -> Result<Vec<Self>, String> {
        if s.to_lowercase() == "all" {
            return Ok(vec![SyncKind::Items, SyncKind::Prices, SyncKind::Rivens, SyncKind::Relics]);
        }

        s.split(',').map(|part| SyncKind::from_str(part.trim())).collect()
    }
}

/// Configuration for bulk synchronization jobs
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Entities fetched concurrently per chunk
    pub concurrency: usize,

    /// Pacing window before every outbound call (milliseconds)
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,

    /// Fixed pause between chunks (milliseconds)
    pub batch_delay_ms: u64,

    /// Attempts per logical request
    pub max_retries: u32,

    /// Route requests through the proxy pool
    pub use_proxies: bool,

    /// Re-fetch entities even when already enriched
    pub force_refresh: bool,

    /// Orders averaged into buy_avg / sell_avg
    pub price_avg_depth: usize,

    /// Acceptable order-owner statuses, most preferred first
    pub status_fallback: Vec<String>,

    /// Only process the first N entities (debugging)
    pub limit: Option<usize>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            min_delay_ms: BULK_MIN_DELAY_MS,
            max_delay_ms: BULK_MAX_DELAY_MS,
            batch_delay_ms: BATCH_DELAY_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            use_proxies: false,
            force_refresh: false,
            price_avg_depth: PRICE_AVG_DEPTH,
            status_fallback: ORDER_STATUS_FALLBACK.iter().map(|s| s.to_string()).collect(),
            limit: None,
        }
    }
}

impl SyncConfig {
    /// Build from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let min_delay_ms = env_or("SYNC_MIN_DELAY_MS", defaults.min_delay_ms);
        let max_delay_ms = env_or("SYNC_MAX_DELAY_MS", defaults.max_delay_ms).max(min_delay_ms);

        Self {
            concurrency: env_or("SYNC_CONCURRENCY", defaults.concurrency).max(1),
            min_delay_ms,
            max_delay_ms,
            batch_delay_ms: env_or("SYNC_BATCH_DELAY_MS", defaults.batch_delay_ms),
            max_retries: env_or("SYNC_MAX_RETRIES", defaults.max_retries).max(1),
            use_proxies: env_flag("USE_PROXIES", defaults.use_proxies),
            force_refresh: env_flag("FORCE_ENRICH", defaults.force_refresh),
            price_avg_depth: env_or("PRICE_AVG_DEPTH", defaults.price_avg_depth).max(1),
            status_fallback: env_list("ORDER_STATUS_FALLBACK", ORDER_STATUS_FALLBACK),
            limit: None,
        }
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

/// Upstream endpoints and per-call-site client tuning
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub market_api_base: String,
    pub relic_feed_url: String,
    pub proxied_timeout: Duration,
    pub direct_timeout: Duration,
    /// Pacing window for one-off lookups (catalog listings, feeds)
    pub lookup_min_delay_ms: u64,
    pub lookup_max_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            market_api_base: MARKET_API_BASE.to_string(),
            relic_feed_url: RELIC_FEED_URL.to_string(),
            proxied_timeout: Duration::from_secs(PROXIED_TIMEOUT_SECS),
            direct_timeout: Duration::from_secs(DIRECT_TIMEOUT_SECS),
            lookup_min_delay_ms: LOOKUP_MIN_DELAY_MS,
            lookup_max_delay_ms: LOOKUP_MAX_DELAY_MS,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let lookup_min_delay_ms = env_or("LOOKUP_MIN_DELAY_MS", defaults.lookup_min_delay_ms);

        Self {
            market_api_base: env_or("MARKET_API_BASE", defaults.market_api_base)
                .trim_end_matches('/')
                .to_string(),
            relic_feed_url: env_or("RELIC_FEED_URL", defaults.relic_feed_url),
            proxied_timeout: Duration::from_secs(env_or("PROXIED_TIMEOUT_SECS", PROXIED_TIMEOUT_SECS)),
            direct_timeout: Duration::from_secs(env_or("DIRECT_TIMEOUT_SECS", DIRECT_TIMEOUT_SECS)),
            lookup_min_delay_ms,
            lookup_max_delay_ms: env_or("LOOKUP_MAX_DELAY_MS", defaults.lookup_max_delay_ms)
                .max(lookup_min_delay_ms),
        }
    }
}

/// Where the proxy pool keeps its durable state and where it reloads from
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub data_dir: PathBuf,
    /// Remote newline-separated proxy list
    pub list_url: Option<String>,
    /// Local seed list used when the remote list is missing or unreachable
    pub list_file: Option<PathBuf>,
}

impl ProxyConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            list_url: None,
            list_file: None,
        }
    }

    pub fn from_env() -> Self {
        Self {
            data_dir: get_data_dir(),
            list_url: std::env::var("PROXY_LIST_URL").ok().filter(|s| !s.trim().is_empty()),
            list_file: std::env::var("PROXY_LIST_FILE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn active_list_path(&self) -> PathBuf {
        self.data_dir.join(PROXY_LIST_FILE)
    }

    pub fn banned_list_path(&self) -> PathBuf {
        self.data_dir.join(BANNED_PROXY_FILE)
    }

    pub fn cursor_path(&self) -> PathBuf {
        self.data_dir.join(PROXY_CURSOR_FILE)
    }
}

/// What the orchestrator did with one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityOutcome {
    New,
    Updated,
    Skipped,
    Removed,
    Errored,
}

/// Running counters for a batch job; every counter only grows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchProgress {
    /// Entities in the job
    pub total: usize,

    /// Entities finished (any outcome)
    pub processed: usize,

    pub new: usize,
    pub updated: usize,
    pub skipped: usize,
    pub removed: usize,
    pub errored: usize,

    /// Chunks finished / planned
    pub chunks_done: usize,
    pub total_chunks: usize,

    /// Time since the job started
    pub elapsed: Duration,

    /// Entities per second so far
    pub rate: f64,

    /// Estimated time remaining
    pub eta: Duration,
}

impl BatchProgress {
    pub fn new(total: usize, total_chunks: usize) -> Self {
        Self {
            total,
            total_chunks,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: EntityOutcome) {
        self.processed += 1;
        match outcome {
            EntityOutcome::New => self.new += 1,
            EntityOutcome::Updated => self.updated += 1,
            EntityOutcome::Skipped => self.skipped += 1,
            EntityOutcome::Removed => self.removed += 1,
            EntityOutcome::Errored => self.errored += 1,
        }
    }

    /// Calculate progress percentage
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.processed as f64 / self.total as f64) * 100.0
        }
    }

    /// Update rate and ETA from the job's elapsed time
    pub fn update_timing(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;

        let secs = elapsed.as_secs_f64();
        if self.processed > 0 && secs > 0.0 {
            self.rate = self.processed as f64 / secs;
            let remaining = self.total.saturating_sub(self.processed);
            self.eta = Duration::from_secs_f64(remaining as f64 / self.rate);
        }
    }

    /// Format for display
    pub fn format_display(&self) -> String {
        format!(
            "[{:04}/{:04}] chunk {}/{} | new {} upd {} skip {} rm {} err {} | {:.2}/s | Elapsed: {:.1}min | ETA: {:.1}min",
            self.processed,
            self.total,
            self.chunks_done,
            self.total_chunks,
            self.new,
            self.updated,
            self.skipped,
            self.removed,
            self.errored,
            self.rate,
            self.elapsed.as_secs_f64() / 60.0,
            self.eta.as_secs_f64() / 60.0,
        )
    }
}

/// Final result of one job run
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job: String,
    pub progress: BatchProgress,
    pub chunks: usize,
}

impl JobReport {
    pub fn format_summary(&self) -> String {
        format!(
            "{}: {} entities in {} chunks | new {} | updated {} | skipped {} | removed {} | errored {} | {:.1}s",
            self.job,
            self.progress.processed,
            self.chunks,
            self.progress.new,
            self.progress.updated,
            self.progress.skipped,
            self.progress.removed,
            self.progress.errored,
            self.progress.elapsed.as_secs_f64(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_kind_from_str() {
        assert_eq!(SyncKind::from_str("items").unwrap(), SyncKind::Items);
        assert_eq!(SyncKind::from_str("Orders").unwrap(), SyncKind::Prices);
        assert_eq!(SyncKind::from_str("RIVENS").unwrap(), SyncKind::Rivens);
        assert!(SyncKind::from_str("invalid").is_err());
    }

    #[test]
    fn test_parse_kinds() {
        let all = SyncKind::parse_kinds("all").unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0], SyncKind::Items);

        let multiple = SyncKind::parse_kinds("prices, relics").unwrap();
        assert_eq!(multiple, vec![SyncKind::Prices, SyncKind::Relics]);
    }

    #[test]
    fn test_sync_config_default() {
        let config = SyncConfig::default();
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.min_delay_ms, 500);
        assert_eq!(config.max_delay_ms, 2000);
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.status_fallback, vec!["ingame", "online"]);
        assert!(!config.force_refresh);
    }

    #[test]
    fn test_proxy_config_paths() {
        let config = ProxyConfig::new(PathBuf::from("/tmp/state"));
        assert_eq!(config.cursor_path(), PathBuf::from("/tmp/state/proxy_cursor.txt"));
        assert_eq!(config.banned_list_path(), PathBuf::from("/tmp/state/banned_proxies.txt"));
    }

    #[test]
    fn test_batch_progress() {
        let mut progress = BatchProgress::new(10, 2);
        progress.record(EntityOutcome::New);
        progress.record(EntityOutcome::Errored);
        assert_eq!(progress.processed, 2);
        assert_eq!(progress.errored, 1);
        assert_eq!(progress.percentage(), 20.0);

        progress.update_timing(Duration::from_secs(4));
        assert_eq!(progress.rate, 0.5);
        assert_eq!(progress.eta, Duration::from_secs(16));
    }
}
