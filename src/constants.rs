//! Engine constants
//!
//! Retry, pacing and proxy-health thresholds shared by the ingestion engine.
//! Values that operators are expected to tune live in `models::sync_config`
//! and are read from the environment; these are the fixed parts of the contract.

/// Failure rate above which a proxy is avoided (failures / total outcomes)
pub const PROXY_AVOID_FAILURE_RATE: f64 = 0.7;

/// Extra cursor advances `ProxyPool::next` makes past avoided proxies before giving up
pub const PROXY_MAX_SKIPS: usize = 5;

/// Backoff for HTTP 429: base delay and cap in milliseconds
pub const RATE_LIMITED_BACKOFF_BASE_MS: u64 = 2_000;
pub const RATE_LIMITED_BACKOFF_CAP_MS: u64 = 30_000;

/// Backoff for every other retryable failure
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 10_000;

/// Upper bound of the uniform jitter added to every backoff delay
pub const BACKOFF_JITTER_MS: u64 = 1_000;

/// Request timeouts (seconds)
pub const PROXIED_TIMEOUT_SECS: u64 = 10;
pub const DIRECT_TIMEOUT_SECS: u64 = 30;

/// Default retry budget for bulk sync jobs
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Retry budget for one-off lookups and feeds fetched once per run
pub const LOOKUP_MAX_RETRIES: u32 = 25;

/// Default number of concurrent entity fetches per chunk
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Bulk-sync pacing window (milliseconds)
pub const BULK_MIN_DELAY_MS: u64 = 500;
pub const BULK_MAX_DELAY_MS: u64 = 2_000;

/// Single-lookup pacing window (milliseconds)
pub const LOOKUP_MIN_DELAY_MS: u64 = 100;
pub const LOOKUP_MAX_DELAY_MS: u64 = 400;

/// Fixed pause between chunks of a bulk job
pub const BATCH_DELAY_MS: u64 = 3_000;

/// Number of best orders averaged into buy_avg / sell_avg
pub const PRICE_AVG_DEPTH: usize = 5;

/// Order-owner statuses accepted for pricing, in order of preference
pub const ORDER_STATUS_FALLBACK: &[&str] = &["ingame", "online"];

/// Worker main loop check interval
pub const WORKER_LOOP_CHECK_SECS: u64 = 300;

/// Number of riven auctions kept per weapon
pub const RIVEN_AUCTIONS_KEPT: usize = 10;

/// Upstream endpoints
pub const MARKET_API_BASE: &str = "https://api.warframe.market/v1";
pub const RELIC_FEED_URL: &str = "https://drops.warframestat.us/data/relics.json";

/// Durable state file names inside `DATA_DIR`
pub const PROXY_LIST_FILE: &str = "proxies.txt";
pub const BANNED_PROXY_FILE: &str = "banned_proxies.txt";
pub const PROXY_CURSOR_FILE: &str = "proxy_cursor.txt";
pub const SYNC_INFO_FILE: &str = "sync_info.json";
pub const DATABASE_FILE: &str = "market.db";

/// Store collections
pub mod collection {
    pub const ITEMS: &str = "items";
    pub const RIVENS: &str = "rivens";
    pub const RELICS: &str = "relics";
}
