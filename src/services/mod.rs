pub mod batch_orchestrator;
pub mod encoding;
pub mod endo_calculator;
pub mod identity;
pub mod item_sync;
pub mod market_api;
pub mod pacing;
pub mod price_calculator;
pub mod price_sync;
pub mod proxy_pool;
pub mod relic_sync;
pub mod resilient_client;
pub mod riven_sync;
pub mod sqlite_store;
pub mod store;
pub mod sync_context;
pub mod transport;

pub use batch_orchestrator::{BatchOrchestrator, SyncJob};
pub use endo_calculator::{calculate_endo, endo_per_plat};
pub use identity::IdentityGenerator;
pub use market_api::MarketApi;
pub use pacing::PacedScheduler;
pub use price_calculator::{calculate_prices, PriceOptions, PriceSummary};
pub use proxy_pool::{ProxyEndpoint, ProxyPool};
pub use resilient_client::{FetchError, ResilientClient, RetryPolicy};
pub use sqlite_store::SqliteStore;
pub use store::{Document, Filter, MemoryStore, Sort, Stage, Store, StoreError};
pub use sync_context::SyncContext;
pub use transport::{HttpTransport, Transport};
