pub mod market;
pub mod relic;
pub mod riven;
mod sync_config;

pub use market::{Envelope, ItemSummary, Order, OrderType};
pub use relic::{Relic, RelicEntry, RelicReward};
pub use riven::{Auction, RivenWeapon};
pub use sync_config::{
    BatchProgress, ClientConfig, EntityOutcome, JobReport, ProxyConfig, SyncConfig, SyncKind,
};
