use crate::commands::{open_store, runtime};
use crate::constants::SYNC_INFO_FILE;
use crate::error::Result;
use crate::models::{ClientConfig, ProxyConfig, SyncConfig};
use crate::services::SyncContext;
use crate::utils::get_data_dir;
use crate::worker::run_sync_worker;

pub fn run(interval_secs: u64, once: bool) {
    println!("🚀 Starting sync worker (every {}s{})", interval_secs, if once { ", single cycle" } else { "" });

    if let Err(e) = runtime().block_on(start(interval_secs, once)) {
        eprintln!("❌ Worker failed: {}", e);
        std::process::exit(1);
    }
}

async fn start(interval_secs: u64, once: bool) -> Result<()> {
    let store = open_store().await?;
    let context = SyncContext::build(SyncConfig::from_env(), &ClientConfig::from_env(), ProxyConfig::from_env(), store).await?;
    let info_path = get_data_dir().join(SYNC_INFO_FILE);

    run_sync_worker(&context, &info_path, interval_secs, once).await;
    Ok(())
}
