use crate::cli::ProxyAction;
use crate::commands::runtime;
use crate::error::{AppError, Result};
use crate::models::ProxyConfig;
use crate::services::sync_context::load_proxy_pool;
use crate::services::ProxyEndpoint;

pub fn run(action: ProxyAction) {
    let config = ProxyConfig::from_env();
    println!("🌐 Proxy pool ({})\n", config.data_dir.display());

    if let Err(e) = runtime().block_on(execute(action, config)) {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn execute(action: ProxyAction, config: ProxyConfig) -> Result<()> {
    let pool = load_proxy_pool(config).await?;

    match action {
        ProxyAction::List => {
            let snapshot = pool.snapshot();
            if snapshot.is_empty() {
                println!("⚠️  No proxies loaded. Set PROXY_LIST_URL or PROXY_LIST_FILE.");
                return Ok(());
            }

            for (idx, health) in snapshot.iter().enumerate() {
                let marker = if idx == pool.cursor() { "➡️ " } else { "   " };
                let rate = health
                    .stats
                    .failure_rate()
                    .map_or_else(|| "-".to_string(), |r| format!("{:.0}%", r * 100.0));
                println!(
                    "{}{:>4}  {:<40} ok {:>4}  fail {:>4}  fail-rate {:>5}{}",
                    marker,
                    idx,
                    health.endpoint.to_string(),
                    health.stats.success_count,
                    health.stats.failure_count,
                    rate,
                    if health.avoided { "  (avoided)" } else { "" },
                );
            }
            println!("\n📊 {} proxies, cursor at {}", snapshot.len(), pool.cursor());
        }
        ProxyAction::Reload => {
            let count = pool.reload().await?;
            println!("✅ Reloaded {} proxies", count);
        }
        ProxyAction::Ban { url } => {
            let endpoint =
                ProxyEndpoint::parse(&url).ok_or_else(|| AppError::InvalidInput(format!("invalid proxy: {}", url)))?;
            pool.ban(&endpoint)?;
            println!("🚫 Banned {} ({} proxies remain)", endpoint, pool.len());
        }
    }

    pool.persist()?;
    Ok(())
}
