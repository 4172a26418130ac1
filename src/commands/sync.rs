use crate::commands::{open_store, runtime};
use crate::error::Result;
use crate::models::{BatchProgress, ClientConfig, JobReport, ProxyConfig, SyncConfig, SyncKind};
use crate::services::SyncContext;

pub struct SyncArgs {
    pub jobs: String,
    pub force: bool,
    pub concurrency: Option<usize>,
    pub limit: Option<usize>,
    pub dry_run: bool,
    pub proxies: bool,
}

pub fn run(args: SyncArgs) {
    let kinds = match SyncKind::parse_kinds(&args.jobs) {
        Ok(kinds) => kinds,
        Err(e) => {
            eprintln!("❌ Error parsing jobs: {}", e);
            std::process::exit(1);
        }
    };

    let mut config = SyncConfig::from_env();
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency.max(1);
    }
    config.limit = args.limit;
    config.force_refresh |= args.force;
    config.use_proxies |= args.proxies;

    println!(
        "🔄 Syncing {} | concurrency {} | pacing {}-{}ms | retries {}{}{}",
        kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", "),
        config.concurrency,
        config.min_delay_ms,
        config.max_delay_ms,
        config.max_retries,
        if config.use_proxies { " | proxies" } else { "" },
        if args.dry_run { " | DRY RUN" } else { "" },
    );
    if config.force_refresh {
        println!("⚡ Force refresh: every stored entity is re-fetched");
    }

    match runtime().block_on(sync_all(kinds, config, args.dry_run)) {
        Ok(reports) => {
            println!();
            for report in &reports {
                println!("✅ {}", report.format_summary());
            }
            let errored: usize = reports.iter().map(|r| r.progress.errored).sum();
            if errored > 0 {
                println!("⚠️  {} entities failed; they will be retried on the next run", errored);
            }
        }
        Err(e) => {
            eprintln!("\n❌ Sync failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn sync_all(kinds: Vec<SyncKind>, config: SyncConfig, dry_run: bool) -> Result<Vec<JobReport>> {
    let store = open_store().await?;
    let context = SyncContext::build(config, &ClientConfig::from_env(), ProxyConfig::from_env(), store)
        .await?
        .with_dry_run(dry_run);

    let mut reports = Vec::new();
    for kind in kinds {
        println!("\n📦 {}", kind.as_str());
        let report = context
            .run_kind(kind, &mut |p: &BatchProgress| {
                println!("   {} ({:.1}%)", p.format_display(), p.percentage())
            })
            .await?;
        reports.push(report);
    }
    Ok(reports)
}
