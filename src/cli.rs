use clap::{Parser, Subcommand};

use crate::commands;

#[derive(Parser)]
#[command(name = "wfm-sync")]
#[command(about = "Resilient warframe.market ingestion engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run sync jobs once
    Sync {
        /// Jobs to run: items, prices, rivens, relics, all, or comma-separated (e.g. items,prices)
        #[arg(default_value = "all")]
        jobs: String,

        /// Re-fetch entities even when already enriched
        #[arg(long)]
        force: bool,

        /// Entities fetched concurrently per chunk (default: SYNC_CONCURRENCY or 5)
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Only process the first N entities of each job
        #[arg(short, long)]
        limit: Option<usize>,

        /// Fetch and count without writing to the store
        #[arg(long)]
        dry_run: bool,

        /// Route requests through the proxy pool (default: USE_PROXIES)
        #[arg(long)]
        proxies: bool,
    },
    /// Inspect and maintain the proxy pool
    Proxies {
        #[command(subcommand)]
        action: ProxyAction,
    },
    /// Show stored collection counts and best riven deals
    Status {
        /// Number of rivens to list
        #[arg(short, long, default_value_t = 10)]
        top: usize,
    },
    /// Run all sync jobs periodically
    Worker {
        /// Seconds between sync cycles per job
        #[arg(long, default_value_t = 3600)]
        interval_secs: u64,

        /// Run one cycle and exit
        #[arg(long)]
        once: bool,
    },
}

#[derive(Subcommand)]
pub enum ProxyAction {
    /// List proxies with their health statistics
    List,
    /// Re-fetch the proxy list from its configured source
    Reload,
    /// Ban a proxy permanently
    Ban {
        /// Proxy URL or host:port
        url: String,
    },
}

pub fn run() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            jobs,
            force,
            concurrency,
            limit,
            dry_run,
            proxies,
        } => {
            commands::sync::run(commands::sync::SyncArgs {
                jobs,
                force,
                concurrency,
                limit,
                dry_run,
                proxies,
            });
        }
        Commands::Proxies { action } => {
            commands::proxies::run(action);
        }
        Commands::Status { top } => {
            commands::status::run(top);
        }
        Commands::Worker { interval_secs, once } => {
            commands::worker::run(interval_secs, once);
        }
    }
}
