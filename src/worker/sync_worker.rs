use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use crate::constants::WORKER_LOOP_CHECK_SECS;
use crate::models::{BatchProgress, SyncKind};
use crate::services::SyncContext;
use crate::worker::SyncInfo;

/// Jobs in the order one cycle runs them (catalog first so prices see new items)
const JOB_ORDER: [SyncKind; 4] = [SyncKind::Items, SyncKind::Prices, SyncKind::Rivens, SyncKind::Relics];

/// Run every job whose last successful run is older than `interval_secs`,
/// forever (or for a single cycle with `once`)
#[instrument(skip(context, info_path))]
pub async fn run(context: &SyncContext, info_path: &Path, interval_secs: u64, once: bool) {
    let mut info = SyncInfo::load(info_path);
    let loop_check = Duration::from_secs(WORKER_LOOP_CHECK_SECS.min(interval_secs.max(1)));

    info!(
        worker = "Sync",
        interval_secs = interval_secs,
        loop_check_secs = loop_check.as_secs(),
        previous_iterations = info.iteration_count,
        "Sync worker started"
    );

    loop {
        info.iteration_count += 1;
        let iteration = info.iteration_count;
        let loop_start = Instant::now();

        let due: Vec<SyncKind> = JOB_ORDER
            .into_iter()
            .filter(|kind| info.should_sync(*kind, interval_secs))
            .collect();

        if due.is_empty() {
            info!(worker = "Sync", iteration = iteration, "No job due");
        }

        for kind in due {
            info!(worker = "Sync", iteration = iteration, job = kind.as_str(), "Running job");

            match context.run_kind(kind, &mut |_: &BatchProgress| {}).await {
                Ok(report) => {
                    info!(
                        worker = "Sync",
                        iteration = iteration,
                        job = kind.as_str(),
                        new = report.progress.new,
                        updated = report.progress.updated,
                        skipped = report.progress.skipped,
                        removed = report.progress.removed,
                        errored = report.progress.errored,
                        duration_s = report.progress.elapsed.as_secs_f64(),
                        "Job completed"
                    );
                    info.mark_synced(kind);
                }
                Err(e) => {
                    error!(worker = "Sync", iteration = iteration, job = kind.as_str(), error = %e, "Job failed");
                }
            }

            if let Err(e) = info.save(info_path) {
                warn!(worker = "Sync", error = %e, "Failed to save sync info");
            }
        }

        if let Err(e) = info.save(info_path) {
            warn!(worker = "Sync", error = %e, "Failed to save sync info");
        }

        info!(
            worker = "Sync",
            iteration = iteration,
            loop_duration_s = loop_start.elapsed().as_secs_f64(),
            "Cycle finished"
        );

        if once {
            break;
        }
        sleep(loop_check).await;
    }
}
