//! Periodic import scheduler
//!
//! One long-lived background task drives the importer: one pass immediately at
//! startup, then one per interval until the cancellation token fires. A failed
//! pass is logged and the loop carries on to the next tick.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::importer::Importer;

pub fn start(importer: Importer, interval: Duration, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run(importer, interval, token))
}

async fn run(importer: Importer, interval: Duration, token: CancellationToken) {
    info!(
        "Import scheduler started (interval={:.2}h)",
        interval.as_secs_f64() / 3600.0
    );

    let mut ticker = ticker(interval);
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("Import scheduler shutting down");
                break;
            }
            _ = ticker.tick() => {
                match importer.import_batch().await {
                    Ok(inserted) => info!("Metrics import completed (inserted={})", inserted),
                    Err(e) => error!("Error during periodic import: {}", e),
                }
            }
        }
    }
}

/// The first tick fires immediately: that is the startup import pass.
/// An overrunning pass delays the next tick instead of bursting catch-up
/// passes.
fn ticker(interval: Duration) -> Interval {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
