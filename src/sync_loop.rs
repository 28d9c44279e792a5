use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};

use crate::processor::{BlockchainProcessor, SyncError, SyncReport};

/// One pass over `currencies`, one after the other. A failing currency does
/// not stop the others.
pub async fn sync_once(
    processor: &BlockchainProcessor,
    currencies: &[String],
) -> Vec<Result<SyncReport, SyncError>> {
    let mut results = Vec::with_capacity(currencies.len());
    for currency in currencies {
        let progress = |message: &str| info!("SYNC - {currency}: {message}");
        let result = processor.sync(currency, &progress).await;
        match &result {
            Ok(report) if report.blocks_folded > 0 || report.previous_buid.is_empty() => {
                info!(
                    "SYNC - {currency} at {} (run {})",
                    report.current_buid, report.run_id
                )
            }
            Ok(_) => {}
            Err(e) if e.is_retryable() => warn!("SYNC - {currency} skipped this round: {e}"),
            Err(e) => error!("SYNC - {currency} failed: {e}"),
        }
        results.push(result);
    }
    results
}

/// Sync every configured currency each `period`, forever. A zero period
/// disables the loop.
pub async fn run(processor: Arc<BlockchainProcessor>, currencies: Vec<String>, period: Duration) {
    if period.is_zero() || currencies.is_empty() {
        info!("SYNC - background sync disabled");
        return;
    }
    info!(
        "SYNC - syncing {} every {}s",
        currencies.join(", "),
        period.as_secs()
    );
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        sync_once(&processor, &currencies).await;
    }
}
