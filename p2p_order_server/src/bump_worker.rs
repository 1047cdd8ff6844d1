use std::time::Duration;

use chrono::{DateTime, Utc};
use log::*;
use p2p_order_engine::{events::EventProducers, BumpRunResult, MempoolApi, SqliteDatabase};
use tokio::task::JoinHandle;

use crate::routes::PoolBackend;

/// Starts the auto-bump worker inside the server. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_bump_worker(db: SqliteDatabase, producers: EventProducers, poll_interval: Duration) -> JoinHandle<()> {
    tokio::spawn(bump_worker_loop(MempoolApi::new(db, producers), poll_interval))
}

/// Bumps every due pool entry once per `poll_interval`, forever.
pub async fn bump_worker_loop(api: MempoolApi<SqliteDatabase>, poll_interval: Duration) {
    let mut timer = tokio::time::interval(poll_interval);
    info!("🕰️ Auto-bump worker started. Checking every {poll_interval:?}");
    loop {
        timer.tick().await;
        run_bump_pass(&api, Utc::now()).await;
    }
}

/// One pass over the pool. Failing entries are logged by the auction; returns `None` only if the candidates could not
/// be loaded at all.
pub async fn run_bump_pass<B: PoolBackend>(api: &MempoolApi<B>, now: DateTime<Utc>) -> Option<BumpRunResult> {
    trace!("🕰️ Running auto-bump job");
    match api.bump_eligible_entries(now).await {
        Ok(run) => {
            if run.bumped_count() > 0 || run.failure_count() > 0 {
                info!("🕰️ {} pool entries bumped, {} failed", run.bumped_count(), run.failure_count());
            }
            if !run.skipped.is_empty() {
                debug!("🕰️ Entries already at their cap: {:?}", run.skipped);
            }
            Some(run)
        },
        Err(e) => {
            error!("🕰️ Error running auto-bump job: {e}");
            None
        },
    }
}
