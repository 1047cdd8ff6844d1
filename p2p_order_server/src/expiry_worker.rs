use std::time::Duration;

use chrono::{DateTime, Utc};
use log::*;
use p2p_order_engine::{
    db_types::Order,
    events::EventProducers,
    traits::{ExpiryResult, OrderStore},
    OrderFlowApi,
    SqliteDatabase,
};
use tokio::task::JoinHandle;

/// Starts the expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_expiry_worker(db: SqliteDatabase, producers: EventProducers, poll_interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(poll_interval);
        let api = OrderFlowApi::new(db, producers);
        info!("🕰️ Order expiry worker started. Checking every {poll_interval:?}");
        loop {
            timer.tick().await;
            run_expiry_pass(&api, Utc::now()).await;
        }
    })
}

/// Expires everything that is overdue at `now`. Returns `None` if the overdue orders could not be loaded.
pub async fn run_expiry_pass<B: OrderStore>(api: &OrderFlowApi<B>, now: DateTime<Utc>) -> Option<ExpiryResult> {
    trace!("🕰️ Running order expiry job");
    match api.expire_overdue_orders(now).await {
        Ok(result) => {
            if result.expired_count() > 0 || result.failed_count() > 0 {
                info!("🕰️ {} orders expired, {} could not be expired", result.expired_count(), result.failed_count());
                debug!("🕰️ Expired orders: {}", order_list(&result.expired));
            }
            Some(result)
        },
        Err(e) => {
            error!("🕰️ Error running order expiry job: {e}");
            None
        },
    }
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] {} user: {} merchant: {}", o.id, o.order_number, o.user_id, o.merchant_id))
        .collect::<Vec<String>>()
        .join(", ")
}
