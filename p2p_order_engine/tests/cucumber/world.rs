use std::sync::{Arc, Mutex};

use cucumber::World;
use log::*;
use p2p_order_engine::{
    db_types::Order,
    events::{EventProducer, OrderEvent},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    OrderFlowApi,
    OrderFlowError,
    SqliteDatabase,
};
use tokio::sync::mpsc;

#[derive(Default, Debug, World)]
pub struct OrderWorld {
    pub system: Option<OrderManagementSystem>,
    /// The result of the last action taken in a `When` step
    pub last_result: Option<Result<Order, String>>,
}

#[derive(Debug)]
pub struct OrderManagementSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub api: OrderFlowApi<SqliteDatabase>,
    pub events: Arc<Mutex<Vec<OrderEvent>>>,
}

impl OrderWorld {
    pub fn api(&self) -> &OrderFlowApi<SqliteDatabase> {
        &self.system.as_ref().expect("OrderFlowApi not initialised").api
    }

    pub fn record(&mut self, result: Result<Order, OrderFlowError>) {
        if let Err(e) = &result {
            debug!("🚀️ Step failed as recorded: {e}");
        }
        self.last_result = Some(result.map_err(|e| e.to_string()));
    }

    pub fn events(&self) -> Vec<OrderEvent> {
        let sys = self.system.as_ref().expect("OrderFlowApi not initialised");
        sys.events.lock().expect("poisoned").clone()
    }
}

impl OrderManagementSystem {
    pub async fn new() -> Self {
        let url = random_db_path();
        let db = prepare_test_env(&url).await;
        debug!("Created database: {url}");
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut producers = p2p_order_engine::events::EventProducers::default();
        producers.order_event_producer.push(collector(events.clone()));
        let api = OrderFlowApi::new(db.clone(), producers);
        Self { db_path: url, db, api, events }
    }
}

/// A producer whose events are collected synchronously by a background task.
fn collector(sink: Arc<Mutex<Vec<OrderEvent>>>) -> EventProducer<OrderEvent> {
    let (tx, mut rx) = mpsc::channel::<OrderEvent>(64);
    tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            sink.lock().expect("poisoned").push(ev);
        }
    });
    EventProducer::new(tx)
}
