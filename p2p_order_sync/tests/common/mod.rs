#![allow(dead_code)]
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use futures_util::{future::BoxFuture, FutureExt};
use p2p_order_engine::{
    db_types::{Actor, Order, OrderId},
    events::{ChatEvent, OrderEvent},
};
use p2p_order_sync::{OrderFetcher, SyncConfig, SyncError, SyncHooks};

pub fn init_logging() {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
}

pub fn test_config() -> SyncConfig {
    SyncConfig { batch_window: Duration::from_millis(20), ..SyncConfig::default() }
}

/// Long enough for a batch window to close and the flush to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

/// Serves a fixed set of orders and counts how often it was asked.
#[derive(Clone, Default)]
pub struct StaticFetcher {
    orders: Arc<Mutex<Vec<Order>>>,
    calls: Arc<AtomicUsize>,
    offline: Arc<AtomicBool>,
}

impl StaticFetcher {
    pub fn with_orders(orders: Vec<Order>) -> Self {
        let fetcher = Self::default();
        *fetcher.orders.lock().unwrap() = orders;
        fetcher
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OrderFetcher for StaticFetcher {
    async fn fetch_orders_for(&self, actor: &Actor) -> Result<Vec<Order>, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::TransportUnavailable("server unreachable".into()));
        }
        let orders = self.orders.lock().unwrap();
        Ok(orders.iter().filter(|o| o.is_party(actor)).cloned().collect())
    }

    async fn fetch_order(&self, id: &OrderId) -> Result<Order, SyncError> {
        let orders = self.orders.lock().unwrap();
        orders.iter().find(|o| o.id == *id).cloned().ok_or_else(|| SyncError::Rejected {
            status: 404,
            message: format!("order {id} not found"),
        })
    }
}

/// Collects everything the session reports back.
#[derive(Clone, Default)]
pub struct Recorder {
    pub orders: Arc<Mutex<Vec<OrderEvent>>>,
    pub chats: Arc<Mutex<Vec<ChatEvent>>>,
    pub errors: Arc<Mutex<Vec<SyncError>>>,
}

fn record<E: Send + 'static>(sink: Arc<Mutex<Vec<E>>>) -> impl Fn(E) -> BoxFuture<'static, ()> + Send + Sync + 'static {
    move |e| {
        sink.lock().unwrap().push(e);
        async {}.boxed()
    }
}

impl Recorder {
    pub fn hooks(&self) -> SyncHooks {
        let mut hooks = SyncHooks::default();
        hooks
            .on_order_created(record(self.orders.clone()))
            .on_order_status_updated(record(self.orders.clone()))
            .on_order_cancelled(record(self.orders.clone()))
            .on_extension(record(self.orders.clone()))
            .on_chat_event(record(self.chats.clone()))
            .on_sync_error(record(self.errors.clone()));
        hooks
    }

    pub fn order_events(&self) -> Vec<OrderEvent> {
        self.orders.lock().unwrap().clone()
    }

    pub fn versions_for(&self, id: &str) -> Vec<Option<i64>> {
        let id = OrderId::from(id);
        self.orders.lock().unwrap().iter().filter(|e| *e.order_id() == id).map(|e| e.order_version()).collect()
    }

    pub fn errors(&self) -> Vec<SyncError> {
        self.errors.lock().unwrap().clone()
    }

    pub fn chat_count(&self) -> usize {
        self.chats.lock().unwrap().len()
    }
}
