//! Consumer callbacks for a sync session.
//!
//! Callbacks use the engine's [`Handler`] type. They run on the session's pipeline task after the projection has been
//! updated, one at a time and in enqueue order.
use std::{future::Future, pin::Pin, sync::Arc};

use p2p_order_engine::events::{ChatEvent, Handler, OrderEvent};

use crate::SyncError;

#[derive(Default, Clone)]
pub struct SyncHooks {
    pub on_order_created: Option<Handler<OrderEvent>>,
    pub on_order_status_updated: Option<Handler<OrderEvent>>,
    pub on_order_cancelled: Option<Handler<OrderEvent>>,
    pub on_extension: Option<Handler<OrderEvent>>,
    pub on_chat_event: Option<Handler<ChatEvent>>,
    pub on_sync_error: Option<Handler<SyncError>>,
}

type BoxedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

impl SyncHooks {
    pub fn on_order_created<F>(&mut self, f: F) -> &mut Self
    where F: Fn(OrderEvent) -> BoxedFuture + Send + Sync + 'static {
        self.on_order_created = Some(Arc::new(f));
        self
    }

    pub fn on_order_status_updated<F>(&mut self, f: F) -> &mut Self
    where F: Fn(OrderEvent) -> BoxedFuture + Send + Sync + 'static {
        self.on_order_status_updated = Some(Arc::new(f));
        self
    }

    pub fn on_order_cancelled<F>(&mut self, f: F) -> &mut Self
    where F: Fn(OrderEvent) -> BoxedFuture + Send + Sync + 'static {
        self.on_order_cancelled = Some(Arc::new(f));
        self
    }

    pub fn on_extension<F>(&mut self, f: F) -> &mut Self
    where F: Fn(OrderEvent) -> BoxedFuture + Send + Sync + 'static {
        self.on_extension = Some(Arc::new(f));
        self
    }

    pub fn on_chat_event<F>(&mut self, f: F) -> &mut Self
    where F: Fn(ChatEvent) -> BoxedFuture + Send + Sync + 'static {
        self.on_chat_event = Some(Arc::new(f));
        self
    }

    pub fn on_sync_error<F>(&mut self, f: F) -> &mut Self
    where F: Fn(SyncError) -> BoxedFuture + Send + Sync + 'static {
        self.on_sync_error = Some(Arc::new(f));
        self
    }

    /// Routes an applied order event to its callback.
    pub(crate) async fn order_event(&self, event: OrderEvent) {
        let handler = match &event {
            OrderEvent::Created(_) => &self.on_order_created,
            OrderEvent::StatusUpdated(_) => &self.on_order_status_updated,
            OrderEvent::Cancelled(_) => &self.on_order_cancelled,
            OrderEvent::ExtensionRequested(_) | OrderEvent::ExtensionResponse(_) => &self.on_extension,
        };
        if let Some(f) = handler {
            f(event).await;
        }
    }

    pub(crate) async fn chat_event(&self, event: ChatEvent) {
        if let Some(f) = &self.on_chat_event {
            f(event).await;
        }
    }

    pub(crate) async fn sync_error(&self, error: SyncError) {
        if let Some(f) = &self.on_sync_error {
            f(error).await;
        }
    }
}
