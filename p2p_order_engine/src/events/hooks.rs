use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, OrderEvent, PremiumBumpedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_event_producer: Vec<EventProducer<OrderEvent>>,
    pub premium_bumped_producer: Vec<EventProducer<PremiumBumpedEvent>>,
}

impl EventProducers {
    pub async fn publish_order_event(&self, event: OrderEvent) {
        for producer in &self.order_event_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_premium_bumped(&self, event: PremiumBumpedEvent) {
        for producer in &self.premium_bumped_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_order_event: Option<EventHandler<OrderEvent>>,
    pub on_premium_bumped: Option<EventHandler<PremiumBumpedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_event = hooks.on_order_event.map(|f| EventHandler::new(buffer_size, f));
        let on_premium_bumped = hooks.on_premium_bumped.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_event, on_premium_bumped }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_event {
            result.order_event_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_premium_bumped {
            result.premium_bumped_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_event {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_premium_bumped {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_event: Option<Handler<OrderEvent>>,
    pub on_premium_bumped: Option<Handler<PremiumBumpedEvent>>,
}

impl EventHooks {
    pub fn on_order_event<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_event = Some(Arc::new(f));
        self
    }

    pub fn on_premium_bumped<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PremiumBumpedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_premium_bumped = Some(Arc::new(f));
        self
    }
}
