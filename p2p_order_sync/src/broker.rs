//! Named realtime channels.
//!
//! A [`ChannelSource`] hands out a receiver per channel name. [`LocalBroker`] is the in-process implementation: the
//! engine's order hook publishes into it and sync sessions subscribe to it.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use futures_util::FutureExt;
use log::*;
use p2p_order_engine::events::{channels_for, ChannelName, ChatEvent, Handler, OrderEvent};
use tokio::sync::broadcast;

use crate::SyncError;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum BrokerMessage {
    Order(OrderEvent),
    Chat(ChatEvent),
}

pub trait ChannelSource: Clone + Send + Sync + 'static {
    fn subscribe(&self, channel: &ChannelName) -> Result<broadcast::Receiver<BrokerMessage>, SyncError>;
}

#[derive(Clone)]
pub struct LocalBroker {
    channels: Arc<Mutex<HashMap<ChannelName, broadcast::Sender<BrokerMessage>>>>,
    capacity: usize,
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl LocalBroker {
    pub fn new(capacity: usize) -> Self {
        Self { channels: Arc::new(Mutex::new(HashMap::new())), capacity: capacity.max(1) }
    }

    /// Publishes a message on a channel. Returns the number of subscribers that received it.
    ///
    /// A channel whose last subscriber has gone is dropped here.
    pub fn publish(&self, channel: &ChannelName, message: BrokerMessage) -> usize {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        match channels.get(channel) {
            Some(sender) if sender.receiver_count() > 0 => sender.send(message).unwrap_or(0),
            Some(_) => {
                channels.remove(channel);
                trace!("📡️ Closed {channel}, its last subscriber left");
                0
            },
            None => {
                trace!("📡️ Nobody is listening on {channel}");
                0
            },
        }
    }

    pub fn publish_order_event(&self, event: &OrderEvent) {
        for channel in channels_for(event) {
            let n = self.publish(&channel, BrokerMessage::Order(event.clone()));
            trace!("📡️ {} for order {} sent to {n} subscribers on {channel}", event.name(), event.order_id());
        }
    }

    pub fn publish_chat(&self, event: ChatEvent) {
        let channel = ChannelName::Order(event.order_id().clone());
        self.publish(&channel, BrokerMessage::Chat(event));
    }

    pub fn subscriber_count(&self, channel: &ChannelName) -> usize {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.get(channel).map(|s| s.receiver_count()).unwrap_or(0)
    }

    /// The number of channels the broker still holds a sender for.
    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// An order event handler for the engine's `EventHooks` that fans each event out to its channels.
    pub fn order_event_hook(&self) -> Handler<OrderEvent> {
        let broker = self.clone();
        Arc::new(move |event: OrderEvent| {
            let broker = broker.clone();
            async move { broker.publish_order_event(&event) }.boxed()
        })
    }
}

impl ChannelSource for LocalBroker {
    fn subscribe(&self, channel: &ChannelName) -> Result<broadcast::Receiver<BrokerMessage>, SyncError> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.retain(|_, sender| sender.receiver_count() > 0);
        let sender = channels.entry(channel.clone()).or_insert_with(|| broadcast::channel(self.capacity).0);
        debug!("📡️ New subscriber on {channel}");
        Ok(sender.subscribe())
    }
}
