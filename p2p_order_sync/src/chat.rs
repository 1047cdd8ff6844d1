//! Chat threads for the orders an actor is trading on.
//!
//! Sends are optimistic: the message shows up straight away as [`Delivery::Pending`] and is confirmed when the server
//! answers, or echoes it back with the client id. A failed send is kept and marked [`Delivery::Failed`] so it is
//! visibly distinct from a delivered one.
use std::{
    collections::{HashMap, HashSet},
    future::Future,
};

use chrono::{DateTime, Utc};
use log::*;
use p2p_order_engine::{
    db_types::{Actor, OrderId},
    events::{ChatEvent, ChatMessagePayload},
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{projection::ProjectedOrder, SyncError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Pending,
    Confirmed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub local_id: String,
    pub server_id: Option<String>,
    pub order_id: OrderId,
    pub sender: Actor,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub delivery: Delivery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    #[serde(rename = "clientId")]
    pub client_id: String,
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
    pub sender: Actor,
    pub body: String,
}

pub trait MessageSender: Send + Sync + 'static {
    fn send_message(
        &self,
        message: &OutgoingMessage,
    ) -> impl Future<Output = Result<ChatMessagePayload, SyncError>> + Send;
}

/// An order is a chat concern while the actor is a party to it and it is still open.
pub fn is_chat_concern(order: &ProjectedOrder, actor: &Actor) -> bool {
    !order.is_terminal() && order.snapshot.as_ref().map(|o| o.is_party(actor)).unwrap_or(false)
}

#[derive(Debug, Default)]
pub struct ChatLog {
    threads: HashMap<OrderId, Vec<ChatMessage>>,
    typing: HashMap<OrderId, HashSet<Actor>>,
}

impl ChatLog {
    pub fn thread(&self, order_id: &OrderId) -> &[ChatMessage] {
        self.threads.get(order_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn typing(&self, order_id: &OrderId) -> Vec<&Actor> {
        self.typing.get(order_id).map(|t| t.iter().collect()).unwrap_or_default()
    }

    /// Adds a pending message to the thread and returns what should be sent to the server.
    ///
    /// The client id is seen by every participant of the order, so it has to be unique beyond this log.
    pub fn begin_send(&mut self, order_id: &OrderId, sender: &Actor, body: &str, now: DateTime<Utc>) -> OutgoingMessage {
        let local_id = format!("{sender}-{:016x}", rand::random::<u64>());
        self.threads.entry(order_id.clone()).or_default().push(ChatMessage {
            local_id: local_id.clone(),
            server_id: None,
            order_id: order_id.clone(),
            sender: sender.clone(),
            body: body.to_string(),
            sent_at: now,
            delivery: Delivery::Pending,
        });
        OutgoingMessage { client_id: local_id, order_id: order_id.clone(), sender: sender.clone(), body: body.to_string() }
    }

    pub fn fail(&mut self, order_id: &OrderId, local_id: &str, reason: String) {
        if let Some(msg) = self.find_local(order_id, local_id, None) {
            warn!("📡️ Message {local_id} on order {order_id} was not delivered: {reason}");
            msg.delivery = Delivery::Failed(reason);
        }
    }

    /// Records a message from the server. Returns true if it was new to this log.
    ///
    /// The server's copy of one of our own pending messages confirms it rather than adding a second copy. Only a
    /// message from the same sender can confirm a local one.
    pub fn receive(&mut self, payload: ChatMessagePayload) -> bool {
        let order_id = payload.order_id.clone();
        if let Some(local_id) = payload.client_id.as_deref() {
            if let Some(msg) = self.find_local(&order_id, local_id, Some(&payload.sender)) {
                let fresh = msg.server_id.is_none();
                msg.server_id = Some(payload.id);
                msg.sent_at = payload.sent_at;
                msg.delivery = Delivery::Confirmed;
                return fresh;
            }
        }
        let thread = self.threads.entry(order_id.clone()).or_default();
        if thread.iter().any(|m| m.server_id.as_deref() == Some(payload.id.as_str())) {
            return false;
        }
        thread.push(ChatMessage {
            local_id: payload.id.clone(),
            server_id: Some(payload.id),
            order_id,
            sender: payload.sender,
            body: payload.body,
            sent_at: payload.sent_at,
            delivery: Delivery::Confirmed,
        });
        true
    }

    pub fn apply_event(&mut self, event: &ChatEvent) {
        match event {
            ChatEvent::MessageNew(payload) => {
                self.receive(payload.clone());
            },
            ChatEvent::TypingStart(t) => {
                self.typing.entry(t.order_id.clone()).or_default().insert(t.actor.clone());
            },
            ChatEvent::TypingStop(t) => {
                if let Some(typing) = self.typing.get_mut(&t.order_id) {
                    typing.remove(&t.actor);
                }
            },
        }
    }

    fn find_local(&mut self, order_id: &OrderId, local_id: &str, sender: Option<&Actor>) -> Option<&mut ChatMessage> {
        self.threads
            .get_mut(order_id)
            .and_then(|t| t.iter_mut().find(|m| m.local_id == local_id && sender.map_or(true, |s| m.sender == *s)))
    }
}

/// Sends a chat message optimistically. The message is in the log as pending before the request goes out; on
/// failure it stays in the log as failed and the error is returned.
pub async fn send_message<S: MessageSender>(
    log: &Mutex<ChatLog>,
    sender: &S,
    order_id: &OrderId,
    actor: &Actor,
    body: &str,
) -> Result<ChatMessage, SyncError> {
    let outgoing = log.lock().await.begin_send(order_id, actor, body, Utc::now());
    let result = sender.send_message(&outgoing).await;
    let mut log = log.lock().await;
    match result {
        Ok(payload) => {
            let payload = ChatMessagePayload { client_id: Some(outgoing.client_id.clone()), ..payload };
            log.receive(payload);
        },
        Err(e) => {
            log.fail(order_id, &outgoing.client_id, e.to_string());
            return Err(e);
        },
    }
    log.thread(order_id)
        .iter()
        .find(|m| m.local_id == outgoing.client_id)
        .cloned()
        .ok_or_else(|| SyncError::InvalidResponse(format!("message {} vanished from the log", outgoing.client_id)))
}
