use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use p2p_common::Bps;
use serde::{Deserialize, Serialize};

use crate::db_types::{Actor, MinimalStatus, Order, OrderId, OrderStatusType};

//--------------------------------------     Order events      ---------------------------------------------------------

/// Payload shared by the created, status and cancelled events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
    pub status: OrderStatusType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimal_status: Option<MinimalStatus>,
    #[serde(default)]
    pub order_version: Option<i64>,
    #[serde(rename = "previousStatus", default)]
    pub previous_status: Option<OrderStatusType>,
    /// The full order snapshot, when the publisher has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Order>,
}

impl StatusPayload {
    /// A payload carrying the full snapshot of `order`.
    pub fn snapshot(order: &Order, previous_status: Option<OrderStatusType>) -> Self {
        Self {
            order_id: order.id.clone(),
            status: order.status,
            minimal_status: Some(order.minimal_status),
            order_version: Some(order.order_version),
            previous_status,
            data: Some(order.clone()),
        }
    }

    /// A payload without a snapshot. Receivers will have to refetch the order.
    pub fn partial(order_id: OrderId, status: OrderStatusType, order_version: Option<i64>) -> Self {
        Self {
            order_id,
            status,
            minimal_status: Some(status.minimal()),
            order_version,
            previous_status: None,
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionPayload {
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
    #[serde(default)]
    pub order_version: Option<i64>,
    #[serde(rename = "requestedBy", default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<Actor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes: Option<i64>,
    /// Only set on responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Order>,
}

/// Everything that happens to an order that other parties need to hear about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum OrderEvent {
    #[serde(rename = "ORDER_CREATED")]
    Created(StatusPayload),
    #[serde(rename = "ORDER_STATUS_UPDATED")]
    StatusUpdated(StatusPayload),
    #[serde(rename = "ORDER_CANCELLED")]
    Cancelled(StatusPayload),
    #[serde(rename = "ORDER_EXTENSION_REQUESTED")]
    ExtensionRequested(ExtensionPayload),
    #[serde(rename = "ORDER_EXTENSION_RESPONSE")]
    ExtensionResponse(ExtensionPayload),
}

impl OrderEvent {
    pub fn created(order: &Order) -> Self {
        Self::Created(StatusPayload::snapshot(order, None))
    }

    /// The right event for a status change: cancellations get their own event name.
    pub fn status_changed(order: &Order, previous: OrderStatusType) -> Self {
        let payload = StatusPayload::snapshot(order, Some(previous));
        match order.status {
            OrderStatusType::Cancelled => Self::Cancelled(payload),
            _ => Self::StatusUpdated(payload),
        }
    }

    pub fn extension_requested(order: &Order) -> Self {
        let request = order.pending_extension.as_ref();
        Self::ExtensionRequested(ExtensionPayload {
            order_id: order.id.clone(),
            order_version: Some(order.order_version),
            requested_by: request.map(|r| r.requested_by.clone()),
            minutes: request.map(|r| r.minutes),
            accepted: None,
            data: Some(order.clone()),
        })
    }

    pub fn extension_response(order: &Order, accepted: bool) -> Self {
        Self::ExtensionResponse(ExtensionPayload {
            order_id: order.id.clone(),
            order_version: Some(order.order_version),
            requested_by: None,
            minutes: None,
            accepted: Some(accepted),
            data: Some(order.clone()),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Created(_) => "ORDER_CREATED",
            Self::StatusUpdated(_) => "ORDER_STATUS_UPDATED",
            Self::Cancelled(_) => "ORDER_CANCELLED",
            Self::ExtensionRequested(_) => "ORDER_EXTENSION_REQUESTED",
            Self::ExtensionResponse(_) => "ORDER_EXTENSION_RESPONSE",
        }
    }

    pub fn order_id(&self) -> &OrderId {
        match self {
            Self::Created(p) | Self::StatusUpdated(p) | Self::Cancelled(p) => &p.order_id,
            Self::ExtensionRequested(p) | Self::ExtensionResponse(p) => &p.order_id,
        }
    }

    pub fn order_version(&self) -> Option<i64> {
        match self {
            Self::Created(p) | Self::StatusUpdated(p) | Self::Cancelled(p) => p.order_version,
            Self::ExtensionRequested(p) | Self::ExtensionResponse(p) => p.order_version,
        }
    }

    /// The status the event reports, if it reports one.
    pub fn status(&self) -> Option<OrderStatusType> {
        match self {
            Self::Created(p) | Self::StatusUpdated(p) | Self::Cancelled(p) => Some(p.status),
            Self::ExtensionRequested(p) | Self::ExtensionResponse(p) => p.data.as_ref().map(|o| o.status),
        }
    }

    pub fn snapshot(&self) -> Option<&Order> {
        match self {
            Self::Created(p) | Self::StatusUpdated(p) | Self::Cancelled(p) => p.data.as_ref(),
            Self::ExtensionRequested(p) | Self::ExtensionResponse(p) => p.data.as_ref(),
        }
    }

    pub fn into_snapshot(self) -> Option<Order> {
        match self {
            Self::Created(p) | Self::StatusUpdated(p) | Self::Cancelled(p) => p.data,
            Self::ExtensionRequested(p) | Self::ExtensionResponse(p) => p.data,
        }
    }
}

//--------------------------------------      Chat events      ---------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessagePayload {
    /// Assigned by the server
    pub id: String,
    /// The sender's own id for the message, echoed back so the sender can confirm its optimistic copy
    #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
    pub sender: Actor,
    pub body: String,
    #[serde(rename = "sentAt")]
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingPayload {
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
    pub actor: Actor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ChatEvent {
    #[serde(rename = "MESSAGE_NEW")]
    MessageNew(ChatMessagePayload),
    #[serde(rename = "TYPING_START")]
    TypingStart(TypingPayload),
    #[serde(rename = "TYPING_STOP")]
    TypingStop(TypingPayload),
}

impl ChatEvent {
    pub fn order_id(&self) -> &OrderId {
        match self {
            Self::MessageNew(m) => &m.order_id,
            Self::TypingStart(t) | Self::TypingStop(t) => &t.order_id,
        }
    }
}

//--------------------------------------    Auction events     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PremiumBumpedEvent {
    pub entry_id: i64,
    pub order_id: OrderId,
    pub new_premium_bps: Bps,
    pub max_reached: bool,
}

//--------------------------------------       Channels        ---------------------------------------------------------

/// The named channels events are published on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ChannelName {
    /// `user-<userId>`
    User(String),
    /// `merchant-<merchantId>`
    Merchant(String),
    /// `merchants-global`: new orders, seen by every merchant
    MerchantsGlobal,
    /// `order-<orderId>`: chat and per-order updates
    Order(OrderId),
}

impl Display for ChannelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(id) => write!(f, "user-{id}"),
            Self::Merchant(id) => write!(f, "merchant-{id}"),
            Self::MerchantsGlobal => write!(f, "merchants-global"),
            Self::Order(id) => write!(f, "order-{id}"),
        }
    }
}

impl FromStr for ChannelName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "merchants-global" {
            return Ok(Self::MerchantsGlobal);
        }
        let (prefix, id) = s.split_once('-').ok_or_else(|| format!("Invalid channel name: {s}"))?;
        if id.is_empty() {
            return Err(format!("Channel name {s} has no id"));
        }
        match prefix {
            "user" => Ok(Self::User(id.to_string())),
            "merchant" => Ok(Self::Merchant(id.to_string())),
            "order" => Ok(Self::Order(OrderId::from(id))),
            _ => Err(format!("Unknown channel prefix in {s}")),
        }
    }
}

impl From<ChannelName> for String {
    fn from(value: ChannelName) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for ChannelName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Where an order event goes.
///
/// * `ORDER_CREATED` goes to the global merchant feed and to the creating user.
/// * Everything else goes to the user, the merchant, the buyer merchant (if any) and the order's own channel.
///
/// Without a snapshot the parties are unknown and only the order channel is used.
pub fn channels_for(event: &OrderEvent) -> Vec<ChannelName> {
    let Some(order) = event.snapshot() else {
        return vec![ChannelName::Order(event.order_id().clone())];
    };
    match event {
        OrderEvent::Created(_) => vec![ChannelName::MerchantsGlobal, ChannelName::User(order.user_id.clone())],
        _ => {
            let mut channels =
                vec![ChannelName::User(order.user_id.clone()), ChannelName::Merchant(order.merchant_id.clone())];
            if let Some(buyer) = &order.buyer_merchant_id {
                channels.push(ChannelName::Merchant(buyer.clone()));
            }
            channels.push(ChannelName::Order(order.id.clone()));
            channels
        },
    }
}

/// An event together with the channel it was published on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Published<E> {
    pub channel: ChannelName,
    pub event: E,
}

impl<E> Published<E> {
    pub fn new(channel: ChannelName, event: E) -> Self {
        Self { channel, event }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn channel_names_round_trip() {
        for name in ["user-alice", "merchant-m1", "merchants-global", "order-abc-123"] {
            let channel: ChannelName = name.parse().unwrap();
            assert_eq!(channel.to_string(), name);
        }
        assert_eq!("order-abc-123".parse::<ChannelName>().unwrap(), ChannelName::Order(OrderId::from("abc-123")));
        assert!("user-".parse::<ChannelName>().is_err());
        assert!("admin-1".parse::<ChannelName>().is_err());
    }

    #[test]
    fn partial_status_event_wire_format() {
        let ev = OrderEvent::StatusUpdated(StatusPayload::partial("o1".into(), OrderStatusType::Escrowed, Some(4)));
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "ORDER_STATUS_UPDATED");
        assert_eq!(json["payload"]["orderId"], "o1");
        assert_eq!(json["payload"]["status"], "escrowed");
        assert_eq!(json["payload"]["minimal_status"], "escrowed");
        assert_eq!(json["payload"]["order_version"], 4);
        assert!(json["payload"].get("data").is_none());
        let back: OrderEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn events_without_snapshot_only_reach_the_order_channel() {
        let ev = OrderEvent::Cancelled(StatusPayload::partial("o9".into(), OrderStatusType::Cancelled, None));
        assert_eq!(channels_for(&ev), vec![ChannelName::Order("o9".into())]);
    }
}
