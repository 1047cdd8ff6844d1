//! The client's local mirror of the orders it can see.
//!
//! Nothing writes the projection except the pipeline: the batch flush and the handler for responses to the actor's own
//! mutations. Both go through the version gate.
use std::{collections::HashMap, sync::Arc};

use log::*;
use p2p_order_engine::{
    db_types::{MinimalStatus, Order, OrderId, OrderStatusType},
    events::OrderEvent,
};
use tokio::sync::RwLock;

use crate::version_gate::{should_accept_update, GateDecision, VersionStamp};

pub type SharedProjection = Arc<RwLock<Projection>>;

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedOrder {
    pub order_id: OrderId,
    pub status: OrderStatusType,
    pub minimal_status: MinimalStatus,
    pub previous_status: Option<OrderStatusType>,
    pub stamp: VersionStamp,
    /// The last known full order, with status and version brought forward by any partial updates since
    pub snapshot: Option<Order>,
}

impl ProjectedOrder {
    pub fn version(&self) -> Option<i64> {
        self.stamp.version
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn from_order(order: Order, previous_status: Option<OrderStatusType>) -> Self {
        Self {
            order_id: order.id.clone(),
            status: order.status,
            minimal_status: order.minimal_status,
            previous_status,
            stamp: VersionStamp::of_order(&order),
            snapshot: Some(order),
        }
    }
}

#[derive(Debug, Default)]
pub struct Projection {
    orders: HashMap<OrderId, ProjectedOrder>,
}

impl Projection {
    pub fn shared() -> SharedProjection {
        Arc::new(RwLock::new(Self::default()))
    }

    pub fn get(&self, id: &OrderId) -> Option<&ProjectedOrder> {
        self.orders.get(id)
    }

    pub fn snapshot(&self, id: &OrderId) -> Option<&Order> {
        self.orders.get(id).and_then(|o| o.snapshot.as_ref())
    }

    pub fn orders(&self) -> impl Iterator<Item = &ProjectedOrder> {
        self.orders.values()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn clear(&mut self) {
        self.orders.clear();
    }

    /// Applies a full order, as returned by a fetch or by one of the actor's own mutations.
    pub fn apply_snapshot(&mut self, order: Order) -> GateDecision {
        let decision = should_accept_update(&VersionStamp::of_order(&order), self.orders.get(&order.id).map(|o| &o.stamp));
        if decision.accept {
            let previous = self.orders.get(&order.id).map(|o| o.status);
            self.orders.insert(order.id.clone(), ProjectedOrder::from_order(order, previous));
        } else {
            trace!("🧮️ Snapshot of {} v{} dropped: {}", order.id, order.order_version, decision.reason);
        }
        decision
    }

    /// Applies an event if the gate lets it through.
    ///
    /// A partial event is merged onto the newest snapshot available: the one held here, or `base`, a snapshot that
    /// the event superseded inside the same batch.
    pub fn apply_event(&mut self, event: &OrderEvent, base: Option<&Order>) -> GateDecision {
        let id = event.order_id();
        let stamp = VersionStamp::of_event(event);
        let held = self.orders.get(id);
        let decision = should_accept_update(&stamp, held.map(|o| &o.stamp));
        if !decision.accept {
            trace!("🧮️ {} for {id} dropped: {}", event.name(), decision.reason);
            return decision;
        }
        let next = match event.snapshot() {
            Some(order) => {
                let mut next = ProjectedOrder::from_order(order.clone(), previous_status(event));
                next.stamp = stamp;
                next
            },
            None => merge_partial(event, stamp, held, base),
        };
        self.orders.insert(id.clone(), next);
        decision
    }
}

fn previous_status(event: &OrderEvent) -> Option<OrderStatusType> {
    match event {
        OrderEvent::Created(p) | OrderEvent::StatusUpdated(p) | OrderEvent::Cancelled(p) => p.previous_status,
        _ => None,
    }
}

fn merge_partial(
    event: &OrderEvent,
    stamp: VersionStamp,
    held: Option<&ProjectedOrder>,
    base: Option<&Order>,
) -> ProjectedOrder {
    let held_snapshot = held.and_then(|h| h.snapshot.as_ref());
    let newest = match (held_snapshot, base) {
        (Some(h), Some(b)) if b.order_version > h.order_version => Some(b),
        (Some(h), _) => Some(h),
        (None, b) => b,
    };
    let status = event.status().or(held.map(|h| h.status)).or(newest.map(|o| o.status));
    let status = status.unwrap_or(OrderStatusType::Pending);
    let mut snapshot = newest.cloned();
    if let Some(order) = snapshot.as_mut() {
        order.status = status;
        order.minimal_status = status.minimal();
        if let Some(v) = stamp.version {
            order.order_version = v;
        }
    }
    let previous = previous_status(event).or(held.map(|h| h.status));
    ProjectedOrder {
        order_id: event.order_id().clone(),
        status,
        minimal_status: status.minimal(),
        previous_status: previous,
        stamp,
        snapshot,
    }
}
