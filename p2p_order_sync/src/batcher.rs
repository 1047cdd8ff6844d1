//! Coalesces bursts of order events into one update per order.
//!
//! The batcher only holds the queue. The pipeline owns the timer: [`EventBatcher::enqueue`] says when a flush has to
//! be armed, and the pipeline calls [`EventBatcher::drain`] once the window closes.
use std::{collections::HashMap, time::Duration};

use log::*;
use p2p_order_engine::{
    db_types::{Order, OrderId},
    events::OrderEvent,
};

use crate::version_gate::{should_accept_update, VersionStamp};

pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(100);

/// The surviving event for one order in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Coalesced {
    pub event: OrderEvent,
    /// The snapshot of an event this one superseded, for a partial survivor to be merged onto
    pub base: Option<Order>,
    /// Position of the surviving event in the queue
    pub seq: usize,
}

#[derive(Debug, Default)]
pub struct Batch {
    /// One entry per order, in the order the surviving events were enqueued
    pub survivors: Vec<Coalesced>,
    /// Set if any event in the window lacked the data needed to apply it
    pub needs_refetch: bool,
    pub received: usize,
}

#[derive(Debug, Default)]
pub struct EventBatcher {
    queue: Vec<OrderEvent>,
    armed: bool,
}

impl EventBatcher {
    /// Queues an event. Returns true if this is the first event of a window, in which case a flush must be scheduled.
    pub fn enqueue(&mut self, event: OrderEvent) -> bool {
        self.queue.push(event);
        if self.armed {
            false
        } else {
            self.armed = true;
            true
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn drain(&mut self) -> Batch {
        self.armed = false;
        coalesce(std::mem::take(&mut self.queue))
    }

    pub fn clear(&mut self) {
        self.armed = false;
        self.queue.clear();
    }
}

/// A `created` event without a snapshot, or any event without version or snapshot, cannot be applied on its own.
pub fn lacks_data(event: &OrderEvent) -> bool {
    event.snapshot().is_none() && (matches!(event, OrderEvent::Created(_)) || event.order_version().is_none())
}

fn coalesce(events: Vec<OrderEvent>) -> Batch {
    let received = events.len();
    let mut needs_refetch = false;
    let mut by_order: HashMap<OrderId, Coalesced> = HashMap::new();
    for (seq, event) in events.into_iter().enumerate() {
        needs_refetch |= lacks_data(&event);
        let Some(held) = by_order.get_mut(event.order_id()) else {
            by_order.insert(event.order_id().clone(), Coalesced { event, base: None, seq });
            continue;
        };
        let decision = should_accept_update(&VersionStamp::of_event(&event), Some(&VersionStamp::of_event(&held.event)));
        if decision.accept {
            let base = match event.snapshot() {
                Some(_) => None,
                None => held.event.snapshot().cloned().or_else(|| held.base.take()),
            };
            *held = Coalesced { event, base, seq };
        } else {
            trace!("🧮️ {} for {} superseded within the batch: {}", event.name(), event.order_id(), decision.reason);
            needs_refetch |= decision.needs_refetch();
        }
    }
    let mut survivors = by_order.into_values().collect::<Vec<_>>();
    survivors.sort_by_key(|c| c.seq);
    trace!("🧮️ {received} events coalesced into {} updates", survivors.len());
    Batch { survivors, needs_refetch, received }
}
