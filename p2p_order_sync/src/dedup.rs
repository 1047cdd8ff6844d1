//! A short-lived memo of recently seen event keys.
//!
//! The same logical event can arrive more than once: on the broadcast and the personal channel, or through pub-sub and
//! the fallback socket. Keys do not depend on the channel, so repeats collapse here before they reach the batcher.
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use log::*;
use p2p_order_engine::events::OrderEvent;

pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(3);
pub const DEFAULT_EVICTION_AGE: Duration = Duration::from_secs(10);
pub const DEFAULT_SOFT_CAP: usize = 100;

/// The channel-independent identity of an event.
///
/// Status and cancellation keys carry the version, since an order may legally return to an earlier status (a
/// resumed dispute). They also record whether the event carries a snapshot, so a full update is not swallowed by the
/// partial frame of the same change that got here first.
pub fn dedup_key(event: &OrderEvent) -> String {
    match event {
        OrderEvent::Created(p) => format!("created:{}", p.order_id),
        OrderEvent::StatusUpdated(p) => {
            format!("status:{}:{}{}", p.order_id, p.status, version_suffix(event))
        },
        OrderEvent::Cancelled(p) => format!("cancelled:{}{}", p.order_id, version_suffix(event)),
        OrderEvent::ExtensionRequested(p) | OrderEvent::ExtensionResponse(p) => {
            let version = p.order_version.map(|v| v.to_string()).unwrap_or_default();
            format!("extension:{}:{version}", p.order_id)
        },
    }
}

fn version_suffix(event: &OrderEvent) -> String {
    match (event.order_version(), event.snapshot().is_some()) {
        (None, _) => String::new(),
        (Some(v), true) => format!(":{v}:full"),
        (Some(v), false) => format!(":{v}"),
    }
}

#[derive(Debug)]
pub struct DedupCache {
    seen: HashMap<String, Instant>,
    window: Duration,
    eviction_age: Duration,
    soft_cap: usize,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW, DEFAULT_EVICTION_AGE, DEFAULT_SOFT_CAP)
    }
}

impl DedupCache {
    pub fn new(window: Duration, eviction_age: Duration, soft_cap: usize) -> Self {
        Self { seen: HashMap::new(), window, eviction_age, soft_cap }
    }

    pub fn is_duplicate(&mut self, key: &str) -> bool {
        self.is_duplicate_at(key, Instant::now())
    }

    /// True if `key` was already seen less than one window before `now`. Every sighting refreshes the key.
    pub fn is_duplicate_at(&mut self, key: &str, now: Instant) -> bool {
        let duplicate = self
            .seen
            .insert(key.to_string(), now)
            .map(|last_seen| now.saturating_duration_since(last_seen) < self.window)
            .unwrap_or(false);
        if self.seen.len() > self.soft_cap {
            let before = self.seen.len();
            let max_age = self.eviction_age;
            self.seen.retain(|_, seen| now.saturating_duration_since(*seen) <= max_age);
            trace!("🧮️ Dedup cache evicted {} stale keys", before - self.seen.len());
        }
        duplicate
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
