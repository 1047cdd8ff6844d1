//! Decides whether an incoming update for an order supersedes the one held locally.
//!
//! The gate is a pure function of the two version stamps. Because it imposes a total order on the updates for an
//! order, the local view converges on the snapshot with the highest `order_version` no matter how the events were
//! delivered, duplicated or reordered.
use std::fmt::Display;

use p2p_order_engine::{db_types::Order, events::OrderEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    /// The update carries the whole order
    Full,
    /// Only status and version metadata
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionStamp {
    pub version: Option<i64>,
    pub completeness: Completeness,
}

impl VersionStamp {
    pub fn full(version: i64) -> Self {
        Self { version: Some(version), completeness: Completeness::Full }
    }

    pub fn partial(version: Option<i64>) -> Self {
        Self { version, completeness: Completeness::Partial }
    }

    pub fn of_order(order: &Order) -> Self {
        Self::full(order.order_version)
    }

    pub fn of_event(event: &OrderEvent) -> Self {
        let completeness = if event.snapshot().is_some() { Completeness::Full } else { Completeness::Partial };
        Self { version: event.order_version(), completeness }
    }

    pub fn is_full(&self) -> bool {
        self.completeness == Completeness::Full
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateReason {
    NoLocalRecord,
    NoLocalVersion,
    UnversionedSnapshot,
    /// No version and no snapshot: nothing to order the update by. The order has to be fetched.
    UnversionedPartial,
    Newer,
    FullSupersedesPartial,
    /// A replay, a duplicate, or an out-of-order delivery
    Stale,
}

impl Display for GateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoLocalRecord => "no local record",
            Self::NoLocalVersion => "local record has no version",
            Self::UnversionedSnapshot => "unversioned full snapshot",
            Self::UnversionedPartial => "unversioned partial update, refetch required",
            Self::Newer => "newer version",
            Self::FullSupersedesPartial => "full snapshot replaces partial at the same version",
            Self::Stale => "stale or duplicate version",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub accept: bool,
    pub reason: GateReason,
}

impl GateDecision {
    fn accept(reason: GateReason) -> Self {
        Self { accept: true, reason }
    }

    fn reject(reason: GateReason) -> Self {
        Self { accept: false, reason }
    }

    pub fn needs_refetch(&self) -> bool {
        self.reason == GateReason::UnversionedPartial
    }
}

pub fn should_accept_update(incoming: &VersionStamp, current: Option<&VersionStamp>) -> GateDecision {
    let Some(current) = current else {
        return GateDecision::accept(GateReason::NoLocalRecord);
    };
    let Some(held) = current.version else {
        return GateDecision::accept(GateReason::NoLocalVersion);
    };
    let Some(version) = incoming.version else {
        return if incoming.is_full() {
            GateDecision::accept(GateReason::UnversionedSnapshot)
        } else {
            GateDecision::reject(GateReason::UnversionedPartial)
        };
    };
    if version > held {
        GateDecision::accept(GateReason::Newer)
    } else if version == held && incoming.is_full() && !current.is_full() {
        GateDecision::accept(GateReason::FullSupersedesPartial)
    } else {
        GateDecision::reject(GateReason::Stale)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn anything_goes_without_a_local_record() {
        let d = should_accept_update(&VersionStamp::partial(None), None);
        assert!(d.accept);
        assert_eq!(d.reason, GateReason::NoLocalRecord);
        assert!(should_accept_update(&VersionStamp::full(1), Some(&VersionStamp::partial(None))).accept);
    }

    #[test]
    fn unversioned_updates_need_a_snapshot() {
        let held = VersionStamp::full(3);
        let d = should_accept_update(&VersionStamp { version: None, completeness: Completeness::Full }, Some(&held));
        assert!(d.accept);
        let d = should_accept_update(&VersionStamp::partial(None), Some(&held));
        assert!(!d.accept);
        assert!(d.needs_refetch());
    }

    #[test]
    fn only_newer_versions_win() {
        let held = VersionStamp::full(2);
        assert!(should_accept_update(&VersionStamp::partial(Some(3)), Some(&held)).accept);
        assert!(should_accept_update(&VersionStamp::full(4), Some(&held)).accept);
        let d = should_accept_update(&VersionStamp::full(2), Some(&held));
        assert_eq!(d, GateDecision { accept: false, reason: GateReason::Stale });
        assert!(!should_accept_update(&VersionStamp::full(1), Some(&held)).accept);
    }

    #[test]
    fn full_snapshot_beats_partial_at_equal_version() {
        let held = VersionStamp::partial(Some(5));
        let d = should_accept_update(&VersionStamp::full(5), Some(&held));
        assert_eq!(d.reason, GateReason::FullSupersedesPartial);
        assert!(!should_accept_update(&VersionStamp::partial(Some(5)), Some(&held)).accept);
        assert!(!should_accept_update(&VersionStamp::partial(Some(5)), Some(&VersionStamp::full(5))).accept);
    }

    #[test]
    fn applied_versions_never_decrease() {
        let deliveries = [3, 1, 3, 2, 5, 4, 5, 1, 6];
        let mut held: Option<VersionStamp> = None;
        let mut applied = vec![];
        for v in deliveries {
            let incoming = VersionStamp::full(v);
            if should_accept_update(&incoming, held.as_ref()).accept {
                applied.push(v);
                held = Some(incoming);
            }
        }
        assert_eq!(applied, vec![3, 5, 6]);
    }
}
