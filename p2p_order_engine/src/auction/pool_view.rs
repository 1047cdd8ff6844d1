//! Sorting and quick filters for the matching pool display.
//!
//! All sorts are stable: items that tie on the sort key keep their arrival order.
use chrono::{DateTime, Utc};
use p2p_common::Bps;
use serde::{Deserialize, Serialize};

use crate::db_types::{MempoolEntry, Order};

/// Premium above which an entry counts as "high premium" (0.5%).
pub const HIGH_PREMIUM_THRESHOLD: Bps = Bps::new(50);
pub const LARGE_AMOUNT_THRESHOLD: f64 = 2000.0;
pub const EXPIRING_SOON_SECS: i64 = 300;

/// One row of the pool, as shown to takers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolItem {
    pub entry: MempoolEntry,
    pub crypto_amount: f64,
    /// True once the seller's funds are visibly locked in escrow
    pub escrow_visible: bool,
    /// Counterparty rating, if the caller knows it
    #[serde(default)]
    pub rating: Option<f64>,
}

impl PoolItem {
    pub fn new(entry: MempoolEntry, order: &Order) -> Self {
        Self { entry, crypto_amount: order.crypto_amount, escrow_visible: order.escrow_locked(), rating: None }
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolSort {
    #[default]
    SoonestExpiry,
    PremiumDesc,
    AmountDesc,
    RatingDesc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolFilter {
    /// The seller's funds are locked, so the order can be taken right away
    Mineable,
    HighPremium,
    LargeAmount,
    ExpiringSoon,
}

impl PoolFilter {
    pub fn matches(&self, item: &PoolItem, now: DateTime<Utc>) -> bool {
        match self {
            PoolFilter::Mineable => item.escrow_visible,
            PoolFilter::HighPremium => item.entry.premium_bps_current > HIGH_PREMIUM_THRESHOLD,
            PoolFilter::LargeAmount => item.crypto_amount >= LARGE_AMOUNT_THRESHOLD,
            PoolFilter::ExpiringSoon => item.entry.seconds_until_expiry(now) <= EXPIRING_SOON_SECS,
        }
    }
}

/// Applies every filter in `filters` (all must match) and then sorts by `sort`.
pub fn pool_view(items: Vec<PoolItem>, sort: PoolSort, filters: &[PoolFilter], now: DateTime<Utc>) -> Vec<PoolItem> {
    let mut items = items.into_iter().filter(|i| filters.iter().all(|f| f.matches(i, now))).collect::<Vec<_>>();
    sort_items(&mut items, sort);
    items
}

/// `sort_by` is a stable sort, which gives us the arrival-order tie break for free.
pub fn sort_items(items: &mut [PoolItem], sort: PoolSort) {
    match sort {
        PoolSort::SoonestExpiry => items.sort_by_key(|i| i.entry.expires_at),
        PoolSort::PremiumDesc => items.sort_by(|a, b| b.entry.premium_bps_current.cmp(&a.entry.premium_bps_current)),
        PoolSort::AmountDesc => items.sort_by(|a, b| b.crypto_amount.total_cmp(&a.crypto_amount)),
        // Unrated items go last
        PoolSort::RatingDesc => items.sort_by(|a, b| {
            let a = a.rating.unwrap_or(f64::NEG_INFINITY);
            let b = b.rating.unwrap_or(f64::NEG_INFINITY);
            b.total_cmp(&a)
        }),
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration;

    use super::*;
    use crate::db_types::OrderId;

    fn item(id: i64, premium: i64, amount: f64, expires_in: i64, now: DateTime<Utc>) -> PoolItem {
        PoolItem {
            entry: MempoolEntry {
                id,
                order_id: OrderId(format!("o{id}")),
                premium_bps_base: Bps::from(premium),
                premium_bps_current: Bps::from(premium),
                max_premium_bps: Bps::from(500),
                bump_step_bps: Bps::from(10),
                bump_interval_sec: 60,
                auto_bump_enabled: true,
                last_bumped_at: now,
                created_at: now,
                expires_at: now + Duration::seconds(expires_in),
            },
            crypto_amount: amount,
            escrow_visible: id % 2 == 0,
            rating: None,
        }
    }

    fn ids(items: &[PoolItem]) -> Vec<i64> {
        items.iter().map(|i| i.entry.id).collect()
    }

    #[test]
    fn default_sort_is_soonest_expiry() {
        let now = Utc::now();
        let items = vec![item(1, 10, 100.0, 600, now), item(2, 10, 100.0, 60, now), item(3, 10, 100.0, 300, now)];
        let view = pool_view(items, PoolSort::default(), &[], now);
        assert_eq!(ids(&view), vec![2, 3, 1]);
    }

    #[test]
    fn ties_keep_arrival_order() {
        let now = Utc::now();
        let items = vec![
            item(1, 75, 100.0, 600, now),
            item(2, 90, 100.0, 600, now),
            item(3, 75, 100.0, 600, now),
            item(4, 75, 100.0, 600, now),
        ];
        let view = pool_view(items, PoolSort::PremiumDesc, &[], now);
        assert_eq!(ids(&view), vec![2, 1, 3, 4]);
    }

    #[test]
    fn amount_and_rating_sorts() {
        let now = Utc::now();
        let items = vec![
            item(1, 10, 500.0, 600, now).with_rating(4.0),
            item(2, 10, 2500.0, 600, now),
            item(3, 10, 1200.0, 600, now).with_rating(4.9),
        ];
        assert_eq!(ids(&pool_view(items.clone(), PoolSort::AmountDesc, &[], now)), vec![2, 3, 1]);
        assert_eq!(ids(&pool_view(items, PoolSort::RatingDesc, &[], now)), vec![3, 1, 2]);
    }

    #[test]
    fn quick_filters() {
        let now = Utc::now();
        let items = vec![
            item(1, 50, 2000.0, 100, now),
            item(2, 51, 1999.0, 301, now),
            item(3, 80, 3000.0, 300, now),
            item(4, 20, 10.0, 900, now),
        ];
        assert_eq!(ids(&pool_view(items.clone(), PoolSort::default(), &[PoolFilter::HighPremium], now)), vec![3, 2]);
        assert_eq!(ids(&pool_view(items.clone(), PoolSort::default(), &[PoolFilter::LargeAmount], now)), vec![1, 3]);
        assert_eq!(ids(&pool_view(items.clone(), PoolSort::default(), &[PoolFilter::ExpiringSoon], now)), vec![1, 3]);
        assert_eq!(ids(&pool_view(items.clone(), PoolSort::default(), &[PoolFilter::Mineable], now)), vec![2, 4]);
        let both = [PoolFilter::HighPremium, PoolFilter::LargeAmount];
        assert_eq!(ids(&pool_view(items, PoolSort::default(), &both, now)), vec![3]);
    }
}
