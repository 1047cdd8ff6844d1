use chrono::{DateTime, Utc};

use crate::{
    db_types::{MempoolEntry, NewMempoolEntry},
    traits::{BumpResult, OrderStoreError},
};

/// Storage for the matching pool.
#[allow(async_fn_in_trait)]
pub trait MempoolStore: Clone {
    /// Adds an order to the pool. `premium_bps_current` starts at `premium_bps_base`.
    async fn insert_entry(&self, entry: NewMempoolEntry, now: DateTime<Utc>) -> Result<MempoolEntry, OrderStoreError>;

    async fn fetch_entry(&self, id: i64) -> Result<Option<MempoolEntry>, OrderStoreError>;

    /// Entries that have not expired at `now`, in insertion order.
    async fn fetch_live_entries(&self, now: DateTime<Utc>) -> Result<Vec<MempoolEntry>, OrderStoreError>;

    /// Entries that are due for an automatic bump at `now`: auto-bump is enabled, the entry is below its cap, it has
    /// not expired, and at least `bump_interval_sec` have passed since the last bump.
    async fn fetch_bump_candidates(&self, now: DateTime<Utc>) -> Result<Vec<MempoolEntry>, OrderStoreError> {
        let entries = self.fetch_live_entries(now).await?;
        Ok(entries.into_iter().filter(|e| e.is_due_for_bump(now)).collect())
    }

    /// Atomically raises the premium by the entry's `bump_step_bps`, capped at `max_premium_bps`.
    ///
    /// Bumping an entry that is already at its cap is a no-op and reports `bumped = false`.
    async fn bump_entry(&self, id: i64, now: DateTime<Utc>) -> Result<BumpResult, OrderStoreError>;
}
