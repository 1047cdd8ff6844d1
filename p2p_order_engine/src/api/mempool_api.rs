use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use p2p_common::{Bps, MAX_BOOST_FEE_BPS};

use crate::{
    api::{AuctionStepFailure, BumpRunResult, ManualBump, MempoolError},
    auction::{pool_view, PoolFilter, PoolItem, PoolSort},
    db_types::{MempoolEntry, NewMempoolEntry},
    events::{EventProducers, PremiumBumpedEvent},
    traits::{BumpResult, MempoolStore, OrderStore, OrderStoreError},
};

/// The auction side of the engine: advertising orders in the pool, raising their premium, and presenting the pool.
pub struct MempoolApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for MempoolApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MempoolApi")
    }
}

impl<B> MempoolApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> MempoolApi<B>
where B: OrderStore + MempoolStore
{
    /// Puts a live order into the pool.
    pub async fn advertise(&self, entry: NewMempoolEntry) -> Result<MempoolEntry, MempoolError> {
        validate_entry(&entry)?;
        let order = self
            .db
            .fetch_order(&entry.order_id)
            .await?
            .ok_or_else(|| MempoolError::NotEligible(entry.order_id.clone(), "the order does not exist".into()))?;
        if order.is_terminal() {
            return Err(MempoolError::NotEligible(order.id, format!("the order is already {}", order.status)));
        }
        let entry = self.db.insert_entry(entry, Utc::now()).await?;
        info!(
            "🧮️ Order {} advertised at {} (cap {}, +{} every {}s)",
            entry.order_id, entry.premium_bps_current, entry.max_premium_bps, entry.bump_step_bps, entry.bump_interval_sec
        );
        Ok(entry)
    }

    /// A manual bump. Bumping an entry at its cap changes nothing and reports `max_reached`.
    pub async fn bump_entry(&self, id: i64) -> Result<ManualBump, MempoolError> {
        let result = self.db.bump_entry(id, Utc::now()).await.map_err(|e| match e {
            OrderStoreError::EntryNotFound(id) => MempoolError::EntryNotFound(id),
            e => MempoolError::Store(e),
        })?;
        if result.bumped {
            self.notify_bump(&result).await;
        }
        Ok(ManualBump { new_premium_bps: result.entry.premium_bps_current, max_reached: result.max_reached() })
    }

    /// One pass of the auto-bump worker.
    ///
    /// Every due entry is bumped by its own step. An entry that fails is logged and recorded as an
    /// [`AuctionStepFailure`]; the rest of the batch still runs. Only failing to load the candidates fails the pass.
    pub async fn bump_eligible_entries(&self, now: DateTime<Utc>) -> Result<BumpRunResult, MempoolError> {
        let candidates = self.db.fetch_bump_candidates(now).await?;
        trace!("🧮️ {} pool entries are due for a bump", candidates.len());
        let mut run = BumpRunResult::default();
        for entry in candidates {
            match self.db.bump_entry(entry.id, now).await {
                Ok(result) if result.bumped => {
                    debug!(
                        "🧮️ Entry #{} bumped {} → {}",
                        entry.id, entry.premium_bps_current, result.entry.premium_bps_current
                    );
                    self.notify_bump(&result).await;
                    run.bumped.push(result.entry);
                },
                Ok(result) => run.skipped.push(result.entry.id),
                Err(e) => {
                    let failure = AuctionStepFailure { entry_id: entry.id, reason: e.to_string() };
                    warn!("🧮️ {failure}");
                    run.failures.push(failure);
                },
            }
        }
        Ok(run)
    }

    /// The pool as takers see it: live entries for live orders, filtered and sorted.
    pub async fn pool(
        &self,
        now: DateTime<Utc>,
        sort: PoolSort,
        filters: &[PoolFilter],
    ) -> Result<Vec<PoolItem>, MempoolError> {
        let entries = self.db.fetch_live_entries(now).await?;
        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.db.fetch_order(&entry.order_id).await? {
                Some(order) if !order.is_terminal() => items.push(PoolItem::new(entry, &order)),
                Some(_) => trace!("🧮️ Entry #{} belongs to a closed order. Hidden.", entry.id),
                None => warn!("🧮️ Entry #{} refers to missing order {}", entry.id, entry.order_id),
            }
        }
        Ok(pool_view(items, sort, filters, now))
    }

    async fn notify_bump(&self, result: &BumpResult) {
        let event = PremiumBumpedEvent {
            entry_id: result.entry.id,
            order_id: result.entry.order_id.clone(),
            new_premium_bps: result.entry.premium_bps_current,
            max_reached: result.max_reached(),
        };
        self.producers.publish_premium_bumped(event).await;
    }
}

fn validate_entry(entry: &NewMempoolEntry) -> Result<(), MempoolError> {
    let zero = Bps::default();
    if entry.premium_bps_base < zero {
        return Err(MempoolError::InvalidEntry("the base premium cannot be negative".into()));
    }
    if entry.max_premium_bps < entry.premium_bps_base {
        return Err(MempoolError::InvalidEntry("the premium cap is below the base premium".into()));
    }
    if entry.max_premium_bps > MAX_BOOST_FEE_BPS {
        return Err(MempoolError::InvalidEntry(format!("the premium cap cannot exceed {MAX_BOOST_FEE_BPS}")));
    }
    if entry.bump_step_bps <= zero {
        return Err(MempoolError::InvalidEntry("the bump step must be positive".into()));
    }
    if entry.bump_interval_sec <= 0 || entry.ttl_secs <= 0 {
        return Err(MempoolError::InvalidEntry("the bump interval and lifetime must be positive".into()));
    }
    Ok(())
}
