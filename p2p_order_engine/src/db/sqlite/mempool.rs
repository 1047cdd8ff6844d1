use chrono::{DateTime, Duration, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{MempoolEntry, NewMempoolEntry},
    traits::{BumpResult, OrderStoreError},
};

pub async fn insert_entry(
    entry: NewMempoolEntry,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<MempoolEntry, OrderStoreError> {
    let expires_at = now + Duration::seconds(entry.ttl_secs);
    let entry: MempoolEntry = sqlx::query_as(
        r#"
            INSERT INTO mempool (
                order_id,
                premium_bps_base,
                premium_bps_current,
                max_premium_bps,
                bump_step_bps,
                bump_interval_sec,
                auto_bump_enabled,
                last_bumped_at,
                created_at,
                expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(entry.order_id.as_str())
    .bind(entry.premium_bps_base)
    .bind(entry.premium_bps_base.min(entry.max_premium_bps))
    .bind(entry.max_premium_bps)
    .bind(entry.bump_step_bps)
    .bind(entry.bump_interval_sec)
    .bind(entry.auto_bump_enabled)
    .bind(now)
    .bind(now)
    .bind(expires_at)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Order {} entered the pool as entry #{}", entry.order_id, entry.id);
    Ok(entry)
}

pub async fn fetch_entry(id: i64, conn: &mut SqliteConnection) -> Result<Option<MempoolEntry>, OrderStoreError> {
    let entry = sqlx::query_as("SELECT * FROM mempool WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(entry)
}

pub async fn fetch_live_entries(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<MempoolEntry>, OrderStoreError> {
    let entries: Vec<MempoolEntry> = sqlx::query_as("SELECT * FROM mempool ORDER BY id ASC").fetch_all(conn).await?;
    trace!("🗃️ {} entries in the pool", entries.len());
    Ok(entries.into_iter().filter(|e| e.expires_at > now).collect())
}

/// The cap is enforced in the same statement as the increment, so concurrent bumps can never push the premium past
/// `max_premium_bps`.
pub async fn bump_entry(id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<BumpResult, OrderStoreError> {
    let bumped: Option<MempoolEntry> = sqlx::query_as(
        r#"
            UPDATE mempool SET
                premium_bps_current = MIN(premium_bps_current + bump_step_bps, max_premium_bps),
                last_bumped_at = $1
            WHERE id = $2 AND premium_bps_current < max_premium_bps
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    match bumped {
        Some(entry) => {
            trace!("🗃️ Entry #{id} bumped to {}", entry.premium_bps_current);
            Ok(BumpResult { entry, bumped: true })
        },
        None => {
            let entry = fetch_entry(id, conn).await?.ok_or(OrderStoreError::EntryNotFound(id))?;
            Ok(BumpResult { entry, bumped: false })
        },
    }
}
