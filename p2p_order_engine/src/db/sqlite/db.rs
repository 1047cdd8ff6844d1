use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::{db_url, mempool, new_pool, orders};
use crate::{
    db_types::{MempoolEntry, NewMempoolEntry, NewOrder, Order, OrderId},
    traits::{BumpResult, MempoolStore, OrderQueryFilter, OrderStore, OrderStoreError},
};

/// `SqliteDatabase` is the SQLite implementation of [`OrderStore`] and [`MempoolStore`].
#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `P2P_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, OrderStoreError> {
        let url = db_url();
        SqliteDatabase::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, OrderStoreError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date. Safe to call on every start.
    pub async fn migrate(&self) -> Result<(), OrderStoreError> {
        sqlx::migrate!("./src/db/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| OrderStoreError::DatabaseError(format!("Migration failed: {e}")))?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }
}

impl OrderStore for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), OrderStoreError> {
        let mut tx = self.pool.begin().await?;
        let result = orders::idempotent_insert(order, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_id(id, &mut conn).await
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderStoreError> {
        trace!("🗃️ Searching orders. {query}");
        let mut conn = self.pool.acquire().await?;
        orders::search_orders(query, &mut conn).await
    }

    async fn fetch_expirable_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_expirable_orders(now, &mut conn).await
    }

    async fn save_order(&self, order: &Order, expected_version: i64) -> Result<Order, OrderStoreError> {
        let mut tx = self.pool.begin().await?;
        let saved = orders::save_order(order, expected_version, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} saved at version {} ({})", saved.id, saved.order_version, saved.status);
        Ok(saved)
    }

    async fn close(&mut self) -> Result<(), OrderStoreError> {
        self.pool.close().await;
        Ok(())
    }
}

impl MempoolStore for SqliteDatabase {
    async fn insert_entry(&self, entry: NewMempoolEntry, now: DateTime<Utc>) -> Result<MempoolEntry, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        mempool::insert_entry(entry, now, &mut conn).await
    }

    async fn fetch_entry(&self, id: i64) -> Result<Option<MempoolEntry>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        mempool::fetch_entry(id, &mut conn).await
    }

    async fn fetch_live_entries(&self, now: DateTime<Utc>) -> Result<Vec<MempoolEntry>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        mempool::fetch_live_entries(now, &mut conn).await
    }

    async fn bump_entry(&self, id: i64, now: DateTime<Utc>) -> Result<BumpResult, OrderStoreError> {
        let mut tx = self.pool.begin().await?;
        let result = mempool::bump_entry(id, now, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }
}
