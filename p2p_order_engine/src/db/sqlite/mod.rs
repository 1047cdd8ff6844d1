mod db;

pub mod mempool;
pub mod orders;

use std::env;

pub use db::SqliteDatabase;
use log::info;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::traits::OrderStoreError;

const SQLITE_DB_URL: &str = "sqlite://data/p2p_orders.db";

pub fn db_url() -> String {
    let result = env::var("P2P_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ P2P_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, OrderStoreError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
