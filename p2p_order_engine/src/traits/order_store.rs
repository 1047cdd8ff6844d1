use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{Actor, NewOrder, Order, OrderId},
    traits::data_objects::OrderQueryFilter,
};

#[allow(async_fn_in_trait)]
pub trait OrderStore: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new order with `order_version = 1` and status `pending`.
    ///
    /// This call is idempotent. If an order with the same id already exists, it is returned unchanged and the second
    /// value in the tuple is `false`.
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), OrderStoreError>;

    async fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, OrderStoreError>;

    /// Returns all orders matching the filter, oldest first.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderStoreError>;

    /// All the orders where `actor` is one of the parties.
    async fn fetch_orders_for_actor(&self, actor: &Actor) -> Result<Vec<Order>, OrderStoreError> {
        self.search_orders(OrderQueryFilter::default().with_party(actor.clone())).await
    }

    /// Orders that are still waiting on the counterparty or on the escrow lock and whose deadline is at or before
    /// `now`.
    async fn fetch_expirable_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, OrderStoreError>;

    /// Writes `order` back to the store, but only if the stored copy is still at `expected_version`.
    ///
    /// On success the stored (and returned) order has `order_version = expected_version + 1`. If the stored version
    /// differs, nothing is written and [`OrderStoreError::VersionConflict`] is returned.
    async fn save_order(&self, order: &Order, expected_version: i64) -> Result<Order, OrderStoreError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), OrderStoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrderStoreError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Cannot insert order, since it already exists with id {0}")]
    OrderAlreadyExists(OrderId),
    #[error("Order {order_id} was modified concurrently. Expected version {expected}, but found {actual}")]
    VersionConflict { order_id: OrderId, expected: i64, actual: i64 },
    #[error("The requested mempool entry {0} does not exist")]
    EntryNotFound(i64),
}

impl From<sqlx::Error> for OrderStoreError {
    fn from(e: sqlx::Error) -> Self {
        OrderStoreError::DatabaseError(e.to_string())
    }
}
