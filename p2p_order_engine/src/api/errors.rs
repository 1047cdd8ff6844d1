use thiserror::Error;

use crate::{
    db_types::OrderId,
    order_lifecycle::LifecycleError,
    traits::{EscrowError, OrderStoreError},
};

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("{0}")]
    Lifecycle(#[from] LifecycleError),
    #[error("{0}")]
    Store(#[from] OrderStoreError),
    #[error("Escrow service error: {0}")]
    Escrow(#[from] EscrowError),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
}

#[derive(Debug, Clone, Error)]
pub enum MempoolError {
    #[error("{0}")]
    Store(#[from] OrderStoreError),
    #[error("Order {0} cannot enter the pool: {1}")]
    NotEligible(OrderId, String),
    #[error("Invalid pool entry: {0}")]
    InvalidEntry(String),
    #[error("The requested mempool entry {0} does not exist")]
    EntryNotFound(i64),
}

/// A single entry the auto-bump worker could not bump. The rest of the batch carries on regardless.
#[derive(Debug, Clone, Error)]
#[error("Auto-bump failed for pool entry #{entry_id}: {reason}")]
pub struct AuctionStepFailure {
    pub entry_id: i64,
    pub reason: String,
}
