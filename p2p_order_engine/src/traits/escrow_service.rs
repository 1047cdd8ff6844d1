use thiserror::Error;

use crate::db_types::Order;

/// The on-chain escrow program, seen from the engine. Both calls return the hash of the transaction that moved the
/// funds.
#[allow(async_fn_in_trait)]
pub trait EscrowService {
    /// Releases the escrowed funds to the buyer.
    async fn release(&self, order: &Order) -> Result<String, EscrowError>;
    /// Returns the escrowed funds to the seller.
    async fn refund(&self, order: &Order) -> Result<String, EscrowError>;
}

#[derive(Debug, Clone, Error)]
pub enum EscrowError {
    #[error("The escrow service is not available: {0}")]
    Unavailable(String),
    #[error("The escrow service rejected the request: {0}")]
    Rejected(String),
    #[error("The escrow service sent an invalid response: {0}")]
    InvalidResponse(String),
}

/// Used when no escrow service is configured. Every call fails with [`EscrowError::Unavailable`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEscrowService;

impl EscrowService for NoEscrowService {
    async fn release(&self, order: &Order) -> Result<String, EscrowError> {
        Err(EscrowError::Unavailable(format!("cannot release escrow for order {}", order.id)))
    }

    async fn refund(&self, order: &Order) -> Result<String, EscrowError> {
        Err(EscrowError::Unavailable(format!("cannot refund escrow for order {}", order.id)))
    }
}
