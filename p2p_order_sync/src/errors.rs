use p2p_order_engine::db_types::OrderId;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// A channel or socket could not be reached. Retried with backoff; reported once the retries run out.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),
    /// An event did not carry enough data and fetching the full order failed too. The stale view is kept.
    #[error("Could not bring the order view up to date: {0}")]
    SyncIncomplete(String),
    /// The gate refused an update. Routine traffic, never shown to the user.
    #[error("Update for order {order_id} is stale (incoming {incoming:?}, held {current:?})")]
    StaleUpdate { order_id: OrderId, incoming: Option<i64>, current: Option<i64> },
    #[error("The server rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Invalid response from the server: {0}")]
    InvalidResponse(String),
    #[error("{0} cannot hold a sync session")]
    UnsupportedActor(String),
    #[error("The sync session has already shut down")]
    SessionClosed,
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::TransportUnavailable(e.to_string())
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(e: url::ParseError) -> Self {
        Self::TransportUnavailable(format!("invalid url: {e}"))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidResponse(e.to_string())
    }
}
