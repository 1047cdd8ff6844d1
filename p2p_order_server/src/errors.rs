use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use p2p_order_engine::{order_lifecycle::LifecycleError, traits::OrderStoreError, MempoolError, OrderFlowError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request query: {0}")]
    InvalidRequestQuery(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("The request conflicts with the current state of the order. {0}")]
    Conflict(String),
    #[error("{0}")]
    EscrowFailure(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestQuery(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition(_) => StatusCode::CONFLICT,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::EscrowFailure(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<OrderStoreError> for ServerError {
    fn from(e: OrderStoreError) -> Self {
        match e {
            OrderStoreError::OrderNotFound(_) | OrderStoreError::EntryNotFound(_) => Self::NoRecordFound(e.to_string()),
            OrderStoreError::VersionConflict { .. } | OrderStoreError::OrderAlreadyExists(_) => {
                Self::Conflict(e.to_string())
            },
            OrderStoreError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
        }
    }
}

impl From<OrderFlowError> for ServerError {
    fn from(e: OrderFlowError) -> Self {
        match e {
            OrderFlowError::Lifecycle(e @ LifecycleError::InvalidTransition { .. }) => {
                Self::InvalidTransition(e.to_string())
            },
            OrderFlowError::Lifecycle(e @ LifecycleError::ExtensionRejected { .. }) => Self::Conflict(e.to_string()),
            OrderFlowError::Store(e) => e.into(),
            OrderFlowError::Escrow(e) => Self::EscrowFailure(e.to_string()),
            OrderFlowError::OrderNotFound(_) => Self::NoRecordFound(e.to_string()),
        }
    }
}

impl From<MempoolError> for ServerError {
    fn from(e: MempoolError) -> Self {
        match e {
            MempoolError::Store(e) => e.into(),
            MempoolError::NotEligible(..) | MempoolError::InvalidEntry(_) => Self::InvalidRequestBody(e.to_string()),
            MempoolError::EntryNotFound(_) => Self::NoRecordFound(e.to_string()),
        }
    }
}
