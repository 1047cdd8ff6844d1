//! HTTP client for the escrow program's RPC.
//!
//! The escrow program is opaque to us: we ask it to release or refund the funds held for an order and it answers with
//! the hash of the transaction that moved them.
//!
//! * `POST {url}/release` pays the escrowed funds to the buyer.
//! * `POST {url}/refund` returns them to the seller.
//!
//! Both take an [`EscrowInstruction`] and answer `{"tx_hash": "..."}`.
use std::sync::Arc;

use log::*;
use p2p_order_engine::{
    db_types::{Order, OrderId},
    traits::{EscrowError, EscrowService},
};
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{config::EscrowConfig, errors::ServerError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowInstruction {
    pub order_id: OrderId,
    pub escrow_address: Option<String>,
    pub escrow_tx_hash: Option<String>,
    pub crypto_amount: f64,
}

impl From<&Order> for EscrowInstruction {
    fn from(order: &Order) -> Self {
        let escrow = order.escrow.as_ref();
        Self {
            order_id: order.id.clone(),
            escrow_address: escrow.and_then(|e| e.escrow_address.clone()),
            escrow_tx_hash: escrow.and_then(|e| e.escrow_tx_hash.clone()),
            crypto_amount: order.crypto_amount,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowReceipt {
    pub tx_hash: String,
}

#[derive(Clone)]
pub struct HttpEscrowService {
    url: Option<Url>,
    client: Arc<Client>,
}

impl HttpEscrowService {
    pub fn new(config: &EscrowConfig) -> Result<Self, ServerError> {
        let mut headers = HeaderMap::with_capacity(2);
        if !config.api_key.is_unset() {
            let val = HeaderValue::from_str(config.api_key.reveal().as_str())
                .map_err(|e| ServerError::ConfigurationError(format!("Invalid escrow API key. {e}")))?;
            headers.insert("X-Api-Key", val);
        }
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ServerError::InitializeError(e.to_string()))?;
        Ok(Self { url: config.url.clone(), client: Arc::new(client) })
    }

    async fn instruct(&self, action: &str, order: &Order) -> Result<String, EscrowError> {
        let base = self
            .url
            .as_ref()
            .ok_or_else(|| EscrowError::Unavailable(format!("no escrow service is configured to {action} {}", order.id)))?;
        let url = Url::parse(&format!("{}/{action}", base.as_str().trim_end_matches('/')))
            .map_err(|e| EscrowError::Unavailable(e.to_string()))?;
        let instruction = EscrowInstruction::from(order);
        debug!("🔐️ Asking the escrow service to {action} the funds for order {}", order.id);
        let response = self
            .client
            .post(url)
            .json(&instruction)
            .send()
            .await
            .map_err(|e| EscrowError::Unavailable(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            let receipt =
                response.json::<EscrowReceipt>().await.map_err(|e| EscrowError::InvalidResponse(e.to_string()))?;
            trace!("🔐️ Escrow {action} for order {} settled in {}", order.id, receipt.tx_hash);
            Ok(receipt.tx_hash)
        } else {
            let message = response.text().await.unwrap_or_default();
            warn!("🔐️ Escrow service refused to {action} order {}. {status}: {message}", order.id);
            if status.is_client_error() {
                Err(EscrowError::Rejected(format!("{status}: {message}")))
            } else {
                Err(EscrowError::Unavailable(format!("{status}: {message}")))
            }
        }
    }
}

impl EscrowService for HttpEscrowService {
    async fn release(&self, order: &Order) -> Result<String, EscrowError> {
        self.instruct("release", order).await
    }

    async fn refund(&self, order: &Order) -> Result<String, EscrowError> {
        self.instruct("refund", order).await
    }
}

#[cfg(test)]
mod test {
    use p2p_order_engine::{
        db_types::{EscrowRecord, OrderStatusType},
        test_utils::stored_order,
    };

    use super::*;

    #[tokio::test]
    async fn unconfigured_service_is_unavailable() {
        let escrow = HttpEscrowService::new(&EscrowConfig::default()).unwrap();
        let order = stored_order("o1", "alice", "m1", OrderStatusType::Releasing, 7);
        let err = escrow.release(&order).await.unwrap_err();
        assert!(matches!(err, EscrowError::Unavailable(_)));
    }

    #[test]
    fn instruction_carries_the_escrow_record() {
        let mut order = stored_order("o1", "alice", "m1", OrderStatusType::Escrowed, 4);
        order.escrow = Some(EscrowRecord {
            escrow_tx_hash: Some("tx-lock".into()),
            escrow_address: Some("addr".into()),
            ..Default::default()
        });
        let instruction = EscrowInstruction::from(&order);
        assert_eq!(instruction.order_id, OrderId::from("o1"));
        assert_eq!(instruction.escrow_tx_hash.as_deref(), Some("tx-lock"));
        assert_eq!(instruction.escrow_address.as_deref(), Some("addr"));
        assert_eq!(instruction.crypto_amount, 100.0);
    }
}
