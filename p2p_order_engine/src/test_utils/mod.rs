pub mod prepare_env;

use chrono::{Duration, Utc};

use crate::db_types::{NewOrder, Order, OrderId, OrderStatusType, OrderType, PaymentMethod, DEFAULT_MAX_EXTENSIONS};

/// A 100-unit buy order at 3.67, open for 30 minutes.
pub fn buy_order(id: &str, user: &str, merchant: &str) -> NewOrder {
    NewOrder::new(OrderType::Buy, user, merchant, 100.0, 3.67).with_id(id).with_ttl(Duration::minutes(30))
}

/// A 100-unit sell order at 3.67, open for 30 minutes.
pub fn sell_order(id: &str, user: &str, merchant: &str) -> NewOrder {
    NewOrder::new(OrderType::Sell, user, merchant, 100.0, 3.67).with_id(id).with_ttl(Duration::minutes(30))
}

/// A stored buy order as the server would return it, at the given status and version.
pub fn stored_order(id: &str, user: &str, merchant: &str, status: OrderStatusType, version: i64) -> Order {
    let now = Utc::now();
    Order {
        id: OrderId::from(id),
        order_number: format!("P2P-{version:06}"),
        order_type: OrderType::Buy,
        crypto_amount: 100.0,
        fiat_amount: 367.0,
        rate: 3.67,
        payment_method: PaymentMethod::Bank,
        user_id: user.to_string(),
        merchant_id: merchant.to_string(),
        buyer_merchant_id: None,
        status,
        minimal_status: status.minimal(),
        order_version: version,
        created_at: now,
        updated_at: now,
        accepted_at: None,
        escrowed_at: None,
        payment_sent_at: None,
        payment_confirmed_at: None,
        completed_at: None,
        cancelled_at: None,
        expires_at: Some(now + Duration::minutes(30)),
        extension_count: 0,
        max_extensions: DEFAULT_MAX_EXTENSIONS,
        pending_extension: None,
        cancelled_by: None,
        cancellation_reason: None,
        dispute: None,
        escrow: None,
    }
}
