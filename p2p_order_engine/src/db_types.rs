use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use log::error;
use p2p_common::Bps;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

pub const DEFAULT_MAX_EXTENSIONS: i32 = 3;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {0}: {1}")]
pub struct ConversionError(&'static str, String);

/// Implements `Display`, `FromStr` and the infallible `From<String>` (used when decoding from the database) for
/// simple enums that are stored as snake_case strings.
macro_rules! string_enum {
    ($name:ident, $default:ident, { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $s),)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    s => Err(ConversionError(stringify!($name), s.to_string())),
                }
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                value.parse().unwrap_or_else(|_| {
                    error!(
                        "Invalid {}: {value}. But this conversion cannot fail. Defaulting to {}",
                        stringify!($name),
                        Self::$default
                    );
                    Self::$default
                })
            }
        }
    };
}

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn random() -> Self {
        Self(format!("{:016x}", rand::random::<u64>()))
    }
}

//--------------------------------------   OrderType / PaymentMethod   -------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// The user buys crypto from the merchant
    Buy,
    /// The user sells crypto to the merchant
    Sell,
}

string_enum!(OrderType, Buy, { Buy => "buy", Sell => "sell" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Bank,
    Cash,
}

string_enum!(PaymentMethod, Bank, { Bank => "bank", Cash => "cash" });

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// Newly created, waiting for the counterparty.
    Pending,
    /// The counterparty has accepted the trade.
    Accepted,
    /// The seller has started locking funds in escrow.
    EscrowPending,
    /// Funds are locked in escrow.
    Escrowed,
    /// The buyer is making the fiat payment.
    PaymentPending,
    /// The buyer reports the fiat payment as sent.
    PaymentSent,
    /// The seller has confirmed receipt of the fiat payment.
    PaymentConfirmed,
    /// The escrow release transaction is in flight.
    Releasing,
    /// Escrow released to the buyer. Terminal.
    Completed,
    /// Terminal.
    Cancelled,
    /// Under adjudication.
    Disputed,
    /// Deadline passed before the trade progressed. Terminal.
    Expired,
}

string_enum!(OrderStatusType, Pending, {
    Pending => "pending",
    Accepted => "accepted",
    EscrowPending => "escrow_pending",
    Escrowed => "escrowed",
    PaymentPending => "payment_pending",
    PaymentSent => "payment_sent",
    PaymentConfirmed => "payment_confirmed",
    Releasing => "releasing",
    Completed => "completed",
    Cancelled => "cancelled",
    Disputed => "disputed",
    Expired => "expired",
});

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Expired)
    }

    pub fn minimal(&self) -> MinimalStatus {
        use OrderStatusType::*;
        match self {
            Pending => MinimalStatus::Pending,
            Accepted | EscrowPending => MinimalStatus::Accepted,
            Escrowed | PaymentPending => MinimalStatus::Escrowed,
            PaymentSent | PaymentConfirmed | Releasing => MinimalStatus::PaymentSent,
            Completed => MinimalStatus::Completed,
            Cancelled => MinimalStatus::Cancelled,
            Disputed => MinimalStatus::Disputed,
            Expired => MinimalStatus::Expired,
        }
    }
}

/// A coarse view of [`OrderStatusType`] for consumers that only render the broad stage of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinimalStatus {
    Pending,
    Accepted,
    Escrowed,
    PaymentSent,
    Completed,
    Cancelled,
    Disputed,
    Expired,
}

string_enum!(MinimalStatus, Pending, {
    Pending => "pending",
    Accepted => "accepted",
    Escrowed => "escrowed",
    PaymentSent => "payment_sent",
    Completed => "completed",
    Cancelled => "cancelled",
    Disputed => "disputed",
    Expired => "expired",
});

//--------------------------------------        Actors         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    Merchant,
    Compliance,
    /// Scheduled jobs acting on behalf of the platform (expiry, auto-bump)
    System,
}

string_enum!(ActorType, System, {
    User => "user",
    Merchant => "merchant",
    Compliance => "compliance",
    System => "system",
});

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    #[serde(rename = "actorType")]
    pub kind: ActorType,
    #[serde(rename = "actorId")]
    pub id: String,
}

impl Actor {
    pub fn new<S: Into<String>>(kind: ActorType, id: S) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn user<S: Into<String>>(id: S) -> Self {
        Self::new(ActorType::User, id)
    }

    pub fn merchant<S: Into<String>>(id: S) -> Self {
        Self::new(ActorType::Merchant, id)
    }

    pub fn compliance<S: Into<String>>(id: S) -> Self {
        Self::new(ActorType::Compliance, id)
    }

    pub fn system() -> Self {
        Self::new(ActorType::System, "system")
    }
}

impl Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Which side of the trade an actor is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeRole {
    Buyer,
    Seller,
}

//--------------------------------------   Dispute / Escrow    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    Resolved,
}

string_enum!(DisputeStatus, Open, { Open => "open", Resolved => "resolved" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeResolution {
    /// The order carries on from where it was when the dispute was raised
    Resume,
    /// Compliance forces the trade to completion
    ForceComplete,
    /// Compliance forces cancellation
    ForceCancel,
}

string_enum!(DisputeResolution, Resume, {
    Resume => "resume",
    ForceComplete => "force_complete",
    ForceCancel => "force_cancel",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    pub reason: String,
    pub description: Option<String>,
    pub status: DisputeStatus,
    pub resolution: Option<DisputeResolution>,
    pub raised_by: ActorType,
    /// The status the order was in when the dispute was raised
    pub previous_status: OrderStatusType,
}

/// Opaque identifiers reported by the external escrow program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub escrow_tx_hash: Option<String>,
    pub escrow_address: Option<String>,
    pub release_tx_hash: Option<String>,
    pub refund_tx_hash: Option<String>,
}

impl EscrowRecord {
    pub fn is_locked(&self) -> bool {
        self.escrow_tx_hash.is_some()
    }

    pub fn is_refunded(&self) -> bool {
        self.refund_tx_hash.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRequest {
    pub requested_by: Actor,
    pub minutes: i64,
    pub requested_at: DateTime<Utc>,
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub crypto_amount: f64,
    pub fiat_amount: f64,
    pub rate: f64,
    pub payment_method: PaymentMethod,
    pub user_id: String,
    pub merchant_id: String,
    pub buyer_merchant_id: Option<String>,
    pub status: OrderStatusType,
    pub minimal_status: MinimalStatus,
    pub order_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub escrowed_at: Option<DateTime<Utc>>,
    pub payment_sent_at: Option<DateTime<Utc>>,
    pub payment_confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub extension_count: i32,
    pub max_extensions: i32,
    pub pending_extension: Option<ExtensionRequest>,
    pub cancelled_by: Option<ActorType>,
    pub cancellation_reason: Option<String>,
    pub dispute: Option<Dispute>,
    pub escrow: Option<EscrowRecord>,
}

impl Order {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn escrow_locked(&self) -> bool {
        self.escrow.as_ref().map(EscrowRecord::is_locked).unwrap_or(false)
    }

    pub fn escrow_refunded(&self) -> bool {
        self.escrow.as_ref().map(EscrowRecord::is_refunded).unwrap_or(false)
    }

    pub fn release_tx_hash(&self) -> Option<&str> {
        self.escrow.as_ref().and_then(|e| e.release_tx_hash.as_deref())
    }

    /// Resolves which side of the trade the given actor is on, if any.
    ///
    /// * `buy` orders: the user buys, the merchant sells.
    /// * `sell` orders: the user sells, the merchant buys.
    /// * merchant-to-merchant orders (`buyer_merchant_id` is set): the buyer merchant buys and `merchant_id` sells.
    pub fn role_of(&self, actor: &Actor) -> Option<TradeRole> {
        match (&self.buyer_merchant_id, actor.kind) {
            (Some(buyer), ActorType::Merchant) if *buyer == actor.id => Some(TradeRole::Buyer),
            (Some(_), ActorType::Merchant) if self.merchant_id == actor.id => Some(TradeRole::Seller),
            (Some(_), _) => None,
            (None, ActorType::User) if self.user_id == actor.id => Some(match self.order_type {
                OrderType::Buy => TradeRole::Buyer,
                OrderType::Sell => TradeRole::Seller,
            }),
            (None, ActorType::Merchant) if self.merchant_id == actor.id => Some(match self.order_type {
                OrderType::Buy => TradeRole::Seller,
                OrderType::Sell => TradeRole::Buyer,
            }),
            _ => None,
        }
    }

    pub fn is_party(&self, actor: &Actor) -> bool {
        self.role_of(actor).is_some()
    }

    /// Sets the status and keeps `minimal_status` in step with it. Stage timestamps are stamped the first time the
    /// order enters the corresponding status.
    pub fn set_status(&mut self, status: OrderStatusType, now: DateTime<Utc>) {
        use OrderStatusType::*;
        self.status = status;
        self.minimal_status = status.minimal();
        self.updated_at = now;
        let stamp = match status {
            Accepted => Some(&mut self.accepted_at),
            Escrowed => Some(&mut self.escrowed_at),
            PaymentSent => Some(&mut self.payment_sent_at),
            PaymentConfirmed => Some(&mut self.payment_confirmed_at),
            Completed => Some(&mut self.completed_at),
            Cancelled => Some(&mut self.cancelled_at),
            _ => None,
        };
        if let Some(ts) = stamp {
            ts.get_or_insert(now);
        }
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    /// Assigned by the store if not supplied
    #[serde(default)]
    pub id: Option<OrderId>,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub crypto_amount: f64,
    pub fiat_amount: f64,
    pub rate: f64,
    pub payment_method: PaymentMethod,
    pub user_id: String,
    pub merchant_id: String,
    #[serde(default)]
    pub buyer_merchant_id: Option<String>,
    /// How long the order stays open before it expires, in seconds. The store default applies if absent.
    #[serde(default)]
    pub ttl_secs: Option<i64>,
    #[serde(default)]
    pub max_extensions: Option<i32>,
}

impl NewOrder {
    pub fn new<S: Into<String>>(order_type: OrderType, user_id: S, merchant_id: S, crypto_amount: f64, rate: f64) -> Self {
        Self {
            id: None,
            order_type,
            crypto_amount,
            fiat_amount: crypto_amount * rate,
            rate,
            payment_method: PaymentMethod::Bank,
            user_id: user_id.into(),
            merchant_id: merchant_id.into(),
            buyer_merchant_id: None,
            ttl_secs: None,
            max_extensions: None,
        }
    }

    pub fn with_id<S: Into<OrderId>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_buyer_merchant<S: Into<String>>(mut self, buyer_merchant_id: S) -> Self {
        self.buyer_merchant_id = Some(buyer_merchant_id.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = Some(ttl.num_seconds());
        self
    }

    pub fn with_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = method;
        self
    }
}

//--------------------------------------     MempoolEntry      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MempoolEntry {
    pub id: i64,
    pub order_id: OrderId,
    pub premium_bps_base: Bps,
    pub premium_bps_current: Bps,
    pub max_premium_bps: Bps,
    pub bump_step_bps: Bps,
    pub bump_interval_sec: i64,
    pub auto_bump_enabled: bool,
    pub last_bumped_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl MempoolEntry {
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    pub fn max_reached(&self) -> bool {
        self.premium_bps_current >= self.max_premium_bps
    }

    /// True if the entry is due for an automatic bump at `now`.
    pub fn is_due_for_bump(&self, now: DateTime<Utc>) -> bool {
        self.auto_bump_enabled &&
            !self.max_reached() &&
            (now - self.last_bumped_at).num_seconds() >= self.bump_interval_sec
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMempoolEntry {
    pub order_id: OrderId,
    pub premium_bps_base: Bps,
    pub max_premium_bps: Bps,
    #[serde(default = "default_bump_step")]
    pub bump_step_bps: Bps,
    pub bump_interval_sec: i64,
    #[serde(default)]
    pub auto_bump_enabled: bool,
    pub ttl_secs: i64,
}

fn default_bump_step() -> Bps {
    Bps::from(10)
}

impl NewMempoolEntry {
    pub fn new(order_id: OrderId, base: Bps, max: Bps, bump_interval_sec: i64) -> Self {
        Self {
            order_id,
            premium_bps_base: base,
            max_premium_bps: max,
            bump_step_bps: default_bump_step(),
            bump_interval_sec,
            auto_bump_enabled: true,
            ttl_secs: 15 * 60,
        }
    }

    pub fn with_step(mut self, step: Bps) -> Self {
        self.bump_step_bps = step;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    pub fn order(order_type: OrderType) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::from("o1"),
            order_number: "P2P-0001".into(),
            order_type,
            crypto_amount: 100.0,
            fiat_amount: 370.0,
            rate: 3.7,
            payment_method: PaymentMethod::Bank,
            user_id: "alice".into(),
            merchant_id: "m1".into(),
            buyer_merchant_id: None,
            status: OrderStatusType::Pending,
            minimal_status: MinimalStatus::Pending,
            order_version: 1,
            created_at: now,
            updated_at: now,
            accepted_at: None,
            escrowed_at: None,
            payment_sent_at: None,
            payment_confirmed_at: None,
            completed_at: None,
            cancelled_at: None,
            expires_at: None,
            extension_count: 0,
            max_extensions: DEFAULT_MAX_EXTENSIONS,
            pending_extension: None,
            cancelled_by: None,
            cancellation_reason: None,
            dispute: None,
            escrow: None,
        }
    }

    #[test]
    fn statuses_round_trip_through_strings() {
        for s in ["pending", "escrow_pending", "payment_confirmed", "expired"] {
            let status = OrderStatusType::from_str(s).unwrap();
            assert_eq!(status.to_string(), s);
        }
        assert!(OrderStatusType::from_str("paid").is_err());
        assert_eq!(OrderStatusType::from("garbage".to_string()), OrderStatusType::Pending);
    }

    #[test]
    fn minimal_status_is_coarser() {
        assert_eq!(OrderStatusType::EscrowPending.minimal(), MinimalStatus::Accepted);
        assert_eq!(OrderStatusType::PaymentPending.minimal(), MinimalStatus::Escrowed);
        assert_eq!(OrderStatusType::Releasing.minimal(), MinimalStatus::PaymentSent);
        assert_eq!(OrderStatusType::Expired.minimal(), MinimalStatus::Expired);
    }

    #[test]
    fn roles_for_buy_and_sell_orders() {
        let buy = order(OrderType::Buy);
        assert_eq!(buy.role_of(&Actor::user("alice")), Some(TradeRole::Buyer));
        assert_eq!(buy.role_of(&Actor::merchant("m1")), Some(TradeRole::Seller));
        assert_eq!(buy.role_of(&Actor::merchant("m2")), None);
        assert_eq!(buy.role_of(&Actor::user("m1")), None);
        let sell = order(OrderType::Sell);
        assert_eq!(sell.role_of(&Actor::user("alice")), Some(TradeRole::Seller));
        assert_eq!(sell.role_of(&Actor::merchant("m1")), Some(TradeRole::Buyer));
    }

    #[test]
    fn roles_for_merchant_to_merchant_orders() {
        let mut m2m = order(OrderType::Buy);
        m2m.buyer_merchant_id = Some("m2".into());
        assert_eq!(m2m.role_of(&Actor::merchant("m2")), Some(TradeRole::Buyer));
        assert_eq!(m2m.role_of(&Actor::merchant("m1")), Some(TradeRole::Seller));
        assert_eq!(m2m.role_of(&Actor::user("alice")), None);
    }

    #[test]
    fn set_status_stamps_stage_once() {
        let mut o = order(OrderType::Buy);
        let t1 = Utc::now();
        o.set_status(OrderStatusType::Accepted, t1);
        assert_eq!(o.minimal_status, MinimalStatus::Accepted);
        assert_eq!(o.accepted_at, Some(t1));
        let t2 = t1 + Duration::seconds(5);
        o.set_status(OrderStatusType::Accepted, t2);
        assert_eq!(o.accepted_at, Some(t1));
        assert_eq!(o.updated_at, t2);
    }

    #[test]
    fn order_serializes_type_field() {
        let json = serde_json::to_value(order(OrderType::Sell)).unwrap();
        assert_eq!(json["type"], "sell");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["order_version"], 1);
    }
}
