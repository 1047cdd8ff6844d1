//! The order lifecycle state machine.
//!
//! An order moves along the happy path
//!
//! ```text
//!   pending → accepted → escrow_pending → escrowed → payment_pending → payment_sent
//!           → payment_confirmed → releasing → completed
//! ```
//!
//! and can branch off to `cancelled`, `disputed` or `expired` from any live status. `completed`, `cancelled` and
//! `expired` are terminal.
//!
//! Everything in this module is pure: the functions inspect an [`Order`] and either reject the change or return the
//! updated copy. Persisting the result (and bumping `order_version`) is the job of the [`crate::traits::OrderStore`].
mod edges;
mod rules;

use chrono::{DateTime, Duration, Utc};
pub use edges::{allowed_targets, is_legal_edge};
pub use rules::{check_extension_request, check_extension_response, check_transition};
use thiserror::Error;

use crate::db_types::{
    Actor,
    Dispute,
    DisputeResolution,
    DisputeStatus,
    EscrowRecord,
    ExtensionRequest,
    Order,
    OrderId,
    OrderStatusType,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("Order {order_id} cannot move from {from} to {to}: {reason}")]
    InvalidTransition { order_id: OrderId, from: OrderStatusType, to: OrderStatusType, reason: String },
    #[error("Extension rejected for order {order_id}: {reason}")]
    ExtensionRejected { order_id: OrderId, reason: String },
}

impl LifecycleError {
    pub(crate) fn invalid(order: &Order, to: OrderStatusType, reason: &str) -> Self {
        Self::InvalidTransition { order_id: order.id.clone(), from: order.status, to, reason: reason.to_string() }
    }

    pub(crate) fn extension(order: &Order, reason: &str) -> Self {
        Self::ExtensionRejected { order_id: order.id.clone(), reason: reason.to_string() }
    }
}

/// Checks and applies a plain status change.
pub fn apply_transition(
    order: &Order,
    to: OrderStatusType,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Order, LifecycleError> {
    check_transition(order, to, actor, now)?;
    let mut next = order.clone();
    next.set_status(to, now);
    if to == OrderStatusType::Cancelled {
        next.cancelled_by = Some(actor.kind);
    }
    if to.is_terminal() {
        next.pending_extension = None;
    }
    Ok(next)
}

pub fn apply_cancellation(
    order: &Order,
    actor: &Actor,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> Result<Order, LifecycleError> {
    let mut next = apply_transition(order, OrderStatusType::Cancelled, actor, now)?;
    next.cancellation_reason = reason;
    Ok(next)
}

/// Records the escrow lock reported by the seller and moves the order to `escrowed`.
pub fn apply_escrow_lock(
    order: &Order,
    actor: &Actor,
    tx_hash: &str,
    escrow_address: Option<String>,
    now: DateTime<Utc>,
) -> Result<Order, LifecycleError> {
    if order.escrow_locked() {
        return Err(LifecycleError::invalid(order, OrderStatusType::Escrowed, "escrow is already locked"));
    }
    let mut locked = order.clone();
    let record = locked.escrow.get_or_insert_with(EscrowRecord::default);
    record.escrow_tx_hash = Some(tx_hash.to_string());
    record.escrow_address = escrow_address;
    apply_transition(&locked, OrderStatusType::Escrowed, actor, now)
}

/// Records the release transaction and moves a `releasing` order to `completed`.
pub fn apply_release(order: &Order, actor: &Actor, tx_hash: &str, now: DateTime<Utc>) -> Result<Order, LifecycleError> {
    if !order.escrow_locked() {
        return Err(LifecycleError::invalid(order, OrderStatusType::Completed, "no escrow lock has been recorded"));
    }
    let mut released = order.clone();
    if let Some(record) = released.escrow.as_mut() {
        record.release_tx_hash = Some(tx_hash.to_string());
    }
    apply_transition(&released, OrderStatusType::Completed, actor, now)
}

/// Records a refund transaction. The status is left alone; the caller follows up with a cancellation.
pub fn apply_refund(order: &Order, tx_hash: &str, now: DateTime<Utc>) -> Result<Order, LifecycleError> {
    if order.is_terminal() {
        return Err(LifecycleError::invalid(order, OrderStatusType::Cancelled, "the order is in a terminal status"));
    }
    if !order.escrow_locked() {
        return Err(LifecycleError::invalid(order, OrderStatusType::Cancelled, "there is no escrow to refund"));
    }
    let mut refunded = order.clone();
    if let Some(record) = refunded.escrow.as_mut() {
        record.refund_tx_hash = Some(tx_hash.to_string());
    }
    refunded.updated_at = now;
    Ok(refunded)
}

pub fn apply_dispute(
    order: &Order,
    actor: &Actor,
    reason: String,
    description: Option<String>,
    now: DateTime<Utc>,
) -> Result<Order, LifecycleError> {
    let mut next = apply_transition(order, OrderStatusType::Disputed, actor, now)?;
    next.dispute = Some(Dispute {
        reason,
        description,
        status: DisputeStatus::Open,
        resolution: None,
        raised_by: actor.kind,
        previous_status: order.status,
    });
    Ok(next)
}

/// Closes an open dispute. `Resume` returns the order to its pre-dispute status, the other resolutions force it into a
/// terminal status. Escrow side effects (release or refund) must already be recorded on the order.
pub fn apply_resolution(
    order: &Order,
    actor: &Actor,
    resolution: DisputeResolution,
    now: DateTime<Utc>,
) -> Result<Order, LifecycleError> {
    let dispute = order
        .dispute
        .as_ref()
        .filter(|d| d.status == DisputeStatus::Open)
        .ok_or_else(|| LifecycleError::invalid(order, order.status, "there is no open dispute"))?;
    let to = match resolution {
        DisputeResolution::Resume => dispute.previous_status,
        DisputeResolution::ForceComplete => OrderStatusType::Completed,
        DisputeResolution::ForceCancel => OrderStatusType::Cancelled,
    };
    let mut next = apply_transition(order, to, actor, now)?;
    if let Some(d) = next.dispute.as_mut() {
        d.status = DisputeStatus::Resolved;
        d.resolution = Some(resolution);
    }
    if resolution == DisputeResolution::ForceCancel {
        next.cancellation_reason = Some("cancelled by dispute resolution".to_string());
    }
    Ok(next)
}

pub fn apply_extension_request(
    order: &Order,
    actor: &Actor,
    minutes: i64,
    now: DateTime<Utc>,
) -> Result<Order, LifecycleError> {
    if minutes <= 0 {
        return Err(LifecycleError::extension(order, "the extension must be at least one minute"));
    }
    check_extension_request(order, actor, now)?;
    let mut next = order.clone();
    next.pending_extension = Some(ExtensionRequest { requested_by: actor.clone(), minutes, requested_at: now });
    next.updated_at = now;
    Ok(next)
}

/// Answers the pending extension request. Accepting pushes `expires_at` back and uses up one extension.
pub fn apply_extension_response(
    order: &Order,
    actor: &Actor,
    accept: bool,
    now: DateTime<Utc>,
) -> Result<Order, LifecycleError> {
    let request = check_extension_response(order, actor)?;
    let minutes = request.minutes;
    let mut next = order.clone();
    next.pending_extension = None;
    next.updated_at = now;
    if accept {
        next.extension_count += 1;
        next.expires_at = next.expires_at.map(|t| t + Duration::minutes(minutes));
    }
    Ok(next)
}
