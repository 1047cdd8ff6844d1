use chrono::{DateTime, Utc};

use super::{edges::is_legal_edge, LifecycleError};
use crate::db_types::{
    Actor,
    ActorType,
    ExtensionRequest,
    Order,
    OrderStatusType::{self, *},
    TradeRole,
};

/// Decides whether `actor` may move `order` to `to` at time `now`.
///
/// This only inspects the order; it never mutates anything. The edge table ([`super::allowed_targets`]) is checked
/// first, then the actor permissions and preconditions of the target status.
pub fn check_transition(
    order: &Order,
    to: OrderStatusType,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<(), LifecycleError> {
    let from = order.status;
    let reject = |reason: &str| Err(LifecycleError::invalid(order, to, reason));
    if from.is_terminal() {
        return reject("the order is in a terminal status");
    }
    if from == to {
        return reject("the order already has this status");
    }
    if !is_legal_edge(from, to) {
        return reject("not an allowed edge");
    }
    let role = order.role_of(actor);
    let is_compliance = actor.kind == ActorType::Compliance;
    let funds_held = order.escrow_locked() && !order.escrow_refunded();

    if from == Disputed {
        if !is_compliance {
            return reject("only compliance can move an order out of a dispute");
        }
        return match to {
            Cancelled if funds_held => reject("escrowed funds must be refunded before cancelling"),
            Cancelled => Ok(()),
            Completed if order.release_tx_hash().is_none() => reject("escrow has not been released"),
            Completed => Ok(()),
            Expired => reject("a disputed order cannot expire"),
            restored => {
                let previous = order.dispute.as_ref().map(|d| d.previous_status);
                if previous == Some(restored) {
                    Ok(())
                } else {
                    reject("a dispute can only be resumed at its pre-dispute status")
                }
            },
        };
    }

    match to {
        Disputed if role.is_some() || is_compliance => Ok(()),
        Disputed => reject("only a party or compliance can raise a dispute"),
        Cancelled if role.is_none() => reject("only a party to the order can cancel it"),
        Cancelled if funds_held => reject("escrowed funds must be refunded before cancelling"),
        Cancelled if order.escrow_locked() => Ok(()),
        Cancelled if matches!(from, Pending | Accepted | EscrowPending) => Ok(()),
        Cancelled => reject("cancellation is only permitted before escrow is locked"),
        Expired if actor.kind != ActorType::System => reject("orders are only expired by the system"),
        Expired if funds_held => reject("escrowed funds must be refunded before expiring"),
        Expired => match order.expires_at {
            Some(deadline) if now >= deadline => Ok(()),
            Some(_) => reject("the order has not reached its deadline"),
            None => reject("the order has no deadline"),
        },
        Accepted => match (actor.kind, role) {
            (ActorType::User | ActorType::Merchant, Some(_)) => Ok(()),
            _ => reject("only a counterparty can accept the order"),
        },
        EscrowPending | PaymentConfirmed | Releasing => require_role(order, to, role, TradeRole::Seller),
        Escrowed => {
            require_role(order, to, role, TradeRole::Seller)?;
            if order.escrow_locked() {
                Ok(())
            } else {
                reject("no escrow lock has been recorded")
            }
        },
        PaymentPending | PaymentSent => require_role(order, to, role, TradeRole::Buyer),
        Completed => {
            if role != Some(TradeRole::Seller) && actor.kind != ActorType::System {
                return reject("only the seller or the system can complete the order");
            }
            if order.release_tx_hash().is_none() {
                return reject("escrow has not been released");
            }
            Ok(())
        },
        Pending => reject("orders never return to pending"),
    }
}

fn require_role(
    order: &Order,
    to: OrderStatusType,
    actual: Option<TradeRole>,
    required: TradeRole,
) -> Result<(), LifecycleError> {
    if actual == Some(required) {
        Ok(())
    } else {
        let side = match required {
            TradeRole::Buyer => "buyer",
            TradeRole::Seller => "seller",
        };
        Err(LifecycleError::invalid(order, to, &format!("only the {side} can move the order to {to}")))
    }
}

/// Either party may ask for more time while the order is live, has not used up its extensions and is not overdue.
pub fn check_extension_request(order: &Order, actor: &Actor, now: DateTime<Utc>) -> Result<(), LifecycleError> {
    let reject = |reason: &str| Err(LifecycleError::extension(order, reason));
    if order.is_terminal() {
        return reject("the order is in a terminal status");
    }
    if !order.is_party(actor) {
        return reject("only a party to the order can request an extension");
    }
    if order.extension_count >= order.max_extensions {
        return reject("the maximum number of extensions has been used");
    }
    if order.pending_extension.is_some() {
        return reject("an extension request is already pending");
    }
    match order.expires_at {
        Some(deadline) if now < deadline => Ok(()),
        Some(_) => reject("the order has already reached its deadline"),
        None => reject("the order has no deadline to extend"),
    }
}

/// Only the party that did not ask for the extension can answer it.
pub fn check_extension_response<'a>(order: &'a Order, actor: &Actor) -> Result<&'a ExtensionRequest, LifecycleError> {
    let request =
        order.pending_extension.as_ref().ok_or_else(|| LifecycleError::extension(order, "no extension is pending"))?;
    if order.is_terminal() {
        return Err(LifecycleError::extension(order, "the order is in a terminal status"));
    }
    if !order.is_party(actor) {
        return Err(LifecycleError::extension(order, "only a party to the order can respond"));
    }
    if request.requested_by == *actor {
        return Err(LifecycleError::extension(order, "the requester cannot answer their own request"));
    }
    Ok(request)
}
