use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;

use crate::{
    api::OrderFlowError,
    db_types::{
        Actor,
        ActorType,
        DisputeResolution,
        DisputeStatus,
        EscrowRecord,
        NewOrder,
        Order,
        OrderId,
        OrderStatusType::{self, *},
    },
    events::{EventProducers, OrderEvent},
    order_lifecycle::{
        apply_cancellation,
        apply_dispute,
        apply_escrow_lock,
        apply_extension_request,
        apply_extension_response,
        apply_refund,
        apply_release,
        apply_resolution,
        apply_transition,
        check_transition,
        LifecycleError,
    },
    traits::{EscrowService, ExpiryResult, NoEscrowService, OrderQueryFilter, OrderStore, OrderStoreError},
};

/// `OrderFlowApi` drives orders through their lifecycle.
///
/// Every operation follows the same pattern: load the order, ask [`crate::order_lifecycle`] whether the change is
/// allowed and what the order looks like afterwards, save it against the version it was loaded at, and publish the
/// resulting event. Escrow side effects (release, refund) go through the [`EscrowService`] before the order is
/// updated, so a recorded transaction hash always refers to funds that have actually moved.
pub struct OrderFlowApi<B, E = NoEscrowService> {
    db: B,
    escrow: E,
    producers: EventProducers,
    default_ttl: Option<Duration>,
}

impl<B, E> Debug for OrderFlowApi<B, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    /// An API without an escrow service. Releases and refunds will fail.
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self::with_escrow(db, NoEscrowService, producers)
    }
}

impl<B, E> OrderFlowApi<B, E> {
    pub fn with_escrow(db: B, escrow: E, producers: EventProducers) -> Self {
        Self { db, escrow, producers, default_ttl: None }
    }

    /// Orders created without their own time-to-live expire after `ttl`.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, E> OrderFlowApi<B, E>
where
    B: OrderStore,
    E: EscrowService,
{
    /// Stores a new order in `pending` status and announces it on the merchant feed.
    ///
    /// Creating an order with an id that already exists returns the stored order and publishes nothing.
    pub async fn create_order(&self, mut order: NewOrder) -> Result<Order, OrderFlowError> {
        if order.ttl_secs.is_none() {
            order.ttl_secs = self.default_ttl.map(|ttl| ttl.num_seconds());
        }
        let (order, inserted) = self.db.insert_order(order).await?;
        if inserted {
            info!("🔄️📦️ Order {} ({}) created for user {}", order.id, order.order_number, order.user_id);
            self.producers.publish_order_event(OrderEvent::created(&order)).await;
        } else {
            debug!("🔄️📦️ Order {} already exists. Nothing to do.", order.id);
        }
        Ok(order)
    }

    pub async fn fetch_order(&self, id: &OrderId) -> Result<Order, OrderFlowError> {
        self.db.fetch_order(id).await?.ok_or_else(|| OrderFlowError::OrderNotFound(id.clone()))
    }

    pub async fn orders_for_actor(&self, actor: &Actor) -> Result<Vec<Order>, OrderFlowError> {
        Ok(self.db.fetch_orders_for_actor(actor).await?)
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        Ok(self.db.search_orders(query).await?)
    }

    /// A generic status change, as requested by `PATCH /orders/{id}`.
    ///
    /// If `expected_version` is given and the order has moved on since, the request fails with a version conflict.
    /// Cancellation is routed through [`Self::cancel_order`] so that escrowed funds are refunded. `escrowed`,
    /// `completed` and `disputed` need extra data and have their own operations.
    pub async fn transition(
        &self,
        id: &OrderId,
        to: OrderStatusType,
        actor: &Actor,
        expected_version: Option<i64>,
    ) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(id).await?;
        if let Some(expected) = expected_version {
            if expected != order.order_version {
                return Err(OrderStoreError::VersionConflict {
                    order_id: id.clone(),
                    expected,
                    actual: order.order_version,
                }
                .into());
            }
        }
        match to {
            Cancelled => self.cancel(order, actor, None).await,
            Escrowed => Err(LifecycleError::invalid(&order, to, "report the escrow lock with its transaction hash").into()),
            Completed => Err(LifecycleError::invalid(&order, to, "completion happens by releasing the escrow").into()),
            Disputed => Err(LifecycleError::invalid(&order, to, "disputes must be raised with a reason").into()),
            _ => self.step(order, to, actor).await,
        }
    }

    pub async fn accept_order(&self, id: &OrderId, actor: &Actor) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(id).await?;
        self.step(order, Accepted, actor).await
    }

    /// The seller has started locking funds.
    pub async fn start_escrow(&self, id: &OrderId, actor: &Actor) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(id).await?;
        self.step(order, EscrowPending, actor).await
    }

    /// Records the escrow lock reported by the seller. An `accepted` order passes through `escrow_pending` first, so
    /// this can bump the version twice.
    pub async fn confirm_escrow_locked(
        &self,
        id: &OrderId,
        actor: &Actor,
        tx_hash: &str,
        escrow_address: Option<String>,
    ) -> Result<Order, OrderFlowError> {
        let mut order = self.fetch_order(id).await?;
        if order.status == Accepted {
            order = self.step(order, EscrowPending, actor).await?;
        }
        let next = apply_escrow_lock(&order, actor, tx_hash, escrow_address, Utc::now())?;
        info!("🔄️🔒️ Escrow for order {id} locked in {tx_hash}");
        self.save_status_change(&order, next).await
    }

    pub async fn start_payment(&self, id: &OrderId, actor: &Actor) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(id).await?;
        self.step(order, PaymentPending, actor).await
    }

    pub async fn mark_payment_sent(&self, id: &OrderId, actor: &Actor) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(id).await?;
        self.step(order, PaymentSent, actor).await
    }

    pub async fn confirm_payment(&self, id: &OrderId, actor: &Actor) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(id).await?;
        self.step(order, PaymentConfirmed, actor).await
    }

    /// Releases the escrow to the buyer and completes the order.
    ///
    /// A `payment_confirmed` order is moved to `releasing` first. If the escrow service fails, the order stays in
    /// `releasing` and the call can be retried.
    pub async fn release_escrow(&self, id: &OrderId, actor: &Actor) -> Result<Order, OrderFlowError> {
        let mut order = self.fetch_order(id).await?;
        if order.status == PaymentConfirmed {
            order = self.step(order, Releasing, actor).await?;
        }
        if order.status != Releasing {
            return Err(LifecycleError::invalid(&order, Completed, "escrow can only be released from releasing").into());
        }
        let now = Utc::now();
        // Make sure the actor is allowed to complete the order before any funds move
        let mut probe = order.clone();
        probe.escrow.get_or_insert_with(EscrowRecord::default).release_tx_hash = Some(String::new());
        check_transition(&probe, Completed, actor, now)?;
        let tx_hash = self.escrow.release(&order).await?;
        info!("🔄️🔓️ Escrow for order {id} released in {tx_hash}");
        let next = apply_release(&order, actor, &tx_hash, now)?;
        self.save_status_change(&order, next).await
    }

    /// Cancels the order. If funds are locked in escrow they are refunded to the seller first, and the refund is
    /// recorded on the order before the cancellation.
    pub async fn cancel_order(
        &self,
        id: &OrderId,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(id).await?;
        self.cancel(order, actor, reason).await
    }

    pub async fn raise_dispute(
        &self,
        id: &OrderId,
        actor: &Actor,
        reason: String,
        description: Option<String>,
    ) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(id).await?;
        let next = apply_dispute(&order, actor, reason, description, Utc::now())?;
        warn!("🔄️⚖️ Dispute raised on order {id} by {actor}");
        self.save_status_change(&order, next).await
    }

    /// Settles an open dispute. Only compliance may do this.
    ///
    /// * `Resume` puts the order back where it was when the dispute was raised.
    /// * `ForceComplete` releases the escrow (if it has not been released yet) and completes the order.
    /// * `ForceCancel` refunds the escrow (if funds are held) and cancels the order.
    pub async fn resolve_dispute(
        &self,
        id: &OrderId,
        actor: &Actor,
        resolution: DisputeResolution,
    ) -> Result<Order, OrderFlowError> {
        let mut order = self.fetch_order(id).await?;
        let has_open_dispute = order.dispute.as_ref().map(|d| d.status == DisputeStatus::Open).unwrap_or(false);
        if order.status != Disputed || !has_open_dispute {
            return Err(LifecycleError::invalid(&order, order.status, "there is no open dispute").into());
        }
        if actor.kind != ActorType::Compliance {
            return Err(LifecycleError::invalid(&order, order.status, "only compliance can resolve a dispute").into());
        }
        match resolution {
            DisputeResolution::ForceComplete if order.escrow_locked() && order.release_tx_hash().is_none() => {
                let tx_hash = self.escrow.release(&order).await?;
                info!("🔄️🔓️ Escrow for disputed order {id} released in {tx_hash}");
                if let Some(record) = order.escrow.as_mut() {
                    record.release_tx_hash = Some(tx_hash);
                }
            },
            DisputeResolution::ForceCancel if order.escrow_locked() && !order.escrow_refunded() => {
                order = self.refund(order).await?;
            },
            _ => {},
        }
        let next = apply_resolution(&order, actor, resolution, Utc::now())?;
        info!("🔄️⚖️ Dispute on order {id} resolved with {resolution}");
        self.save_status_change(&order, next).await
    }

    pub async fn request_extension(&self, id: &OrderId, actor: &Actor, minutes: i64) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(id).await?;
        let next = apply_extension_request(&order, actor, minutes, Utc::now())?;
        let saved = self.db.save_order(&next, order.order_version).await?;
        debug!("🔄️⏳️ {actor} asked for {minutes} more minutes on order {id}");
        self.producers.publish_order_event(OrderEvent::extension_requested(&saved)).await;
        Ok(saved)
    }

    pub async fn respond_to_extension(&self, id: &OrderId, actor: &Actor, accept: bool) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(id).await?;
        let next = apply_extension_response(&order, actor, accept, Utc::now())?;
        let saved = self.db.save_order(&next, order.order_version).await?;
        debug!("🔄️⏳️ Extension on order {id} {}", if accept { "accepted" } else { "declined" });
        self.producers.publish_order_event(OrderEvent::extension_response(&saved, accept)).await;
        Ok(saved)
    }

    /// Expires every order that is past its deadline and still waiting on the counterparty or the escrow lock.
    ///
    /// One failing order does not stop the others; failures are reported in the result.
    pub async fn expire_overdue_orders(&self, now: DateTime<Utc>) -> Result<ExpiryResult, OrderFlowError> {
        let due = self.db.fetch_expirable_orders(now).await?;
        let mut result = ExpiryResult::default();
        let system = Actor::system();
        for order in due {
            let outcome = match apply_transition(&order, Expired, &system, now) {
                Ok(next) => self.save_status_change(&order, next).await,
                Err(e) => Err(e.into()),
            };
            match outcome {
                Ok(expired) => result.expired.push(expired),
                Err(e) => {
                    warn!("🔄️🕰️ Could not expire order {}: {e}", order.id);
                    result.failed.push((order, e.to_string()));
                },
            }
        }
        Ok(result)
    }

    async fn step(&self, order: Order, to: OrderStatusType, actor: &Actor) -> Result<Order, OrderFlowError> {
        let next = apply_transition(&order, to, actor, Utc::now())?;
        self.save_status_change(&order, next).await
    }

    async fn cancel(&self, order: Order, actor: &Actor, reason: Option<String>) -> Result<Order, OrderFlowError> {
        let now = Utc::now();
        let order = if order.escrow_locked() && !order.escrow_refunded() {
            // Refunding is irreversible, so check the cancellation would be accepted once refunded
            let mut probe = order.clone();
            probe.escrow.get_or_insert_with(EscrowRecord::default).refund_tx_hash = Some(String::new());
            check_transition(&probe, Cancelled, actor, now)?;
            self.refund(order).await?
        } else {
            order
        };
        let next = apply_cancellation(&order, actor, reason, now)?;
        self.save_status_change(&order, next).await
    }

    async fn refund(&self, order: Order) -> Result<Order, OrderFlowError> {
        let tx_hash = self.escrow.refund(&order).await?;
        info!("🔄️💸️ Escrow for order {} refunded in {tx_hash}", order.id);
        let next = apply_refund(&order, &tx_hash, Utc::now())?;
        self.save_status_change(&order, next).await
    }

    async fn save_status_change(&self, before: &Order, after: Order) -> Result<Order, OrderFlowError> {
        let saved = self.db.save_order(&after, before.order_version).await?;
        info!(
            "🔄️ Order {} moved from {} to {} (v{} → v{})",
            saved.id, before.status, saved.status, before.order_version, saved.order_version
        );
        self.producers.publish_order_event(OrderEvent::status_changed(&saved, before.status)).await;
        Ok(saved)
    }
}
