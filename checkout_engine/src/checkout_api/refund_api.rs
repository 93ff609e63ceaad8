use std::{collections::HashMap, fmt::Debug};

use chrono::Utc;
use log::*;
use serde_json::json;

use crate::{
    checkout_api::{
        errors::{CheckoutError, PaymentFailure},
        guards::{require_party_or_admin, require_seller},
    },
    db_types::{
        Actor,
        MinorUnits,
        NewAuditEntry,
        NewRefundRequest,
        Order,
        OrderId,
        OrderStatusType,
        OrderUpdate,
        RefundRequest,
        RefundStatus,
        RefundUpdate,
    },
    events::{EventProducers, OrderAnnulledEvent, RefundUpdatedEvent},
    helpers::{new_refund_idempotency_id, validate_idempotency_id},
    traits::{gateway_objects::GatewayState, AuditLog, ListingManagement, OrderManagement, PaymentGateway, RefundManagement},
};

pub const MIN_REASON_LENGTH: usize = 10;

/// `RefundApi` runs the dual-approval refund workflow.
///
/// | From \ To        | ReturnRequested | ReturnReceived | Executed | Denied | Cancelled (deleted) |
/// |------------------|-----------------|----------------|----------|--------|---------------------|
/// | Pending          | buyer           |                |          | seller | buyer               |
/// | ReturnRequested  |                 | seller         |          | seller | buyer               |
/// | ReturnReceived   |                 |                | seller   | seller |                     |
///
/// Only approval moves money. The reversal is sent with the idempotency id stored on the request, so even two
/// concurrent approvals produce a single reversal at the processor; a repeat approval of an executed request returns
/// the stored result without calling the processor again.
pub struct RefundApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
}

impl<B, G> Debug for RefundApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundApi")
    }
}

impl<B, G> RefundApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        Self { db, gateway, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

fn check_reason(reason: &str, what: &str) -> Result<String, CheckoutError> {
    let reason = reason.trim();
    if reason.chars().count() < MIN_REASON_LENGTH {
        return Err(CheckoutError::Validation(format!("{what} must be at least {MIN_REASON_LENGTH} characters long")));
    }
    Ok(reason.to_string())
}

/// Defaults to whatever has not been refunded yet. Explicit amounts must be positive and may not exceed that
/// remainder.
fn refund_amount(
    requested: Option<i64>,
    original: MinorUnits,
    already_refunded: MinorUnits,
) -> Result<MinorUnits, CheckoutError> {
    let remaining = original - already_refunded;
    if !remaining.is_positive() {
        return Err(CheckoutError::Validation(format!("The payment ({original}) has already been refunded in full")));
    }
    let amount = requested.map(MinorUnits::from).unwrap_or(remaining);
    if !amount.is_positive() {
        return Err(CheckoutError::Validation("The refund amount must be a positive number of minor units".into()));
    }
    if amount > remaining {
        return Err(CheckoutError::Validation(format!(
            "The refund amount ({amount}) may not exceed the refundable remainder ({remaining} of {original})"
        )));
    }
    Ok(amount)
}

/// The total of all executed refunds in `refunds`.
fn executed_total(refunds: &[RefundRequest]) -> MinorUnits {
    refunds.iter().filter(|r| r.status == RefundStatus::Executed).map(|r| r.requested_amount).sum()
}

impl<B, G> RefundApi<B, G>
where
    B: OrderManagement + ListingManagement + RefundManagement + AuditLog,
    G: PaymentGateway,
{
    pub async fn request_refund(
        &self,
        order_id: &OrderId,
        actor: &Actor,
        reason: &str,
        amount: Option<i64>,
        idempotency_id: Option<String>,
    ) -> Result<RefundRequest, CheckoutError> {
        let reason = check_reason(reason, "The refund reason")?;
        let order = self.fetch_order(order_id).await?;
        if order.buyer_id != actor.id {
            return Err(CheckoutError::Authorization(format!("Only the buyer can request a refund for {order_id}")));
        }
        if !order.status.is_refundable() {
            return Err(CheckoutError::Validation(format!("Order {order_id} is {} and cannot be refunded", order.status)));
        }
        if let Some(active) = self.db.fetch_active_refund_for_order(order_id).await? {
            return Err(CheckoutError::Validation(format!(
                "Order {order_id} already has a refund request in progress ({})",
                active.id
            )));
        }
        let transfer_id = order
            .finix_transfer_id
            .clone()
            .ok_or_else(|| CheckoutError::Validation(format!("Order {order_id} has no captured payment to refund")))?;
        let transfer = self.gateway.get_transfer(&transfer_id).await.map_err(CheckoutError::Gateway)?;
        if transfer.state != GatewayState::Succeeded {
            return Err(CheckoutError::Validation(format!(
                "The payment for order {order_id} is {} at the processor. Only settled payments can be refunded.",
                transfer.state
            )));
        }
        let original = if transfer.amount.is_positive() { transfer.amount } else { order.amount };
        let already_refunded = executed_total(&self.db.fetch_refunds_for_order(order_id).await?);
        let requested_amount = refund_amount(amount, original, already_refunded)?;
        let idempotency_id = match idempotency_id.filter(|s| !s.trim().is_empty()) {
            Some(id) => {
                validate_idempotency_id(&id).map_err(CheckoutError::Validation)?;
                id
            },
            None => new_refund_idempotency_id(order_id),
        };
        let refund = NewRefundRequest {
            id: uuid::Uuid::new_v4().to_string(),
            order_id: order_id.clone(),
            buyer_id: order.buyer_id.clone(),
            seller_id: order.seller_id.clone(),
            requested_amount,
            original_transfer_amount: original,
            currency: transfer.currency.clone().unwrap_or_else(|| order.currency.clone()),
            buyer_reason: reason.clone(),
            finix_transfer_id: transfer_id,
            idempotency_id,
        };
        let refund = self.db.insert_refund_request(refund).await?;
        self.set_pending_refund(order_id, Some(&refund.id)).await;
        let details = json!({
            "amount": refund.requested_amount,
            "original_amount": original,
            "already_refunded": already_refunded,
            "reason": reason,
        });
        self.audit(actor, "refund.requested", &refund, details).await?;
        info!("↩️ Refund {} of {} requested for order {order_id}", refund.id, refund.requested_amount);
        self.producers.publish_refund_updated(RefundUpdatedEvent::new(refund.clone(), actor.clone())).await;
        Ok(refund)
    }

    pub async fn submit_product_return(
        &self,
        refund_id: &str,
        actor: &Actor,
        tracking_number: &str,
    ) -> Result<RefundRequest, CheckoutError> {
        let refund = self.fetch_refund(refund_id).await?;
        if refund.buyer_id != actor.id {
            return Err(CheckoutError::Authorization("Only the buyer can submit the product return".into()));
        }
        if refund.status != RefundStatus::Pending {
            return Err(CheckoutError::Validation(format!(
                "Refund {refund_id} is {}. A return can only be submitted for a pending request.",
                refund.status
            )));
        }
        let tracking_number = tracking_number.trim();
        if tracking_number.is_empty() {
            return Err(CheckoutError::Validation("A return tracking number is required".into()));
        }
        let update = RefundUpdate {
            product_returned: Some(true),
            return_tracking_number: Some(tracking_number.to_string()),
            ..RefundUpdate::transition(RefundStatus::Pending, RefundStatus::ReturnRequested)
        };
        let refund = self.apply(refund_id, update).await?;
        debug!("↩️ Return for refund {refund_id} shipped with tracking number {tracking_number}");
        self.producers.publish_refund_updated(RefundUpdatedEvent::new(refund.clone(), actor.clone())).await;
        Ok(refund)
    }

    pub async fn confirm_product_return(&self, refund_id: &str, actor: &Actor) -> Result<RefundRequest, CheckoutError> {
        let refund = self.fetch_refund(refund_id).await?;
        require_seller(&refund.seller_id, actor, &format!("refund {refund_id}"))?;
        if !refund.product_returned {
            return Err(CheckoutError::Validation(
                "The buyer has not submitted the product return for this refund yet".into(),
            ));
        }
        if refund.status != RefundStatus::ReturnRequested {
            return Err(CheckoutError::Validation(format!(
                "Refund {refund_id} is {} and its return cannot be confirmed",
                refund.status
            )));
        }
        let update = RefundUpdate {
            product_return_confirmed: Some(true),
            ..RefundUpdate::transition(RefundStatus::ReturnRequested, RefundStatus::ReturnReceived)
        };
        let refund = self.apply(refund_id, update).await?;
        debug!("↩️ Seller {} confirmed receipt of the return for refund {refund_id}", actor.id);
        self.producers.publish_refund_updated(RefundUpdatedEvent::new(refund.clone(), actor.clone())).await;
        Ok(refund)
    }

    /// Approves the refund and reverses the payment. Safe to call again: an executed request is returned as is.
    pub async fn approve_refund_request(
        &self,
        refund_id: &str,
        actor: &Actor,
        response_reason: Option<String>,
    ) -> Result<RefundRequest, CheckoutError> {
        let refund = self.fetch_refund(refund_id).await?;
        require_seller(&refund.seller_id, actor, &format!("refund {refund_id}"))?;
        if refund.status == RefundStatus::Executed {
            debug!("↩️ Refund {refund_id} was already executed. Returning the stored result.");
            return Ok(refund);
        }
        if !refund.product_return_confirmed {
            return Err(CheckoutError::Validation(
                "The product return must be confirmed before the refund can be approved".into(),
            ));
        }
        if refund.status != RefundStatus::ReturnReceived {
            return Err(CheckoutError::Validation(format!("Refund {refund_id} is {} and cannot be approved", refund.status)));
        }
        let tags = HashMap::from([
            ("refund_id".to_string(), refund.id.clone()),
            ("order_id".to_string(), refund.order_id.to_string()),
        ]);
        let reversal = self
            .gateway
            .create_transfer_reversal(&refund.finix_transfer_id, refund.requested_amount, tags, &refund.idempotency_id)
            .await
            .map_err(|e| {
                let failure = PaymentFailure::from_gateway(&e).with_transfer(Some(&refund.finix_transfer_id));
                warn!("↩️ Reversal for refund {refund_id} failed. {failure}");
                CheckoutError::Payment(failure)
            })?;
        info!("↩️ Reversal {} created for refund {refund_id} ({})", reversal.id, reversal.state);

        let update = RefundUpdate {
            finix_reversal_id: Some(reversal.id.clone()),
            approved_by: Some(actor.id.clone()),
            approved_at: Some(Utc::now()),
            seller_response_reason: response_reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
            ..RefundUpdate::transition(RefundStatus::ReturnReceived, RefundStatus::Executed)
        };
        let executed = match self.db.update_refund_request(refund_id, update).await? {
            Some(r) => r,
            None => {
                let current = self.fetch_refund(refund_id).await?;
                if current.status == RefundStatus::Executed {
                    debug!("↩️ A concurrent approval of refund {refund_id} won. Returning its result.");
                    return Ok(current);
                }
                return Err(CheckoutError::Conflict(format!(
                    "Refund {refund_id} changed to {} while it was being approved",
                    current.status
                )));
            },
        };

        let refunded = executed_total(&self.db.fetch_refunds_for_order(&executed.order_id).await?);
        let full = refunded >= executed.original_transfer_amount;
        let order_update = if full {
            OrderUpdate {
                status: Some(OrderStatusType::Refunded),
                refunded_at: Some(Utc::now()),
                ..Default::default()
            }
        } else {
            OrderUpdate::default()
        }
        .with_metadata(json!({
            "pending_refund_id": null,
            "last_refund": { "refund_id": executed.id, "reversal_id": reversal.id, "amount": executed.requested_amount },
            "refunded_total": refunded,
        }));
        match self.db.update_order(&executed.order_id, order_update).await? {
            Some(order) if full => {
                self.db.set_active(&order.listing_id).await?;
                info!("↩️ Order {} fully refunded. Listing {} is for sale again.", order.id, order.listing_id);
                self.producers.publish_order_annulled(OrderAnnulledEvent::new(order)).await;
            },
            Some(_) => debug!("↩️ Partial refund recorded on order {}", executed.order_id),
            None => warn!("↩️ Order {} could not be updated after refund {refund_id}", executed.order_id),
        }
        let details = json!({
            "amount": executed.requested_amount,
            "reversal_id": reversal.id,
            "refunded_total": refunded,
            "full_refund": full,
        });
        self.audit(actor, "refund.approved", &executed, details).await?;
        self.producers.publish_refund_updated(RefundUpdatedEvent::new(executed.clone(), actor.clone())).await;
        Ok(executed)
    }

    pub async fn deny_refund_request(
        &self,
        refund_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> Result<RefundRequest, CheckoutError> {
        let reason = check_reason(reason, "The denial reason")?;
        let refund = self.fetch_refund(refund_id).await?;
        require_seller(&refund.seller_id, actor, &format!("refund {refund_id}"))?;
        if !refund.status.is_active() {
            return Err(CheckoutError::Validation(format!("Refund {refund_id} is {} and cannot be denied", refund.status)));
        }
        let update = RefundUpdate {
            status: Some(RefundStatus::Denied),
            seller_response_reason: Some(reason.clone()),
            denied_at: Some(Utc::now()),
            ..Default::default()
        };
        let denied = self.apply(refund_id, update).await?;
        self.set_pending_refund(&denied.order_id, None).await;
        self.audit(actor, "refund.denied", &denied, json!({ "reason": reason })).await?;
        info!("↩️ Refund {refund_id} denied by {}", actor.id);
        self.producers.publish_refund_updated(RefundUpdatedEvent::new(denied.clone(), actor.clone())).await;
        Ok(denied)
    }

    /// Withdraws a request before the seller has received the return. The request is deleted outright.
    pub async fn cancel_refund_request(&self, refund_id: &str, actor: &Actor) -> Result<RefundRequest, CheckoutError> {
        let refund = self.fetch_refund(refund_id).await?;
        if refund.buyer_id != actor.id {
            return Err(CheckoutError::Authorization("Only the buyer can cancel a refund request".into()));
        }
        let cancellable = RefundStatus::predecessors_of(RefundStatus::Cancelled);
        if !cancellable.contains(&refund.status) {
            return Err(CheckoutError::Validation(format!(
                "Refund {refund_id} is {} and can no longer be cancelled",
                refund.status
            )));
        }
        if !self.db.delete_refund_request(refund_id, &cancellable).await? {
            return Err(CheckoutError::Conflict(format!("Refund {refund_id} changed while it was being cancelled")));
        }
        self.set_pending_refund(&refund.order_id, None).await;
        self.audit(actor, "refund.cancelled", &refund, json!({ "status_at_cancellation": refund.status })).await?;
        info!("↩️ Refund {refund_id} cancelled by the buyer");
        self.producers.publish_refund_updated(RefundUpdatedEvent::cancelled(refund.clone(), actor.clone())).await;
        Ok(refund)
    }

    pub async fn refunds_for_order(&self, order_id: &OrderId, actor: &Actor) -> Result<Vec<RefundRequest>, CheckoutError> {
        let order = self.fetch_order(order_id).await?;
        require_party_or_admin(&order, actor)?;
        let refunds = self.db.fetch_refunds_for_order(order_id).await?;
        Ok(refunds)
    }

    pub async fn refund_for_actor(&self, refund_id: &str, actor: &Actor) -> Result<RefundRequest, CheckoutError> {
        let refund = self.fetch_refund(refund_id).await?;
        if !(actor.is_admin() || refund.buyer_id == actor.id || refund.seller_id == actor.id) {
            return Err(CheckoutError::Authorization(format!("{} is not a party to refund {refund_id}", actor.id)));
        }
        Ok(refund)
    }

    async fn apply(&self, refund_id: &str, update: RefundUpdate) -> Result<RefundRequest, CheckoutError> {
        match self.db.update_refund_request(refund_id, update).await? {
            Some(refund) => Ok(refund),
            None => {
                let current = self.fetch_refund(refund_id).await?;
                Err(CheckoutError::Conflict(format!(
                    "Refund {refund_id} changed to {} in the meantime. Please reload and try again.",
                    current.status
                )))
            },
        }
    }

    async fn audit(
        &self,
        actor: &Actor,
        action: &str,
        refund: &RefundRequest,
        mut details: serde_json::Value,
    ) -> Result<(), CheckoutError> {
        details["order_id"] = json!(refund.order_id);
        let entry = NewAuditEntry::new(actor, action, "refund_request", &refund.id, details);
        self.db.append_audit_entry(entry).await?;
        Ok(())
    }

    /// Keeps `metadata.pending_refund_id` on the order pointing at the active request. Failures are only logged.
    async fn set_pending_refund(&self, order_id: &OrderId, refund_id: Option<&str>) {
        let update = OrderUpdate::default().with_metadata(json!({ "pending_refund_id": refund_id }));
        if let Err(e) = self.db.update_order(order_id, update).await {
            warn!("↩️ Could not update the pending refund pointer on order {order_id}. {e}");
        }
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Order, CheckoutError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| CheckoutError::not_found("Order", order_id.as_str()))
    }

    async fn fetch_refund(&self, refund_id: &str) -> Result<RefundRequest, CheckoutError> {
        self.db
            .fetch_refund_request(refund_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Refund request", refund_id))
    }
}
