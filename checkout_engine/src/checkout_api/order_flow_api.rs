use std::fmt::Debug;

use chrono::Utc;
use log::*;
use serde_json::json;

use crate::{
    checkout_api::{
        errors::CheckoutError,
        guards::{ensure_reservation_live, require_party_or_admin},
        order_objects::ShippingDetails,
    },
    db_types::{Actor, NewAuditEntry, Order, OrderId, OrderStatusType, OrderUpdate},
    events::{EventProducers, OrderAnnulledEvent, OrderFulfilmentEvent},
    traits::{AuditLog, ListingManagement, OrderManagement},
};

/// `OrderFlowApi` covers the order lifecycle outside of payment: reading, shipping, delivery confirmation and
/// pre-payment cancellation.
///
/// | From \ To  | Cancelled | Shipped | Completed |
/// |------------|-----------|---------|-----------|
/// | Reserved   | buyer, seller, admin |  |        |
/// | Paid       |           | seller  |           |
/// | Shipped    |           |         | buyer     |
///
/// Every transition is a conditional write on the expected current status. A lost race is reported as a conflict and
/// never overwritten.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

impl<B> OrderFlowApi<B>
where B: OrderManagement + ListingManagement + AuditLog
{
    /// Buyers and sellers can see their own orders. Admins can see everything.
    pub async fn order_for_actor(&self, order_id: &OrderId, actor: &Actor) -> Result<Order, CheckoutError> {
        let order = self.fetch_order(order_id).await?;
        require_party_or_admin(&order, actor)?;
        Ok(order)
    }

    pub async fn mark_shipped(
        &self,
        order_id: &OrderId,
        actor: &Actor,
        shipping: ShippingDetails,
    ) -> Result<Order, CheckoutError> {
        let order = self.fetch_order(order_id).await?;
        if order.seller_id != actor.id {
            return Err(CheckoutError::Authorization(format!("Only the seller can ship order {order_id}")));
        }
        if shipping.tracking_number.trim().is_empty() {
            return Err(CheckoutError::Validation("A tracking number is required".into()));
        }
        if order.status != OrderStatusType::Paid {
            return Err(CheckoutError::Validation(format!(
                "Order {order_id} is {} and cannot be shipped. Only paid orders can be shipped.",
                order.status
            )));
        }
        let update = OrderUpdate {
            shipped_at: Some(Utc::now()),
            tracking_number: Some(shipping.tracking_number.trim().to_string()),
            tracking_carrier: shipping.carrier.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            ..OrderUpdate::transition(OrderStatusType::Paid, OrderStatusType::Shipped)
        };
        let shipped = self.apply(order_id, update, "shipped").await?;
        info!("📦️ Order {order_id} shipped by {}", actor.id);
        self.producers.publish_order_fulfilment(OrderFulfilmentEvent::new(shipped.clone())).await;
        Ok(shipped)
    }

    pub async fn confirm_delivery(&self, order_id: &OrderId, actor: &Actor) -> Result<Order, CheckoutError> {
        let order = self.fetch_order(order_id).await?;
        if order.buyer_id != actor.id {
            return Err(CheckoutError::Authorization(format!("Only the buyer can confirm delivery of {order_id}")));
        }
        if order.status != OrderStatusType::Shipped {
            return Err(CheckoutError::Validation(format!(
                "Order {order_id} is {} and cannot be confirmed as delivered",
                order.status
            )));
        }
        let update = OrderUpdate {
            delivered_at: Some(Utc::now()),
            ..OrderUpdate::transition(OrderStatusType::Shipped, OrderStatusType::Completed)
        };
        let completed = self.apply(order_id, update, "completed").await?;
        info!("📦️ Order {order_id} delivered and completed");
        self.producers.publish_order_fulfilment(OrderFulfilmentEvent::new(completed.clone())).await;
        Ok(completed)
    }

    /// Cancels an order that has not been paid for yet. The listing is released. An authorization on the order, if
    /// any, is left alone; voiding it is a separate administrative action.
    pub async fn cancel_order(&self, order_id: &OrderId, actor: &Actor) -> Result<Order, CheckoutError> {
        let order = self.fetch_order(order_id).await?;
        require_party_or_admin(&order, actor)?;
        let order = ensure_reservation_live(&self.db, &self.producers, order, Utc::now()).await?;
        if order.status != OrderStatusType::Reserved {
            return Err(CheckoutError::Validation(format!(
                "Order {order_id} is {} and can no longer be cancelled",
                order.status
            )));
        }
        let now = Utc::now();
        let update = OrderUpdate {
            cancelled_at: Some(now),
            ..OrderUpdate::transition(OrderStatusType::Reserved, OrderStatusType::Cancelled)
        }
        .with_metadata(json!({ "cancelled_by": { "id": actor.id, "role": actor.role } }));
        let cancelled = self.apply(order_id, update, "cancelled").await?;
        if !self.db.release_reservation(&cancelled.listing_id, order_id.as_str()).await? {
            debug!("📦️ Listing {} was not held by order {order_id}", cancelled.listing_id);
        }
        let details = json!({ "previous_status": OrderStatusType::Reserved });
        let entry = NewAuditEntry::new(actor, "order.cancelled", "order", order_id.as_str(), details);
        self.db.append_audit_entry(entry).await?;
        info!("📦️ Order {order_id} cancelled by {} ({})", actor.id, actor.role);
        self.producers.publish_order_annulled(OrderAnnulledEvent::new(cancelled.clone())).await;
        Ok(cancelled)
    }

    async fn apply(&self, order_id: &OrderId, update: OrderUpdate, target: &str) -> Result<Order, CheckoutError> {
        match self.db.update_order(order_id, update).await? {
            Some(order) => Ok(order),
            None => {
                let current = self.fetch_order(order_id).await?;
                Err(CheckoutError::Conflict(format!(
                    "Order {order_id} could not be {target}. Its status changed to {} in the meantime.",
                    current.status
                )))
            },
        }
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Order, CheckoutError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| CheckoutError::not_found("Order", order_id.as_str()))
    }
}
