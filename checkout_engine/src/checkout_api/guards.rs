//! Checks shared by every buyer-facing order operation.
use chrono::{DateTime, Utc};
use log::*;
use serde_json::json;

use crate::{
    checkout_api::errors::CheckoutError,
    db_types::{Actor, Order, OrderStatusType, OrderUpdate},
    events::{EventProducers, OrderAnnulledEvent},
    traits::{ListingManagement, OrderManagement},
};

pub fn require_buyer(order: &Order, buyer_id: &str) -> Result<(), CheckoutError> {
    if order.buyer_id == buyer_id {
        Ok(())
    } else {
        Err(CheckoutError::Authorization(format!("Only the buyer can perform this action on order {}", order.id)))
    }
}

pub fn require_seller(order_seller: &str, actor: &Actor, resource: &str) -> Result<(), CheckoutError> {
    if order_seller == actor.id {
        Ok(())
    } else {
        Err(CheckoutError::Authorization(format!("Only the seller can perform this action on {resource}")))
    }
}

pub fn require_party_or_admin(order: &Order, actor: &Actor) -> Result<(), CheckoutError> {
    if actor.is_admin() || order.is_party(&actor.id) {
        Ok(())
    } else {
        Err(CheckoutError::Authorization(format!("{} is not a party to order {}", actor.id, order.id)))
    }
}

/// Lazy reservation expiry.
///
/// Reservations are not swept in the background. Instead, every buyer-facing operation calls this guard first. A
/// `reserved` order whose horizon has passed is moved to `expired`, its hold on the listing is released, and the
/// operation fails with a validation error. Any other order is returned untouched.
pub async fn ensure_reservation_live<B>(
    db: &B,
    producers: &EventProducers,
    order: Order,
    now: DateTime<Utc>,
) -> Result<Order, CheckoutError>
where
    B: OrderManagement + ListingManagement,
{
    if !order.reservation_lapsed(now) {
        return Ok(order);
    }
    let update = OrderUpdate::transition(OrderStatusType::Reserved, OrderStatusType::Expired)
        .with_metadata(json!({ "expired_at": now }));
    match db.update_order(&order.id, update).await? {
        Some(expired) => {
            info!("🛒️ Reservation for order {} lapsed at {}. Order expired.", order.id, order.reservation_expires_at);
            if !db.release_reservation(&order.listing_id, order.id.as_str()).await? {
                debug!("🛒️ Listing {} was no longer held by order {}", order.listing_id, order.id);
            }
            producers.publish_order_annulled(OrderAnnulledEvent::new(expired)).await;
        },
        None => {
            let current = db.fetch_order(&order.id).await?.ok_or_else(|| CheckoutError::not_found("Order", &order.id.0))?;
            if current.status != OrderStatusType::Expired {
                debug!("🛒️ Order {} changed to {} while expiring it", current.id, current.status);
                return Ok(current);
            }
        },
    }
    Err(CheckoutError::Validation(format!(
        "The reservation for order {} expired at {}. Please reserve the listing again.",
        order.id, order.reservation_expires_at
    )))
}
