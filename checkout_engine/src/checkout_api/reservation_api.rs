use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;

use crate::{
    checkout_api::errors::CheckoutError,
    db_types::{ListingStatus, NewOrder, Order, OrderId, ReservationClaim},
    events::{EventProducers, OrderReservedEvent},
    helpers::new_fraud_session_id,
    traits::{ListingManagement, OrderManagement},
};

pub const DEFAULT_RESERVATION_MINUTES: i64 = 120;

/// `ReservationApi` hands out time-boxed, exclusive claims on listings.
///
/// The claim is a single conditional write on the listing's reservation marker. Buyers racing for the same listing
/// each create an order first; the losers delete theirs again, so a lost race never leaves an orphan order behind.
pub struct ReservationApi<B> {
    db: B,
    producers: EventProducers,
    horizon: Duration,
}

impl<B> Debug for ReservationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReservationApi (horizon: {} min)", self.horizon.num_minutes())
    }
}

impl<B> ReservationApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, horizon: Duration::minutes(DEFAULT_RESERVATION_MINUTES) }
    }

    pub fn with_horizon(mut self, horizon: Duration) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

/// Whole minutes left on a reservation, rounded up, and never less than one.
fn minutes_remaining(remaining: Duration) -> i64 {
    let secs = remaining.num_seconds().max(0);
    ((secs + 59) / 60).max(1)
}

impl<B> ReservationApi<B>
where B: OrderManagement + ListingManagement
{
    pub async fn reserve(&self, listing_id: &str, buyer_id: &str) -> Result<Order, CheckoutError> {
        let listing =
            self.db.fetch_listing(listing_id).await?.ok_or_else(|| CheckoutError::not_found("Listing", listing_id))?;
        if listing.seller_id == buyer_id {
            return Err(CheckoutError::Authorization("You cannot reserve your own listing".into()));
        }
        if listing.status != ListingStatus::Active {
            return Err(CheckoutError::Validation(format!("Listing {listing_id} is not available for purchase")));
        }
        let now = Utc::now();
        if let Some(until) = listing.live_reservation(now) {
            let minutes = minutes_remaining(until - now);
            debug!("🛒️ Listing {listing_id} is already reserved for another {minutes} minutes");
            return Err(already_reserved(listing_id, minutes));
        }
        let new_order = NewOrder {
            id: OrderId::random(),
            listing_id: listing.id.clone(),
            buyer_id: buyer_id.to_string(),
            seller_id: listing.seller_id.clone(),
            listing_snapshot: listing.snapshot(),
            amount: listing.price,
            currency: listing.currency.clone(),
            reserved_at: now,
            reservation_expires_at: now + self.horizon,
            fraud_session_id: new_fraud_session_id(),
        };
        let order = self.db.insert_order(new_order).await?;
        let claim = ReservationClaim {
            listing_id: listing.id.clone(),
            buyer_id: buyer_id.to_string(),
            order_id: order.id.clone(),
            reserved_until: order.reservation_expires_at,
            now,
        };
        if !self.db.conditional_reserve(&claim).await? {
            info!("🛒️ Buyer {buyer_id} lost the race for listing {listing_id}. Removing order {}", order.id);
            if !self.db.delete_order(&order.id).await? {
                warn!("🛒️ Order {} was already gone when cleaning up a lost reservation race", order.id);
            }
            let winner = self.db.fetch_listing(listing_id).await?;
            let err = match winner.as_ref().and_then(|l| l.live_reservation(now)) {
                Some(until) => already_reserved(listing_id, minutes_remaining(until - now)),
                None => CheckoutError::Validation(format!("Listing {listing_id} is no longer available")),
            };
            return Err(err);
        }
        info!(
            "🛒️ Listing {listing_id} reserved by {buyer_id} until {}. Order {} created.",
            order.reservation_expires_at, order.id
        );
        self.producers.publish_order_reserved(OrderReservedEvent::new(order.clone())).await;
        Ok(order)
    }
}

fn already_reserved(listing_id: &str, minutes: i64) -> CheckoutError {
    CheckoutError::Validation(format!(
        "Listing {listing_id} is currently reserved by another buyer. It may become available in {minutes} minutes."
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn minutes_round_up() {
        assert_eq!(minutes_remaining(Duration::seconds(61)), 2);
        assert_eq!(minutes_remaining(Duration::seconds(60)), 1);
        assert_eq!(minutes_remaining(Duration::seconds(1)), 1);
        assert_eq!(minutes_remaining(Duration::minutes(119) + Duration::seconds(30)), 120);
        assert_eq!(minutes_remaining(Duration::seconds(-5)), 1);
    }
}
