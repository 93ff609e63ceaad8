use std::collections::HashMap;

use checkout_engine::{
    db_types::{Order, RefundRequest},
    test_utils::CheckoutSystem,
    CheckoutError,
};
use cucumber::World;

/// Orders and refunds are tracked by the listing they were made for, since each scenario uses one order per listing.
#[derive(Default, Debug, World)]
pub struct CheckoutWorld {
    pub system: Option<CheckoutSystem>,
    pub orders: HashMap<String, Order>,
    pub refunds: HashMap<String, RefundRequest>,
    pub reservation_results: Vec<(String, Result<Order, CheckoutError>)>,
    pub last_error: Option<CheckoutError>,
}

impl CheckoutWorld {
    pub fn system(&self) -> &CheckoutSystem {
        self.system.as_ref().expect("Checkout system not initialised")
    }

    pub fn order_for(&self, listing_id: &str) -> &Order {
        self.orders.get(listing_id).unwrap_or_else(|| panic!("No order has been placed for listing {listing_id}"))
    }

    pub fn refund_for(&self, listing_id: &str) -> &RefundRequest {
        self.refunds.get(listing_id).unwrap_or_else(|| panic!("No refund was requested for listing {listing_id}"))
    }

    /// Keeps the outcome of a step that is allowed to fail, so that a later step can make assertions about it.
    pub fn record<T>(&mut self, result: Result<T, CheckoutError>) -> Option<T> {
        match result {
            Ok(v) => {
                self.last_error = None;
                Some(v)
            },
            Err(e) => {
                self.last_error = Some(e);
                None
            },
        }
    }
}
