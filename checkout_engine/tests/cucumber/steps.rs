use std::time::Duration;

use checkout_engine::{
    db_types::{Actor, OrderStatusType, RefundStatus, WebhookEventStatus},
    test_utils::{transfer_event, GatewayCall},
    traits::{ListingManagement, WebhookEventManagement},
    CheckoutError,
};
use cucumber::{then, when};

use crate::cucumber::CheckoutWorld;

//------------------------------------------   Reservations   ---------------------------------------------------------

#[when(expr = "buyers '{word}' and '{word}' reserve listing {word} at the same time")]
async fn race_for_listing(world: &mut CheckoutWorld, first: String, second: String, listing_id: String) {
    let reservations = &world.system().reservations;
    let (a, b) = tokio::join!(reservations.reserve(&listing_id, &first), reservations.reserve(&listing_id, &second));
    world.reservation_results = vec![(first, a), (second, b)];
}

#[then(expr = "exactly one reservation for listing {word} succeeds")]
async fn one_winner(world: &mut CheckoutWorld, listing_id: String) {
    let winners = world.reservation_results.iter().filter(|(_, r)| r.is_ok()).collect::<Vec<_>>();
    assert_eq!(winners.len(), 1, "Expected exactly one winner");
    let (buyer, order) = winners[0];
    let order = order.as_ref().expect("winner has an order");
    let listing = world.system().db.fetch_listing(&listing_id).await.unwrap().expect("listing exists");
    assert_eq!(listing.reserved_by_user_id.as_deref(), Some(buyer.as_str()));
    assert_eq!(listing.reserved_by_order_id.as_deref(), Some(order.id.as_str()));
}

#[then(expr = "the other buyer is told to wait {int} minutes")]
async fn loser_waits(world: &mut CheckoutWorld, minutes: i64) {
    let (_, err) = world.reservation_results.iter().find(|(_, r)| r.is_err()).expect("Expected a losing buyer");
    match err {
        Err(CheckoutError::Validation(msg)) => assert!(msg.contains(&format!("{minutes} minutes")), "{msg}"),
        other => panic!("Expected a validation error, got {other:?}"),
    }
}

//------------------------------------------     Payments     ---------------------------------------------------------

#[when(expr = "'{word}' pays for listing {word} by card")]
async fn pay_by_card(world: &mut CheckoutWorld, buyer_id: String, listing_id: String) {
    let order = world.system().submitted_order(&listing_id, &buyer_id).await;
    world.orders.insert(listing_id, order);
}

#[when(expr = "the processor settles the payment for listing {word}")]
async fn settle_payment(world: &mut CheckoutWorld, listing_id: String) {
    let order = world.order_for(&listing_id).clone();
    let transfer_id = order.finix_transfer_id.clone().expect("The order has no transfer");
    world.system().settle(&transfer_id, order.amount).await;
}

#[when(expr = "the processor sends event {word} with state {word} for the transfer on listing {word}")]
async fn send_transfer_event(world: &mut CheckoutWorld, event_id: String, state: String, listing_id: String) {
    let order = world.order_for(&listing_id).clone();
    let transfer_id = order.finix_transfer_id.clone().expect("The order has no transfer");
    let payload = transfer_event(&event_id, "updated", &transfer_id, &state, order.amount.value());
    world.system().deliver(payload).await;
}

#[then(expr = "the order for listing {word} is {word}")]
async fn order_status(world: &mut CheckoutWorld, listing_id: String, status: OrderStatusType) {
    let id = world.order_for(&listing_id).id.clone();
    let order = world.system().order(&id).await;
    assert_eq!(order.status, status, "Order status is incorrect");
    world.orders.insert(listing_id, order);
}

#[then(expr = "listing {word} is {word}")]
async fn listing_status(world: &mut CheckoutWorld, listing_id: String, status: String) {
    let listing = world.system().db.fetch_listing(&listing_id).await.unwrap().expect("listing exists");
    let actual = serde_json::to_value(listing.status).expect("listing status serializes");
    assert_eq!(actual.as_str(), Some(status.as_str()), "Listing status is incorrect");
}

#[then(expr = "event {word} was processed after {int} attempt(s)")]
async fn event_processed(world: &mut CheckoutWorld, event_id: String, attempts: i64) {
    let event = world.system().db.fetch_webhook_event(&event_id).await.unwrap().expect("event was recorded");
    assert_eq!(event.status, WebhookEventStatus::Processed);
    assert_eq!(event.attempts, attempts);
}

//------------------------------------------     Refunds      ---------------------------------------------------------

#[when(expr = "'{word}' requests a refund of {int} cents for listing {word} because {string}")]
async fn request_refund(world: &mut CheckoutWorld, buyer_id: String, amount: i64, listing_id: String, reason: String) {
    let order_id = world.order_for(&listing_id).id.clone();
    let result =
        world.system().refunds.request_refund(&order_id, &Actor::buyer(buyer_id), &reason, Some(amount), None).await;
    if let Some(refund) = world.record(result) {
        world.refunds.insert(listing_id, refund);
    }
}

#[when(expr = "'{word}' ships the return for listing {word} with tracking number {word}")]
async fn ship_return(world: &mut CheckoutWorld, buyer_id: String, listing_id: String, tracking: String) {
    let refund_id = world.refund_for(&listing_id).id.clone();
    let result = world.system().refunds.submit_product_return(&refund_id, &Actor::buyer(buyer_id), &tracking).await;
    if let Some(refund) = world.record(result) {
        world.refunds.insert(listing_id, refund);
    }
}

#[when(expr = "'{word}' confirms the return for listing {word}")]
async fn confirm_return(world: &mut CheckoutWorld, seller_id: String, listing_id: String) {
    let refund_id = world.refund_for(&listing_id).id.clone();
    let result = world.system().refunds.confirm_product_return(&refund_id, &Actor::seller(seller_id)).await;
    if let Some(refund) = world.record(result) {
        world.refunds.insert(listing_id, refund);
    }
}

#[when(expr = "'{word}' approves the refund for listing {word}")]
async fn approve_refund(world: &mut CheckoutWorld, seller_id: String, listing_id: String) {
    let refund_id = world.refund_for(&listing_id).id.clone();
    let result = world.system().refunds.approve_refund_request(&refund_id, &Actor::seller(seller_id), None).await;
    if let Some(refund) = world.record(result) {
        world.refunds.insert(listing_id, refund);
    }
}

#[then(expr = "the refund for listing {word} is {word}")]
async fn refund_status(world: &mut CheckoutWorld, listing_id: String, status: String) {
    let refund = world.refund_for(&listing_id);
    let expected = serde_json::from_value::<RefundStatus>(serde_json::Value::String(status)).expect("a refund status");
    assert_eq!(refund.status, expected, "Refund status is incorrect");
}

#[then(expr = "the processor reversed {int} cents")]
async fn reversed_amount(world: &mut CheckoutWorld, amount: i64) {
    let amounts = world
        .system()
        .gateway
        .reversal_calls()
        .into_iter()
        .filter_map(|c| match c {
            GatewayCall::Reversal { amount, .. } => Some(amount.value()),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(amounts, vec![amount], "Reversal amounts are incorrect");
}

#[then("no reversal was sent to the processor")]
async fn no_reversal(world: &mut CheckoutWorld) {
    assert!(world.system().gateway.reversal_calls().is_empty(), "A reversal was sent");
}

#[then(expr = "the request fails with {string}")]
async fn request_fails(world: &mut CheckoutWorld, message: String) {
    let err = world.last_error.as_ref().expect("The last request succeeded");
    assert!(err.to_string().contains(&message), "Unexpected error: {err}");
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut CheckoutWorld, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
