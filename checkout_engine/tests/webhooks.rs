use std::time::Duration;

use checkout_engine::{
    db_types::{ListingStatus, OrderStatusType, WebhookEventStatus, ONBOARDING_PROVISIONING},
    events::EventProducers,
    test_utils::{transfer_event, CheckoutSystem},
    traits::{gateway_objects::GatewayState, AuditLog, ListingManagement, MerchantManagement, OrderManagement, WebhookEventManagement},
    CheckoutError,
    SqliteDatabase,
    WebhookApi,
};
use chrono::Utc;
use serde_json::{json, Value};

fn failed_transfer(event_id: &str, transfer_id: &str, code: &str, message: &str) -> Value {
    json!({
        "id": event_id,
        "type": "updated",
        "entity": "transfer",
        "_embedded": { "transfers": [ {
            "id": transfer_id,
            "state": "FAILED",
            "amount": 12_500,
            "currency": "USD",
            "failure_code": code,
            "failure_message": message,
        } ] }
    })
}

fn merchant_event(event_id: &str, merchant_id: &str, identity: &str) -> Value {
    json!({
        "id": event_id,
        "type": "created",
        "entity": "merchant",
        "_embedded": { "merchants": [ {
            "id": merchant_id,
            "identity": identity,
            "verification": "VImerchant",
            "onboarding_state": "APPROVED",
        } ] }
    })
}

#[tokio::test]
async fn replayed_events_are_applied_once() {
    let system = CheckoutSystem::new().await;
    system.listing("L", "seller", 12_500).await;
    let order = system.paid_order("L", "buyer").await;
    assert_eq!(order.status, OrderStatusType::Paid);
    let paid_at = order.paid_at;
    let transfer_id = order.finix_transfer_id.clone().unwrap();

    let replay = transfer_event(&format!("EV-{transfer_id}-settled"), "updated", &transfer_id, "SUCCEEDED", 12_500);
    let receipt = system.webhooks.receive(replay).await.unwrap();
    assert!(!receipt.is_new);
    assert!(!receipt.needs_processing());
    assert_eq!(receipt.event.status, WebhookEventStatus::Processed);
    assert!(system.webhooks.process_event(&receipt.event.event_id).await.unwrap().is_none());

    // A different event id carrying the same state is a no-op for the order
    let repeat = transfer_event("EV-repeat", "updated", &transfer_id, "SUCCEEDED", 12_500);
    let event = system.deliver(repeat).await.unwrap();
    assert_eq!(event.outcome.as_deref(), Some("no_change: order already paid"));
    assert_eq!(system.order(&order.id).await.paid_at, paid_at);
    system.tear_down().await;
}

#[tokio::test]
async fn failed_transfers_cancel_the_order_and_free_the_listing() {
    let system = CheckoutSystem::new().await;
    system.listing("L", "seller", 12_500).await;
    let order = system.submitted_order("L", "buyer").await;
    let transfer_id = order.finix_transfer_id.clone().unwrap();

    let payload = failed_transfer("EV-fail", &transfer_id, "INSUFFICIENT_FUNDS", "Insufficient funds");
    let event = system.deliver(payload).await.unwrap();
    assert_eq!(event.status, WebhookEventStatus::Processed);
    assert_eq!(event.outcome.as_deref(), Some("applied: order cancelled"));

    let order = system.order(&order.id).await;
    assert_eq!(order.status, OrderStatusType::Cancelled);
    assert!(order.cancelled_at.is_some());
    let failure = order.metadata_value("payment_failure").expect("payment failure recorded");
    assert_eq!(failure["failure_code"], "INSUFFICIENT_FUNDS");
    assert_eq!(failure["transfer_id"], transfer_id.as_str());

    let listing = system.db.fetch_listing("L").await.unwrap().unwrap();
    assert_eq!(listing.status, ListingStatus::Active);
    assert!(listing.reserved_by_order_id.is_none());
    system.tear_down().await;
}

#[tokio::test]
async fn settlement_on_a_closed_order_is_flagged_for_review() {
    let system = CheckoutSystem::new().await;
    system.listing("L", "seller", 12_500).await;
    let order = system.submitted_order("L", "buyer").await;
    let transfer_id = order.finix_transfer_id.clone().unwrap();
    system.deliver(failed_transfer("EV-fail", &transfer_id, "CARD_DECLINED", "Declined")).await.unwrap();

    let late = transfer_event("EV-late", "updated", &transfer_id, "SUCCEEDED", 12_500);
    let event = system.deliver(late).await.unwrap();
    assert_eq!(event.outcome.as_deref(), Some("no_change: order is cancelled"));
    assert_eq!(system.order(&order.id).await.status, OrderStatusType::Cancelled);
    let entries = system.db.fetch_audit_entries("order", order.id.as_str()).await.unwrap();
    assert!(entries.iter().any(|e| e.action == "payment.settled_on_closed_order"));
    system.tear_down().await;
}

#[tokio::test]
async fn pending_transfers_change_nothing() {
    let system = CheckoutSystem::new().await;
    system.listing("L", "seller", 12_500).await;
    let order = system.submitted_order("L", "buyer").await;
    let transfer_id = order.finix_transfer_id.clone().unwrap();
    let event = system.deliver(transfer_event("EV-p", "updated", &transfer_id, "PENDING", 12_500)).await.unwrap();
    assert_eq!(event.outcome.as_deref(), Some("no_change: transfer PENDING"));
    assert_eq!(system.order(&order.id).await.status, OrderStatusType::Processing);
    system.tear_down().await;
}

#[tokio::test]
async fn uncorrelated_transfers() {
    let system = CheckoutSystem::new().await;
    let created = system.deliver(transfer_event("EV-c", "created", "TRnobody", "PENDING", 100)).await.unwrap();
    assert_eq!(created.status, WebhookEventStatus::Processed);
    assert_eq!(created.outcome.as_deref(), Some("order_not_found"));

    // An update for a transfer nobody references may simply have overtaken the payment pipeline
    let updated = system.deliver(transfer_event("EV-u", "updated", "TRnobody", "SUCCEEDED", 100)).await.unwrap();
    assert_eq!(updated.status, WebhookEventStatus::Failed);
    assert!(updated.retryable);
    assert_eq!(updated.attempts, 1);
    assert!(updated.last_error.unwrap().contains("TRnobody"));
    system.tear_down().await;
}

#[tokio::test]
async fn unknown_and_malformed_events() {
    let system = CheckoutSystem::new().await;
    let event = system
        .deliver(json!({"id": "EV-d", "type": "created", "entity": "dispute", "_embedded": {"disputes": []}}))
        .await
        .unwrap();
    assert_eq!(event.outcome.as_deref(), Some("ignored"));

    let err = system.webhooks.receive(json!({"type": "updated", "entity": "transfer"})).await;
    assert!(matches!(err, Err(CheckoutError::Validation(_))));

    // A well-formed envelope with a broken body is recorded but fails permanently
    let broken = json!({"id": "EV-b", "type": "updated", "entity": "transfer", "_embedded": {"transfers": [{}]}});
    let event = system.deliver(broken).await.unwrap();
    assert_eq!(event.status, WebhookEventStatus::Failed);
    assert!(!event.retryable);
    assert_eq!(system.webhooks.retry_failed(10).await.unwrap(), 0);
    system.tear_down().await;
}

#[tokio::test]
async fn merchant_events_that_arrive_early_are_retried() {
    let system = CheckoutSystem::new().await;
    let event = system.deliver(merchant_event("EV-m", "MUnew", "IDnew")).await.unwrap();
    assert_eq!(event.status, WebhookEventStatus::Failed);
    assert!(event.retryable);
    assert_eq!(system.webhooks.retry_failed(10).await.unwrap(), 0);

    system.db.upsert_onboarding_form("seller-2", "obf-2", "IDnew").await.unwrap();
    assert_eq!(system.webhooks.retry_failed(10).await.unwrap(), 1);
    let event = system.db.fetch_webhook_event("EV-m").await.unwrap().unwrap();
    assert_eq!(event.status, WebhookEventStatus::Processed);
    assert_eq!(event.attempts, 3);

    let onboarding = system.db.fetch_onboarding_for_user("seller-2").await.unwrap().unwrap();
    assert_eq!(onboarding.merchant_id.as_deref(), Some("MUnew"));
    assert_eq!(onboarding.verification_id.as_deref(), Some("VImerchant"));
    assert!(onboarding.is_approved());
    system.tear_down().await;
}

#[tokio::test]
async fn retries_stop_after_the_attempt_limit() {
    let system = CheckoutSystem::new().await;
    let webhooks = WebhookApi::new(system.db.clone(), EventProducers::default()).with_max_attempts(2);
    let receipt = webhooks.receive(merchant_event("EV-m", "MUx", "IDx")).await.unwrap();
    let first = webhooks.process_event(&receipt.event.event_id).await.unwrap().unwrap();
    assert_eq!(first.attempts, 1);
    assert_eq!(webhooks.retry_failed(10).await.unwrap(), 0);
    let exhausted = system.db.fetch_webhook_event("EV-m").await.unwrap().unwrap();
    assert_eq!(exhausted.attempts, 2);
    assert_eq!(exhausted.status, WebhookEventStatus::Failed);

    system.db.upsert_onboarding_form("seller-x", "obf-x", "IDx").await.unwrap();
    assert_eq!(webhooks.retry_failed(10).await.unwrap(), 0);
    assert!(webhooks.process_event("EV-m").await.unwrap().is_none());
    system.tear_down().await;
}

#[tokio::test]
async fn onboarding_forms_and_verifications_update_the_seller() {
    let system = CheckoutSystem::new().await;
    let form = json!({
        "id": "EV-f",
        "type": "updated",
        "entity": "onboarding_form",
        "_embedded": { "onboarding_forms": [ {
            "id": "obf-9",
            "status": "COMPLETED",
            "identity_id": "IDseller9",
            "tags": { "user_id": "seller-9" },
        } ] }
    });
    let event = system.deliver(form).await.unwrap();
    assert_eq!(event.outcome.as_deref(), Some("applied: onboarding provisioning"));
    let onboarding = system.db.fetch_onboarding_for_user("seller-9").await.unwrap().unwrap();
    assert_eq!(onboarding.onboarding_state, ONBOARDING_PROVISIONING);
    assert_eq!(onboarding.identity_id.as_deref(), Some("IDseller9"));
    assert!(!onboarding.is_approved());

    let verification = |event_id: &str, state: &str| {
        json!({
            "id": event_id,
            "type": "updated",
            "entity": "verification",
            "_embedded": { "verifications": [ { "id": "VI9", "state": state, "identity": "IDseller9" } ] }
        })
    };
    let event = system.deliver(verification("EV-v1", "SUCCEEDED")).await.unwrap();
    assert_eq!(event.outcome.as_deref(), Some("applied: verification SUCCEEDED"));
    let onboarding = system.db.fetch_onboarding_for_user("seller-9").await.unwrap().unwrap();
    assert_eq!(onboarding.verification_state.as_deref(), Some("SUCCEEDED"));
    assert!(onboarding.verified_at.is_some());

    system.deliver(verification("EV-v2", "FAILED")).await.unwrap();
    let onboarding = system.db.fetch_onboarding_for_user("seller-9").await.unwrap().unwrap();
    assert_eq!(onboarding.verification_state.as_deref(), Some("FAILED"));
    assert!(onboarding.verified_at.is_none());

    let incomplete = json!({
        "id": "EV-f2",
        "type": "updated",
        "entity": "onboarding_form",
        "_embedded": { "onboarding_forms": [ { "id": "obf-10", "status": "IN_PROGRESS" } ] }
    });
    let event = system.deliver(incomplete).await.unwrap();
    assert_eq!(event.outcome.as_deref(), Some("no_change: onboarding form is IN_PROGRESS"));
    system.tear_down().await;
}

#[tokio::test]
async fn recorded_events_that_were_never_processed_are_swept() {
    let system = CheckoutSystem::new().await;
    system.listing("L", "seller", 12_500).await;
    let order = system.submitted_order("L", "buyer").await;
    let transfer_id = order.finix_transfer_id.clone().unwrap();
    system.gateway.settle_transfer(&transfer_id, GatewayState::Succeeded);

    // Recorded, but the process went away before handling it.
    let receipt = system.webhooks.receive(transfer_event("EV-lost", "updated", &transfer_id, "SUCCEEDED", 12_500)).await;
    assert_eq!(receipt.unwrap().event.status, WebhookEventStatus::Pending);
    assert_eq!(system.webhooks.retry_failed(10).await.unwrap(), 0, "still inside the lease");

    tokio::time::sleep(Duration::from_millis(20)).await;
    let sweeper = WebhookApi::new(system.db.clone(), EventProducers::default())
        .with_processing_lease(chrono::Duration::zero());
    assert_eq!(sweeper.retry_failed(10).await.unwrap(), 1);
    assert_eq!(system.order(&order.id).await.status, OrderStatusType::Paid);

    let mut observer = SqliteDatabase::new_with_url(&system.db_path, 1).await.unwrap();
    let event = observer.fetch_webhook_event("EV-lost").await.unwrap().unwrap();
    assert_eq!(event.status, WebhookEventStatus::Processed);
    assert_eq!(event.attempts, 1);
    observer.close().await.unwrap();
    system.tear_down().await;
}

#[tokio::test]
async fn events_abandoned_mid_processing_are_taken_over_after_the_lease() {
    let system = CheckoutSystem::new().await;
    system.listing("L", "seller", 12_500).await;
    let order = system.submitted_order("L", "buyer").await;
    let transfer_id = order.finix_transfer_id.clone().unwrap();
    system.gateway.settle_transfer(&transfer_id, GatewayState::Succeeded);
    let payload = transfer_event("EV-held", "updated", &transfer_id, "SUCCEEDED", 12_500);
    system.webhooks.receive(payload).await.unwrap();

    // A worker claims the event and never reports back.
    let held = system.db.claim_webhook_event("EV-held", 5, Utc::now()).await.unwrap().unwrap();
    assert_eq!(held.status, WebhookEventStatus::Processing);
    assert_eq!(held.attempts, 1);
    assert!(system.webhooks.process_event("EV-held").await.unwrap().is_none(), "the holder's lease is live");
    assert_eq!(system.webhooks.retry_failed(10).await.unwrap(), 0);
    assert_eq!(system.order(&order.id).await.status, OrderStatusType::Processing);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let sweeper = WebhookApi::new(system.db.clone(), EventProducers::default())
        .with_processing_lease(chrono::Duration::zero());
    assert_eq!(sweeper.retry_failed(10).await.unwrap(), 1);
    let event = system.db.fetch_webhook_event("EV-held").await.unwrap().unwrap();
    assert_eq!(event.status, WebhookEventStatus::Processed);
    assert_eq!(event.attempts, 2);
    assert_eq!(system.order(&order.id).await.status, OrderStatusType::Paid);
    system.tear_down().await;
}
