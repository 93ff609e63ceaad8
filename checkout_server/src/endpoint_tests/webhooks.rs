use std::time::Duration;

use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use checkout_common::Secret;
use checkout_engine::{
    db_types::{OrderStatusType, WebhookEventStatus},
    events::EventProducers,
    helpers::sign_payload,
    test_utils::{transfer_event, CheckoutSystem},
    traits::{gateway_objects::GatewayState, WebhookEventManagement},
    SqliteDatabase,
    WebhookApi,
};
use serde_json::Value;

use super::helpers::{json, send};
use crate::{middleware::HmacMiddlewareFactory, routes::FinixWebhookRoute};

const SECRET: &str = "whsec_endpoint_tests";
const SIGNATURE_HEADER: &str = "Finix-Signature";

fn configure_webhooks(cfg: &mut ServiceConfig, db: SqliteDatabase, production: bool, secret: &str) {
    cfg.app_data(web::Data::new(WebhookApi::new(db, EventProducers::default()))).service(
        web::scope("/webhooks")
            .wrap(HmacMiddlewareFactory::new(SIGNATURE_HEADER, Secret::new(secret.to_string()), production))
            .service(FinixWebhookRoute::<SqliteDatabase>::new()),
    );
}

async fn post_webhook(sys: &CheckoutSystem, payload: &[u8], signature: Option<&str>) -> (StatusCode, String) {
    let mut req = TestRequest::post().uri("/webhooks/finix").set_payload(payload.to_vec());
    if let Some(sig) = signature {
        req = req.insert_header((SIGNATURE_HEADER, sig));
    }
    let db = sys.db.clone();
    send(req, move |cfg| configure_webhooks(cfg, db, true, SECRET)).await
}

fn signed(payload: &Value) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(payload).unwrap();
    let signature = sign_payload(SECRET, &body);
    (body, signature)
}

/// Processing happens on a spawned task after the response, so poll for it.
async fn wait_for_status(sys: &CheckoutSystem, event_id: &str, status: WebhookEventStatus) {
    for _ in 0..100 {
        let event = sys.db.fetch_webhook_event(event_id).await.unwrap();
        if event.map(|e| e.status) == Some(status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Webhook event {event_id} never reached {status:?}");
}

#[actix_web::test]
async fn signed_settlement_marks_the_order_paid() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    sys.listing("L-300", "seller-1", 75_000).await;
    let order = sys.submitted_order("L-300", "buyer-1").await;
    let transfer_id = order.finix_transfer_id.clone().unwrap();
    sys.gateway.settle_transfer(&transfer_id, GatewayState::Succeeded);
    let payload = transfer_event("EV-300", "updated", &transfer_id, "SUCCEEDED", 75_000);
    let (body, signature) = signed(&payload);

    let (status, res) = post_webhook(&sys, &body, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    let res = json(&res);
    assert_eq!(res["event_id"], "EV-300");
    assert_eq!(res["duplicate"], false);
    wait_for_status(&sys, "EV-300", WebhookEventStatus::Processed).await;
    assert_eq!(sys.order(&order.id).await.status, OrderStatusType::Paid);

    // Re-delivery is acknowledged and not processed again
    let (status, res) = post_webhook(&sys, &body, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    let res = json(&res);
    assert_eq!(res["duplicate"], true);
    assert_eq!(res["status"], "processed");
    let event = sys.db.fetch_webhook_event("EV-300").await.unwrap().unwrap();
    assert_eq!(event.attempts, 1);
    sys.tear_down().await;
}

#[actix_web::test]
async fn bad_signatures_are_rejected() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    let payload = transfer_event("EV-301", "updated", "TRfake", "SUCCEEDED", 1_000);
    let (body, _) = signed(&payload);

    let (status, res) = post_webhook(&sys, &body, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json(&res)["error"]["code"], "SIGNATURE_ERROR");

    let forged = sign_payload("not-the-secret", &body);
    let (status, _) = post_webhook(&sys, &body, Some(&forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(sys.db.fetch_webhook_event("EV-301").await.unwrap().is_none());
    sys.tear_down().await;
}

#[actix_web::test]
async fn production_without_a_secret_rejects_everything() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    let payload = transfer_event("EV-302", "updated", "TRfake", "SUCCEEDED", 1_000);
    let body = serde_json::to_vec(&payload).unwrap();
    let signature = sign_payload(SECRET, &body);
    let req = TestRequest::post()
        .uri("/webhooks/finix")
        .set_payload(body)
        .insert_header((SIGNATURE_HEADER, signature.as_str()));
    let db = sys.db.clone();
    let (status, _) = send(req, move |cfg| configure_webhooks(cfg, db, true, "")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    sys.tear_down().await;
}

#[actix_web::test]
async fn development_accepts_unsigned_events_without_a_secret() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    let payload = transfer_event("EV-303", "created", "TRunknown", "PENDING", 1_000);
    let req = TestRequest::post().uri("/webhooks/finix").set_json(&payload);
    let db = sys.db.clone();
    let (status, res) = send(req, move |cfg| configure_webhooks(cfg, db, false, "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&res)["event_id"], "EV-303");
    wait_for_status(&sys, "EV-303", WebhookEventStatus::Processed).await;
    sys.tear_down().await;
}

#[actix_web::test]
async fn malformed_bodies_are_rejected() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    let body = b"{ not json".to_vec();
    let signature = sign_payload(SECRET, &body);
    let (status, res) = post_webhook(&sys, &body, Some(&signature)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&res)["error"]["code"], "VALIDATION_ERROR");
    sys.tear_down().await;
}
