use actix_web::{http::StatusCode, test::TestRequest};
use checkout_engine::{
    db_types::{Actor, Role},
    test_utils::CheckoutSystem,
    traits::gateway_objects::GatewayError,
};
use serde_json::json;

use super::{
    helpers::{as_actor, call_api, configure_api, json, send},
    mocks::MockGateway,
};

#[actix_web::test]
async fn health_check() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    let db = sys.db.clone();
    let gateway = sys.gateway.clone();
    let (status, body) = send(TestRequest::get().uri("/health"), move |cfg| configure_api(cfg, db, gateway)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
    sys.tear_down().await;
}

#[actix_web::test]
async fn requests_without_an_actor_are_rejected() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    sys.listing("L-100", "seller-1", 250_000).await;
    let db = sys.db.clone();
    let gateway = sys.gateway.clone();
    let req = TestRequest::post().uri("/api/listings/L-100/reserve");
    let (status, body) = send(req, move |cfg| configure_api(cfg, db, gateway)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json(&body)["error"]["code"], "AUTHENTICATION_ERROR");
    sys.tear_down().await;
}

#[actix_web::test]
async fn reserve_listing() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    sys.listing("L-101", "seller-1", 250_000).await;
    let req = TestRequest::post().uri("/api/listings/L-101/reserve");
    let (status, body) = call_api(&sys, req, &Actor::buyer("buyer-1")).await;
    assert_eq!(status, StatusCode::CREATED);
    let order = json(&body);
    assert_eq!(order["status"], "reserved");
    assert_eq!(order["buyer_id"], "buyer-1");
    assert_eq!(order["seller_id"], "seller-1");
    assert_eq!(order["amount"], 250_000);

    let req = TestRequest::post().uri("/api/listings/L-101/reserve");
    let (status, body) = call_api(&sys, req, &Actor::buyer("buyer-2")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let err = json(&body);
    assert_eq!(err["error"]["code"], "VALIDATION_ERROR");
    assert!(err["error"]["message"].as_str().unwrap().contains("currently reserved by another buyer"));
    sys.tear_down().await;
}

#[actix_web::test]
async fn reserve_unknown_listing() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    let req = TestRequest::post().uri("/api/listings/nope/reserve");
    let (status, body) = call_api(&sys, req, &Actor::buyer("buyer-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"]["code"], "NOT_FOUND");
    sys.tear_down().await;
}

#[actix_web::test]
async fn only_parties_can_see_an_order() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    sys.listing("L-102", "seller-1", 100_000).await;
    let order = sys.reservations.reserve("L-102", "buyer-1").await.unwrap();
    let uri = format!("/api/orders/{}", order.id);

    let (status, body) = call_api(&sys, TestRequest::get().uri(&uri), &Actor::seller("seller-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["id"], order.id.as_str());

    let (status, body) = call_api(&sys, TestRequest::get().uri(&uri), &Actor::buyer("buyer-9")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json(&body)["error"]["code"], "AUTHORIZATION_ERROR");

    let (status, _) = call_api(&sys, TestRequest::get().uri(&uri), &Actor::new("ops-1", Role::Admin)).await;
    assert_eq!(status, StatusCode::OK);
    sys.tear_down().await;
}

#[actix_web::test]
async fn fetch_tokenization_config() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    sys.listing("L-103", "seller-1", 99_900).await;
    let order = sys.reservations.reserve("L-103", "buyer-1").await.unwrap();
    let req = TestRequest::post()
        .uri(&format!("/api/orders/{}/tokenization", order.id))
        .set_json(json!({ "idempotency_id": "checkout-103", "first_name": "Ada" }));
    let (status, body) = call_api(&sys, req, &Actor::buyer("buyer-1")).await;
    assert_eq!(status, StatusCode::OK);
    let config = json(&body);
    assert_eq!(config["application_id"], "APfake");
    assert_eq!(config["amount"], 99_900);
    assert_eq!(config["currency"], "USD");
    assert!(!config["buyer_identity_id"].as_str().unwrap().is_empty());
    assert_eq!(config["fraud_session_id"], order.fraud_session_id.as_str());
    sys.tear_down().await;
}

#[actix_web::test]
async fn processor_rejection_is_reported_as_payment_error() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    sys.listing("L-104", "seller-1", 99_900).await;
    let order = sys.reservations.reserve("L-104", "buyer-1").await.unwrap();
    let mut gateway = MockGateway::new();
    gateway
        .expect_create_buyer_identity()
        .times(1)
        .returning(|_, _| Err(GatewayError::rejected(422, Some("INVALID_ADDRESS".into()), "Address is invalid")));
    let db = sys.db.clone();
    let req = TestRequest::post()
        .uri(&format!("/api/orders/{}/tokenization", order.id))
        .set_json(json!({ "idempotency_id": "checkout-104" }));
    let (status, body) =
        send(as_actor(req, &Actor::buyer("buyer-1")), move |cfg| configure_api(cfg, db, gateway)).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    let err = json(&body);
    assert_eq!(err["error"]["code"], "PAYMENT_ERROR");
    assert!(err["error"]["failure_code"].is_string());
    assert_eq!(err["error"]["message"], "Address is invalid");
    sys.tear_down().await;
}

#[actix_web::test]
async fn pay_requires_exactly_one_payment_source() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    sys.listing("L-105", "seller-1", 99_900).await;
    let order = sys.reservations.reserve("L-105", "buyer-1").await.unwrap();
    let req = TestRequest::post()
        .uri(&format!("/api/orders/{}/pay", order.id))
        .set_json(json!({ "idempotency_id": "checkout-105", "token": "TKabc", "instrument_id": "PIabc" }));
    let (status, body) = call_api(&sys, req, &Actor::buyer("buyer-1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"]["code"], "VALIDATION_ERROR");
    assert!(sys.gateway.calls().is_empty());
    sys.tear_down().await;
}

#[actix_web::test]
async fn cancelled_reservation_frees_the_listing() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    sys.listing("L-106", "seller-1", 50_000).await;
    let order = sys.reservations.reserve("L-106", "buyer-1").await.unwrap();
    let req = TestRequest::post().uri(&format!("/api/orders/{}/cancel", order.id));
    let (status, body) = call_api(&sys, req, &Actor::buyer("buyer-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "cancelled");

    let req = TestRequest::post().uri("/api/listings/L-106/reserve");
    let (status, _) = call_api(&sys, req, &Actor::buyer("buyer-2")).await;
    assert_eq!(status, StatusCode::CREATED);
    sys.tear_down().await;
}

#[actix_web::test]
async fn void_is_reserved_for_admins() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    sys.listing("L-107", "seller-1", 50_000).await;
    let order = sys.submitted_order("L-107", "buyer-1").await;
    let req = TestRequest::post().uri(&format!("/api/orders/{}/void", order.id));
    let (status, body) = call_api(&sys, req, &Actor::buyer("buyer-1")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json(&body)["error"]["code"], "AUTHORIZATION_ERROR");
    sys.tear_down().await;
}

#[actix_web::test]
async fn ship_and_confirm_delivery() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    sys.listing("L-108", "seller-1", 180_000).await;
    let order = sys.paid_order("L-108", "buyer-1").await;
    let ship = json!({ "tracking_number": "1Z999AA10123456784", "carrier": "UPS" });

    let req = TestRequest::post().uri(&format!("/api/orders/{}/ship", order.id)).set_json(ship.clone());
    let (status, _) = call_api(&sys, req, &Actor::buyer("buyer-1")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = TestRequest::post().uri(&format!("/api/orders/{}/ship", order.id)).set_json(ship);
    let (status, body) = call_api(&sys, req, &Actor::seller("seller-1")).await;
    assert_eq!(status, StatusCode::OK);
    let shipped = json(&body);
    assert_eq!(shipped["status"], "shipped");
    assert_eq!(shipped["tracking_number"], "1Z999AA10123456784");

    let req = TestRequest::post().uri(&format!("/api/orders/{}/confirm", order.id));
    let (status, body) = call_api(&sys, req, &Actor::buyer("buyer-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "completed");
    sys.tear_down().await;
}
