use actix_web::{http::StatusCode, test::TestRequest};
use checkout_engine::{db_types::Actor, test_utils::CheckoutSystem};
use serde_json::{json, Value};

use super::helpers::{call_api, json};

async fn open_refund(sys: &CheckoutSystem, listing_id: &str) -> (Value, Value) {
    sys.listing(listing_id, "seller-1", 320_000).await;
    let order = sys.paid_order(listing_id, "buyer-1").await;
    let req = TestRequest::post()
        .uri(&format!("/api/orders/{}/refunds", order.id))
        .set_json(json!({ "reason": "The bezel is scratched" }));
    let (status, body) = call_api(sys, req, &Actor::buyer("buyer-1")).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (json!(order.id.as_str()), json(&body))
}

#[actix_web::test]
async fn full_refund_workflow() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    let (order_id, refund) = open_refund(&sys, "L-200").await;
    assert_eq!(refund["status"], "pending");
    assert_eq!(refund["requested_amount"], 320_000);
    let refund_id = refund["id"].as_str().unwrap().to_string();
    let buyer = Actor::buyer("buyer-1");
    let seller = Actor::seller("seller-1");

    let req = TestRequest::post()
        .uri(&format!("/api/refunds/{refund_id}/return"))
        .set_json(json!({ "tracking_number": "RET-1" }));
    let (status, body) = call_api(&sys, req, &buyer).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "return_requested");

    let req = TestRequest::post().uri(&format!("/api/refunds/{refund_id}/approve"));
    let (status, _) = call_api(&sys, req, &seller).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "Cannot approve before the return has been received");

    let req = TestRequest::post().uri(&format!("/api/refunds/{refund_id}/confirm_return"));
    let (status, body) = call_api(&sys, req, &seller).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "return_received");

    let req = TestRequest::post()
        .uri(&format!("/api/refunds/{refund_id}/approve"))
        .set_json(json!({ "reason": "Sorry about that" }));
    let (status, first) = call_api(&sys, req, &seller).await;
    assert_eq!(status, StatusCode::OK);
    let first = json(&first);
    assert_eq!(first["status"], "executed");
    assert_eq!(first["seller_response_reason"], "Sorry about that");

    // A retried approval gets the stored result and no second reversal
    let req = TestRequest::post().uri(&format!("/api/refunds/{refund_id}/approve"));
    let (status, second) = call_api(&sys, req, &seller).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&second)["finix_reversal_id"], first["finix_reversal_id"]);
    assert_eq!(sys.gateway.reversals_created(), 1);

    let req = TestRequest::get().uri(&format!("/api/orders/{}", order_id.as_str().unwrap()));
    let (_, body) = call_api(&sys, req, &buyer).await;
    assert_eq!(json(&body)["status"], "refunded");
    sys.tear_down().await;
}

#[actix_web::test]
async fn denial_needs_a_reason() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    let (_, refund) = open_refund(&sys, "L-201").await;
    let refund_id = refund["id"].as_str().unwrap();
    let seller = Actor::seller("seller-1");

    let req = TestRequest::post().uri(&format!("/api/refunds/{refund_id}/deny")).set_json(json!({}));
    let (status, _) = call_api(&sys, req, &seller).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = TestRequest::post()
        .uri(&format!("/api/refunds/{refund_id}/deny"))
        .set_json(json!({ "reason": "Item shows wear from use" }));
    let (status, body) = call_api(&sys, req, &seller).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "denied");
    assert_eq!(sys.gateway.reversals_created(), 0);
    sys.tear_down().await;
}

#[actix_web::test]
async fn refunds_are_private_to_the_parties() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    let (order_id, refund) = open_refund(&sys, "L-202").await;
    let order_id = order_id.as_str().unwrap();
    let refund_id = refund["id"].as_str().unwrap();
    let stranger = Actor::buyer("buyer-9");

    let req = TestRequest::get().uri(&format!("/api/orders/{order_id}/refunds"));
    let (status, _) = call_api(&sys, req, &stranger).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = TestRequest::get().uri(&format!("/api/refunds/{refund_id}"));
    let (status, _) = call_api(&sys, req, &stranger).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = TestRequest::get().uri(&format!("/api/orders/{order_id}/refunds"));
    let (status, body) = call_api(&sys, req, &Actor::seller("seller-1")).await;
    assert_eq!(status, StatusCode::OK);
    let refunds = json(&body);
    assert_eq!(refunds.as_array().map(|r| r.len()), Some(1));
    assert_eq!(refunds[0]["id"], refund_id);
    sys.tear_down().await;
}

#[actix_web::test]
async fn buyer_can_withdraw_a_refund_request() {
    let _ = env_logger::try_init().ok();
    let sys = CheckoutSystem::new().await;
    let (order_id, refund) = open_refund(&sys, "L-203").await;
    let refund_id = refund["id"].as_str().unwrap();

    let req = TestRequest::delete().uri(&format!("/api/refunds/{refund_id}"));
    let (status, _) = call_api(&sys, req, &Actor::seller("seller-1")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = TestRequest::delete().uri(&format!("/api/refunds/{refund_id}"));
    let (status, _) = call_api(&sys, req, &Actor::buyer("buyer-1")).await;
    assert_eq!(status, StatusCode::OK);

    let req = TestRequest::get().uri(&format!("/api/refunds/{refund_id}"));
    let (status, _) = call_api(&sys, req, &Actor::buyer("buyer-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = TestRequest::get().uri(&format!("/api/orders/{}/refunds", order_id.as_str().unwrap()));
    let (_, body) = call_api(&sys, req, &Actor::buyer("buyer-1")).await;
    assert_eq!(json(&body), json!([]));
    sys.tear_down().await;
}
