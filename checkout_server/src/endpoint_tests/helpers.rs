use actix_web::{
    body::{to_bytes, BoxBody},
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    web::ServiceConfig,
    App,
    HttpResponse,
};
use checkout_engine::{
    db_types::Actor,
    events::EventProducers,
    test_utils::{CheckoutSystem, FakeGateway},
    traits::PaymentGateway,
    CheckoutApi,
    OrderFlowApi,
    RefundApi,
    ReservationApi,
    SqliteDatabase,
    WebhookApi,
};
use log::debug;
use serde_json::Value;

use crate::{
    auth::{ACTOR_ID_HEADER, ACTOR_ROLE_HEADER},
    routes::{
        health,
        ApproveRefundRoute,
        CancelOrderRoute,
        CancelRefundRoute,
        ConfirmDeliveryRoute,
        ConfirmReturnRoute,
        DenyRefundRoute,
        OrderByIdRoute,
        OrderRefundsRoute,
        PayRoute,
        RefundByIdRoute,
        RequestRefundRoute,
        ReserveRoute,
        ShipRoute,
        SubmitReturnRoute,
        TokenizationRoute,
        VoidAuthorizationRoute,
    },
};

pub fn as_actor(req: TestRequest, actor: &Actor) -> TestRequest {
    req.insert_header((ACTOR_ID_HEADER, actor.id.as_str())).insert_header((ACTOR_ROLE_HEADER, actor.role.to_string()))
}

/// Sends the request to a fresh app built by `configure`. Errors raised by middleware are rendered the same way
/// actix renders them for a real client, so every call yields a status and a body.
pub async fn send<F>(req: TestRequest, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    let res: HttpResponse<BoxBody> = match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => res.into_parts().1.map_into_boxed_body(),
        Err(e) => e.error_response(),
    };
    let status = res.status();
    let body = to_bytes(res.into_body()).await.map(|b| String::from_utf8_lossy(&b).into_owned()).unwrap_or_default();
    (status, body)
}

pub fn json(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("Response is not JSON ({e}): {body}"))
}

/// Registers every `/api` route against `db` and `gateway`, with no event subscribers.
pub fn configure_api<G>(cfg: &mut ServiceConfig, db: SqliteDatabase, gateway: G)
where G: PaymentGateway + 'static {
    let producers = EventProducers::default();
    cfg.app_data(web::Data::new(ReservationApi::new(db.clone(), producers.clone())))
        .app_data(web::Data::new(CheckoutApi::new(db.clone(), gateway.clone(), producers.clone())))
        .app_data(web::Data::new(OrderFlowApi::new(db.clone(), producers.clone())))
        .app_data(web::Data::new(RefundApi::new(db.clone(), gateway, producers.clone())))
        .app_data(web::Data::new(WebhookApi::new(db, producers)))
        .service(health)
        .service(
            web::scope("/api")
                .service(ReserveRoute::<SqliteDatabase>::new())
                .service(OrderByIdRoute::<SqliteDatabase>::new())
                .service(TokenizationRoute::<SqliteDatabase, G>::new())
                .service(PayRoute::<SqliteDatabase, G>::new())
                .service(ShipRoute::<SqliteDatabase>::new())
                .service(ConfirmDeliveryRoute::<SqliteDatabase>::new())
                .service(CancelOrderRoute::<SqliteDatabase>::new())
                .service(VoidAuthorizationRoute::<SqliteDatabase, G>::new())
                .service(RequestRefundRoute::<SqliteDatabase, G>::new())
                .service(OrderRefundsRoute::<SqliteDatabase, G>::new())
                .service(RefundByIdRoute::<SqliteDatabase, G>::new())
                .service(SubmitReturnRoute::<SqliteDatabase, G>::new())
                .service(ConfirmReturnRoute::<SqliteDatabase, G>::new())
                .service(ApproveRefundRoute::<SqliteDatabase, G>::new())
                .service(DenyRefundRoute::<SqliteDatabase, G>::new())
                .service(CancelRefundRoute::<SqliteDatabase, G>::new()),
        );
}

/// Calls the API as `actor` against the system's database and fake processor.
pub async fn call_api(sys: &CheckoutSystem, req: TestRequest, actor: &Actor) -> (StatusCode, String) {
    let db = sys.db.clone();
    let gateway: FakeGateway = sys.gateway.clone();
    send(as_actor(req, actor), move |cfg| configure_api(cfg, db, gateway)).await
}
