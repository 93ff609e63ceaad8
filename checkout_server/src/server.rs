use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use checkout_engine::{
    events::EventProducers,
    CheckoutApi,
    OrderFlowApi,
    RefundApi,
    ReservationApi,
    SqliteDatabase,
    WebhookApi,
};
use log::*;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::{
        finix::FinixGateway,
        notifier::{create_notification_handlers, Notifier},
    },
    middleware::HmacMiddlewareFactory,
    routes::{
        health,
        ApproveRefundRoute,
        CancelOrderRoute,
        CancelRefundRoute,
        ConfirmDeliveryRoute,
        ConfirmReturnRoute,
        DenyRefundRoute,
        FinixWebhookRoute,
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
    webhook_worker::start_webhook_worker,
};

const MAX_DB_CONNECTIONS: u32 = 25;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    config.validate()?;
    let db = SqliteDatabase::new_with_url(&config.database_url, MAX_DB_CONNECTIONS)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let gateway = FinixGateway::new(config.finix.clone())
        .map_err(|e| ServerError::InitializeError(format!("Could not create the payment gateway. {e}")))?;
    info!("💳️ Payment gateway ready: {gateway:?}");
    let notifier = Notifier::new(config.notification_url.clone()).unwrap_or_else(|e| {
        warn!("📣️ Could not create the notification client. Notifications will only be logged. {e}");
        Notifier::log_only()
    });
    let handlers = create_notification_handlers(notifier);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    // Do not await the worker. It runs for the lifetime of the server.
    let _worker = start_webhook_worker(db.clone(), producers.clone(), &config);
    let srv = create_server_instance(config, db, gateway, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: FinixGateway,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        let reservation_api =
            ReservationApi::new(db.clone(), producers.clone()).with_horizon(config.reservation_horizon);
        let checkout_api = CheckoutApi::new(db.clone(), gateway.clone(), producers.clone());
        let order_flow_api = OrderFlowApi::new(db.clone(), producers.clone());
        let refund_api = RefundApi::new(db.clone(), gateway.clone(), producers.clone());
        let webhook_api = WebhookApi::new(db.clone(), producers.clone())
            .with_max_attempts(config.webhooks.max_attempts)
            .with_processing_lease(config.webhooks.processing_lease);
        let api_scope = web::scope("/api")
            .service(ReserveRoute::<SqliteDatabase>::new())
            .service(OrderByIdRoute::<SqliteDatabase>::new())
            .service(TokenizationRoute::<SqliteDatabase, FinixGateway>::new())
            .service(PayRoute::<SqliteDatabase, FinixGateway>::new())
            .service(ShipRoute::<SqliteDatabase>::new())
            .service(ConfirmDeliveryRoute::<SqliteDatabase>::new())
            .service(CancelOrderRoute::<SqliteDatabase>::new())
            .service(VoidAuthorizationRoute::<SqliteDatabase, FinixGateway>::new())
            .service(RequestRefundRoute::<SqliteDatabase, FinixGateway>::new())
            .service(OrderRefundsRoute::<SqliteDatabase, FinixGateway>::new())
            .service(RefundByIdRoute::<SqliteDatabase, FinixGateway>::new())
            .service(SubmitReturnRoute::<SqliteDatabase, FinixGateway>::new())
            .service(ConfirmReturnRoute::<SqliteDatabase, FinixGateway>::new())
            .service(ApproveRefundRoute::<SqliteDatabase, FinixGateway>::new())
            .service(DenyRefundRoute::<SqliteDatabase, FinixGateway>::new())
            .service(CancelRefundRoute::<SqliteDatabase, FinixGateway>::new());
        let webhook_scope = web::scope("/webhooks")
            .wrap(HmacMiddlewareFactory::new(
                &config.webhooks.signature_header,
                config.webhooks.secret.clone(),
                config.production,
            ))
            .service(FinixWebhookRoute::<SqliteDatabase>::new());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("checkout::access_log"))
            .app_data(web::Data::new(reservation_api))
            .app_data(web::Data::new(checkout_api))
            .app_data(web::Data::new(order_flow_api))
            .app_data(web::Data::new(refund_api))
            .app_data(web::Data::new(webhook_api))
            .service(health)
            .service(api_scope)
            .service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
