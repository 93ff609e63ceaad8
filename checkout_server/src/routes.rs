//! HTTP handlers for the checkout API and the processor webhook.
//!
//! Handlers stay thin. Each one extracts its inputs and calls a single engine method; anything longer belongs in the
//! engine.
//!
//! Every handler under `/api` identifies its caller through the [`Caller`] extractor. Whether the caller may act on a
//! particular order or refund is decided by the engine, which knows the parties involved. Route-level role checks
//! (the `requires` clause of [`route!`]) are only used where a role grants access regardless of party.
//!
//! Actix workers handle their requests one at a time, so nothing here may block. The only long-running work, webhook
//! processing, is spawned onto the worker's local task set.
use actix_web::{get, web, HttpResponse, Responder};
use checkout_engine::{
    db_types::{OrderId, Role},
    order_objects::ShippingDetails,
    traits::{CheckoutDatabase, PaymentGateway},
    CheckoutApi,
    OrderFlowApi,
    RefundApi,
    ReservationApi,
    WebhookApi,
};
use log::*;
use serde_json::{json, Value};

use crate::{
    auth::Caller,
    data_objects::{PaymentParams, RefundDecisionParams, RefundParams, ReturnParams, TokenizationParams},
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($roles:expr),+]) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Reservations  ----------------------------------------------------
route!(reserve => Post "/listings/{id}/reserve" impl CheckoutDatabase);
/// Route handler for the reserve endpoint
///
/// Claims the listing for the caller for the configured reservation horizon and returns the new `reserved` order.
/// If another buyer holds a live reservation, the error message says how many minutes are left on it.
pub async fn reserve<B: CheckoutDatabase>(
    path: web::Path<String>,
    caller: Caller,
    api: web::Data<ReservationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let listing_id = path.into_inner();
    debug!("💻️ POST reserve listing {listing_id} for {}", caller.id);
    let order = api.reserve(&listing_id, &caller.id).await?;
    Ok(HttpResponse::Created().json(order))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(order_by_id => Get "/orders/{id}" impl CheckoutDatabase);
pub async fn order_by_id<B: CheckoutDatabase>(
    path: web::Path<OrderId>,
    caller: Caller,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET order {order_id} for {}", caller.id);
    let order = api.order_for_actor(&order_id, &caller).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(tokenization => Post "/orders/{id}/tokenization" impl CheckoutDatabase, PaymentGateway);
/// Route handler for the tokenization endpoint
///
/// Returns what the client needs to tokenize card or bank details directly with the processor: the application id,
/// the buyer's processor identity, the fraud session id, and the amount and currency to be charged. Raw payment
/// details never pass through this server.
pub async fn tokenization<B: CheckoutDatabase, G: PaymentGateway>(
    path: web::Path<OrderId>,
    caller: Caller,
    body: web::Json<TokenizationParams>,
    api: web::Data<CheckoutApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let TokenizationParams { idempotency_id, overrides } = body.into_inner();
    debug!("💻️ POST tokenization config for order {order_id}");
    let config = api.tokenization_config(&order_id, &caller.id, &idempotency_id, overrides).await?;
    Ok(HttpResponse::Ok().json(config))
}

route!(pay => Post "/orders/{id}/pay" impl CheckoutDatabase, PaymentGateway);
/// Route handler for the payment endpoint
///
/// Runs the payment pipeline synchronously. A successful response means the processor accepted the payment and the
/// order is `processing`; it becomes `paid` when the processor's settlement webhook arrives. Declines are reported
/// with status 402 and a canonical `failure_code`.
pub async fn pay<B: CheckoutDatabase, G: PaymentGateway>(
    path: web::Path<OrderId>,
    caller: Caller,
    body: web::Json<PaymentParams>,
    api: web::Data<CheckoutApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let params = body.into_inner();
    let source = params.payment_source()?;
    debug!("💻️ POST pay for order {order_id} with a {}", source.source_type());
    let order = api.process_payment(&order_id, &caller.id, &params.idempotency_id, source).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(ship => Post "/orders/{id}/ship" impl CheckoutDatabase);
pub async fn ship<B: CheckoutDatabase>(
    path: web::Path<OrderId>,
    caller: Caller,
    body: web::Json<ShippingDetails>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ POST ship order {order_id}");
    let order = api.mark_shipped(&order_id, &caller, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(confirm_delivery => Post "/orders/{id}/confirm" impl CheckoutDatabase);
pub async fn confirm_delivery<B: CheckoutDatabase>(
    path: web::Path<OrderId>,
    caller: Caller,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ POST confirm delivery of order {order_id}");
    let order = api.confirm_delivery(&order_id, &caller).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(cancel_order => Post "/orders/{id}/cancel" impl CheckoutDatabase);
/// Buyers and sellers can cancel an order while it is still `reserved`. The listing is released immediately.
pub async fn cancel_order<B: CheckoutDatabase>(
    path: web::Path<OrderId>,
    caller: Caller,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ POST cancel order {order_id} by {}", caller.id);
    let order = api.cancel_order(&order_id, &caller).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(void_authorization => Post "/orders/{id}/void" impl CheckoutDatabase, PaymentGateway where requires [Role::Admin]);
/// Voids the order's card authorization at the processor. The order status is left alone.
pub async fn void_authorization<B: CheckoutDatabase, G: PaymentGateway>(
    path: web::Path<OrderId>,
    caller: Caller,
    api: web::Data<CheckoutApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    info!("💻️ POST void authorization of order {order_id} by admin {}", caller.id);
    let order = api.void_authorization(&order_id, &caller).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Refunds  ----------------------------------------------------
route!(request_refund => Post "/orders/{id}/refunds" impl CheckoutDatabase, PaymentGateway);
pub async fn request_refund<B: CheckoutDatabase, G: PaymentGateway>(
    path: web::Path<OrderId>,
    caller: Caller,
    body: web::Json<RefundParams>,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let RefundParams { reason, amount, idempotency_id } = body.into_inner();
    debug!("💻️ POST refund request for order {order_id}");
    let refund = api.request_refund(&order_id, &caller, &reason, amount, idempotency_id).await?;
    Ok(HttpResponse::Created().json(refund))
}

route!(order_refunds => Get "/orders/{id}/refunds" impl CheckoutDatabase, PaymentGateway);
pub async fn order_refunds<B: CheckoutDatabase, G: PaymentGateway>(
    path: web::Path<OrderId>,
    caller: Caller,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET refunds for order {order_id}");
    let refunds = api.refunds_for_order(&order_id, &caller).await?;
    Ok(HttpResponse::Ok().json(refunds))
}

route!(refund_by_id => Get "/refunds/{id}" impl CheckoutDatabase, PaymentGateway);
pub async fn refund_by_id<B: CheckoutDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    caller: Caller,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let refund_id = path.into_inner();
    let refund = api.refund_for_actor(&refund_id, &caller).await?;
    Ok(HttpResponse::Ok().json(refund))
}

route!(submit_return => Post "/refunds/{id}/return" impl CheckoutDatabase, PaymentGateway);
pub async fn submit_return<B: CheckoutDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    caller: Caller,
    body: web::Json<ReturnParams>,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let refund_id = path.into_inner();
    debug!("💻️ POST product return for refund {refund_id}");
    let refund = api.submit_product_return(&refund_id, &caller, &body.tracking_number).await?;
    Ok(HttpResponse::Ok().json(refund))
}

route!(confirm_return => Post "/refunds/{id}/confirm_return" impl CheckoutDatabase, PaymentGateway);
pub async fn confirm_return<B: CheckoutDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    caller: Caller,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let refund_id = path.into_inner();
    debug!("💻️ POST confirm product return for refund {refund_id}");
    let refund = api.confirm_product_return(&refund_id, &caller).await?;
    Ok(HttpResponse::Ok().json(refund))
}

route!(approve_refund => Post "/refunds/{id}/approve" impl CheckoutDatabase, PaymentGateway);
/// Route handler for refund approval
///
/// The seller approves a refund once the returned item has been received. Approval issues the reversal at the
/// processor. Approving an executed refund again returns the stored result without a second reversal, so clients can
/// safely retry this call.
pub async fn approve_refund<B: CheckoutDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    caller: Caller,
    body: Option<web::Json<RefundDecisionParams>>,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let refund_id = path.into_inner();
    let reason = body.and_then(|b| b.into_inner().reason);
    info!("💻️ POST approve refund {refund_id} by {}", caller.id);
    let refund = api.approve_refund_request(&refund_id, &caller, reason).await?;
    Ok(HttpResponse::Ok().json(refund))
}

route!(deny_refund => Post "/refunds/{id}/deny" impl CheckoutDatabase, PaymentGateway);
pub async fn deny_refund<B: CheckoutDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    caller: Caller,
    body: web::Json<RefundDecisionParams>,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let refund_id = path.into_inner();
    let reason = body.into_inner().reason.unwrap_or_default();
    info!("💻️ POST deny refund {refund_id} by {}", caller.id);
    let refund = api.deny_refund_request(&refund_id, &caller, &reason).await?;
    Ok(HttpResponse::Ok().json(refund))
}

route!(cancel_refund => Delete "/refunds/{id}" impl CheckoutDatabase, PaymentGateway);
pub async fn cancel_refund<B: CheckoutDatabase, G: PaymentGateway>(
    path: web::Path<String>,
    caller: Caller,
    api: web::Data<RefundApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let refund_id = path.into_inner();
    debug!("💻️ DELETE refund {refund_id} by {}", caller.id);
    let refund = api.cancel_refund_request(&refund_id, &caller).await?;
    Ok(HttpResponse::Ok().json(refund))
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
route!(finix_webhook => Post "/finix" impl CheckoutDatabase);
/// Route handler for processor webhooks
///
/// The signature has already been checked by the HMAC middleware by the time this runs. The event is recorded and
/// acknowledged straight away; processing happens on a separate task so that a slow handler never makes the processor
/// time out and re-deliver. Re-deliveries of an event we already hold are acknowledged without being processed again.
/// Events that fail with a retryable error are picked up by the webhook worker.
pub async fn finix_webhook<B: CheckoutDatabase + 'static>(
    body: web::Bytes,
    api: web::Data<WebhookApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let payload = serde_json::from_slice::<Value>(&body).map_err(|e| {
        warn!("🪝️ Webhook body is not valid JSON. {e}");
        ServerError::InvalidRequestBody(e.to_string())
    })?;
    let receipt = api.receive(payload).await?;
    let event_id = receipt.event.event_id.clone();
    if receipt.needs_processing() {
        let api = api.clone();
        let id = event_id.clone();
        actix_web::rt::spawn(async move {
            if let Err(e) = api.process_event(&id).await {
                error!("🪝️ Could not process webhook event {id}. {e}");
            }
        });
    } else {
        debug!("🪝️ Webhook event {event_id} was already received ({:?}). Acknowledging.", receipt.event.status);
    }
    Ok(HttpResponse::Ok().json(json!({
        "event_id": event_id,
        "duplicate": !receipt.is_new,
        "status": receipt.event.status,
    })))
}
