//! HMAC middleware for Actix Web.
//!
//! The processor signs every webhook with HMAC-SHA256 over the raw request body, using the shared webhook secret
//! (`CKO_WEBHOOK_SECRET`), and sends the digest in a header (`Finix-Signature` unless configured otherwise).
//!
//! Wrap the webhook routes with this middleware. It reads the body, checks the signature with
//! [`verify_signature`], and puts the body back so that the handler can read it again. Requests with a missing or
//! mismatched signature are rejected with a 401 before they reach the handler.
//!
//! When no secret is configured and the server is not in production posture, unsigned events are let through (and
//! logged). In production a missing secret rejects every event.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorBadRequest,
    web,
    Error,
};
use checkout_common::Secret;
use checkout_engine::helpers::{verify_signature, SignatureCheck};
use futures::future::LocalBoxFuture;
use log::{trace, warn};

use crate::errors::ServerError;

pub struct HmacMiddlewareFactory {
    signature_header: String,
    key: Secret<String>,
    production: bool,
}

impl HmacMiddlewareFactory {
    pub fn new(signature_header: &str, key: Secret<String>, production: bool) -> Self {
        HmacMiddlewareFactory { signature_header: signature_header.into(), key, production }
    }
}

impl<S, B> Transform<S, ServiceRequest> for HmacMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = HmacMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HmacMiddlewareService {
            signature_header: self.signature_header.clone(),
            key: self.key.clone(),
            production: self.production,
            service: Rc::new(service),
        }))
    }
}

pub struct HmacMiddlewareService<S> {
    signature_header: String,
    key: Secret<String>,
    production: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for HmacMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.key.reveal().clone();
        let signature_header = self.signature_header.clone();
        let production = self.production;
        Box::pin(async move {
            trace!("🔐️ Checking webhook signature");
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request data: {:?}", e);
                ErrorBadRequest("Failed to extract request data.")
            })?;
            let signature = req.headers().get(&signature_header).and_then(|v| v.to_str().ok()).map(String::from);
            match verify_signature(Some(secret.as_str()), data.as_ref(), signature.as_deref(), production) {
                Ok(SignatureCheck::Verified) => trace!("🔐️ Webhook signature ✅️"),
                Ok(SignatureCheck::Bypassed) => trace!("🔐️ Webhook signature not checked (development)"),
                Err(e) => {
                    warn!("🔐️ Rejecting webhook from {:?}. {e}", req.connection_info().peer_addr());
                    return Err(ServerError::InvalidSignature(e.to_string()).into());
                },
            }
            req.set_payload(bytes_to_payload(data));
            service.call(req).await
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
