//! Caller identity.
//!
//! Token parsing happens upstream. The authenticating proxy in front of this server sets two headers on every request
//! it forwards:
//! * `X-Actor-Id`: the user id of the caller,
//! * `X-Actor-Role`: one of `buyer`, `seller`, `admin` or `system`.
//!
//! [`Caller`] extracts these into an engine [`Actor`]. Role checks on individual routes are done by the
//! [`crate::middleware::AclMiddlewareFactory`].
use std::{
    future::{ready, Ready},
    ops::Deref,
};

use actix_web::{dev::Payload, http::header::HeaderMap, FromRequest, HttpRequest};
use checkout_engine::db_types::{Actor, Role};
use log::debug;

use crate::errors::ServerError;

pub const ACTOR_ID_HEADER: &str = "X-Actor-Id";
pub const ACTOR_ROLE_HEADER: &str = "X-Actor-Role";

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Actor);

impl Caller {
    pub fn into_inner(self) -> Actor {
        self.0
    }
}

impl Deref for Caller {
    type Target = Actor;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequest for Caller {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(actor_from_headers(req.headers()).map(Caller))
    }
}

pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ServerError> {
    let id = header_value(headers, ACTOR_ID_HEADER)?;
    let role = header_value(headers, ACTOR_ROLE_HEADER)?;
    let role = role.parse::<Role>().map_err(|e| {
        debug!("🔐️ Rejecting request with an unknown role. {e}");
        ServerError::MissingActor(e.to_string())
    })?;
    Ok(Actor::new(id, role))
}

fn header_value(headers: &HeaderMap, name: &str) -> Result<String, ServerError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServerError::MissingActor(format!("The {name} header is required")))
}
