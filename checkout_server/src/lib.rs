//! # Checkout server
//! This crate hosts the HTTP server for the checkout engine. It is responsible for:
//! * Exposing the buyer, seller and admin checkout operations under `/api`.
//! * Receiving signed webhooks from the payment processor, recording them, and reconciling orders and refunds.
//! * Retrying webhook events that failed with a transient error.
//! * Forwarding engine events to the notification service.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Identity
//! The server sits behind an authenticating gateway, which passes the caller's identity in the `X-Actor-Id` and
//! `X-Actor-Role` headers. See [auth](auth/index.html).
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/api/...`: Reservation, payment, fulfilment and refund operations. See [routes](routes/index.html).
//! * `/webhooks/finix`: The processor webhook route. Requests must carry a valid HMAC signature.

pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod webhook_worker;
