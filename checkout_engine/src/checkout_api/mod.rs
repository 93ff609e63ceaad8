//! # Checkout engine public API
//!
//! The `checkout_api` module exposes the programmatic API for the checkout engine. It is split by concern, so that
//! a caller only needs to supply the backend traits the part it uses requires.
//!
//! * [`reservation_api`] claims a listing for a buyer and creates the order.
//! * [`payment_api`] prepares client-side tokenization and runs the synchronous payment pipeline (identity,
//!   instrument, authorization, capture). It never marks an order as paid.
//! * [`order_flow_api`] handles fulfilment (shipping, delivery confirmation) and cancellation.
//! * [`refund_api`] runs the dual-approval refund workflow.
//! * [`webhook_api`] reconciles orders and merchant onboarding with the processor's webhook events. This is the only
//!   path to `paid`.
//!
//! The other submodules are supporting types.
//!
//! # API usage
//!
//! Every API is created from a backend (and, where money moves, a [`PaymentGateway`]) plus the event producers that
//! should be notified of state changes.
//!
//! ```rust,ignore
//! use checkout_engine::{events::EventProducers, ReservationApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/checkout.db", 25).await?;
//! let api = ReservationApi::new(db, EventProducers::default());
//! let order = api.reserve("listing-42", "buyer-7").await?;
//! ```
//!
//! [`PaymentGateway`]: crate::traits::PaymentGateway
pub mod errors;
mod guards;
pub mod order_flow_api;
pub mod order_objects;
pub mod payment_api;
pub mod refund_api;
pub mod reservation_api;
pub mod webhook_api;
pub mod webhook_objects;
