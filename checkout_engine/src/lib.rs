//! Checkout Engine
//!
//! The checkout engine coordinates the sale of a single listed item between a buyer and a seller, settled through an
//! external card and bank payment processor. This library contains the core logic. It is provider-agnostic: the
//! processor is reached through the [`traits::PaymentGateway`] trait and storage through the other backend traits.
//!
//! The library is divided into these sections:
//! 1. Backend contracts ([`mod@traits`]) and the SQLite backend that implements them ([`SqliteDatabase`]). The data
//!    types stored by the backends live in [`mod@db_types`] and are public.
//! 2. The public API ([`mod@checkout_api`]): reservations, the payment pipeline, fulfilment, refunds and webhook
//!    reconciliation.
//! 3. Pure [`mod@helpers`]: failure-code classification, idempotency keys, webhook signatures and currency inference.
//!
//! The engine also emits events (order reserved, payment submitted, order paid, and so on). A small actor framework in
//! [`mod@events`] lets you hook into these to send notifications or post chat messages.
pub mod checkout_api;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use checkout_api::{
    errors::{CheckoutError, PaymentFailure},
    order_flow_api::OrderFlowApi,
    order_objects,
    payment_api::CheckoutApi,
    refund_api::RefundApi,
    reservation_api::ReservationApi,
    webhook_api::{WebhookApi, WebhookReceipt},
    webhook_objects,
};
#[cfg(feature = "sqlite")]
pub use sqlite::{db::new_pool, SqliteDatabase};
