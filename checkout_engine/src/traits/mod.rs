//! # Backend contracts
//!
//! The engine never talks to a database or the payment processor directly. Everything goes through the traits in
//! this module, so that backends can be swapped (and mocked in tests).
//!
//! ## Storage
//! * [`OrderManagement`] stores orders and performs guarded (compare-and-set) status transitions.
//! * [`ListingManagement`] owns the listing reservation marker. It is the only piece of shared mutable state that
//!   buyers race on, and every write to it is conditional.
//! * [`RefundManagement`] stores refund requests.
//! * [`AuditLog`] is an append-only log of privileged actions.
//! * [`MerchantManagement`] tracks seller onboarding with the processor.
//! * [`WebhookEventManagement`] records inbound processor events and their processing state, so that each event id
//!   is processed at most once.
//! * [`UserDirectory`] is a read-mostly view of user profiles.
//!
//! ## Processor
//! * [`PaymentGateway`] is the processor surface the pipeline needs. Types in [`gateway_objects`] are the engine's own
//!   representation; implementations translate to and from their wire formats.
mod audit_log;
pub mod gateway_objects;
mod listing_management;
mod merchant_management;
mod order_management;
mod payment_gateway;
mod refund_management;
mod storage_error;
mod user_directory;
mod webhook_events;

pub use audit_log::AuditLog;
pub use gateway_objects::{GatewayError, GatewayErrorKind};
pub use listing_management::ListingManagement;
pub use merchant_management::MerchantManagement;
pub use order_management::OrderManagement;
pub use payment_gateway::PaymentGateway;
pub use refund_management::RefundManagement;
pub use storage_error::StorageError;
pub use user_directory::UserDirectory;
pub use webhook_events::WebhookEventManagement;

/// The full storage surface of the engine. Anything that implements every storage trait gets this for free, which lets
/// callers (e.g. the HTTP routes) carry a single bound.
pub trait CheckoutDatabase:
    OrderManagement
    + ListingManagement
    + RefundManagement
    + AuditLog
    + MerchantManagement
    + UserDirectory
    + WebhookEventManagement
{
}

impl<T> CheckoutDatabase for T where T: OrderManagement
        + ListingManagement
        + RefundManagement
        + AuditLog
        + MerchantManagement
        + UserDirectory
        + WebhookEventManagement
{
}
