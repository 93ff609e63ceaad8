//! Self-contained helpers with no database or network access.
//!
//! * [`failure_codes`] maps processor failures onto the canonical [`FailureCode`] set.
//! * [`idempotency`] validates caller-supplied idempotency ids and derives the per-step keys sent to the processor.
//! * [`signature`] verifies processor webhook signatures.
//! * [`currency`] infers a settlement currency from a buyer's country.
pub mod currency;
pub mod failure_codes;
pub mod idempotency;
pub mod signature;

pub use currency::{currency_for_country, effective_currency};
pub use failure_codes::{classify_failure, FailureCode};
pub use idempotency::{derive_key, new_fraud_session_id, new_refund_idempotency_id, validate_idempotency_id, PipelineStep};
pub use signature::{sign_payload, verify_signature, SignatureCheck, SignatureError};
