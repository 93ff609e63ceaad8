use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    helpers::{classify_failure, FailureCode},
    traits::{GatewayError, GatewayErrorKind, StorageError},
};

/// Everything a client needs to decide what to do after a failed payment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailure {
    pub failure_code: FailureCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<String>,
}

impl PaymentFailure {
    pub fn new<S: Into<String>>(failure_code: FailureCode, message: S) -> Self {
        Self { failure_code, message: message.into(), instrument_id: None, authorization_id: None, transfer_id: None }
    }

    /// Classifies a processor error. Transient errors have already been retried by the client, so they surface as
    /// `PROCESSING_ERROR` regardless of their text.
    pub fn from_gateway(err: &GatewayError) -> Self {
        let code = match err.kind {
            GatewayErrorKind::Transient | GatewayErrorKind::Malformed | GatewayErrorKind::Configuration => {
                FailureCode::ProcessingError
            },
            GatewayErrorKind::Rejected => classify_failure(err.code.as_deref(), &err.message),
        };
        Self::new(code, err.message.clone())
    }

    pub fn with_instrument(mut self, id: Option<&str>) -> Self {
        self.instrument_id = id.map(String::from);
        self
    }

    pub fn with_authorization(mut self, id: Option<&str>) -> Self {
        self.authorization_id = id.map(String::from);
        self
    }

    pub fn with_transfer(mut self, id: Option<&str>) -> Self {
        self.transfer_id = id.map(String::from);
        self
    }
}

impl Display for PaymentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.failure_code, self.message)
    }
}

#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{entity} {id} does not exist")]
    NotFound { entity: &'static str, id: String },
    #[error("Payment failed: {0}")]
    Payment(PaymentFailure),
    /// The event or request cannot be handled yet, but may succeed later (e.g. correlation data not written yet).
    #[error("{0}")]
    Retryable(String),
    /// A conditional write lost to a concurrent writer.
    #[error("{0}")]
    Conflict(String),
    #[error("Storage error. {0}")]
    Storage(StorageError),
    #[error("Payment processor error. {0}")]
    Gateway(GatewayError),
}

impl CheckoutError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Authorization(_) => "AUTHORIZATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Payment(_) => "PAYMENT_ERROR",
            Self::Retryable(_) => "RETRYABLE_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Gateway(_) => "GATEWAY_ERROR",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Retryable(_) | Self::Conflict(_) | Self::Storage(_) => true,
            Self::Gateway(e) => e.kind == GatewayErrorKind::Transient,
            _ => false,
        }
    }

    pub fn not_found<S: Into<String>>(entity: &'static str, id: S) -> Self {
        Self::NotFound { entity, id: id.into() }
    }
}

impl From<StorageError> for CheckoutError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { entity, id } => Self::NotFound { entity, id },
            StorageError::ActiveRefundExists => {
                Self::Validation("This order already has a refund request in progress".to_string())
            },
            StorageError::DuplicateIdempotencyId(id) => {
                Self::Validation(format!("A refund request with idempotency id {id} already exists"))
            },
            e => Self::Storage(e),
        }
    }
}

impl From<PaymentFailure> for CheckoutError {
    fn from(f: PaymentFailure) -> Self {
        Self::Payment(f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn declines_are_classified() {
        let e = GatewayError::rejected(402, Some("INSUFFICIENT_FUNDS".into()), "Declined");
        assert_eq!(PaymentFailure::from_gateway(&e).failure_code, FailureCode::InsufficientFunds);
        let e = GatewayError::rejected(402, None, "The card has expired");
        assert_eq!(PaymentFailure::from_gateway(&e).failure_code, FailureCode::ExpiredCard);
    }

    #[test]
    fn transient_errors_are_processing_errors() {
        let e = GatewayError::transient("insufficient funds in the connection pool");
        assert_eq!(PaymentFailure::from_gateway(&e).failure_code, FailureCode::ProcessingError);
    }

    #[test]
    fn storage_conflicts_become_validation_errors() {
        let e: CheckoutError = StorageError::ActiveRefundExists.into();
        assert_eq!(e.code(), "VALIDATION_ERROR");
        let e: CheckoutError = StorageError::DuplicateIdempotencyId("k1".into()).into();
        assert!(e.to_string().contains("k1"));
        let e: CheckoutError = StorageError::DatabaseError("disk full".into()).into();
        assert_eq!(e.code(), "STORAGE_ERROR");
        assert!(e.is_retryable());
    }
}
