use std::fmt::Display;

use checkout_engine::{
    db_types::PostalAddress,
    order_objects::{PaymentSource, PrefillOverrides},
    CheckoutError,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// Body of `POST /api/orders/{id}/tokenization`. Every prefill field is optional and overrides stored profile data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenizationParams {
    pub idempotency_id: String,
    #[serde(flatten)]
    pub overrides: PrefillOverrides,
}

/// Body of `POST /api/orders/{id}/pay`. Exactly one of `token` and `instrument_id` must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentParams {
    pub idempotency_id: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub instrument_id: Option<String>,
    #[serde(default)]
    pub address: Option<PostalAddress>,
}

impl PaymentParams {
    pub fn payment_source(&self) -> Result<PaymentSource, CheckoutError> {
        PaymentSource::from_parts(self.token.clone(), self.instrument_id.clone(), self.address.clone())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundParams {
    pub reason: String,
    /// Minor units. Defaults to the full transfer amount.
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub idempotency_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReturnParams {
    pub tracking_number: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundDecisionParams {
    #[serde(default)]
    pub reason: Option<String>,
}
