use serde::{Deserialize, Serialize};

use crate::{
    checkout_api::errors::CheckoutError,
    db_types::{MinorUnits, OrderId, PostalAddress},
};

/// Buyer-supplied values that take precedence over stored profile data when creating the processor identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefillOverrides {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<PostalAddress>,
    pub currency: Option<String>,
}

/// What a client needs to tokenize payment details directly with the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizationConfig {
    pub order_id: OrderId,
    pub application_id: String,
    pub environment: String,
    pub buyer_identity_id: String,
    pub fraud_session_id: String,
    pub amount: MinorUnits,
    pub currency: String,
}

/// How the buyer is paying. Resolved once from the raw request with [`PaymentSource::from_parts`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentSource {
    /// A fresh token from the processor's tokenization form.
    Token { token: String, address: Option<PostalAddress> },
    /// An instrument the buyer has used before.
    SavedInstrument { instrument_id: String },
}

impl PaymentSource {
    /// Exactly one of `token` and `instrument_id` must be supplied. Blank strings count as absent.
    pub fn from_parts(
        token: Option<String>,
        instrument_id: Option<String>,
        address: Option<PostalAddress>,
    ) -> Result<Self, CheckoutError> {
        let token = token.filter(|s| !s.trim().is_empty());
        let instrument_id = instrument_id.filter(|s| !s.trim().is_empty());
        match (token, instrument_id) {
            (Some(token), None) => Ok(Self::Token { token, address }),
            (None, Some(instrument_id)) => Ok(Self::SavedInstrument { instrument_id }),
            (Some(_), Some(_)) => {
                Err(CheckoutError::Validation("Supply either a token or a payment instrument id, not both".into()))
            },
            (None, None) => Err(CheckoutError::Validation("A token or a payment instrument id is required".into())),
        }
    }

    /// The `source_type` tag sent to the processor.
    pub fn source_type(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::SavedInstrument { .. } => "saved_instrument",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub tracking_number: String,
    pub carrier: Option<String>,
}
