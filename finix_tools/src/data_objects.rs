use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form string key/value pairs the processor stores and echoes back on every resource.
pub type Tags = HashMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Address {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

//------------------------------------------   Identities   ----------------------------------------------------------
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EntityDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personal_address: Option<Address>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewIdentity {
    pub entity: EntityDetails,
    pub tags: Tags,
    pub idempotency_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub tags: Tags,
    pub created_at: Option<DateTime<Utc>>,
}

//---------------------------------------   Payment instruments   ----------------------------------------------------
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewPaymentInstrument {
    pub token: String,
    #[serde(rename = "type")]
    pub instrument_type: String,
    pub identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    pub fraud_session_id: String,
    pub tags: Tags,
    pub idempotency_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PaymentInstrument {
    pub id: String,
    /// `PAYMENT_CARD`, `BANK_ACCOUNT`, ...
    #[serde(rename = "type")]
    pub instrument_type: String,
    pub identity: Option<String>,
    pub address_verification: Option<String>,
    pub security_code_verification: Option<String>,
    pub bank_account_validation_check: Option<String>,
    #[serde(default)]
    pub tags: Tags,
}

//------------------------------------------   Authorizations   -----------------------------------------------------
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewAuthorization {
    pub merchant: String,
    pub source: String,
    pub amount: i64,
    pub currency: String,
    pub fraud_session_id: String,
    pub tags: Tags,
    pub idempotency_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Authorization {
    pub id: String,
    pub state: String,
    pub amount: i64,
    pub currency: Option<String>,
    /// Populated once the authorization has been captured.
    pub transfer: Option<String>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    #[serde(default)]
    pub is_void: bool,
    #[serde(default)]
    pub tags: Tags,
}

//---------------------------------------------   Transfers   ------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewTransfer {
    pub merchant: String,
    pub source: String,
    pub amount: i64,
    pub currency: String,
    pub fraud_session_id: String,
    pub tags: Tags,
    pub idempotency_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Transfer {
    pub id: String,
    /// `PENDING`, `SUCCEEDED`, `FAILED`, `CANCELED`, ...
    pub state: String,
    pub amount: i64,
    pub currency: Option<String>,
    #[serde(rename = "type")]
    pub transfer_type: Option<String>,
    pub source: Option<String>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewReversal {
    pub refund_amount: i64,
    pub tags: Tags,
    pub idempotency_id: String,
}
