use std::{collections::HashMap, fmt::Display};

use serde::{Deserialize, Serialize};

use crate::db_types::{MinorUnits, PostalAddress};

pub type Tags = HashMap<String, String>;

//--------------------------------------        Errors         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayErrorKind {
    /// Timeouts, connection failures and 5xx responses, after the client has exhausted its retries.
    Transient,
    /// The processor refused the request (declines, validation errors, unknown resources).
    Rejected,
    /// Bad credentials or missing setup on our side.
    Configuration,
    /// The processor answered with something we could not interpret.
    Malformed,
}

/// A normalized processor failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub status: Option<u16>,
    /// The processor's structured failure code, if it sent one.
    pub code: Option<String>,
    pub message: String,
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} gateway error", self.kind)?;
        if let Some(status) = self.status {
            write!(f, " ({status})")?;
        }
        if let Some(code) = &self.code {
            write!(f, " [{code}]")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for GatewayError {}

impl GatewayError {
    pub fn new<S: Into<String>>(kind: GatewayErrorKind, message: S) -> Self {
        Self { kind, status: None, code: None, message: message.into() }
    }

    pub fn rejected<S: Into<String>>(status: u16, code: Option<String>, message: S) -> Self {
        Self { kind: GatewayErrorKind::Rejected, status: Some(status), code, message: message.into() }
    }

    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::new(GatewayErrorKind::Transient, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

//--------------------------------------       Requests        ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerIdentityRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: PostalAddress,
    pub tags: Tags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentRequest {
    pub token: String,
    pub identity_id: String,
    pub address: Option<PostalAddress>,
    pub fraud_session_id: String,
    pub tags: Tags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub merchant_id: String,
    pub instrument_id: String,
    pub amount: MinorUnits,
    pub currency: String,
    pub fraud_session_id: String,
    pub tags: Tags,
}

//--------------------------------------       Responses       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayIdentity {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrumentKind {
    Card,
    BankAccount,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressCheck {
    Match,
    PartialMatch,
    NoMatch,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityCodeCheck {
    Matched,
    Unmatched,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankAccountCheck {
    Valid,
    Invalid,
    Inconclusive,
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayInstrument {
    pub id: String,
    pub kind: InstrumentKind,
    pub identity_id: Option<String>,
    pub address_check: AddressCheck,
    pub security_code_check: SecurityCodeCheck,
    pub bank_account_check: BankAccountCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayState {
    Pending,
    Succeeded,
    Failed,
    Canceled,
    Unknown,
}

impl GatewayState {
    /// Parses the processor's state strings. Anything unrecognised maps to `Unknown`.
    pub fn parse(state: &str) -> Self {
        match state.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Self::Pending,
            "SUCCEEDED" => Self::Succeeded,
            "FAILED" => Self::Failed,
            "CANCELED" | "CANCELLED" => Self::Canceled,
            _ => Self::Unknown,
        }
    }
}

impl Display for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayAuthorization {
    pub id: String,
    pub state: GatewayState,
    pub amount: MinorUnits,
    /// The transfer created by capturing this authorization.
    pub transfer_id: Option<String>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayTransfer {
    pub id: String,
    pub state: GatewayState,
    pub amount: MinorUnits,
    pub currency: Option<String>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_states() {
        assert_eq!(GatewayState::parse("succeeded"), GatewayState::Succeeded);
        assert_eq!(GatewayState::parse("CANCELLED"), GatewayState::Canceled);
        assert_eq!(GatewayState::parse("RETURNED"), GatewayState::Unknown);
    }

    #[test]
    fn error_display() {
        let e = GatewayError::rejected(402, Some("INSUFFICIENT_FUNDS".into()), "declined");
        assert_eq!(e.to_string(), "Rejected gateway error (402) [INSUFFICIENT_FUNDS]: declined");
    }
}
