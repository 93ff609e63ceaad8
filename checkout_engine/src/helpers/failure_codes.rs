//! Canonical payment failure codes.
//!
//! The processor reports failures in two ways: a structured `failure_code` (or `code`) field in its error envelope,
//! and free text. [`classify_failure`] resolves both onto [`FailureCode`] using, in order:
//!
//! 1. an exact lookup of the structured code in [`STRUCTURED_CODES`],
//! 2. ACH return codes (`R01`, `R02`, ...) found in the structured code or the message, via [`ACH_RETURN_CODES`],
//! 3. an ordered substring match of the lower-cased message against [`MESSAGE_PATTERNS`],
//! 4. [`FailureCode::ProcessingError`].
use std::{fmt::Display, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    CardDeclined,
    InsufficientFunds,
    SuspectedFraud,
    ExpiredCard,
    InvalidCard,
    LostOrStolen,
    AvsMismatch,
    CvvMismatch,
    LimitExceeded,
    BankAccountInvalid,
    AccountClosed,
    PaymentNotAuthorized,
    ProcessingError,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CardDeclined => "CARD_DECLINED",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::SuspectedFraud => "SUSPECTED_FRAUD",
            Self::ExpiredCard => "EXPIRED_CARD",
            Self::InvalidCard => "INVALID_CARD",
            Self::LostOrStolen => "LOST_OR_STOLEN",
            Self::AvsMismatch => "AVS_MISMATCH",
            Self::CvvMismatch => "CVV_MISMATCH",
            Self::LimitExceeded => "LIMIT_EXCEEDED",
            Self::BankAccountInvalid => "BANK_ACCOUNT_INVALID",
            Self::AccountClosed => "ACCOUNT_CLOSED",
            Self::PaymentNotAuthorized => "PAYMENT_NOT_AUTHORIZED",
            Self::ProcessingError => "PROCESSING_ERROR",
        }
    }

    /// A short, buyer-facing suggestion for what to do next.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::InsufficientFunds => "Insufficient funds. Try a different payment method.",
            Self::ExpiredCard => "The card has expired. Please use a different card.",
            Self::InvalidCard => "The card details are invalid. Check the number and try again.",
            Self::AvsMismatch => "The billing address does not match the card. Check the address and try again.",
            Self::CvvMismatch => "The security code does not match. Check the code and try again.",
            Self::LimitExceeded => "The payment exceeds the card's limit. Try a different payment method.",
            Self::BankAccountInvalid | Self::AccountClosed => {
                "The bank account cannot be debited. Try a different account."
            },
            Self::PaymentNotAuthorized => "The account holder did not authorize this debit.",
            Self::ProcessingError => "The payment could not be processed. Please try again shortly.",
            Self::CardDeclined | Self::SuspectedFraud | Self::LostOrStolen => {
                "The payment was declined. Try a different card."
            },
        }
    }
}

impl Display for FailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

use FailureCode::*;

/// Structured codes, matched exactly after upper-casing.
pub const STRUCTURED_CODES: &[(&str, FailureCode)] = &[
    ("CARD_DECLINED", CardDeclined),
    ("DECLINED", CardDeclined),
    ("GENERIC_DECLINE", CardDeclined),
    ("DO_NOT_HONOR", CardDeclined),
    ("CALL_ISSUER", CardDeclined),
    ("TRANSACTION_NOT_ALLOWED", CardDeclined),
    ("INSUFFICIENT_FUNDS", InsufficientFunds),
    ("FRAUD_DETECTED", SuspectedFraud),
    ("SUSPECTED_FRAUD", SuspectedFraud),
    ("FRAUD_SUSPECTED", SuspectedFraud),
    ("EXPIRED_CARD", ExpiredCard),
    ("CARD_EXPIRED", ExpiredCard),
    ("INVALID_CARD", InvalidCard),
    ("INVALID_NUMBER", InvalidCard),
    ("INVALID_CARD_NUMBER", InvalidCard),
    ("LOST_CARD", LostOrStolen),
    ("STOLEN_CARD", LostOrStolen),
    ("LOST_OR_STOLEN", LostOrStolen),
    ("PICK_UP_CARD", LostOrStolen),
    ("AVS_MISMATCH", AvsMismatch),
    ("ADDRESS_VERIFICATION_FAILED", AvsMismatch),
    ("CVV_MISMATCH", CvvMismatch),
    ("CVV_FAILURE", CvvMismatch),
    ("INVALID_CVV", CvvMismatch),
    ("EXCEEDS_APPROVAL_AMOUNT_LIMIT", LimitExceeded),
    ("EXCEEDS_WITHDRAWAL_LIMIT", LimitExceeded),
    ("LIMIT_EXCEEDED", LimitExceeded),
    ("INVALID_BANK_ACCOUNT", BankAccountInvalid),
    ("BANK_ACCOUNT_INVALID", BankAccountInvalid),
    ("ACCOUNT_CLOSED", AccountClosed),
    ("PAYMENT_NOT_AUTHORIZED", PaymentNotAuthorized),
    ("PROCESSING_ERROR", ProcessingError),
];

/// NACHA return reason codes.
pub const ACH_RETURN_CODES: &[(&str, FailureCode)] = &[
    ("R01", InsufficientFunds),
    ("R02", AccountClosed),
    ("R03", BankAccountInvalid),
    ("R04", BankAccountInvalid),
    ("R05", PaymentNotAuthorized),
    ("R07", PaymentNotAuthorized),
    ("R08", PaymentNotAuthorized),
    ("R09", InsufficientFunds),
    ("R10", PaymentNotAuthorized),
    ("R16", AccountClosed),
    ("R20", BankAccountInvalid),
    ("R29", PaymentNotAuthorized),
];

/// Lower-case message fragments. The first match wins, so more specific phrases come first.
pub const MESSAGE_PATTERNS: &[(&str, FailureCode)] = &[
    ("insufficient funds", InsufficientFunds),
    ("not sufficient funds", InsufficientFunds),
    ("lost card", LostOrStolen),
    ("stolen", LostOrStolen),
    ("pick up card", LostOrStolen),
    ("fraud", SuspectedFraud),
    ("expired card", ExpiredCard),
    ("card expired", ExpiredCard),
    ("card has expired", ExpiredCard),
    ("invalid card", InvalidCard),
    ("invalid number", InvalidCard),
    ("incorrect number", InvalidCard),
    ("security code", CvvMismatch),
    ("cvv", CvvMismatch),
    ("cvc", CvvMismatch),
    ("address verification", AvsMismatch),
    ("avs", AvsMismatch),
    ("account closed", AccountClosed),
    ("account frozen", AccountClosed),
    ("no account", BankAccountInvalid),
    ("invalid account", BankAccountInvalid),
    ("invalid bank account", BankAccountInvalid),
    ("unauthorized debit", PaymentNotAuthorized),
    ("not authorized by", PaymentNotAuthorized),
    ("limit exceeded", LimitExceeded),
    ("exceeds limit", LimitExceeded),
    ("exceeds approval amount", LimitExceeded),
    ("do not honor", CardDeclined),
    ("declined", CardDeclined),
];

fn ach_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(R\d{2})\b").expect("static regex is valid"))
}

fn ach_lookup(code: &str) -> Option<FailureCode> {
    ACH_RETURN_CODES.iter().find(|(c, _)| *c == code).map(|(_, f)| *f)
}

/// Resolves a processor failure onto a canonical code. Never fails; unknown failures are `PROCESSING_ERROR`.
pub fn classify_failure(code: Option<&str>, message: &str) -> FailureCode {
    if let Some(code) = code.map(|c| c.trim().to_ascii_uppercase()).filter(|c| !c.is_empty()) {
        if let Some((_, f)) = STRUCTURED_CODES.iter().find(|(c, _)| *c == code) {
            return *f;
        }
        if let Some(f) = ach_lookup(&code) {
            return f;
        }
    }
    if let Some(f) = ach_code_regex().captures(message).and_then(|c| c.get(1)).and_then(|m| ach_lookup(m.as_str())) {
        return f;
    }
    let lower = message.to_ascii_lowercase();
    MESSAGE_PATTERNS.iter().find(|(pattern, _)| lower.contains(pattern)).map(|(_, f)| *f).unwrap_or(ProcessingError)
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn every_structured_code_resolves_to_itself() {
        for (code, expected) in STRUCTURED_CODES {
            assert_eq!(classify_failure(Some(code), ""), *expected, "{code}");
            assert_eq!(classify_failure(Some(&code.to_ascii_lowercase()), ""), *expected, "{code} lower-case");
        }
    }

    #[test]
    fn every_ach_code_resolves_from_code_and_message() {
        for (code, expected) in ACH_RETURN_CODES {
            assert_eq!(classify_failure(Some(code), ""), *expected, "{code}");
            let message = format!("ACH return {code}: returned by receiving bank");
            assert_eq!(classify_failure(None, &message), *expected, "{message}");
        }
    }

    #[test]
    fn every_message_pattern_resolves() {
        for (pattern, expected) in MESSAGE_PATTERNS {
            let message = format!("Transaction failed: {} (ref 1234)", pattern.to_ascii_uppercase());
            assert_eq!(classify_failure(None, &message), *expected, "{message}");
        }
    }

    #[test]
    fn canonical_codes_round_trip_through_the_table() {
        let all = [
            CardDeclined,
            InsufficientFunds,
            SuspectedFraud,
            ExpiredCard,
            InvalidCard,
            LostOrStolen,
            AvsMismatch,
            CvvMismatch,
            LimitExceeded,
            BankAccountInvalid,
            AccountClosed,
            PaymentNotAuthorized,
            ProcessingError,
        ];
        let covered = STRUCTURED_CODES.iter().map(|(_, f)| *f).collect::<HashSet<_>>();
        for code in all {
            assert!(covered.contains(&code), "{code} has no structured entry");
            assert_eq!(classify_failure(Some(code.as_str()), ""), code);
            assert!(!code.hint().is_empty());
        }
    }

    #[test]
    fn structured_code_beats_message() {
        let f = classify_failure(Some("EXPIRED_CARD"), "Card declined: insufficient funds");
        assert_eq!(f, ExpiredCard);
    }

    #[test]
    fn unknown_structured_code_falls_back_to_message() {
        let f = classify_failure(Some("INVALID_FIELD"), "The card has expired");
        assert_eq!(f, ExpiredCard);
    }

    #[test]
    fn specific_patterns_win_over_generic_decline() {
        assert_eq!(classify_failure(None, "Declined: insufficient funds"), InsufficientFunds);
        assert_eq!(classify_failure(None, "Declined - suspected fraud"), SuspectedFraud);
        assert_eq!(classify_failure(None, "Card declined"), CardDeclined);
    }

    #[test]
    fn ach_codes_need_a_word_boundary() {
        assert_eq!(classify_failure(None, "Reference XR011 failed"), ProcessingError);
    }

    #[test]
    fn default_is_processing_error() {
        assert_eq!(classify_failure(None, ""), ProcessingError);
        assert_eq!(classify_failure(None, "upstream connection reset"), ProcessingError);
        assert_eq!(classify_failure(Some("  "), "gateway timeout"), ProcessingError);
    }

    #[test]
    fn serializes_screaming_snake() {
        assert_eq!(serde_json::to_string(&AvsMismatch).unwrap(), "\"AVS_MISMATCH\"");
        assert_eq!(serde_json::to_string(&ProcessingError).unwrap(), "\"PROCESSING_ERROR\"");
    }
}
