//! Idempotency ids for outbound processor calls.
//!
//! A caller-supplied id covers a whole pipeline run. Each mutating step derives its own key from it, so a retried run
//! replays the exact same keys and the processor deduplicates every step.
use std::fmt::Display;

use rand::{distributions::Alphanumeric, Rng};

use crate::db_types::OrderId;

pub const MAX_IDEMPOTENCY_ID_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    Identity,
    Instrument,
    Authorize,
    Capture,
    Transfer,
    /// Voiding an authorization that lost a race for its order.
    Void,
    /// Reversing a direct debit that lost a race for its order.
    Unwind,
}

impl Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Identity => "identity",
            Self::Instrument => "instrument",
            Self::Authorize => "authorize",
            Self::Capture => "capture",
            Self::Transfer => "transfer",
            Self::Void => "void",
            Self::Unwind => "unwind",
        };
        f.write_str(s)
    }
}

/// Checks a caller-supplied idempotency id. Returns a human-readable reason when it is unusable.
pub fn validate_idempotency_id(id: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        return Err("An idempotency id is required".to_string());
    }
    if id.len() > MAX_IDEMPOTENCY_ID_LEN {
        return Err(format!("The idempotency id may not exceed {MAX_IDEMPOTENCY_ID_LEN} characters"));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')) {
        return Err("The idempotency id may only contain letters, digits, '-', '_', ':' and '.'".to_string());
    }
    Ok(())
}

/// The deterministic key for one step of a pipeline run.
pub fn derive_key(base: &str, step: PipelineStep) -> String {
    format!("{base}:{step}")
}

pub fn new_refund_idempotency_id(order_id: &OrderId) -> String {
    format!("refund:{order_id}:{}", uuid::Uuid::new_v4())
}

/// A fresh random session id that ties a buyer's tokenization session to their payment for fraud screening.
pub fn new_fraud_session_id() -> String {
    let suffix: String = rand::thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect();
    format!("fs_{suffix}")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validates_ids() {
        assert!(validate_idempotency_id("checkout-123:abc.def_9").is_ok());
        assert!(validate_idempotency_id("").is_err());
        assert!(validate_idempotency_id("   ").is_err());
        assert!(validate_idempotency_id("has space").is_err());
        assert!(validate_idempotency_id(&"a".repeat(MAX_IDEMPOTENCY_ID_LEN)).is_ok());
        assert!(validate_idempotency_id(&"a".repeat(MAX_IDEMPOTENCY_ID_LEN + 1)).is_err());
    }

    #[test]
    fn derived_keys_are_stable_and_distinct() {
        let steps = [
            PipelineStep::Identity,
            PipelineStep::Instrument,
            PipelineStep::Authorize,
            PipelineStep::Capture,
            PipelineStep::Transfer,
            PipelineStep::Void,
            PipelineStep::Unwind,
        ];
        let keys = steps.iter().map(|s| derive_key("k1", *s)).collect::<Vec<_>>();
        assert_eq!(keys[2], "k1:authorize");
        assert_eq!(derive_key("k1", PipelineStep::Capture), derive_key("k1", PipelineStep::Capture));
        let unique = keys.iter().collect::<std::collections::HashSet<_>>();
        assert_eq!(unique.len(), steps.len());
        for key in &keys {
            assert!(validate_idempotency_id(key).is_ok());
        }
    }

    #[test]
    fn generated_ids() {
        let order = OrderId::from("o-1");
        let a = new_refund_idempotency_id(&order);
        let b = new_refund_idempotency_id(&order);
        assert!(a.starts_with("refund:o-1:"));
        assert_ne!(a, b);
        assert!(validate_idempotency_id(&a).is_ok());
        let fs = new_fraud_session_id();
        assert_eq!(fs.len(), 35);
        assert_ne!(fs, new_fraud_session_id());
    }
}
