//! Processor webhook payloads.
//!
//! Every event arrives in the same envelope:
//!
//! ```json
//! { "id": "EVxxx", "type": "updated", "entity": "transfer", "_embedded": { "transfers": [ { ... } ] } }
//! ```
//!
//! Only the fields the reconciliation handlers read are modelled. Everything else is kept in the raw payload stored
//! with the event record.
use std::collections::HashMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    db_types::{MinorUnits, NewWebhookEvent},
    traits::gateway_objects::GatewayState,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub entity: String,
    #[serde(rename = "_embedded", default)]
    pub embedded: HashMap<String, Value>,
}

impl WebhookEnvelope {
    pub fn from_value(payload: &Value) -> Result<Self, String> {
        let envelope = serde_json::from_value::<Self>(payload.clone())
            .map_err(|e| format!("Webhook payload is not a valid event envelope. {e}"))?;
        if envelope.id.trim().is_empty() {
            return Err("Webhook payload has an empty event id".into());
        }
        Ok(envelope)
    }

    /// The `entity.action` key used to route the event, e.g. `transfer.updated`. Some event types already carry the
    /// entity prefix; others are just the action.
    pub fn kind(&self) -> String {
        let entity = self.entity.trim().to_ascii_lowercase();
        let event_type = self.event_type.trim().to_ascii_lowercase();
        if event_type.contains('.') {
            event_type
        } else {
            format!("{entity}.{event_type}")
        }
    }

    /// The first embedded resource. The processor keys the list by the plural of the entity name, but falls back to
    /// whatever single list is present.
    pub fn first_entity<T: DeserializeOwned>(&self) -> Result<T, String> {
        let plural = format!("{}s", self.entity.trim().to_ascii_lowercase());
        let list = self
            .embedded
            .get(&plural)
            .or_else(|| if self.embedded.len() == 1 { self.embedded.values().next() } else { None })
            .ok_or_else(|| format!("Event {} has no embedded '{plural}'", self.id))?;
        let first = match list {
            Value::Array(items) => items.first().cloned(),
            Value::Object(_) => Some(list.clone()),
            _ => None,
        }
        .ok_or_else(|| format!("Event {} has an empty '{plural}' list", self.id))?;
        serde_json::from_value(first).map_err(|e| format!("Could not read the {} in event {}. {e}", self.entity, self.id))
    }

    pub fn to_new_event(&self, payload: Value) -> NewWebhookEvent {
        NewWebhookEvent {
            event_id: self.id.clone(),
            entity: self.entity.trim().to_ascii_lowercase(),
            event_type: self.kind(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferPayload {
    pub id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(rename = "type", default)]
    pub transfer_type: Option<String>,
    #[serde(default)]
    pub failure_code: Option<String>,
    #[serde(default)]
    pub failure_message: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Present on transfers created by capturing an authorization.
    #[serde(default)]
    pub authorization: Option<String>,
}

impl TransferPayload {
    pub fn gateway_state(&self) -> GatewayState {
        GatewayState::parse(&self.state)
    }

    pub fn is_reversal(&self) -> bool {
        self.transfer_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("REVERSAL"))
    }

    pub fn amount(&self) -> Option<MinorUnits> {
        self.amount.map(MinorUnits::from)
    }

    /// The authorization id, either as sent by the processor or as we tagged it.
    pub fn authorization_id(&self) -> Option<&str> {
        self.authorization
            .as_deref()
            .or_else(|| self.tags.get("authorization_id").map(String::as_str))
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MerchantPayload {
    pub id: String,
    pub identity: String,
    #[serde(default)]
    pub verification: Option<String>,
    #[serde(default)]
    pub onboarding_state: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationPayload {
    pub id: String,
    #[serde(default)]
    pub state: String,
    /// Verifications are run against either an identity or a merchant. Only identity verifications are tracked.
    #[serde(default)]
    pub identity: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnboardingFormPayload {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub identity_id: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl OnboardingFormPayload {
    pub fn is_completed(&self) -> bool {
        self.status.eq_ignore_ascii_case("COMPLETED")
    }

    pub fn user_id(&self) -> Option<&str> {
        self.tags.get("user_id").map(String::as_str).filter(|s| !s.is_empty())
    }
}

/// What processing an event did. Stored on the event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The event changed local state.
    Applied(String),
    /// The event was valid but required no change.
    NoChange(String),
    /// Nothing local correlates with the event.
    OrderNotFound,
    /// Not an event type the engine handles.
    Ignored,
}

impl WebhookOutcome {
    pub fn as_outcome(&self) -> String {
        match self {
            Self::Applied(what) => format!("applied: {what}"),
            Self::NoChange(why) => format!("no_change: {why}"),
            Self::OrderNotFound => "order_not_found".into(),
            Self::Ignored => "ignored".into(),
        }
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn transfer_event(event_type: &str) -> Value {
        json!({
            "id": "EVabc",
            "type": event_type,
            "entity": "transfer",
            "_embedded": { "transfers": [ {
                "id": "TRx1", "state": "SUCCEEDED", "amount": 12500, "currency": "USD", "type": "DEBIT",
                "tags": { "order_id": "ord-1" }, "unexpected": true
            } ] }
        })
    }

    #[test]
    fn event_kinds() {
        let e = WebhookEnvelope::from_value(&transfer_event("updated")).unwrap();
        assert_eq!(e.kind(), "transfer.updated");
        let e = WebhookEnvelope::from_value(&transfer_event("Transfer.Created")).unwrap();
        assert_eq!(e.kind(), "transfer.created");
    }

    #[test]
    fn reads_the_embedded_transfer() {
        let e = WebhookEnvelope::from_value(&transfer_event("updated")).unwrap();
        let t = e.first_entity::<TransferPayload>().unwrap();
        assert_eq!(t.id, "TRx1");
        assert_eq!(t.gateway_state(), GatewayState::Succeeded);
        assert_eq!(t.amount(), Some(MinorUnits::from(12500)));
        assert!(!t.is_reversal());
        assert_eq!(t.tags["order_id"], "ord-1");
    }

    #[test]
    fn malformed_envelopes() {
        assert!(WebhookEnvelope::from_value(&json!({"type": "updated", "entity": "transfer"})).is_err());
        assert!(WebhookEnvelope::from_value(&json!({"id": " ", "type": "updated", "entity": "transfer"})).is_err());
        let e = WebhookEnvelope::from_value(&json!({"id": "EV1", "type": "updated", "entity": "transfer"})).unwrap();
        assert!(e.first_entity::<TransferPayload>().is_err());
        let e = WebhookEnvelope::from_value(&json!({
            "id": "EV1", "type": "updated", "entity": "transfer", "_embedded": { "transfers": [] }
        }))
        .unwrap();
        assert!(e.first_entity::<TransferPayload>().is_err());
    }

    #[test]
    fn onboarding_form_user_tag() {
        let form = OnboardingFormPayload {
            id: "obf_1".into(),
            status: "completed".into(),
            identity_id: Some("IDm".into()),
            tags: HashMap::from([("user_id".to_string(), "seller-1".to_string())]),
        };
        assert!(form.is_completed());
        assert_eq!(form.user_id(), Some("seller-1"));
    }
}
