use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use checkout_common::MinorUnits;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// The buyer holds the listing and has not paid yet.
    Reserved,
    /// The reservation lapsed before a payment was submitted.
    Expired,
    /// Cancelled before any funds were captured, or the processor failed the transfer.
    Cancelled,
    /// The processor accepted the payment. Funds have not necessarily moved yet.
    Processing,
    /// The processor reported the transfer as succeeded.
    Paid,
    Shipped,
    /// The buyer confirmed delivery.
    Completed,
    /// The full amount has been returned to the buyer.
    Refunded,
}

impl OrderStatusType {
    /// The lifecycle edges. Every status change made through [`OrderUpdate`] is guarded by this table: storage only
    /// applies it to an order whose current status is one of the target's predecessors (see
    /// [`OrderUpdate::status_guard`]).
    ///
    /// | From \ To  | Expired | Cancelled | Processing | Paid | Shipped | Completed | Refunded |
    /// |------------|---------|-----------|------------|------|---------|-----------|----------|
    /// | Reserved   | ✓       | ✓         | ✓          |      |         |           |          |
    /// | Processing |         | ✓         |            | ✓    |         |           | ✓        |
    /// | Paid       |         |           |            |      | ✓       |           | ✓        |
    /// | Shipped    |         |           |            |      |         | ✓         | ✓        |
    /// | Completed  |         |           |            |      |         |           | ✓        |
    ///
    /// `Shipped` and `Completed` orders can still be refunded. The return flow (the buyer ships the item back and the
    /// seller confirms receipt before approving) is what allows money to move after fulfilment.
    pub fn can_transition_to(&self, next: OrderStatusType) -> bool {
        use OrderStatusType::*;
        matches!(
            (self, next),
            (Reserved, Expired | Cancelled | Processing) |
                (Processing, Paid | Cancelled | Refunded) |
                (Paid, Shipped | Refunded) |
                (Shipped, Completed | Refunded) |
                (Completed, Refunded)
        )
    }

    /// All statuses from which `next` may be reached.
    pub fn predecessors_of(next: OrderStatusType) -> Vec<OrderStatusType> {
        Self::all().into_iter().filter(|s| s.can_transition_to(next)).collect()
    }

    pub fn all() -> [OrderStatusType; 8] {
        use OrderStatusType::*;
        [Reserved, Expired, Cancelled, Processing, Paid, Shipped, Completed, Refunded]
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Cancelled | Self::Refunded)
    }

    /// Statuses in which a captured transfer exists and a refund may be requested.
    pub fn is_refundable(&self) -> bool {
        matches!(self, Self::Processing | Self::Paid | Self::Shipped | Self::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reserved => "reserved",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
            Self::Processing => "processing",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Completed => "completed",
            Self::Refunded => "refunded",
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ConversionError(format!("Invalid order status: {s}")))
    }
}

//--------------------------------------     PaymentMethod     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Bank,
    Token,
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Card => write!(f, "card"),
            Self::Bank => write!(f, "bank"),
            Self::Token => write!(f, "token"),
        }
    }
}

//--------------------------------------     PostalAddress     ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl PostalAddress {
    /// Field-by-field merge. Values already present in `self` win; blanks are filled from `fallback`.
    pub fn or(self, fallback: &PostalAddress) -> PostalAddress {
        fn pick(a: Option<String>, b: &Option<String>) -> Option<String> {
            a.filter(|s| !s.trim().is_empty()).or_else(|| b.clone())
        }
        PostalAddress {
            line1: pick(self.line1, &fallback.line1),
            line2: pick(self.line2, &fallback.line2),
            city: pick(self.city, &fallback.city),
            region: pick(self.region, &fallback.region),
            postal_code: pick(self.postal_code, &fallback.postal_code),
            country: pick(self.country, &fallback.country),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &PostalAddress::default()
    }
}

//--------------------------------------    ListingSnapshot    ---------------------------------------------------------
/// The commercial terms of a listing, frozen at reservation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSnapshot {
    pub brand: String,
    pub model: String,
    pub condition: String,
    pub price: MinorUnits,
    #[serde(default)]
    pub images: Vec<String>,
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: OrderId,
    pub listing_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub listing_snapshot: Json<ListingSnapshot>,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: OrderStatusType,
    pub reserved_at: DateTime<Utc>,
    pub reservation_expires_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub fraud_session_id: String,
    pub finix_buyer_identity_id: Option<String>,
    pub finix_payment_instrument_id: Option<String>,
    pub finix_authorization_id: Option<String>,
    pub finix_transfer_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub tracking_number: Option<String>,
    pub tracking_carrier: Option<String>,
    pub metadata: Json<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn reservation_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatusType::Reserved && self.reservation_expires_at <= now
    }

    pub fn is_party(&self, user_id: &str) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.0.get(key)
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub listing_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub listing_snapshot: ListingSnapshot,
    pub amount: MinorUnits,
    pub currency: String,
    pub reserved_at: DateTime<Utc>,
    pub reservation_expires_at: DateTime<Utc>,
    pub fraud_session_id: String,
}

/// A partial update of an order. Only the fields that are `Some` are written.
///
/// The update is a compare-and-set. It only applies when the order's current status passes [`Self::status_guard`]
/// and the processor ids pass the `*_unset_or` guards, which is how concurrent writers are kept apart.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub expected_status: Vec<OrderStatusType>,
    pub status: Option<OrderStatusType>,
    pub currency: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub finix_buyer_identity_id: Option<String>,
    pub finix_payment_instrument_id: Option<String>,
    pub finix_authorization_id: Option<String>,
    pub finix_transfer_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub tracking_number: Option<String>,
    pub tracking_carrier: Option<String>,
    /// Merged into the existing metadata with JSON merge-patch semantics. `null` values remove keys.
    pub metadata_patch: Option<Value>,
    /// Sets `finix_authorization_id` back to NULL.
    pub clear_authorization: bool,
    /// Only apply while the order has no authorization or holds exactly this one.
    pub authorization_unset_or: Option<String>,
    /// Only apply while the order has no transfer or holds exactly this one.
    pub transfer_unset_or: Option<String>,
}

impl OrderUpdate {
    /// A status transition, guarded on the current status being `from`.
    pub fn transition(from: OrderStatusType, to: OrderStatusType) -> Self {
        Self { expected_status: vec![from], status: Some(to), ..Default::default() }
    }

    pub fn when_status_in(mut self, statuses: &[OrderStatusType]) -> Self {
        self.expected_status = statuses.to_vec();
        self
    }

    pub fn with_metadata(mut self, patch: Value) -> Self {
        self.metadata_patch = Some(patch);
        self
    }

    /// Records the authorization on the order unless the order already belongs to a different one.
    pub fn claiming_authorization(mut self, authorization_id: &str) -> Self {
        self.finix_authorization_id = Some(authorization_id.to_string());
        self.authorization_unset_or = Some(authorization_id.to_string());
        self
    }

    /// Records the transfer on the order unless the order already belongs to a different one.
    pub fn claiming_transfer(mut self, transfer_id: &str) -> Self {
        self.finix_transfer_id = Some(transfer_id.to_string());
        self.transfer_unset_or = Some(transfer_id.to_string());
        self
    }

    /// The statuses the order must be in for the update to apply. `None` means any status.
    ///
    /// A status change is always restricted to the predecessors of the new status, further narrowed by
    /// `expected_status` if that is set. An empty list means the update can never apply.
    pub fn status_guard(&self) -> Option<Vec<OrderStatusType>> {
        let allowed = self.status.map(OrderStatusType::predecessors_of);
        match (allowed, self.expected_status.is_empty()) {
            (None, true) => None,
            (None, false) => Some(self.expected_status.clone()),
            (Some(allowed), true) => Some(allowed),
            (Some(allowed), false) => {
                Some(self.expected_status.iter().copied().filter(|s| allowed.contains(s)).collect())
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() &&
            self.currency.is_none() &&
            self.shipped_at.is_none() &&
            self.delivered_at.is_none() &&
            self.cancelled_at.is_none() &&
            self.refunded_at.is_none() &&
            self.paid_at.is_none() &&
            self.finix_buyer_identity_id.is_none() &&
            self.finix_payment_instrument_id.is_none() &&
            self.finix_authorization_id.is_none() &&
            self.finix_transfer_id.is_none() &&
            self.payment_method.is_none() &&
            self.tracking_number.is_none() &&
            self.tracking_carrier.is_none() &&
            self.metadata_patch.is_none() &&
            !self.clear_authorization
    }
}

//--------------------------------------        Listing        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    /// A payment for the reserving order is in flight. Not reservable, regardless of the marker's expiry.
    PendingSale,
    Sold,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Listing {
    pub id: String,
    pub seller_id: String,
    pub brand: String,
    pub model: String,
    pub condition: String,
    pub price: MinorUnits,
    pub currency: String,
    pub images: Json<Vec<String>>,
    pub status: ListingStatus,
    pub reserved_until: Option<DateTime<Utc>>,
    pub reserved_by_user_id: Option<String>,
    pub reserved_by_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn snapshot(&self) -> ListingSnapshot {
        ListingSnapshot {
            brand: self.brand.clone(),
            model: self.model.clone(),
            condition: self.condition.clone(),
            price: self.price,
            images: self.images.0.clone(),
        }
    }

    /// The expiry of the current reservation, if there is one that has not lapsed at `now`.
    pub fn live_reservation(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.reserved_until.filter(|until| *until > now)
    }
}

#[derive(Debug, Clone)]
pub struct NewListing {
    pub id: String,
    pub seller_id: String,
    pub brand: String,
    pub model: String,
    pub condition: String,
    pub price: MinorUnits,
    pub currency: String,
    pub images: Vec<String>,
}

/// The compare-and-set arguments for claiming a listing. The claim only succeeds when the listing is active and
/// carries no reservation that is still live at `now`.
#[derive(Debug, Clone)]
pub struct ReservationClaim {
    pub listing_id: String,
    pub buyer_id: String,
    pub order_id: OrderId,
    pub reserved_until: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

//--------------------------------------     RefundStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    ReturnRequested,
    ReturnReceived,
    Executed,
    Denied,
    /// Cancelled requests are deleted, so this status is never persisted. It appears in audit entries and events.
    Cancelled,
}

impl RefundStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::ReturnRequested | Self::ReturnReceived)
    }

    pub fn can_transition_to(&self, next: RefundStatus) -> bool {
        use RefundStatus::*;
        matches!(
            (self, next),
            (Pending, ReturnRequested | Denied | Cancelled) |
                (ReturnRequested, ReturnReceived | Denied | Cancelled) |
                (ReturnReceived, Executed | Denied)
        )
    }

    pub fn all() -> [RefundStatus; 6] {
        use RefundStatus::*;
        [Pending, ReturnRequested, ReturnReceived, Executed, Denied, Cancelled]
    }

    /// All statuses from which `next` may be reached.
    pub fn predecessors_of(next: RefundStatus) -> Vec<RefundStatus> {
        Self::all().into_iter().filter(|s| s.can_transition_to(next)).collect()
    }
}

impl Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::ReturnRequested => "return_requested",
            Self::ReturnReceived => "return_received",
            Self::Executed => "executed",
            Self::Denied => "denied",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

//--------------------------------------     RefundRequest     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RefundRequest {
    pub id: String,
    pub order_id: OrderId,
    pub buyer_id: String,
    pub seller_id: String,
    pub requested_amount: MinorUnits,
    pub original_transfer_amount: MinorUnits,
    pub currency: String,
    pub buyer_reason: String,
    pub seller_response_reason: Option<String>,
    pub product_returned: bool,
    pub return_tracking_number: Option<String>,
    pub product_return_confirmed: bool,
    pub status: RefundStatus,
    pub finix_transfer_id: String,
    pub finix_reversal_id: Option<String>,
    pub idempotency_id: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub denied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRefundRequest {
    pub id: String,
    pub order_id: OrderId,
    pub buyer_id: String,
    pub seller_id: String,
    pub requested_amount: MinorUnits,
    pub original_transfer_amount: MinorUnits,
    pub currency: String,
    pub buyer_reason: String,
    pub finix_transfer_id: String,
    pub idempotency_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct RefundUpdate {
    pub expected_status: Vec<RefundStatus>,
    pub status: Option<RefundStatus>,
    pub seller_response_reason: Option<String>,
    pub product_returned: Option<bool>,
    pub return_tracking_number: Option<String>,
    pub product_return_confirmed: Option<bool>,
    pub finix_reversal_id: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub denied_at: Option<DateTime<Utc>>,
}

impl RefundUpdate {
    pub fn transition(from: RefundStatus, to: RefundStatus) -> Self {
        Self { expected_status: vec![from], status: Some(to), ..Default::default() }
    }

    /// Same rules as [`OrderUpdate::status_guard`], against the refund transition table.
    pub fn status_guard(&self) -> Option<Vec<RefundStatus>> {
        let allowed = self.status.map(RefundStatus::predecessors_of);
        match (allowed, self.expected_status.is_empty()) {
            (None, true) => None,
            (None, false) => Some(self.expected_status.clone()),
            (Some(allowed), true) => Some(allowed),
            (Some(allowed), false) => {
                Some(self.expected_status.iter().copied().filter(|s| allowed.contains(s)).collect())
            },
        }
    }
}

//--------------------------------------        Actors         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Buyer,
    Seller,
    Admin,
    System,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buyer => write!(f, "buyer"),
            Self::Seller => write!(f, "seller"),
            Self::Admin => write!(f, "admin"),
            Self::System => write!(f, "system"),
        }
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buyer" => Ok(Self::Buyer),
            "seller" => Ok(Self::Seller),
            "admin" => Ok(Self::Admin),
            "system" => Ok(Self::System),
            s => Err(ConversionError(format!("Invalid role: {s}"))),
        }
    }
}

/// Whoever is invoking an operation. Identity is asserted by the caller; the engine only checks it against the
/// parties recorded on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new<S: Into<String>>(id: S, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    pub fn buyer<S: Into<String>>(id: S) -> Self {
        Self::new(id, Role::Buyer)
    }

    pub fn seller<S: Into<String>>(id: S) -> Self {
        Self::new(id, Role::Seller)
    }

    pub fn system() -> Self {
        Self::new("system", Role::System)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

//--------------------------------------       AuditLog        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AuditEntry {
    pub id: i64,
    pub actor_id: String,
    pub actor_role: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: Json<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor_id: String,
    pub actor_role: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: Value,
}

impl NewAuditEntry {
    pub fn new(actor: &Actor, action: &str, resource_type: &str, resource_id: &str, details: Value) -> Self {
        Self {
            actor_id: actor.id.clone(),
            actor_role: actor.role.to_string(),
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            details,
        }
    }
}

//--------------------------------------  MerchantOnboarding   ---------------------------------------------------------
pub const ONBOARDING_PROVISIONING: &str = "PROVISIONING";
pub const ONBOARDING_APPROVED: &str = "APPROVED";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MerchantOnboarding {
    pub id: i64,
    pub user_id: String,
    pub onboarding_form_id: Option<String>,
    pub identity_id: Option<String>,
    pub merchant_id: Option<String>,
    pub verification_id: Option<String>,
    pub verification_state: Option<String>,
    pub onboarding_state: String,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MerchantOnboarding {
    pub fn is_approved(&self) -> bool {
        self.onboarding_state == ONBOARDING_APPROVED && self.merchant_id.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OnboardingUpdate {
    pub merchant_id: Option<String>,
    pub verification_id: Option<String>,
    pub verification_state: Option<String>,
    pub onboarding_state: Option<String>,
    /// `Some(None)` explicitly clears the timestamp.
    pub verified_at: Option<Option<DateTime<Utc>>>,
}

//--------------------------------------     WebhookEvent      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct WebhookEvent {
    pub event_id: String,
    pub entity: String,
    pub event_type: String,
    pub payload: Json<Value>,
    pub status: WebhookEventStatus,
    pub attempts: i64,
    pub retryable: bool,
    pub last_error: Option<String>,
    pub outcome: Option<String>,
    pub received_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub event_id: String,
    pub entity: String,
    pub event_type: String,
    pub payload: Value,
}

//--------------------------------------      UserProfile      ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub user_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub address: Option<Json<PostalAddress>>,
    pub onboarding_address: Option<Json<PostalAddress>>,
}

#[cfg(test)]
mod test {
    use super::*;
    use OrderStatusType::*;

    #[test]
    fn order_edges() {
        assert!(Reserved.can_transition_to(Processing));
        assert!(Reserved.can_transition_to(Expired));
        assert!(Reserved.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Completed));
        assert!(Paid.can_transition_to(Refunded));
        assert!(Processing.can_transition_to(Refunded));

        assert!(!Reserved.can_transition_to(Paid));
        assert!(!Reserved.can_transition_to(Shipped));
        assert!(!Processing.can_transition_to(Shipped));
        assert!(!Paid.can_transition_to(Cancelled));
        assert!(!Shipped.can_transition_to(Paid));
        for terminal in [Expired, Cancelled, Refunded] {
            assert!(terminal.is_terminal());
            assert!(OrderStatusType::all().iter().all(|s| !terminal.can_transition_to(*s)), "{terminal} escapes");
        }
    }

    #[test]
    fn no_self_transitions() {
        for s in OrderStatusType::all() {
            assert!(!s.can_transition_to(s), "{s} -> {s}");
        }
    }

    #[test]
    fn shipped_is_only_reached_from_paid() {
        assert_eq!(OrderStatusType::predecessors_of(Shipped), vec![Paid]);
        assert_eq!(OrderStatusType::predecessors_of(Paid), vec![Processing]);
    }

    #[test]
    fn status_strings() {
        for s in OrderStatusType::all() {
            assert_eq!(s.to_string().parse::<OrderStatusType>().unwrap(), s);
        }
        assert!("New".parse::<OrderStatusType>().is_err());
    }

    #[test]
    fn refund_edges() {
        use RefundStatus::*;
        assert!(Pending.can_transition_to(ReturnRequested));
        assert!(ReturnRequested.can_transition_to(ReturnReceived));
        assert!(ReturnReceived.can_transition_to(Executed));
        assert!(ReturnReceived.can_transition_to(Denied));
        assert!(!ReturnReceived.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Executed));
        assert!(!Executed.can_transition_to(Denied));
        assert!(!Denied.is_active());
        assert_eq!(RefundStatus::predecessors_of(Cancelled), vec![Pending, ReturnRequested]);
    }

    #[test]
    fn status_writes_are_limited_to_table_edges() {
        assert_eq!(OrderUpdate::default().with_metadata(serde_json::json!({})).status_guard(), None);
        let ship = OrderUpdate { status: Some(Shipped), ..Default::default() };
        assert_eq!(ship.status_guard(), Some(vec![Paid]));
        let cancel = OrderUpdate { status: Some(Cancelled), ..Default::default() }.when_status_in(&[Reserved, Paid]);
        assert_eq!(cancel.status_guard(), Some(vec![Reserved]));
        // An edge that is not in the table can never apply
        assert_eq!(OrderUpdate::transition(Reserved, Paid).status_guard(), Some(vec![]));
        let ids_only = OrderUpdate::default().claiming_transfer("TR1").when_status_in(&[Processing]);
        assert_eq!(ids_only.status_guard(), Some(vec![Processing]));
        assert_eq!(ids_only.transfer_unset_or.as_deref(), Some("TR1"));

        use RefundStatus as R;
        let deny = RefundUpdate { status: Some(R::Denied), ..Default::default() };
        assert_eq!(deny.status_guard(), Some(vec![R::Pending, R::ReturnRequested, R::ReturnReceived]));
        assert_eq!(RefundUpdate::transition(R::Pending, R::Executed).status_guard(), Some(vec![]));
    }

    #[test]
    fn address_merge_prefers_first() {
        let overrides = PostalAddress { postal_code: Some("94107".into()), line1: Some(" ".into()), ..Default::default() };
        let profile = PostalAddress {
            line1: Some("1 Main St".into()),
            postal_code: Some("10001".into()),
            country: Some("USA".into()),
            ..Default::default()
        };
        let merged = overrides.or(&profile);
        assert_eq!(merged.postal_code.as_deref(), Some("94107"));
        assert_eq!(merged.line1.as_deref(), Some("1 Main St"));
        assert_eq!(merged.country.as_deref(), Some("USA"));
        assert!(PostalAddress::default().is_empty());
    }
}
