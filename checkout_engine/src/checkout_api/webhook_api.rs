use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::{
    checkout_api::{
        errors::CheckoutError,
        webhook_objects::{
            MerchantPayload,
            OnboardingFormPayload,
            TransferPayload,
            VerificationPayload,
            WebhookEnvelope,
            WebhookOutcome,
        },
    },
    db_types::{
        Actor,
        NewAuditEntry,
        OnboardingUpdate,
        Order,
        OrderStatusType,
        OrderUpdate,
        RefundRequest,
        WebhookEvent,
        WebhookEventStatus,
    },
    events::{EventProducers, OrderAnnulledEvent, OrderPaidEvent},
    helpers::classify_failure,
    traits::{
        gateway_objects::GatewayState,
        AuditLog,
        ListingManagement,
        MerchantManagement,
        OrderManagement,
        RefundManagement,
        WebhookEventManagement,
    },
};

pub const DEFAULT_MAX_WEBHOOK_ATTEMPTS: i64 = 5;
/// How long an event may sit in `pending` or `processing` before the retry sweep takes it over.
pub const DEFAULT_PROCESSING_LEASE_SECS: i64 = 300;

/// The result of accepting a webhook delivery.
#[derive(Debug, Clone)]
pub struct WebhookReceipt {
    pub event: WebhookEvent,
    /// False when the processor re-delivered an event id we already hold.
    pub is_new: bool,
}

impl WebhookReceipt {
    /// Whether the event should be handed to [`WebhookApi::process_event`].
    pub fn needs_processing(&self) -> bool {
        self.event.status == WebhookEventStatus::Pending
    }
}

/// `WebhookApi` reconciles local state with the processor's asynchronous events.
///
/// Accepting and processing are split. [`WebhookApi::receive`] only records the event so that the HTTP layer can
/// answer the processor immediately. [`WebhookApi::process_event`] claims the event record (at most one worker can
/// hold it), runs the handler and records the outcome. Handlers re-read everything they need from the payload and the
/// current order, so events can be processed in any order and any number of times.
///
/// The `paid` status is only ever set here.
pub struct WebhookApi<B> {
    db: B,
    producers: EventProducers,
    max_attempts: i64,
    processing_lease: Duration,
}

impl<B> Debug for WebhookApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebhookApi (max attempts: {}, lease: {}s)", self.max_attempts, self.processing_lease.num_seconds())
    }
}

impl<B> WebhookApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self {
            db,
            producers,
            max_attempts: DEFAULT_MAX_WEBHOOK_ATTEMPTS,
            processing_lease: Duration::seconds(DEFAULT_PROCESSING_LEASE_SECS),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: i64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Events left `pending` or `processing` for longer than `lease` are assumed abandoned (e.g. the process died
    /// mid-handler) and become claimable again.
    pub fn with_processing_lease(mut self, lease: Duration) -> Self {
        self.processing_lease = lease.max(Duration::zero());
        self
    }

    pub fn max_attempts(&self) -> i64 {
        self.max_attempts
    }

    fn stale_before(&self) -> chrono::DateTime<Utc> {
        Utc::now() - self.processing_lease
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> WebhookApi<B>
where B: OrderManagement
        + ListingManagement
        + RefundManagement
        + MerchantManagement
        + AuditLog
        + WebhookEventManagement
{
    /// Validates the envelope and stores the event. Re-deliveries of a known event id return the stored record.
    pub async fn receive(&self, payload: Value) -> Result<WebhookReceipt, CheckoutError> {
        let envelope = WebhookEnvelope::from_value(&payload).map_err(CheckoutError::Validation)?;
        let (event, is_new) = self.db.record_webhook_event(envelope.to_new_event(payload)).await?;
        if is_new {
            debug!("🪝️ Recorded webhook event {} ({})", event.event_id, event.event_type);
        } else {
            debug!("🪝️ Webhook event {} re-delivered. It is {:?}.", event.event_id, event.status);
        }
        Ok(WebhookReceipt { event, is_new })
    }

    /// Claims and processes a recorded event.
    ///
    /// Returns `None` if the event could not be claimed (already processed, held by another worker, or out of
    /// attempts). Handler failures are recorded on the event and returned as the failed record rather than as an
    /// error; only storage failures around the claim itself are errors.
    pub async fn process_event(&self, event_id: &str) -> Result<Option<WebhookEvent>, CheckoutError> {
        let Some(event) = self.db.claim_webhook_event(event_id, self.max_attempts, self.stale_before()).await? else {
            debug!("🪝️ Webhook event {event_id} is not claimable. Skipping.");
            return Ok(None);
        };
        trace!("🪝️ Processing webhook event {event_id} (attempt {})", event.attempts);
        let result = self.dispatch(&event).await;
        let event = match result {
            Ok(outcome) => {
                let outcome = outcome.as_outcome();
                info!("🪝️ Webhook event {event_id} ({}) processed: {outcome}", event.event_type);
                self.db.complete_webhook_event(event_id, &outcome).await?
            },
            Err(e) => {
                let retryable = e.is_retryable();
                if retryable && event.attempts < self.max_attempts {
                    warn!("🪝️ Webhook event {event_id} failed on attempt {}. Will retry. {e}", event.attempts);
                } else {
                    error!("🪝️ Webhook event {event_id} failed permanently after {} attempt(s). {e}", event.attempts);
                }
                self.db.fail_webhook_event(event_id, &e.to_string(), retryable).await?
            },
        };
        Ok(Some(event))
    }

    /// Re-processes failed, retryable events, and events abandoned in `pending` or `processing` for longer than the
    /// processing lease. Returns the number of events that are now processed.
    pub async fn retry_failed(&self, limit: i64) -> Result<usize, CheckoutError> {
        let events = self.db.fetch_retryable_webhook_events(self.max_attempts, self.stale_before(), limit).await?;
        if events.is_empty() {
            return Ok(0);
        }
        debug!("🪝️ Retrying {} outstanding webhook event(s)", events.len());
        let mut processed = 0;
        for event in events {
            if let Some(e) = self.process_event(&event.event_id).await? {
                if e.status == WebhookEventStatus::Processed {
                    processed += 1;
                }
            }
        }
        Ok(processed)
    }

    async fn dispatch(&self, event: &WebhookEvent) -> Result<WebhookOutcome, CheckoutError> {
        let envelope = WebhookEnvelope::from_value(&event.payload.0).map_err(CheckoutError::Validation)?;
        let id = event.event_id.as_str();
        match envelope.kind().as_str() {
            "transfer.created" => self.on_transfer_created(id, embedded(&envelope)?).await,
            "transfer.updated" => self.on_transfer_updated(id, embedded(&envelope)?).await,
            "merchant.created" | "merchant.updated" => self.on_merchant(embedded(&envelope)?).await,
            "verification.created" | "verification.updated" => self.on_verification(embedded(&envelope)?).await,
            "onboarding_form.created" | "onboarding_form.updated" => {
                self.on_onboarding_form(embedded(&envelope)?).await
            },
            other => {
                debug!("🪝️ No handler for webhook event type {other}");
                Ok(WebhookOutcome::Ignored)
            },
        }
    }

    //------------------------------------------   Transfers   ----------------------------------------------------
    async fn on_transfer_created(
        &self,
        event_id: &str,
        transfer: TransferPayload,
    ) -> Result<WebhookOutcome, CheckoutError> {
        if let Some(refund) = self.reversal_refund(&transfer).await? {
            return self.record_reversal(event_id, &refund, &transfer).await;
        }
        let mut order = None;
        if let Some(auth_id) = transfer.authorization_id() {
            order = self.db.fetch_order_by_authorization_id(auth_id).await?;
        }
        if order.is_none() {
            if let Some(instrument_id) = transfer.source.as_deref().filter(|s| !s.is_empty()) {
                order = self.db.fetch_order_by_instrument_id(instrument_id).await?;
            }
        }
        let Some(order) = order else {
            info!("🪝️ transfer.created for {} does not match any order yet", transfer.id);
            return Ok(WebhookOutcome::OrderNotFound);
        };

        if order.status == OrderStatusType::Reserved {
            let update = OrderUpdate::transition(OrderStatusType::Reserved, OrderStatusType::Processing)
                .claiming_transfer(&transfer.id)
                .with_metadata(json!({ "transfer_state": transfer.gateway_state() }));
            if let Some(updated) = self.db.update_order(&order.id, update).await? {
                if !self.db.hold_for_sale(&updated.listing_id, updated.id.as_str()).await? {
                    warn!("🪝️ Listing {} is no longer held by order {}", updated.listing_id, updated.id);
                }
                info!("🪝️ Order {} is processing (transfer {})", updated.id, transfer.id);
                return Ok(WebhookOutcome::Applied("order processing".into()));
            }
            return Err(CheckoutError::Conflict(format!("Order {} changed while applying transfer.created", order.id)));
        }
        match order.finix_transfer_id.as_deref() {
            Some(id) if id == transfer.id => Ok(WebhookOutcome::NoChange("transfer already recorded".into())),
            Some(other) => {
                warn!("🪝️ Order {} already references transfer {other}. Ignoring transfer {}.", order.id, transfer.id);
                Ok(WebhookOutcome::NoChange("order references another transfer".into()))
            },
            None => {
                let update = OrderUpdate::default().claiming_transfer(&transfer.id);
                if self.db.update_order(&order.id, update).await?.is_none() {
                    return Err(CheckoutError::Retryable(format!(
                        "Order {} picked up another transfer while recording {}",
                        order.id, transfer.id
                    )));
                }
                debug!("🪝️ Recorded transfer {} on order {} ({})", transfer.id, order.id, order.status);
                Ok(WebhookOutcome::Applied("transfer id recorded".into()))
            },
        }
    }

    async fn on_transfer_updated(
        &self,
        event_id: &str,
        transfer: TransferPayload,
    ) -> Result<WebhookOutcome, CheckoutError> {
        if let Some(refund) = self.reversal_refund(&transfer).await? {
            return self.record_reversal(event_id, &refund, &transfer).await;
        }
        let Some(order) = self.db.fetch_order_by_transfer_id(&transfer.id).await? else {
            return Err(CheckoutError::Retryable(format!(
                "No order references transfer {} yet. The payment pipeline may not have stored it.",
                transfer.id
            )));
        };
        match transfer.gateway_state() {
            GatewayState::Succeeded => self.transfer_succeeded(event_id, order, &transfer).await,
            GatewayState::Failed | GatewayState::Canceled => self.transfer_failed(order, &transfer).await,
            state => {
                debug!("🪝️ Transfer {} for order {} is {state}. Nothing to do.", transfer.id, order.id);
                Ok(WebhookOutcome::NoChange(format!("transfer {state}")))
            },
        }
    }

    async fn transfer_succeeded(
        &self,
        event_id: &str,
        mut order: Order,
        transfer: &TransferPayload,
    ) -> Result<WebhookOutcome, CheckoutError> {
        use OrderStatusType::*;
        match order.status {
            Paid | Shipped | Completed | Refunded => {
                return Ok(WebhookOutcome::NoChange(format!("order already {}", order.status)));
            },
            Expired | Cancelled => {
                error!(
                    "🪝️ Transfer {} succeeded for order {}, which is {}. The funds need manual attention.",
                    transfer.id, order.id, order.status
                );
                let details = json!({ "transfer_id": transfer.id, "order_status": order.status, "event_id": event_id });
                let action = "payment.settled_on_closed_order";
                let entry = NewAuditEntry::new(&Actor::system(), action, "order", order.id.as_str(), details);
                self.db.append_audit_entry(entry).await?;
                return Ok(WebhookOutcome::NoChange(format!("order is {}", order.status)));
            },
            Reserved => {
                let update = OrderUpdate::transition(Reserved, Processing);
                order = self.apply(&order, update).await?;
            },
            Processing => {},
        }
        let update = OrderUpdate { paid_at: Some(Utc::now()), ..OrderUpdate::transition(Processing, Paid) }
            .with_metadata(json!({ "transfer_state": GatewayState::Succeeded }));
        let order = self.apply(&order, update).await?;
        if !self.db.mark_sold(&order.listing_id, order.id.as_str()).await? {
            warn!("🪝️ Listing {} could not be marked sold for order {}", order.listing_id, order.id);
        }
        info!("🪝️ Order {} is paid (transfer {})", order.id, transfer.id);
        self.producers.publish_order_paid(OrderPaidEvent::new(order)).await;
        Ok(WebhookOutcome::Applied("order paid".into()))
    }

    async fn transfer_failed(&self, order: Order, transfer: &TransferPayload) -> Result<WebhookOutcome, CheckoutError> {
        if !matches!(order.status, OrderStatusType::Reserved | OrderStatusType::Processing) {
            warn!("🪝️ Transfer {} failed but order {} is {}. Leaving it alone.", transfer.id, order.id, order.status);
            return Ok(WebhookOutcome::NoChange(format!("order is {}", order.status)));
        }
        let message = transfer.failure_message.clone().unwrap_or_else(|| "The transfer failed".into());
        let code = classify_failure(transfer.failure_code.as_deref(), &message);
        let update = OrderUpdate {
            status: Some(OrderStatusType::Cancelled),
            cancelled_at: Some(Utc::now()),
            ..Default::default()
        }
        .when_status_in(&[order.status])
        .with_metadata(json!({
            "transfer_state": transfer.gateway_state(),
            "payment_failure": {
                "failure_code": code,
                "message": message,
                "processor_code": transfer.failure_code,
                "transfer_id": transfer.id,
            },
        }));
        let cancelled = self.apply(&order, update).await?;
        if !self.db.release_reservation(&cancelled.listing_id, cancelled.id.as_str()).await? {
            debug!("🪝️ Listing {} was not held by order {}", cancelled.listing_id, cancelled.id);
        }
        info!("🪝️ Transfer {} {}. Order {} cancelled ({code}).", transfer.id, transfer.gateway_state(), cancelled.id);
        self.producers.publish_order_annulled(OrderAnnulledEvent::new(cancelled)).await;
        Ok(WebhookOutcome::Applied("order cancelled".into()))
    }

    async fn reversal_refund(&self, transfer: &TransferPayload) -> Result<Option<RefundRequest>, CheckoutError> {
        let refund = self.db.fetch_refund_by_reversal_id(&transfer.id).await?;
        if refund.is_none() && transfer.is_reversal() {
            return Err(CheckoutError::Retryable(format!("No refund references reversal {} yet", transfer.id)));
        }
        Ok(refund)
    }

    async fn record_reversal(
        &self,
        event_id: &str,
        refund: &RefundRequest,
        transfer: &TransferPayload,
    ) -> Result<WebhookOutcome, CheckoutError> {
        let details = json!({
            "order_id": refund.order_id,
            "reversal_id": transfer.id,
            "state": transfer.gateway_state(),
            "amount": transfer.amount,
            "failure_code": transfer.failure_code,
            "event_id": event_id,
        });
        let action = "refund.reversal_updated";
        let entry = NewAuditEntry::new(&Actor::system(), action, "refund_request", &refund.id, details);
        self.db.append_audit_entry(entry).await?;
        info!("🪝️ Reversal {} for refund {} is {}", transfer.id, refund.id, transfer.gateway_state());
        Ok(WebhookOutcome::Applied("reversal state recorded".into()))
    }

    async fn apply(&self, order: &Order, update: OrderUpdate) -> Result<Order, CheckoutError> {
        self.db.update_order(&order.id, update).await?.ok_or_else(|| {
            CheckoutError::Conflict(format!("Order {} changed from {} while applying a webhook", order.id, order.status))
        })
    }

    //------------------------------------------   Merchants   ----------------------------------------------------
    async fn on_merchant(&self, merchant: MerchantPayload) -> Result<WebhookOutcome, CheckoutError> {
        let Some(onboarding) = self.db.fetch_onboarding_by_identity(&merchant.identity).await? else {
            return Err(CheckoutError::Retryable(format!(
                "No onboarding record for identity {} yet (merchant {})",
                merchant.identity, merchant.id
            )));
        };
        let update = OnboardingUpdate {
            merchant_id: Some(merchant.id.clone()),
            verification_id: merchant.verification.clone(),
            onboarding_state: merchant.onboarding_state.clone(),
            ..Default::default()
        };
        let updated = self.db.update_onboarding(onboarding.id, update).await?;
        info!(
            "🪝️ Merchant {} recorded for user {}. Onboarding state: {}",
            merchant.id, updated.user_id, updated.onboarding_state
        );
        Ok(WebhookOutcome::Applied("merchant recorded".into()))
    }

    async fn on_verification(&self, verification: VerificationPayload) -> Result<WebhookOutcome, CheckoutError> {
        let Some(identity_id) = verification.identity.as_deref().filter(|s| !s.is_empty()) else {
            return Ok(WebhookOutcome::NoChange("not an identity verification".into()));
        };
        let Some(onboarding) = self.db.fetch_onboarding_by_identity(identity_id).await? else {
            return Err(CheckoutError::Retryable(format!("No onboarding record for identity {identity_id} yet")));
        };
        let state = GatewayState::parse(&verification.state);
        let verified_at = match state {
            GatewayState::Succeeded => Some(Some(Utc::now())),
            GatewayState::Failed => Some(None),
            _ => None,
        };
        let update = OnboardingUpdate {
            verification_id: Some(verification.id.clone()),
            verification_state: Some(state.to_string()),
            verified_at,
            ..Default::default()
        };
        self.db.update_onboarding(onboarding.id, update).await?;
        info!("🪝️ Verification {} for user {} is {state}", verification.id, onboarding.user_id);
        Ok(WebhookOutcome::Applied(format!("verification {state}")))
    }

    async fn on_onboarding_form(&self, form: OnboardingFormPayload) -> Result<WebhookOutcome, CheckoutError> {
        if !form.is_completed() {
            return Ok(WebhookOutcome::NoChange(format!("onboarding form is {}", form.status)));
        }
        let user_id = form
            .user_id()
            .ok_or_else(|| CheckoutError::Validation(format!("Onboarding form {} has no user_id tag", form.id)))?;
        let identity_id = form
            .identity_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CheckoutError::Validation(format!("Completed onboarding form {} has no identity", form.id)))?;
        let onboarding = self.db.upsert_onboarding_form(user_id, &form.id, identity_id).await?;
        info!("🪝️ Onboarding form {} completed for user {user_id}. Now {}.", form.id, onboarding.onboarding_state);
        Ok(WebhookOutcome::Applied("onboarding provisioning".into()))
    }
}

fn embedded<T: DeserializeOwned>(envelope: &WebhookEnvelope) -> Result<T, CheckoutError> {
    envelope.first_entity().map_err(CheckoutError::Validation)
}
