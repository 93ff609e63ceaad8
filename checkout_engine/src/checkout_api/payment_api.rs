use std::{collections::HashMap, fmt::Debug};

use chrono::Utc;
use log::*;
use serde_json::json;

use crate::{
    checkout_api::{
        errors::{CheckoutError, PaymentFailure},
        guards::{ensure_reservation_live, require_buyer},
        order_objects::{PaymentSource, PrefillOverrides, TokenizationConfig},
    },
    db_types::{Actor, NewAuditEntry, Order, OrderId, OrderStatusType, OrderUpdate, PaymentMethod, PostalAddress},
    events::{EventProducers, PaymentSubmittedEvent},
    helpers::{derive_key, effective_currency, validate_idempotency_id, FailureCode, PipelineStep},
    traits::{
        gateway_objects::{
            AddressCheck,
            BankAccountCheck,
            BuyerIdentityRequest,
            ChargeRequest,
            GatewayInstrument,
            GatewayState,
            InstrumentKind,
            InstrumentRequest,
            SecurityCodeCheck,
            Tags,
        },
        AuditLog,
        ListingManagement,
        MerchantManagement,
        OrderManagement,
        PaymentGateway,
        UserDirectory,
    },
};

/// `CheckoutApi` drives an order from `reserved` to `processing`: it sets up the buyer's processor identity, mints or
/// fetches the payment instrument, and authorizes and captures (or directly debits) the order amount.
///
/// It never marks an order `paid`. Only a `transfer.updated` webhook does that.
pub struct CheckoutApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
}

impl<B, G> Debug for CheckoutApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi")
    }
}

impl<B, G> CheckoutApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        Self { db, gateway, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }
}

/// Carries the ids obtained so far through the pipeline, so that a failure can report them.
#[derive(Debug, Default)]
struct PipelineProgress {
    instrument_id: Option<String>,
    authorization_id: Option<String>,
    transfer_id: Option<String>,
}

impl PipelineProgress {
    fn fail(&self, failure: PaymentFailure) -> PaymentFailure {
        failure
            .with_instrument(self.instrument_id.as_deref())
            .with_authorization(self.authorization_id.as_deref())
            .with_transfer(self.transfer_id.as_deref())
    }
}

impl<B, G> CheckoutApi<B, G>
where
    B: OrderManagement + ListingManagement + MerchantManagement + UserDirectory + AuditLog,
    G: PaymentGateway,
{
    pub async fn tokenization_config(
        &self,
        order_id: &OrderId,
        buyer_id: &str,
        idempotency_id: &str,
        overrides: PrefillOverrides,
    ) -> Result<TokenizationConfig, CheckoutError> {
        validate_idempotency_id(idempotency_id).map_err(CheckoutError::Validation)?;
        let order = self.fetch_order(order_id).await?;
        require_buyer(&order, buyer_id)?;
        let order = ensure_reservation_live(&self.db, &self.producers, order, Utc::now()).await?;
        if order.status != OrderStatusType::Reserved {
            return Err(CheckoutError::Validation(format!(
                "Order {order_id} is {} and is not awaiting payment",
                order.status
            )));
        }
        let profile = self.db.fetch_user_profile(buyer_id).await?.unwrap_or_default();

        let identity_id = match &order.finix_buyer_identity_id {
            Some(id) => {
                trace!("💳️ Reusing buyer identity {id} for order {order_id}");
                id.clone()
            },
            None => {
                let fallback = profile.address.as_ref().map(|a| a.0.clone()).unwrap_or_default();
                let onboarding = profile.onboarding_address.as_ref().map(|a| a.0.clone()).unwrap_or_default();
                let address = overrides.address.clone().unwrap_or_default().or(&onboarding).or(&fallback);
                let request = BuyerIdentityRequest {
                    first_name: overrides.first_name.clone().or_else(|| profile.first_name.clone()),
                    last_name: overrides.last_name.clone().or_else(|| profile.last_name.clone()),
                    email: overrides.email.clone().or_else(|| profile.email.clone()),
                    phone: overrides.phone.clone().or_else(|| profile.phone.clone()),
                    address,
                    tags: order_tags(&order),
                };
                let key = derive_key(idempotency_id, PipelineStep::Identity);
                let identity = self
                    .gateway
                    .create_buyer_identity(request, &key)
                    .await
                    .map_err(|e| CheckoutError::Payment(PaymentFailure::from_gateway(&e)))?;
                info!("💳️ Created buyer identity {} for order {order_id}", identity.id);
                let update = OrderUpdate { finix_buyer_identity_id: Some(identity.id.clone()), ..Default::default() }
                    .when_status_in(&[OrderStatusType::Reserved]);
                match self.db.update_order(order_id, update).await? {
                    Some(_) => identity.id,
                    None => {
                        let current = self.fetch_order(order_id).await?;
                        current.finix_buyer_identity_id.ok_or_else(|| {
                            CheckoutError::Conflict(format!("Order {order_id} changed while creating the buyer identity"))
                        })?
                    },
                }
            },
        };

        let requested = overrides.currency.as_deref();
        let currency = effective_currency(requested, profile.country.as_deref(), &order.currency);
        if currency != order.currency {
            debug!("💳️ Settlement currency for order {order_id} changed from {} to {currency}", order.currency);
            let update = OrderUpdate { currency: Some(currency.clone()), ..Default::default() }
                .when_status_in(&[OrderStatusType::Reserved]);
            if self.db.update_order(order_id, update).await?.is_none() {
                return Err(CheckoutError::Conflict(format!("Order {order_id} changed while updating its currency")));
            }
        }

        Ok(TokenizationConfig {
            order_id: order.id.clone(),
            application_id: self.gateway.application_id().to_string(),
            environment: self.gateway.environment().to_string(),
            buyer_identity_id: identity_id,
            fraud_session_id: order.fraud_session_id.clone(),
            amount: order.amount,
            currency,
        })
    }

    /// Runs the payment pipeline and returns the order in `processing`.
    ///
    /// Every processor call carries a key derived from `idempotency_id`, so a buyer retrying with the same id can
    /// never be charged twice. On a payment failure the order keeps its status and the failure is recorded in its
    /// metadata under `last_payment_failure`.
    pub async fn process_payment(
        &self,
        order_id: &OrderId,
        buyer_id: &str,
        idempotency_id: &str,
        source: PaymentSource,
    ) -> Result<Order, CheckoutError> {
        validate_idempotency_id(idempotency_id).map_err(CheckoutError::Validation)?;
        let order = self.fetch_order(order_id).await?;
        require_buyer(&order, buyer_id)?;
        let order = ensure_reservation_live(&self.db, &self.producers, order, Utc::now()).await?;
        match order.status {
            OrderStatusType::Reserved => {},
            OrderStatusType::Paid | OrderStatusType::Shipped | OrderStatusType::Completed => {
                return Err(CheckoutError::Validation(format!("Order {order_id} has already been paid")));
            },
            OrderStatusType::Processing => {
                return Err(CheckoutError::Validation(format!(
                    "A payment for order {order_id} has already been submitted"
                )));
            },
            s => return Err(CheckoutError::Validation(format!("Order {order_id} is {s} and cannot be paid"))),
        }
        let identity_id = order.finix_buyer_identity_id.clone().ok_or_else(|| {
            CheckoutError::Validation(format!(
                "Order {order_id} has no buyer identity yet. Request a tokenization config first."
            ))
        })?;
        let merchant = self.db.fetch_approved_merchant(&order.seller_id).await?;
        let Some(merchant_id) = merchant.and_then(|m| m.merchant_id) else {
            return Err(CheckoutError::Validation(
                "The seller's merchant account is not approved to accept payments yet".into(),
            ));
        };

        let mut progress = PipelineProgress::default();
        let result = self.run_pipeline(&order, &identity_id, &merchant_id, idempotency_id, &source, &mut progress).await;
        match result {
            Ok(update) => self.complete_submission(order, update, &progress, idempotency_id).await,
            Err(CheckoutError::Payment(failure)) => {
                let failure = progress.fail(failure);
                self.record_failure(&order, &failure).await;
                Err(CheckoutError::Payment(failure))
            },
            Err(e) => Err(e),
        }
    }

    /// Exposes the processor's authorization void for administrators. Order status is not changed.
    pub async fn void_authorization(&self, order_id: &OrderId, actor: &Actor) -> Result<Order, CheckoutError> {
        if !actor.is_admin() {
            return Err(CheckoutError::Authorization("Only administrators can void authorizations".into()));
        }
        let order = self.fetch_order(order_id).await?;
        let auth_id = order
            .finix_authorization_id
            .clone()
            .ok_or_else(|| CheckoutError::Validation(format!("Order {order_id} has no authorization to void")))?;
        let key = derive_key(&auth_id, PipelineStep::Void);
        let voided = self
            .gateway
            .void_authorization(&auth_id, &key)
            .await
            .map_err(|e| CheckoutError::Payment(PaymentFailure::from_gateway(&e).with_authorization(Some(&auth_id))))?;
        info!("💳️ Authorization {auth_id} for order {order_id} voided by {}. State: {}", actor.id, voided.state);
        let details = json!({ "authorization_id": auth_id, "state": voided.state.to_string() });
        let entry = NewAuditEntry::new(actor, "authorization.voided", "order", order_id.as_str(), details);
        self.db.append_audit_entry(entry).await?;
        let update = OrderUpdate::default().with_metadata(json!({ "authorization_voided_at": Utc::now() }));
        self.db.update_order(order_id, update).await?.ok_or_else(|| CheckoutError::not_found("Order", order_id.as_str()))
    }

    async fn run_pipeline(
        &self,
        order: &Order,
        identity_id: &str,
        merchant_id: &str,
        idempotency_id: &str,
        source: &PaymentSource,
        progress: &mut PipelineProgress,
    ) -> Result<OrderUpdate, CheckoutError> {
        let mut tags = order_tags(order);
        tags.insert("source_type".to_string(), source.source_type().to_string());

        let instrument = self.resolve_instrument(order, identity_id, idempotency_id, source, tags.clone()).await?;
        progress.instrument_id = Some(instrument.id.clone());
        let payment_method = match (instrument.kind, source) {
            (InstrumentKind::BankAccount, _) => PaymentMethod::Bank,
            (_, PaymentSource::Token { .. }) => PaymentMethod::Token,
            (_, PaymentSource::SavedInstrument { .. }) => PaymentMethod::Card,
        };
        let update = OrderUpdate {
            finix_payment_instrument_id: Some(instrument.id.clone()),
            payment_method: Some(payment_method),
            ..Default::default()
        }
        .when_status_in(&[OrderStatusType::Reserved]);
        if self.db.update_order(&order.id, update).await?.is_none() {
            return Err(self.order_moved(&order.id, "its payment instrument was being recorded").await);
        }
        check_verification(&instrument)?;

        let charge = ChargeRequest {
            merchant_id: merchant_id.to_string(),
            instrument_id: instrument.id.clone(),
            amount: order.amount,
            currency: order.currency.clone(),
            fraud_session_id: order.fraud_session_id.clone(),
            tags,
        };
        let (transfer_id, transfer_state) = if instrument.kind == InstrumentKind::BankAccount {
            let key = derive_key(idempotency_id, PipelineStep::Transfer);
            let transfer = self.gateway.create_transfer(charge, &key).await.map_err(gateway_failure)?;
            progress.transfer_id = Some(transfer.id.clone());
            debug!("💳️ Direct debit {} for order {} is {}", transfer.id, order.id, transfer.state);
            if matches!(transfer.state, GatewayState::Failed | GatewayState::Canceled) {
                return Err(declined(transfer.failure_code.as_deref(), transfer.failure_message.as_deref()));
            }
            let claim = OrderUpdate::default().claiming_transfer(&transfer.id).when_status_in(&[OrderStatusType::Reserved]);
            if self.db.update_order(&order.id, claim).await?.is_none() {
                self.unwind(order, progress, idempotency_id).await;
                return Err(self.order_moved(&order.id, "its direct debit was being submitted").await);
            }
            (Some(transfer.id), transfer.state)
        } else {
            let key = derive_key(idempotency_id, PipelineStep::Authorize);
            let auth = self.gateway.authorize_payment(charge, &key).await.map_err(gateway_failure)?;
            progress.authorization_id = Some(auth.id.clone());
            debug!("💳️ Authorization {} for order {} is {}", auth.id, order.id, auth.state);
            if matches!(auth.state, GatewayState::Failed | GatewayState::Canceled) {
                return Err(declined(auth.failure_code.as_deref(), auth.failure_message.as_deref()));
            }
            // Only one authorization may own the order. A concurrent run with another key, or a cancellation, loses
            // its hold here before anything is captured.
            let claim = OrderUpdate::default().claiming_authorization(&auth.id).when_status_in(&[OrderStatusType::Reserved]);
            if self.db.update_order(&order.id, claim).await?.is_none() {
                self.unwind(order, progress, idempotency_id).await;
                return Err(self.order_moved(&order.id, "its payment was being authorized").await);
            }

            let key = derive_key(idempotency_id, PipelineStep::Capture);
            let captured = self.gateway.capture_payment(&auth.id, auth.amount, &key).await.map_err(gateway_failure)?;
            progress.transfer_id = captured.transfer_id.clone();
            debug!("💳️ Capture of {} for order {} is {}", auth.id, order.id, captured.state);
            if matches!(captured.state, GatewayState::Failed | GatewayState::Canceled) {
                self.release_authorization(order, &auth.id, idempotency_id).await;
                return Err(declined(captured.failure_code.as_deref(), captured.failure_message.as_deref()));
            }
            (captured.transfer_id, captured.state)
        };

        let mut update = OrderUpdate {
            status: Some(OrderStatusType::Processing),
            finix_payment_instrument_id: progress.instrument_id.clone(),
            payment_method: Some(payment_method),
            metadata_patch: Some(json!({
                "transfer_state": transfer_state.to_string(),
                "payment_source": source.source_type(),
                "payment_submitted_at": Utc::now(),
                "last_payment_failure": null,
            })),
            ..Default::default()
        }
        .when_status_in(&[OrderStatusType::Reserved]);
        if let Some(auth_id) = &progress.authorization_id {
            update = update.claiming_authorization(auth_id);
        }
        if let Some(transfer_id) = &transfer_id {
            update = update.claiming_transfer(transfer_id);
        }
        Ok(update)
    }

    async fn resolve_instrument(
        &self,
        order: &Order,
        identity_id: &str,
        idempotency_id: &str,
        source: &PaymentSource,
        tags: Tags,
    ) -> Result<GatewayInstrument, CheckoutError> {
        match source {
            PaymentSource::Token { token, address } => {
                let request = InstrumentRequest {
                    token: token.clone(),
                    identity_id: identity_id.to_string(),
                    address: address.clone().filter(|a: &PostalAddress| !a.is_empty()),
                    fraud_session_id: order.fraud_session_id.clone(),
                    tags,
                };
                let key = derive_key(idempotency_id, PipelineStep::Instrument);
                let instrument = self.gateway.create_payment_instrument(request, &key).await.map_err(gateway_failure)?;
                debug!("💳️ Payment instrument {} minted for order {}", instrument.id, order.id);
                Ok(instrument)
            },
            PaymentSource::SavedInstrument { instrument_id } => {
                let instrument = self.gateway.get_payment_instrument(instrument_id).await.map_err(|e| {
                    if e.is_not_found() {
                        CheckoutError::not_found("Payment instrument", instrument_id.as_str())
                    } else {
                        gateway_failure(e)
                    }
                })?;
                if instrument.identity_id.as_deref().is_some_and(|id| id != identity_id) {
                    return Err(CheckoutError::Authorization(format!(
                        "Payment instrument {instrument_id} does not belong to this buyer"
                    )));
                }
                Ok(instrument)
            },
        }
    }

    async fn complete_submission(
        &self,
        order: Order,
        update: OrderUpdate,
        progress: &PipelineProgress,
        idempotency_id: &str,
    ) -> Result<Order, CheckoutError> {
        let order_id = order.id.clone();
        let submitted = match self.db.update_order(&order_id, update.clone()).await? {
            Some(o) => o,
            None => {
                // A webhook can overtake the synchronous pipeline. Keep its status and merge the ids, as long as the
                // order still points at this run's authorization and transfer.
                let merge = OrderUpdate { status: None, metadata_patch: None, expected_status: Vec::new(), ..update }
                    .when_status_in(&[OrderStatusType::Processing, OrderStatusType::Paid]);
                match self.db.update_order(&order_id, merge).await? {
                    Some(current) => {
                        info!("💳️ Order {order_id} was already {} when the payment pipeline finished", current.status);
                        current
                    },
                    None => {
                        self.unwind(&order, progress, idempotency_id).await;
                        return Err(self.order_moved(&order_id, "its payment was being submitted").await);
                    },
                }
            },
        };
        if !self.db.hold_for_sale(&submitted.listing_id, order_id.as_str()).await? {
            warn!("💳️ Listing {} could not be held for order {order_id}", submitted.listing_id);
        }
        info!("💳️ Payment for order {order_id} submitted. Transfer: {:?}", submitted.finix_transfer_id);
        self.producers.publish_payment_submitted(PaymentSubmittedEvent::new(submitted.clone())).await;
        Ok(submitted)
    }

    /// Gives back whatever this run took from the buyer after it lost the order: the captured transfer is reversed in
    /// full, or an uncaptured authorization is voided. Failures are logged and audited for manual follow-up.
    async fn unwind(&self, order: &Order, progress: &PipelineProgress, idempotency_id: &str) {
        if let Some(transfer_id) = &progress.transfer_id {
            let key = derive_key(idempotency_id, PipelineStep::Unwind);
            let tags = order_tags(order);
            let result = self.gateway.create_transfer_reversal(transfer_id, order.amount, tags, &key).await;
            let details = match result {
                Ok(reversal) => {
                    warn!("💳️ Order {} was lost mid-payment. Transfer {transfer_id} reversed by {}", order.id, reversal.id);
                    json!({ "transfer_id": transfer_id, "reversal_id": reversal.id })
                },
                Err(e) => {
                    error!("💳️ Could not reverse transfer {transfer_id} for lost order {}. Manual refund needed. {e}", order.id);
                    json!({ "transfer_id": transfer_id, "error": e.to_string() })
                },
            };
            self.audit_unwind(order, details).await;
        } else if let Some(auth_id) = &progress.authorization_id {
            self.void_quietly(order, auth_id, idempotency_id).await;
            self.audit_unwind(order, json!({ "authorization_id": auth_id })).await;
        }
    }

    /// Voids a declined capture's authorization and frees the order for another attempt.
    async fn release_authorization(&self, order: &Order, auth_id: &str, idempotency_id: &str) {
        self.void_quietly(order, auth_id, idempotency_id).await;
        let update = OrderUpdate {
            clear_authorization: true,
            authorization_unset_or: Some(auth_id.to_string()),
            ..Default::default()
        }
        .when_status_in(&[OrderStatusType::Reserved]);
        if let Err(e) = self.db.update_order(&order.id, update).await {
            warn!("💳️ Could not release authorization {auth_id} from order {}. {e}", order.id);
        }
    }

    async fn void_quietly(&self, order: &Order, auth_id: &str, idempotency_id: &str) {
        let key = derive_key(idempotency_id, PipelineStep::Void);
        match self.gateway.void_authorization(auth_id, &key).await {
            Ok(voided) => debug!("💳️ Authorization {auth_id} for order {} voided ({})", order.id, voided.state),
            Err(e) => error!("💳️ Could not void authorization {auth_id} for order {}. {e}", order.id),
        }
    }

    async fn audit_unwind(&self, order: &Order, details: serde_json::Value) {
        let entry = NewAuditEntry::new(&Actor::system(), "payment.unwound", "order", order.id.as_str(), details);
        if let Err(e) = self.db.append_audit_entry(entry).await {
            error!("💳️ Could not audit the unwound payment for order {}. {e}", order.id);
        }
    }

    /// The conflict reported when a guarded write finds that the order changed under the pipeline.
    async fn order_moved(&self, order_id: &OrderId, during: &str) -> CheckoutError {
        let status = match self.db.fetch_order(order_id).await {
            Ok(Some(order)) => order.status.to_string(),
            _ => "unknown".to_string(),
        };
        CheckoutError::Conflict(format!("Order {order_id} changed while {during}. It is now {status}."))
    }

    async fn record_failure(&self, order: &Order, failure: &PaymentFailure) {
        warn!("💳️ Payment for order {} failed. {failure}", order.id);
        let patch = json!({ "last_payment_failure": {
            "failure_code": failure.failure_code,
            "message": failure.message,
            "authorization_id": failure.authorization_id,
            "transfer_id": failure.transfer_id,
            "failed_at": Utc::now(),
        }});
        if let Err(e) = self.db.update_order(&order.id, OrderUpdate::default().with_metadata(patch)).await {
            error!("💳️ Could not record the payment failure on order {}. {e}", order.id);
        }
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Order, CheckoutError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| CheckoutError::not_found("Order", order_id.as_str()))
    }
}

fn order_tags(order: &Order) -> Tags {
    HashMap::from([
        ("order_id".to_string(), order.id.to_string()),
        ("listing_id".to_string(), order.listing_id.clone()),
        ("buyer_id".to_string(), order.buyer_id.clone()),
    ])
}

fn gateway_failure(e: crate::traits::GatewayError) -> CheckoutError {
    CheckoutError::Payment(PaymentFailure::from_gateway(&e))
}

fn declined(code: Option<&str>, message: Option<&str>) -> CheckoutError {
    let message = message.unwrap_or("The payment was declined");
    let code = crate::helpers::classify_failure(code, message);
    CheckoutError::Payment(PaymentFailure::new(code, message))
}

/// Hard failures from the instrument's verification results. Inconclusive bank validation is only logged.
fn check_verification(instrument: &GatewayInstrument) -> Result<(), CheckoutError> {
    if instrument.address_check == AddressCheck::NoMatch {
        let failure = PaymentFailure::new(FailureCode::AvsMismatch, FailureCode::AvsMismatch.hint());
        return Err(CheckoutError::Payment(failure));
    }
    if instrument.security_code_check == SecurityCodeCheck::Unmatched {
        let failure = PaymentFailure::new(FailureCode::CvvMismatch, FailureCode::CvvMismatch.hint());
        return Err(CheckoutError::Payment(failure));
    }
    if instrument.kind == InstrumentKind::BankAccount {
        match instrument.bank_account_check {
            BankAccountCheck::Invalid => {
                let code = FailureCode::BankAccountInvalid;
                return Err(CheckoutError::Payment(PaymentFailure::new(code, code.hint())));
            },
            BankAccountCheck::Inconclusive | BankAccountCheck::NotAttempted => {
                info!(
                    "💳️ Bank account validation for instrument {} was {:?}. Proceeding.",
                    instrument.id, instrument.bank_account_check
                );
            },
            BankAccountCheck::Valid => {},
        }
    }
    Ok(())
}
