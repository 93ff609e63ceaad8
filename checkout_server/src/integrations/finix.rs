//! Bridges the Finix REST client into the engine's [`PaymentGateway`] trait.
//!
//! The engine only speaks its own gateway types. This module translates them into Finix request bodies, and
//! translates Finix resources and errors back. The client has already retried transient failures by the time an error
//! reaches this module, so a transient error here is final for the current request.
use checkout_engine::{
    db_types::{MinorUnits, PostalAddress},
    traits::{
        gateway_objects::{
            AddressCheck,
            BankAccountCheck,
            BuyerIdentityRequest,
            ChargeRequest,
            GatewayAuthorization,
            GatewayIdentity,
            GatewayInstrument,
            GatewayState,
            GatewayTransfer,
            InstrumentKind,
            InstrumentRequest,
            SecurityCodeCheck,
            Tags,
        },
        GatewayError,
        GatewayErrorKind,
        PaymentGateway,
    },
};
use finix_tools::{
    Address,
    Authorization,
    EntityDetails,
    FinixApi,
    FinixApiError,
    FinixConfig,
    NewAuthorization,
    NewIdentity,
    NewPaymentInstrument,
    NewReversal,
    NewTransfer,
    PaymentInstrument,
    Transfer,
};
use log::*;

#[derive(Clone)]
pub struct FinixGateway {
    api: FinixApi,
    environment: String,
}

impl std::fmt::Debug for FinixGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FinixGateway ({}, {})", self.environment, self.api.config().base_url)
    }
}

impl FinixGateway {
    pub fn new(config: FinixConfig) -> Result<Self, FinixApiError> {
        let environment = config.environment.to_string();
        let api = FinixApi::new(config)?;
        Ok(Self { api, environment })
    }
}

impl PaymentGateway for FinixGateway {
    fn application_id(&self) -> &str {
        &self.api.config().application_id
    }

    fn environment(&self) -> &str {
        &self.environment
    }

    async fn create_buyer_identity(
        &self,
        request: BuyerIdentityRequest,
        idempotency_key: &str,
    ) -> Result<GatewayIdentity, GatewayError> {
        let identity = NewIdentity {
            entity: EntityDetails {
                first_name: request.first_name,
                last_name: request.last_name,
                email: request.email,
                phone: request.phone,
                personal_address: Some(to_finix_address(request.address)),
            },
            tags: request.tags,
            idempotency_id: idempotency_key.to_string(),
        };
        let identity = self.api.create_identity(&identity).await.map_err(to_gateway_error)?;
        Ok(GatewayIdentity { id: identity.id })
    }

    async fn create_payment_instrument(
        &self,
        request: InstrumentRequest,
        idempotency_key: &str,
    ) -> Result<GatewayInstrument, GatewayError> {
        let instrument = NewPaymentInstrument {
            token: request.token,
            instrument_type: "TOKEN".to_string(),
            identity: request.identity_id,
            address: request.address.map(to_finix_address),
            fraud_session_id: request.fraud_session_id,
            tags: request.tags,
            idempotency_id: idempotency_key.to_string(),
        };
        let instrument = self.api.create_payment_instrument(&instrument).await.map_err(to_gateway_error)?;
        Ok(to_gateway_instrument(instrument))
    }

    async fn get_payment_instrument(&self, instrument_id: &str) -> Result<GatewayInstrument, GatewayError> {
        let instrument = self.api.get_payment_instrument(instrument_id).await.map_err(to_gateway_error)?;
        Ok(to_gateway_instrument(instrument))
    }

    async fn authorize_payment(
        &self,
        request: ChargeRequest,
        idempotency_key: &str,
    ) -> Result<GatewayAuthorization, GatewayError> {
        let auth = NewAuthorization {
            merchant: request.merchant_id,
            source: request.instrument_id,
            amount: request.amount.value(),
            currency: request.currency,
            fraud_session_id: request.fraud_session_id,
            tags: request.tags,
            idempotency_id: idempotency_key.to_string(),
        };
        let auth = self.api.create_authorization(&auth).await.map_err(to_gateway_error)?;
        Ok(to_gateway_authorization(auth))
    }

    async fn capture_payment(
        &self,
        authorization_id: &str,
        amount: MinorUnits,
        idempotency_key: &str,
    ) -> Result<GatewayAuthorization, GatewayError> {
        let auth = self
            .api
            .capture_authorization(authorization_id, amount.value(), idempotency_key)
            .await
            .map_err(to_gateway_error)?;
        Ok(to_gateway_authorization(auth))
    }

    async fn create_transfer(
        &self,
        request: ChargeRequest,
        idempotency_key: &str,
    ) -> Result<GatewayTransfer, GatewayError> {
        let transfer = NewTransfer {
            merchant: request.merchant_id,
            source: request.instrument_id,
            amount: request.amount.value(),
            currency: request.currency,
            fraud_session_id: request.fraud_session_id,
            tags: request.tags,
            idempotency_id: idempotency_key.to_string(),
        };
        let transfer = self.api.create_transfer(&transfer).await.map_err(to_gateway_error)?;
        Ok(to_gateway_transfer(transfer))
    }

    async fn get_transfer(&self, transfer_id: &str) -> Result<GatewayTransfer, GatewayError> {
        let transfer = self.api.get_transfer(transfer_id).await.map_err(to_gateway_error)?;
        Ok(to_gateway_transfer(transfer))
    }

    async fn create_transfer_reversal(
        &self,
        transfer_id: &str,
        amount: MinorUnits,
        tags: Tags,
        idempotency_key: &str,
    ) -> Result<GatewayTransfer, GatewayError> {
        let reversal = NewReversal { refund_amount: amount.value(), tags, idempotency_id: idempotency_key.to_string() };
        let reversal = self.api.create_reversal(transfer_id, &reversal).await.map_err(to_gateway_error)?;
        Ok(to_gateway_transfer(reversal))
    }

    async fn void_authorization(
        &self,
        authorization_id: &str,
        idempotency_key: &str,
    ) -> Result<GatewayAuthorization, GatewayError> {
        let auth = self.api.void_authorization(authorization_id, idempotency_key).await.map_err(to_gateway_error)?;
        Ok(to_gateway_authorization(auth))
    }
}

pub fn to_gateway_error(e: FinixApiError) -> GatewayError {
    let kind = match &e {
        FinixApiError::Timeout(_) | FinixApiError::Connection(_) | FinixApiError::ServerError { .. } => {
            GatewayErrorKind::Transient
        },
        FinixApiError::Rejected { status: 401 | 403, .. } | FinixApiError::Initialization(_) => {
            GatewayErrorKind::Configuration
        },
        FinixApiError::Rejected { .. } => GatewayErrorKind::Rejected,
        FinixApiError::JsonError(_) => GatewayErrorKind::Malformed,
    };
    if kind != GatewayErrorKind::Rejected {
        warn!("💳️ Processor call failed. {e}");
    }
    GatewayError { kind, status: e.status(), code: e.failure_code().map(String::from), message: e.message() }
}

fn to_finix_address(address: PostalAddress) -> Address {
    Address {
        line1: address.line1,
        line2: address.line2,
        city: address.city,
        region: address.region,
        postal_code: address.postal_code,
        country: address.country,
    }
}

fn to_gateway_instrument(instrument: PaymentInstrument) -> GatewayInstrument {
    let kind = match instrument.instrument_type.to_ascii_uppercase().as_str() {
        "PAYMENT_CARD" => InstrumentKind::Card,
        "BANK_ACCOUNT" => InstrumentKind::BankAccount,
        _ => InstrumentKind::Other,
    };
    let address_check = match instrument.address_verification.as_deref().map(str::to_ascii_uppercase).as_deref() {
        Some("POSTAL_CODE_AND_STREET_MATCH") => AddressCheck::Match,
        Some("STREET_MATCH" | "POSTAL_CODE_MATCH") => AddressCheck::PartialMatch,
        Some("NO_MATCH") => AddressCheck::NoMatch,
        _ => AddressCheck::Unknown,
    };
    let security_code_check =
        match instrument.security_code_verification.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("MATCHED") => SecurityCodeCheck::Matched,
            Some("UNMATCHED") => SecurityCodeCheck::Unmatched,
            _ => SecurityCodeCheck::Unknown,
        };
    let bank_account_check =
        match instrument.bank_account_validation_check.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("VALID") => BankAccountCheck::Valid,
            Some("INVALID") => BankAccountCheck::Invalid,
            Some("INCONCLUSIVE") => BankAccountCheck::Inconclusive,
            _ => BankAccountCheck::NotAttempted,
        };
    GatewayInstrument {
        id: instrument.id,
        kind,
        identity_id: instrument.identity,
        address_check,
        security_code_check,
        bank_account_check,
    }
}

fn to_gateway_authorization(auth: Authorization) -> GatewayAuthorization {
    let state = if auth.is_void { GatewayState::Canceled } else { GatewayState::parse(&auth.state) };
    GatewayAuthorization {
        id: auth.id,
        state,
        amount: MinorUnits::from(auth.amount),
        transfer_id: auth.transfer.filter(|t| !t.is_empty()),
        failure_code: auth.failure_code,
        failure_message: auth.failure_message,
    }
}

fn to_gateway_transfer(transfer: Transfer) -> GatewayTransfer {
    GatewayTransfer {
        id: transfer.id,
        state: GatewayState::parse(&transfer.state),
        amount: MinorUnits::from(transfer.amount),
        currency: transfer.currency,
        failure_code: transfer.failure_code,
        failure_message: transfer.failure_message,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn errors_are_normalized() {
        let e = to_gateway_error(FinixApiError::Timeout("30s".into()));
        assert_eq!(e.kind, GatewayErrorKind::Transient);
        let e = to_gateway_error(FinixApiError::ServerError { status: 503, message: "down".into() });
        assert_eq!((e.kind, e.status), (GatewayErrorKind::Transient, Some(503)));
        let e = to_gateway_error(FinixApiError::Rejected {
            status: 402,
            code: Some("DECLINED".into()),
            failure_code: Some("INSUFFICIENT_FUNDS".into()),
            message: "Insufficient funds".into(),
        });
        assert_eq!(e.kind, GatewayErrorKind::Rejected);
        assert_eq!(e.code.as_deref(), Some("INSUFFICIENT_FUNDS"));
        assert_eq!(e.message, "Insufficient funds");
        let e = to_gateway_error(FinixApiError::Rejected {
            status: 401,
            code: None,
            failure_code: None,
            message: "Unauthorized".into(),
        });
        assert_eq!(e.kind, GatewayErrorKind::Configuration);
        let e = to_gateway_error(FinixApiError::JsonError("missing field `id`".into()));
        assert_eq!(e.kind, GatewayErrorKind::Malformed);
    }

    #[test]
    fn instrument_checks() {
        let card = PaymentInstrument {
            id: "PIcard".into(),
            instrument_type: "PAYMENT_CARD".into(),
            identity: Some("IDbuyer".into()),
            address_verification: Some("NO_MATCH".into()),
            security_code_verification: Some("MATCHED".into()),
            ..Default::default()
        };
        let card = to_gateway_instrument(card);
        assert_eq!(card.kind, InstrumentKind::Card);
        assert_eq!(card.address_check, AddressCheck::NoMatch);
        assert_eq!(card.security_code_check, SecurityCodeCheck::Matched);
        assert_eq!(card.bank_account_check, BankAccountCheck::NotAttempted);
        let bank = PaymentInstrument {
            id: "PIbank".into(),
            instrument_type: "BANK_ACCOUNT".into(),
            bank_account_validation_check: Some("inconclusive".into()),
            ..Default::default()
        };
        let bank = to_gateway_instrument(bank);
        assert_eq!(bank.kind, InstrumentKind::BankAccount);
        assert_eq!(bank.bank_account_check, BankAccountCheck::Inconclusive);
        assert_eq!(bank.address_check, AddressCheck::Unknown);
    }

    #[test]
    fn voided_authorizations_are_canceled() {
        let auth = Authorization {
            id: "AUx".into(),
            state: "SUCCEEDED".into(),
            amount: 2500,
            is_void: true,
            transfer: Some(String::new()),
            ..Default::default()
        };
        let auth = to_gateway_authorization(auth);
        assert_eq!(auth.state, GatewayState::Canceled);
        assert_eq!(auth.transfer_id, None);
        assert_eq!(auth.amount, MinorUnits::from(2500));
    }
}
