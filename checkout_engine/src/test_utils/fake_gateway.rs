//! An in-memory [`PaymentGateway`] for tests.
//!
//! Every call is recorded. Responses are deterministic and keyed on the idempotency key, the way the real processor
//! deduplicates requests: calling a mutating method twice with the same key returns the same resource and creates
//! nothing new.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::Notify;

use crate::{
    db_types::MinorUnits,
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
        PaymentGateway,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    CreateIdentity { key: String },
    CreateInstrument { key: String, token: String },
    GetInstrument { id: String },
    Authorize { key: String, amount: MinorUnits },
    Capture { key: String, authorization_id: String, amount: MinorUnits },
    CreateTransfer { key: String, amount: MinorUnits },
    GetTransfer { id: String },
    Reversal { key: String, transfer_id: String, amount: MinorUnits },
    Void { key: String, authorization_id: String },
}

#[derive(Debug)]
struct State {
    calls: Vec<GatewayCall>,
    by_key: HashMap<String, String>,
    next_id: u64,
    instrument_kind: InstrumentKind,
    address_check: AddressCheck,
    security_code_check: SecurityCodeCheck,
    bank_account_check: BankAccountCheck,
    authorization_state: GatewayState,
    capture_state: GatewayState,
    transfer_state: GatewayState,
    decline: Option<(String, String)>,
    errors: HashMap<&'static str, GatewayError>,
    instruments: HashMap<String, GatewayInstrument>,
    authorizations: HashMap<String, GatewayAuthorization>,
    transfers: HashMap<String, GatewayTransfer>,
    gates: HashMap<&'static str, Arc<CallGate>>,
}

/// A one-shot pause point in front of a gateway method. Lets a test run something else while a call is in flight.
#[derive(Debug, Default)]
pub struct CallGate {
    arrived: Notify,
    open: Notify,
}

impl CallGate {
    /// Resolves once a call has reached the gate.
    pub async fn arrived(&self) {
        self.arrived.notified().await
    }

    /// Lets the waiting call through.
    pub fn open(&self) {
        self.open.notify_one()
    }
}

impl Default for State {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            by_key: HashMap::new(),
            next_id: 1,
            instrument_kind: InstrumentKind::Card,
            address_check: AddressCheck::Match,
            security_code_check: SecurityCodeCheck::Matched,
            bank_account_check: BankAccountCheck::Valid,
            authorization_state: GatewayState::Succeeded,
            capture_state: GatewayState::Succeeded,
            transfer_state: GatewayState::Pending,
            decline: None,
            errors: HashMap::new(),
            instruments: HashMap::new(),
            authorizations: HashMap::new(),
            transfers: HashMap::new(),
            gates: HashMap::new(),
        }
    }
}

impl State {
    /// The id previously issued for `key`, or a fresh one.
    fn id_for(&mut self, prefix: &str, key: &str) -> (String, bool) {
        if let Some(id) = self.by_key.get(key) {
            return (id.clone(), false);
        }
        let id = format!("{prefix}{:06}", self.next_id);
        self.next_id += 1;
        self.by_key.insert(key.to_string(), id.clone());
        (id, true)
    }

    fn check_error(&self, method: &'static str) -> Result<(), GatewayError> {
        match self.errors.get(method) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn failure(&self, state: GatewayState) -> (Option<String>, Option<String>) {
        match (state, &self.decline) {
            (GatewayState::Failed | GatewayState::Canceled, Some((code, message))) => {
                (Some(code.clone()), Some(message.clone()))
            },
            _ => (None, None),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<State>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    pub fn reversal_calls(&self) -> Vec<GatewayCall> {
        self.calls().into_iter().filter(|c| matches!(c, GatewayCall::Reversal { .. })).collect()
    }

    /// Reversals that actually created a new resource, i.e. distinct idempotency keys.
    pub fn reversals_created(&self) -> usize {
        self.lock().transfers.values().filter(|t| t.id.starts_with("RV")).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// The next call to `method` waits at the returned gate until it is opened.
    pub fn gate(&self, method: &'static str) -> Arc<CallGate> {
        let gate = Arc::new(CallGate::default());
        self.lock().gates.insert(method, gate.clone());
        gate
    }

    async fn pass_gate(&self, method: &'static str) {
        let gate = self.lock().gates.remove(method);
        if let Some(gate) = gate {
            gate.arrived.notify_one();
            gate.open.notified().await;
        }
    }

    /// Newly minted instruments are of this kind.
    pub fn with_instrument_kind(self, kind: InstrumentKind) -> Self {
        self.lock().instrument_kind = kind;
        self
    }

    pub fn with_checks(self, address: AddressCheck, security_code: SecurityCodeCheck, bank: BankAccountCheck) -> Self {
        {
            let mut state = self.lock();
            state.address_check = address;
            state.security_code_check = security_code;
            state.bank_account_check = bank;
        }
        self
    }

    pub fn set_authorization_state(&self, state: GatewayState) {
        self.lock().authorization_state = state;
    }

    pub fn set_capture_state(&self, state: GatewayState) {
        self.lock().capture_state = state;
    }

    /// The state of direct-debit transfers when created.
    pub fn set_transfer_state(&self, state: GatewayState) {
        self.lock().transfer_state = state;
    }

    /// The processor failure code and message attached to failed responses.
    pub fn set_decline(&self, code: &str, message: &str) {
        self.lock().decline = Some((code.to_string(), message.to_string()));
    }

    /// Every call to `method` (e.g. `"authorize_payment"`) fails with `error` until cleared.
    pub fn fail_method(&self, method: &'static str, error: GatewayError) {
        self.lock().errors.insert(method, error);
    }

    pub fn clear_failures(&self) {
        self.lock().errors.clear();
    }

    /// Registers a saved instrument, as if the buyer had stored it in an earlier checkout.
    pub fn add_instrument(&self, id: &str, identity_id: &str, kind: InstrumentKind) {
        let mut state = self.lock();
        let instrument = GatewayInstrument {
            id: id.to_string(),
            kind,
            identity_id: Some(identity_id.to_string()),
            address_check: state.address_check,
            security_code_check: state.security_code_check,
            bank_account_check: state.bank_account_check,
        };
        state.instruments.insert(id.to_string(), instrument);
    }

    /// Registers (or overwrites) a transfer as `get_transfer` will report it.
    pub fn put_transfer(&self, id: &str, state: GatewayState, amount: MinorUnits) {
        let transfer = GatewayTransfer {
            id: id.to_string(),
            state,
            amount,
            currency: Some("USD".to_string()),
            failure_code: None,
            failure_message: None,
        };
        self.lock().transfers.insert(id.to_string(), transfer);
    }

    /// Moves an existing transfer to a new state, e.g. to simulate settlement.
    pub fn settle_transfer(&self, id: &str, new_state: GatewayState) {
        if let Some(t) = self.lock().transfers.get_mut(id) {
            t.state = new_state;
        }
    }
}

fn not_found(what: &str, id: &str) -> GatewayError {
    GatewayError::rejected(404, Some("NOT_FOUND".to_string()), format!("{what} {id} not found"))
}

impl PaymentGateway for FakeGateway {
    fn application_id(&self) -> &str {
        "APfake"
    }

    fn environment(&self) -> &str {
        "sandbox"
    }

    async fn create_buyer_identity(
        &self,
        _request: BuyerIdentityRequest,
        idempotency_key: &str,
    ) -> Result<GatewayIdentity, GatewayError> {
        let mut state = self.lock();
        state.calls.push(GatewayCall::CreateIdentity { key: idempotency_key.to_string() });
        state.check_error("create_buyer_identity")?;
        let (id, _) = state.id_for("ID", idempotency_key);
        Ok(GatewayIdentity { id })
    }

    async fn create_payment_instrument(
        &self,
        request: InstrumentRequest,
        idempotency_key: &str,
    ) -> Result<GatewayInstrument, GatewayError> {
        let mut state = self.lock();
        let call = GatewayCall::CreateInstrument { key: idempotency_key.to_string(), token: request.token.clone() };
        state.calls.push(call);
        state.check_error("create_payment_instrument")?;
        let (id, _) = state.id_for("PI", idempotency_key);
        let instrument = GatewayInstrument {
            id: id.clone(),
            kind: state.instrument_kind,
            identity_id: Some(request.identity_id),
            address_check: state.address_check,
            security_code_check: state.security_code_check,
            bank_account_check: state.bank_account_check,
        };
        state.instruments.insert(id, instrument.clone());
        Ok(instrument)
    }

    async fn get_payment_instrument(&self, instrument_id: &str) -> Result<GatewayInstrument, GatewayError> {
        let mut state = self.lock();
        state.calls.push(GatewayCall::GetInstrument { id: instrument_id.to_string() });
        state.check_error("get_payment_instrument")?;
        state.instruments.get(instrument_id).cloned().ok_or_else(|| not_found("Payment instrument", instrument_id))
    }

    async fn authorize_payment(
        &self,
        request: ChargeRequest,
        idempotency_key: &str,
    ) -> Result<GatewayAuthorization, GatewayError> {
        self.pass_gate("authorize_payment").await;
        let mut state = self.lock();
        state.calls.push(GatewayCall::Authorize { key: idempotency_key.to_string(), amount: request.amount });
        state.check_error("authorize_payment")?;
        let (id, created) = state.id_for("AU", idempotency_key);
        if !created {
            if let Some(auth) = state.authorizations.get(&id) {
                return Ok(auth.clone());
            }
        }
        let auth_state = state.authorization_state;
        let (failure_code, failure_message) = state.failure(auth_state);
        let auth = GatewayAuthorization {
            id: id.clone(),
            state: auth_state,
            amount: request.amount,
            transfer_id: None,
            failure_code,
            failure_message,
        };
        state.authorizations.insert(id, auth.clone());
        Ok(auth)
    }

    async fn capture_payment(
        &self,
        authorization_id: &str,
        amount: MinorUnits,
        idempotency_key: &str,
    ) -> Result<GatewayAuthorization, GatewayError> {
        self.pass_gate("capture_payment").await;
        let mut state = self.lock();
        let call = GatewayCall::Capture {
            key: idempotency_key.to_string(),
            authorization_id: authorization_id.to_string(),
            amount,
        };
        state.calls.push(call);
        state.check_error("capture_payment")?;
        let Some(mut auth) = state.authorizations.get(authorization_id).cloned() else {
            return Err(not_found("Authorization", authorization_id));
        };
        let (transfer_id, created) = state.id_for("TR", idempotency_key);
        let capture_state = state.capture_state;
        if created {
            let (failure_code, failure_message) = state.failure(capture_state);
            let transfer = GatewayTransfer {
                id: transfer_id.clone(),
                state: GatewayState::Pending,
                amount,
                currency: Some("USD".to_string()),
                failure_code,
                failure_message,
            };
            state.transfers.insert(transfer_id.clone(), transfer);
        }
        auth.state = capture_state;
        auth.transfer_id = Some(transfer_id);
        let (failure_code, failure_message) = state.failure(capture_state);
        auth.failure_code = failure_code;
        auth.failure_message = failure_message;
        state.authorizations.insert(auth.id.clone(), auth.clone());
        Ok(auth)
    }

    async fn create_transfer(
        &self,
        request: ChargeRequest,
        idempotency_key: &str,
    ) -> Result<GatewayTransfer, GatewayError> {
        self.pass_gate("create_transfer").await;
        let mut state = self.lock();
        state.calls.push(GatewayCall::CreateTransfer { key: idempotency_key.to_string(), amount: request.amount });
        state.check_error("create_transfer")?;
        let (id, created) = state.id_for("TR", idempotency_key);
        if !created {
            if let Some(t) = state.transfers.get(&id) {
                return Ok(t.clone());
            }
        }
        let transfer_state = state.transfer_state;
        let (failure_code, failure_message) = state.failure(transfer_state);
        let transfer = GatewayTransfer {
            id: id.clone(),
            state: transfer_state,
            amount: request.amount,
            currency: Some(request.currency),
            failure_code,
            failure_message,
        };
        state.transfers.insert(id, transfer.clone());
        Ok(transfer)
    }

    async fn get_transfer(&self, transfer_id: &str) -> Result<GatewayTransfer, GatewayError> {
        let mut state = self.lock();
        state.calls.push(GatewayCall::GetTransfer { id: transfer_id.to_string() });
        state.check_error("get_transfer")?;
        state.transfers.get(transfer_id).cloned().ok_or_else(|| not_found("Transfer", transfer_id))
    }

    async fn create_transfer_reversal(
        &self,
        transfer_id: &str,
        amount: MinorUnits,
        _tags: Tags,
        idempotency_key: &str,
    ) -> Result<GatewayTransfer, GatewayError> {
        let mut state = self.lock();
        let call = GatewayCall::Reversal {
            key: idempotency_key.to_string(),
            transfer_id: transfer_id.to_string(),
            amount,
        };
        state.calls.push(call);
        state.check_error("create_transfer_reversal")?;
        if !state.transfers.contains_key(transfer_id) {
            return Err(not_found("Transfer", transfer_id));
        }
        let (id, created) = state.id_for("RV", idempotency_key);
        if !created {
            if let Some(t) = state.transfers.get(&id) {
                return Ok(t.clone());
            }
        }
        let reversal = GatewayTransfer {
            id: id.clone(),
            state: GatewayState::Pending,
            amount,
            currency: Some("USD".to_string()),
            failure_code: None,
            failure_message: None,
        };
        state.transfers.insert(id, reversal.clone());
        Ok(reversal)
    }

    async fn void_authorization(
        &self,
        authorization_id: &str,
        idempotency_key: &str,
    ) -> Result<GatewayAuthorization, GatewayError> {
        let mut state = self.lock();
        let call = GatewayCall::Void { key: idempotency_key.to_string(), authorization_id: authorization_id.to_string() };
        state.calls.push(call);
        state.check_error("void_authorization")?;
        let auth =
            state.authorizations.get_mut(authorization_id).ok_or_else(|| not_found("Authorization", authorization_id))?;
        auth.state = GatewayState::Canceled;
        Ok(auth.clone())
    }
}
