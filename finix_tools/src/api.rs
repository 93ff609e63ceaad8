use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;

use crate::{
    config::FinixConfig,
    helpers::backoff_delay,
    Authorization,
    FinixApiError,
    Identity,
    NewAuthorization,
    NewIdentity,
    NewPaymentInstrument,
    NewReversal,
    NewTransfer,
    PaymentInstrument,
    Transfer,
};

#[derive(Clone)]
pub struct FinixApi {
    config: FinixConfig,
    client: Arc<Client>,
}

impl FinixApi {
    pub fn new(config: FinixConfig) -> Result<Self, FinixApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let version = HeaderValue::from_str(&config.api_version)
            .map_err(|e| FinixApiError::Initialization(format!("Invalid API version header. {e}")))?;
        headers.insert("Finix-Version", version);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| FinixApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn config(&self) -> &FinixConfig {
        &self.config
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Sends a request, retrying transport failures and 5xx responses with exponential backoff up to
    /// `max_attempts` times. The body is resent unchanged on every attempt, so any idempotency id it carries is
    /// preserved.
    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, FinixApiError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.send_once::<T, B>(method.clone(), path, body).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = backoff_delay(self.config.initial_backoff, attempt);
                    warn!(
                        "💳️ {method} {path} failed on attempt {attempt}/{max_attempts}: {e}. Retrying in {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) => {
                    debug!("💳️ {method} {path} failed after {attempt} attempt(s): {e}");
                    return Err(e);
                },
            }
        }
    }

    async fn send_once<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, FinixApiError> {
        let url = self.url(path);
        trace!("💳️ Sending REST query: {method} {url}");
        let mut req = self
            .client
            .request(method, url)
            .basic_auth(self.config.username.reveal(), Some(self.config.password.reveal()));
        if let Some(body) = body {
            req = req.json(body);
        }
        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            trace!("💳️ REST query successful. {status}");
            response.json::<T>().await.map_err(|e| FinixApiError::JsonError(e.to_string()))
        } else {
            let text = response.text().await?;
            Err(FinixApiError::from_response(status.as_u16(), &text))
        }
    }

    pub async fn create_identity(&self, identity: &NewIdentity) -> Result<Identity, FinixApiError> {
        debug!("💳️ Creating buyer identity");
        let result = self.rest_query::<Identity, _>(Method::POST, "/identities", Some(identity)).await?;
        info!("💳️ Created buyer identity {}", result.id);
        Ok(result)
    }

    pub async fn create_payment_instrument(
        &self,
        instrument: &NewPaymentInstrument,
    ) -> Result<PaymentInstrument, FinixApiError> {
        debug!("💳️ Creating payment instrument for identity {}", instrument.identity);
        let result =
            self.rest_query::<PaymentInstrument, _>(Method::POST, "/payment_instruments", Some(instrument)).await?;
        info!("💳️ Created {} payment instrument {}", result.instrument_type, result.id);
        Ok(result)
    }

    pub async fn get_payment_instrument(&self, id: &str) -> Result<PaymentInstrument, FinixApiError> {
        let path = format!("/payment_instruments/{id}");
        self.rest_query::<PaymentInstrument, ()>(Method::GET, &path, None).await
    }

    pub async fn create_authorization(&self, auth: &NewAuthorization) -> Result<Authorization, FinixApiError> {
        debug!("💳️ Authorizing {} {} against {}", auth.amount, auth.currency, auth.source);
        let result = self.rest_query::<Authorization, _>(Method::POST, "/authorizations", Some(auth)).await?;
        info!("💳️ Authorization {} is {}", result.id, result.state);
        Ok(result)
    }

    pub async fn capture_authorization(
        &self,
        authorization_id: &str,
        amount: i64,
        idempotency_id: &str,
    ) -> Result<Authorization, FinixApiError> {
        let path = format!("/authorizations/{authorization_id}");
        let body = json!({ "capture_amount": amount, "idempotency_id": idempotency_id });
        debug!("💳️ Capturing {amount} on authorization {authorization_id}");
        let result = self.rest_query::<Authorization, _>(Method::PUT, &path, Some(&body)).await?;
        info!("💳️ Captured authorization {}. Transfer: {:?}", result.id, result.transfer);
        Ok(result)
    }

    pub async fn void_authorization(
        &self,
        authorization_id: &str,
        idempotency_id: &str,
    ) -> Result<Authorization, FinixApiError> {
        let path = format!("/authorizations/{authorization_id}");
        let body = json!({ "void_me": true, "idempotency_id": idempotency_id });
        debug!("💳️ Voiding authorization {authorization_id}");
        let result = self.rest_query::<Authorization, _>(Method::PUT, &path, Some(&body)).await?;
        info!("💳️ Voided authorization {}", result.id);
        Ok(result)
    }

    pub async fn create_transfer(&self, transfer: &NewTransfer) -> Result<Transfer, FinixApiError> {
        debug!("💳️ Creating transfer of {} {} from {}", transfer.amount, transfer.currency, transfer.source);
        let result = self.rest_query::<Transfer, _>(Method::POST, "/transfers", Some(transfer)).await?;
        info!("💳️ Transfer {} is {}", result.id, result.state);
        Ok(result)
    }

    pub async fn get_transfer(&self, id: &str) -> Result<Transfer, FinixApiError> {
        let path = format!("/transfers/{id}");
        self.rest_query::<Transfer, ()>(Method::GET, &path, None).await
    }

    pub async fn create_reversal(&self, transfer_id: &str, reversal: &NewReversal) -> Result<Transfer, FinixApiError> {
        let path = format!("/transfers/{transfer_id}/reversals");
        debug!("💳️ Reversing {} on transfer {transfer_id}", reversal.refund_amount);
        let result = self.rest_query::<Transfer, _>(Method::POST, &path, Some(reversal)).await?;
        info!("💳️ Reversal {} on transfer {transfer_id} is {}", result.id, result.state);
        Ok(result)
    }
}
