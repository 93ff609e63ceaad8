use std::{env, str::FromStr, time::Duration};

use checkout_common::{parse_boolean_flag, Secret};
use checkout_engine::checkout_api::{
    reservation_api::DEFAULT_RESERVATION_MINUTES,
    webhook_api::{DEFAULT_MAX_WEBHOOK_ATTEMPTS, DEFAULT_PROCESSING_LEASE_SECS},
};
use finix_tools::FinixConfig;
use log::*;

use crate::errors::ServerError;

const DEFAULT_CKO_HOST: &str = "127.0.0.1";
const DEFAULT_CKO_PORT: u16 = 8370;
const DEFAULT_SIGNATURE_HEADER: &str = "Finix-Signature";
const DEFAULT_WEBHOOK_RETRY_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Production posture. Turns a missing webhook secret into a startup error instead of a development bypass.
    pub production: bool,
    /// How long a reservation holds a listing.
    pub reservation_horizon: chrono::Duration,
    pub finix: FinixConfig,
    pub webhooks: WebhookConfig,
    /// Where engine notifications are POSTed. When unset, notifications are only logged.
    pub notification_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub secret: Secret<String>,
    pub signature_header: String,
    pub max_attempts: i64,
    pub retry_interval: Duration,
    /// How long an event may stay `pending` or `processing` before the retry worker takes it over.
    pub processing_lease: chrono::Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: Secret::default(),
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
            max_attempts: DEFAULT_MAX_WEBHOOK_ATTEMPTS,
            retry_interval: DEFAULT_WEBHOOK_RETRY_INTERVAL,
            processing_lease: chrono::Duration::seconds(DEFAULT_PROCESSING_LEASE_SECS),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_CKO_HOST.to_string(),
            port: DEFAULT_CKO_PORT,
            database_url: String::default(),
            production: false,
            reservation_horizon: chrono::Duration::minutes(DEFAULT_RESERVATION_MINUTES),
            finix: FinixConfig::default(),
            webhooks: WebhookConfig::default(),
            notification_url: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("CKO_HOST").ok().unwrap_or_else(|| DEFAULT_CKO_HOST.into());
        let port = parse_env_or("CKO_PORT", DEFAULT_CKO_PORT);
        let database_url = env::var("CKO_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ CKO_DATABASE_URL is not set. Please set it to the URL for the checkout database.");
            String::default()
        });
        let production = parse_boolean_flag(env::var("CKO_PRODUCTION").ok(), false);
        let minutes = parse_env_or("CKO_RESERVATION_MINUTES", DEFAULT_RESERVATION_MINUTES);
        let reservation_horizon = if minutes > 0 {
            chrono::Duration::minutes(minutes)
        } else {
            warn!("🪛️ CKO_RESERVATION_MINUTES must be positive. Using {DEFAULT_RESERVATION_MINUTES} minutes.");
            chrono::Duration::minutes(DEFAULT_RESERVATION_MINUTES)
        };
        let finix = FinixConfig::new_from_env_or_default();
        let webhooks = WebhookConfig::from_env_or_default();
        let notification_url = env::var("CKO_NOTIFICATION_URL").ok().filter(|s| !s.trim().is_empty());
        if notification_url.is_none() {
            info!("🪛️ CKO_NOTIFICATION_URL is not set. Notifications will be logged, but not delivered.");
        }
        Self { host, port, database_url, production, reservation_horizon, finix, webhooks, notification_url }
    }

    /// Checks for combinations of settings the server must not start with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.production && self.webhooks.secret.is_empty() {
            return Err(ServerError::ConfigurationError(
                "CKO_WEBHOOK_SECRET must be set when CKO_PRODUCTION is enabled".to_string(),
            ));
        }
        if self.webhooks.secret.is_empty() {
            warn!(
                "🚨️ CKO_WEBHOOK_SECRET is not set. Unsigned webhooks will be accepted. Never run a production \
                 instance like this. 🚨️"
            );
        }
        Ok(())
    }
}

impl WebhookConfig {
    pub fn from_env_or_default() -> Self {
        let secret = Secret::new(env::var("CKO_WEBHOOK_SECRET").unwrap_or_default());
        let signature_header = env::var("CKO_WEBHOOK_SIGNATURE_HEADER")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SIGNATURE_HEADER.to_string());
        let max_attempts = parse_env_or("CKO_WEBHOOK_MAX_ATTEMPTS", DEFAULT_MAX_WEBHOOK_ATTEMPTS).max(1);
        let retry_interval = Duration::from_secs(
            parse_env_or("CKO_WEBHOOK_RETRY_INTERVAL_SECS", DEFAULT_WEBHOOK_RETRY_INTERVAL.as_secs()).max(1),
        );
        let processing_lease = chrono::Duration::seconds(
            parse_env_or("CKO_WEBHOOK_PROCESSING_LEASE_SECS", DEFAULT_PROCESSING_LEASE_SECS).max(1),
        );
        Self { secret, signature_header, max_attempts, retry_interval, processing_lease }
    }
}

/// Parses an environment variable, falling back to `default` (with a log message) when it is missing or invalid.
fn parse_env_or<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default, {default}.");
            default
        },
    }
}
