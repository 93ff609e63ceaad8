use std::{fmt::Display, time::Duration};

use checkout_common::Secret;
use log::*;

/// Requests to the processor are never given less than this long to complete.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FinixEnvironment {
    #[default]
    Sandbox,
    Live,
}

impl Display for FinixEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sandbox => write!(f, "sandbox"),
            Self::Live => write!(f, "live"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FinixConfig {
    pub base_url: String,
    pub username: Secret<String>,
    pub password: Secret<String>,
    pub application_id: String,
    pub environment: FinixEnvironment,
    pub api_version: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for FinixConfig {
    fn default() -> Self {
        Self {
            base_url: "https://finix.sandbox-payments-api.com".to_string(),
            username: Secret::default(),
            password: Secret::default(),
            application_id: String::default(),
            environment: FinixEnvironment::Sandbox,
            api_version: "2022-02-01".to_string(),
            timeout: MIN_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }
}

impl FinixConfig {
    pub fn new_from_env_or_default() -> Self {
        let defaults = Self::default();
        let base_url = std::env::var("CKO_FINIX_BASE_URL").unwrap_or_else(|_| {
            warn!("🪛️ CKO_FINIX_BASE_URL not set, using the sandbox API: {}", defaults.base_url);
            defaults.base_url.clone()
        });
        let username = Secret::new(std::env::var("CKO_FINIX_USERNAME").unwrap_or_else(|_| {
            warn!("🪛️ CKO_FINIX_USERNAME not set. Calls to the processor will be rejected.");
            String::default()
        }));
        let password = Secret::new(std::env::var("CKO_FINIX_PASSWORD").unwrap_or_else(|_| {
            warn!("🪛️ CKO_FINIX_PASSWORD not set. Calls to the processor will be rejected.");
            String::default()
        }));
        let application_id = std::env::var("CKO_FINIX_APPLICATION_ID").unwrap_or_else(|_| {
            warn!("🪛️ CKO_FINIX_APPLICATION_ID not set. Tokenization configs will carry an empty application id.");
            String::default()
        });
        let environment = match std::env::var("CKO_FINIX_ENVIRONMENT").ok().as_deref() {
            Some("live") => FinixEnvironment::Live,
            Some("sandbox") | None => FinixEnvironment::Sandbox,
            Some(s) => {
                warn!("🪛️ Unknown CKO_FINIX_ENVIRONMENT '{s}'. Using sandbox.");
                FinixEnvironment::Sandbox
            },
        };
        let api_version = std::env::var("CKO_FINIX_API_VERSION").unwrap_or(defaults.api_version);
        let timeout = std::env::var("CKO_FINIX_TIMEOUT_SECS")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| warn!("🪛️ Invalid CKO_FINIX_TIMEOUT_SECS '{s}': {e}. Using the default."))
                    .ok()
            })
            .map(Duration::from_secs)
            .map(|t| {
                if t < MIN_TIMEOUT {
                    warn!("🪛️ CKO_FINIX_TIMEOUT_SECS of {}s is too short. Using {}s.", t.as_secs(), MIN_TIMEOUT.as_secs());
                    MIN_TIMEOUT
                } else {
                    t
                }
            })
            .unwrap_or(defaults.timeout);
        let max_attempts = std::env::var("CKO_FINIX_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_attempts);
        let initial_backoff = std::env::var("CKO_FINIX_INITIAL_BACKOFF_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.initial_backoff);
        Self {
            base_url,
            username,
            password,
            application_id,
            environment,
            api_version,
            timeout,
            max_attempts,
            initial_backoff,
        }
    }
}
