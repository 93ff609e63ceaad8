use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum FinixApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Request to the processor timed out: {0}")]
    Timeout(String),
    #[error("Could not reach the processor: {0}")]
    Connection(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Processor error {status}. {message}")]
    ServerError { status: u16, message: String },
    /// The processor understood the request and refused it. Declines land here.
    #[error("Request rejected ({status}). {message}")]
    Rejected { status: u16, code: Option<String>, failure_code: Option<String>, message: String },
}

impl FinixApiError {
    /// Only transport failures and 5xx responses may be retried. A rejection is final, even if the same request
    /// would succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connection(_) | Self::ServerError { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ServerError { status, .. } | Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn failure_code(&self) -> Option<&str> {
        match self {
            Self::Rejected { failure_code, code, .. } => failure_code.as_deref().or(code.as_deref()),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::ServerError { message, .. } | Self::Rejected { message, .. } => message.clone(),
            e => e.to_string(),
        }
    }

    /// Builds an error from a non-success HTTP response. The processor's error envelope looks like
    /// `{"_embedded": {"errors": [{"code": "...", "failure_code": "...", "message": "..."}]}}`, but any body is
    /// accepted; unparseable bodies are carried verbatim in the message.
    pub fn from_response(status: u16, body: &str) -> Self {
        #[derive(Deserialize)]
        struct Envelope {
            #[serde(rename = "_embedded")]
            embedded: Embedded,
        }
        #[derive(Deserialize)]
        struct Embedded {
            errors: Vec<ErrorItem>,
        }
        #[derive(Deserialize)]
        struct ErrorItem {
            code: Option<String>,
            failure_code: Option<String>,
            message: Option<String>,
            failure_message: Option<String>,
        }
        let first = serde_json::from_str::<Envelope>(body).ok().and_then(|e| e.embedded.errors.into_iter().next());
        let (code, failure_code, message) = match first {
            Some(item) => {
                let message = item.failure_message.or(item.message).unwrap_or_else(|| body.to_string());
                (item.code, item.failure_code, message)
            },
            None => (None, None, body.to_string()),
        };
        if status >= 500 {
            Self::ServerError { status, message }
        } else {
            Self::Rejected { status, code, failure_code, message }
        }
    }
}

impl From<reqwest::Error> for FinixApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            Self::Connection(e.to_string())
        } else if e.is_decode() {
            Self::JsonError(e.to_string())
        } else {
            Self::Connection(e.to_string())
        }
    }
}
