use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use checkout_engine::{traits::GatewayErrorKind, CheckoutError, PaymentFailure};
use log::error;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("No caller identity was supplied. {0}")]
    MissingActor(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("Webhook rejected. {0}")]
    InvalidSignature(String),
    #[error("{0}")]
    Checkout(#[from] CheckoutError),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

/// The body of every error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<String>,
}

impl ServerError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Checkout(e) => e.code(),
            Self::InvalidRequestBody(_) => "VALIDATION_ERROR",
            Self::MissingActor(_) => "AUTHENTICATION_ERROR",
            Self::InsufficientPermissions(_) => "AUTHORIZATION_ERROR",
            Self::InvalidSignature(_) => "SIGNATURE_ERROR",
            Self::InitializeError(_) | Self::IOError(_) | Self::ConfigurationError(_) | Self::Unspecified(_) => {
                "INTERNAL_ERROR"
            },
        }
    }

    pub fn error_body(&self) -> ErrorBody {
        let mut body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
            failure_code: None,
            authorization_id: None,
            transfer_id: None,
        };
        if let Self::Checkout(CheckoutError::Payment(PaymentFailure {
            failure_code,
            message,
            authorization_id,
            transfer_id,
            ..
        })) = self
        {
            body.message = message.clone();
            body.failure_code = Some(failure_code.to_string());
            body.authorization_id = authorization_id.clone();
            body.transfer_id = transfer_id.clone();
        }
        body
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::MissingActor(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            Self::Checkout(e) => match e {
                CheckoutError::Validation(_) => StatusCode::BAD_REQUEST,
                CheckoutError::Authorization(_) => StatusCode::FORBIDDEN,
                CheckoutError::NotFound { .. } => StatusCode::NOT_FOUND,
                CheckoutError::Payment(_) => StatusCode::PAYMENT_REQUIRED,
                CheckoutError::Retryable(_) => StatusCode::SERVICE_UNAVAILABLE,
                CheckoutError::Conflict(_) => StatusCode::CONFLICT,
                CheckoutError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                CheckoutError::Gateway(g) if g.kind == GatewayErrorKind::Configuration => {
                    StatusCode::INTERNAL_SERVER_ERROR
                },
                CheckoutError::Gateway(_) => StatusCode::BAD_GATEWAY,
            },
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("💻️ Request failed with {status}. {self}");
        }
        HttpResponse::build(status).insert_header(ContentType::json()).body(json!({ "error": self.error_body() }).to_string())
    }
}
