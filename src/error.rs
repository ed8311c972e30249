use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// ValidationError
///
/// Raised before any remote call is attempted. A request that fails validation
/// never costs a round-trip to the collection, the auth provider or the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("'{value}' is not a valid {kind}")]
    InvalidValue { kind: &'static str, value: String },

    #[error("{0}")]
    Unsupported(String),
}

impl ValidationError {
    /// Rejects empty or whitespace-only text.
    pub fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingField { field });
        }
        Ok(())
    }

    pub fn invalid(kind: &'static str, value: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            kind,
            value: value.into(),
        }
    }
}

/// AuthError
///
/// Wraps the identity provider's message verbatim (bad credentials, duplicate
/// registration, expired refresh token). Never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AuthError {
    pub message: String,
}

impl AuthError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// RemoteError
///
/// Failure of a collection operation (permission denied, connectivity, missing row).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("{0}")]
    Query(String),

    #[error("record {0} not found")]
    NotFound(Uuid),
}

impl From<sqlx::Error> for RemoteError {
    fn from(e: sqlx::Error) -> Self {
        RemoteError::Query(e.to_string())
    }
}

/// UploadError
///
/// Aborts the enclosing create operation entirely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct UploadError {
    pub message: String,
}

impl UploadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// PortalError
///
/// The single failure value handed back across component boundaries. Every
/// variant is local to one user action and recoverable by retrying it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortalError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("no authenticated session")]
    Unauthenticated,

    #[error("administrator role required")]
    Forbidden,

    #[error("a submission from this form is already in flight")]
    Busy,

    #[error("session changed while the request was in flight")]
    StaleSession,
}

impl PortalError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PortalError::Auth(_) => StatusCode::BAD_REQUEST,
            PortalError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PortalError::Remote(RemoteError::NotFound(_)) => StatusCode::NOT_FOUND,
            PortalError::Remote(RemoteError::Query(_)) => StatusCode::BAD_GATEWAY,
            PortalError::Upload(_) => StatusCode::BAD_GATEWAY,
            PortalError::Unauthenticated => StatusCode::UNAUTHORIZED,
            PortalError::Forbidden => StatusCode::FORBIDDEN,
            PortalError::Busy | PortalError::StaleSession => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
