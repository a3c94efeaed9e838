//! API error types.

use crate::auth::AccessError;
use crate::lifecycle::RemovalError;
use crate::transfer::IngestError;
use axum::Json;
use axum::http::header::{LOCATION, USER_AGENT, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;

/// Challenge sent with password-protected responses.
pub const BASIC_CHALLENGE: &str = "Basic realm=\"ferry\"";

/// User-agent prefixes of non-interactive clients, which get error
/// statuses directly instead of a redirect to the web client.
const CLI_USER_AGENTS: &[&str] = &["wget", "curl", "python-urllib", "libwww-perl", "php", "pycurl"];

/// Query-component encoding: everything but RFC 3986 unreserved characters.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Missing or wrong Basic credentials on a password-protected upload.
    #[error("unauthorized: {0}")]
    PasswordRequired(String),

    #[error("already consumed: {0}")]
    AlreadyConsumed(String),

    #[error("file exceeds maximum size of {limit} bytes")]
    SizeLimitExceeded { limit: u64 },

    #[error("upstream error: {0}")]
    BadGateway(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] ferry_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] ferry_metadata::MetadataError),

    #[error("invalid request: {0}")]
    Core(#[from] ferry_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::PasswordRequired(_) => "password_required",
            Self::AlreadyConsumed(_) => "already_consumed",
            Self::SizeLimitExceeded { .. } => "size_limit_exceeded",
            Self::BadGateway(_) => "bad_gateway",
            Self::Internal(_) => "internal_error",
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Core(_) => "validation_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PasswordRequired(_) => StatusCode::UNAUTHORIZED,
            // Consumed one-shot files answer 401 like removed ones.
            Self::AlreadyConsumed(_) => StatusCode::UNAUTHORIZED,
            Self::SizeLimitExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Metadata(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Self::Metadata(ferry_metadata::MetadataError::AlreadyExists(_)) => StatusCode::CONFLICT,
            Self::Metadata(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let challenge = matches!(self, Self::PasswordRequired(_));
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        if challenge {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static(BASIC_CHALLENGE),
            );
        }
        response
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::SizeLimitExceeded { limit } => Self::SizeLimitExceeded { limit },
            IngestError::Client(msg) => Self::BadRequest(format!("failed to read upload body: {msg}")),
            IngestError::Storage(e) => Self::Storage(e),
            IngestError::Metadata(e) => Self::Metadata(e),
            IngestError::Writer(msg) => Self::Internal(msg),
        }
    }
}

impl From<AccessError> for ApiError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::PasswordRequired | AccessError::InvalidCredentials => {
                Self::PasswordRequired(e.to_string())
            }
            AccessError::TokenRequired | AccessError::InvalidToken | AccessError::TokenRejected => {
                Self::Unauthorized(e.to_string())
            }
            AccessError::TokenProtectionDisabled => Self::BadRequest(e.to_string()),
            AccessError::ValidatorUnavailable(_) => Self::BadGateway(e.to_string()),
        }
    }
}

impl From<RemovalError> for ApiError {
    fn from(e: RemovalError) -> Self {
        match e {
            RemovalError::NotRemovable => Self::Unauthorized(e.to_string()),
            RemovalError::NotFound(_) => Self::NotFound(e.to_string()),
            RemovalError::Metadata(_) | RemovalError::Storage(_) | RemovalError::Both { .. } => {
                Self::Internal(e.to_string())
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Whether the request comes from a known command-line HTTP client.
pub fn is_cli_client(headers: &HeaderMap) -> bool {
    let Some(agent) = headers.get(USER_AGENT).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let agent = agent.to_ascii_lowercase();
    CLI_USER_AGENTS
        .iter()
        .any(|prefix| agent.starts_with(prefix))
}

/// Location of the web client's error page for a failed request.
pub fn error_page_location(error: &ApiError, request_uri: &str) -> String {
    format!(
        "/#/?err={}&errcode={}&uri={}",
        utf8_percent_encode(&error.to_string(), QUERY_COMPONENT),
        error.status_code().as_u16(),
        utf8_percent_encode(request_uri, QUERY_COMPONENT),
    )
}

/// Error on a download path.
///
/// Browsers are redirected to the web client's error page; command-line
/// clients and password challenges get the error response directly.
#[derive(Debug)]
pub struct EgressError {
    pub error: ApiError,
    redirect_to: Option<String>,
}

impl EgressError {
    pub fn new(error: ApiError, headers: &HeaderMap, request_uri: &str) -> Self {
        let redirect =
            !is_cli_client(headers) && !matches!(error, ApiError::PasswordRequired(_));
        let redirect_to = redirect.then(|| error_page_location(&error, request_uri));
        Self { error, redirect_to }
    }
}

impl IntoResponse for EgressError {
    fn into_response(self) -> Response {
        match self.redirect_to {
            Some(location) => (StatusCode::MOVED_PERMANENTLY, [(LOCATION, location)]).into_response(),
            None => self.error.into_response(),
        }
    }
}
