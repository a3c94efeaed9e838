//! Access control for protected uploads and request tracing.

use crate::validator::TokenValidator;
use axum::extract::Request;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use ferry_core::Upload;
use ferry_core::access::{TOKEN_LENGTH, hash_basic_credentials, token_shape_matches};
use subtle::ConstantTimeEq;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and potential log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value.
    /// The value is truncated to MAX_TRACE_ID_LEN characters and non-printable characters removed.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Run every request inside a span carrying its trace ID.
pub async fn trace_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = req
        .headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_default();
    let span = tracing::info_span!("request", trace_id = %trace_id);
    req.extensions_mut().insert(trace_id);

    next.run(req).instrument(span).await
}

/// Reasons access to a protected upload is refused.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("this upload is password protected")]
    PasswordRequired,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("this upload requires a one-time token")]
    TokenRequired,

    #[error("invalid one-time token")]
    InvalidToken,

    #[error("one-time token was rejected")]
    TokenRejected,

    #[error("token protection is not enabled on this server")]
    TokenProtectionDisabled,

    #[error("token validation service unavailable: {0}")]
    ValidatorUnavailable(String),
}

/// Extract the base64 credential pair from a Basic `Authorization` header.
/// The scheme name is case-insensitive.
pub fn basic_credentials(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 6 && v[..6].eq_ignore_ascii_case("basic ") {
                Some(v[6..].trim())
            } else {
                None
            }
        })
}

/// Check Basic credentials against a password-protected upload.
pub fn check_password(upload: &Upload, headers: &HeaderMap) -> Result<(), AccessError> {
    if !upload.protected_by_password {
        return Ok(());
    }

    let encoded = basic_credentials(headers).ok_or(AccessError::PasswordRequired)?;
    let presented = hash_basic_credentials(encoded);
    if bool::from(presented.as_bytes().ct_eq(upload.password.as_bytes())) {
        Ok(())
    } else {
        Err(AccessError::InvalidCredentials)
    }
}

/// Check a presented one-time token against a token-protected upload.
///
/// Length and device prefix are checked before the external validator is
/// consulted, so malformed tokens never reach it.
pub async fn check_token(
    upload: &Upload,
    token: Option<&str>,
    validator: &dyn TokenValidator,
) -> Result<(), AccessError> {
    if !upload.protected_by_token {
        return Ok(());
    }

    let token = token
        .filter(|t| !t.is_empty())
        .ok_or(AccessError::TokenRequired)?;
    if token.len() != TOKEN_LENGTH || !token_shape_matches(token, &upload.token_prefix) {
        return Err(AccessError::InvalidToken);
    }

    if validator.validate(token).await? {
        Ok(())
    } else {
        Err(AccessError::TokenRejected)
    }
}
