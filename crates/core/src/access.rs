//! Credential material for protected uploads.
//!
//! Passwords are persisted only as a hash of the base64 `login:password`
//! pair, which is exactly what a client later presents in a Basic
//! `Authorization` header. One-time tokens are persisted only as their
//! device-identifying prefix.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

/// Login used when a client protects an upload with a password only.
pub const DEFAULT_LOGIN: &str = "ferry";

/// Length of a one-time token.
pub const TOKEN_LENGTH: usize = 44;

/// Length of the device-identifying token prefix that is stored.
pub const TOKEN_PREFIX_LENGTH: usize = 12;

/// Base64 encoding of `login:password`, as carried in a Basic auth header.
pub fn encode_basic_credentials(login: &str, password: &str) -> String {
    STANDARD.encode(format!("{login}:{password}"))
}

/// Persisted hash of an encoded credential pair.
pub fn hash_basic_credentials(encoded: &str) -> String {
    let digest = Sha256::digest(encoded.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Device prefix of a one-time token, if the token is long enough to carry one.
pub fn token_prefix(token: &str) -> Option<&str> {
    token.get(..TOKEN_PREFIX_LENGTH)
}

/// Check the cheap structural properties of a presented token.
pub fn token_shape_matches(token: &str, stored_prefix: &str) -> bool {
    token.len() == TOKEN_LENGTH && token_prefix(token) == Some(stored_prefix)
}
