//! Upload sessions.

use crate::error::{Error, Result};
use crate::file::{File, FileId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use subtle::ConstantTimeEq;

/// Check that a client-supplied identifier is safe to use as a storage key.
pub(crate) fn is_valid_id(s: &str) -> bool {
    !s.is_empty() && s.len() <= crate::MAX_ID_LENGTH && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Unique identifier for an upload.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UploadId(String);

impl UploadId {
    /// Generate a new random upload ID.
    pub fn new() -> Self {
        Self(crate::random_alphanumeric(crate::ID_LENGTH))
    }

    /// Parse and validate an upload ID.
    pub fn parse(s: &str) -> Result<Self> {
        if is_valid_id(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::InvalidUploadId(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-character shard used to spread uploads across directories.
    pub fn shard(&self) -> &str {
        &self.0[..self.0.len().min(2)]
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<String> for UploadId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<UploadId> for String {
    fn from(id: UploadId) -> Self {
        id.0
    }
}

impl fmt::Debug for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadId({})", self.0)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Secret handed to the creator of an upload; required to add files.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadToken(String);

impl UploadToken {
    /// Generate a new random upload token.
    pub fn generate() -> Self {
        Self(crate::random_alphanumeric(crate::UPLOAD_TOKEN_LENGTH))
    }

    /// Wrap a token loaded from storage.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Never print the secret.
impl fmt::Debug for UploadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UploadToken(..)")
    }
}

/// A sharing session aggregating files under one id, ttl and access policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    pub id: UploadId,
    /// Unix seconds at creation.
    pub creation: i64,
    /// Time-to-live in seconds; 0 means the upload never expires.
    pub ttl: i64,
    #[serde(default)]
    pub one_shot: bool,
    #[serde(default)]
    pub removable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_token: Option<UploadToken>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remote_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_url: Option<String>,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub protected_by_password: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub login: String,
    /// Hash of the base64 `login:password` pair, never the cleartext.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default)]
    pub protected_by_token: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token_prefix: String,
    #[serde(default)]
    pub files: BTreeMap<FileId, File>,
}

impl Upload {
    /// Create a new upload with a fresh id and upload token.
    pub fn new(creation: i64, ttl: i64) -> Self {
        Self {
            id: UploadId::new(),
            creation,
            ttl,
            one_shot: false,
            removable: false,
            upload_token: Some(UploadToken::generate()),
            remote_ip: String::new(),
            short_url: None,
            comments: String::new(),
            protected_by_password: false,
            login: String::new(),
            password: String::new(),
            protected_by_token: false,
            token_prefix: String::new(),
            files: BTreeMap::new(),
        }
    }

    /// Instant at which the upload expires, if it ever does.
    pub fn expires_at(&self) -> Option<i64> {
        (self.ttl != 0).then(|| self.creation.saturating_add(self.ttl))
    }

    /// Check whether the upload is expired at `now` (unix seconds).
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at().is_some_and(|at| now > at)
    }

    /// Validate a requested ttl against the configured maximum (0 = unlimited).
    pub fn check_ttl(ttl: i64, max_ttl: i64) -> Result<()> {
        if ttl < 0 {
            return Err(Error::InvalidTtl(format!("ttl must not be negative, got {ttl}")));
        }
        if max_ttl != 0 && (ttl == 0 || ttl > max_ttl) {
            return Err(Error::InvalidTtl(format!(
                "cannot set ttl to {ttl} (maximum allowed is {max_ttl})"
            )));
        }
        Ok(())
    }

    /// Check a presented upload token against the stored one.
    pub fn token_matches(&self, presented: &str) -> bool {
        self.upload_token
            .as_ref()
            .is_some_and(|t| bool::from(t.as_str().as_bytes().ct_eq(presented.as_bytes())))
    }

    pub fn file(&self, id: &FileId) -> Option<&File> {
        self.files.get(id)
    }

    /// Strip secrets and backend internals before the record leaves the server.
    pub fn sanitize(&mut self) {
        self.upload_token = None;
        self.remote_ip.clear();
        self.password.clear();
        self.token_prefix.clear();
        for file in self.files.values_mut() {
            file.sanitize();
        }
    }

    /// Sanitized copy of the upload.
    pub fn sanitized(&self) -> Self {
        let mut upload = self.clone();
        upload.sanitize();
        upload
    }
}
