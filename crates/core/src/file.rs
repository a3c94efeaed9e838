//! File records and their status lifecycle.

use crate::error::{Error, Result};
use crate::sniff::DEFAULT_CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque backend-specific details returned by a storage backend on write.
///
/// Stored verbatim with the file record and handed back on later reads.
pub type BackendDetails = serde_json::Map<String, serde_json::Value>;

/// Identifier of a file, unique within its parent upload.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileId(String);

impl FileId {
    /// Generate a new random file ID.
    pub fn new() -> Self {
        Self(crate::random_alphanumeric(crate::ID_LENGTH))
    }

    /// Parse and validate a file ID received from a client.
    pub fn parse(s: &str) -> Result<Self> {
        if crate::upload::is_valid_id(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::InvalidFileId(s.to_string()))
        }
    }

    /// Borrow the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<String> for FileId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<FileId> for String {
    fn from(id: FileId) -> Self {
        id.0
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Bytes were ingested and are available.
    Uploaded,
    /// The single permitted download of a one-shot upload completed.
    Downloaded,
    /// The file was explicitly removed or purged.
    Removed,
}

impl FileStatus {
    /// Get the status as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Downloaded => "downloaded",
            Self::Removed => "removed",
        }
    }

    /// Check whether moving to `next` is a legal transition.
    ///
    /// Re-applying the current status is allowed so repeated removals are
    /// idempotent. Nothing leaves `Removed` and nothing returns to `Uploaded`.
    pub fn can_transition_to(&self, next: FileStatus) -> bool {
        match (self, next) {
            (a, b) if *a == b => true,
            (Self::Uploaded, Self::Downloaded) => true,
            (Self::Uploaded | Self::Downloaded, Self::Removed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uploaded" => Ok(Self::Uploaded),
            "downloaded" => Ok(Self::Downloaded),
            "removed" => Ok(Self::Removed),
            other => Err(Error::UnknownStatus(other.to_string())),
        }
    }
}

/// One uploaded object within an upload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub id: FileId,
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: u64,
    /// Hex SHA-256 of the stored bytes.
    pub digest: String,
    /// Unix seconds at which ingest completed.
    pub upload_date: i64,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub backend_details: BackendDetails,
}

impl File {
    /// Create an empty record for a file about to be ingested.
    pub fn new(id: FileId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            size: 0,
            digest: String::new(),
            upload_date: 0,
            status: FileStatus::Uploaded,
            backend_details: BackendDetails::new(),
        }
    }

    /// Move the file to a new status, rejecting illegal transitions.
    pub fn transition(&mut self, next: FileStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Strip backend internals before the record leaves the server.
    pub fn sanitize(&mut self) {
        self.backend_details.clear();
    }
}
