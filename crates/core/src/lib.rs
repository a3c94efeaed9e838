//! Core domain types and shared logic for ferry.
//!
//! This crate defines the data model used across all other crates:
//! - Upload sessions and their file records
//! - File status lifecycle
//! - Credential hashing and one-time-token helpers
//! - Content digests and content-type sniffing
//! - Configuration shared by the server and backends

pub mod access;
pub mod config;
pub mod error;
pub mod file;
pub mod hash;
pub mod sniff;
pub mod upload;

pub use error::{Error, Result};
pub use file::{BackendDetails, File, FileId, FileStatus};
pub use hash::{ContentHash, ContentHasher};
pub use upload::{Upload, UploadId, UploadToken};

/// Length of generated upload and file identifiers.
pub const ID_LENGTH: usize = 16;

/// Length of generated upload tokens.
pub const UPLOAD_TOKEN_LENGTH: usize = 32;

/// Maximum accepted length for identifiers parsed from requests.
pub const MAX_ID_LENGTH: usize = 64;

/// Current wall-clock time as unix seconds.
pub fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Generate a random alphanumeric string of the given length.
pub(crate) fn random_alphanumeric(len: usize) -> String {
    use rand::Rng;
    use rand::distr::Alphanumeric;

    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
