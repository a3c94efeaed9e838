//! Upload repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use ferry_core::{Upload, UploadId};

/// Repository for upload records.
#[async_trait]
pub trait UploadRepo: Send + Sync {
    /// Persist a new upload together with any files it already carries.
    ///
    /// Fails with `AlreadyExists` if the id is taken.
    async fn create_upload(&self, upload: &Upload) -> MetadataResult<()>;

    /// Load an upload and all of its files.
    ///
    /// Fails with `NotFound` if absent. Expired uploads are returned as-is;
    /// callers check expiry themselves.
    async fn get_upload(&self, upload_id: &UploadId) -> MetadataResult<Upload>;

    /// Remove an upload record and its files. Fails with `NotFound` if absent.
    async fn delete_upload(&self, upload_id: &UploadId) -> MetadataResult<()>;

    /// Ids of every upload with `ttl != 0` and `creation + ttl < now`.
    async fn list_expired_upload_ids(&self, now: i64) -> MetadataResult<Vec<UploadId>>;
}
