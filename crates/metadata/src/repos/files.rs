//! File repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use ferry_core::{File, UploadId};

/// Repository for file records inside an upload.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Create or replace one file record of an existing upload in a single statement.
    ///
    /// Concurrent writers to the same file resolve last-writer-wins. Fails with
    /// `NotFound` if the upload does not exist.
    async fn upsert_file(&self, upload_id: &UploadId, file: &File) -> MetadataResult<()>;
}
