//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use ferry_core::{BackendDetails, FileId, UploadId};
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes, used for both reads and writes.
///
/// An `Err` item on a write stream aborts the write.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Durable byte storage for file contents, keyed by upload and file id.
#[async_trait]
pub trait DataBackend: Send + Sync + 'static {
    /// Open a file's contents for streaming.
    ///
    /// Fails with `NotFound` if nothing is stored for the pair.
    async fn read_file(&self, upload: &UploadId, file: &FileId) -> StorageResult<ByteStream>;

    /// Store a file's contents, consuming `data` until it ends.
    ///
    /// If the stream yields an error, or the write itself fails, no object
    /// is left behind under the file's key. Returns opaque details to be
    /// persisted alongside the file record.
    async fn write_file(
        &self,
        upload: &UploadId,
        file: &FileId,
        data: ByteStream,
    ) -> StorageResult<BackendDetails>;

    /// Delete a file's contents. Deleting an absent object succeeds.
    async fn delete_file(&self, upload: &UploadId, file: &FileId) -> StorageResult<()>;

    /// Delete every object stored for an upload. Idempotent.
    async fn delete_upload(&self, upload: &UploadId) -> StorageResult<()>;

    /// Static identifier for the backend type (e.g., "s3", "filesystem").
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called at startup and by the health endpoint. The default
    /// implementation returns Ok(()).
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
