//! File status transitions coordinated across both backends.
//!
//! Every status change goes through [`Lifecycle`], which persists the new
//! record with a single upsert and then performs the matching storage
//! side effect. The two steps can fail independently; which failures are
//! surfaced and which are only logged depends on the operation.

use crate::metrics::{FILES_REMOVED, ONE_SHOT_CONSUMED};
use ferry_core::{File, FileId, FileStatus, Upload, UploadId};
use ferry_metadata::{MetadataError, MetadataResult, MetadataStore};
use ferry_storage::{DataBackend, StorageError};
use std::sync::Arc;

/// Failure of an explicit file removal.
#[derive(Debug, thiserror::Error)]
pub enum RemovalError {
    #[error("files of this upload cannot be removed")]
    NotRemovable,

    #[error("file {0} not found")]
    NotFound(String),

    #[error("failed to persist removal: {0}")]
    Metadata(MetadataError),

    #[error("failed to delete file contents: {0}")]
    Storage(StorageError),

    #[error("failed to persist removal ({metadata}) and to delete file contents ({storage})")]
    Both {
        metadata: MetadataError,
        storage: StorageError,
    },
}

/// Owner of every file status transition.
#[derive(Clone)]
pub struct Lifecycle {
    storage: Arc<dyn DataBackend>,
    metadata: Arc<dyn MetadataStore>,
}

impl Lifecycle {
    pub fn new(storage: Arc<dyn DataBackend>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { storage, metadata }
    }

    /// Record a freshly ingested file in its upload.
    pub async fn register_file(&self, upload_id: &UploadId, file: &File) -> MetadataResult<()> {
        self.metadata.upsert_file(upload_id, file).await
    }

    /// Mark a one-shot file downloaded and drop its bytes.
    ///
    /// Called only after the full body reached the client. Failures are
    /// logged: the download itself already succeeded.
    #[tracing::instrument(skip(self, file), fields(file_id = %file.id))]
    pub async fn complete_download(&self, upload_id: &UploadId, mut file: File) {
        if let Err(e) = file.transition(FileStatus::Downloaded) {
            tracing::warn!(error = %e, "One-shot file changed state during download");
            return;
        }

        if let Err(e) = self.metadata.upsert_file(upload_id, &file).await {
            tracing::warn!(error = %e, "Failed to mark one-shot file downloaded");
        }
        ONE_SHOT_CONSUMED.inc();

        if let Err(e) = self.storage.delete_file(upload_id, &file.id).await {
            tracing::warn!(error = %e, "Failed to delete downloaded one-shot file");
        }
    }

    /// Remove a file on request.
    ///
    /// Both the status update and the storage delete are attempted even if
    /// one of them fails. Removing an already removed file succeeds.
    #[tracing::instrument(skip(self, upload), fields(upload_id = %upload.id))]
    pub async fn remove_file(&self, upload: &Upload, file_id: &FileId) -> Result<File, RemovalError> {
        let mut file = upload
            .file(file_id)
            .cloned()
            .ok_or_else(|| RemovalError::NotFound(file_id.to_string()))?;
        if !upload.removable {
            return Err(RemovalError::NotRemovable);
        }

        if let Err(e) = file.transition(FileStatus::Removed) {
            // Every status may move to Removed; this only guards future states.
            tracing::error!(error = %e, "Unexpected transition failure on removal");
            return Err(RemovalError::NotFound(file_id.to_string()));
        }

        let persisted = self.metadata.upsert_file(&upload.id, &file).await;
        let deleted = self.storage.delete_file(&upload.id, file_id).await;

        match (persisted, deleted) {
            (Ok(()), Ok(())) => {
                FILES_REMOVED.inc();
                tracing::info!("File removed");
                Ok(file)
            }
            (Err(metadata), Ok(())) => {
                tracing::warn!(error = %metadata, "File contents deleted but removal not persisted");
                Err(RemovalError::Metadata(metadata))
            }
            (Ok(()), Err(storage)) => {
                tracing::warn!(error = %storage, "Removal persisted but file contents remain");
                Err(RemovalError::Storage(storage))
            }
            (Err(metadata), Err(storage)) => Err(RemovalError::Both { metadata, storage }),
        }
    }
}
