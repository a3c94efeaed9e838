//! Access checks and streaming of stored files back to clients.

use super::TransferPipeline;
use crate::auth::{check_password, check_token};
use crate::error::{ApiError, ApiResult};
use crate::lifecycle::Lifecycle;
use crate::metrics::DOWNLOADS_COMPLETED;
use axum::http::HeaderMap;
use ferry_core::{File, FileId, FileStatus, Upload, UploadId};
use ferry_storage::ByteStream;
use futures::StreamExt;

impl TransferPipeline {
    /// Decide whether a file of `upload` may be served to this caller.
    ///
    /// Checks run in a fixed order and the first one failing decides the
    /// answer: expiry, existence, consumed one-shot, removal, token, password.
    pub async fn authorize(
        &self,
        upload: &Upload,
        file_id: &FileId,
        token: Option<&str>,
        headers: &HeaderMap,
        now: i64,
    ) -> ApiResult<File> {
        if upload.is_expired(now) {
            return Err(ApiError::NotFound(format!("upload {} has expired", upload.id)));
        }

        let file = upload
            .file(file_id)
            .ok_or_else(|| ApiError::NotFound(format!("file {file_id} not found")))?;

        if upload.one_shot && file.status == FileStatus::Downloaded {
            return Err(ApiError::AlreadyConsumed(format!(
                "file {} has already been downloaded",
                file.name
            )));
        }
        if upload.removable && file.status == FileStatus::Removed {
            return Err(ApiError::AlreadyConsumed(format!(
                "file {} has been removed",
                file.name
            )));
        }

        check_token(upload, token, self.validator.as_ref()).await?;
        check_password(upload, headers)?;

        Ok(file.clone())
    }

    /// Open an authorized file for streaming.
    ///
    /// The response carries `Content-Length`, so the server stops polling
    /// the body as soon as `file.size` bytes went out. Completion is
    /// therefore reported when the chunk reaching that size is handed over,
    /// not at end of stream. A stream dropped early, or one that fails
    /// mid-way, leaves the file untouched.
    pub async fn open(&self, upload: &Upload, file: File) -> ApiResult<ByteStream> {
        let mut inner = self.storage.read_file(&upload.id, &file.id).await?;
        let lifecycle = self.lifecycle.clone();
        let upload_id = upload.id.clone();
        let one_shot = upload.one_shot;
        let file_id = file.id.clone();
        let size = file.size;

        // An empty body may never be polled at all.
        if size == 0 {
            finish_download(&lifecycle, &upload_id, one_shot, file).await;
            return Ok(inner);
        }

        Ok(Box::pin(async_stream::stream! {
            let mut pending = Some(file);
            let mut sent: u64 = 0;
            while let Some(item) = inner.next().await {
                match item {
                    Ok(chunk) => {
                        sent += chunk.len() as u64;
                        if sent >= size {
                            if let Some(file) = pending.take() {
                                finish_download(&lifecycle, &upload_id, one_shot, file).await;
                            }
                        }
                        yield Ok(chunk);
                    }
                    Err(e) => {
                        tracing::warn!(upload_id = %upload_id, file_id = %file_id, error = %e, "File stream failed");
                        yield Err(e);
                        return;
                    }
                }
            }

            if pending.is_some() {
                tracing::warn!(
                    upload_id = %upload_id,
                    file_id = %file_id,
                    expected = size,
                    sent,
                    "Stored file is shorter than its record"
                );
            }
        }))
    }
}

async fn finish_download(
    lifecycle: &Lifecycle,
    upload_id: &UploadId,
    one_shot: bool,
    file: File,
) {
    DOWNLOADS_COMPLETED.inc();
    if one_shot {
        lifecycle.complete_download(upload_id, file).await;
    }
}
