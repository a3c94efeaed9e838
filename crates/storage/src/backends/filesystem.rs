//! Local filesystem storage backend.
//!
//! Files live at `<root>/<shard>/<upload id>/<file id>`, where the shard is
//! the first two characters of the upload id.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, DataBackend};
use async_trait::async_trait;
use bytes::Bytes;
use ferry_core::{BackendDetails, FileId, UploadId};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Local filesystem data backend.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn upload_key(upload: &UploadId) -> String {
        format!("{}/{}", upload.shard(), upload)
    }

    fn file_key(upload: &UploadId, file: &FileId) -> String {
        format!("{}/{}", Self::upload_key(upload), file)
    }

    /// Resolve a key under the root, off the async runtime.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Resolve a key under the root, rejecting anything that would escape it,
    /// including through symlinks planted inside the root.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        for component in Path::new(key).components() {
            if !matches!(component, std::path::Component::Normal(_)) {
                return Err(StorageError::InvalidKey(format!(
                    "contains unsafe path component: {key}"
                )));
            }
        }

        let path = root.join(key);
        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // Check the path itself if it exists, otherwise its nearest existing ancestor.
        let mut candidate = path.as_path();
        loop {
            match std::fs::symlink_metadata(candidate) {
                Ok(meta) => {
                    let canonical = candidate.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidKey(format!(
                                "symlink target missing or invalid: {key}"
                            ))
                        } else {
                            StorageError::Io(std::io::Error::new(
                                e.kind(),
                                format!("failed to canonicalize path: {e}"),
                            ))
                        }
                    })?;
                    if !canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {key}"
                        )));
                    }
                    return Ok(path);
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(StorageError::Io(std::io::Error::new(
                        err.kind(),
                        format!("failed to stat path: {err}"),
                    )));
                }
            }
            match candidate.parent() {
                Some(parent) => candidate = parent,
                None => return Ok(path),
            }
        }
    }

    fn temp_path_for(path: &Path) -> PathBuf {
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or(temp_name),
        )
    }

    fn not_found(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
        move |e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        }
    }
}

#[async_trait]
impl DataBackend for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn read_file(&self, upload: &UploadId, file: &FileId) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let key = Self::file_key(upload, file);
        let path = self.key_path(&key).await?;
        let file = fs::File::open(&path).await.map_err(Self::not_found(&key))?;

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem"))]
    async fn write_file(
        &self,
        upload: &UploadId,
        file: &FileId,
        mut data: ByteStream,
    ) -> StorageResult<BackendDetails> {
        let key = Self::file_key(upload, file);
        let path = self.key_path(&key).await?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Stream into a temp file, fsync, then rename so readers never see a partial file.
        let temp_path = Self::temp_path_for(&path);
        let mut out = fs::File::create(&temp_path).await?;

        let written = async {
            let mut written = 0u64;
            while let Some(chunk) = data.next().await {
                let chunk = chunk?;
                out.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            out.sync_all().await?;
            Ok::<u64, StorageError>(written)
        }
        .await;
        drop(out);

        let written = match written {
            Ok(written) => written,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&temp_path).await {
                    tracing::warn!(
                        path = %temp_path.display(),
                        error = %cleanup,
                        "Failed to remove temp file after aborted write"
                    );
                }
                return Err(e);
            }
        };

        fs::rename(&temp_path, &path).await?;
        tracing::debug!(key = %key, size = written, "File written");

        let mut details = BackendDetails::new();
        details.insert(
            "path".to_string(),
            serde_json::Value::String(path.to_string_lossy().into_owned()),
        );
        Ok(details)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete_file(&self, upload: &UploadId, file: &FileId) -> StorageResult<()> {
        let key = Self::file_key(upload, file);
        let path = self.key_path(&key).await?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete_upload(&self, upload: &UploadId) -> StorageResult<()> {
        let key = Self::upload_key(upload);
        let path = self.key_path(&key).await?;
        match fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}
