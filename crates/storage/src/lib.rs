//! Storage backends for ferry file contents.
//!
//! This crate provides:
//! - The [`DataBackend`] capability trait consumed by the transfer pipeline
//! - Streaming writes that never leave a partial object behind
//! - Backends: local filesystem and S3-compatible

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, DataBackend};

use ferry_core::config::StorageConfig;
use std::sync::Arc;

/// Create a data backend from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn DataBackend>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => {
            let backend = S3Backend::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?;
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use ferry_core::{FileId, UploadId};
    use futures::StreamExt;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().join("files"),
        };

        let backend = from_config(&config).await.unwrap();
        assert_eq!(backend.backend_name(), "filesystem");
        backend.health_check().await.unwrap();

        let upload = UploadId::new();
        let file = FileId::new();
        let data: ByteStream = Box::pin(futures::stream::once(async {
            Ok::<_, StorageError>(Bytes::from_static(b"hi"))
        }));
        backend.write_file(&upload, &file, data).await.unwrap();

        let mut stream = backend.read_file(&upload, &file).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"hi"));
    }

    #[tokio::test]
    async fn from_config_s3_ok() {
        let config = StorageConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: Some("minio:9000".to_string()),
            region: Some("us-east-1".to_string()),
            prefix: Some("ferry".to_string()),
            access_key_id: None,
            secret_access_key: None,
            force_path_style: true,
        };

        let backend = from_config(&config).await.unwrap();
        assert_eq!(backend.backend_name(), "s3");
    }

    #[tokio::test]
    async fn from_config_rejects_partial_credentials() {
        let config = StorageConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("access".to_string()),
            secret_access_key: None,
            force_path_style: false,
        };

        match from_config(&config).await {
            Ok(_) => panic!("expected error"),
            Err(StorageError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
