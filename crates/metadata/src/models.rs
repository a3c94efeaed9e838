//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use ferry_core::{BackendDetails, File, FileId, Upload, UploadId, UploadToken};
use sqlx::FromRow;
use std::collections::BTreeMap;

// =============================================================================
// Uploads
// =============================================================================

/// Upload record, one row per upload.
#[derive(Debug, Clone, FromRow)]
pub struct UploadRow {
    pub upload_id: String,
    pub creation: i64,
    pub ttl: i64,
    pub one_shot: bool,
    pub removable: bool,
    pub upload_token: Option<String>,
    pub remote_ip: String,
    pub short_url: Option<String>,
    pub comments: String,
    pub protected_by_password: bool,
    pub login: String,
    /// Credential hash, never the cleartext password.
    pub password: String,
    pub protected_by_token: bool,
    pub token_prefix: String,
}

impl UploadRow {
    pub fn from_upload(upload: &Upload) -> Self {
        Self {
            upload_id: upload.id.as_str().to_string(),
            creation: upload.creation,
            ttl: upload.ttl,
            one_shot: upload.one_shot,
            removable: upload.removable,
            upload_token: upload
                .upload_token
                .as_ref()
                .map(|t| t.as_str().to_string()),
            remote_ip: upload.remote_ip.clone(),
            short_url: upload.short_url.clone(),
            comments: upload.comments.clone(),
            protected_by_password: upload.protected_by_password,
            login: upload.login.clone(),
            password: upload.password.clone(),
            protected_by_token: upload.protected_by_token,
            token_prefix: upload.token_prefix.clone(),
        }
    }

    /// Assemble the domain record from this row and its file rows.
    pub fn into_upload(self, files: Vec<FileRow>) -> MetadataResult<Upload> {
        let files = files
            .into_iter()
            .map(|row| row.into_file().map(|file| (file.id.clone(), file)))
            .collect::<MetadataResult<BTreeMap<_, _>>>()?;

        Ok(Upload {
            id: UploadId::parse(&self.upload_id)?,
            creation: self.creation,
            ttl: self.ttl,
            one_shot: self.one_shot,
            removable: self.removable,
            upload_token: self.upload_token.map(UploadToken::from_string),
            remote_ip: self.remote_ip,
            short_url: self.short_url,
            comments: self.comments,
            protected_by_password: self.protected_by_password,
            login: self.login,
            password: self.password,
            protected_by_token: self.protected_by_token,
            token_prefix: self.token_prefix,
            files,
        })
    }
}

// =============================================================================
// Files
// =============================================================================

/// File record, keyed by `(upload_id, file_id)`.
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub upload_id: String,
    pub file_id: String,
    pub name: String,
    pub content_type: String,
    pub size: i64,
    pub digest: String,
    pub upload_date: i64,
    pub status: String,
    /// Backend details as a JSON object.
    pub backend_details: String,
}

impl FileRow {
    pub fn from_file(upload_id: &UploadId, file: &File) -> MetadataResult<Self> {
        let size = i64::try_from(file.size)
            .map_err(|_| MetadataError::Corrupt(format!("file size {} out of range", file.size)))?;

        Ok(Self {
            upload_id: upload_id.as_str().to_string(),
            file_id: file.id.as_str().to_string(),
            name: file.name.clone(),
            content_type: file.content_type.clone(),
            size,
            digest: file.digest.clone(),
            upload_date: file.upload_date,
            status: file.status.as_str().to_string(),
            backend_details: serde_json::to_string(&file.backend_details)?,
        })
    }

    pub fn into_file(self) -> MetadataResult<File> {
        let size = u64::try_from(self.size).map_err(|_| {
            MetadataError::Corrupt(format!("negative size for file {}", self.file_id))
        })?;
        let backend_details: BackendDetails = if self.backend_details.is_empty() {
            BackendDetails::new()
        } else {
            serde_json::from_str(&self.backend_details)?
        };

        Ok(File {
            id: FileId::parse(&self.file_id)?,
            name: self.name,
            content_type: self.content_type,
            size,
            digest: self.digest,
            upload_date: self.upload_date,
            status: self.status.parse()?,
            backend_details,
        })
    }
}
