//! Shared handler helpers.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use ferry_core::{FileId, Upload, UploadId};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use std::convert::Infallible;
use std::net::SocketAddr;

/// Address of the connected peer, when the server exposes it.
#[derive(Clone, Copy, Debug)]
pub struct ClientAddr(pub Option<SocketAddr>);

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0),
        ))
    }
}

/// Load an upload that is still live at `now`.
///
/// Malformed ids, unknown ids and expired uploads all answer not-found.
pub async fn load_upload(state: &AppState, upload_id: &str, now: i64) -> ApiResult<Upload> {
    let id = UploadId::parse(upload_id)
        .map_err(|_| ApiError::NotFound(format!("upload {upload_id} not found")))?;

    let upload = state.metadata.get_upload(&id).await.map_err(|e| {
        if e.is_not_found() {
            ApiError::NotFound(format!("upload {upload_id} not found"))
        } else {
            ApiError::Metadata(e)
        }
    })?;

    if upload.is_expired(now) {
        return Err(ApiError::NotFound(format!("upload {upload_id} has expired")));
    }
    Ok(upload)
}

/// Parse a file id from a path segment; malformed ids are not-found.
pub fn parse_file_id(file_id: &str) -> ApiResult<FileId> {
    FileId::parse(file_id).map_err(|_| ApiError::NotFound(format!("file {file_id} not found")))
}

/// `Content-Disposition` value for serving `name` inline or as a download.
///
/// The quoted `filename` is restricted to printable ASCII; names outside
/// it are also sent percent-encoded as `filename*`.
pub fn content_disposition(name: &str, attachment: bool) -> String {
    let kind = if attachment { "attachment" } else { "inline" };
    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    if fallback == name {
        format!("{kind}; filename=\"{fallback}\"")
    } else {
        format!(
            "{kind}; filename=\"{fallback}\"; filename*=UTF-8''{}",
            utf8_percent_encode(name, NON_ALPHANUMERIC)
        )
    }
}
