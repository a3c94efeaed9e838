//! Upload session handlers.

use crate::auth::check_password;
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{ClientAddr, load_upload};
use crate::metrics::UPLOADS_CREATED;
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use ferry_core::access::{
    DEFAULT_LOGIN, TOKEN_LENGTH, encode_basic_credentials, hash_basic_credentials, token_prefix,
};
use ferry_core::{File, Upload};
use serde::Deserialize;

/// Header carrying the upload token on file additions.
pub const UPLOAD_TOKEN_HEADER: &str = "x-uploadtoken";

/// Options accepted when creating an upload. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateUploadRequest {
    /// Time-to-live in seconds; 0 asks for an upload that never expires.
    pub ttl: Option<i64>,
    pub one_shot: bool,
    pub removable: bool,
    pub comments: String,
    pub login: Option<String>,
    pub password: Option<String>,
    /// One-time token whose device will be required for downloads.
    pub token: Option<String>,
}

/// POST /upload - Create an upload session.
#[tracing::instrument(skip_all)]
pub async fn create_upload(
    State(state): State<AppState>,
    ClientAddr(addr): ClientAddr,
    body: Bytes,
) -> ApiResult<Response> {
    let request: CreateUploadRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateUploadRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid upload request: {e}")))?
    };

    let server = &state.config.server;
    let ttl = request.ttl.unwrap_or(server.default_ttl_secs);
    Upload::check_ttl(ttl, server.max_ttl_secs)?;

    let mut upload = Upload::new(ferry_core::now_unix(), ttl);
    upload.one_shot = request.one_shot;
    upload.removable = request.removable;
    upload.comments = request.comments;
    upload.remote_ip = addr.map(|a| a.ip().to_string()).unwrap_or_default();

    let mut authorization = None;
    if let Some(password) = request.password.filter(|p| !p.is_empty()) {
        let login = request
            .login
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| DEFAULT_LOGIN.to_string());
        let encoded = encode_basic_credentials(&login, &password);
        upload.protected_by_password = true;
        upload.password = hash_basic_credentials(&encoded);
        upload.login = login;
        authorization = Some(format!("Basic {encoded}"));
    }

    if let Some(token) = request.token.filter(|t| !t.is_empty()) {
        if !state.validator.is_enabled() {
            return Err(ApiError::BadRequest(
                "token protection is not enabled on this server".to_string(),
            ));
        }
        let prefix = token_prefix(&token)
            .filter(|_| token.len() == TOKEN_LENGTH)
            .ok_or_else(|| ApiError::BadRequest("invalid one-time token".to_string()))?
            .to_string();
        if !state.validator.validate(&token).await? {
            return Err(ApiError::Unauthorized(
                "one-time token was rejected".to_string(),
            ));
        }
        upload.protected_by_token = true;
        upload.token_prefix = prefix;
    }

    state.metadata.create_upload(&upload).await?;
    UPLOADS_CREATED.inc();
    tracing::info!(
        upload_id = %upload.id,
        ttl = upload.ttl,
        one_shot = upload.one_shot,
        removable = upload.removable,
        "Upload created"
    );

    // The creator needs the upload token to add files.
    let mut created = upload.sanitized();
    created.upload_token = upload.upload_token.clone();

    let mut response = Json(created).into_response();
    if let Some(value) = authorization {
        let value = HeaderValue::from_str(&value)
            .map_err(|e| ApiError::Internal(format!("invalid authorization header: {e}")))?;
        response.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(response)
}

/// GET /upload/{upload_id} - Fetch upload metadata.
pub async fn get_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Upload>> {
    let upload = load_upload(&state, &upload_id, ferry_core::now_unix()).await?;
    check_password(&upload, &headers)?;
    Ok(Json(upload.sanitized()))
}

/// POST /upload/{upload_id}/file - Stream one multipart file into the upload.
#[tracing::instrument(skip_all)]
pub async fn add_file(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<Json<File>> {
    let upload = load_upload(&state, &upload_id, ferry_core::now_unix()).await?;
    check_password(&upload, &headers)?;

    let presented = headers
        .get(UPLOAD_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !upload.token_matches(presented) {
        return Err(ApiError::NotFound(
            "invalid upload token in X-UploadToken header".to_string(),
        ));
    }

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field
            .file_name()
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("missing file name".to_string()))?;

        let mut file = state.pipeline.ingest(&upload, &name, field).await?;
        file.sanitize();
        return Ok(Json(file));
    }

    Err(ApiError::BadRequest("missing file part".to_string()))
}
