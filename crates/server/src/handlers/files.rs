//! File download and removal handlers.

use crate::auth::check_password;
use crate::error::{ApiError, ApiResult, EgressError};
use crate::handlers::common::{content_disposition, load_upload, parse_file_id};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::Response;
use ferry_core::File;
use serde::Deserialize;

/// Query parameters accepted on download paths.
#[derive(Debug, Default, Deserialize)]
pub struct FileQuery {
    /// One-time token for token-protected uploads.
    pub token: Option<String>,
    /// Present to download as an attachment instead of displaying inline.
    pub dl: Option<String>,
}

/// Everything one download request asks for.
struct Egress<'a> {
    upload_id: &'a str,
    file_id: &'a str,
    file_name: Option<&'a str>,
    token: Option<&'a str>,
    attachment: bool,
    with_body: bool,
}

async fn serve_file(state: &AppState, egress: Egress<'_>, headers: &HeaderMap) -> ApiResult<Response> {
    let now = ferry_core::now_unix();
    let upload = load_upload(state, egress.upload_id, now).await?;
    let file_id = parse_file_id(egress.file_id)?;

    let file = state
        .pipeline
        .authorize(&upload, &file_id, egress.token, headers, now)
        .await?;
    if let Some(name) = egress.file_name
        && name != file.name
    {
        return Err(ApiError::NotFound(format!("file {name} not found")));
    }

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, file.content_type.as_str())
        .header(CONTENT_LENGTH, file.size)
        .header(
            CONTENT_DISPOSITION,
            content_disposition(&file.name, egress.attachment),
        );

    let body = if egress.with_body {
        Body::from_stream(state.pipeline.open(&upload, file).await?)
    } else {
        Body::empty()
    };

    response
        .body(body)
        .map_err(|e| ApiError::Internal(format!("failed to build response: {e}")))
}

/// GET /upload/{upload_id}/file/{file_id} - Download a file.
pub async fn get_file(
    State(state): State<AppState>,
    Path((upload_id, file_id)): Path<(String, String)>,
    Query(query): Query<FileQuery>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, EgressError> {
    let egress = Egress {
        upload_id: &upload_id,
        file_id: &file_id,
        file_name: None,
        token: query.token.as_deref(),
        attachment: query.dl.is_some(),
        with_body: true,
    };
    serve_file(&state, egress, &headers)
        .await
        .map_err(|e| EgressError::new(e, &headers, &uri.to_string()))
}

/// GET /file/{upload_id}/{file_id}/{file_name} - Download through a pretty link.
pub async fn get_file_by_name(
    State(state): State<AppState>,
    Path((upload_id, file_id, file_name)): Path<(String, String, String)>,
    Query(query): Query<FileQuery>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, EgressError> {
    let egress = Egress {
        upload_id: &upload_id,
        file_id: &file_id,
        file_name: Some(&file_name),
        token: query.token.as_deref(),
        attachment: query.dl.is_some(),
        with_body: true,
    };
    serve_file(&state, egress, &headers)
        .await
        .map_err(|e| EgressError::new(e, &headers, &uri.to_string()))
}

/// HEAD /file/{upload_id}/{file_id}/{file_name} - Same checks and headers, no body.
pub async fn head_file_by_name(
    State(state): State<AppState>,
    Path((upload_id, file_id, file_name)): Path<(String, String, String)>,
    Query(query): Query<FileQuery>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, EgressError> {
    let egress = Egress {
        upload_id: &upload_id,
        file_id: &file_id,
        file_name: Some(&file_name),
        token: query.token.as_deref(),
        attachment: query.dl.is_some(),
        with_body: false,
    };
    serve_file(&state, egress, &headers)
        .await
        .map_err(|e| EgressError::new(e, &headers, &uri.to_string()))
}

/// GET /file/{upload_id}/{file_id}/{file_name}/token/{token} - Token-protected pretty link.
pub async fn get_file_with_token(
    State(state): State<AppState>,
    Path((upload_id, file_id, file_name, token)): Path<(String, String, String, String)>,
    Query(query): Query<FileQuery>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, EgressError> {
    let egress = Egress {
        upload_id: &upload_id,
        file_id: &file_id,
        file_name: Some(&file_name),
        token: Some(&token),
        attachment: query.dl.is_some(),
        with_body: true,
    };
    serve_file(&state, egress, &headers)
        .await
        .map_err(|e| EgressError::new(e, &headers, &uri.to_string()))
}

/// DELETE /upload/{upload_id}/file/{file_id} - Remove a file from a removable upload.
pub async fn remove_file(
    State(state): State<AppState>,
    Path((upload_id, file_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<File>> {
    let upload = load_upload(&state, &upload_id, ferry_core::now_unix()).await?;
    check_password(&upload, &headers)?;
    let file_id = parse_file_id(&file_id)?;

    let mut file = state.lifecycle.remove_file(&upload, &file_id).await?;
    file.sanitize();
    Ok(Json(file))
}
