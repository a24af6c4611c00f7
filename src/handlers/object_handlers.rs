//! HTTP handlers for container and object operations.
//!
//! Object bodies are streamed in and out. An upload into the raw-uploads
//! container is the trigger for the resize worker.

use crate::{
    errors::AppError,
    models::{container::Container, object::Object},
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::io;
use tokio_util::io::ReaderStream;
use tracing::info;

/// `PUT /{container}/{*key}` — upload an object.
///
/// Uploads into the raw-uploads container are answered with 202 and handed
/// to the worker in the background.
pub async fn upload_object(
    State(state): State<AppState>,
    Path((container, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let object = state
        .storage
        .upload_object_stream(&container, &key, content_type, stream)
        .await?;

    let mut status = StatusCode::OK;
    if container == state.raw_container {
        let worker = state.worker.clone();
        info!(key = %key, "source uploaded, triggering resize");
        tokio::spawn(async move {
            // outcome is logged by the worker
            let _ = worker.handle_stored(key).await;
        });
        status = StatusCode::ACCEPTED;
    }

    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    if let Some(etag) = object.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            response.headers_mut().insert(header::ETAG, value);
        }
    }
    Ok(response)
}

/// `GET /{container}/{*key}` — stream an object out.
pub async fn get_object(
    State(state): State<AppState>,
    Path((container, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (meta, file) = state.storage.get_object_reader(&container, &key).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    set_object_headers(response.headers_mut(), &meta);
    Ok(response)
}

/// `HEAD /{container}/{*key}` — same headers as GET, no body.
pub async fn head_object(
    State(state): State<AppState>,
    Path((container, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let meta = state.storage.get_object_metadata(&container, &key).await?;
    let mut response = Response::new(Body::empty());
    set_object_headers(response.headers_mut(), &meta);
    Ok(response)
}

/// `DELETE /{container}/{*key}`
pub async fn delete_object(
    State(state): State<AppState>,
    Path((container, key)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.storage.delete_object(&container, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /{container}` — live objects as JSON, ordered by key.
pub async fn list_objects(
    State(state): State<AppState>,
    Path(container): Path<String>,
) -> Result<Json<Vec<Object>>, AppError> {
    Ok(Json(state.storage.list_objects(&container).await?))
}

/// `PUT /{container}`
pub async fn create_container(
    State(state): State<AppState>,
    Path(container): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let created: Container = state.storage.create_container(&container).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `DELETE /{container}` — removes the container and everything in it.
pub async fn delete_container(
    State(state): State<AppState>,
    Path(container): Path<String>,
) -> Result<StatusCode, AppError> {
    state.storage.delete_container(&container).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn set_object_headers(headers: &mut HeaderMap, meta: &Object) {
    let content_type = meta
        .content_type
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size_bytes.max(0)));

    if let Some(etag) = meta.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&meta.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
