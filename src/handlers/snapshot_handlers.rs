//! HTTP handlers for snapshot capture and retrieval.
//! Request parsing and header shaping live here; capture, dedup and codec
//! work is delegated to `SnapshotService`.

use crate::{
    errors::AppError,
    models::snapshot::{Compression, Snapshot},
    services::{
        render::RenderDecision,
        snapshot_service::{CaptureRequest, SnapshotService},
    },
};
use axum::{
    Json,
    body::Body,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use uuid::Uuid;

const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
const X_CONTENT_HASH: HeaderName = HeaderName::from_static("x-content-hash");
const X_CHECKSUM: HeaderName = HeaderName::from_static("x-checksum");
const X_SNAPSHOT_ID: HeaderName = HeaderName::from_static("x-snapshot-id");
const X_ORIGINAL_SIZE: HeaderName = HeaderName::from_static("x-original-size");
const X_COMPRESSION: HeaderName = HeaderName::from_static("x-leenkz-compression");
const X_RENDERABLE: HeaderName = HeaderName::from_static("x-leenkz-renderable");

/// Request body for `POST /links/{link_id}/snapshot`.
#[derive(Debug, Deserialize)]
pub struct CreateSnapshotReq {
    pub url: String,
    #[serde(default)]
    pub compression: Compression,
    #[serde(default)]
    pub force: bool,
}

/// `POST /links/{link_id}/snapshot`
///
/// 201 with the new snapshot, or 208 with the existing one when the link
/// already holds identical content. Both carry `X-Content-Hash`.
pub async fn create_snapshot(
    State(service): State<SnapshotService>,
    link_id: Result<Path<i64>, PathRejection>,
    headers: HeaderMap,
    body: Result<Json<CreateSnapshotReq>, JsonRejection>,
) -> Result<Response, AppError> {
    let Path(link_id) = link_id.map_err(|e| AppError::unprocessable(e.body_text()))?;
    let Json(req) = body.map_err(|e| AppError::unprocessable(e.body_text()))?;
    let requested_by = requested_by(&headers)?;

    let outcome = service
        .create_snapshot(CaptureRequest {
            link_id,
            source_url: req.url,
            compression: req.compression,
            force: req.force,
            requested_by,
        })
        .await?;

    let status = if outcome.is_new {
        StatusCode::CREATED
    } else {
        StatusCode::ALREADY_REPORTED
    };
    let mut response = (status, Json(&outcome.snapshot)).into_response();
    insert_header(
        response.headers_mut(),
        X_CONTENT_HASH,
        &outcome.snapshot.content_hash,
    );
    Ok(response)
}

/// `GET /links/{link_id}/snapshots`, newest first.
pub async fn list_snapshots(
    State(service): State<SnapshotService>,
    link_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<Snapshot>>, AppError> {
    let Path(link_id) = link_id.map_err(|e| AppError::unprocessable(e.body_text()))?;
    Ok(Json(service.list_snapshots(link_id).await?))
}

/// `GET /snapshots/{id}`
pub async fn get_snapshot(
    State(service): State<SnapshotService>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Snapshot>, AppError> {
    let id = snapshot_id(id)?;
    Ok(Json(service.get_snapshot(id).await?))
}

/// `GET /snapshots/{id}/raw`: the original bytes as an attachment.
pub async fn get_snapshot_raw(
    State(service): State<SnapshotService>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let id = snapshot_id(id)?;
    let (snapshot, bytes) = service.get_raw(id).await?;

    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    insert_header(headers, header::CONTENT_TYPE, &snapshot.mime_type);
    let disposition = format!(
        "attachment; filename=\"snapshot-{}{}\"",
        snapshot.id,
        extension_for(&snapshot.mime_type)
    );
    insert_header(headers, header::CONTENT_DISPOSITION, &disposition);
    set_snapshot_headers(headers, &snapshot);

    Ok(response)
}

/// `GET /snapshots/{id}/render`
///
/// 415 when the stored type is not safe to show inline; clients fall back
/// to `/raw`.
pub async fn render_snapshot(
    State(service): State<SnapshotService>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let id = snapshot_id(id)?;
    let (snapshot, decision) = service.render(id).await?;

    let RenderDecision::Inline { content_type, body } = decision else {
        return Err(AppError::unsupported_media_type(format!(
            "snapshot of type {} cannot be rendered; download /snapshots/{}/raw instead",
            snapshot.mime_type, snapshot.id
        )));
    };

    let mut response = Response::new(Body::from(body.into_bytes()));
    let headers = response.headers_mut();
    insert_header(headers, header::CONTENT_TYPE, &content_type);
    insert_header(headers, header::CONTENT_DISPOSITION, "inline");
    insert_header(headers, X_RENDERABLE, "true");
    set_snapshot_headers(headers, &snapshot);

    Ok(response)
}

/// `DELETE /snapshots/{id}`
pub async fn delete_snapshot(
    State(service): State<SnapshotService>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let id = snapshot_id(id)?;
    service.delete_snapshot(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn snapshot_id(id: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, AppError> {
    id.map(|Path(id)| id)
        .map_err(|e| AppError::unprocessable(e.body_text()))
}

fn requested_by(headers: &HeaderMap) -> Result<Option<i64>, AppError> {
    let Some(value) = headers.get(X_USER_ID) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(Some)
        .ok_or_else(|| AppError::unprocessable("X-User-Id must be an integer"))
}

fn set_snapshot_headers(headers: &mut HeaderMap, snapshot: &Snapshot) {
    insert_header(headers, X_SNAPSHOT_ID, &snapshot.id.to_string());
    insert_header(headers, X_ORIGINAL_SIZE, &snapshot.size_original.to_string());
    insert_header(headers, X_COMPRESSION, snapshot.compression.as_str());
    insert_header(headers, X_CONTENT_HASH, &snapshot.content_hash);
    // alias of X-Content-Hash
    insert_header(headers, X_CHECKSUM, &snapshot.content_hash);
    if let Some(etag) = snapshot.etag.as_deref() {
        insert_header(headers, header::ETAG, etag);
    }
    if let Some(modified) = snapshot.last_modified {
        let http_date = modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        insert_header(headers, header::LAST_MODIFIED, &http_date);
    }
}

/// Values that are not valid header text (e.g. a hostile upstream ETag) are
/// skipped rather than failing the response.
fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(header_value) = HeaderValue::from_str(value) {
        headers.insert(name, header_value);
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "text/html" => ".html",
        "text/plain" => ".txt",
        "text/markdown" => ".md",
        "text/css" => ".css",
        "text/javascript" => ".js",
        "application/json" => ".json",
        "application/xml" | "text/xml" => ".xml",
        "application/pdf" => ".pdf",
        "application/zip" => ".zip",
        "application/gzip" => ".gz",
        "image/png" => ".png",
        "image/jpeg" => ".jpg",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/svg+xml" => ".svg",
        _ => ".bin",
    }
}
