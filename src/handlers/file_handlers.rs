//! Native JSON handlers for objects under `/api/v1/buckets/{bucketId}/files`.
//! Uploads arrive as multipart forms and are streamed straight into the
//! storage service; downloads stream the file back without buffering.

use crate::{
    errors::AppError,
    handlers::{MessageResponse, PageQuery},
    models::{actor::Actor, object::Object},
    services::storage_service::{ListObjectsParams, StorageService},
};
use axum::{
    Json,
    body::Body,
    extract::{
        Multipart, Path, Query, State,
        multipart::MultipartRejection,
    },
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::io;
use tokio_util::io::ReaderStream;

/// Largest multipart body accepted by the upload endpoint.
pub const MAX_UPLOAD_BYTES: usize = 100 << 20;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ObjectResponse {
    pub id: i64,
    pub key: String,
    pub bucket_id: i64,
    pub content_type: String,
    pub size: i64,
    /// Hex digest of the content, unquoted.
    pub etag: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Object> for ObjectResponse {
    fn from(object: Object) -> Self {
        Self {
            id: object.id,
            key: object.key,
            bucket_id: object.bucket_id,
            content_type: object.content_type,
            size: object.size,
            etag: object.etag,
            created_at: object.created_at,
            updated_at: object.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ObjectListResponse {
    pub files: Vec<ObjectResponse>,
    pub total: i64,
    pub limit: usize,
    pub offset: usize,
}

/// `POST /buckets/{bucketId}/files`
///
/// Expects a `file` part. The object key is the part's file name unless a
/// `key` text part precedes it.
pub async fn upload_file(
    State(service): State<StorageService>,
    actor: Actor,
    Path(bucket_id): Path<i64>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ObjectResponse>, AppError> {
    tracing::debug!("Upload file endpoint called");
    let mut multipart = multipart.map_err(|_| AppError::bad_request("Failed to parse form"))?;
    let mut key_override: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::bad_request("Failed to parse form"))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("key") => {
                let key = field
                    .text()
                    .await
                    .map_err(|_| AppError::bad_request("Failed to parse form"))?;
                key_override = Some(key);
            }
            Some("file") => {
                let key = key_override
                    .take()
                    .filter(|k| !k.is_empty())
                    .or_else(|| field.file_name().map(str::to_owned))
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| AppError::bad_request("Invalid file name"))?;
                let content_type = field.content_type().map(str::to_owned);
                let stream = field.map(|chunk| chunk.map_err(io::Error::other));

                let object = service
                    .put_object(&actor, bucket_id.into(), &key, content_type, stream)
                    .await?;
                return Ok(Json(object.into()));
            }
            _ => continue,
        }
    }

    Err(AppError::bad_request("No file provided"))
}

/// `GET /buckets/{bucketId}/files?prefix=&limit=&offset=`
pub async fn list_files(
    State(service): State<StorageService>,
    actor: Actor,
    Path(bucket_id): Path<i64>,
    Query(q): Query<PageQuery>,
) -> Result<Json<ObjectListResponse>, AppError> {
    tracing::debug!("List files endpoint called");
    let (limit, offset) = q.bounds();
    let params = ListObjectsParams {
        prefix: q.prefix.clone(),
        limit,
        offset,
    };
    let page = service
        .list_objects(&actor, bucket_id.into(), &params)
        .await?;

    Ok(Json(ObjectListResponse {
        files: page.objects.into_iter().map(ObjectResponse::from).collect(),
        total: page.total,
        limit,
        offset,
    }))
}

/// `GET /buckets/{bucketId}/files/{fileId}`
pub async fn get_file(
    State(service): State<StorageService>,
    actor: Actor,
    Path((bucket_id, file_id)): Path<(i64, i64)>,
) -> Result<Json<ObjectResponse>, AppError> {
    let object = service
        .get_object_by_id(&actor, bucket_id, file_id)
        .await?;
    Ok(Json(object.into()))
}

/// `GET /buckets/{bucketId}/files/{fileId}/download`
pub async fn download_file(
    State(service): State<StorageService>,
    actor: Actor,
    Path((bucket_id, file_id)): Path<(i64, i64)>,
) -> Result<Response, AppError> {
    let (object, file) = service
        .open_object_by_id(&actor, bucket_id, file_id)
        .await?;
    tracing::info!(file_id, bucket_id, "file download started");

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&object.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(object.size.max(0)));
    if let Ok(etag) = HeaderValue::from_str(&object.etag) {
        headers.insert(header::ETAG, etag);
    }
    let disposition = format!(
        "attachment; filename=\"{}\"",
        object.file_name().replace('"', "")
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}

/// `DELETE /buckets/{bucketId}/files/{fileId}`: owner only.
pub async fn delete_file(
    State(service): State<StorageService>,
    actor: Actor,
    Path((bucket_id, file_id)): Path<(i64, i64)>,
) -> Result<Json<MessageResponse>, AppError> {
    service
        .delete_object_by_id(&actor, bucket_id, file_id)
        .await?;
    Ok(Json(MessageResponse::new("File deleted successfully")))
}
