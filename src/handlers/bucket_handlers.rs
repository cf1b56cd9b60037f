//! Native JSON handlers for bucket lifecycle under `/api/v1/buckets`.

use crate::{
    errors::AppError,
    handlers::{MessageResponse, PageQuery},
    models::{
        actor::Actor,
        bucket::{Bucket, BucketChanges, NewBucket},
    },
    services::storage_service::StorageService,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateBucketRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBucketRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct BucketResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Bucket> for BucketResponse {
    fn from(bucket: Bucket) -> Self {
        Self {
            id: bucket.id,
            name: bucket.name,
            description: bucket.description,
            is_public: bucket.is_public,
            created_at: bucket.created_at,
            updated_at: bucket.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BucketListResponse {
    pub buckets: Vec<BucketResponse>,
    pub total: i64,
    pub limit: usize,
    pub offset: usize,
}

/// `POST /buckets`
pub async fn create_bucket(
    State(service): State<StorageService>,
    actor: Actor,
    payload: Result<Json<CreateBucketRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    tracing::debug!("Create bucket endpoint called");
    let Json(req) = payload.map_err(|err| AppError::bad_request(err.body_text()))?;

    let bucket = service
        .create_bucket(
            &actor,
            NewBucket {
                name: req.name,
                description: req.description,
                is_public: req.is_public,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(BucketResponse::from(bucket))))
}

/// `GET /buckets?limit=&offset=`
pub async fn list_buckets(
    State(service): State<StorageService>,
    actor: Actor,
    Query(q): Query<PageQuery>,
) -> Result<Json<BucketListResponse>, AppError> {
    tracing::debug!("List buckets endpoint called");
    let (limit, offset) = q.bounds();
    let page = service.list_buckets(&actor, limit, offset).await?;

    Ok(Json(BucketListResponse {
        buckets: page.buckets.into_iter().map(BucketResponse::from).collect(),
        total: page.total,
        limit,
        offset,
    }))
}

/// `GET /buckets/{id}`
pub async fn get_bucket(
    State(service): State<StorageService>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<BucketResponse>, AppError> {
    let bucket = service.get_bucket(&actor, id.into()).await?;
    Ok(Json(bucket.into()))
}

/// `PUT /buckets/{id}`: owner edits name, description or visibility.
pub async fn update_bucket(
    State(service): State<StorageService>,
    actor: Actor,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateBucketRequest>, JsonRejection>,
) -> Result<Json<BucketResponse>, AppError> {
    let Json(req) = payload.map_err(|err| AppError::bad_request(err.body_text()))?;
    let changes = BucketChanges {
        name: req.name,
        description: req.description,
        is_public: req.is_public,
    };
    let bucket = service.update_bucket(&actor, id, changes).await?;
    Ok(Json(bucket.into()))
}

/// `DELETE /buckets/{id}`: only empty buckets can be deleted.
pub async fn delete_bucket(
    State(service): State<StorageService>,
    actor: Actor,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    service.delete_bucket(&actor, id).await?;
    Ok(Json(MessageResponse::new("Bucket deleted successfully")))
}
