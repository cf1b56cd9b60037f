//! Defines routes for both API surfaces.
//!
//! ## Structure
//! - **Health**
//!   - `GET /healthz`, `GET /readyz`
//!
//! - **Native JSON API** (nested under `/api/v1`)
//!   - `POST   /buckets`: create bucket
//!   - `GET    /buckets`: list own buckets (limit, offset)
//!   - `GET    /buckets/{bucket_id}`: get bucket
//!   - `PUT    /buckets/{bucket_id}`: update bucket settings
//!   - `DELETE /buckets/{bucket_id}`: delete empty bucket
//!   - `POST   /buckets/{bucket_id}/files`: multipart upload
//!   - `GET    /buckets/{bucket_id}/files`: list objects (prefix, limit, offset)
//!   - `GET    /buckets/{bucket_id}/files/{file_id}`: object metadata
//!   - `GET    /buckets/{bucket_id}/files/{file_id}/download`: stream bytes
//!   - `DELETE /buckets/{bucket_id}/files/{file_id}`: delete object
//!
//! - **S3-compatible API** (path-style, at the root)
//!   - `GET    /`: list own buckets
//!   - `GET    /{bucket}`: list objects (prefix, max-keys)
//!   - `PUT    /{bucket}/{*key}`: upload object
//!   - `GET    /{bucket}/{*key}`: download object
//!   - `HEAD   /{bucket}/{*key}`: metadata only
//!   - `DELETE /{bucket}/{*key}`: delete object
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    app_state::AppState,
    handlers::{
        bucket_handlers::{create_bucket, delete_bucket, get_bucket, list_buckets, update_bucket},
        file_handlers::{
            MAX_UPLOAD_BYTES, delete_file, download_file, get_file, list_files, upload_file,
        },
        health_handlers::{healthz, readyz},
        s3_handlers,
    },
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the full application router.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest("/api/v1", native_routes())
        .merge(s3_routes())
}

fn native_routes() -> Router<AppState> {
    Router::new()
        .route("/buckets", post(create_bucket).get(list_buckets))
        .route(
            "/buckets/{bucket_id}",
            get(get_bucket).put(update_bucket).delete(delete_bucket),
        )
        .route(
            "/buckets/{bucket_id}/files",
            post(upload_file)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
                .get(list_files),
        )
        .route(
            "/buckets/{bucket_id}/files/{file_id}",
            get(get_file).delete(delete_file),
        )
        .route(
            "/buckets/{bucket_id}/files/{file_id}/download",
            get(download_file),
        )
}

fn s3_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(s3_handlers::list_buckets))
        // Object-level routes
        .route(
            "/{bucket}/{*key}",
            get(s3_handlers::get_object)
                .put(s3_handlers::put_object)
                .head(s3_handlers::head_object)
                .delete(s3_handlers::delete_object),
        )
        // Bucket-level routes
        .route("/{bucket}", get(s3_handlers::list_objects))
}
