//! Represents an object (file) stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Metadata for a single object within a bucket.
///
/// The row describes the bytes last written under `key`; the payload
/// itself lives on disk at `storage_path` (relative to the storage root).
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Object {
    pub id: i64,

    /// Parent bucket.
    pub bucket_id: i64,

    /// Object key; may contain `/` for hierarchical names.
    pub key: String,

    /// Resolved location relative to the storage root. Always derived by
    /// the path resolver, never taken from a client.
    pub storage_path: String,

    /// MIME type recorded at upload.
    pub content_type: String,

    /// Size in bytes.
    pub size: i64,

    /// Lowercase hex MD5 of the stored bytes.
    pub etag: String,

    /// Actor that performed the most recent write.
    pub owner_id: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Object {
    /// Last path segment of the key, used for download file names.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// Values written by an upload, used for both insert and in-place update.
#[derive(Debug, Clone)]
pub struct ObjectWrite {
    pub bucket_id: i64,
    pub key: String,
    pub storage_path: String,
    pub content_type: String,
    pub size: i64,
    pub etag: String,
    pub owner_id: i64,
}
