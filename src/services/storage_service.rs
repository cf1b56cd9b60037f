//! src/services/storage_service.rs
//!
//! StorageService: the object storage core shared by the native JSON API
//! and the S3-compatible API. Metadata lives in SQLite through the bucket
//! and object repositories; payloads live on disk beneath the content
//! store root at `{owner_id}/{bucket_id}/{key}`.
//!
//! Every operation resolves the bucket, applies the access policy, and
//! only then touches disk or metadata. Writes always land on disk before
//! the metadata row is committed, so a successful call never leaves a row
//! pointing at missing content.

use crate::{
    models::{
        actor::Actor,
        bucket::{Bucket, BucketChanges, NewBucket, non_empty},
        object::{Object, ObjectWrite},
    },
    repositories::{
        bucket_repository::BucketRepository, is_unique_violation,
        object_repository::ObjectRepository,
    },
    services::{
        access_policy::{Permission, permissions},
        content_store::{ContentError, ContentStore},
        path_resolver::{self, InvalidKey},
    },
};
use bytes::Bytes;
use futures::Stream;
use sqlx::SqlitePool;
use std::{io, path::Path, path::PathBuf, sync::Arc};
use thiserror::Error;
use tokio::fs::File;
use tracing::{debug, error, info, warn};

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const BUCKET_NAME_MIN_LEN: usize = 1;
const BUCKET_NAME_MAX_LEN: usize = 63;
const BUCKET_DESCRIPTION_MAX_LEN: usize = 500;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    Validation(String),
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("access denied")]
    Forbidden,
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{0}` is not empty")]
    BucketNotEmpty(String),
    #[error("invalid object key: {0}")]
    InvalidObjectKey(#[from] InvalidKey),
    #[error("object key `{0}` collides with the path of another key")]
    KeyConflict(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// How a caller names a bucket: the native API uses ids, the S3 API names.
#[derive(Debug, Clone, Copy)]
pub enum BucketRef<'a> {
    Id(i64),
    Name(&'a str),
}

impl From<i64> for BucketRef<'_> {
    fn from(id: i64) -> Self {
        BucketRef::Id(id)
    }
}

impl<'a> From<&'a str> for BucketRef<'a> {
    fn from(name: &'a str) -> Self {
        BucketRef::Name(name)
    }
}

impl BucketRef<'_> {
    fn label(&self) -> String {
        match self {
            BucketRef::Id(id) => id.to_string(),
            BucketRef::Name(name) => name.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ListObjectsParams {
    /// Left-anchored key filter; empty means no filter.
    pub prefix: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug)]
pub struct ObjectPage {
    pub objects: Vec<Object>,
    /// Number of objects matching the filter, ignoring pagination.
    pub total: i64,
}

#[derive(Debug)]
pub struct BucketPage {
    pub buckets: Vec<Bucket>,
    pub total: i64,
}

/// StorageService provides the bucket and object operations:
/// - Bucket lifecycle (create, list, get, update, delete-when-empty)
/// - Upload an object (stream to disk, then insert or update its row)
/// - Get object (metadata plus an open file for streaming)
/// - List objects (prefix filter, newest first, bounded page)
/// - Delete object (best-effort disk removal, then drop the row)
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,
    buckets: BucketRepository,
    objects: ObjectRepository,
    content: ContentStore,
}

impl StorageService {
    /// Create a new StorageService backed by the provided SQLite pool and
    /// using `base_path` as the root directory for object payloads.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            buckets: BucketRepository::new(db.clone()),
            objects: ObjectRepository::new(db.clone()),
            content: ContentStore::new(base_path),
            db,
        }
    }

    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    // ----- buckets -----------------------------------------------------

    /// Create a bucket owned by `actor`. Names are unique per owner.
    pub async fn create_bucket(&self, actor: &Actor, mut new: NewBucket) -> StorageResult<Bucket> {
        validate_bucket_name(&new.name)?;
        validate_description(new.description.as_deref())?;
        new.description = new.description.and_then(non_empty);

        if self.buckets.get_by_name(actor.id, &new.name).await?.is_some() {
            return Err(StorageError::BucketAlreadyExists(new.name));
        }

        let bucket = match self.buckets.create(actor.id, &new).await {
            Ok(bucket) => bucket,
            Err(err) if is_unique_violation(&err) => {
                return Err(StorageError::BucketAlreadyExists(new.name));
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            bucket_id = bucket.id,
            bucket_name = %bucket.name,
            user_id = actor.id,
            "bucket created"
        );
        Ok(bucket)
    }

    /// Buckets owned by `actor`, newest first.
    pub async fn list_buckets(
        &self,
        actor: &Actor,
        limit: usize,
        offset: usize,
    ) -> StorageResult<BucketPage> {
        ensure_limit(limit)?;
        let buckets = self
            .buckets
            .list(actor.id, limit as i64, offset as i64)
            .await?;
        let total = self.buckets.count(actor.id).await?;
        Ok(BucketPage { buckets, total })
    }

    /// A bucket the actor may read.
    pub async fn get_bucket(&self, actor: &Actor, bucket: BucketRef<'_>) -> StorageResult<Bucket> {
        self.resolve_bucket(actor, bucket, Permission::Read).await
    }

    /// Change name, description or visibility. Owner only.
    pub async fn update_bucket(
        &self,
        actor: &Actor,
        bucket_id: i64,
        changes: BucketChanges,
    ) -> StorageResult<Bucket> {
        let mut bucket = self
            .resolve_bucket(actor, bucket_id.into(), Permission::Delete)
            .await?;

        if let Some(name) = changes.name.as_deref() {
            validate_bucket_name(name)?;
        }
        validate_description(changes.description.as_deref())?;

        bucket.apply(changes);
        let updated = match self.buckets.update(&bucket).await {
            Ok(Some(updated)) => updated,
            Ok(None) => return Err(StorageError::BucketNotFound(bucket_id.to_string())),
            Err(err) if is_unique_violation(&err) => {
                return Err(StorageError::BucketAlreadyExists(bucket.name));
            }
            Err(err) => return Err(err.into()),
        };

        info!(bucket_id, user_id = actor.id, "bucket updated");
        Ok(updated)
    }

    /// Delete an empty bucket. Owner only; a bucket that still holds
    /// objects is refused rather than emptied.
    pub async fn delete_bucket(&self, actor: &Actor, bucket_id: i64) -> StorageResult<()> {
        let bucket = self
            .resolve_bucket(actor, bucket_id.into(), Permission::Delete)
            .await?;

        let object_count = self.objects.count(bucket.id).await?;
        if object_count > 0 {
            return Err(StorageError::BucketNotEmpty(bucket.name));
        }

        if !self.buckets.delete(bucket.id).await? {
            return Err(StorageError::BucketNotFound(bucket_id.to_string()));
        }

        let dir = path_resolver::bucket_dir(bucket.owner_id, bucket.id);
        if let Err(err) = self.content.remove_dir(&dir).await {
            warn!(
                "failed to remove bucket directory {} after delete: {}",
                dir.display(),
                err
            );
        }

        info!(bucket_id, user_id = actor.id, "bucket deleted");
        Ok(())
    }

    // ----- objects -----------------------------------------------------

    /// Stream an object into `bucket` under `key`, creating its record or
    /// updating the existing one in place (same id).
    pub async fn put_object<S>(
        &self,
        actor: &Actor,
        bucket: BucketRef<'_>,
        key: &str,
        content_type: Option<String>,
        stream: S,
    ) -> StorageResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let bucket = self.resolve_bucket(actor, bucket, Permission::Write).await?;
        let rel = path_resolver::resolve(bucket.owner_id, bucket.id, key)?;

        let existing = self.objects.get_by_key(bucket.id, key).await?;

        let stored = self
            .content
            .put(&rel, stream)
            .await
            .map_err(|err| content_error(err, key))?;

        let write = ObjectWrite {
            bucket_id: bucket.id,
            key: key.to_string(),
            storage_path: rel.to_string_lossy().into_owned(),
            content_type: content_type
                .filter(|ct| !ct.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.into()),
            size: stored.size,
            etag: stored.etag,
            owner_id: actor.id,
        };

        let object = self
            .commit(existing.map(|o| o.id), &write)
            .await
            .inspect_err(|err| {
                error!(
                    bucket_id = bucket.id,
                    key,
                    "content stored but metadata commit failed: {}",
                    err
                )
            })?;

        info!(
            object_id = object.id,
            bucket_id = bucket.id,
            key,
            size = object.size,
            user_id = actor.id,
            "object stored"
        );
        Ok(object)
    }

    /// Update the row in place when one exists; otherwise insert. An insert
    /// that loses a race against a concurrent upload of the same key is
    /// retried as an update of the winner's row.
    async fn commit(&self, existing_id: Option<i64>, write: &ObjectWrite) -> StorageResult<Object> {
        if let Some(id) = existing_id {
            if let Some(object) = self.objects.update(id, write).await? {
                return Ok(object);
            }
            debug!(object_id = id, "row vanished before update; inserting");
        }

        match self.objects.create(write).await {
            Ok(object) => Ok(object),
            Err(err) if is_unique_violation(&err) => {
                debug!(key = %write.key, "lost insert race; retrying as update");
                let current = self
                    .objects
                    .get_by_key(write.bucket_id, &write.key)
                    .await?
                    .ok_or_else(|| StorageError::ObjectNotFound(write.key.clone()))?;
                self.objects
                    .update(current.id, write)
                    .await?
                    .ok_or_else(|| StorageError::ObjectNotFound(write.key.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Metadata for `key` without opening its content.
    pub async fn stat_object(
        &self,
        actor: &Actor,
        bucket: BucketRef<'_>,
        key: &str,
    ) -> StorageResult<Object> {
        let bucket = self.resolve_bucket(actor, bucket, Permission::Read).await?;
        path_resolver::validate_key(key)?;
        self.objects
            .get_by_key(bucket.id, key)
            .await?
            .ok_or_else(|| StorageError::ObjectNotFound(key.to_string()))
    }

    /// Metadata plus an open handle on the stored bytes.
    pub async fn get_object(
        &self,
        actor: &Actor,
        bucket: BucketRef<'_>,
        key: &str,
    ) -> StorageResult<(Object, File)> {
        let object = self.stat_object(actor, bucket, key).await?;
        self.open(object).await
    }

    /// Metadata of object `object_id`, which must live in `bucket_id`.
    pub async fn get_object_by_id(
        &self,
        actor: &Actor,
        bucket_id: i64,
        object_id: i64,
    ) -> StorageResult<Object> {
        let bucket = self
            .resolve_bucket(actor, bucket_id.into(), Permission::Read)
            .await?;
        self.object_in_bucket(&bucket, object_id).await
    }

    pub async fn open_object_by_id(
        &self,
        actor: &Actor,
        bucket_id: i64,
        object_id: i64,
    ) -> StorageResult<(Object, File)> {
        let object = self.get_object_by_id(actor, bucket_id, object_id).await?;
        self.open(object).await
    }

    /// Delete `key` if present. Returns the removed record, or `None` when
    /// there was nothing to delete.
    pub async fn delete_object(
        &self,
        actor: &Actor,
        bucket: BucketRef<'_>,
        key: &str,
    ) -> StorageResult<Option<Object>> {
        let bucket = self
            .resolve_bucket(actor, bucket, Permission::Delete)
            .await?;
        path_resolver::validate_key(key)?;

        match self.objects.get_by_key(bucket.id, key).await? {
            Some(object) => {
                self.remove(&object, actor).await?;
                Ok(Some(object))
            }
            None => Ok(None),
        }
    }

    pub async fn delete_object_by_id(
        &self,
        actor: &Actor,
        bucket_id: i64,
        object_id: i64,
    ) -> StorageResult<Object> {
        let bucket = self
            .resolve_bucket(actor, bucket_id.into(), Permission::Delete)
            .await?;
        let object = self.object_in_bucket(&bucket, object_id).await?;
        self.remove(&object, actor).await?;
        Ok(object)
    }

    /// One page of a bucket's objects, newest first, plus the number of
    /// objects matching the prefix.
    pub async fn list_objects(
        &self,
        actor: &Actor,
        bucket: BucketRef<'_>,
        params: &ListObjectsParams,
    ) -> StorageResult<ObjectPage> {
        ensure_limit(params.limit)?;
        let bucket = self.resolve_bucket(actor, bucket, Permission::Read).await?;
        let limit = params.limit as i64;
        let offset = params.offset as i64;

        let page = match params.prefix.as_deref().filter(|p| !p.is_empty()) {
            Some(prefix) => ObjectPage {
                objects: self
                    .objects
                    .list_by_prefix(bucket.id, prefix, limit, offset)
                    .await?,
                total: self.objects.count_by_prefix(bucket.id, prefix).await?,
            },
            None => ObjectPage {
                objects: self.objects.list(bucket.id, limit, offset).await?,
                total: self.objects.count(bucket.id).await?,
            },
        };
        Ok(page)
    }

    // ----- helpers -----------------------------------------------------

    /// Load a bucket and require `needed` on it.
    ///
    /// Buckets the actor cannot read resolve as not found so their
    /// existence does not leak; readable buckets missing the requested
    /// permission resolve as forbidden.
    async fn resolve_bucket(
        &self,
        actor: &Actor,
        bucket: BucketRef<'_>,
        needed: Permission,
    ) -> StorageResult<Bucket> {
        let found = match bucket {
            BucketRef::Id(id) => self.buckets.get_by_id(id).await?,
            BucketRef::Name(name) => match self.buckets.get_by_name(actor.id, name).await? {
                Some(own) => Some(own),
                None => self.buckets.find_public_by_name(name).await?,
            },
        };
        let found = found.ok_or_else(|| StorageError::BucketNotFound(bucket.label()))?;

        let granted = permissions(actor, &found);
        if !granted.read {
            debug!(bucket_id = found.id, user_id = actor.id, role = %actor.role, "bucket hidden from actor");
            return Err(StorageError::BucketNotFound(bucket.label()));
        }
        if !granted.allows(needed) {
            debug!(bucket_id = found.id, user_id = actor.id, role = %actor.role, ?needed, "permission denied");
            return Err(StorageError::Forbidden);
        }
        Ok(found)
    }

    async fn object_in_bucket(&self, bucket: &Bucket, object_id: i64) -> StorageResult<Object> {
        self.objects
            .get_by_id(object_id)
            .await?
            .filter(|object| object.bucket_id == bucket.id)
            .ok_or_else(|| StorageError::ObjectNotFound(object_id.to_string()))
    }

    async fn open(&self, object: Object) -> StorageResult<(Object, File)> {
        match self.content.get(Path::new(&object.storage_path)).await {
            Ok(file) => Ok((object, file)),
            Err(ContentError::NotFound(path)) => {
                warn!(
                    object_id = object.id,
                    path = %path.display(),
                    "metadata present but content missing on disk"
                );
                Err(StorageError::ObjectNotFound(object.key))
            }
            Err(err) => Err(content_error(err, &object.key)),
        }
    }

    /// Drop the payload (best-effort) and then the metadata row.
    async fn remove(&self, object: &Object, actor: &Actor) -> StorageResult<()> {
        if let Err(err) = self.content.delete(Path::new(&object.storage_path)).await {
            error!(
                object_id = object.id,
                "failed to delete object content from disk: {}", err
            );
        }

        if !self.objects.delete(object.id).await? {
            debug!(object_id = object.id, "object row already removed");
        }

        info!(
            object_id = object.id,
            bucket_id = object.bucket_id,
            user_id = actor.id,
            "object deleted"
        );
        Ok(())
    }
}

fn content_error(err: ContentError, key: &str) -> StorageError {
    match err {
        ContentError::NotFound(_) => StorageError::ObjectNotFound(key.to_string()),
        ContentError::PathConflict(_) => StorageError::KeyConflict(key.to_string()),
        ContentError::Io(err) => StorageError::Io(err),
    }
}

fn ensure_limit(limit: usize) -> StorageResult<()> {
    if limit == 0 {
        return Err(StorageError::Validation("limit must be at least 1".into()));
    }
    Ok(())
}

/// Bucket names are 1–63 ASCII letters or digits.
pub fn validate_bucket_name(name: &str) -> StorageResult<()> {
    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Err(StorageError::Validation(format!(
            "bucket name must be between {} and {} characters",
            BUCKET_NAME_MIN_LEN, BUCKET_NAME_MAX_LEN
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(StorageError::Validation(
            "bucket name may only contain letters and digits".into(),
        ));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> StorageResult<()> {
    match description {
        Some(text) if text.chars().count() > BUCKET_DESCRIPTION_MAX_LEN => {
            Err(StorageError::Validation(format!(
                "description must be at most {} characters",
                BUCKET_DESCRIPTION_MAX_LEN
            )))
        }
        _ => Ok(()),
    }
}
