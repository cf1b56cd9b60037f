//! Maps `(owner, bucket, key)` to a relative on-disk location.
//!
//! Keys may contain `/` for nesting, but every resolved path stays inside
//! `{owner_id}/{bucket_id}/`. The storage root is applied later by the
//! content store, so this module never touches the filesystem.

use std::path::PathBuf;
use thiserror::Error;

pub const MAX_OBJECT_KEY_LEN: usize = 1024;
/// Longest single path component common filesystems accept.
pub const MAX_SEGMENT_LEN: usize = 255;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidKey {
    #[error("object key is empty")]
    Empty,
    #[error("object key exceeds 1024 bytes")]
    TooLong,
    #[error("object key must not start with `/`")]
    Absolute,
    #[error("object key contains a control character or backslash")]
    ForbiddenCharacter,
    #[error("object key contains an empty, `.` or `..` segment")]
    UnsafeSegment,
    #[error("object key segment exceeds 255 bytes")]
    SegmentTooLong,
}

/// Directory holding every object of a bucket, relative to the storage root.
pub fn bucket_dir(owner_id: i64, bucket_id: i64) -> PathBuf {
    let mut path = PathBuf::from(owner_id.to_string());
    path.push(bucket_id.to_string());
    path
}

/// Resolve an object key to `owner_id/bucket_id/<segments...>`.
pub fn resolve(owner_id: i64, bucket_id: i64, key: &str) -> Result<PathBuf, InvalidKey> {
    validate_key(key)?;

    let mut path = bucket_dir(owner_id, bucket_id);
    for segment in key.split('/') {
        path.push(segment);
    }
    Ok(path)
}

/// Check that a key is safe to map onto the filesystem.
///
/// Distinct keys must never normalise to the same path, so `a//b`, `a/./b`
/// and trailing slashes are rejected rather than collapsed.
pub fn validate_key(key: &str) -> Result<(), InvalidKey> {
    if key.is_empty() {
        return Err(InvalidKey::Empty);
    }
    if key.len() > MAX_OBJECT_KEY_LEN {
        return Err(InvalidKey::TooLong);
    }
    if key.starts_with('/') {
        return Err(InvalidKey::Absolute);
    }
    if key.chars().any(|c| c.is_control() || c == '\\') {
        return Err(InvalidKey::ForbiddenCharacter);
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(InvalidKey::UnsafeSegment);
    }
    if key.split('/').any(|segment| segment.len() > MAX_SEGMENT_LEN) {
        return Err(InvalidKey::SegmentTooLong);
    }
    Ok(())
}
