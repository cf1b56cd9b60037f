//! Represents a logical bucket: a named container for objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A storage bucket.
///
/// Bucket names are unique per owner, not globally: two owners may each
/// hold a bucket called `logs`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Bucket {
    /// Server-assigned, monotonic identifier.
    pub id: i64,

    /// Name, unique within `owner_id`.
    pub name: String,

    /// Actor that created the bucket. Never changes.
    pub owner_id: i64,

    /// Free-form description.
    pub description: Option<String>,

    /// Public buckets are readable and writable by any authenticated actor.
    pub is_public: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating a bucket.
#[derive(Debug, Clone)]
pub struct NewBucket {
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
}

/// Owner-editable bucket settings. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct BucketChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

impl Bucket {
    /// Apply owner edits in memory; the repository persists the result.
    pub fn apply(&mut self, changes: BucketChanges) {
        if let Some(name) = changes.name {
            self.name = name;
        }
        if let Some(description) = changes.description {
            self.description = non_empty(description);
        }
        if let Some(is_public) = changes.is_public {
            self.is_public = is_public;
        }
    }
}

/// Blank descriptions are stored as absent, so sending `""` clears one.
pub fn non_empty(description: String) -> Option<String> {
    Some(description).filter(|d| !d.trim().is_empty())
}
