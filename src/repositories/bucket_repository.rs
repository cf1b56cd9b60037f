//! SQLite-backed persistence for bucket rows.

use crate::models::bucket::{Bucket, NewBucket};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;

const BUCKET_COLUMNS: &str = "id, name, owner_id, description, is_public, created_at, updated_at";

#[derive(Clone)]
pub struct BucketRepository {
    db: Arc<SqlitePool>,
}

impl BucketRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Insert a bucket owned by `owner_id`.
    ///
    /// A duplicate `(owner_id, name)` surfaces as a unique-constraint
    /// database error.
    pub async fn create(&self, owner_id: i64, new: &NewBucket) -> sqlx::Result<Bucket> {
        let now = Utc::now();
        sqlx::query_as::<_, Bucket>(&format!(
            "INSERT INTO buckets (name, owner_id, description, is_public, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {BUCKET_COLUMNS}"
        ))
        .bind(&new.name)
        .bind(owner_id)
        .bind(&new.description)
        .bind(new.is_public)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await
    }

    pub async fn get_by_id(&self, id: i64) -> sqlx::Result<Option<Bucket>> {
        sqlx::query_as::<_, Bucket>(&format!("SELECT {BUCKET_COLUMNS} FROM buckets WHERE id = ?"))
            .bind(id)
            .fetch_optional(&*self.db)
            .await
    }

    /// Look up a bucket by name within one owner's namespace.
    pub async fn get_by_name(&self, owner_id: i64, name: &str) -> sqlx::Result<Option<Bucket>> {
        sqlx::query_as::<_, Bucket>(&format!(
            "SELECT {BUCKET_COLUMNS} FROM buckets WHERE owner_id = ? AND name = ?"
        ))
        .bind(owner_id)
        .bind(name)
        .fetch_optional(&*self.db)
        .await
    }

    /// Oldest public bucket carrying `name`, across all owners.
    pub async fn find_public_by_name(&self, name: &str) -> sqlx::Result<Option<Bucket>> {
        sqlx::query_as::<_, Bucket>(&format!(
            "SELECT {BUCKET_COLUMNS} FROM buckets
             WHERE name = ? AND is_public = 1
             ORDER BY id ASC LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&*self.db)
        .await
    }

    /// Persist the mutable fields of `bucket` and stamp `updated_at`.
    pub async fn update(&self, bucket: &Bucket) -> sqlx::Result<Option<Bucket>> {
        sqlx::query_as::<_, Bucket>(&format!(
            "UPDATE buckets SET name = ?, description = ?, is_public = ?, updated_at = ?
             WHERE id = ?
             RETURNING {BUCKET_COLUMNS}"
        ))
        .bind(&bucket.name)
        .bind(&bucket.description)
        .bind(bucket.is_public)
        .bind(Utc::now())
        .bind(bucket.id)
        .fetch_optional(&*self.db)
        .await
    }

    /// Returns whether a row was removed.
    pub async fn delete(&self, id: i64) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM buckets WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Buckets owned by `owner_id`, newest first.
    pub async fn list(&self, owner_id: i64, limit: i64, offset: i64) -> sqlx::Result<Vec<Bucket>> {
        sqlx::query_as::<_, Bucket>(&format!(
            "SELECT {BUCKET_COLUMNS} FROM buckets
             WHERE owner_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?"
        ))
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.db)
        .await
    }

    pub async fn count(&self, owner_id: i64) -> sqlx::Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM buckets WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_one(&*self.db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::repositories::is_unique_violation;

    fn named(name: &str) -> NewBucket {
        NewBucket {
            name: name.into(),
            description: None,
            is_public: false,
        }
    }

    #[tokio::test]
    async fn names_are_unique_per_owner() {
        let (_dir, pool) = test_pool().await;
        let repo = BucketRepository::new(pool);

        repo.create(1, &named("logs")).await.unwrap();
        repo.create(2, &named("logs")).await.unwrap();
        let err = repo.create(1, &named("logs")).await.unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn lookups_return_none_when_absent() {
        let (_dir, pool) = test_pool().await;
        let repo = BucketRepository::new(pool);

        assert!(repo.get_by_id(42).await.unwrap().is_none());
        assert!(repo.get_by_name(1, "nope").await.unwrap().is_none());
        assert!(!repo.delete(42).await.unwrap());
    }

    #[tokio::test]
    async fn list_is_scoped_and_newest_first() {
        let (_dir, pool) = test_pool().await;
        let repo = BucketRepository::new(pool);

        let a = repo.create(1, &named("a")).await.unwrap();
        let b = repo.create(1, &named("b")).await.unwrap();
        repo.create(2, &named("c")).await.unwrap();

        let listed = repo.list(1, 10, 0).await.unwrap();
        assert_eq!(
            listed.iter().map(|b| b.id).collect::<Vec<_>>(),
            vec![b.id, a.id]
        );
        assert_eq!(repo.count(1).await.unwrap(), 2);
        assert_eq!(repo.list(1, 1, 1).await.unwrap()[0].id, a.id);
    }

    #[tokio::test]
    async fn update_touches_updated_at() {
        let (_dir, pool) = test_pool().await;
        let repo = BucketRepository::new(pool);

        let mut bucket = repo.create(1, &named("logs")).await.unwrap();
        bucket.is_public = true;
        bucket.description = Some("shared".into());
        let updated = repo.update(&bucket).await.unwrap().unwrap();

        assert!(updated.is_public);
        assert_eq!(updated.description.as_deref(), Some("shared"));
        assert_eq!(updated.created_at, bucket.created_at);
        assert!(updated.updated_at >= bucket.updated_at);
    }

    #[tokio::test]
    async fn public_lookup_prefers_oldest() {
        let (_dir, pool) = test_pool().await;
        let repo = BucketRepository::new(pool);

        repo.create(1, &named("shared")).await.unwrap();
        let first_public = repo
            .create(
                2,
                &NewBucket {
                    is_public: true,
                    ..named("shared")
                },
            )
            .await
            .unwrap();
        repo.create(
            3,
            &NewBucket {
                is_public: true,
                ..named("shared")
            },
        )
        .await
        .unwrap();

        let found = repo.find_public_by_name("shared").await.unwrap().unwrap();
        assert_eq!(found.id, first_public.id);
    }
}
