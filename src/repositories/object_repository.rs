//! SQLite-backed persistence for object rows.

use crate::models::object::{Object, ObjectWrite};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;

const OBJECT_COLUMNS: &str = "id, bucket_id, key, storage_path, content_type, size, etag, \
                              owner_id, created_at, updated_at";

#[derive(Clone)]
pub struct ObjectRepository {
    db: Arc<SqlitePool>,
}

impl ObjectRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Insert a new object row. A second row for the same `(bucket_id, key)`
    /// fails with a unique-constraint error.
    pub async fn create(&self, write: &ObjectWrite) -> sqlx::Result<Object> {
        let now = Utc::now();
        sqlx::query_as::<_, Object>(&format!(
            "INSERT INTO objects (
                bucket_id, key, storage_path, content_type, size, etag,
                owner_id, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {OBJECT_COLUMNS}"
        ))
        .bind(write.bucket_id)
        .bind(&write.key)
        .bind(&write.storage_path)
        .bind(&write.content_type)
        .bind(write.size)
        .bind(&write.etag)
        .bind(write.owner_id)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await
    }

    pub async fn get_by_id(&self, id: i64) -> sqlx::Result<Option<Object>> {
        sqlx::query_as::<_, Object>(&format!("SELECT {OBJECT_COLUMNS} FROM objects WHERE id = ?"))
            .bind(id)
            .fetch_optional(&*self.db)
            .await
    }

    pub async fn get_by_key(&self, bucket_id: i64, key: &str) -> sqlx::Result<Option<Object>> {
        sqlx::query_as::<_, Object>(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects WHERE bucket_id = ? AND key = ?"
        ))
        .bind(bucket_id)
        .bind(key)
        .fetch_optional(&*self.db)
        .await
    }

    /// Overwrite the row with `id` in place, keeping its id and `created_at`.
    /// Returns `None` if the row vanished in the meantime.
    pub async fn update(&self, id: i64, write: &ObjectWrite) -> sqlx::Result<Option<Object>> {
        sqlx::query_as::<_, Object>(&format!(
            "UPDATE objects SET
                storage_path = ?, content_type = ?, size = ?, etag = ?,
                owner_id = ?, updated_at = ?
             WHERE id = ?
             RETURNING {OBJECT_COLUMNS}"
        ))
        .bind(&write.storage_path)
        .bind(&write.content_type)
        .bind(write.size)
        .bind(&write.etag)
        .bind(write.owner_id)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&*self.db)
        .await
    }

    /// Returns whether a row was removed.
    pub async fn delete(&self, id: i64) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM objects WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Objects in a bucket, newest first.
    pub async fn list(&self, bucket_id: i64, limit: i64, offset: i64) -> sqlx::Result<Vec<Object>> {
        sqlx::query_as::<_, Object>(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects
             WHERE bucket_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?"
        ))
        .bind(bucket_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.db)
        .await
    }

    /// Objects whose key starts with `prefix`, newest first.
    ///
    /// Matching compares the leading characters exactly, so it is
    /// case-sensitive and `%`/`_` in the prefix carry no special meaning.
    pub async fn list_by_prefix(
        &self,
        bucket_id: i64,
        prefix: &str,
        limit: i64,
        offset: i64,
    ) -> sqlx::Result<Vec<Object>> {
        sqlx::query_as::<_, Object>(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects
             WHERE bucket_id = ? AND substr(key, 1, ?) = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?"
        ))
        .bind(bucket_id)
        .bind(prefix.chars().count() as i64)
        .bind(prefix)
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.db)
        .await
    }

    pub async fn count(&self, bucket_id: i64) -> sqlx::Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM objects WHERE bucket_id = ?")
            .bind(bucket_id)
            .fetch_one(&*self.db)
            .await
    }

    pub async fn count_by_prefix(&self, bucket_id: i64, prefix: &str) -> sqlx::Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM objects WHERE bucket_id = ? AND substr(key, 1, ?) = ?",
        )
        .bind(bucket_id)
        .bind(prefix.chars().count() as i64)
        .bind(prefix)
        .fetch_one(&*self.db)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::bucket::NewBucket;
    use crate::repositories::{bucket_repository::BucketRepository, is_unique_violation};
    use tempfile::TempDir;

    /// Repository over a fresh database holding buckets 1 and 2.
    async fn setup() -> (TempDir, ObjectRepository) {
        let (dir, pool) = test_pool().await;
        let buckets = BucketRepository::new(pool.clone());
        for name in ["first", "second"] {
            let new = NewBucket {
                name: name.into(),
                description: None,
                is_public: false,
            };
            buckets.create(1, &new).await.unwrap();
        }
        (dir, ObjectRepository::new(pool))
    }

    fn write(key: &str, etag: &str, size: i64) -> ObjectWrite {
        ObjectWrite {
            bucket_id: 1,
            key: key.into(),
            storage_path: format!("1/1/{key}"),
            content_type: "text/plain".into(),
            size,
            etag: etag.into(),
            owner_id: 1,
        }
    }

    #[tokio::test]
    async fn keys_are_unique_per_bucket() {
        let (_dir, repo) = setup().await;

        repo.create(&write("a", "e1", 1)).await.unwrap();
        let err = repo.create(&write("a", "e2", 2)).await.unwrap_err();
        assert!(is_unique_violation(&err));

        let other_bucket = ObjectWrite {
            bucket_id: 2,
            ..write("a", "e3", 3)
        };
        repo.create(&other_bucket).await.unwrap();
    }

    #[tokio::test]
    async fn update_keeps_identity() {
        let (_dir, repo) = setup().await;

        let created = repo.create(&write("a", "e1", 1)).await.unwrap();
        let updated = repo
            .update(created.id, &write("a", "e2", 20))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.etag, "e2");
        assert_eq!(updated.size, 20);
        assert!(updated.updated_at > created.updated_at);
    }

    #[tokio::test]
    async fn prefix_match_is_literal_and_case_sensitive() {
        let (_dir, repo) = setup().await;

        for key in ["2024/jan.txt", "2024/feb.txt", "2025/jan.txt", "20%4/x", "2024X"] {
            repo.create(&write(key, "e", 1)).await.unwrap();
        }

        let listed = repo.list_by_prefix(1, "2024/", 10, 0).await.unwrap();
        let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["2024/feb.txt", "2024/jan.txt"]);
        assert_eq!(repo.count_by_prefix(1, "2024/").await.unwrap(), 2);

        let percent = repo.list_by_prefix(1, "20%", 10, 0).await.unwrap();
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].key, "20%4/x");

        assert!(repo.list_by_prefix(1, "2024x", 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_pages_newest_first() {
        let (_dir, repo) = setup().await;

        for key in ["one", "two", "three"] {
            repo.create(&write(key, "e", 1)).await.unwrap();
        }

        let first = repo.list(1, 2, 0).await.unwrap();
        let second = repo.list(1, 2, 2).await.unwrap();
        assert_eq!(
            first.iter().map(|o| o.key.as_str()).collect::<Vec<_>>(),
            vec!["three", "two"]
        );
        assert_eq!(second[0].key, "one");
        assert_eq!(repo.count(1).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn delete_reports_whether_row_existed() {
        let (_dir, repo) = setup().await;

        let created = repo.create(&write("a", "e", 1)).await.unwrap();
        assert!(repo.delete(created.id).await.unwrap());
        assert!(!repo.delete(created.id).await.unwrap());
        assert!(repo.get_by_key(1, "a").await.unwrap().is_none());
    }
}
