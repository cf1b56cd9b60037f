//! src/services/content_store.rs
//!
//! ContentStore: streams object payloads to and from local disk beneath a
//! configured root. Writes are staged next to their destination, hashed
//! while copying, fsynced and then renamed into place, so a reader sees
//! either the previous bytes or the new ones, never a truncated file.
//!
//! This layer only touches the filesystem. Ordering against metadata
//! writes belongs to the storage service.

use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const STAGE_ATTEMPTS: u32 = 8;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("no content stored at `{}`", .0.display())]
    NotFound(PathBuf),
    #[error("`{}` collides with an existing file or directory", .0.display())]
    PathConflict(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Size and digest of a completed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub size: i64,
    /// Lowercase hex MD5 of the bytes written.
    pub etag: String,
}

#[derive(Clone, Debug)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Physical directory all relative paths are joined onto.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, rel: &Path) -> PathBuf {
        self.root.join(rel)
    }

    /// Stream `stream` into `rel`, replacing whatever was there.
    ///
    /// The staged file is removed on any failure, including a failed
    /// rename, so nothing partial is ever left behind.
    pub async fn put<S>(&self, rel: &Path, stream: S) -> Result<StoredContent, ContentError>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let file_path = self.absolute(rel);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            ContentError::Io(io::Error::new(
                ErrorKind::InvalidInput,
                "object path missing parent directory",
            ))
        })?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let file = create_staged(&parent, &tmp_path)
            .await
            .map_err(|err| classify(err, rel))?;

        let stored = match stage(file, stream).await {
            Ok(stored) => stored,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ContentError::Io(err));
            }
        };

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(classify(err, rel));
        }

        debug!(path = %file_path.display(), size = stored.size, "stored object payload");
        Ok(stored)
    }

    /// Open `rel` for streaming reads.
    pub async fn get(&self, rel: &Path) -> Result<File, ContentError> {
        File::open(self.absolute(rel)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                ContentError::NotFound(rel.to_path_buf())
            } else {
                ContentError::Io(err)
            }
        })
    }

    /// Remove `rel` if present and prune directories it leaves empty, up to
    /// (not including) the bucket directory. Missing files are not an error.
    pub async fn delete(&self, rel: &Path) -> Result<(), ContentError> {
        let file_path = self.absolute(rel);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(ContentError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.absolute(&rel.iter().take(2).collect::<PathBuf>());
            prune_empty_dirs(parent, &bucket_root).await;
        }
        Ok(())
    }

    #[cfg(test)]
    async fn exists(&self, rel: &Path) -> Result<bool, ContentError> {
        Ok(fs::try_exists(self.absolute(rel)).await?)
    }

    /// Recursively remove a directory (a bucket's subtree). Missing is fine.
    pub async fn remove_dir(&self, rel: &Path) -> Result<(), ContentError> {
        match fs::remove_dir_all(self.absolute(rel)).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ContentError::Io(err)),
        }
    }
}

/// Create `parent` and the staging file inside it.
///
/// A delete of the last sibling may prune `parent` between the two steps;
/// in that case the directory is created again.
async fn create_staged(parent: &Path, tmp_path: &Path) -> io::Result<File> {
    let mut attempt = 1;
    loop {
        let created = match fs::create_dir_all(parent).await {
            Ok(()) => {
                OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(tmp_path)
                    .await
            }
            Err(err) => Err(err),
        };
        match created {
            Err(err) if err.kind() == ErrorKind::NotFound && attempt < STAGE_ATTEMPTS => {
                debug!(
                    attempt,
                    "directory {} pruned while staging; recreating",
                    parent.display()
                );
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Copy the stream into the staging file, hashing in the same pass.
async fn stage<S>(mut file: File, stream: S) -> io::Result<StoredContent>
where
    S: Stream<Item = io::Result<Bytes>> + Send,
{
    let mut size: i64 = 0;
    let mut digest = Context::new();
    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        size += chunk.len() as i64;
        digest.consume(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;

    Ok(StoredContent {
        size,
        etag: format!("{:x}", digest.compute()),
    })
}

/// Keys like `a` and `a/b` cannot both exist on disk; surface that as a
/// conflict instead of a generic I/O failure.
fn classify(err: io::Error, rel: &Path) -> ContentError {
    match err.kind() {
        ErrorKind::NotADirectory | ErrorKind::IsADirectory | ErrorKind::AlreadyExists => {
            ContentError::PathConflict(rel.to_path_buf())
        }
        _ => ContentError::Io(err),
    }
}

/// Remove empty directories from `start` upward, stopping at `stop`.
async fn prune_empty_dirs(start: &Path, stop: &Path) {
    let mut current = start.to_path_buf();
    while current.starts_with(stop) && current != stop {
        match fs::remove_dir(&current).await {
            Ok(_) => match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            },
            Err(err) if err.kind() == ErrorKind::NotFound => break,
            Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
            Err(err) => {
                debug!("failed to prune directory {}: {}", current.display(), err);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn body(parts: &[&'static str]) -> impl Stream<Item = io::Result<Bytes>> + Send {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn read_all(store: &ContentStore, rel: &Path) -> Vec<u8> {
        let mut file = store.get(rel).await.unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn put_hashes_while_writing() {
        let temp = TempDir::new().unwrap();
        let store = ContentStore::new(temp.path());
        let rel = Path::new("1/1/2024/jan.txt");

        let stored = store.put(rel, body(&["hel", "lo"])).await.unwrap();
        assert_eq!(stored.size, 5);
        assert_eq!(stored.etag, format!("{:x}", md5::compute(b"hello")));
        assert_eq!(read_all(&store, rel).await, b"hello");
    }

    #[tokio::test]
    async fn put_replaces_existing_content() {
        let temp = TempDir::new().unwrap();
        let store = ContentStore::new(temp.path());
        let rel = Path::new("1/1/key");

        store.put(rel, body(&["first version"])).await.unwrap();
        store.put(rel, body(&["second"])).await.unwrap();
        assert_eq!(read_all(&store, rel).await, b"second");
    }

    #[tokio::test]
    async fn failed_stream_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let store = ContentStore::new(temp.path());
        let rel = Path::new("1/1/broken");

        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::other("client went away")),
        ]);
        let err = store.put(rel, failing).await.unwrap_err();
        assert!(matches!(err, ContentError::Io(_)));

        assert!(!store.exists(rel).await.unwrap());
        let mut entries = fs::read_dir(temp.path().join("1/1")).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_content_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = ContentStore::new(temp.path());

        let err = store.get(Path::new("1/1/nope")).await.unwrap_err();
        assert!(matches!(err, ContentError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_prunes() {
        let temp = TempDir::new().unwrap();
        let store = ContentStore::new(temp.path());
        let rel = Path::new("1/2/a/b/c.txt");

        store.put(rel, body(&["x"])).await.unwrap();
        store.delete(rel).await.unwrap();
        store.delete(rel).await.unwrap();

        assert!(!store.exists(rel).await.unwrap());
        assert!(!temp.path().join("1/2/a").exists());
        assert!(temp.path().join("1/2").exists());
    }

    #[tokio::test]
    async fn file_and_directory_keys_conflict() {
        let temp = TempDir::new().unwrap();
        let store = ContentStore::new(temp.path());

        store.put(Path::new("1/1/a"), body(&["file"])).await.unwrap();
        let err = store
            .put(Path::new("1/1/a/b"), body(&["nested"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::PathConflict(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn put_survives_sibling_delete_pruning_its_directory() {
        let temp = TempDir::new().unwrap();
        let store = ContentStore::new(temp.path());

        for i in 0..200 {
            let old = PathBuf::from(format!("1/1/d{i}/x"));
            let new = PathBuf::from(format!("1/1/d{i}/y"));
            store.put(&old, body(&["old"])).await.unwrap();

            let writer = {
                let store = store.clone();
                let new = new.clone();
                tokio::spawn(async move { store.put(&new, body(&["new"])).await })
            };
            let deleter = {
                let store = store.clone();
                tokio::spawn(async move { store.delete(&old).await })
            };

            writer.await.unwrap().unwrap();
            deleter.await.unwrap().unwrap();
            assert_eq!(read_all(&store, &new).await, b"new");
        }
    }
}
