//! Blob storage for generated images, templates and materials.
//!
//! Paths are relative, `/`-separated and laid out as `{scope}/{category}/{file}`,
//! where `scope` is a project id or `global`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("invalid blob path: {0}")]
    InvalidPath(String),
    #[error("blob io error: {0}")]
    Io(#[from] io::Error),
}

pub type BlobResult<T> = Result<T, BlobError>;

pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `{scope}/{category}/` and return the new path.
    fn save(&self, scope: &str, category: &str, bytes: &[u8]) -> BlobResult<String>;

    fn load(&self, path: &str) -> BlobResult<Vec<u8>>;

    /// Remove every blob under `prefix`. Returns the number removed.
    fn delete(&self, prefix: &str) -> BlobResult<usize>;

    /// Time-limited URL for `path`.
    fn url(&self, path: &str, ttl: Duration) -> BlobResult<String>;
}

impl<B: BlobStore + ?Sized> BlobStore for std::sync::Arc<B> {
    fn save(&self, scope: &str, category: &str, bytes: &[u8]) -> BlobResult<String> {
        (**self).save(scope, category, bytes)
    }

    fn load(&self, path: &str) -> BlobResult<Vec<u8>> {
        (**self).load(path)
    }

    fn delete(&self, prefix: &str) -> BlobResult<usize> {
        (**self).delete(prefix)
    }

    fn url(&self, path: &str, ttl: Duration) -> BlobResult<String> {
        (**self).url(path, ttl)
    }
}

fn new_blob_path(scope: &str, category: &str) -> BlobResult<String> {
    for segment in [scope, category] {
        if segment.is_empty() || segment.contains(['/', '\\']) || segment == "." || segment == ".." {
            return Err(BlobError::InvalidPath(segment.to_string()));
        }
    }
    Ok(format!("{scope}/{category}/{}.png", Uuid::now_v7().simple()))
}

fn signed_url(path: &str, ttl: Duration) -> String {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
    let expires = (Utc::now() + ttl).timestamp();
    format!("/files/{path}?expires={expires}")
}

/// In-process blob store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a blob at a fixed path (e.g. a project template).
    pub fn put(&self, path: impl Into<String>, bytes: Vec<u8>) {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), bytes);
    }

    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for InMemoryBlobStore {
    fn save(&self, scope: &str, category: &str, bytes: &[u8]) -> BlobResult<String> {
        let path = new_blob_path(scope, category)?;
        self.put(path.clone(), bytes.to_vec());
        Ok(path)
    }

    fn load(&self, path: &str) -> BlobResult<Vec<u8>> {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(path.to_string()))
    }

    fn delete(&self, prefix: &str) -> BlobResult<usize> {
        let mut blobs = self.blobs.write().unwrap_or_else(PoisonError::into_inner);
        let before = blobs.len();
        blobs.retain(|path, _| !path.starts_with(prefix));
        Ok(before - blobs.len())
    }

    fn url(&self, path: &str, ttl: Duration) -> BlobResult<String> {
        if !self
            .blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
        {
            return Err(BlobError::NotFound(path.to_string()));
        }
        Ok(signed_url(path, ttl))
    }
}

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> BlobResult<PathBuf> {
        let relative = Path::new(path);
        if path.is_empty() || !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for LocalBlobStore {
    fn save(&self, scope: &str, category: &str, bytes: &[u8]) -> BlobResult<String> {
        let path = new_blob_path(scope, category)?;
        let full = self.resolve(&path)?;
        if let Some(dir) = full.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&full, bytes)?;
        tracing::debug!(path = %path, bytes = bytes.len(), "blob saved");
        Ok(path)
    }

    fn load(&self, path: &str) -> BlobResult<Vec<u8>> {
        let full = self.resolve(path)?;
        fs::read(&full).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => BlobError::NotFound(path.to_string()),
            _ => BlobError::Io(e),
        })
    }

    fn delete(&self, prefix: &str) -> BlobResult<usize> {
        let full = self.resolve(prefix.trim_end_matches('/'))?;
        if full.is_dir() {
            let count = count_files(&full)?;
            fs::remove_dir_all(&full)?;
            Ok(count)
        } else if full.is_file() {
            fs::remove_file(&full)?;
            Ok(1)
        } else {
            Ok(0)
        }
    }

    fn url(&self, path: &str, ttl: Duration) -> BlobResult<String> {
        if !self.resolve(path)?.is_file() {
            return Err(BlobError::NotFound(path.to_string()));
        }
        Ok(signed_url(path, ttl))
    }
}

fn count_files(dir: &Path) -> io::Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            count += count_files(&entry.path())?;
        } else {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("deckgen-blob-{}", Uuid::now_v7().simple()))
    }

    #[test]
    fn in_memory_save_load_delete() {
        let blobs = InMemoryBlobStore::new();
        let a = blobs.save("p1", "pages", b"a").unwrap();
        let b = blobs.save("p1", "materials", b"b").unwrap();
        blobs.save("p2", "pages", b"c").unwrap();

        assert!(a.starts_with("p1/pages/") && a.ends_with(".png"));
        assert_eq!(blobs.load(&b).unwrap(), b"b");

        assert_eq!(blobs.delete("p1/").unwrap(), 2);
        assert!(matches!(blobs.load(&a), Err(BlobError::NotFound(_))));
        assert_eq!(blobs.len(), 1);
    }

    #[test]
    fn urls_carry_an_expiry() {
        let blobs = InMemoryBlobStore::new();
        let path = blobs.save("global", "materials", b"m").unwrap();

        let url = blobs.url(&path, Duration::from_secs(60)).unwrap();
        let expires: i64 = url.rsplit("expires=").next().unwrap().parse().unwrap();

        assert!(url.starts_with(&format!("/files/{path}?expires=")));
        assert!(expires > Utc::now().timestamp());
        assert!(matches!(
            blobs.url("global/materials/missing.png", Duration::from_secs(60)),
            Err(BlobError::NotFound(_))
        ));
    }

    #[test]
    fn scope_and_category_must_be_single_segments() {
        let blobs = InMemoryBlobStore::new();
        assert!(matches!(blobs.save("../etc", "pages", b"x"), Err(BlobError::InvalidPath(_))));
        assert!(matches!(blobs.save("p1", "", b"x"), Err(BlobError::InvalidPath(_))));
    }

    #[test]
    fn local_store_round_trips_files() {
        let root = temp_root();
        let blobs = LocalBlobStore::new(&root);

        let path = blobs.save("p1", "pages", b"png-bytes").unwrap();
        assert_eq!(blobs.load(&path).unwrap(), b"png-bytes");
        assert!(blobs.url(&path, Duration::from_secs(5)).is_ok());

        blobs.save("p1", "pages", b"second").unwrap();
        assert_eq!(blobs.delete("p1/pages").unwrap(), 2);
        assert!(matches!(blobs.load(&path), Err(BlobError::NotFound(_))));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn local_store_rejects_escaping_paths() {
        let blobs = LocalBlobStore::new(temp_root());
        assert!(matches!(blobs.load("../secret"), Err(BlobError::InvalidPath(_))));
        assert!(matches!(blobs.load("/etc/passwd"), Err(BlobError::InvalidPath(_))));
    }
}
