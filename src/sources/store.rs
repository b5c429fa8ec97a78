//! Blob store implementations
//!
//! `FsBlobStore` lays buckets out as directories under a root, which is
//! what the binaries use for local runs. `MemoryBlobStore` keeps objects in
//! a map and is what the pipeline tests inspect.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use super::BlobStore;
use crate::error::StoreError;

/// Filesystem-backed store: `{root}/{bucket}/{key}`
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.root.join(bucket);
        for segment in key.split('/').filter(|s| !s.is_empty() && *s != "..") {
            path.push(segment);
        }
        path
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(bucket, key);
        tokio::fs::read(&path).await.map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                StoreError::NotFound {
                    uri: self.uri(bucket, key),
                }
            } else {
                StoreError::Io {
                    uri: self.uri(bucket, key),
                    source,
                }
            }
        })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StoreError> {
        let path = self.object_path(bucket, key);
        let io_err = |source| StoreError::Io {
            uri: self.uri(bucket, key),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&path, body).await.map_err(io_err)?;
        tracing::debug!(path = %path.display(), "Wrote object");
        Ok(())
    }

    fn uri(&self, bucket: &str, key: &str) -> String {
        format!("file://{}", self.object_path(bucket, key).display())
    }
}

/// An object held by `MemoryBlobStore`
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// In-memory store keyed by (bucket, key)
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object, e.g. a Stage 1 report for Stage 2 to read
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>, content_type: &str) {
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: body.into(),
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// All stored keys of a bucket, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.object(bucket, key)
            .map(|o| o.body)
            .ok_or_else(|| StoreError::NotFound {
                uri: self.uri(bucket, key),
            })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.insert(bucket, key, body, content_type);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store
            .put("bucket", "reports/ts/a.json", b"{}".to_vec(), "application/json")
            .await
            .unwrap();

        assert!(dir.path().join("bucket/reports/ts/a.json").exists());
        let body = store.get("bucket", "reports/ts/a.json").await.unwrap();
        assert_eq!(body, b"{}");
    }

    #[tokio::test]
    async fn test_fs_store_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let err = store.get("bucket", "nope.json").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_fs_store_ignores_parent_segments() {
        let store = FsBlobStore::new("/data");
        let path = store.object_path("b", "../../etc/passwd");
        assert_eq!(path, PathBuf::from("/data/b/etc/passwd"));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryBlobStore::new();
        assert!(store.is_empty());

        store
            .put("b", "k1", b"one".to_vec(), "text/csv")
            .await
            .unwrap();
        store.insert("other", "k2", "two", "text/plain");

        assert_eq!(store.keys("b"), vec!["k1"]);
        assert_eq!(store.object("b", "k1").unwrap().content_type, "text/csv");
        assert_eq!(store.get("other", "k2").await.unwrap(), b"two");
        assert_eq!(store.uri("b", "k1"), "s3://b/k1");
        assert!(store.get("b", "missing").await.is_err());
    }
}
