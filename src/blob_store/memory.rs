//! In-memory blob store.
//!
//! Keeps blobs in a map keyed by URL. Supports scripted failures so
//! redemption tests can make a specific upload fail a set number of times.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use super::{
    compute_hash, hash_to_hex, validate_key, BlobStore, BlobStoreError, BlobStoreType, Result,
    StoredBlob,
};

const URL_SCHEME: &str = "memory://";

#[derive(Debug, Clone)]
struct FailureRule {
    fragment: String,
    remaining: usize,
    transient: bool,
}

/// In-memory blob store.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, (Bytes, Option<String>)>>,
    failures: Mutex<Vec<FailureRule>>,
    put_attempts: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` puts whose key contains `fragment`.
    ///
    /// Transient failures are retried by the redemption service; permanent
    /// ones are not.
    pub fn fail_puts_matching(&self, fragment: impl Into<String>, times: usize, transient: bool) {
        self.lock_failures().push(FailureRule {
            fragment: fragment.into(),
            remaining: times,
            transient,
        });
    }

    /// Whether a blob exists at `url`.
    pub fn contains(&self, url: &str) -> bool {
        self.lock_blobs().contains_key(url)
    }

    /// Content stored at `url`.
    pub fn get(&self, url: &str) -> Option<Bytes> {
        self.lock_blobs().get(url).map(|(bytes, _)| bytes.clone())
    }

    /// Content type recorded for `url`.
    pub fn content_type(&self, url: &str) -> Option<String> {
        self.lock_blobs().get(url).and_then(|(_, ct)| ct.clone())
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.lock_blobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total `put` calls, failed ones included.
    pub fn put_attempts(&self) -> usize {
        self.put_attempts.load(Ordering::SeqCst)
    }

    fn lock_blobs(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Bytes, Option<String>)>> {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_failures(&self) -> std::sync::MutexGuard<'_, Vec<FailureRule>> {
        self.failures.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn scripted_failure(&self, key: &str) -> Option<BlobStoreError> {
        let mut failures = self.lock_failures();
        let rule = failures
            .iter_mut()
            .find(|rule| rule.remaining > 0 && key.contains(&rule.fragment))?;
        rule.remaining -= 1;
        let message = format!("scripted failure for {}", key);
        Some(if rule.transient {
            BlobStoreError::StoreFailed(message)
        } else {
            BlobStoreError::Rejected(message)
        })
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        namespace: &str,
        name: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> Result<StoredBlob> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);
        let key = format!("{}/{}", namespace, name);
        validate_key(&key)?;
        if let Some(err) = self.scripted_failure(&key) {
            return Err(err);
        }

        let url = format!("{}{}", URL_SCHEME, key);
        let blob = StoredBlob {
            key,
            url: url.clone(),
            size: bytes.len() as u64,
            content_hash: hash_to_hex(&compute_hash(&bytes)),
        };
        self.lock_blobs()
            .insert(url, (bytes, content_type.map(str::to_string)));
        Ok(blob)
    }

    async fn delete(&self, url: &str) -> Result<()> {
        if !url.starts_with(URL_SCHEME) {
            return Err(BlobStoreError::InvalidUrl(url.to_string()));
        }
        self.lock_blobs().remove(url);
        Ok(())
    }

    fn storage_type(&self) -> BlobStoreType {
        BlobStoreType::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_delete() {
        let store = MemoryBlobStore::new();
        let blob = store
            .put("o/t", "image-1.jpg", Bytes::from_static(b"one"), Some("image/jpeg"))
            .await
            .unwrap();

        assert_eq!(blob.url, "memory://o/t/image-1.jpg");
        assert_eq!(store.get(&blob.url).unwrap(), Bytes::from_static(b"one"));
        assert_eq!(store.content_type(&blob.url).as_deref(), Some("image/jpeg"));

        store.delete(&blob.url).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_scripted_failures_run_out() {
        let store = MemoryBlobStore::new();
        store.fail_puts_matching("image-2", 2, true);

        for _ in 0..2 {
            let err = store
                .put("o/t", "image-2.jpg", Bytes::from_static(b"x"), None)
                .await
                .unwrap_err();
            assert!(err.is_transient());
        }
        store
            .put("o/t", "image-2.jpg", Bytes::from_static(b"x"), None)
            .await
            .unwrap();
        store
            .put("o/t", "image-1.jpg", Bytes::from_static(b"x"), None)
            .await
            .unwrap();
        assert_eq!(store.put_attempts(), 4);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure() {
        let store = MemoryBlobStore::new();
        store.fail_puts_matching("", 1, false);
        let err = store
            .put("o/t", "image-1.jpg", Bytes::from_static(b"x"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BlobStoreError::Rejected(_)));
        assert!(!err.is_transient());
    }
}
