use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::common::{DomainError, DomainResult};
use crate::domains::routing::{AssetFetcher, CachedAsset};

/// Local mirror of external resources referenced by rendered maps.
///
/// Each URL has its own async lock held across "exists? else download and store", so
/// concurrent callers for one URL trigger a single download while other URLs proceed.
/// A lock is dropped from the table once no caller is using it.
pub struct AssetCache {
    directory: PathBuf,
    fetcher: Arc<dyn AssetFetcher>,
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AssetCache {
    pub fn new<P: Into<PathBuf>>(directory: P, fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            directory: directory.into(),
            fetcher,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Where `url` is (or would be) stored.
    pub fn path_for(&self, url: &str) -> PathBuf {
        self.directory.join(asset_file_name(url))
    }

    pub async fn localize(&self, url: &str) -> DomainResult<CachedAsset> {
        let lock = self.lock_for(url);
        let result = {
            let _guard = lock.lock().await;
            self.mirror(url).await
        };
        self.release(url, lock);
        result
    }

    async fn mirror(&self, url: &str) -> DomainResult<CachedAsset> {
        let path = self.path_for(url);
        if tokio::fs::try_exists(&path).await? {
            debug!(url, path = %path.display(), "Asset already mirrored");
            return Ok(CachedAsset {
                url: url.to_string(),
                path,
            });
        }

        let bytes = self.fetcher.fetch(url).await?;
        tokio::fs::create_dir_all(&self.directory).await?;

        // Stage next to the target so the rename stays on one file system.
        let staging = self.directory.join(format!(".{}.part", Uuid::new_v4()));
        if let Err(e) = tokio::fs::write(&staging, &bytes).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(DomainError::Download {
                url: url.to_string(),
                reason: format!("could not store asset: {}", e),
            });
        }
        if let Err(e) = tokio::fs::rename(&staging, &path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }

        info!(url, path = %path.display(), bytes = bytes.len(), "Asset mirrored");
        Ok(CachedAsset {
            url: url.to_string(),
            path,
        })
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_for(&self, url: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks().entry(url.to_string()).or_default())
    }

    /// Drop the table entry when the table and `lock` are its only holders.
    fn release(&self, url: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(url);
        }
        // released under the table lock so a concurrent release sees the final count
        drop(lock);
    }
}

/// md5 of the URL plus the extension of its path, e.g. `3f2a….css`.
pub fn asset_file_name(url: &str) -> String {
    let digest = format!("{:x}", md5::compute(url.as_bytes()));
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next().unwrap_or("");
    match last.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!("{}.{}", digest, ext.to_ascii_lowercase())
        }
        _ => digest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Slow;

    #[async_trait]
    impl AssetFetcher for Slow {
        async fn fetch(&self, url: &str) -> DomainResult<Vec<u8>> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if url.ends_with(".missing") {
                return Err(DomainError::Download {
                    url: url.to_string(),
                    reason: "HTTP 404 Not Found".to_string(),
                });
            }
            Ok(url.as_bytes().to_vec())
        }
    }

    #[tokio::test]
    async fn lock_table_is_empty_after_callers_finish() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(AssetCache::new(dir.path(), Arc::new(Slow)));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let url = format!("https://cdn.example.org/{}.js", i % 3);
                tokio::spawn(async move { cache.localize(&url).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(cache.locks().is_empty());

        assert!(cache.localize("https://cdn.example.org/a.missing").await.is_err());
        assert!(cache.locks().is_empty());
    }

    #[test]
    fn file_name_keeps_extension() {
        let name = asset_file_name("https://unpkg.com/leaflet@1.9.4/dist/leaflet.css?v=1");
        assert!(name.ends_with(".css"));
        assert_eq!(name.len(), 32 + 4);
    }

    #[test]
    fn file_name_without_extension_is_bare_digest() {
        let name = asset_file_name("https://example.com/tiles/");
        assert_eq!(name.len(), 32);
        assert_eq!(name, asset_file_name("https://example.com/tiles/"));
    }
}
