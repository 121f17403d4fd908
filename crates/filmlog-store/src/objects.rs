//! Object storage for post images.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::StoreError;

/// Blob storage addressed by slash-separated keys such as
/// `images/<owner>/<post>_0.png`. Writes overwrite.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key` and return the stable public URL.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, StoreError>;

    /// Delete every object whose key starts with `prefix`. Returns the count.
    async fn remove_prefix(&self, prefix: &str) -> Result<usize, StoreError>;

    /// Public URL for a key, whether or not it exists.
    fn public_url(&self, key: &str) -> String;
}

/// Objects as files under a root directory.
pub struct FsObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StoreError::InvalidInput(format!("object key: {key}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, StoreError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), "object stored");
        Ok(self.public_url(key))
    }

    #[instrument(skip(self))]
    async fn remove_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        // The prefix's last segment is a file name prefix, the rest a directory.
        let (dir_key, file_prefix) = match prefix.rsplit_once('/') {
            Some((dir, file)) => (dir, file),
            None => ("", prefix),
        };
        let dir = if dir_key.is_empty() {
            self.root.clone()
        } else {
            self.resolve(dir_key)?
        };

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let matches = name
                .to_str()
                .is_some_and(|n| n.starts_with(file_prefix));
            if matches && entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}
