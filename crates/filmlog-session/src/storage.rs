//! Durable key/value storage shared by every tab of one origin.
//!
//! A [`LocalStorage`] is the origin: one map, optionally persisted to a JSON
//! file. Each [`Tab`] is a handle onto it. Writes are last-writer-wins and
//! are announced to every *other* tab as a [`StorageEvent`]; the writing tab
//! never sees its own change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::errors::StorageError;

pub type TabId = u64;

const EVENT_CAPACITY: usize = 64;

/// A change made by some tab.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub old_value: Option<String>,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
    pub source: TabId,
}

pub trait DurableStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    /// Changes made by other tabs from now on.
    fn subscribe(&self) -> StorageEvents;
}

/// Receiver of storage events, filtered to exclude the subscriber's own tab.
pub struct StorageEvents {
    rx: broadcast::Receiver<StorageEvent>,
    own_tab: TabId,
}

impl StorageEvents {
    /// Next foreign event, or `None` once the origin is gone.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.source == self.own_tab => continue,
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "storage events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

struct Origin {
    entries: Mutex<BTreeMap<String, String>>,
    path: Option<PathBuf>,
    events: broadcast::Sender<StorageEvent>,
    next_tab: AtomicU64,
}

impl Origin {
    fn write(&self, tab: TabId, key: &str, value: Option<&str>) -> Result<(), StorageError> {
        let event = {
            let mut entries = self.entries.lock();
            let old_value = entries.get(key).cloned();
            if old_value.as_deref() == value {
                return Ok(());
            }
            let mut next = entries.clone();
            match value {
                Some(v) => {
                    let _ = next.insert(key.to_string(), v.to_string());
                }
                None => {
                    let _ = next.remove(key);
                }
            }
            if let Some(path) = &self.path {
                save_entries(path, &next)?;
            }
            *entries = next;
            StorageEvent {
                key: key.to_string(),
                old_value,
                new_value: value.map(str::to_string),
                source: tab,
            }
        };
        debug!(key, tab, removed = event.new_value.is_none(), "durable store write");
        // No receivers is fine: nobody else is listening.
        let _ = self.events.send(event);
        Ok(())
    }
}

/// The storage origin.
#[derive(Clone)]
pub struct LocalStorage {
    origin: Arc<Origin>,
}

impl LocalStorage {
    pub fn in_memory() -> Self {
        Self::with_entries(BTreeMap::new(), None)
    }

    /// Open a file-backed origin. A missing file starts empty.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self::with_entries(entries, Some(path.to_path_buf())))
    }

    fn with_entries(entries: BTreeMap<String, String>, path: Option<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            origin: Arc::new(Origin {
                entries: Mutex::new(entries),
                path,
                events,
                next_tab: AtomicU64::new(1),
            }),
        }
    }

    /// A new tab onto this origin.
    pub fn tab(&self) -> Tab {
        Tab {
            origin: self.origin.clone(),
            id: self.origin.next_tab.fetch_add(1, Ordering::Relaxed),
        }
    }
}

/// One tab's handle onto a [`LocalStorage`] origin.
#[derive(Clone)]
pub struct Tab {
    origin: Arc<Origin>,
    id: TabId,
}

impl Tab {
    pub fn id(&self) -> TabId {
        self.id
    }
}

impl DurableStore for Tab {
    fn get(&self, key: &str) -> Option<String> {
        self.origin.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.origin.write(self.id, key, Some(value))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.origin.write(self.id, key, None)
    }

    fn subscribe(&self) -> StorageEvents {
        StorageEvents {
            rx: self.origin.events.subscribe(),
            own_tab: self.id,
        }
    }
}

fn save_entries(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(entries)?;
    std::fs::write(path, json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        let _ = std::fs::set_permissions(path, perms);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tabs_share_values() {
        let origin = LocalStorage::in_memory();
        let a = origin.tab();
        let b = origin.tab();
        a.set("auth:loginAt", "1000").unwrap();
        assert_eq!(b.get("auth:loginAt").as_deref(), Some("1000"));
        b.remove("auth:loginAt").unwrap();
        assert!(a.get("auth:loginAt").is_none());
    }

    #[tokio::test]
    async fn events_reach_other_tabs_only() {
        let origin = LocalStorage::in_memory();
        let writer = origin.tab();
        let reader = origin.tab();
        let mut own = writer.subscribe();
        let mut foreign = reader.subscribe();

        writer.set("k", "v").unwrap();
        reader.set("k", "w").unwrap();

        let event = foreign.recv().await.unwrap();
        assert_eq!(event.source, writer.id());
        assert_eq!(event.new_value.as_deref(), Some("v"));

        // The writer sees the reader's change, never its own.
        let event = own.recv().await.unwrap();
        assert_eq!(event.source, reader.id());
        assert_eq!(event.old_value.as_deref(), Some("v"));
        assert_eq!(event.new_value.as_deref(), Some("w"));
    }

    #[tokio::test]
    async fn unchanged_value_emits_nothing() {
        let origin = LocalStorage::in_memory();
        let writer = origin.tab();
        let reader = origin.tab();
        let mut events = reader.subscribe();

        writer.set("k", "v").unwrap();
        writer.set("k", "v").unwrap();
        writer.remove("k").unwrap();

        assert_eq!(events.recv().await.unwrap().new_value.as_deref(), Some("v"));
        assert_eq!(events.recv().await.unwrap().new_value, None);
        assert!(events.rx.try_recv().is_err());
    }

    #[test]
    fn removing_missing_key_is_ok() {
        let origin = LocalStorage::in_memory();
        assert!(origin.tab().remove("absent").is_ok());
    }

    #[test]
    fn file_backed_origin_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("local-storage.json");

        let origin = LocalStorage::open(&path).unwrap();
        origin.tab().set("auth:loginAt", "42").unwrap();

        let reopened = LocalStorage::open(&path).unwrap();
        assert_eq!(reopened.tab().get("auth:loginAt").as_deref(), Some("42"));
    }

    #[cfg(unix)]
    #[test]
    fn file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local-storage.json");
        LocalStorage::open(&path).unwrap().tab().set("k", "v").unwrap();
        let perms = std::fs::metadata(&path).unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local-storage.json");
        std::fs::write(&path, "[not a map").unwrap();
        assert!(matches!(
            LocalStorage::open(&path),
            Err(StorageError::Serialization(_))
        ));
    }
}
