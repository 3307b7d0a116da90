use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

pub const KEY_ENDPOINT: &str = "endpoint";
pub const KEY_DEVICE_ID: &str = "device_id";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not a JSON object of strings: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("store lock poisoned")]
    Poisoned,
}

/// Durable string key-value storage for the panel settings.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Writes every entry or none of them.
    fn set_all(&self, entries: &[(&str, &str)]) -> Result<(), StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_all(&[(key, value)])
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        for (key, value) in entries {
            values.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }
}

/// Flat JSON object on disk. Every write replaces the whole file atomically.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }
}

impl ConfigStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.load() {
            Ok(mut values) => values.remove(key),
            Err(e) => {
                warn!("Reading {} from store failed: {}", key, e);
                None
            }
        }
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut values = match self.load() {
            Ok(values) => values,
            Err(StoreError::Corrupt { source, .. }) => {
                self.quarantine(&source)?;
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        for (key, value) in entries {
            values.insert(key.to_string(), value.to_string());
        }

        let content = serde_json::to_vec_pretty(&values).map_err(|source| {
            StoreError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;
        self.replace(&content)?;
        debug!("Stored {} key(s) in {}", entries.len(), self.path.display());
        Ok(())
    }
}

impl FileStore {
    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Writes a sibling temp file and renames it over the store.
    fn replace(&self, content: &[u8]) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        tmp.write_all(content).map_err(|e| self.io_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_error(e.error))?;
        Ok(())
    }

    /// Moves an unreadable store aside so it is kept but no longer blocks writes.
    fn quarantine(&self, reason: &serde_json::Error) -> Result<(), StoreError> {
        let mut aside = self.path.clone().into_os_string();
        aside.push(".corrupt");
        let aside = PathBuf::from(aside);
        warn!(
            "{} is unreadable ({}), moving it to {}",
            self.path.display(),
            reason,
            aside.display()
        );
        std::fs::rename(&self.path, &aside).map_err(|e| self.io_error(e))
    }
}

/// A submitted settings form.
#[derive(Debug, Clone, Default)]
pub struct SubmitEvent {
    pub endpoint: String,
    pub device_id: String,
    default_prevented: bool,
}

impl SubmitEvent {
    pub fn new(endpoint: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            device_id: device_id.into(),
            default_prevented: false,
        }
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// Suppresses the form's default action and writes both fields verbatim.
pub fn store_endpoint(store: &dyn ConfigStore, event: &mut SubmitEvent) -> Result<(), StoreError> {
    event.prevent_default();
    store.set_all(&[
        (KEY_ENDPOINT, event.endpoint.as_str()),
        (KEY_DEVICE_ID, event.device_id.as_str()),
    ])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_endpoint_writes_both_keys_and_prevents_default() {
        let store = MemoryStore::new();
        let mut event = SubmitEvent::new("https://x/y", "d1");

        store_endpoint(&store, &mut event).expect("store");

        assert!(event.default_prevented());
        assert_eq!(store.get(KEY_ENDPOINT).as_deref(), Some("https://x/y"));
        assert_eq!(store.get(KEY_DEVICE_ID).as_deref(), Some("d1"));
    }

    #[test]
    fn store_endpoint_overwrites_and_accepts_empty_values() {
        let store = MemoryStore::new();
        store_endpoint(&store, &mut SubmitEvent::new("https://x/y", "d1")).expect("store");
        store_endpoint(&store, &mut SubmitEvent::new("not a url", "")).expect("store");

        assert_eq!(store.get(KEY_ENDPOINT).as_deref(), Some("not a url"));
        assert_eq!(store.get(KEY_DEVICE_ID).as_deref(), Some(""));
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("remocon.json");

        let store = FileStore::new(&path);
        assert!(store.get(KEY_ENDPOINT).is_none());
        store_endpoint(&store, &mut SubmitEvent::new("https://x/y", "d1")).expect("store");

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get(KEY_ENDPOINT).as_deref(), Some("https://x/y"));
        assert_eq!(reopened.get(KEY_DEVICE_ID).as_deref(), Some("d1"));
    }

    #[test]
    fn truncated_file_is_moved_aside_and_configure_recovers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("remocon.json");
        let truncated = r#"{"device_id":"d1","endpoint":"https://x"#;
        std::fs::write(&path, truncated).expect("write");

        let store = FileStore::new(&path);
        assert!(store.get(KEY_ENDPOINT).is_none());
        store_endpoint(&store, &mut SubmitEvent::new("https://x/y", "d1")).expect("store");

        assert_eq!(store.get(KEY_ENDPOINT).as_deref(), Some("https://x/y"));
        assert_eq!(store.get(KEY_DEVICE_ID).as_deref(), Some("d1"));
        let aside = dir.path().join("remocon.json.corrupt");
        assert_eq!(std::fs::read_to_string(aside).expect("read"), truncated);
    }

    #[test]
    fn file_store_write_leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("remocon.json");
        let store = FileStore::new(&path);
        store.set(KEY_ENDPOINT, "https://x/y").expect("set");
        store.set(KEY_DEVICE_ID, "d1").expect("set");

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .map(|e| e.expect("entry").file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("remocon.json")]);
    }

    /// Rejects any batch that touches `device_id`.
    #[derive(Default)]
    struct DeviceIdRejectingStore {
        inner: MemoryStore,
    }

    impl ConfigStore for DeviceIdRejectingStore {
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn set_all(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
            if entries.iter().any(|(key, _)| *key == KEY_DEVICE_ID) {
                return Err(StoreError::Poisoned);
            }
            self.inner.set_all(entries)
        }
    }

    #[test]
    fn failed_device_id_write_leaves_endpoint_unchanged() {
        let store = DeviceIdRejectingStore::default();
        store.inner.set(KEY_ENDPOINT, "https://old").expect("seed");
        store.inner.set(KEY_DEVICE_ID, "old").expect("seed");

        let err = store_endpoint(&store, &mut SubmitEvent::new("https://new", "new"));

        assert!(err.is_err());
        assert_eq!(store.get(KEY_ENDPOINT).as_deref(), Some("https://old"));
        assert_eq!(store.get(KEY_DEVICE_ID).as_deref(), Some("old"));
    }
}
