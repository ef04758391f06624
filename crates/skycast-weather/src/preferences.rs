//! Persistence of the most recently viewed location.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::PreferenceError;
use crate::types::Location;

pub const LAST_LOCATION_KEY: &str = "last_selected_location";

/// String key-value store with change notification.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, PreferenceError>;

    /// Write or, with `None`, remove a key. The write is all-or-nothing.
    fn set(&self, key: &str, value: Option<&str>) -> Result<(), PreferenceError>;

    /// Receiver that observes a new version after every successful write.
    fn subscribe(&self) -> watch::Receiver<u64>;
}

/// JSON file holding a flat string map.
pub struct FilePreferenceStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
    changes: watch::Sender<u64>,
}

impl FilePreferenceStore {
    /// Load the store at `path`.
    ///
    /// A missing or unparseable file is an empty store; the next `set`
    /// overwrites it. Only I/O failures are errors.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PreferenceError> {
        let path = path.as_ref().to_path_buf();

        let values = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).unwrap_or_else(|e| {
                    tracing::warn!("Ignoring unreadable preferences at {}: {}", path.display(), e);
                    BTreeMap::new()
                })
            }
        } else {
            BTreeMap::new()
        };

        let (changes, _) = watch::channel(0);
        Ok(Self {
            path,
            values: Mutex::new(values),
            changes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), PreferenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>, PreferenceError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Option<&str>) -> Result<(), PreferenceError> {
        let mut values = self.values.lock();

        let mut updated = values.clone();
        match value {
            Some(v) => updated.insert(key.to_string(), v.to_string()),
            None => updated.remove(key),
        };

        // Only publish once the file is on disk
        self.persist(&updated)?;
        *values = updated;
        drop(values);

        self.changes
            .send_modify(|version| *version = version.wrapping_add(1));
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

/// Typed access to the last selected location.
#[derive(Clone)]
pub struct LocationPreferences {
    store: Arc<dyn PreferenceStore>,
}

impl LocationPreferences {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    /// The remembered location. Unreadable or undecodable values read as `None`.
    pub fn last_location(&self) -> Option<Location> {
        read_location(self.store.as_ref())
    }

    pub async fn set_last_location(&self, location: &Location) -> Result<(), PreferenceError> {
        let json = serde_json::to_string(location)?;
        self.write(Some(json)).await?;
        tracing::debug!("Remembered last location: {}", location.display_name());
        Ok(())
    }

    pub async fn clear_last_location(&self) -> Result<(), PreferenceError> {
        self.write(None).await
    }

    /// Store writes touch the filesystem, so they run on the blocking pool.
    async fn write(&self, value: Option<String>) -> Result<(), PreferenceError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.set(LAST_LOCATION_KEY, value.as_deref()))
            .await
            .map_err(|e| PreferenceError::Task(e.to_string()))?
    }

    /// Current value, then the value after every write to the store.
    pub fn watch_last_location(&self) -> impl Stream<Item = Option<Location>> + Send + 'static {
        let rx = self.store.subscribe();
        futures::stream::unfold(
            (Arc::clone(&self.store), rx, true),
            |(store, mut rx, first)| async move {
                if !first && rx.changed().await.is_err() {
                    return None;
                }
                rx.borrow_and_update();
                let location = read_location(store.as_ref());
                Some((location, (store, rx, false)))
            },
        )
        .boxed()
    }
}

fn read_location(store: &dyn PreferenceStore) -> Option<Location> {
    let json = match store.get(LAST_LOCATION_KEY) {
        Ok(Some(json)) => json,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!("Failed to read last location: {}", e);
            return None;
        }
    };

    match serde_json::from_str(&json) {
        Ok(location) => Some(location),
        Err(e) => {
            tracing::warn!("Discarding undecodable last location: {}", e);
            None
        }
    }
}
