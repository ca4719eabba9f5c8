//! State persistence collaborators.
//!
//! The engine persists two small pieces of state: the user's filter
//! settings and, per surface, the active search query + cursor. The store
//! is asynchronous and may be unreachable; callers treat every failure as
//! soft (logged, degraded) per the error taxonomy.

use async_trait::async_trait;
use feedlens_protocol::{FilterSettings, SavedSearch, SurfaceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::watch;

/// Store error type
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Persistent settings + search-state collaborator.
///
/// `settings_changes` is the change-notification channel: the session
/// re-applies the visibility policy on every update, however it arrived.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_settings(&self) -> Result<FilterSettings, StoreError>;

    async fn save_settings(&self, settings: &FilterSettings) -> Result<(), StoreError>;

    async fn load_search(&self, surface: SurfaceKind) -> Result<Option<SavedSearch>, StoreError>;

    async fn save_search(
        &self,
        surface: SurfaceKind,
        saved: &SavedSearch,
    ) -> Result<(), StoreError>;

    fn settings_changes(&self) -> watch::Receiver<FilterSettings>;
}

/// On-disk document shared by the file-backed store. One JSON file holds
/// settings plus per-surface search state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoreDoc {
    settings: Option<FilterSettings>,
    searches: BTreeMap<String, SavedSearch>,
}

fn poison_free<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// In-memory store
// ============================================================================

/// Volatile store for tests and the demo binary.
#[derive(Debug)]
pub struct MemoryStore {
    doc: Mutex<StoreDoc>,
    settings_tx: watch::Sender<FilterSettings>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (settings_tx, _) = watch::channel(FilterSettings::default());
        Self {
            doc: Mutex::new(StoreDoc::default()),
            settings_tx,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load_settings(&self) -> Result<FilterSettings, StoreError> {
        Ok(poison_free(&self.doc).settings.unwrap_or_default())
    }

    async fn save_settings(&self, settings: &FilterSettings) -> Result<(), StoreError> {
        poison_free(&self.doc).settings = Some(*settings);
        self.settings_tx.send_replace(*settings);
        Ok(())
    }

    async fn load_search(&self, surface: SurfaceKind) -> Result<Option<SavedSearch>, StoreError> {
        Ok(poison_free(&self.doc)
            .searches
            .get(surface.as_str())
            .cloned())
    }

    async fn save_search(
        &self,
        surface: SurfaceKind,
        saved: &SavedSearch,
    ) -> Result<(), StoreError> {
        poison_free(&self.doc)
            .searches
            .insert(surface.as_str().to_string(), saved.clone());
        Ok(())
    }

    fn settings_changes(&self) -> watch::Receiver<FilterSettings> {
        self.settings_tx.subscribe()
    }
}

// ============================================================================
// JSON-file store
// ============================================================================

/// File-backed store: the whole document lives in one JSON file, rewritten
/// on every save. State is tiny, so simplicity beats cleverness here.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    doc: Mutex<StoreDoc>,
    settings_tx: watch::Sender<FilterSettings>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let doc = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            StoreDoc::default()
        };
        let (settings_tx, _) = watch::channel(doc.settings.unwrap_or_default());
        Ok(Self {
            path,
            doc: Mutex::new(doc),
            settings_tx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, doc: &StoreDoc) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(doc)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load_settings(&self) -> Result<FilterSettings, StoreError> {
        Ok(poison_free(&self.doc).settings.unwrap_or_default())
    }

    async fn save_settings(&self, settings: &FilterSettings) -> Result<(), StoreError> {
        let snapshot = {
            let mut doc = poison_free(&self.doc);
            doc.settings = Some(*settings);
            doc.clone()
        };
        self.persist(&snapshot)?;
        self.settings_tx.send_replace(*settings);
        Ok(())
    }

    async fn load_search(&self, surface: SurfaceKind) -> Result<Option<SavedSearch>, StoreError> {
        Ok(poison_free(&self.doc)
            .searches
            .get(surface.as_str())
            .cloned())
    }

    async fn save_search(
        &self,
        surface: SurfaceKind,
        saved: &SavedSearch,
    ) -> Result<(), StoreError> {
        let snapshot = {
            let mut doc = poison_free(&self.doc);
            doc.searches
                .insert(surface.as_str().to_string(), saved.clone());
            doc.clone()
        };
        self.persist(&snapshot)
    }

    fn settings_changes(&self) -> watch::Receiver<FilterSettings> {
        self.settings_tx.subscribe()
    }
}
