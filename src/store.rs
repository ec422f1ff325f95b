use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::errors::TourError;

/// A string key/value store, in the spirit of `localStorage`.
pub trait FlagStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, TourError>;
    fn set(&self, key: &str, value: &str) -> Result<(), TourError>;
    fn remove(&self, key: &str) -> Result<(), TourError>;
    fn keys(&self) -> Result<Vec<String>, TourError>;
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, TourError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), TourError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), TourError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, TourError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.keys().cloned().collect())
    }
}

/// Keeps the entries in a JSON object on disk so they survive restarts.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TourError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            HashMap::new()
        };
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), TourError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash never leaves half a file behind.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl FlagStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, TourError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), TourError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), TourError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, TourError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.keys().cloned().collect())
    }
}

/// One viewer's slice of a shared store, so one browser's flag never decides
/// what another browser sees.
pub struct ScopedStore {
    inner: Arc<dyn FlagStore>,
    prefix: String,
}

impl ScopedStore {
    pub fn new(inner: Arc<dyn FlagStore>, scope: &str) -> Self {
        Self { inner, prefix: format!("{}/", scope) }
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

impl FlagStore for ScopedStore {
    fn get(&self, key: &str) -> Result<Option<String>, TourError> {
        self.inner.get(&self.scoped(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), TourError> {
        self.inner.set(&self.scoped(key), value)
    }

    fn remove(&self, key: &str) -> Result<(), TourError> {
        self.inner.remove(&self.scoped(key))
    }

    fn keys(&self) -> Result<Vec<String>, TourError> {
        Ok(self
            .inner
            .keys()?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }
}

/// Removes `key` itself and every viewer's copy of it. Returns how many
/// entries were dropped.
pub fn clear_everywhere(store: &dyn FlagStore, key: &str) -> Result<usize, TourError> {
    let suffix = format!("/{}", key);
    let matching: Vec<String> = store
        .keys()?
        .into_iter()
        .filter(|candidate| candidate == key || candidate.ends_with(&suffix))
        .collect();
    for candidate in &matching {
        store.remove(candidate)?;
    }
    Ok(matching.len())
}

/// Opens the configured store, falling back to memory when there is no path
/// or the file cannot be read.
pub fn open_store(storage_path: Option<&str>) -> Arc<dyn FlagStore> {
    match storage_path {
        Some(path) => match FileStore::open(path) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                log::warn!("Could not open the tour store at {} ({}). Completion will only last until restart.", path, e);
                Arc::new(MemoryStore::new())
            }
        },
        None => Arc::new(MemoryStore::new()),
    }
}

/// The persisted "tour completed" marker. Nothing else writes its key.
#[derive(Clone)]
pub struct CompletionFlag {
    store: Arc<dyn FlagStore>,
    key: String,
}

impl CompletionFlag {
    pub fn new(store: Arc<dyn FlagStore>, key: &str) -> Self {
        Self { store, key: key.to_string() }
    }

    pub fn is_set(&self) -> bool {
        match self.store.get(&self.key) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                log::error!("Could not read '{}': {}", self.key, e);
                false
            }
        }
    }

    pub fn set(&self) {
        if let Err(e) = self.store.set(&self.key, "true") {
            log::error!("Could not persist '{}': {}", self.key, e);
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.remove(&self.key) {
            log::error!("Could not clear '{}': {}", self.key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state/tour.json");

        let store = FileStore::open(&path).unwrap();
        store.set("ai-tour-completed", "true").unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("ai-tour-completed").unwrap(), Some("true".to_string()));
        reopened.remove("ai-tour-completed").unwrap();

        let again = FileStore::open(&path).unwrap();
        assert_eq!(again.get("ai-tour-completed").unwrap(), None);
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tour.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(FileStore::open(&path), Err(TourError::Store { .. })));
    }

    #[test]
    fn test_completion_flag_only_true_counts() {
        let store = Arc::new(MemoryStore::new());
        let flag = CompletionFlag::new(store.clone(), "ai-tour-completed");
        assert!(!flag.is_set());

        store.set("ai-tour-completed", "yes").unwrap();
        assert!(!flag.is_set());

        flag.set();
        assert!(flag.is_set());
        assert_eq!(store.get("ai-tour-completed").unwrap(), Some("true".to_string()));

        flag.clear();
        assert!(!flag.is_set());
        assert_eq!(store.get("ai-tour-completed").unwrap(), None);
    }

    #[test]
    fn test_viewers_keep_separate_flags() {
        let shared: Arc<dyn FlagStore> = Arc::new(MemoryStore::new());
        let alice = CompletionFlag::new(Arc::new(ScopedStore::new(shared.clone(), "viewer-a")), "ai-tour-completed");
        let bob = CompletionFlag::new(Arc::new(ScopedStore::new(shared.clone(), "viewer-b")), "ai-tour-completed");

        alice.set();
        assert!(alice.is_set());
        assert!(!bob.is_set(), "one viewer finishing must not hide the tour for another");
        assert_eq!(shared.get("viewer-a/ai-tour-completed").unwrap(), Some("true".to_string()));

        let scoped = ScopedStore::new(shared.clone(), "viewer-a");
        assert_eq!(scoped.keys().unwrap(), vec!["ai-tour-completed".to_string()]);
    }

    #[test]
    fn test_clear_everywhere_drops_every_viewer() {
        let dir = tempdir().unwrap();
        let shared: Arc<dyn FlagStore> = Arc::new(FileStore::open(dir.path().join("tour.json")).unwrap());
        shared.set("ai-tour-completed", "true").unwrap();
        shared.set("viewer-a/ai-tour-completed", "true").unwrap();
        shared.set("viewer-b/ai-tour-completed", "true").unwrap();
        shared.set("viewer-b/other", "kept").unwrap();

        assert_eq!(clear_everywhere(shared.as_ref(), "ai-tour-completed").unwrap(), 3);
        assert_eq!(shared.keys().unwrap(), vec!["viewer-b/other".to_string()]);
    }

    #[test]
    fn test_open_store_falls_back_to_memory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tour.json");
        fs::write(&path, "{broken").unwrap();
        let store = open_store(path.to_str());
        store.set("a", "b").unwrap();
        assert_eq!(store.get("a").unwrap(), Some("b".to_string()));
    }
}
