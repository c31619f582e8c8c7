//! User preferences.
//!
//! `SettingsProvider` owns the only in-memory copy of the settings blob
//! persisted under `@settings`. Components read `current()` instead of going
//! back to the store, and can `subscribe()` to changes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::SchoolRef;
use crate::store::KeyValueStore;

/// Store key for the settings blob
pub const SETTINGS_KEY: &str = "@settings";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub school: Option<SchoolRef>,
    pub school_name: Option<String>,
    pub grade: Option<u32>,
    pub class_num: Option<u32>,
    pub show_allergy: bool,
    pub show_origin: bool,
    pub show_nutrition: bool,
}

impl Settings {
    pub fn require_school(&self) -> Result<&SchoolRef> {
        self.school.as_ref().ok_or(Error::NoSchoolSelected)
    }

    /// `(school_id, grade, class_num)` for timetable lookups
    pub fn require_class(&self) -> Result<(&str, u32, u32)> {
        let school = self.require_school()?;
        match (self.grade, self.class_num) {
            (Some(grade), Some(class_num)) => Ok((school.school_id.as_str(), grade, class_num)),
            _ => Err(Error::NoClassSelected),
        }
    }
}

/// Cheap to clone; clones share the same settings.
#[derive(Clone)]
pub struct SettingsProvider {
    store: Arc<dyn KeyValueStore>,
    tx: Arc<watch::Sender<Settings>>,
    write_lock: Arc<Mutex<()>>,
}

impl SettingsProvider {
    /// Read the persisted settings once. Corrupt settings fall back to defaults.
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let settings = match store.get_string(SETTINGS_KEY).await? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "Failed to parse settings, using defaults");
                Settings::default()
            }),
            None => Settings::default(),
        };
        Ok(Self::with_settings(store, settings))
    }

    /// Use `settings` as the current value without reading the store
    pub fn with_settings(store: Arc<dyn KeyValueStore>, settings: Settings) -> Self {
        let (tx, _) = watch::channel(settings);
        Self {
            store,
            tx: Arc::new(tx),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn current(&self) -> Settings {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    /// Apply `change`, persist the result, then notify subscribers.
    /// Returns whether anything changed; unchanged settings are not written.
    pub async fn update<F>(&self, change: F) -> Result<bool>
    where
        F: FnOnce(&mut Settings),
    {
        let _guard = self.write_lock.lock().await;
        let mut next = self.current();
        change(&mut next);
        if next == *self.tx.borrow() {
            return Ok(false);
        }

        let contents = serde_json::to_string(&next)?;
        self.store.set_string(SETTINGS_KEY, &contents).await?;
        debug!(?next, "Settings updated");
        self.tx.send_replace(next);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_update_persists_and_notifies() {
        let store = Arc::new(MemoryStore::new());
        let provider = SettingsProvider::load(store.clone()).await.unwrap();
        let mut rx = provider.subscribe();
        assert_eq!(provider.current(), Settings::default());

        let changed = provider.update(|s| s.show_allergy = true).await.unwrap();
        assert!(changed);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().show_allergy);

        let reloaded = SettingsProvider::load(store).await.unwrap();
        assert!(reloaded.current().show_allergy);
    }

    #[tokio::test]
    async fn test_unchanged_update_is_not_broadcast() {
        let store = Arc::new(MemoryStore::new());
        let provider = SettingsProvider::load(store.clone()).await.unwrap();
        let rx = provider.subscribe();

        assert!(!provider.update(|s| s.show_allergy = false).await.unwrap());
        assert!(!rx.has_changed().unwrap());
        assert!(store.get_string(SETTINGS_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_settings_fall_back_to_defaults() {
        let store = Arc::new(MemoryStore::new());
        store.set_string(SETTINGS_KEY, "[]").await.unwrap();
        let provider = SettingsProvider::load(store).await.unwrap();
        assert_eq!(provider.current(), Settings::default());
    }

    #[test]
    fn test_require_class() {
        let mut settings = Settings {
            school: Some(SchoolRef::new("7010057", "B10")),
            grade: Some(2),
            ..Default::default()
        };
        assert!(matches!(settings.require_class(), Err(Error::NoClassSelected)));

        settings.class_num = Some(3);
        assert_eq!(settings.require_class().unwrap(), ("7010057", 2, 3));
    }
}
