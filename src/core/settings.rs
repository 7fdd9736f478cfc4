use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::core::storage::KeyValueStorage;

pub const SETTINGS_KEY: &str = "chatbot_settings";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

impl Settings {
    /// Overwrite each field that `other` sets.
    fn merge(&mut self, other: Settings) {
        if other.api_key.is_some() {
            self.api_key = other.api_key;
        }
        if other.model_name.is_some() {
            self.model_name = other.model_name;
        }
        if other.theme.is_some() {
            self.theme = other.theme;
        }
    }
}

/// User settings record. Construct one per process, like [`SessionStore`].
///
/// [`SessionStore`]: crate::core::session_store::SessionStore
pub struct SettingsStore {
    storage: Arc<dyn KeyValueStorage>,
    settings: Settings,
}

impl SettingsStore {
    pub fn load(storage: Arc<dyn KeyValueStorage>) -> Self {
        let settings = match storage.get(SETTINGS_KEY) {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|err| {
                warn!(error = %err, "Ignoring unreadable settings");
                Settings::default()
            }),
            Ok(None) => Settings::default(),
            Err(err) => {
                warn!(error = %err, "Failed to load settings");
                Settings::default()
            }
        };
        Self { storage, settings }
    }

    pub fn all(&self) -> &Settings {
        &self.settings
    }

    pub fn api_key(&self) -> Option<&str> {
        self.settings.api_key.as_deref()
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some_and(|key| !key.trim().is_empty())
    }

    pub fn set_api_key(&mut self, api_key: impl Into<String>) {
        self.settings.api_key = Some(api_key.into());
        self.flush();
    }

    pub fn clear_api_key(&mut self) {
        self.settings.api_key = None;
        self.flush();
    }

    /// Merge the set fields of `changes` into the stored record.
    pub fn update(&mut self, changes: Settings) {
        self.settings.merge(changes);
        self.flush();
    }

    fn flush(&self) {
        let value = match serde_json::to_value(&self.settings) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "Failed to encode settings");
                return;
            }
        };
        if let Err(err) = self.storage.set(SETTINGS_KEY, &value) {
            warn!(error = %err, "Failed to save settings");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::MemoryStorage;
    use serde_json::json;

    #[test]
    fn api_key_lifecycle_is_persisted() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = SettingsStore::load(storage.clone());
        assert!(!store.has_api_key());

        store.set_api_key("sk-or-123");
        assert!(store.has_api_key());
        assert_eq!(
            storage.get(SETTINGS_KEY).unwrap(),
            Some(json!({"apiKey": "sk-or-123"}))
        );

        let reloaded = SettingsStore::load(storage.clone());
        assert_eq!(reloaded.api_key(), Some("sk-or-123"));

        store.clear_api_key();
        assert!(!SettingsStore::load(storage).has_api_key());
    }

    #[test]
    fn blank_key_does_not_count() {
        let mut store = SettingsStore::load(Arc::new(MemoryStorage::new()));
        store.set_api_key("   ");
        assert!(!store.has_api_key());
    }

    #[test]
    fn update_is_a_partial_merge() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set(
                SETTINGS_KEY,
                &json!({"apiKey": "k", "modelName": "openchat/openchat-7b:free"}),
            )
            .unwrap();
        let mut store = SettingsStore::load(storage.clone());

        store.update(Settings {
            theme: Some("dark".into()),
            ..Default::default()
        });

        assert_eq!(
            store.all(),
            &Settings {
                api_key: Some("k".into()),
                model_name: Some("openchat/openchat-7b:free".into()),
                theme: Some("dark".into()),
            }
        );
        assert_eq!(
            storage.get(SETTINGS_KEY).unwrap().unwrap()["modelName"],
            "openchat/openchat-7b:free"
        );
    }
}
