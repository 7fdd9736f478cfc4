//! Shared startup for every subcommand: config, durable storage, settings
//! and the delivery service they imply.

use std::error::Error;
use std::sync::Arc;

use tracing::debug;

use crate::core::config::Config;
use crate::core::delivery::MessageDeliveryService;
use crate::core::providers::{ProviderConfig, DEFAULT_MODEL};
use crate::core::session_store::SessionStore;
use crate::core::settings::SettingsStore;
use crate::core::snapshots::ChatSnapshots;
use crate::core::storage::{FileStorage, KeyValueStorage};

pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Command-line choices that override stored settings.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub no_stream: bool,
}

pub struct AppContext {
    pub config: Config,
    pub storage: Arc<dyn KeyValueStorage>,
    pub settings: SettingsStore,
    pub client: reqwest::Client,
    pub overrides: Overrides,
}

impl AppContext {
    pub fn load(overrides: Overrides) -> Result<Self, Box<dyn Error>> {
        let config = Config::load()?;
        let data_dir = config.data_dir()?;
        debug!(data_dir = %data_dir.display(), "Using data directory");
        let storage: Arc<dyn KeyValueStorage> = Arc::new(FileStorage::new(data_dir));
        Ok(Self::with_storage(config, storage, overrides))
    }

    pub fn with_storage(
        config: Config,
        storage: Arc<dyn KeyValueStorage>,
        overrides: Overrides,
    ) -> Self {
        let settings = SettingsStore::load(storage.clone());
        Self {
            config,
            storage,
            settings,
            client: reqwest::Client::new(),
            overrides,
        }
    }

    pub fn provider_id(&self) -> String {
        self.overrides
            .provider
            .clone()
            .unwrap_or_else(|| self.config.provider().to_string())
    }

    pub fn model(&self) -> String {
        resolve_model(
            self.overrides.model.as_deref(),
            self.settings.all().model_name.as_deref(),
        )
    }

    pub fn stream(&self) -> bool {
        self.config.stream && !self.overrides.no_stream
    }

    pub fn api_key(&self) -> Option<String> {
        resolve_api_key(
            self.overrides.api_key.as_deref(),
            self.settings.api_key(),
            std::env::var(API_KEY_ENV).ok(),
        )
    }

    /// Adapter settings for `api_key` under the current provider and model.
    pub fn provider_config_with_key(&self, api_key: impl Into<String>) -> ProviderConfig {
        ProviderConfig {
            base_url: self.config.base_url.clone(),
            generation: self.config.generation,
            ..ProviderConfig::new(self.provider_id(), api_key, self.model())
        }
    }

    pub fn provider_config(&self) -> Option<ProviderConfig> {
        self.api_key().map(|key| self.provider_config_with_key(key))
    }

    /// Delivery service, configured when a credential is available.
    pub fn delivery(&self) -> Result<MessageDeliveryService, Box<dyn Error>> {
        let mut delivery = MessageDeliveryService::new(self.client.clone(), self.config.retry);
        if let Some(config) = self.provider_config() {
            delivery.configure(config)?;
        }
        Ok(delivery)
    }

    pub fn session_store(&self) -> SessionStore {
        SessionStore::load(self.storage.clone())
    }

    pub fn snapshots(&self) -> ChatSnapshots {
        ChatSnapshots::new(self.storage.clone())
    }
}

/// First non-blank of: the flag, the stored setting, the environment.
pub fn resolve_api_key(
    flag: Option<&str>,
    stored: Option<&str>,
    env: Option<String>,
) -> Option<String> {
    flag.map(str::to_string)
        .into_iter()
        .chain(stored.map(str::to_string))
        .chain(env)
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
}

pub fn resolve_model(flag: Option<&str>, stored: Option<&str>) -> String {
    flag.or(stored)
        .filter(|model| !model.trim().is_empty())
        .unwrap_or(DEFAULT_MODEL)
        .to_string()
}
