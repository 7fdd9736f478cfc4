use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::builtin_providers::find_builtin_provider;
use crate::core::chat_completions::ChatCompletionsProvider;
use crate::core::chat_stream::DeltaSink;
use crate::core::error::DeliveryError;
use crate::core::message::Turn;

pub const DEFAULT_MODEL: &str = "deepseek/deepseek-r1-distill-llama-70b:free";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const AVAILABLE_MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: DEFAULT_MODEL,
        name: "DeepSeek R1 70B",
        description: "Powerful open-source language model",
    },
    ModelInfo {
        id: "mistralai/mistral-7b-instruct:free",
        name: "Mistral 7B",
        description: "Efficient and accurate instruction-following model",
    },
    ModelInfo {
        id: "openchat/openchat-7b:free",
        name: "OpenChat 7B",
        description: "Open-source conversational AI",
    },
    ModelInfo {
        id: "gryphe/mythomist-7b:free",
        name: "MythoMist 7B",
        description: "Creative and engaging conversational model",
    },
];

pub fn find_model(id: &str) -> Option<&'static ModelInfo> {
    AVAILABLE_MODELS.iter().find(|model| model.id == id)
}

/// Display name for a model id, falling back to a generic label.
pub fn model_display_name(id: &str) -> &str {
    find_model(id).map(|model| model.name).unwrap_or("AI Model")
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// Everything one adapter needs. Changing any field means building a new
/// adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub provider: String,
    pub api_key: String,
    pub model: String,
    /// Overrides the built-in base URL for the provider.
    pub base_url: Option<String>,
    pub generation: GenerationParams,
}

impl ProviderConfig {
    pub fn new(provider: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            generation: GenerationParams::default(),
        }
    }
}

/// One backend's wire format behind a single capability.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Send the ordered turns and return the assistant reply.
    ///
    /// Streams when `on_delta` is present, forwarding each delta to it.
    /// Fails only with [`DeliveryError::Cancelled`] or
    /// [`DeliveryError::Api`].
    async fn send_message(
        &self,
        turns: &[Turn],
        cancel: &CancellationToken,
        on_delta: Option<&DeltaSink>,
    ) -> Result<String, DeliveryError>;
}

/// Where requests for `config` go: the completions endpoint plus the
/// gateway's identification headers.
pub fn resolve_endpoint(
    config: &ProviderConfig,
) -> Result<(String, Vec<(&'static str, String)>), DeliveryError> {
    let builtin = find_builtin_provider(&config.provider).ok_or_else(|| {
        DeliveryError::Validation(format!("Unsupported provider: {}", config.provider))
    })?;
    let base_url = config.base_url.as_deref().unwrap_or(&builtin.base_url);
    Ok((
        join_endpoint(base_url, "chat/completions"),
        builtin.identity_headers(),
    ))
}

/// `<base>/<path>` with exactly one slash between them.
pub fn join_endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Build the adapter for `config.provider`.
pub fn build_provider(
    client: reqwest::Client,
    config: ProviderConfig,
) -> Result<Arc<dyn ChatProvider>, DeliveryError> {
    if config.api_key.trim().is_empty() {
        return Err(DeliveryError::Validation("API key is required".to_string()));
    }
    let (endpoint, identity) = resolve_endpoint(&config)?;
    let display_name = find_builtin_provider(&config.provider)
        .map(|builtin| builtin.display_name)
        .unwrap_or_else(|| config.provider.clone());

    Ok(Arc::new(ChatCompletionsProvider::new(
        client,
        display_name,
        endpoint,
        identity,
        config,
    )))
}
