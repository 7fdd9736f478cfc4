//! Adapter for OpenAI-compatible `chat/completions` gateways.

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{extract_error_summary, ChatMessage, ChatRequest, ChatResponse};
use crate::core::chat_stream::{DeltaSink, DeltaStream};
use crate::core::error::DeliveryError;
use crate::core::message::Turn;
use crate::core::providers::{ChatProvider, ProviderConfig};
use crate::utils::auth::add_auth_headers;

/// Model used by the credential probe.
pub const PROBE_MODEL: &str = "mistralai/mistral-7b-instruct:free";

pub struct ChatCompletionsProvider {
    client: reqwest::Client,
    display_name: String,
    endpoint: String,
    identity: Vec<(&'static str, String)>,
    config: ProviderConfig,
}

impl ChatCompletionsProvider {
    pub fn new(
        client: reqwest::Client,
        display_name: String,
        endpoint: String,
        identity: Vec<(&'static str, String)>,
        config: ProviderConfig,
    ) -> Self {
        Self {
            client,
            display_name,
            endpoint,
            identity,
            config,
        }
    }

    pub fn build_request(&self, turns: &[Turn], stream: bool) -> ChatRequest {
        let params = &self.config.generation;
        ChatRequest {
            model: self.config.model.clone(),
            messages: turns.iter().map(ChatMessage::from).collect(),
            stream,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            top_p: params.top_p,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
        }
    }

    async fn execute(
        &self,
        turns: &[Turn],
        cancel: &CancellationToken,
        on_delta: Option<&DeltaSink>,
    ) -> Result<String, DeliveryError> {
        let body = self.build_request(turns, on_delta.is_some());
        let request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json");
        let request = add_auth_headers(request, &self.config.api_key, &self.identity).json(&body);

        debug!(
            provider = %self.display_name,
            model = %body.model,
            turns = body.messages.len(),
            stream = body.stream,
            "Sending chat completion request"
        );

        let response = cancellable(cancel, request.send()).await??;
        let status = response.status();
        if !status.is_success() {
            let error_text = cancellable(cancel, response.text())
                .await?
                .unwrap_or_default();
            return Err(status_error(status.as_u16(), &error_text));
        }

        match on_delta {
            Some(sink) => {
                DeltaStream::new(response.bytes_stream(), cancel.clone())
                    .collect_into(Some(sink))
                    .await
            }
            None => {
                let text = cancellable(cancel, response.text()).await??;
                parse_completion(&text)
            }
        }
    }
}

#[async_trait]
impl ChatProvider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        &self.display_name
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send_message(
        &self,
        turns: &[Turn],
        cancel: &CancellationToken,
        on_delta: Option<&DeltaSink>,
    ) -> Result<String, DeliveryError> {
        if cancel.is_cancelled() {
            return Err(DeliveryError::Cancelled);
        }
        let result = self.execute(turns, cancel, on_delta).await;
        // A failure racing with cancellation is reported as the cancellation.
        match result {
            Err(_) if cancel.is_cancelled() => Err(DeliveryError::Cancelled),
            Err(err) => {
                debug!(provider = %self.display_name, error = %err, "Chat completion failed");
                Err(err)
            }
            ok => ok,
        }
    }
}

async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, DeliveryError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DeliveryError::Cancelled),
        output = future => Ok(output),
    }
}

fn status_error(status: u16, error_text: &str) -> DeliveryError {
    let message = serde_json::from_str::<serde_json::Value>(error_text.trim())
        .ok()
        .and_then(|value| extract_error_summary(&value))
        .unwrap_or_else(|| format!("request failed with status {status}"));
    DeliveryError::api_status(message, status)
}

/// Extract the reply from a buffered completion body.
///
/// Reads `choices[0].message.content`, then `choices[0].delta.content` for
/// gateways that answer in chunk shape even when not streaming. An empty
/// reply is an invalid response.
pub fn parse_completion(text: &str) -> Result<String, DeliveryError> {
    let response: ChatResponse =
        serde_json::from_str(text).map_err(|_| DeliveryError::invalid_response())?;

    let content = response
        .message_content()
        .filter(|content| !content.is_empty())
        .or_else(|| response.delta_content().filter(|content| !content.is_empty()));
    if let Some(content) = content {
        return Ok(content.to_string());
    }
    if let Some(error) = &response.error {
        if let Some(message) = extract_error_summary(&serde_json::json!({ "error": error })) {
            return Err(DeliveryError::api(message));
        }
    }
    Err(DeliveryError::invalid_response())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Valid,
    Invalid,
}

/// Classify `api_key` with a tiny completion request.
///
/// Any transport failure, non-2xx status, or reply without
/// `choices[0].message` counts as invalid.
pub async fn probe_credential(
    client: &reqwest::Client,
    endpoint: &str,
    api_key: &str,
    identity: &[(&'static str, String)],
) -> CredentialStatus {
    if api_key.trim().is_empty() {
        return CredentialStatus::Invalid;
    }

    let payload = serde_json::json!({
        "model": PROBE_MODEL,
        "messages": [{ "role": "user", "content": "Hi" }],
        "max_tokens": 10,
        "temperature": 0.7,
        "stream": false,
    });
    let request = client
        .post(endpoint)
        .header("Content-Type", "application/json");
    let request = add_auth_headers(request, api_key, identity).json(&payload);

    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "Credential probe failed");
            return CredentialStatus::Invalid;
        }
    };
    let ok = response.status().is_success();
    match response.json::<ChatResponse>().await {
        Ok(body) if ok && body.has_message() => CredentialStatus::Valid,
        Ok(_) => CredentialStatus::Invalid,
        Err(err) => {
            warn!(error = %err, "Credential probe returned an unreadable body");
            CredentialStatus::Invalid
        }
    }
}
