use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::chat_completions::{probe_credential, CredentialStatus};
use crate::core::chat_stream::{DeltaSink, StreamMessage};
use crate::core::error::DeliveryError;
use crate::core::message::Turn;
use crate::core::providers::{build_provider, resolve_endpoint, ChatProvider, ProviderConfig};
use crate::core::retry::{with_retry, RetryConfig};

/// Front door for sending a conversation to the configured backend.
///
/// Holds at most one adapter. Reconfiguring builds a fresh adapter and
/// swaps it in whole; an in-flight exchange keeps the adapter it started
/// with.
#[derive(Clone)]
pub struct MessageDeliveryService {
    client: reqwest::Client,
    retry: RetryConfig,
    provider: Option<Arc<dyn ChatProvider>>,
}

impl MessageDeliveryService {
    pub fn new(client: reqwest::Client, retry: RetryConfig) -> Self {
        Self {
            client,
            retry,
            provider: None,
        }
    }

    /// Service around an already-built adapter.
    pub fn with_provider(provider: Arc<dyn ChatProvider>, retry: RetryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            retry,
            provider: Some(provider),
        }
    }

    /// Replace the adapter. On failure the previous adapter stays active.
    pub fn configure(&mut self, config: ProviderConfig) -> Result<(), DeliveryError> {
        let provider = build_provider(self.client.clone(), config)?;
        info!(
            provider = %provider.name(),
            model = %provider.model(),
            "Configured delivery provider"
        );
        self.provider = Some(provider);
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_deref().map(|provider| provider.name())
    }

    pub fn model(&self) -> Option<&str> {
        self.provider.as_deref().map(|provider| provider.model())
    }

    /// Send `turns` through the adapter under the retry policy.
    ///
    /// When streaming, a [`StreamMessage::Restart`] is emitted before every
    /// attempt after the first so listeners can drop partial text.
    pub async fn send_message(
        &self,
        turns: &[Turn],
        cancel: &CancellationToken,
        on_delta: Option<&DeltaSink>,
    ) -> Result<String, DeliveryError> {
        let provider = self.provider.as_deref().ok_or_else(|| {
            DeliveryError::Validation("API key is required before sending".to_string())
        })?;

        let mut attempt = 0u32;
        with_retry(&self.retry, cancel, move || {
            if attempt > 0 {
                if let Some(sink) = on_delta {
                    sink.restart();
                }
            }
            attempt += 1;
            provider.send_message(turns, cancel, on_delta)
        })
        .await
    }

    /// Probe `config`'s credential without a full generation.
    pub async fn validate_credential(&self, config: &ProviderConfig) -> CredentialStatus {
        match resolve_endpoint(config) {
            Ok((endpoint, identity)) => {
                probe_credential(&self.client, &endpoint, &config.api_key, &identity).await
            }
            Err(_) => CredentialStatus::Invalid,
        }
    }
}

/// Spawns exchanges and reports their events on one channel, tagged with
/// the exchange's stream id.
#[derive(Clone)]
pub struct ExchangeRunner {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
}

/// Everything a spawned exchange needs.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub stream_id: u64,
    pub turns: Vec<Turn>,
    pub cancel_token: CancellationToken,
    pub stream: bool,
}

impl ExchangeRunner {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Run one exchange on a background task. Exactly one `Done` or
    /// `Failed` follows any `Chunk`/`Restart` events for the stream id.
    pub fn spawn_exchange(&self, service: MessageDeliveryService, request: ExchangeRequest) {
        let sink = DeltaSink::new(self.tx.clone(), request.stream_id);
        tokio::spawn(async move {
            let ExchangeRequest {
                stream_id,
                turns,
                cancel_token,
                stream,
            } = request;

            let result = service
                .send_message(&turns, &cancel_token, stream.then_some(&sink))
                .await;

            debug!(stream_id, ok = result.is_ok(), "Exchange finished");
            sink.send(match result {
                Ok(text) => StreamMessage::Done(text),
                Err(err) => StreamMessage::Failed(err),
            });
        });
    }
}
