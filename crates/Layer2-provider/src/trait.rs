//! Provider client trait and common types

use crate::error::ProviderError;
use crate::registry::ModelInfo;
use crate::request::CompletionRequest;
use crate::response::{CompletionResponse, StreamEvent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

/// Capacity of the stream event channel
pub const STREAM_CHANNEL_CAPACITY: usize = 100;

/// Supported LLM providers
///
/// Google and Mistral are reserved slots; the factory rejects them loudly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTag {
    OpenAi,
    Anthropic,
    Mlx,
    Google,
    Mistral,
}

impl ProviderTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderTag::OpenAi => "openai",
            ProviderTag::Anthropic => "anthropic",
            ProviderTag::Mlx => "mlx",
            ProviderTag::Google => "google",
            ProviderTag::Mistral => "mistral",
        }
    }

    /// Resolve a catalog provider ID to a tag
    pub fn from_provider_id(id: &str) -> Option<Self> {
        match id {
            "openai" => Some(ProviderTag::OpenAi),
            "anthropic" => Some(ProviderTag::Anthropic),
            "mlx" => Some(ProviderTag::Mlx),
            "google" => Some(ProviderTag::Google),
            "mistral" => Some(ProviderTag::Mistral),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-provider client configuration
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// API key. May be empty for local providers.
    pub api_key: String,

    /// Override base URL (provider default when absent)
    pub base_url: Option<String>,

    /// Override HTTP timeout (provider default when absent)
    pub timeout: Option<Duration>,

    /// Informational for higher layers; clients do not retry
    pub max_retries: u32,

    /// Pricing/capability metadata attached to responses
    pub model_info: Option<ModelInfo>,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_model_info(mut self, model_info: ModelInfo) -> Self {
        self.model_info = Some(model_info);
        self
    }
}

/// LLM provider client
///
/// Implementations are safe for concurrent use; concurrent `complete` calls
/// share no per-request state.
#[async_trait]
pub trait ProviderClient: Send + Sync + std::fmt::Debug {
    /// Which provider this client talks to
    fn provider(&self) -> ProviderTag;

    /// One synchronous request/response round-trip
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Start a streaming completion
    ///
    /// Returns the bounded event channel immediately after the HTTP status
    /// check; a background task feeds it until the terminal `Done` event.
    /// Dropping the receiver cancels the stream.
    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError>;

    /// Release idle connections
    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
