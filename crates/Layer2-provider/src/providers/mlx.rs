//! MLX local inference client (OpenAI-compatible API)
//!
//! Talks to an mlx-lm server on the local loopback. Authorization is
//! optional and the timeout is generous because local inference is slow.

use crate::{
    error::ProviderError,
    r#trait::{ClientConfig, ProviderClient, ProviderTag, STREAM_CHANNEL_CAPACITY},
    registry::ModelInfo,
    request::CompletionRequest,
    response::{CompletionResponse, StreamEvent},
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::openai::{
    build_completion_response, build_request_body, run_sse_loop, OpenAiRequest, OpenAiResponse,
};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// MLX local server client
#[derive(Debug)]
pub struct MlxClient {
    client: Client,
    api_key: String,
    base_url: String,
    model_info: Option<ModelInfo>,
}

impl MlxClient {
    /// Create a new MLX client
    pub fn new(config: ClientConfig) -> Result<Self, ProviderError> {
        let timeout = config
            .timeout
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ProviderError::Network {
                provider: ProviderTag::Mlx,
                message: format!("failed to build HTTP client: {}", e),
            }
        })?;

        Ok(Self {
            client,
            api_key: config.api_key,
            base_url: config
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model_info: config.model_info,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn send(&self, body: &OpenAiRequest) -> Result<reqwest::Response, ProviderError> {
        let mut builder = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json");

        // local servers usually run without auth
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = builder
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network {
                provider: ProviderTag::Mlx,
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_http_status(
                ProviderTag::Mlx,
                status,
                None,
                &body,
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl ProviderClient for MlxClient {
    fn provider(&self) -> ProviderTag {
        ProviderTag::Mlx
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let body = build_request_body(&request, false);
        let started = Instant::now();

        let response = self.send(&body).await?;
        let api_response: OpenAiResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: ProviderTag::Mlx,
                    message: e.to_string(),
                })?;

        Ok(build_completion_response(
            api_response,
            ProviderTag::Mlx,
            self.model_info.as_ref(),
            started.elapsed().as_millis() as u64,
        ))
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError> {
        let body = build_request_body(&request, true);
        let response = self.send(&body).await?;

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(run_sse_loop(response, tx, ProviderTag::Mlx));
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn test_defaults_to_loopback() {
        let client = MlxClient::new(ClientConfig::default()).unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:8080/v1/chat/completions");
        assert_eq!(client.provider(), ProviderTag::Mlx);
    }

    #[test]
    fn test_base_url_override() {
        let client = MlxClient::new(
            ClientConfig::new("").with_base_url("http://127.0.0.1:9191/v1/"),
        )
        .unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:9191/v1/chat/completions");
    }

    #[test]
    fn test_body_matches_openai_shape() {
        let request = CompletionRequest::new("qwen2.5-7b", vec![Message::user("hi")]);
        let body = build_request_body(&request, false);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "qwen2.5-7b");
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
