//! Mock provider client for deterministic testing
//!
//! Returns pre-configured responses without making any HTTP calls.

use crate::{
    error::ProviderError,
    message::{Message, Role, ToolCall},
    r#trait::{ProviderClient, ProviderTag, STREAM_CHANNEL_CAPACITY},
    request::CompletionRequest,
    response::{CompletionResponse, CostMetrics, FinishReason, StreamEvent, UsageMetrics},
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A pre-configured response from the mock client
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: UsageMetrics,
    /// If set, the client returns this error instead
    pub error: Option<ProviderError>,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            content: String::new(),
            tool_calls: vec![],
            finish_reason: FinishReason::Stop,
            usage: UsageMetrics::new(100, 50, 0),
            error: None,
        }
    }
}

impl MockResponse {
    /// Create a text response
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            ..Default::default()
        }
    }

    /// Create an error response
    pub fn error(error: ProviderError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }
}

/// A mock client that replays queued responses and stream scripts.
///
/// Requests are captured for assertions.
#[derive(Debug)]
pub struct MockClient {
    provider: ProviderTag,
    responses: Arc<Mutex<Vec<MockResponse>>>,
    scripts: Arc<Mutex<Vec<Vec<StreamEvent>>>>,
    /// Track all requests received (for assertions in tests)
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockClient {
    pub fn new(provider: ProviderTag) -> Self {
        Self {
            provider,
            responses: Arc::new(Mutex::new(vec![])),
            scripts: Arc::new(Mutex::new(vec![])),
            requests: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Queue a simple text response
    pub fn with_response(self, content: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push(MockResponse::text(content));
        self
    }

    /// Queue a tool call response
    pub fn with_tool_call(self, name: &str, arguments: &str) -> Self {
        self.responses.lock().unwrap().push(MockResponse {
            tool_calls: vec![ToolCall::new(
                format!("call_{}", uuid::Uuid::new_v4()),
                name,
                arguments,
            )],
            finish_reason: FinishReason::ToolCalls,
            ..Default::default()
        });
        self
    }

    /// Queue an error
    pub fn with_error(self, error: ProviderError) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push(MockResponse::error(error));
        self
    }

    /// Queue a fully custom response
    pub fn with_mock_response(self, response: MockResponse) -> Self {
        self.responses.lock().unwrap().push(response);
        self
    }

    /// Queue a stream script replayed by the next `stream` call
    pub fn with_stream_script(self, events: Vec<StreamEvent>) -> Self {
        self.scripts.lock().unwrap().push(events);
        self
    }

    /// Number of requests seen so far
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_response(&self) -> MockResponse {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            MockResponse::default()
        } else {
            responses.remove(0)
        }
    }
}

#[async_trait]
impl ProviderClient for MockClient {
    fn provider(&self) -> ProviderTag {
        self.provider
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());

        let mock = self.next_response();
        if let Some(error) = mock.error {
            return Err(error);
        }

        let message = Message {
            role: Role::Assistant,
            content: mock.content,
            tool_call_id: None,
            tool_calls: if mock.tool_calls.is_empty() {
                None
            } else {
                Some(mock.tool_calls.clone())
            },
        };

        Ok(CompletionResponse {
            id: format!("mock_{}", uuid::Uuid::new_v4()),
            model: request.model,
            provider: self.provider,
            created: Utc::now(),
            message,
            tool_calls: mock.tool_calls,
            usage: mock.usage,
            cost: CostMetrics::zero(),
            latency_ms: 1,
            finish_reason: mock.finish_reason,
        })
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, ProviderError> {
        self.requests.lock().unwrap().push(request);

        let events = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                vec![StreamEvent::Done]
            } else {
                scripts.remove(0)
            }
        };

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}
