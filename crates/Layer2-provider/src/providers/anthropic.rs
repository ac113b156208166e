//! Anthropic (Claude) provider client with SSE streaming

use crate::{
    error::ProviderError,
    message::{Message, Role, ToolCall},
    r#trait::{ClientConfig, ProviderClient, ProviderTag, STREAM_CHANNEL_CAPACITY},
    registry::ModelInfo,
    request::CompletionRequest,
    response::{CompletionResponse, CostMetrics, FinishReason, StreamEvent, UsageMetrics},
};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tracing::warn;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// max_tokens is mandatory on the messages API
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic Claude client
#[derive(Debug)]
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    model_info: Option<ModelInfo>,
}

impl AnthropicClient {
    /// Create a new Anthropic client
    pub fn new(config: ClientConfig) -> Result<Self, ProviderError> {
        let timeout = config
            .timeout
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ProviderError::Network {
                provider: ProviderTag::Anthropic,
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
        format!("{}/messages", self.base_url.trim_end_matches('/'))
    }

    async fn send(&self, body: &AnthropicRequest) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network {
                provider: ProviderTag::Anthropic,
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_http_status(
                ProviderTag::Anthropic,
                status,
                retry_after,
                &body,
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    fn provider(&self) -> ProviderTag {
        ProviderTag::Anthropic
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let body = build_request_body(&request, false);
        let started = Instant::now();

        let response = self.send(&body).await?;
        let api_response: AnthropicResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: ProviderTag::Anthropic,
                    message: e.to_string(),
                })?;

        Ok(build_completion_response(
            api_response,
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
        tokio::spawn(run_sse_loop(response, tx));
        Ok(rx)
    }
}

/// Read the Anthropic SSE body and translate events into canonical ones.
/// `Done` is always the last event.
async fn run_sse_loop(response: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    let byte_stream = response
        .bytes_stream()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
    let mut reader = BufReader::new(StreamReader::new(byte_stream));
    let mut line = String::new();

    let mut input_tokens = 0u32;
    let mut output_tokens = 0u32;
    let mut done = false;

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break, // EOF
            Ok(_) => {
                let line = line.trim();

                // event name lines only repeat the payload's type tag
                if line.is_empty() || line.starts_with(':') || line.starts_with("event:") {
                    continue;
                }
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };

                let event = match serde_json::from_str::<AnthropicStreamEvent>(data) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("unparseable anthropic SSE payload: {}", e);
                        let event = StreamEvent::Error(ProviderError::Parse {
                            message: format!("bad stream chunk: {}", e),
                        });
                        if tx.send(event).await.is_err() {
                            return;
                        }
                        continue;
                    }
                };

                match event {
                    AnthropicStreamEvent::MessageStart { message } => {
                        if let Some(usage) = message.usage {
                            input_tokens = usage.input_tokens;
                            let event =
                                StreamEvent::Usage(UsageMetrics::new(input_tokens, 0, 0));
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    AnthropicStreamEvent::ContentBlockStart {
                        index,
                        content_block,
                    } => {
                        if let ContentBlock::ToolUse { id, name, .. } = content_block {
                            let event = StreamEvent::ToolCallDelta {
                                index,
                                id,
                                name,
                                arguments: String::new(),
                            };
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                        ContentDelta::TextDelta { text } => {
                            if tx.send(StreamEvent::ContentDelta { text }).await.is_err() {
                                return;
                            }
                        }
                        ContentDelta::InputJsonDelta { partial_json } => {
                            let event = StreamEvent::ToolCallDelta {
                                index,
                                id: String::new(),
                                name: String::new(),
                                arguments: partial_json,
                            };
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    },
                    AnthropicStreamEvent::ContentBlockStop { .. } => {}
                    AnthropicStreamEvent::MessageDelta { delta, usage } => {
                        if let Some(usage) = usage {
                            output_tokens = usage.output_tokens;
                        }
                        if delta.and_then(|d| d.stop_reason).is_some() {
                            let usage = UsageMetrics::new(input_tokens, output_tokens, 0);
                            let _ = tx.send(StreamEvent::Usage(usage)).await;
                            let _ = tx.send(StreamEvent::Done).await;
                            done = true;
                            break;
                        }
                    }
                    AnthropicStreamEvent::MessageStop => {
                        let usage = UsageMetrics::new(input_tokens, output_tokens, 0);
                        let _ = tx.send(StreamEvent::Usage(usage)).await;
                        let _ = tx.send(StreamEvent::Done).await;
                        done = true;
                        break;
                    }
                    AnthropicStreamEvent::Ping => {}
                    AnthropicStreamEvent::Error { error } => {
                        let event = StreamEvent::Error(ProviderError::Stream {
                            provider: ProviderTag::Anthropic,
                            message: error.message,
                        });
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                let event = StreamEvent::Error(ProviderError::Stream {
                    provider: ProviderTag::Anthropic,
                    message: e.to_string(),
                });
                let _ = tx.send(event).await;
                break;
            }
        }
    }

    if !done {
        let _ = tx.send(StreamEvent::Done).await;
    }
}

/// Translate the canonical request into the Anthropic body.
/// System messages are hoisted into the top-level `system` field.
fn build_request_body(request: &CompletionRequest, stream: bool) -> AnthropicRequest {
    let system: Vec<&str> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let messages: Vec<AnthropicMessage> = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(to_wire_message)
        .collect();

    let tools: Vec<AnthropicTool> = request
        .tools
        .iter()
        .flatten()
        .map(|t| AnthropicTool {
            name: t.function.name.clone(),
            description: t.function.description.clone(),
            input_schema: t.function.parameters.clone(),
        })
        .collect();

    AnthropicRequest {
        model: request.model.clone(),
        max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        system: if system.is_empty() {
            None
        } else {
            Some(system.join("\n\n"))
        },
        messages,
        temperature: request.temperature,
        top_p: request.top_p,
        stop_sequences: request.stop.clone(),
        tools: if tools.is_empty() { None } else { Some(tools) },
        stream,
    }
}

fn to_wire_message(msg: &Message) -> AnthropicMessage {
    // tool results become user messages carrying one tool_result block
    if msg.role == Role::Tool {
        return AnthropicMessage {
            role: "user".to_string(),
            content: AnthropicContent::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                content: msg.content.clone(),
            }]),
        };
    }

    let role = match msg.role {
        Role::Assistant => "assistant",
        _ => "user",
    };

    if let Some(tool_calls) = &msg.tool_calls {
        let mut blocks: Vec<ContentBlock> = Vec::new();
        if !msg.content.is_empty() {
            blocks.push(ContentBlock::Text {
                text: msg.content.clone(),
            });
        }
        for tc in tool_calls {
            blocks.push(ContentBlock::ToolUse {
                id: tc.id.clone(),
                name: tc.name.clone(),
                input: serde_json::from_str(&tc.arguments).unwrap_or(Value::Null),
            });
        }
        return AnthropicMessage {
            role: role.to_string(),
            content: AnthropicContent::Blocks(blocks),
        };
    }

    AnthropicMessage {
        role: role.to_string(),
        content: AnthropicContent::Text(msg.content.clone()),
    }
}

/// Build the canonical response: text blocks concatenate, tool_use blocks
/// become tool calls.
fn build_completion_response(
    api: AnthropicResponse,
    model_info: Option<&ModelInfo>,
    latency_ms: u64,
) -> CompletionResponse {
    let mut content = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for block in api.content {
        match block {
            ContentBlock::Text { text } => content.push_str(&text),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall::new(id, name, input.to_string()));
            }
            ContentBlock::ToolResult { .. } => {}
        }
    }

    let usage = UsageMetrics::new(api.usage.input_tokens, api.usage.output_tokens, 0);
    let cost = model_info
        .map(|info| CostMetrics::from_usage(&usage, &info.cost))
        .unwrap_or_else(CostMetrics::zero);

    let message = Message {
        role: Role::from_wire(&api.role),
        content,
        tool_call_id: None,
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls.clone())
        },
    };

    CompletionResponse {
        id: api.id,
        model: api.model,
        provider: ProviderTag::Anthropic,
        created: Utc::now(),
        message,
        tool_calls,
        usage,
        cost,
        latency_ms,
        finish_reason: FinishReason::from_wire(api.stop_reason.as_deref().unwrap_or("")),
    }
}

// ============================================================================
// Anthropic API Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult { tool_use_id: String, content: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default = "assistant_role")]
    role: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

fn assistant_role() -> String {
    "assistant".to_string()
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

// SSE event types
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicStreamEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: MessageStartData },
    #[serde(rename = "content_block_start")]
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: usize, delta: ContentDelta },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop {
        #[allow(dead_code)]
        index: usize,
    },
    #[serde(rename = "message_delta")]
    MessageDelta {
        delta: Option<MessageDeltaData>,
        usage: Option<MessageDeltaUsage>,
    },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "error")]
    Error { error: ErrorData },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Deserialize)]
struct MessageStartData {
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaData {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaUsage {
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_result_mapping() {
        let request = CompletionRequest::new(
            "claude-sonnet-4",
            vec![
                Message::system("be brief"),
                Message::user("what's 2+2"),
                Message::assistant_with_tools(
                    "",
                    vec![ToolCall::new("t1", "calc", r#"{"a":2,"b":2}"#)],
                ),
                Message::tool_result("t1", "4"),
            ],
        );

        let body = build_request_body(&request, false);
        assert_eq!(body.system.as_deref(), Some("be brief"));
        assert_eq!(body.messages.len(), 3);

        // assistant turn carries a tool_use block
        let AnthropicContent::Blocks(blocks) = &body.messages[1].content else {
            panic!("expected block content");
        };
        match &blocks[0] {
            ContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "t1");
                assert_eq!(name, "calc");
                assert_eq!(input["a"], 2);
            }
            other => panic!("expected tool_use, got {:?}", other),
        }

        // tool result becomes a user message with a tool_result block
        assert_eq!(body.messages[2].role, "user");
        let AnthropicContent::Blocks(blocks) = &body.messages[2].content else {
            panic!("expected block content");
        };
        match &blocks[0] {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
            } => {
                assert_eq!(tool_use_id, "t1");
                assert_eq!(content, "4");
            }
            other => panic!("expected tool_result, got {:?}", other),
        }
    }

    #[test]
    fn test_max_tokens_defaulted() {
        let request = CompletionRequest::new("claude-sonnet-4", vec![Message::user("hi")]);
        let body = build_request_body(&request, false);
        assert_eq!(body.max_tokens, DEFAULT_MAX_TOKENS);

        let body = build_request_body(&request.clone().with_max_tokens(100), false);
        assert_eq!(body.max_tokens, 100);
    }

    #[test]
    fn test_request_round_trip() {
        let request = CompletionRequest::new(
            "claude-sonnet-4",
            vec![Message::system("sys"), Message::user("hello")],
        )
        .with_temperature(0.5)
        .with_top_p(0.8)
        .with_stop(vec!["END".to_string()]);

        let body = build_request_body(&request, false);
        let json = serde_json::to_string(&body).unwrap();
        let parsed: AnthropicRequest = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.model, "claude-sonnet-4");
        assert_eq!(parsed.system.as_deref(), Some("sys"));
        assert_eq!(parsed.messages.len(), 1);
        assert_eq!(parsed.temperature, Some(0.5));
        assert_eq!(parsed.top_p, Some(0.8));
        assert_eq!(
            parsed.stop_sequences.as_deref(),
            Some(&["END".to_string()][..])
        );
    }

    #[test]
    fn test_response_concatenates_text_blocks() {
        let api: AnthropicResponse = serde_json::from_value(json!({
            "id": "msg_1",
            "model": "claude-sonnet-4",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Hello"},
                {"type": "text", "text": ", world"},
                {"type": "tool_use", "id": "t1", "name": "calc", "input": {"a": 1}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 7}
        }))
        .unwrap();

        let response = build_completion_response(api, None, 9);
        assert_eq!(response.message.content, "Hello, world");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].arguments, r#"{"a":1}"#);
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.usage.total_tokens, 19);
    }

    #[test]
    fn test_stream_event_decoding() {
        let start: AnthropicStreamEvent = serde_json::from_str(
            r#"{"type":"message_start","message":{"usage":{"input_tokens":25,"output_tokens":0}}}"#,
        )
        .unwrap();
        match start {
            AnthropicStreamEvent::MessageStart { message } => {
                assert_eq!(message.usage.unwrap().input_tokens, 25);
            }
            other => panic!("expected message_start, got {:?}", other),
        }

        let delta: AnthropicStreamEvent = serde_json::from_str(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#,
        )
        .unwrap();
        assert!(matches!(
            delta,
            AnthropicStreamEvent::ContentBlockDelta {
                delta: ContentDelta::TextDelta { .. },
                ..
            }
        ));

        let stop: AnthropicStreamEvent = serde_json::from_str(
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":31}}"#,
        )
        .unwrap();
        match stop {
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                assert_eq!(delta.unwrap().stop_reason.as_deref(), Some("end_turn"));
                assert_eq!(usage.unwrap().output_tokens, 31);
            }
            other => panic!("expected message_delta, got {:?}", other),
        }
    }
}
