//! OpenAI provider client with SSE streaming support

use crate::{
    error::ProviderError,
    message::{Message, Role, ToolCall},
    r#trait::{ClientConfig, ProviderClient, ProviderTag, STREAM_CHANNEL_CAPACITY},
    registry::ModelInfo,
    request::{CompletionRequest, ResponseFormat},
    response::{CompletionResponse, CostMetrics, FinishReason, StreamEvent, UsageMetrics},
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tracing::warn;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// OpenAI chat-completions client
#[derive(Debug)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model_info: Option<ModelInfo>,
}

impl OpenAiClient {
    /// Create a new OpenAI client
    pub fn new(config: ClientConfig) -> Result<Self, ProviderError> {
        let timeout = config
            .timeout
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ProviderError::Network {
                provider: ProviderTag::OpenAi,
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

    /// Send the request body and map non-2xx statuses to the error taxonomy
    async fn send(&self, body: &OpenAiRequest) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network {
                provider: ProviderTag::OpenAi,
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_http_status(
                ProviderTag::OpenAi,
                status,
                retry_after,
                &body,
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    fn provider(&self) -> ProviderTag {
        ProviderTag::OpenAi
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
                    provider: ProviderTag::OpenAi,
                    message: e.to_string(),
                })?;

        Ok(build_completion_response(
            api_response,
            ProviderTag::OpenAi,
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
        tokio::spawn(run_sse_loop(response, tx, ProviderTag::OpenAi));
        Ok(rx)
    }
}

/// Read the SSE body and translate chunks into canonical events.
/// `Done` is always the last event; a dropped receiver ends the loop.
pub(crate) async fn run_sse_loop(
    response: reqwest::Response,
    tx: mpsc::Sender<StreamEvent>,
    provider: ProviderTag,
) {
    let byte_stream = response
        .bytes_stream()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
    let mut reader = BufReader::new(StreamReader::new(byte_stream));
    let mut line = String::new();
    let mut done = false;

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break, // EOF
            Ok(_) => {
                let line = line.trim();

                // Skip blank lines, comments, and event name lines
                if line.is_empty() || line.starts_with(':') || line.starts_with("event:") {
                    continue;
                }
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };

                if data == "[DONE]" {
                    let _ = tx.send(StreamEvent::Done).await;
                    done = true;
                    break;
                }

                match serde_json::from_str::<OpenAiStreamChunk>(data) {
                    Ok(chunk) => {
                        if process_chunk(chunk, &tx).await == ChunkOutcome::Finished {
                            done = true;
                            break;
                        }
                        if tx.is_closed() {
                            return; // consumer gone
                        }
                    }
                    Err(e) => {
                        // a single bad chunk does not abort the stream
                        warn!("unparseable SSE chunk from {}: {}", provider, e);
                        let event = StreamEvent::Error(ProviderError::Parse {
                            message: format!("bad stream chunk: {}", e),
                        });
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                let event = StreamEvent::Error(ProviderError::Stream {
                    provider,
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

#[derive(PartialEq)]
pub(crate) enum ChunkOutcome {
    Continue,
    Finished,
}

/// Map one parsed chunk to canonical events
pub(crate) async fn process_chunk(
    chunk: OpenAiStreamChunk,
    tx: &mpsc::Sender<StreamEvent>,
) -> ChunkOutcome {
    if let Some(usage) = chunk.usage {
        let event = StreamEvent::Usage(UsageMetrics::new(
            usage.prompt_tokens,
            usage.completion_tokens,
            usage.total_tokens,
        ));
        if tx.send(event).await.is_err() {
            return ChunkOutcome::Finished;
        }
    }

    let mut finished = false;
    for choice in chunk.choices {
        if let Some(content) = choice.delta.content {
            if !content.is_empty()
                && tx
                    .send(StreamEvent::ContentDelta { text: content })
                    .await
                    .is_err()
            {
                return ChunkOutcome::Finished;
            }
        }

        if let Some(tool_calls) = choice.delta.tool_calls {
            for tc in tool_calls {
                let event = StreamEvent::ToolCallDelta {
                    index: tc.index,
                    id: tc.id.unwrap_or_default(),
                    name: tc.function.as_ref().and_then(|f| f.name.clone()).unwrap_or_default(),
                    arguments: tc
                        .function
                        .and_then(|f| f.arguments)
                        .unwrap_or_default(),
                };
                if tx.send(event).await.is_err() {
                    return ChunkOutcome::Finished;
                }
            }
        }

        if let Some(reason) = choice.finish_reason {
            if reason == "stop" || reason == "tool_calls" {
                finished = true;
            }
        }
    }

    if finished {
        let _ = tx.send(StreamEvent::Done).await;
        ChunkOutcome::Finished
    } else {
        ChunkOutcome::Continue
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Translate the canonical request into the OpenAI body
pub(crate) fn build_request_body(request: &CompletionRequest, stream: bool) -> OpenAiRequest {
    OpenAiRequest {
        model: request.model.clone(),
        messages: request.messages.iter().map(to_wire_message).collect(),
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        top_p: request.top_p,
        stop: request.stop.clone(),
        tools: request.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|t| OpenAiTool {
                    kind: "function".to_string(),
                    function: OpenAiFunction {
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        parameters: t.function.parameters.clone(),
                    },
                })
                .collect()
        }),
        response_format: request.response_format.as_ref().map(to_wire_format),
        stream,
        stream_options: if stream {
            Some(StreamOptions {
                include_usage: true,
            })
        } else {
            None
        },
    }
}

fn to_wire_message(msg: &Message) -> OpenAiMessage {
    if msg.role == Role::Tool {
        return OpenAiMessage {
            role: "tool".to_string(),
            content: Some(msg.content.clone()),
            tool_calls: None,
            tool_call_id: msg.tool_call_id.clone(),
        };
    }

    let tool_calls = msg.tool_calls.as_ref().map(|calls| {
        calls
            .iter()
            .map(|tc| OpenAiToolCall {
                id: tc.id.clone(),
                kind: "function".to_string(),
                function: OpenAiFunctionCall {
                    name: tc.name.clone(),
                    arguments: tc.arguments.clone(),
                },
            })
            .collect()
    });

    // content may be absent when tool calls are present
    let content = if msg.content.is_empty() && msg.has_tool_calls() {
        None
    } else {
        Some(msg.content.clone())
    };

    OpenAiMessage {
        role: msg.role.as_str().to_string(),
        content,
        tool_calls,
        tool_call_id: None,
    }
}

fn to_wire_format(format: &ResponseFormat) -> OpenAiResponseFormat {
    match format {
        ResponseFormat::Text => OpenAiResponseFormat::Text,
        ResponseFormat::JsonObject => OpenAiResponseFormat::JsonObject,
        ResponseFormat::JsonSchema {
            name,
            strict,
            schema,
        } => OpenAiResponseFormat::JsonSchema {
            json_schema: OpenAiJsonSchema {
                name: name.clone(),
                strict: *strict,
                schema: schema.clone(),
            },
        },
    }
}

/// Build the canonical response from an OpenAI-shaped body
pub(crate) fn build_completion_response(
    api: OpenAiResponse,
    provider: ProviderTag,
    model_info: Option<&ModelInfo>,
    latency_ms: u64,
) -> CompletionResponse {
    let created = Utc
        .timestamp_opt(api.created, 0)
        .single()
        .unwrap_or_else(Utc::now);

    let usage = UsageMetrics::new(
        api.usage.prompt_tokens,
        api.usage.completion_tokens,
        api.usage.total_tokens,
    );
    let cost = model_info
        .map(|info| CostMetrics::from_usage(&usage, &info.cost))
        .unwrap_or_else(CostMetrics::zero);

    let Some(choice) = api.choices.into_iter().next() else {
        // empty choices still carry usage
        return CompletionResponse {
            id: api.id,
            model: api.model,
            provider,
            created,
            message: Message::assistant(""),
            tool_calls: vec![],
            usage,
            cost,
            latency_ms,
            finish_reason: FinishReason::Unknown,
        };
    };

    // null content with tool calls is normal; treat as empty string
    let content = choice.message.content.unwrap_or_default();
    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall::new(tc.id, tc.function.name, tc.function.arguments))
        .collect();

    let message = Message {
        role: Role::from_wire(&choice.message.role),
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
        provider,
        created,
        message,
        tool_calls,
        usage,
        cost,
        latency_ms,
        finish_reason: FinishReason::from_wire(choice.finish_reason.as_deref().unwrap_or("")),
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAiTool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<OpenAiResponseFormat>,
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StreamOptions {
    pub include_usage: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct OpenAiMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct OpenAiToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct OpenAiFunctionCall {
    pub name: String,
    /// Arguments arrive as a JSON-encoded string
    pub arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct OpenAiTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: OpenAiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct OpenAiFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub(crate) enum OpenAiResponseFormat {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "json_object")]
    JsonObject,
    #[serde(rename = "json_schema")]
    JsonSchema { json_schema: OpenAiJsonSchema },
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct OpenAiJsonSchema {
    pub name: String,
    pub strict: bool,
    pub schema: Value,
}

// Response types
#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub choices: Vec<OpenAiChoice>,
    #[serde(default)]
    pub usage: OpenAiUsage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiChoice {
    pub message: OpenAiMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OpenAiUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

// Streaming types
#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiStreamChunk {
    #[serde(default)]
    pub choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiStreamChoice {
    pub delta: OpenAiDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OpenAiDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiStreamToolCall {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<OpenAiStreamFunction>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiStreamFunction {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_def::ToolDefinition;
    use serde_json::json;

    fn sample_request() -> CompletionRequest {
        CompletionRequest::new(
            "gpt-4o",
            vec![
                Message::system("be brief"),
                Message::user("what's 2+2"),
                Message::assistant_with_tools(
                    "",
                    vec![ToolCall::new("t1", "calc", r#"{"a":2,"b":2}"#)],
                ),
                Message::tool_result("t1", "4"),
            ],
        )
        .with_tools(vec![ToolDefinition::function(
            "calc",
            "adds numbers",
            json!({"type": "object", "properties": {}, "required": []}),
        )])
        .with_temperature(0.3)
        .with_top_p(0.9)
        .with_max_tokens(512)
        .with_stop(vec!["###".to_string()])
    }

    #[test]
    fn test_request_round_trip() {
        let request = sample_request();
        let body = build_request_body(&request, false);
        let json = serde_json::to_string(&body).unwrap();
        let parsed: OpenAiRequest = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.model, "gpt-4o");
        assert_eq!(parsed.messages.len(), 4);
        assert_eq!(parsed.messages[0].role, "system");
        assert_eq!(parsed.messages[1].content.as_deref(), Some("what's 2+2"));
        assert_eq!(parsed.messages[3].role, "tool");
        assert_eq!(parsed.messages[3].tool_call_id.as_deref(), Some("t1"));
        assert_eq!(parsed.temperature, Some(0.3));
        assert_eq!(parsed.top_p, Some(0.9));
        assert_eq!(parsed.max_tokens, Some(512));
        assert_eq!(parsed.stop.as_deref(), Some(&["###".to_string()][..]));
        assert_eq!(parsed.tools.as_ref().unwrap()[0].function.name, "calc");
        assert!(!parsed.stream);
    }

    #[test]
    fn test_assistant_tool_call_content_omitted() {
        let request = sample_request();
        let body = build_request_body(&request, false);
        // empty content with tool calls serializes as absent
        assert!(body.messages[2].content.is_none());
        assert_eq!(
            body.messages[2].tool_calls.as_ref().unwrap()[0].function.name,
            "calc"
        );
    }

    #[test]
    fn test_stream_body_includes_usage_option() {
        let body = build_request_body(&sample_request(), true);
        assert!(body.stream);
        assert!(body.stream_options.as_ref().unwrap().include_usage);
    }

    #[test]
    fn test_response_null_content_tolerated() {
        let raw = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "created": 1735689600,
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "calc", "arguments": "{\"a\":2}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let api: OpenAiResponse = serde_json::from_value(raw).unwrap();
        let response = build_completion_response(api, ProviderTag::OpenAi, None, 12);

        assert_eq!(response.message.content, "");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "calc");
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.usage.total_tokens, 15);
        assert_eq!(response.created.timestamp(), 1735689600);
    }

    #[test]
    fn test_empty_choices_keeps_usage() {
        let raw = json!({
            "id": "chatcmpl-2",
            "model": "gpt-4o",
            "created": 0,
            "choices": [],
            "usage": {"prompt_tokens": 7, "completion_tokens": 0, "total_tokens": 0}
        });
        let api: OpenAiResponse = serde_json::from_value(raw).unwrap();
        let response = build_completion_response(api, ProviderTag::OpenAi, None, 3);

        assert_eq!(response.message.content, "");
        assert_eq!(response.usage.input_tokens, 7);
        assert_eq!(response.usage.total_tokens, 7);
    }

    #[tokio::test]
    async fn test_chunk_tool_call_indexing() {
        let (tx, mut rx) = mpsc::channel(16);
        let chunk: OpenAiStreamChunk = serde_json::from_value(json!({
            "choices": [{
                "delta": {
                    "tool_calls": [
                        {"index": 0, "id": "a", "function": {"name": "calc", "arguments": "{\"a\""}},
                        {"index": 1, "id": "b", "function": {"name": "lookup", "arguments": "{"}}
                    ]
                },
                "finish_reason": null
            }]
        }))
        .unwrap();

        let outcome = process_chunk(chunk, &tx).await;
        assert!(outcome == ChunkOutcome::Continue);
        drop(tx);

        let first = rx.recv().await.unwrap();
        match first {
            StreamEvent::ToolCallDelta { index, id, .. } => {
                assert_eq!(index, 0);
                assert_eq!(id, "a");
            }
            other => panic!("expected ToolCallDelta, got {:?}", other),
        }
        let second = rx.recv().await.unwrap();
        match second {
            StreamEvent::ToolCallDelta { index, name, .. } => {
                assert_eq!(index, 1);
                assert_eq!(name, "lookup");
            }
            other => panic!("expected ToolCallDelta, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chunk_finish_emits_done() {
        let (tx, mut rx) = mpsc::channel(16);
        let chunk: OpenAiStreamChunk = serde_json::from_value(json!({
            "choices": [{"delta": {"content": "C"}, "finish_reason": "stop"}]
        }))
        .unwrap();

        let outcome = process_chunk(chunk, &tx).await;
        assert!(outcome == ChunkOutcome::Finished);
        drop(tx);

        assert!(matches!(
            rx.recv().await.unwrap(),
            StreamEvent::ContentDelta { .. }
        ));
        assert!(matches!(rx.recv().await.unwrap(), StreamEvent::Done));
        assert!(rx.recv().await.is_none());
    }
}
