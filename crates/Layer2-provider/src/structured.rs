//! Structured output helpers
//!
//! Skill catalog → tool definitions, JSON response-format construction, and
//! typed decoding of responses and tool-call arguments.

use crate::error::ProviderError;
use crate::message::ToolCall;
use crate::request::ResponseFormat;
use crate::response::CompletionResponse;
use crate::tool_def::{Skill, ToolDefinition};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Convert a skill catalog into provider-agnostic tool definitions
pub fn build_tool_definitions(skills: &[Skill]) -> Vec<ToolDefinition> {
    skills
        .iter()
        .map(|skill| {
            ToolDefinition::function(
                skill.id.clone(),
                skill.description.clone(),
                skill.parameters_schema(),
            )
        })
        .collect()
}

/// Build a JSON response format.
///
/// Without a schema this is a plain `json_object` constraint; with one it is
/// a strict `json_schema` named "response".
pub fn build_json_response_format(schema: Option<Value>) -> ResponseFormat {
    match schema {
        Some(schema) => ResponseFormat::JsonSchema {
            name: "response".to_string(),
            strict: true,
            schema,
        },
        None => ResponseFormat::JsonObject,
    }
}

/// Decode a completion's content as a typed value
pub fn parse_structured_output<T: DeserializeOwned>(
    response: &CompletionResponse,
) -> Result<T, ProviderError> {
    let content = response.message.content.trim();
    if content.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    serde_json::from_str(content).map_err(|e| ProviderError::Parse {
        message: format!("structured output did not match schema: {}", e),
    })
}

/// Decode a tool call's arguments as a typed value
pub fn parse_tool_call_arguments<T: DeserializeOwned>(
    tool_call: &ToolCall,
) -> Result<T, ProviderError> {
    if tool_call.arguments.trim().is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    serde_json::from_str(&tool_call.arguments).map_err(|e| ProviderError::Parse {
        message: format!(
            "tool call '{}' arguments did not decode: {}",
            tool_call.name, e
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::r#trait::ProviderTag;
    use crate::response::{CostMetrics, FinishReason, UsageMetrics};
    use crate::tool_def::SkillParameter;
    use serde::Deserialize;
    use serde_json::json;

    fn response_with_content(content: &str) -> CompletionResponse {
        CompletionResponse {
            id: "resp_1".to_string(),
            model: "gpt-4o".to_string(),
            provider: ProviderTag::OpenAi,
            created: chrono::Utc::now(),
            message: Message::assistant(content),
            tool_calls: vec![],
            usage: UsageMetrics::default(),
            cost: CostMetrics::zero(),
            latency_ms: 1,
            finish_reason: FinishReason::Stop,
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Order {
        symbol: String,
        qty: f64,
    }

    #[test]
    fn test_build_tool_definitions() {
        let skills = vec![
            Skill::new("fetch_ticker", "Fetch ticker")
                .with_param("symbol", SkillParameter::string("Pair", true)),
            Skill::new("order_book", "Fetch order book"),
        ];
        let tools = build_tool_definitions(&skills);
        assert_eq!(tools.len(), 2);
        assert!(tools.iter().all(|t| t.kind == "function"));
        assert_eq!(tools[0].name(), "fetch_ticker");
        assert_eq!(
            tools[0].function.parameters["required"],
            json!(["symbol"])
        );
    }

    #[test]
    fn test_response_format_without_schema() {
        assert!(matches!(
            build_json_response_format(None),
            ResponseFormat::JsonObject
        ));
    }

    #[test]
    fn test_response_format_with_schema() {
        let format = build_json_response_format(Some(json!({"type": "object"})));
        match format {
            ResponseFormat::JsonSchema { name, strict, .. } => {
                assert_eq!(name, "response");
                assert!(strict);
            }
            other => panic!("expected JsonSchema, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_structured_output() {
        let response = response_with_content(r#"{"symbol":"BTCUSDT","qty":0.5}"#);
        let order: Order = parse_structured_output(&response).unwrap();
        assert_eq!(
            order,
            Order {
                symbol: "BTCUSDT".to_string(),
                qty: 0.5
            }
        );
    }

    #[test]
    fn test_parse_empty_response() {
        let response = response_with_content("   ");
        let err = parse_structured_output::<Order>(&response).unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse));
    }

    #[test]
    fn test_parse_tool_call_arguments() {
        let call = ToolCall::new("t1", "place_order", r#"{"symbol":"ETHUSDT","qty":2.0}"#);
        let order: Order = parse_tool_call_arguments(&call).unwrap();
        assert_eq!(order.symbol, "ETHUSDT");
    }

    #[test]
    fn test_parse_bad_arguments() {
        let call = ToolCall::new("t1", "place_order", "{not json");
        let err = parse_tool_call_arguments::<Order>(&call).unwrap_err();
        match err {
            ProviderError::Parse { message } => assert!(message.contains("place_order")),
            other => panic!("expected Parse, got {:?}", other),
        }
    }
}
