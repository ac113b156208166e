//! Canonical completion response and stream events

use crate::error::ProviderError;
use crate::message::{Message, ToolCall};
use crate::r#trait::ProviderTag;
use crate::registry::ModelCost;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Token usage for one completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetrics {
    /// Input tokens (prompt)
    pub input_tokens: u32,

    /// Output tokens (completion)
    pub output_tokens: u32,

    /// Total tokens. Provider-reported totals win when non-zero.
    pub total_tokens: u32,
}

impl UsageMetrics {
    /// Build usage metrics. A non-zero `reported_total` overrides the sum.
    pub fn new(input_tokens: u32, output_tokens: u32, reported_total: u32) -> Self {
        let total_tokens = if reported_total > 0 {
            reported_total
        } else {
            input_tokens + output_tokens
        };
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// Dollar cost for one completion, exact decimal arithmetic
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostMetrics {
    pub input: Decimal,
    pub output: Decimal,
    pub total: Decimal,
}

impl CostMetrics {
    pub fn zero() -> Self {
        Self::default()
    }

    /// `cost_side = tokens_side / 1_000_000 × unit_cost_side`
    pub fn from_usage(usage: &UsageMetrics, cost: &ModelCost) -> Self {
        let per_million = Decimal::from(1_000_000u32);
        let input = Decimal::from(usage.input_tokens) * cost.input / per_million;
        let output = Decimal::from(usage.output_tokens) * cost.output / per_million;
        Self {
            input,
            output,
            total: input + output,
        }
    }
}

/// Why the completion finished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
    #[default]
    Unknown,
}

impl FinishReason {
    /// Canonical wire string; `Unknown` maps to the empty string.
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::Unknown => "",
        }
    }

    /// Map a provider finish/stop reason to the nearest canonical value.
    /// Unrecognized values are logged and mapped to `Unknown`.
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "stop" | "end_turn" | "stop_sequence" => FinishReason::Stop,
            "tool_calls" | "tool_use" | "function_call" => FinishReason::ToolCalls,
            "length" | "max_tokens" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            "" => FinishReason::Unknown,
            other => {
                tracing::warn!("unrecognized finish reason '{}', passing as unknown", other);
                FinishReason::Unknown
            }
        }
    }
}

/// Canonical completion response
///
/// Either fully populated or not returned at all; callers never observe a
/// partially built response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Provider response ID
    pub id: String,

    /// Model echo from the provider
    pub model: String,

    /// Which provider produced this
    pub provider: ProviderTag,

    /// Creation time (UTC, second precision)
    pub created: DateTime<Utc>,

    /// Assistant message
    pub message: Message,

    /// Tool calls requested by the model
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Token usage
    pub usage: UsageMetrics,

    /// Dollar cost (zero without attached model pricing)
    pub cost: CostMetrics,

    /// Wall-clock latency in milliseconds
    pub latency_ms: u64,

    /// Finish reason
    pub finish_reason: FinishReason,
}

/// Events emitted during streaming
///
/// Delivered strictly in arrival order; `Done` is always the final event,
/// even after an error.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Text content delta
    ContentDelta { text: String },

    /// Tool call delta, accumulated by the caller per `index`
    ToolCallDelta {
        index: usize,
        id: String,
        name: String,
        arguments: String,
    },

    /// Token usage update
    Usage(UsageMetrics),

    /// Stream completed
    Done,

    /// Error occurred (stream continues unless followed by `Done`)
    Error(ProviderError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_usage_total_is_sum() {
        let usage = UsageMetrics::new(10, 5, 0);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn test_usage_reported_total_wins() {
        let usage = UsageMetrics::new(10, 5, 17);
        assert_eq!(usage.total_tokens, 17);
    }

    #[test]
    fn test_cost_law_exact() {
        let cost = ModelCost {
            input: Decimal::new(250, 2),  // 2.50 per 1M
            output: Decimal::new(1000, 2), // 10.00 per 1M
            ..Default::default()
        };
        let usage = UsageMetrics::new(1_000_000, 500_000, 0);
        let metrics = CostMetrics::from_usage(&usage, &cost);

        assert_eq!(metrics.input, Decimal::new(250, 2));
        assert_eq!(metrics.output, Decimal::new(500, 2));
        assert_eq!(metrics.total, Decimal::new(750, 2));
    }

    #[test]
    fn test_cost_small_usage_no_float_drift() {
        let cost = ModelCost {
            input: Decimal::new(3, 0),
            output: Decimal::new(15, 0),
            ..Default::default()
        };
        let usage = UsageMetrics::new(10, 5, 0);
        let metrics = CostMetrics::from_usage(&usage, &cost);

        // 10 / 1M * 3 = 0.00003, 5 / 1M * 15 = 0.000075
        assert_eq!(metrics.input, Decimal::from_str_exact("0.00003").unwrap());
        assert_eq!(metrics.output, Decimal::from_str_exact("0.000075").unwrap());
        assert_eq!(metrics.total, Decimal::from_str_exact("0.000105").unwrap());
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(FinishReason::from_wire("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::from_wire("end_turn"), FinishReason::Stop);
        assert_eq!(FinishReason::from_wire("tool_use"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::from_wire("max_tokens"), FinishReason::Length);
        assert_eq!(FinishReason::from_wire("banana"), FinishReason::Unknown);
        assert_eq!(FinishReason::Unknown.as_str(), "");
    }
}
