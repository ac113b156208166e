//! # trademind-provider
//!
//! LLM provider abstraction layer for TradeMind.
//! Unifies heterogeneous chat APIs behind one request/response contract.
//!
//! ## Features
//! - SSE streaming with a bounded event channel
//! - Canonical request/response types with decimal cost accounting
//! - Two-tier cached model registry (in-process + external KV)
//! - Tool/function calling and structured output support

pub mod conversation;
pub mod error;
pub mod factory;
pub mod message;
pub mod providers;
pub mod registry;
pub mod request;
pub mod response;
pub mod structured;
pub mod tool_def;
pub mod r#trait;

// Core traits and types
pub use message::{Message, Role, ToolCall};
pub use r#trait::{ClientConfig, ProviderClient, ProviderTag, STREAM_CHANNEL_CAPACITY};
pub use request::{CompletionRequest, ResponseFormat};
pub use response::{CompletionResponse, CostMetrics, FinishReason, StreamEvent, UsageMetrics};
pub use tool_def::{FunctionDefinition, Skill, SkillParameter, ToolDefinition};

// Error
pub use error::ProviderError;

// Factory and registry
pub use factory::ClientFactory;
pub use registry::{
    Capabilities, LatencyClass, ModelCost, ModelInfo, ModelLimits, ModelRegistry, ProviderEntry,
    RegistryService, RoutingPreference,
};

// Helpers
pub use conversation::{build_conversation_history, estimate_tokens, ConversationBuilder};
pub use structured::{
    build_json_response_format, build_tool_definitions, parse_structured_output,
    parse_tool_call_arguments,
};

// Provider implementations
pub use providers::anthropic::AnthropicClient;
pub use providers::mlx::MlxClient;
pub use providers::mock::{MockClient, MockResponse};
pub use providers::openai::OpenAiClient;
