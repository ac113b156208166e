//! Provider-specific error types
//!
//! HTTP 상태를 스펙 분류로 매핑하고 trademind_foundation::Error 변환을 지원합니다.

use crate::r#trait::ProviderTag;
use std::time::Duration;
use thiserror::Error;
use trademind_foundation::Error as FoundationError;

/// Default retry-after when a 429 carries no header
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Errors that can occur during provider operations
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// No configuration registered for this provider
    #[error("Provider not configured: {provider}")]
    NotConfigured { provider: ProviderTag },

    /// Provider slot exists but has no client implementation
    #[error("Provider not supported: {provider}")]
    Unsupported { provider: ProviderTag },

    /// Rate limit exceeded (429)
    #[error("Rate limited by {provider}, retry after {retry_after:?}")]
    RateLimited {
        provider: ProviderTag,
        retry_after: Duration,
    },

    /// Request exceeded the model context window
    #[error("Context length exceeded on {provider}: max {max_tokens}, input {input_tokens}")]
    ContextLengthExceeded {
        provider: ProviderTag,
        max_tokens: u32,
        input_tokens: u32,
    },

    /// Content was filtered by provider policy
    #[error("Content filtered by {provider}: {reason}")]
    ContentFiltered {
        provider: ProviderTag,
        reason: String,
        category: String,
    },

    /// Any other non-2xx API response
    #[error("API error from {provider} (status {status}): {message}")]
    Api {
        provider: ProviderTag,
        status: u16,
        message: String,
        error_type: String,
        code: String,
    },

    /// Connection/send/read failure
    #[error("Network error on {provider}: {message}")]
    Network {
        provider: ProviderTag,
        message: String,
    },

    /// Response body did not decode
    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse {
        provider: ProviderTag,
        message: String,
    },

    /// Streaming transport failure
    #[error("Stream error on {provider}: {message}")]
    Stream {
        provider: ProviderTag,
        message: String,
    },

    /// Model not present in the registry
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Registry fetch/decode failure
    #[error("Registry error: {0}")]
    Registry(String),

    /// Structured output requested but the response had no content
    #[error("Empty response")]
    EmptyResponse,

    /// JSON decoding error
    #[error("Parse error: {message}")]
    Parse { message: String },
}

impl ProviderError {
    /// Map an HTTP error response to the canonical taxonomy.
    ///
    /// `retry_after` comes from the `Retry-After` header when present.
    pub fn from_http_status(
        provider: ProviderTag,
        status: u16,
        retry_after: Option<Duration>,
        body: &str,
    ) -> Self {
        let detail = ErrorDetail::from_body(body);

        match status {
            429 => ProviderError::RateLimited {
                provider,
                retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
            },
            400 if detail.indicates_context_overflow() => {
                let (max_tokens, input_tokens) = extract_context_limits(&detail.message);
                ProviderError::ContextLengthExceeded {
                    provider,
                    max_tokens,
                    input_tokens,
                }
            }
            403 if detail.error_type == "content_filter" => ProviderError::ContentFiltered {
                provider,
                reason: detail.message,
                category: detail.code,
            },
            _ => ProviderError::Api {
                provider,
                status,
                message: detail.message,
                error_type: detail.error_type,
                code: detail.code,
            },
        }
    }

    /// Whether a higher layer may reasonably retry
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. }
            | ProviderError::Network { .. }
            | ProviderError::Stream { .. } => true,
            ProviderError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Provider tag carried by API-level variants
    pub fn provider(&self) -> Option<ProviderTag> {
        match self {
            ProviderError::NotConfigured { provider }
            | ProviderError::Unsupported { provider }
            | ProviderError::RateLimited { provider, .. }
            | ProviderError::ContextLengthExceeded { provider, .. }
            | ProviderError::ContentFiltered { provider, .. }
            | ProviderError::Api { provider, .. }
            | ProviderError::Network { provider, .. }
            | ProviderError::InvalidResponse { provider, .. }
            | ProviderError::Stream { provider, .. } => Some(*provider),
            _ => None,
        }
    }
}

/// Error fields extracted from a provider error body.
///
/// Tolerates both the OpenAI shape `{"error": {"message", "type", "code"}}`
/// and the Anthropic shape `{"type": "error", "error": {"type", "message"}}`.
#[derive(Debug, Default)]
struct ErrorDetail {
    message: String,
    error_type: String,
    code: String,
}

impl ErrorDetail {
    fn from_body(body: &str) -> Self {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
            return Self {
                message: body.to_string(),
                ..Default::default()
            };
        };

        let error = value.get("error").unwrap_or(&value);
        let field = |name: &str| {
            error
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        let message = {
            let m = field("message");
            if m.is_empty() {
                body.to_string()
            } else {
                m
            }
        };

        Self {
            message,
            error_type: field("type"),
            code: field("code"),
        }
    }

    fn indicates_context_overflow(&self) -> bool {
        self.code == "context_length_exceeded"
            || self.error_type.contains("context")
            || self.message.contains("context length")
            || self.message.contains("maximum context")
    }
}

/// Pull `(max, input)` token counts out of a context-overflow message.
/// Provider messages read like "maximum context length is 8192 tokens,
/// however you requested 10000 tokens"; missing numbers stay 0.
fn extract_context_limits(message: &str) -> (u32, u32) {
    let mut numbers = Vec::new();
    let mut current = String::new();
    for c in message.chars() {
        if c.is_ascii_digit() {
            current.push(c);
        } else if !current.is_empty() {
            if let Ok(n) = current.parse::<u32>() {
                numbers.push(n);
            }
            current.clear();
        }
    }
    if let Ok(n) = current.parse::<u32>() {
        numbers.push(n);
    }

    match numbers.as_slice() {
        [max, input, ..] => (*max, *input),
        [max] => (*max, 0),
        [] => (0, 0),
    }
}

// ============================================================================
// trademind_foundation::Error 변환
// ============================================================================

impl From<ProviderError> for FoundationError {
    fn from(err: ProviderError) -> Self {
        match &err {
            ProviderError::NotConfigured { provider } => {
                FoundationError::ProviderNotFound(provider.to_string())
            }
            ProviderError::Unsupported { provider } => {
                FoundationError::ProviderNotFound(provider.to_string())
            }
            ProviderError::RateLimited { .. } => FoundationError::RateLimited(err.to_string()),
            ProviderError::ModelNotFound(model) => FoundationError::ModelNotFound(model.clone()),
            ProviderError::Registry(msg) => FoundationError::Provider(msg.clone()),
            ProviderError::Network { message, .. } => FoundationError::Http(message.clone()),
            ProviderError::Api {
                provider, message, ..
            }
            | ProviderError::ContentFiltered {
                provider,
                reason: message,
                ..
            } => FoundationError::api(provider.to_string(), message.clone()),
            _ => FoundationError::Provider(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_with_header() {
        let err = ProviderError::from_http_status(
            ProviderTag::OpenAi,
            429,
            Some(Duration::from_secs(30)),
            r#"{"error":{"type":"rate_limit","message":"slow down"}}"#,
        );
        match err {
            ProviderError::RateLimited {
                provider,
                retry_after,
            } => {
                assert_eq!(provider, ProviderTag::OpenAi);
                assert_eq!(retry_after, Duration::from_secs(30));
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_rate_limited_default_retry_after() {
        let err = ProviderError::from_http_status(ProviderTag::Anthropic, 429, None, "{}");
        match err {
            ProviderError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Duration::from_secs(30));
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_context_length_exceeded() {
        let body = r#"{"error":{"code":"context_length_exceeded","message":"This model's maximum context length is 8192 tokens. However, you requested 10000 tokens."}}"#;
        let err = ProviderError::from_http_status(ProviderTag::OpenAi, 400, None, body);
        match err {
            ProviderError::ContextLengthExceeded {
                max_tokens,
                input_tokens,
                ..
            } => {
                assert_eq!(max_tokens, 8192);
                assert_eq!(input_tokens, 10000);
            }
            other => panic!("expected ContextLengthExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_content_filtered() {
        let body = r#"{"error":{"type":"content_filter","message":"flagged","code":"policy"}}"#;
        let err = ProviderError::from_http_status(ProviderTag::OpenAi, 403, None, body);
        match err {
            ProviderError::ContentFiltered {
                reason, category, ..
            } => {
                assert_eq!(reason, "flagged");
                assert_eq!(category, "policy");
            }
            other => panic!("expected ContentFiltered, got {:?}", other),
        }
    }

    #[test]
    fn test_generic_api_error() {
        let body = r#"{"error":{"type":"server_error","message":"boom","code":"internal"}}"#;
        let err = ProviderError::from_http_status(ProviderTag::Anthropic, 500, None, body);
        match err {
            ProviderError::Api {
                status,
                message,
                error_type,
                code,
                ..
            } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
                assert_eq!(error_type, "server_error");
                assert_eq!(code, "internal");
            }
            other => panic!("expected Api, got {:?}", other),
        }
        assert!(ProviderError::from_http_status(ProviderTag::Anthropic, 500, None, body)
            .is_retryable());
    }

    #[test]
    fn test_anthropic_error_shape() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"busy"}}"#;
        let err = ProviderError::from_http_status(ProviderTag::Anthropic, 529, None, body);
        match err {
            ProviderError::Api {
                message,
                error_type,
                ..
            } => {
                assert_eq!(message, "busy");
                assert_eq!(error_type, "overloaded_error");
            }
            other => panic!("expected Api, got {:?}", other),
        }
    }

    #[test]
    fn test_non_json_body() {
        let err =
            ProviderError::from_http_status(ProviderTag::Mlx, 502, None, "Bad Gateway");
        match err {
            ProviderError::Api { message, .. } => assert_eq!(message, "Bad Gateway"),
            other => panic!("expected Api, got {:?}", other),
        }
    }
}
