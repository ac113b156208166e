//! 통합 설정
//!
//! 환경변수 기반 AI/Provider 설정. 설정 파일 로딩은 상위 레이어 소관이고,
//! 여기서는 코어가 소비하는 값들만 담는다.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 기본 모델 카탈로그 URL
pub const DEFAULT_CATALOG_URL: &str = "https://models.dev/api.json";

/// 개별 프로바이더 설정
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProviderSettings {
    /// API 키
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// 타임아웃 (초)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// 최대 재시도 횟수 (상위 레이어 참고용)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl ProviderSettings {
    pub fn new() -> Self {
        Self::default()
    }

    // 빌더
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }
}

/// AI 코어 설정
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AiConfig {
    /// 모델 카탈로그 URL
    pub catalog_url: String,

    /// 레지스트리 캐시 TTL (시간)
    pub registry_ttl_hours: u64,

    /// 기본 모델 ID
    pub default_model: String,

    /// Brain 최소 신뢰도
    pub min_confidence: f64,

    /// 시그널 최소 신뢰도
    pub signal_min_confidence: f64,

    /// 시그널 생성 주기 (초)
    pub signal_interval_secs: u64,

    /// 프로바이더별 설정 (이름 → 설정)
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            registry_ttl_hours: 24,
            default_model: "gpt-4o".to_string(),
            min_confidence: 0.7,
            signal_min_confidence: 0.75,
            signal_interval_secs: 30,
            providers: HashMap::new(),
        }
    }
}

impl AiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 환경변수 병합 로드
    ///
    /// `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `MLX_BASE_URL`,
    /// `TRADEMIND_MODEL_CATALOG_URL`, `TRADEMIND_DEFAULT_MODEL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("TRADEMIND_MODEL_CATALOG_URL") {
            self.catalog_url = url;
        }
        if let Ok(model) = std::env::var("TRADEMIND_DEFAULT_MODEL") {
            self.default_model = model;
        }

        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            self.provider_mut("openai").api_key = Some(api_key);
        }
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            self.provider_mut("openai").base_url = Some(base_url);
        }

        if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
            self.provider_mut("anthropic").api_key = Some(api_key);
        }

        // MLX는 로컬 추론이라 키가 없어도 활성화된다
        if let Ok(base_url) = std::env::var("MLX_BASE_URL") {
            self.provider_mut("mlx").base_url = Some(base_url);
        }
        if let Ok(api_key) = std::env::var("MLX_API_KEY") {
            self.provider_mut("mlx").api_key = Some(api_key);
        }
    }

    fn provider_mut(&mut self, name: &str) -> &mut ProviderSettings {
        self.providers.entry(name.to_string()).or_default()
    }

    /// 프로바이더 설정 조회
    pub fn provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers.get(name)
    }

    /// 프로바이더 설정 추가
    pub fn add_provider(&mut self, name: impl Into<String>, settings: ProviderSettings) {
        self.providers.insert(name.into(), settings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AiConfig::default();
        assert_eq!(config.registry_ttl_hours, 24);
        assert_eq!(config.min_confidence, 0.7);
        assert_eq!(config.signal_min_confidence, 0.75);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_settings_builder() {
        let settings = ProviderSettings::new()
            .api_key("sk-test")
            .base_url("http://localhost:8080/v1")
            .timeout(120)
            .max_retries(3);

        assert_eq!(settings.api_key, Some("sk-test".to_string()));
        assert_eq!(settings.timeout_secs, Some(120));
        assert_eq!(settings.max_retries, Some(3));
    }

    #[test]
    fn test_add_provider() {
        let mut config = AiConfig::new();
        config.add_provider("openai", ProviderSettings::new().api_key("k"));
        assert!(config.provider("openai").is_some());
        assert!(config.provider("mistral").is_none());
    }
}
