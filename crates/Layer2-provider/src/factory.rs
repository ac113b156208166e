//! Client factory - configure-then-construct dispatch over provider tags

use crate::error::ProviderError;
use crate::providers::{anthropic::AnthropicClient, mlx::MlxClient, openai::OpenAiClient};
use crate::r#trait::{ClientConfig, ProviderClient, ProviderTag};
use crate::registry::{ModelInfo, RegistryService};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use trademind_foundation::AiConfig;

/// Constructs provider clients from registered configurations.
///
/// Placeholder providers (Google, Mistral) fail loudly; the factory never
/// silently substitutes a different client.
pub struct ClientFactory {
    configs: RwLock<HashMap<ProviderTag, ClientConfig>>,
    registry: Arc<RegistryService>,
}

impl ClientFactory {
    pub fn new(registry: Arc<RegistryService>) -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
            registry,
        }
    }

    /// Build a factory with every provider found in the AI config
    pub async fn from_config(config: &AiConfig, registry: Arc<RegistryService>) -> Self {
        let factory = Self::new(registry);

        for (name, settings) in &config.providers {
            let Some(tag) = ProviderTag::from_provider_id(name) else {
                tracing::warn!("ignoring settings for unknown provider '{}'", name);
                continue;
            };

            let mut client_config = ClientConfig::new(settings.api_key.clone().unwrap_or_default());
            client_config.base_url = settings.base_url.clone();
            client_config.timeout = settings.timeout_secs.map(Duration::from_secs);
            client_config.max_retries = settings.max_retries.unwrap_or_default();
            factory.configure(tag, client_config).await;
        }

        factory
    }

    /// Register or replace a provider configuration
    pub async fn configure(&self, provider: ProviderTag, config: ClientConfig) {
        self.configs.write().await.insert(provider, config);
    }

    /// Whether a provider has a registered configuration
    pub async fn is_configured(&self, provider: ProviderTag) -> bool {
        self.configs.read().await.contains_key(&provider)
    }

    /// Create a client for the given provider
    pub async fn create(
        &self,
        provider: ProviderTag,
    ) -> Result<Arc<dyn ProviderClient>, ProviderError> {
        let config = self
            .configs
            .read()
            .await
            .get(&provider)
            .cloned()
            .ok_or(ProviderError::NotConfigured { provider })?;

        Self::build(provider, config)
    }

    /// Resolve a model through the registry, then create its provider client
    /// with the model's pricing attached.
    pub async fn create_for_model(
        &self,
        model_id: &str,
    ) -> Result<(Arc<dyn ProviderClient>, ModelInfo), ProviderError> {
        let model = self.registry.find_model(model_id).await?;

        let provider = ProviderTag::from_provider_id(&model.provider_id).ok_or_else(|| {
            ProviderError::Registry(format!(
                "model '{}' belongs to unknown provider '{}'",
                model_id, model.provider_id
            ))
        })?;

        let mut config = self
            .configs
            .read()
            .await
            .get(&provider)
            .cloned()
            .ok_or(ProviderError::NotConfigured { provider })?;
        config.model_info = Some(model.clone());

        let client = Self::build(provider, config)?;
        Ok((client, model))
    }

    fn build(
        provider: ProviderTag,
        config: ClientConfig,
    ) -> Result<Arc<dyn ProviderClient>, ProviderError> {
        match provider {
            ProviderTag::OpenAi => Ok(Arc::new(OpenAiClient::new(config)?)),
            ProviderTag::Anthropic => Ok(Arc::new(AnthropicClient::new(config)?)),
            ProviderTag::Mlx => Ok(Arc::new(MlxClient::new(config)?)),
            ProviderTag::Google | ProviderTag::Mistral => {
                Err(ProviderError::Unsupported { provider })
            }
        }
    }

    /// Access the registry this factory resolves models through
    pub fn registry(&self) -> &Arc<RegistryService> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> ClientFactory {
        ClientFactory::new(Arc::new(RegistryService::new("http://127.0.0.1:1/api.json")))
    }

    #[tokio::test]
    async fn test_unconfigured_provider_fails() {
        let factory = factory();
        let err = factory.create(ProviderTag::OpenAi).await.unwrap_err();
        match err {
            ProviderError::NotConfigured { provider } => {
                assert_eq!(provider, ProviderTag::OpenAi);
            }
            other => panic!("expected NotConfigured, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_configured_provider_builds() {
        let factory = factory();
        factory
            .configure(ProviderTag::OpenAi, ClientConfig::new("sk-test"))
            .await;

        let client = factory.create(ProviderTag::OpenAi).await.unwrap();
        assert_eq!(client.provider(), ProviderTag::OpenAi);
        assert!(factory.is_configured(ProviderTag::OpenAi).await);
    }

    #[tokio::test]
    async fn test_placeholder_providers_fail_loudly() {
        let factory = factory();
        factory
            .configure(ProviderTag::Google, ClientConfig::new("key"))
            .await;
        factory
            .configure(ProviderTag::Mistral, ClientConfig::new("key"))
            .await;

        for tag in [ProviderTag::Google, ProviderTag::Mistral] {
            let err = factory.create(tag).await.unwrap_err();
            assert!(matches!(err, ProviderError::Unsupported { provider } if provider == tag));
        }
    }

    #[tokio::test]
    async fn test_from_config_maps_settings() {
        let mut ai = AiConfig::new();
        ai.add_provider(
            "openai",
            trademind_foundation::ProviderSettings::new()
                .api_key("sk-env")
                .timeout(10),
        );
        ai.add_provider("doesnotexist", trademind_foundation::ProviderSettings::new());

        let registry = Arc::new(RegistryService::new("http://127.0.0.1:1/api.json"));
        let factory = ClientFactory::from_config(&ai, registry).await;

        assert!(factory.is_configured(ProviderTag::OpenAi).await);
        assert!(!factory.is_configured(ProviderTag::Mistral).await);
    }
}
