//! Model registry with a two-tier cache
//!
//! L1 is an in-process snapshot behind a reader-writer lock, L2 is an
//! optional external KV blob, and the source of truth is a remote JSON
//! catalog. Readers share the L1 snapshot; only the fetch path takes the
//! write lock, and only to swap the pointer.

use crate::error::ProviderError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use trademind_foundation::KvStore;

/// KV key for the serialized registry blob
pub const REGISTRY_KV_KEY: &str = "ai:model_registry";

/// Registry TTL when none is configured
pub const DEFAULT_REGISTRY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Catalog fetch timeout
const CATALOG_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider IDs served by fast/local inference hardware
const FAST_PROVIDERS: &[&str] = &["mlx", "groq", "cerebras"];

/// What a model can do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub tools: bool,
    pub vision: bool,
    pub reasoning: bool,
}

/// Per-million-token pricing, exact decimals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCost {
    pub input: Decimal,
    pub output: Decimal,
    pub reasoning: Decimal,
    pub cache_read: Decimal,
    pub cache_write: Decimal,
    pub audio_in: Decimal,
    pub audio_out: Decimal,
}

impl ModelCost {
    /// Combined input+output unit cost, the routing metric
    pub fn total_unit(&self) -> Decimal {
        self.input + self.output
    }
}

/// Token limits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLimits {
    pub context: u32,
    pub input: u32,
    pub output: u32,
}

/// Rough latency expectation for routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyClass {
    Fast,
    Balanced,
    Accurate,
}

/// Static metadata about one model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Catalog provider ID (e.g. "openai")
    pub provider_id: String,

    /// Provider display name
    pub provider_name: String,

    /// Model ID
    pub model_id: String,

    /// Display name
    pub display_name: String,

    /// Alternate IDs resolving to this model
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Model family
    #[serde(default)]
    pub family: String,

    pub capabilities: Capabilities,

    pub cost: ModelCost,

    pub limits: ModelLimits,

    /// Pricing/access tier label
    #[serde(default)]
    pub tier: String,

    pub latency: LatencyClass,

    /// Catalog status; "active" unless the catalog says otherwise
    #[serde(default = "default_status")]
    pub status: String,

    pub supports_structured_output: bool,

    pub supports_temperature: bool,

    #[serde(default)]
    pub release_date: String,

    #[serde(default)]
    pub last_updated: String,
}

fn default_status() -> String {
    "active".to_string()
}

impl ModelInfo {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    /// Whether `id` names this model, by model ID first, then aliases
    pub fn matches(&self, id: &str) -> bool {
        self.model_id == id || self.aliases.iter().any(|a| a == id)
    }
}

/// One provider as captured at fetch time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub id: String,
    pub name: String,

    /// Package hint from the catalog (npm field)
    #[serde(default)]
    pub package_hint: Option<String>,

    /// Environment variable names used for credentials
    #[serde(default)]
    pub env: Vec<String>,

    /// Models nested under this provider
    pub models: Vec<ModelInfo>,
}

/// Snapshot of the remote catalog
///
/// Every entry in `models` has a `provider_id` matching some entry in
/// `providers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRegistry {
    pub providers: Vec<ProviderEntry>,

    /// Flat, de-duplicated model list
    pub models: Vec<ModelInfo>,

    pub fetched_at: DateTime<Utc>,

    /// Raw catalog document keyed by provider ID, kept for debugging
    #[serde(default)]
    pub raw: HashMap<String, serde_json::Value>,
}

/// Caller preference for model routing
#[derive(Debug, Clone)]
pub struct RoutingPreference {
    pub latency: LatencyClass,

    /// Exclude models whose combined unit cost exceeds this cap
    pub max_total_cost: Option<Decimal>,
}

impl ModelRegistry {
    /// Lookup by model ID, then aliases; first match wins
    pub fn find_model(&self, id: &str) -> Option<&ModelInfo> {
        self.models
            .iter()
            .find(|m| m.model_id == id)
            .or_else(|| self.models.iter().find(|m| m.matches(id)))
    }

    pub fn models_by_provider(&self, provider_id: &str) -> Vec<&ModelInfo> {
        self.models
            .iter()
            .filter(|m| m.provider_id == provider_id)
            .collect()
    }

    /// AND-filter across requested capabilities, active models only.
    /// A `false` requirement is ignored.
    pub fn find_models_by_capability(&self, required: Capabilities) -> Vec<&ModelInfo> {
        self.models
            .iter()
            .filter(|m| m.is_active())
            .filter(|m| {
                (!required.tools || m.capabilities.tools)
                    && (!required.vision || m.capabilities.vision)
                    && (!required.reasoning || m.capabilities.reasoning)
            })
            .collect()
    }

    /// Highest-scoring active model for a routing preference.
    /// Ties keep the earlier model in enumeration order.
    pub fn select_model(&self, preference: &RoutingPreference) -> Option<&ModelInfo> {
        let mut best: Option<(&ModelInfo, i32)> = None;
        for model in self.models.iter().filter(|m| m.is_active()) {
            let total_unit = model.cost.total_unit();
            if let Some(cap) = preference.max_total_cost {
                if total_unit > cap {
                    continue;
                }
            }

            let score = latency_score(model.latency, preference.latency) + cost_score(total_unit);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((model, score)),
            }
        }
        best.map(|(model, _)| model)
    }
}

fn latency_score(model: LatencyClass, preferred: LatencyClass) -> i32 {
    if model == preferred {
        match model {
            LatencyClass::Fast => 2,
            LatencyClass::Balanced | LatencyClass::Accurate => 1,
        }
    } else if preferred == LatencyClass::Fast && model == LatencyClass::Accurate {
        -1
    } else {
        0
    }
}

fn cost_score(total_unit: Decimal) -> i32 {
    if total_unit < Decimal::from(5u32) {
        2
    } else if total_unit < Decimal::from(20u32) {
        1
    } else {
        0
    }
}

// ============================================================================
// Catalog wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct CatalogProvider {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    npm: Option<String>,
    #[serde(default)]
    env: Vec<String>,
    #[serde(default)]
    models: HashMap<String, CatalogModel>,
}

#[derive(Debug, Deserialize)]
struct CatalogModel {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    family: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    last_updated: Option<String>,
    #[serde(default)]
    tool_call: bool,
    #[serde(default)]
    reasoning: bool,
    #[serde(default)]
    attachment: bool,
    #[serde(default = "default_true")]
    temperature: bool,
    #[serde(default)]
    structured_output: bool,
    #[serde(default)]
    tier: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    cost: CatalogCost,
    #[serde(default)]
    limit: CatalogLimit,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
struct CatalogCost {
    #[serde(default)]
    input: f64,
    #[serde(default)]
    output: f64,
    #[serde(default)]
    reasoning: f64,
    #[serde(default)]
    cache_read: f64,
    #[serde(default)]
    cache_write: f64,
    #[serde(default)]
    audio_in: f64,
    #[serde(default)]
    audio_out: f64,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogLimit {
    #[serde(default)]
    context: u32,
    #[serde(default)]
    input: u32,
    #[serde(default)]
    output: u32,
}

/// Catalog floats become decimals here, exactly once
fn decimal(value: f64) -> Decimal {
    Decimal::from_f64_retain(value).unwrap_or_default()
}

fn infer_latency(provider_id: &str, reasoning: bool) -> LatencyClass {
    if FAST_PROVIDERS.contains(&provider_id) {
        LatencyClass::Fast
    } else if reasoning {
        LatencyClass::Accurate
    } else {
        LatencyClass::Balanced
    }
}

/// Flatten a raw catalog document into a typed registry
fn build_registry(raw: HashMap<String, serde_json::Value>) -> ModelRegistry {
    let mut providers = Vec::new();
    let mut models: Vec<ModelInfo> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    // 안정적인 순서를 위해 프로바이더 ID 정렬
    let mut provider_ids: Vec<&String> = raw.keys().collect();
    provider_ids.sort();

    for provider_id in provider_ids {
        let value = &raw[provider_id];
        let catalog: CatalogProvider = match serde_json::from_value(value.clone()) {
            Ok(p) => p,
            Err(e) => {
                warn!("skipping undecodable catalog provider '{}': {}", provider_id, e);
                continue;
            }
        };

        let provider_name = catalog.name.unwrap_or_else(|| provider_id.clone());
        let mut provider_models = Vec::new();

        let mut model_ids: Vec<&String> = catalog.models.keys().collect();
        model_ids.sort();

        for model_id in model_ids {
            let m = &catalog.models[model_id];
            let info = ModelInfo {
                provider_id: provider_id.clone(),
                provider_name: provider_name.clone(),
                model_id: model_id.clone(),
                display_name: m.name.clone().unwrap_or_else(|| model_id.clone()),
                aliases: m.aliases.clone(),
                family: m.family.clone().unwrap_or_default(),
                capabilities: Capabilities {
                    tools: m.tool_call,
                    vision: m.attachment,
                    reasoning: m.reasoning,
                },
                cost: ModelCost {
                    input: decimal(m.cost.input),
                    output: decimal(m.cost.output),
                    reasoning: decimal(m.cost.reasoning),
                    cache_read: decimal(m.cost.cache_read),
                    cache_write: decimal(m.cost.cache_write),
                    audio_in: decimal(m.cost.audio_in),
                    audio_out: decimal(m.cost.audio_out),
                },
                limits: ModelLimits {
                    context: m.limit.context,
                    input: m.limit.input,
                    output: m.limit.output,
                },
                tier: m.tier.clone().unwrap_or_default(),
                latency: infer_latency(provider_id, m.reasoning),
                status: m.status.clone().unwrap_or_else(default_status),
                supports_structured_output: m.structured_output,
                supports_temperature: m.temperature,
                release_date: m.release_date.clone().unwrap_or_default(),
                last_updated: m.last_updated.clone().unwrap_or_default(),
            };

            provider_models.push(info.clone());
            if seen.insert(info.model_id.clone()) {
                models.push(info);
            }
        }

        providers.push(ProviderEntry {
            id: provider_id.clone(),
            name: provider_name,
            package_hint: catalog.npm,
            env: catalog.env,
            models: provider_models,
        });
    }

    ModelRegistry {
        providers,
        models,
        fetched_at: Utc::now(),
        raw,
    }
}

// ============================================================================
// Registry service
// ============================================================================

/// Two-tier cached access to the model catalog
pub struct RegistryService {
    catalog_url: String,
    ttl: Duration,
    http: reqwest::Client,
    cache: RwLock<Option<Arc<ModelRegistry>>>,
    kv: Option<Arc<dyn KvStore>>,
}

impl RegistryService {
    pub fn new(catalog_url: impl Into<String>) -> Self {
        Self {
            catalog_url: catalog_url.into(),
            ttl: DEFAULT_REGISTRY_TTL,
            http: reqwest::Client::builder()
                .timeout(CATALOG_HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            cache: RwLock::new(None),
            kv: None,
        }
    }

    pub fn from_config(config: &trademind_foundation::AiConfig) -> Self {
        Self::new(config.catalog_url.clone())
            .with_ttl(Duration::from_secs(config.registry_ttl_hours * 3600))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_kv(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// Current registry snapshot: L1, then KV, then the remote catalog
    pub async fn get_registry(&self) -> Result<Arc<ModelRegistry>, ProviderError> {
        if let Some(registry) = self.fresh_l1().await {
            return Ok(registry);
        }

        if let Some(kv) = &self.kv {
            match kv.get(REGISTRY_KV_KEY).await {
                Ok(Some(bytes)) => match serde_json::from_slice::<ModelRegistry>(&bytes) {
                    Ok(registry) => {
                        debug!("model registry loaded from KV cache");
                        let registry = Arc::new(registry);
                        *self.cache.write().await = Some(registry.clone());
                        return Ok(registry);
                    }
                    Err(e) => warn!("discarding undecodable registry blob from KV: {}", e),
                },
                Ok(None) => {}
                Err(e) => warn!("KV read failed, fetching catalog directly: {}", e),
            }
        }

        self.fetch_and_cache().await
    }

    async fn fresh_l1(&self) -> Option<Arc<ModelRegistry>> {
        let ttl = chrono::Duration::from_std(self.ttl).ok()?;
        let guard = self.cache.read().await;
        guard
            .as_ref()
            .filter(|r| Utc::now() - r.fetched_at < ttl)
            .cloned()
    }

    async fn fetch_and_cache(&self) -> Result<Arc<ModelRegistry>, ProviderError> {
        let response = self
            .http
            .get(&self.catalog_url)
            .send()
            .await
            .map_err(|e| ProviderError::Registry(format!("catalog fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ProviderError::Registry(format!(
                "catalog fetch returned status {}",
                response.status().as_u16()
            )));
        }

        let raw: HashMap<String, serde_json::Value> = response
            .json()
            .await
            .map_err(|e| ProviderError::Registry(format!("catalog decode failed: {}", e)))?;

        let registry = Arc::new(build_registry(raw));
        debug!(
            providers = registry.providers.len(),
            models = registry.models.len(),
            "model registry fetched from catalog"
        );

        *self.cache.write().await = Some(registry.clone());

        // L2 기록은 best-effort
        if let Some(kv) = &self.kv {
            match serde_json::to_vec(registry.as_ref()) {
                Ok(bytes) => {
                    if let Err(e) = kv.set(REGISTRY_KV_KEY, bytes, self.ttl).await {
                        warn!("KV registry write failed: {}", e);
                    }
                }
                Err(e) => warn!("registry serialization for KV failed: {}", e),
            }
        }

        Ok(registry)
    }

    /// Drop both cache tiers and force a source fetch
    pub async fn refresh(&self) -> Result<Arc<ModelRegistry>, ProviderError> {
        *self.cache.write().await = None;
        if let Some(kv) = &self.kv {
            if let Err(e) = kv.del(REGISTRY_KV_KEY).await {
                warn!("KV registry delete failed: {}", e);
            }
        }
        self.fetch_and_cache().await
    }

    /// Lookup by model ID, then aliases
    pub async fn find_model(&self, id: &str) -> Result<ModelInfo, ProviderError> {
        let registry = self.get_registry().await?;
        registry
            .find_model(id)
            .cloned()
            .ok_or_else(|| ProviderError::ModelNotFound(id.to_string()))
    }

    pub async fn models_by_provider(
        &self,
        provider_id: &str,
    ) -> Result<Vec<ModelInfo>, ProviderError> {
        let registry = self.get_registry().await?;
        let models: Vec<ModelInfo> = registry
            .models_by_provider(provider_id)
            .into_iter()
            .cloned()
            .collect();
        if models.is_empty() {
            return Err(ProviderError::ModelNotFound(format!(
                "no models for provider '{}'",
                provider_id
            )));
        }
        Ok(models)
    }

    pub async fn find_models_by_capability(
        &self,
        required: Capabilities,
    ) -> Result<Vec<ModelInfo>, ProviderError> {
        let registry = self.get_registry().await?;
        Ok(registry
            .find_models_by_capability(required)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Providers as captured at fetch time
    pub async fn active_providers(&self) -> Result<Vec<ProviderEntry>, ProviderError> {
        let registry = self.get_registry().await?;
        Ok(registry.providers.clone())
    }
}
