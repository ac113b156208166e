//! AI Trading Brain
//!
//! One synchronous reasoning step per call: compose strategy prompts, invoke
//! the provider, parse the decision, gate on confidence, persist async.

use crate::learning::LearningStore;
use crate::prompts;
use crate::types::{
    DecisionOutcome, DecisionRecord, ReasoningRequest, ReasoningResponse, TradingAction,
    TradingDecision,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};
use trademind_foundation::{Error, Result};
use trademind_provider::{
    build_tool_definitions, ClientFactory, CompletionRequest, Message, ProviderClient,
    ProviderError, Skill, SkillParameter,
};

/// Prior decisions folded into the prompt
const MEMORY_LIMIT: usize = 5;

/// Bounded queue between the reasoning path and the learning store
const PERSIST_QUEUE_CAPACITY: usize = 64;

/// Brain tuning knobs
#[derive(Debug, Clone)]
pub struct BrainConfig {
    /// Model ID resolved through the registry
    pub model: String,

    pub temperature: f32,

    pub max_tokens: u32,

    /// Decisions below this are downgraded to hold
    pub min_confidence: f64,

    /// Per-call budget layered above the transport timeout
    pub call_timeout: Duration,

    /// Whether prior outcomes are folded into the prompt
    pub memory_enabled: bool,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.2,
            max_tokens: 2000,
            min_confidence: 0.7,
            call_timeout: Duration::from_secs(30),
            memory_enabled: true,
        }
    }
}

/// The reasoning loop
pub struct TradingBrain {
    factory: Arc<ClientFactory>,
    store: Arc<LearningStore>,
    config: BrainConfig,
    persist_tx: mpsc::Sender<DecisionRecord>,
    client_override: Option<Arc<dyn ProviderClient>>,
}

impl TradingBrain {
    pub fn new(
        factory: Arc<ClientFactory>,
        store: Arc<LearningStore>,
        config: BrainConfig,
    ) -> Self {
        let (persist_tx, mut persist_rx) =
            mpsc::channel::<DecisionRecord>(PERSIST_QUEUE_CAPACITY);

        let worker_store = store.clone();
        tokio::spawn(async move {
            while let Some(record) = persist_rx.recv().await {
                if let Err(e) = worker_store.record_decision(record).await {
                    warn!("failed to persist decision record: {}", e);
                }
            }
        });

        Self {
            factory,
            store,
            config,
            persist_tx,
            client_override: None,
        }
    }

    /// Pin a specific client instead of resolving through the registry
    pub fn with_client(mut self, client: Arc<dyn ProviderClient>) -> Self {
        self.client_override = Some(client);
        self
    }

    pub fn config(&self) -> &BrainConfig {
        &self.config
    }

    /// Execute one reasoning step.
    ///
    /// Unparsable model output degrades to a zero-confidence hold; it never
    /// surfaces as an error. Provider and timeout failures do.
    pub async fn reason(&self, request: ReasoningRequest) -> Result<ReasoningResponse> {
        let started = Instant::now();

        let memory = if self.config.memory_enabled {
            format_memory(
                &self
                    .store
                    .similar_decisions(&request.symbol, MEMORY_LIMIT)
                    .await,
            )
        } else {
            String::new()
        };

        let system = prompts::system_prompt(&request.strategy);
        let user = build_user_prompt(&request, &memory);
        let tools = build_tool_definitions(&tools_for_strategy(&request.strategy));

        let completion = CompletionRequest::new(
            self.config.model.clone(),
            vec![Message::system(system), Message::user(user)],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens)
        .with_tools(tools);

        let client = self.resolve_client().await?;
        let response = timeout(self.config.call_timeout, client.complete(completion))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "brain call exceeded {:?}",
                    self.config.call_timeout
                ))
            })??;

        let content = response.message.content.clone();
        let mut decision = parse_decision(&content, &request.symbol);
        if decision.symbol.is_empty() {
            decision.symbol = request.symbol.clone();
        }
        if decision.id.is_empty() {
            decision.id = uuid::Uuid::new_v4().to_string();
        }

        let raw_confidence = decision.confidence;
        if raw_confidence < self.config.min_confidence
            && decision.action != TradingAction::Hold
        {
            debug!(
                confidence = raw_confidence,
                threshold = self.config.min_confidence,
                "downgrading low-confidence decision to hold"
            );
            decision.action = TradingAction::Hold;
        }

        let record = DecisionRecord {
            id: decision.id.clone(),
            timestamp: chrono::Utc::now(),
            strategy: request.strategy.clone(),
            symbol: request.symbol.clone(),
            market_state: request.market_state.clone(),
            decision: decision.clone(),
            reasoning: content.clone(),
            confidence: raw_confidence,
            model: response.model.clone(),
            tokens_used: response.usage.total_tokens,
            outcome: DecisionOutcome::Unknown,
            pnl: Decimal::ZERO,
            executed_at: None,
            completed_at: None,
        };
        // fire-and-forget; a full queue drops the record with a warning
        if self.persist_tx.try_send(record).is_err() {
            warn!("decision persist queue full, dropping record");
        }

        Ok(ReasoningResponse {
            decision,
            reasoning: content,
            confidence: raw_confidence,
            latency_ms: started.elapsed().as_millis() as u64,
            model: response.model,
            tokens_used: response.usage.total_tokens,
        })
    }

    async fn resolve_client(
        &self,
    ) -> std::result::Result<Arc<dyn ProviderClient>, ProviderError> {
        if let Some(client) = &self.client_override {
            return Ok(client.clone());
        }
        let (client, _model) = self.factory.create_for_model(&self.config.model).await?;
        Ok(client)
    }
}

fn build_user_prompt(request: &ReasoningRequest, memory: &str) -> String {
    let market = serde_json::to_string_pretty(&request.market_state)
        .unwrap_or_else(|_| request.market_state.to_string());
    let portfolio = serde_json::to_string_pretty(&request.portfolio_state)
        .unwrap_or_else(|_| request.portfolio_state.to_string());

    let mut prompt = format!(
        "Strategy: {}\nSymbol: {}\n\nMarket state:\n{}\n\nPortfolio state:\n{}\n",
        request.strategy, request.symbol, market, portfolio
    );

    if let Some(prior) = &request.prior_decision {
        if let Ok(prior_json) = serde_json::to_string_pretty(prior) {
            prompt.push_str(&format!("\nPrior decision:\n{}\n", prior_json));
        }
    }
    if !request.context.is_empty() {
        prompt.push_str(&format!("\nContext:\n{}\n", request.context));
    }
    if !memory.is_empty() {
        prompt.push_str(&format!("\nRecent outcomes on this symbol:\n{}", memory));
    }

    prompt
}

/// Short bullet lines summarizing prior outcomes
fn format_memory(records: &[DecisionRecord]) -> String {
    records
        .iter()
        .map(|r| {
            format!(
                "- {} {} {} -> {} (pnl {}, confidence {:.2})",
                r.timestamp.format("%Y-%m-%d %H:%M"),
                r.strategy,
                r.decision.action.as_str(),
                serde_json::to_string(&r.outcome)
                    .unwrap_or_default()
                    .trim_matches('"'),
                r.pnl,
                r.confidence
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// First balanced `{...}` span, string-aware
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decode the model's decision; anything untrustworthy becomes a hold
fn parse_decision(content: &str, symbol: &str) -> TradingDecision {
    let Some(span) = extract_json_object(content) else {
        warn!("model output contained no JSON object");
        return TradingDecision::hold(symbol, "model output contained no JSON object");
    };

    match serde_json::from_str::<TradingDecision>(span) {
        Ok(decision) => decision,
        Err(e) => {
            warn!("model decision did not decode: {}", e);
            TradingDecision::hold(symbol, format!("model decision did not decode: {}", e))
        }
    }
}

/// Built-in skill catalog per strategy
fn tools_for_strategy(strategy: &str) -> Vec<Skill> {
    let mut skills = vec![
        Skill::new("fetch_ticker", "Fetch the latest ticker for a trading pair").with_param(
            "symbol",
            SkillParameter::string("Trading pair, e.g. BTCUSDT", true),
        ),
        Skill::new("fetch_order_book", "Fetch the top levels of the order book")
            .with_param(
                "symbol",
                SkillParameter::string("Trading pair, e.g. BTCUSDT", true),
            )
            .with_param(
                "depth",
                SkillParameter::number("Levels per side", false).with_default(json!(10)),
            ),
        Skill::new("position_size", "Compute a position size from risk limits")
            .with_param(
                "risk_percent",
                SkillParameter::number("Portfolio percent at risk", true),
            )
            .with_param(
                "stop_distance",
                SkillParameter::number("Distance to stop in quote units", true),
            ),
    ];

    match strategy {
        prompts::STRATEGY_SCALPING => {
            skills.push(
                Skill::new("recent_trades", "Fetch the most recent trades").with_param(
                    "symbol",
                    SkillParameter::string("Trading pair, e.g. BTCUSDT", true),
                ),
            );
        }
        prompts::STRATEGY_ARBITRAGE => {
            skills.push(
                Skill::new("cross_venue_quotes", "Fetch quotes across venues")
                    .with_param(
                        "symbol",
                        SkillParameter::string("Trading pair, e.g. BTCUSDT", true),
                    )
                    .with_param(
                        "venues",
                        SkillParameter::enumeration(
                            "Venues to compare",
                            vec!["binance", "bybit", "okx"],
                            false,
                        ),
                    ),
            );
        }
        _ => {}
    }

    skills
}

#[cfg(test)]
mod tests {
    use super::*;
    use trademind_provider::{MockClient, ProviderTag, RegistryService};

    fn brain_with(client: MockClient, dir: &std::path::Path) -> (TradingBrain, Arc<LearningStore>) {
        let registry = Arc::new(RegistryService::new("http://127.0.0.1:1/api.json"));
        let factory = Arc::new(ClientFactory::new(registry));
        let store = Arc::new(LearningStore::new(dir));
        let brain = TradingBrain::new(factory, store.clone(), BrainConfig::default())
            .with_client(Arc::new(client));
        (brain, store)
    }

    fn request() -> ReasoningRequest {
        ReasoningRequest {
            strategy: "scalping".to_string(),
            symbol: "BTCUSDT".to_string(),
            market_state: json!({"price": 50000, "trend": "up"}),
            portfolio_state: json!({"cash": 10000}),
            prior_decision: None,
            context: String::new(),
        }
    }

    #[tokio::test]
    async fn test_confidence_gate_downgrades_to_hold() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::new(ProviderTag::OpenAi)
            .with_response(r#"{"action":"buy","confidence":0.4,"reasoning":"weak"}"#);
        let (brain, _) = brain_with(client, dir.path());

        let response = brain.reason(request()).await.unwrap();
        assert_eq!(response.decision.action, TradingAction::Hold);
        assert_eq!(response.decision.confidence, 0.4);
        assert_eq!(response.decision.reasoning, "weak");
        assert_eq!(response.confidence, 0.4);
    }

    #[tokio::test]
    async fn test_confident_decision_passes_gate() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::new(ProviderTag::OpenAi).with_response(
            r#"{"action":"buy","symbol":"BTCUSDT","confidence":0.9,"reasoning":"strong"}"#,
        );
        let (brain, _) = brain_with(client, dir.path());

        let response = brain.reason(request()).await.unwrap();
        assert_eq!(response.decision.action, TradingAction::Buy);
        assert_eq!(response.confidence, 0.9);
    }

    #[tokio::test]
    async fn test_unparsable_output_becomes_hold() {
        let dir = tempfile::tempdir().unwrap();
        let client =
            MockClient::new(ProviderTag::OpenAi).with_response("I think you should buy, maybe?");
        let (brain, _) = brain_with(client, dir.path());

        let response = brain.reason(request()).await.unwrap();
        assert_eq!(response.decision.action, TradingAction::Hold);
        assert_eq!(response.decision.confidence, 0.0);
        assert_eq!(response.decision.symbol, "BTCUSDT");
    }

    #[tokio::test]
    async fn test_json_extracted_from_prose() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::new(ProviderTag::OpenAi).with_response(
            "Based on momentum: {\"action\":\"sell\",\"confidence\":0.85,\"reasoning\":\"rolling over {fast}\"} Good luck!",
        );
        let (brain, _) = brain_with(client, dir.path());

        let response = brain.reason(request()).await.unwrap();
        assert_eq!(response.decision.action, TradingAction::Sell);
        assert_eq!(response.decision.reasoning, "rolling over {fast}");
    }

    #[tokio::test]
    async fn test_decision_persisted_async() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::new(ProviderTag::OpenAi)
            .with_response(r#"{"action":"buy","confidence":0.9}"#);
        let (brain, store) = brain_with(client, dir.path());

        brain.reason(request()).await.unwrap();

        // the write happens off the critical path
        for _ in 0..50 {
            if !store.is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::new(ProviderTag::OpenAi).with_error(
            ProviderError::RateLimited {
                provider: ProviderTag::OpenAi,
                retry_after: Duration::from_secs(30),
            },
        );
        let (brain, _) = brain_with(client, dir.path());

        let err = brain.reason(request()).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_memory_folded_into_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::new(ProviderTag::OpenAi)
            .with_response(r#"{"action":"hold","confidence":0.9}"#)
            .with_response(r#"{"action":"hold","confidence":0.9}"#);
        let requests = client.requests.clone();
        let (brain, store) = brain_with(client, dir.path());

        // seed one completed decision
        let mut record = DecisionRecord {
            id: "d1".to_string(),
            timestamp: chrono::Utc::now(),
            strategy: "scalping".to_string(),
            symbol: "BTCUSDT".to_string(),
            market_state: json!({}),
            decision: TradingDecision::hold("BTCUSDT", "seed"),
            reasoning: "seed".to_string(),
            confidence: 0.8,
            model: "gpt-4o".to_string(),
            tokens_used: 10,
            outcome: DecisionOutcome::Win,
            pnl: Decimal::from(7u32),
            executed_at: None,
            completed_at: None,
        };
        record.decision.action = TradingAction::Buy;
        store.record_decision(record).await.unwrap();

        brain.reason(request()).await.unwrap();

        let captured = requests.lock().unwrap();
        let user_prompt = &captured[0].messages[1].content;
        assert!(user_prompt.contains("Recent outcomes on this symbol"));
        assert!(user_prompt.contains("win"));
    }

    #[tokio::test]
    async fn test_tools_attached_per_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient::new(ProviderTag::OpenAi)
            .with_response(r#"{"action":"hold","confidence":0.9}"#);
        let requests = client.requests.clone();
        let (brain, _) = brain_with(client, dir.path());

        let mut req = request();
        req.strategy = "arbitrage".to_string();
        brain.reason(req).await.unwrap();

        let captured = requests.lock().unwrap();
        let tools = captured[0].tools.as_ref().unwrap();
        assert!(tools.iter().any(|t| t.name() == "cross_venue_quotes"));
        assert!(tools.iter().any(|t| t.name() == "fetch_ticker"));
    }

    #[test]
    fn test_extract_json_object_spans() {
        assert_eq!(extract_json_object(r#"x {"a":1} y"#), Some(r#"{"a":1}"#));
        assert_eq!(
            extract_json_object(r#"{"a":{"b":"}"}}"#),
            Some(r#"{"a":{"b":"}"}}"#)
        );
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{unclosed"), None);
    }
}
