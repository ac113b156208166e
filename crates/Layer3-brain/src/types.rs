//! Decision and signal types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the brain decided to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingAction {
    Buy,
    Sell,
    Hold,
    Close,
    Scalp,
    Arbitrage,
}

impl TradingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingAction::Buy => "buy",
            TradingAction::Sell => "sell",
            TradingAction::Hold => "hold",
            TradingAction::Close => "close",
            TradingAction::Scalp => "scalp",
            TradingAction::Arbitrage => "arbitrage",
        }
    }
}

/// Realized outcome of a decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionOutcome {
    Win,
    Loss,
    Breakeven,
    Pending,
    /// Not yet recorded; serializes to the empty string
    #[default]
    #[serde(rename = "")]
    Unknown,
}

impl DecisionOutcome {
    /// Whether an outcome has been recorded at all
    pub fn is_recorded(&self) -> bool {
        *self != DecisionOutcome::Unknown
    }
}

/// A structured trading decision emitted by the model.
///
/// Every field except `action` is optional in the model output; absent
/// fields decode to defaults so a sparse but valid object still parses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingDecision {
    #[serde(default)]
    pub id: String,

    pub action: TradingAction,

    #[serde(default)]
    pub symbol: String,

    /// Position side ("long"/"short")
    #[serde(default)]
    pub side: String,

    /// Absolute size in base units
    #[serde(default)]
    pub size: f64,

    /// Percent of available funds (0.1 - 5.0)
    #[serde(default)]
    pub size_percent: f64,

    #[serde(default)]
    pub entry_price: Option<Decimal>,

    #[serde(default)]
    pub stop_loss: Option<Decimal>,

    #[serde(default)]
    pub take_profit: Option<Decimal>,

    /// "market" or "limit"
    #[serde(default)]
    pub order_type: String,

    /// e.g. "GTC", "IOC"
    #[serde(default)]
    pub time_in_force: String,

    /// Max acceptable slippage in basis points
    #[serde(default)]
    pub max_slippage_bps: f64,

    /// e.g. "15m", "4h"
    #[serde(default)]
    pub hold_duration: String,

    #[serde(default)]
    pub exit_conditions: Vec<String>,

    /// Model confidence (0..1)
    #[serde(default)]
    pub confidence: f64,

    #[serde(default)]
    pub reasoning: String,

    #[serde(default)]
    pub risk_assessment: String,
}

impl TradingDecision {
    /// Safe no-op decision used when model output cannot be trusted
    pub fn hold(symbol: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action: TradingAction::Hold,
            symbol: symbol.into(),
            side: String::new(),
            size: 0.0,
            size_percent: 0.0,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            order_type: String::new(),
            time_in_force: String::new(),
            max_slippage_bps: 0.0,
            hold_duration: String::new(),
            exit_conditions: vec![],
            confidence: 0.0,
            reasoning: reasoning.into(),
            risk_assessment: String::new(),
        }
    }
}

/// Persisted record of one brain decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub strategy: String,
    pub symbol: String,

    /// Market snapshot the decision was based on
    pub market_state: Value,

    pub decision: TradingDecision,

    /// Raw reasoning text from the model
    pub reasoning: String,

    pub confidence: f64,
    pub model: String,
    pub tokens_used: u32,

    #[serde(default)]
    pub outcome: DecisionOutcome,

    /// Realized profit/loss
    #[serde(default)]
    pub pnl: Decimal,

    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// One reasoning step input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningRequest {
    /// Strategy name selecting the prompt template and tool set
    pub strategy: String,

    pub symbol: String,

    pub market_state: Value,

    pub portfolio_state: Value,

    #[serde(default)]
    pub prior_decision: Option<TradingDecision>,

    /// Free-form caller context appended to the prompt
    #[serde(default)]
    pub context: String,
}

/// One reasoning step output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningResponse {
    pub decision: TradingDecision,
    pub reasoning: String,
    pub confidence: f64,
    pub latency_ms: u64,
    pub model: String,
    pub tokens_used: u32,
}

/// Published signal label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Buy,
    Sell,
    StrongBuy,
    StrongSell,
    Hold,
}

/// A per-symbol trading signal with a short shelf life
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSignal {
    pub symbol: String,
    pub kind: SignalKind,
    pub confidence: f64,
    pub reasoning: String,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TradingSignal {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}
