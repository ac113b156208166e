//! Signal processor
//!
//! Drives the brain on a timer, one pass per configured symbol, and keeps
//! the freshest non-expired signal per symbol.

use crate::brain::TradingBrain;
use crate::prompts::STRATEGY_SIGNAL_GENERATION;
use crate::types::{ReasoningRequest, SignalKind, TradingAction, TradingSignal};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Signal processor tuning knobs
#[derive(Debug, Clone)]
pub struct SignalConfig {
    /// Symbols scanned each iteration
    pub symbols: Vec<String>,

    /// Time between iterations
    pub interval: Duration,

    /// Signals below this confidence are discarded
    pub min_confidence: f64,

    /// Confidence at which buy/sell become strong variants
    pub strong_threshold: f64,

    /// Signal shelf life
    pub expiry: Duration,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            symbols: vec![],
            interval: Duration::from_secs(30),
            min_confidence: 0.75,
            strong_threshold: 0.85,
            expiry: Duration::from_secs(5 * 60),
        }
    }
}

/// Periodic per-symbol signal emission via the brain
pub struct SignalProcessor {
    brain: Arc<TradingBrain>,
    config: SignalConfig,
    signals: RwLock<HashMap<String, TradingSignal>>,
}

impl SignalProcessor {
    pub fn new(brain: Arc<TradingBrain>, config: SignalConfig) -> Self {
        Self {
            brain,
            config,
            signals: RwLock::new(HashMap::new()),
        }
    }

    /// Run until cancelled. The in-flight iteration finishes before return.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("signal processor shutting down");
                    return;
                }
                _ = interval.tick() => {
                    self.run_once().await;
                }
            }
        }
    }

    /// One full pass over the configured symbols
    pub async fn run_once(&self) {
        for symbol in &self.config.symbols {
            match self.generate_for(symbol).await {
                Some(signal) => {
                    debug!(
                        symbol = %signal.symbol,
                        kind = ?signal.kind,
                        confidence = signal.confidence,
                        "signal published"
                    );
                    self.signals
                        .write()
                        .await
                        .insert(symbol.clone(), signal);
                }
                None => {}
            }
        }
    }

    async fn generate_for(&self, symbol: &str) -> Option<TradingSignal> {
        let request = ReasoningRequest {
            strategy: STRATEGY_SIGNAL_GENERATION.to_string(),
            symbol: symbol.to_string(),
            market_state: json!({"symbol": symbol}),
            portfolio_state: json!({}),
            prior_decision: None,
            context: String::new(),
        };

        let response = match self.brain.reason(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("signal generation failed for {}: {}", symbol, e);
                return None;
            }
        };

        if response.decision.confidence < self.config.min_confidence {
            return None;
        }

        let strong = response.decision.confidence >= self.config.strong_threshold;
        let kind = match response.decision.action {
            TradingAction::Buy | TradingAction::Scalp => {
                if strong {
                    SignalKind::StrongBuy
                } else {
                    SignalKind::Buy
                }
            }
            TradingAction::Sell | TradingAction::Close => {
                if strong {
                    SignalKind::StrongSell
                } else {
                    SignalKind::Sell
                }
            }
            // hold is never published
            TradingAction::Hold | TradingAction::Arbitrage => return None,
        };

        let now = Utc::now();
        Some(TradingSignal {
            symbol: symbol.to_string(),
            kind,
            confidence: response.decision.confidence,
            reasoning: response.decision.reasoning.clone(),
            generated_at: now,
            expires_at: now
                + chrono::Duration::from_std(self.config.expiry)
                    .unwrap_or_else(|_| chrono::Duration::minutes(5)),
        })
    }

    /// Freshest signal for a symbol, if still live
    pub async fn latest_signal(&self, symbol: &str) -> Option<TradingSignal> {
        let signals = self.signals.read().await;
        signals
            .get(symbol)
            .filter(|s| s.is_live(Utc::now()))
            .cloned()
    }

    /// All live signals
    pub async fn all_signals(&self) -> Vec<TradingSignal> {
        let now = Utc::now();
        self.signals
            .read()
            .await
            .values()
            .filter(|s| s.is_live(now))
            .cloned()
            .collect()
    }
}
