//! Learning store
//!
//! 의사결정 기록과 (전략, 심볼) 성과 집계. 레코드는 파일당 하나의 JSON으로
//! 저장된다 (`decision_<id>.json`).

use crate::types::{DecisionOutcome, DecisionRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::debug;
use trademind_foundation::{Error, JsonStore, Result};

/// Running performance aggregate per (strategy, symbol)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub strategy: String,
    pub symbol: String,
    pub total: u64,
    pub wins: u64,
    pub win_rate: f64,
    pub total_pnl: Decimal,
    pub avg_pnl: Decimal,
}

impl StrategyPerformance {
    fn new(strategy: &str, symbol: &str) -> Self {
        Self {
            strategy: strategy.to_string(),
            symbol: symbol.to_string(),
            total: 0,
            wins: 0,
            win_rate: 0.0,
            total_pnl: Decimal::ZERO,
            avg_pnl: Decimal::ZERO,
        }
    }

    fn record(&mut self, outcome: DecisionOutcome, pnl: Decimal) {
        self.total += 1;
        if outcome == DecisionOutcome::Win {
            self.wins += 1;
        }
        self.win_rate = self.wins as f64 / self.total as f64;
        self.total_pnl += pnl;
        self.avg_pnl = self.total_pnl / Decimal::from(self.total);
    }
}

/// Aggregated view over a symbol's recorded outcomes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightReport {
    pub symbol: String,
    pub total_decisions: u64,
    pub wins: u64,
    pub losses: u64,
    pub win_rate: f64,
    pub total_pnl: Decimal,
    pub avg_pnl: Decimal,
    pub recommendation: String,
}

/// Decision history with per-record file persistence.
///
/// Records and aggregates sit behind separate locks; readers of one never
/// block writers of the other.
pub struct LearningStore {
    records: RwLock<HashMap<String, DecisionRecord>>,
    performance: RwLock<HashMap<(String, String), StrategyPerformance>>,
    store: JsonStore,
}

impl LearningStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            performance: RwLock::new(HashMap::new()),
            store: JsonStore::new(data_dir),
        }
    }

    /// Rehydrate previously persisted records
    pub fn load(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let store = JsonStore::new(data_dir);
        let mut records = HashMap::new();

        for filename in store.list()? {
            if !filename.starts_with("decision_") || !filename.ends_with(".json") {
                continue;
            }
            let record: DecisionRecord = store.load(&filename)?;
            records.insert(record.id.clone(), record);
        }
        debug!(count = records.len(), "learning store loaded from disk");

        Ok(Self {
            records: RwLock::new(records),
            performance: RwLock::new(HashMap::new()),
            store,
        })
    }

    fn filename(id: &str) -> String {
        format!("decision_{}.json", id)
    }

    /// Insert and persist a decision record
    pub async fn record_decision(&self, record: DecisionRecord) -> Result<()> {
        self.store.save(&Self::filename(&record.id), &record)?;
        self.records
            .write()
            .await
            .insert(record.id.clone(), record);
        Ok(())
    }

    /// Most recent decisions for a symbol that already have an outcome,
    /// newest first, truncated to `limit`
    pub async fn similar_decisions(&self, symbol: &str, limit: usize) -> Vec<DecisionRecord> {
        let records = self.records.read().await;
        let mut matching: Vec<DecisionRecord> = records
            .values()
            .filter(|r| r.symbol == symbol && r.outcome.is_recorded())
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matching.truncate(limit);
        matching
    }

    /// Record the realized outcome of an earlier decision.
    /// Unknown IDs return `Error::NotFound`.
    pub async fn record_outcome(
        &self,
        decision_id: &str,
        outcome: DecisionOutcome,
        pnl: Decimal,
    ) -> Result<()> {
        let updated = {
            let mut records = self.records.write().await;
            let record = records
                .get_mut(decision_id)
                .ok_or_else(|| Error::NotFound(format!("decision '{}'", decision_id)))?;

            record.outcome = outcome;
            record.pnl = pnl;
            record.completed_at = Some(chrono::Utc::now());
            record.clone()
        };

        {
            let mut performance = self.performance.write().await;
            performance
                .entry((updated.strategy.clone(), updated.symbol.clone()))
                .or_insert_with(|| StrategyPerformance::new(&updated.strategy, &updated.symbol))
                .record(outcome, pnl);
        }

        self.store.save(&Self::filename(decision_id), &updated)
    }

    /// Aggregate for one (strategy, symbol) pair
    pub async fn performance(&self, strategy: &str, symbol: &str) -> Option<StrategyPerformance> {
        self.performance
            .read()
            .await
            .get(&(strategy.to_string(), symbol.to_string()))
            .cloned()
    }

    /// Totals, win rate, PnL, and a recommendation for a symbol
    pub async fn insights(&self, symbol: &str) -> InsightReport {
        let records = self.records.read().await;
        let completed: Vec<&DecisionRecord> = records
            .values()
            .filter(|r| r.symbol == symbol && r.outcome.is_recorded())
            .collect();

        let total = completed.len() as u64;
        let wins = completed
            .iter()
            .filter(|r| r.outcome == DecisionOutcome::Win)
            .count() as u64;
        let losses = completed
            .iter()
            .filter(|r| r.outcome == DecisionOutcome::Loss)
            .count() as u64;
        let total_pnl: Decimal = completed.iter().map(|r| r.pnl).sum();

        let win_rate = if total > 0 {
            wins as f64 / total as f64
        } else {
            0.0
        };
        let avg_pnl = if total > 0 {
            total_pnl / Decimal::from(total)
        } else {
            Decimal::ZERO
        };

        InsightReport {
            symbol: symbol.to_string(),
            total_decisions: total,
            wins,
            losses,
            win_rate,
            total_pnl,
            avg_pnl,
            recommendation: recommendation(win_rate).to_string(),
        }
    }

    /// Number of records currently held
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn recommendation(win_rate: f64) -> &'static str {
    if win_rate > 0.70 {
        "Strategy is performing well; scale up position sizes gradually"
    } else if win_rate > 0.55 {
        "Hold course; the edge is real but thin"
    } else if win_rate > 0.40 {
        "Tune entry filters before risking more capital"
    } else {
        "Pause this strategy and review recent losing decisions"
    }
}
