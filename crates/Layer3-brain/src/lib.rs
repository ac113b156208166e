//! # trademind-brain
//!
//! AI trading brain for TradeMind:
//! - Brain: 전략별 프롬프트 구성 + 추론 호출 + 의사결정 파싱
//! - Learning: 의사결정 기록/성과 집계 저장소
//! - Signal: 주기적 심볼별 시그널 생성

pub mod brain;
pub mod learning;
pub mod prompts;
pub mod signal;
pub mod types;

// ============================================================================
// Brain
// ============================================================================
pub use brain::{BrainConfig, TradingBrain};

// ============================================================================
// Learning store
// ============================================================================
pub use learning::{InsightReport, LearningStore, StrategyPerformance};

// ============================================================================
// Signal processor
// ============================================================================
pub use signal::{SignalConfig, SignalProcessor};

// ============================================================================
// Types
// ============================================================================
pub use types::{
    DecisionOutcome, DecisionRecord, ReasoningRequest, ReasoningResponse, SignalKind,
    TradingAction, TradingDecision, TradingSignal,
};
