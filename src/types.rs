// =============================================================================
// Shared types used across the Brain
// =============================================================================

use serde::{Deserialize, Serialize};

/// The side of a requested position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl Side {
    /// `BUY -> 1, SELL -> -1`, the single point where the bus-facing
    /// numeric direction is derived from the internal enum.
    pub fn direction(self) -> i8 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// A trading-strategy phase. `Manual` identifies operator-submitted intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseId {
    #[serde(rename = "p1")]
    P1,
    #[serde(rename = "p2")]
    P2,
    #[serde(rename = "p3")]
    P3,
    #[serde(rename = "manual")]
    Manual,
}

impl std::fmt::Display for PhaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P1 => write!(f, "p1"),
            Self::P2 => write!(f, "p2"),
            Self::P3 => write!(f, "p3"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

impl PhaseId {
    pub fn all_allocated() -> [PhaseId; 3] {
        [PhaseId::P1, PhaseId::P2, PhaseId::P3]
    }

    /// Every phase, including `Manual` — used where a component must cover
    /// every possible fill attribution (e.g. startup rehydration).
    pub fn all() -> [PhaseId; 4] {
        [PhaseId::P1, PhaseId::P2, PhaseId::P3, PhaseId::Manual]
    }
}

/// Tagged veto/approval reason attached to every Decision.
///
/// Replaces the dynamic-shape decision payloads the source used — see the
/// Signal Arbitrator pipeline for which step produces each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionReason {
    Approved,
    ApprovedReduced,
    Breaker,
    LeverageCap,
    Correlation,
    TailRisk,
    Regime,
    WeightZero,
    InsufficientEquity,
    Duplicate,
    Timeout,
    StoreUnavailable,
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Approved => "APPROVED",
            Self::ApprovedReduced => "APPROVED_REDUCED",
            Self::Breaker => "BREAKER",
            Self::LeverageCap => "LEVERAGE_CAP",
            Self::Correlation => "CORRELATION",
            Self::TailRisk => "TAIL_RISK",
            Self::Regime => "REGIME",
            Self::WeightZero => "WEIGHT_ZERO",
            Self::InsufficientEquity => "INSUFFICIENT_EQUITY",
            Self::Duplicate => "DUPLICATE",
            Self::Timeout => "TIMEOUT",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
        };
        write!(f, "{s}")
    }
}

impl DecisionReason {
    pub fn is_approval(self) -> bool {
        matches!(self, Self::Approved | Self::ApprovedReduced)
    }
}
