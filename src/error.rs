// =============================================================================
// Error taxonomy and the centralized retry combinator
// =============================================================================
//
// `BrainError` is the closed error enum returned at component boundaries; it
// maps 1:1 onto the error kinds the core surfaces. Call sites above a
// component boundary wrap these with `anyhow::Context` the way `reconcile.rs`
// and `execution.rs` do for Binance calls.
//
// `with_backoff` replaces the scattered `loop { ... sleep ... }` retry sites
// the source used for every outbound call with one parameterized combinator.
// =============================================================================

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::types::DecisionReason;

/// Veto reasons produced by the Risk Guardian (a subset of `DecisionReason`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskVetoReason {
    TailRisk,
    Regime,
    LeverageCap,
    Correlation,
}

impl From<RiskVetoReason> for DecisionReason {
    fn from(r: RiskVetoReason) -> Self {
        match r {
            RiskVetoReason::TailRisk => DecisionReason::TailRisk,
            RiskVetoReason::Regime => DecisionReason::Regime,
            RiskVetoReason::LeverageCap => DecisionReason::LeverageCap,
            RiskVetoReason::Correlation => DecisionReason::Correlation,
        }
    }
}

/// The closed error taxonomy surfaced by the core (spec §7).
#[derive(Debug, Error)]
pub enum BrainError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("duplicate signal_id {0}")]
    Duplicate(String),

    #[error("safety violation: {0}")]
    SafetyViolation(String),

    #[error("breaker halted: {0}")]
    Breaker(String),

    #[error("risk veto: {0:?}")]
    RiskVeto(RiskVetoReason),

    #[error("intent exceeded processing deadline")]
    Timeout,

    #[error("bus operation failed: {0}")]
    TransientBus(String),

    #[error("relational store operation failed: {0}")]
    TransientStore(String),

    #[error("fatal invariant breach: {0}")]
    Fatal(String),
}

impl BrainError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientBus(_) | Self::TransientStore(_))
    }
}

/// Exponential-backoff retry policy.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_retries: u32,
}

impl BackoffPolicy {
    pub const fn new(base_delay: Duration, multiplier: f64, max_retries: u32) -> Self {
        Self {
            base_delay,
            multiplier,
            max_retries,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let scale = self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(self.base_delay.as_secs_f64() * scale)
    }
}

/// Default policy for bus publish retries (spec §5: "outbound publishes
/// carry a per-call timeout ... retried with exponential backoff up to
/// `publish_max_retries`").
pub const PUBLISH_BACKOFF: BackoffPolicy =
    BackoffPolicy::new(Duration::from_millis(200), 2.0, 5);

/// Default policy for Capital Flow Manager sweep-execution retries
/// (spec §4.5: `max_retries` default 3).
pub const SWEEP_BACKOFF: BackoffPolicy = BackoffPolicy::new(Duration::from_millis(500), 2.0, 3);

/// Default policy for decision-log dedup lookups (spec §7 TRANSIENT_STORE):
/// a lookup failure is retried a few times before the intent is vetoed as
/// `STORE_UNAVAILABLE` rather than mislabeled `DUPLICATE`.
pub const DECISION_LOG_BACKOFF: BackoffPolicy = BackoffPolicy::new(Duration::from_millis(100), 2.0, 3);

/// Run `op` with exponential backoff, retrying only while `retryable`
/// returns true and the retry budget is not exhausted.
pub async fn with_backoff<T, E, F, Fut, R>(
    mut op: F,
    policy: BackoffPolicy,
    retryable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt >= policy.max_retries || !retryable(&e) {
                    return Err(e);
                }
                let delay = policy.delay_for(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
