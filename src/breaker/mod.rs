// =============================================================================
// Circuit Breaker — emergency-halt state machine
// =============================================================================
//
// Restructured from the source's four flat ad-hoc breakers (`risk.rs`'s
// Daily Loss / Consecutive Losses / Max Drawdown / Trade Limit) into the
// spec's two-tier INACTIVE/SOFT_HALTED/HARD_HALTED machine. The
// double-checked-locking date-rollover idiom from `maybe_reset_daily`
// becomes the cooldown-expiry check here.
// =============================================================================

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::catalog::keys;
use crate::config::ConfigRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Inactive,
    SoftHalted,
    HardHalted,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Inactive => "INACTIVE",
            Self::SoftHalted => "SOFT_HALTED",
            Self::HardHalted => "HARD_HALTED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerEvent {
    pub prev: BreakerState,
    pub next: BreakerState,
    pub reason: String,
    pub equity: f64,
    pub operator_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

struct Inner {
    state: BreakerState,
    triggered_at: Option<DateTime<Utc>>,
    cooldown_until: Option<DateTime<Utc>>,
    consecutive_losses: u32,
    loss_timestamps: VecDeque<DateTime<Utc>>,
    reason: Option<String>,
    daily_peak_equity: f64,
    daily_date: String,
}

pub struct CircuitBreaker {
    inner: RwLock<Inner>,
    events: RwLock<Vec<BreakerEvent>>,
}

impl CircuitBreaker {
    pub fn new(initial_equity: f64) -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: BreakerState::Inactive,
                triggered_at: None,
                cooldown_until: None,
                consecutive_losses: 0,
                loss_timestamps: VecDeque::new(),
                reason: None,
                daily_peak_equity: initial_equity,
                daily_date: Utc::now().format("%Y-%m-%d").to_string(),
            }),
            events: RwLock::new(Vec::new()),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.sweep_cooldown();
        self.inner.read().state
    }

    pub fn events(&self) -> Vec<BreakerEvent> {
        self.events.read().clone()
    }

    fn transition(&self, next: BreakerState, reason: &str, equity: f64, operator_id: Option<String>) {
        let mut inner = self.inner.write();
        let prev = inner.state;
        if prev == next {
            return;
        }
        inner.state = next;
        match next {
            BreakerState::SoftHalted | BreakerState::HardHalted => {
                inner.triggered_at = Some(Utc::now());
                inner.reason = Some(reason.to_string());
            }
            BreakerState::Inactive => {
                inner.triggered_at = None;
                inner.cooldown_until = None;
                inner.reason = None;
                inner.consecutive_losses = 0;
                inner.loss_timestamps.clear();
            }
        }
        drop(inner);

        self.events.write().push(BreakerEvent {
            prev,
            next,
            reason: reason.to_string(),
            equity,
            operator_id,
            timestamp: Utc::now(),
        });
    }

    /// Exit SOFT_HALTED automatically once the cooldown has elapsed.
    fn sweep_cooldown(&self) {
        let should_clear = {
            let inner = self.inner.read();
            inner.state == BreakerState::SoftHalted
                && inner.cooldown_until.map(|c| c < Utc::now()).unwrap_or(false)
        };
        if should_clear {
            let equity = self.inner.read().daily_peak_equity;
            self.transition(BreakerState::Inactive, "cooldown elapsed", equity, None);
        }
    }

    /// Record a terminal trade outcome; may trip SOFT_HALTED.
    pub fn record_trade_result(&self, pnl: f64, equity: f64, config: &ConfigRegistry) {
        self.maybe_reset_daily(equity);
        self.sweep_cooldown();

        let window = chrono::Duration::seconds(config.get_i64(keys::BREAKER_CONSECUTIVE_LOSS_WINDOW_SECS));
        let limit = config.get_i64(keys::BREAKER_CONSECUTIVE_LOSS_LIMIT) as u32;

        {
            let mut inner = self.inner.write();
            let now = Utc::now();
            if pnl < 0.0 {
                inner.loss_timestamps.push_back(now);
            } else {
                inner.loss_timestamps.clear();
            }
            let cutoff = now - window;
            while inner.loss_timestamps.front().map(|t| *t < cutoff).unwrap_or(false) {
                inner.loss_timestamps.pop_front();
            }
            inner.consecutive_losses = inner.loss_timestamps.len() as u32;
        }

        self.check_equity_halts(equity, config);

        let tripped = self.inner.read().consecutive_losses >= limit
            && self.inner.read().state == BreakerState::Inactive;
        if tripped {
            let cooldown_secs = config.get_i64(keys::BREAKER_SOFT_COOLDOWN_SECS);
            self.inner.write().cooldown_until = Some(Utc::now() + chrono::Duration::seconds(cooldown_secs));
            self.transition(
                BreakerState::SoftHalted,
                &format!("{limit} consecutive losses within window"),
                equity,
                None,
            );
        }
    }

    /// Re-evaluate the hard-halt conditions against the latest equity
    /// report (daily drawdown fraction, minimum equity floor).
    pub fn check_equity_halts(&self, equity: f64, config: &ConfigRegistry) {
        self.maybe_reset_daily(equity);

        let min_equity = config.get_f64(keys::BREAKER_MIN_EQUITY);
        let max_drawdown = config.get_f64(keys::BREAKER_MAX_DAILY_DRAWDOWN);

        let drawdown_frac = {
            let mut inner = self.inner.write();
            if equity > inner.daily_peak_equity {
                inner.daily_peak_equity = equity;
            }
            if inner.daily_peak_equity > 0.0 {
                (inner.daily_peak_equity - equity) / inner.daily_peak_equity
            } else {
                0.0
            }
        };

        if equity <= min_equity {
            self.transition(BreakerState::HardHalted, "equity at or below minimum", equity, None);
        } else if drawdown_frac >= max_drawdown {
            self.transition(BreakerState::HardHalted, "daily drawdown at or above limit", equity, None);
        }
    }

    fn maybe_reset_daily(&self, equity: f64) {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        {
            let inner = self.inner.read();
            if inner.daily_date == today {
                return;
            }
        }
        let mut inner = self.inner.write();
        if inner.daily_date != today {
            inner.daily_date = today;
            inner.daily_peak_equity = equity;
        }
    }

    /// Authenticated operator reset out of HARD_HALTED.
    pub fn operator_reset(&self, operator_id: &str, equity: f64) -> Result<(), String> {
        if self.inner.read().state != BreakerState::HardHalted {
            return Err("breaker is not hard-halted".to_string());
        }
        self.transition(BreakerState::Inactive, "operator reset", equity, Some(operator_id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::catalog::seed;

    fn registry() -> ConfigRegistry {
        ConfigRegistry::new(seed(), b"s".to_vec()).unwrap()
    }

    #[test]
    fn s5_hard_breaker_on_min_equity() {
        let reg = registry();
        let breaker = CircuitBreaker::new(1000.0);
        breaker.check_equity_halts(140.0, &reg);
        assert_eq!(breaker.state(), BreakerState::HardHalted);
    }

    #[test]
    fn hard_halt_requires_operator_reset() {
        let reg = registry();
        let breaker = CircuitBreaker::new(1000.0);
        breaker.check_equity_halts(140.0, &reg);
        assert_eq!(breaker.state(), BreakerState::HardHalted);
        breaker.operator_reset("op1", 140.0).unwrap();
        assert_eq!(breaker.state(), BreakerState::Inactive);
    }

    #[test]
    fn soft_halt_after_consecutive_losses() {
        let reg = registry();
        let breaker = CircuitBreaker::new(1000.0);
        for _ in 0..3 {
            breaker.record_trade_result(-10.0, 970.0, &reg);
        }
        assert_eq!(breaker.state(), BreakerState::SoftHalted);
    }

    #[test]
    fn hard_halt_cannot_be_cleared_by_cooldown() {
        let reg = registry();
        let breaker = CircuitBreaker::new(1000.0);
        breaker.check_equity_halts(140.0, &reg);
        assert_eq!(breaker.state(), BreakerState::HardHalted);
        // No cooldown mechanism applies to HARD_HALTED; only operator_reset exits it.
        assert_eq!(breaker.state(), BreakerState::HardHalted);
    }
}
