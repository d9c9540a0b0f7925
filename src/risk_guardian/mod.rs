// =============================================================================
// Risk Guardian — portfolio-level leverage, correlation, delta, tail-risk veto
// =============================================================================
//
// Five ordered checks, first binding rule wins — the same sequential
// early-return gate shape as `InsuranceGate::check_all`, generalised from
// per-trade heuristics to portfolio-level risk state.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

use crate::allocation::Tier;
use crate::config::catalog::keys;
use crate::config::ConfigRegistry;
use crate::error::RiskVetoReason;
use crate::types::Side;

/// A currently open position tracked for portfolio-level checks.
#[derive(Debug, Clone, Serialize)]
pub struct OpenPosition {
    pub symbol: String,
    pub side: Side,
    pub notional: f64,
}

/// The most recently computed correlation matrix snapshot, keyed by an
/// unordered symbol pair.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CorrelationSnapshot {
    pairs: HashMap<(String, String), f64>,
    pub computed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl CorrelationSnapshot {
    fn pair_key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    pub fn set(&mut self, a: &str, b: &str, rho: f64) {
        self.pairs.insert(Self::pair_key(a, b), rho);
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        self.pairs.get(&Self::pair_key(a, b)).copied()
    }
}

/// Portfolio-level risk inputs (spec §3 "Risk state"), refreshed by the
/// correlation-refresh and portfolio-beta-refresh tasks and by inbound
/// regime/tail-risk bus events.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PortfolioRiskState {
    pub open_positions: Vec<OpenPosition>,
    pub correlation: CorrelationSnapshot,
    pub portfolio_delta: f64,
    pub portfolio_beta: f64,
    pub hill_alpha: f64,
    pub regime_expanding: bool,
}

/// A prospective position submitted to the guardian (spec §4.4 "Inputs").
#[derive(Debug, Clone)]
pub struct Candidate {
    pub symbol: String,
    pub side: Side,
    pub candidate_notional: f64,
    pub equity: f64,
    pub tier: Tier,
    pub regime_sensitive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Outcome {
    Approved,
    ApprovedReduced,
}

#[derive(Debug, Clone)]
pub struct GuardianResult {
    pub outcome: Outcome,
    pub authorized_notional: f64,
}

pub struct RiskGuardian {
    state: RwLock<PortfolioRiskState>,
}

impl RiskGuardian {
    pub fn new() -> Self {
        Self { state: RwLock::new(PortfolioRiskState::default()) }
    }

    pub fn snapshot(&self) -> PortfolioRiskState {
        self.state.read().clone()
    }

    pub fn update<F: FnOnce(&mut PortfolioRiskState)>(&self, f: F) {
        f(&mut self.state.write());
    }

    /// Apply the five ordered checks to `candidate`. Never blocks on
    /// recomputing the correlation/beta snapshot — it reads whatever is
    /// cached.
    pub fn evaluate(
        &self,
        candidate: &Candidate,
        config: &ConfigRegistry,
    ) -> Result<GuardianResult, RiskVetoReason> {
        let state = self.state.read();

        // 1. Tail-risk veto.
        let alpha_floor = config.get_f64(keys::RISK_ALPHA_VETO_THRESHOLD);
        if state.hill_alpha > 0.0 && state.hill_alpha < alpha_floor {
            return Err(RiskVetoReason::TailRisk);
        }

        // 2. Regime veto.
        if state.regime_expanding && candidate.regime_sensitive {
            return Err(RiskVetoReason::Regime);
        }

        // 5 (evaluated early so 3/4 can see the hedge exemption). Determine
        // how much of the candidate notional strictly reduces |portfolio
        // delta| and is therefore exempt from checks 3 and 4.
        let signed_candidate = candidate.candidate_notional * candidate.side.direction() as f64;
        let post_delta = state.portfolio_delta + signed_candidate;
        let hedges = post_delta.abs() < state.portfolio_delta.abs();
        let exempt_notional = if hedges {
            // The portion that brings |delta| to exactly zero is exempt;
            // any excess beyond that still needs the leverage/correlation
            // checks because it starts building delta in the new direction.
            candidate.candidate_notional.min(state.portfolio_delta.abs())
        } else {
            0.0
        };
        let checked_notional = candidate.candidate_notional - exempt_notional;

        let mut authorized = candidate.candidate_notional;
        let mut reduced = false;

        if checked_notional > 0.0 {
            // 3. Leverage cap.
            let existing: f64 = state.open_positions.iter().map(|p| p.notional.abs()).sum();
            let max_leverage = candidate.tier.max_leverage();
            let projected_leverage = (existing + checked_notional) / candidate.equity.max(f64::EPSILON);

            if projected_leverage > max_leverage {
                let max_checked = (max_leverage * candidate.equity - existing).max(0.0);
                let new_authorized = exempt_notional + max_checked;
                let floor = config.get_f64(keys::RISK_MIN_POSITION_FLOOR);
                if new_authorized < floor {
                    return Err(RiskVetoReason::LeverageCap);
                }
                authorized = new_authorized;
                reduced = true;
            }

            // 4. Correlation guard — evaluated against the (possibly
            // already-reduced) checked portion.
            let max_corr = config.get_f64(keys::RISK_MAX_CORRELATION);
            let same_side_corr = state
                .open_positions
                .iter()
                .filter(|p| p.side == candidate.side)
                .filter_map(|p| state.correlation.get(&candidate.symbol, &p.symbol))
                .map(f64::abs)
                .fold(0.0_f64, f64::max);

            if same_side_corr > max_corr {
                let penalty = config.get_f64(keys::RISK_CORRELATION_PENALTY);
                let checked_part = authorized - exempt_notional;
                let penalized = exempt_notional + checked_part * penalty;
                let floor = config.get_f64(keys::RISK_MIN_POSITION_FLOOR);
                if penalized < floor {
                    return Err(RiskVetoReason::Correlation);
                }
                authorized = penalized;
                reduced = true;
            }
        }

        Ok(GuardianResult {
            outcome: if reduced { Outcome::ApprovedReduced } else { Outcome::Approved },
            authorized_notional: authorized,
        })
    }
}

impl Default for RiskGuardian {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::catalog::seed;

    fn registry() -> ConfigRegistry {
        ConfigRegistry::new(seed(), b"s".to_vec()).unwrap()
    }

    fn candidate(notional: f64, equity: f64, tier: Tier) -> Candidate {
        Candidate {
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            candidate_notional: notional,
            equity,
            tier,
            regime_sensitive: false,
        }
    }

    #[test]
    fn approves_within_leverage_cap() {
        let reg = registry();
        let guardian = RiskGuardian::new();
        let result = guardian.evaluate(&candidate(200.0, 800.0, Tier::Micro), &reg).unwrap();
        assert_eq!(result.outcome, Outcome::Approved);
        assert_eq!(result.authorized_notional, 200.0);
    }

    #[test]
    fn reduces_when_leverage_cap_exceeded() {
        let reg = registry();
        let guardian = RiskGuardian::new();
        // equity 100, tier Institutional cap 2x -> max notional 200.
        let result = guardian
            .evaluate(&candidate(500.0, 100.0, Tier::Institutional), &reg)
            .unwrap();
        assert_eq!(result.outcome, Outcome::ApprovedReduced);
        assert!((result.authorized_notional - 200.0).abs() < 1e-6);
    }

    #[test]
    fn vetoes_when_reduced_below_floor() {
        let reg = registry();
        let guardian = RiskGuardian::new();
        let result = guardian.evaluate(&candidate(5000.0, 10.0, Tier::Institutional), &reg);
        assert_eq!(result.unwrap_err(), RiskVetoReason::LeverageCap);
    }

    #[test]
    fn tail_risk_veto_fires_first() {
        let reg = registry();
        let guardian = RiskGuardian::new();
        guardian.update(|s| s.hill_alpha = 1.0);
        let result = guardian.evaluate(&candidate(50.0, 10000.0, Tier::Medium), &reg);
        assert_eq!(result.unwrap_err(), RiskVetoReason::TailRisk);
    }

    #[test]
    fn correlation_guard_not_penalized_at_exact_boundary() {
        let reg = registry();
        let guardian = RiskGuardian::new();
        guardian.update(|s| {
            s.open_positions.push(OpenPosition { symbol: "ETHUSDT".into(), side: Side::Buy, notional: 100.0 });
            s.correlation.set("BTCUSDT", "ETHUSDT", 0.8);
        });
        let result = guardian.evaluate(&candidate(50.0, 10000.0, Tier::Medium), &reg).unwrap();
        assert_eq!(result.outcome, Outcome::Approved);
    }

    #[test]
    fn correlation_guard_penalizes_above_threshold() {
        let reg = registry();
        let guardian = RiskGuardian::new();
        guardian.update(|s| {
            s.open_positions.push(OpenPosition { symbol: "ETHUSDT".into(), side: Side::Buy, notional: 100.0 });
            s.correlation.set("BTCUSDT", "ETHUSDT", 0.9);
        });
        let result = guardian.evaluate(&candidate(100.0, 10000.0, Tier::Medium), &reg).unwrap();
        assert_eq!(result.outcome, Outcome::ApprovedReduced);
        assert!((result.authorized_notional - 50.0).abs() < 1e-6);
    }
}
