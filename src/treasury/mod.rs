// =============================================================================
// Capital Flow Manager — high-watermark tracking and profit-sweep scheduling
// =============================================================================
//
// `maybe_sweep` is re-entrant-safe: both the cadence trigger and the
// watermark trigger call the same entry point, which takes the treasury
// mutex and recomputes against current state (DESIGN.md Open Question
// decision 2), rather than each trigger keeping its own retry state.
// =============================================================================

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::catalog::keys;
use crate::config::ConfigRegistry;

#[derive(Debug, Clone, Serialize)]
pub struct TreasuryState {
    pub futures_wallet: Decimal,
    pub spot_wallet: Decimal,
    pub high_watermark: Decimal,
    pub total_swept: Decimal,
}

impl TreasuryState {
    /// Total equity backing allocation/risk/breaker decisions — futures and
    /// spot wallets combined, the single definition every consumer shares.
    pub fn equity(&self) -> Decimal {
        self.futures_wallet + self.spot_wallet
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SweepStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepRecord {
    pub id: uuid::Uuid,
    pub amount: Decimal,
    pub status: SweepStatus,
    pub error: Option<String>,
}

/// A movement request the executor must carry out: move `amount` from
/// futures to spot. The Brain never performs the transfer itself.
#[derive(Debug, Clone, Serialize)]
pub struct SweepRequest {
    pub id: uuid::Uuid,
    pub amount: Decimal,
}

struct Inner {
    treasury: TreasuryState,
    in_flight: Option<SweepRecord>,
}

pub struct CapitalFlowManager {
    inner: Mutex<Inner>,
}

impl CapitalFlowManager {
    pub fn new(futures_wallet: Decimal, spot_wallet: Decimal, reserve_floor: Decimal) -> Self {
        let high_watermark = futures_wallet.max(reserve_floor);
        Self {
            inner: Mutex::new(Inner {
                treasury: TreasuryState {
                    futures_wallet,
                    spot_wallet,
                    high_watermark,
                    total_swept: Decimal::ZERO,
                },
                in_flight: None,
            }),
        }
    }

    pub fn state(&self) -> TreasuryState {
        self.inner.lock().treasury.clone()
    }

    pub fn rehydrate(&self, treasury: TreasuryState) {
        self.inner.lock().treasury = treasury;
    }

    /// Apply a fill/balance report that changes the futures wallet balance
    /// (e.g. realized PnL crediting the futures account).
    pub fn apply_futures_delta(&self, delta: Decimal) {
        let mut inner = self.inner.lock();
        inner.treasury.futures_wallet += delta;
        if inner.treasury.futures_wallet > inner.treasury.high_watermark {
            inner.treasury.high_watermark = inner.treasury.futures_wallet;
        }
    }

    /// Evaluate whether a sweep should fire right now, under whichever
    /// trigger called it (schedule tick or watermark-increase tick). Returns
    /// `Some(request)` if the executor should move funds; the caller is
    /// responsible for reporting the outcome via `complete_sweep`.
    pub fn maybe_sweep(&self, config: &ConfigRegistry) -> Option<SweepRequest> {
        let mut inner = self.inner.lock();

        if inner.in_flight.is_some() {
            // Another trigger's sweep is still being retried; no-op.
            return None;
        }

        let threshold_frac = config.get_f64(keys::TREASURY_SWEEP_THRESHOLD_FRAC);
        let reserve_floor = Decimal::from_f64_retain(config.get_f64(keys::TREASURY_RESERVE_FLOOR))
            .unwrap_or(Decimal::ZERO);

        let excess = inner.treasury.futures_wallet - inner.treasury.high_watermark;
        if excess <= Decimal::ZERO {
            return None;
        }

        let threshold_frac_dec = Decimal::from_f64_retain(threshold_frac).unwrap_or(Decimal::ZERO);
        let threshold = inner.treasury.high_watermark * threshold_frac_dec;
        if excess <= threshold {
            return None;
        }
        if inner.treasury.futures_wallet - excess < reserve_floor {
            return None;
        }

        let id = uuid::Uuid::new_v4();
        inner.in_flight = Some(SweepRecord { id, amount: excess, status: SweepStatus::Pending, error: None });

        Some(SweepRequest { id, amount: excess })
    }

    /// Record the outcome of a sweep attempt. On success, moves `amount`
    /// from futures to spot and advances the watermark atomically with the
    /// movement record (spec invariant 7).
    pub fn complete_sweep(&self, id: uuid::Uuid, ok: bool, error: Option<String>) {
        let mut inner = self.inner.lock();
        let Some(record) = inner.in_flight.take() else { return };
        if record.id != id {
            // Stale completion for a sweep that is no longer tracked; drop.
            inner.in_flight = Some(record);
            return;
        }

        if ok {
            let amount = record.amount;
            inner.treasury.futures_wallet -= amount;
            inner.treasury.spot_wallet += amount;
            inner.treasury.high_watermark = inner.treasury.futures_wallet.max(inner.treasury.high_watermark);
            inner.treasury.total_swept += amount;
        } else {
            tracing::warn!(sweep_id = %id, error = ?error, "sweep attempt failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::catalog::seed;
    use rust_decimal_macros::dec;

    fn registry() -> ConfigRegistry {
        ConfigRegistry::new(seed(), b"s".to_vec()).unwrap()
    }

    #[test]
    fn s6_sweep_scenario() {
        let reg = registry();
        let mgr = CapitalFlowManager::new(dec!(2100.0), dec!(0.0), dec!(200.0));
        mgr.inner.lock().treasury.high_watermark = dec!(1700.0);

        let req = mgr.maybe_sweep(&reg).expect("sweep should trigger");
        assert_eq!(req.amount, dec!(400.0));

        mgr.complete_sweep(req.id, true, None);
        let state = mgr.state();
        assert_eq!(state.futures_wallet, dec!(1700.0));
        assert_eq!(state.spot_wallet, dec!(400.0));
        assert_eq!(state.high_watermark, dec!(2100.0));
        assert_eq!(state.total_swept, dec!(400.0));
    }

    #[test]
    fn no_sweep_below_threshold() {
        let reg = registry();
        let mgr = CapitalFlowManager::new(dec!(1750.0), dec!(0.0), dec!(200.0));
        mgr.inner.lock().treasury.high_watermark = dec!(1700.0);
        assert!(mgr.maybe_sweep(&reg).is_none());
    }

    #[test]
    fn concurrent_trigger_noop_while_in_flight() {
        let reg = registry();
        let mgr = CapitalFlowManager::new(dec!(2100.0), dec!(0.0), dec!(200.0));
        mgr.inner.lock().treasury.high_watermark = dec!(1700.0);
        let req = mgr.maybe_sweep(&reg).unwrap();
        assert!(mgr.maybe_sweep(&reg).is_none());
        mgr.complete_sweep(req.id, true, None);
    }

    #[test]
    fn sweep_never_breaches_reserve_floor() {
        let reg = registry();
        let mgr = CapitalFlowManager::new(dec!(250.0), dec!(0.0), dec!(200.0));
        mgr.inner.lock().treasury.high_watermark = dec!(100.0);
        // excess=150, threshold=0.2*100=20 -> would sweep, but 250-150=100 < 200 floor.
        assert!(mgr.maybe_sweep(&reg).is_none());
    }
}
