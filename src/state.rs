// =============================================================================
// BrainState — the composition root
// =============================================================================
//
// The single `Arc`-held struct wiring every component together, built once in
// `main.rs` and cloned cheaply into every task and HTTP handler. Generalises
// `AppState`'s "each subsystem owns its own interior mutability, AppState
// just holds Arcs to them" shape from a single-strategy trading engine to the
// Brain's nine components.
// =============================================================================

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;

use crate::allocation::AllocationEngine;
use crate::arbitrator::Arbitrator;
use crate::breaker::CircuitBreaker;
use crate::bus::BusAdapter;
use crate::config::ConfigRegistry;
use crate::performance::PerformanceTracker;
use crate::risk_guardian::RiskGuardian;
use crate::treasury::CapitalFlowManager;

pub struct BrainState {
    pub config: Arc<ConfigRegistry>,
    pub allocation: Arc<AllocationEngine>,
    pub performance: Arc<PerformanceTracker>,
    pub risk: Arc<RiskGuardian>,
    pub treasury: Arc<CapitalFlowManager>,
    pub breaker: Arc<CircuitBreaker>,
    pub arbitrator: Arc<Arbitrator>,
    pub bus: Arc<BusAdapter>,
    pub pool: PgPool,
    pub metrics_handle: PrometheusHandle,
    pub start_time: std::time::Instant,
}

impl BrainState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<ConfigRegistry>,
        allocation: Arc<AllocationEngine>,
        performance: Arc<PerformanceTracker>,
        risk: Arc<RiskGuardian>,
        treasury: Arc<CapitalFlowManager>,
        breaker: Arc<CircuitBreaker>,
        arbitrator: Arc<Arbitrator>,
        bus: Arc<BusAdapter>,
        pool: PgPool,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        Self {
            config,
            allocation,
            performance,
            risk,
            treasury,
            breaker,
            arbitrator,
            bus,
            pool,
            metrics_handle,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
