// =============================================================================
// Subject naming and typed payloads for the Brain's bus traffic
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::arbitrator::Decision;
use crate::bus::Envelope;
use crate::types::{PhaseId, Side};

/// Default venue/account routed to when an Intent does not specify one — the
/// Brain arbitrates capital, it does not choose venues, so every place-order
/// command today targets the single configured execution account.
pub const DEFAULT_VENUE: &str = "binance";
pub const DEFAULT_ACCOUNT: &str = "default";

pub fn place_order_subject(venue: &str, account: &str, symbol: &str) -> String {
    format!("titan.cmd.exec.place.v1.{venue}.{account}.{symbol}")
}

pub fn halt_subject(scope: &str) -> String {
    format!("titan.cmd.sys.halt.v1.{scope}")
}

pub const RISK_POLICY_SUBJECT: &str = "titan.cmd.risk.policy";

pub fn fill_subject(venue: &str, account: &str, symbol: &str) -> String {
    format!("titan.evt.exec.fill.v1.{venue}.{account}.{symbol}")
}

pub fn brain_signal_subject(strategy: &str) -> String {
    format!("titan.evt.brain.signal.v1.{strategy}")
}

pub const BRAIN_REGIME_SUBJECT: &str = "titan.evt.brain.regime.v1";
pub const ANALYTICS_POWERLAW_SUBJECT: &str = "titan.evt.analytics.powerlaw.v1";
pub const DASHBOARD_UPDATE_SUBJECT: &str = "titan.data.dashboard.update.v1";

/// Outbound place-order command payload. `direction` is the only place the
/// internal `Side` enum is converted to the wire's signed integer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderPayload {
    pub signal_id: String,
    pub symbol: String,
    pub side: Side,
    pub direction: i8,
    pub authorized_notional_usd: f64,
    pub requested_leverage: Option<f64>,
    pub take_profits: Vec<f64>,
    pub entry_zone: Option<(f64, f64)>,
    pub phase_id: PhaseId,
}

impl PlaceOrderPayload {
    /// `direction` is derived here, once, from `side` — never re-derived or
    /// passed through from elsewhere.
    pub fn new(
        signal_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        authorized_notional_usd: f64,
        requested_leverage: Option<f64>,
        take_profits: Vec<f64>,
        entry_zone: Option<(f64, f64)>,
        phase_id: PhaseId,
    ) -> Self {
        Self {
            signal_id: signal_id.into(),
            symbol: symbol.into(),
            direction: side.direction(),
            side,
            authorized_notional_usd,
            requested_leverage,
            take_profits,
            entry_zone,
            phase_id,
        }
    }
}

/// Build the place-order envelope for an approved Decision, shared by the
/// arbitrator worker pool (bus-sourced intents) and the HTTP admission path
/// (`POST /signal`) so the two call sites can never drift.
pub fn place_order_envelope(
    decision: &Decision,
    producer: &str,
    requested_leverage: Option<f64>,
    take_profits: Vec<f64>,
    entry_zone: Option<(f64, f64)>,
) -> Envelope<PlaceOrderPayload> {
    let payload = PlaceOrderPayload::new(
        decision.signal_id.clone(),
        decision.symbol.clone(),
        decision.side,
        decision.authorized_notional,
        requested_leverage,
        take_profits,
        entry_zone,
        decision.phase_id,
    );
    Envelope::new("place_order.v1", producer, payload)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaltPayload {
    pub scope: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillPayload {
    pub signal_id: String,
    pub venue: String,
    pub symbol: String,
    pub side: Side,
    pub filled_notional: f64,
    pub fill_price: f64,
    pub realized_pnl: f64,
    pub t_fill: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimePayload {
    pub expanding: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerlawPayload {
    pub hill_alpha: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalPayload {
    pub signal_id: String,
    pub strategy: String,
    pub phase_id: PhaseId,
    pub symbol: String,
    pub side: Side,
    pub requested_notional_usd: f64,
    pub requested_leverage: Option<f64>,
    pub confidence: Option<f64>,
    pub take_profits: Vec<f64>,
    pub entry_zone: Option<(f64, f64)>,
}
