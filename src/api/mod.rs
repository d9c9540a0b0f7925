// =============================================================================
// REST API — admission, config, status endpoints
// =============================================================================
//
// Mirrors `rest.rs`'s "public health route, everything else behind
// `AuthBearer`" shape, generalised to the Brain's admission (`/signal`) and
// config-registry surface. `POST /config/*` and `POST /breaker/reset` are the
// admin-gated write paths; `GET` routes are public status reads.
// =============================================================================

pub mod auth;

use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::arbitrator::Intent;
use crate::bus::envelopes::{place_order_envelope, place_order_subject, DEFAULT_ACCOUNT, DEFAULT_VENUE};
use crate::config::catalog::ConfigItem;
use crate::config::Effective;
use crate::state::BrainState;
use crate::types::{PhaseId, Side};

/// The value returned in place of a catalogued secret on every read path,
/// and the sentinel a write must no-op on rather than persist literally
/// (spec §6).
const MASKED: &str = "*****";

pub fn router(state: Arc<BrainState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/signal", post(submit_signal))
        .route("/status", get(status))
        .route("/allocation", get(allocation))
        .route("/treasury", get(treasury))
        .route("/breaker", get(breaker))
        .route("/breaker/reset", post(breaker_reset))
        .route("/config/catalog", get(config_catalog))
        .route("/config/effective", get(config_effective))
        .route("/config/override", post(config_override))
        .route("/config/override", delete(config_rollback))
        .route("/config/receipts", get(config_receipts))
        .route("/config/bulk", post(config_bulk))
        .route("/config/preset/:name", post(config_preset))
        .layer(cors)
        .with_state(state)
}

fn err(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<serde_json::Value>) {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

// ── Ambient ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

async fn healthz(State(state): State<Arc<BrainState>>) -> impl IntoResponse {
    Json(HealthResponse { status: "ok", uptime_secs: state.uptime_secs() })
}

async fn metrics(State(state): State<Arc<BrainState>>) -> impl IntoResponse {
    state.metrics_handle.render()
}

// ── Admission ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SignalRequest {
    signal_id: String,
    phase_id: PhaseId,
    symbol: String,
    side: Side,
    requested_notional_usd: f64,
    requested_leverage: Option<f64>,
    confidence: Option<f64>,
    #[serde(default)]
    regime_sensitive: bool,
    #[serde(default)]
    take_profits: Vec<f64>,
    entry_zone: Option<(f64, f64)>,
}

async fn submit_signal(
    State(state): State<Arc<BrainState>>,
    Json(req): Json<SignalRequest>,
) -> impl IntoResponse {
    let requested_leverage = req.requested_leverage;
    let take_profits = req.take_profits.clone();
    let entry_zone = req.entry_zone;

    let intent = Intent {
        signal_id: req.signal_id,
        phase_id: req.phase_id,
        symbol: req.symbol,
        side: req.side,
        requested_notional_usd: req.requested_notional_usd,
        requested_leverage,
        confidence: req.confidence,
        regime_sensitive: req.regime_sensitive,
        take_profits: take_profits.clone(),
        entry_zone,
        submitted_at: chrono::Utc::now(),
    };
    let decision = state.arbitrator.arbitrate(intent).await;

    if decision.approved {
        let envelope = place_order_envelope(&decision, crate::PRODUCER, requested_leverage, take_profits, entry_zone);
        let subject = place_order_subject(DEFAULT_VENUE, DEFAULT_ACCOUNT, &decision.symbol);
        if let Err(e) = state.bus.publish(&subject, &envelope).await {
            warn!(error = %e, signal_id = %decision.signal_id, "failed to publish place-order command from HTTP admission");
        }
    }

    Json(decision)
}

// ── Status ───────────────────────────────────────────────────────────────

async fn status(State(state): State<Arc<BrainState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "uptime_secs": state.uptime_secs(),
        "breaker": state.breaker.state(),
        "allocation": state.allocation.current(),
        "treasury": state.treasury.state(),
        "risk": state.risk.snapshot(),
    }))
}

async fn allocation(State(state): State<Arc<BrainState>>) -> impl IntoResponse {
    Json(state.allocation.current())
}

async fn treasury(State(state): State<Arc<BrainState>>) -> impl IntoResponse {
    Json(state.treasury.state())
}

async fn breaker(State(state): State<Arc<BrainState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "state": state.breaker.state(),
        "events": state.breaker.events(),
    }))
}

#[derive(Deserialize)]
struct BreakerResetRequest {
    operator_id: String,
    equity: f64,
}

async fn breaker_reset(
    _auth: AuthBearer,
    State(state): State<Arc<BrainState>>,
    Json(req): Json<BreakerResetRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    state
        .breaker
        .operator_reset(&req.operator_id, req.equity)
        .map_err(|e| err(StatusCode::BAD_REQUEST, e))?;
    info!(operator_id = %req.operator_id, "breaker reset via API");
    Ok(Json(serde_json::json!({ "state": state.breaker.state() })))
}

// ── Config Registry ──────────────────────────────────────────────────────

/// Mask `item.default` if the key is catalogued as a secret (spec §6).
fn mask_catalog_item(item: ConfigItem) -> ConfigItem {
    if item.secret {
        ConfigItem { default: serde_json::json!(MASKED), ..item }
    } else {
        item
    }
}

/// Mask `eff.value` and every provenance entry if `key` is catalogued as a
/// secret (spec §6).
fn mask_effective(state: &BrainState, eff: Effective) -> Effective {
    if state.config.is_secret(&eff.key) {
        Effective {
            value: serde_json::json!(MASKED),
            provenance: eff
                .provenance
                .into_iter()
                .map(|(layer, _)| (layer, serde_json::json!(MASKED)))
                .collect(),
            ..eff
        }
    } else {
        eff
    }
}

async fn config_catalog(State(state): State<Arc<BrainState>>) -> impl IntoResponse {
    let catalog: Vec<_> = state.config.get_catalog().into_iter().map(mask_catalog_item).collect();
    Json(catalog)
}

#[derive(Deserialize)]
struct EffectiveQuery {
    key: Option<String>,
}

async fn config_effective(
    State(state): State<Arc<BrainState>>,
    Query(q): Query<EffectiveQuery>,
) -> impl IntoResponse {
    match q.key {
        Some(key) => match state.config.get_effective(&key) {
            Some(eff) => Json(serde_json::json!([mask_effective(&state, eff)])).into_response(),
            None => err(StatusCode::NOT_FOUND, format!("unknown key {key}")).into_response(),
        },
        None => {
            let all: Vec<_> = state
                .config
                .get_catalog()
                .into_iter()
                .filter_map(|item| state.config.get_effective(item.key))
                .map(|eff| mask_effective(&state, eff))
                .collect();
            Json(all).into_response()
        }
    }
}

#[derive(Deserialize)]
struct OverrideRequest {
    key: String,
    value: serde_json::Value,
    operator_id: String,
    reason: String,
    expires_in_secs: Option<i64>,
}

async fn config_override(
    auth: AuthBearer,
    State(state): State<Arc<BrainState>>,
    Json(req): Json<OverrideRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let _ = &auth;
    if state.config.is_secret(&req.key) && req.value == serde_json::json!(MASKED) {
        return Ok(Json(serde_json::json!({ "noop": true, "key": req.key })));
    }
    let expires_in = req.expires_in_secs.map(chrono::Duration::seconds);
    let receipt = state
        .config
        .create_override(&req.key, req.value, &req.operator_id, &req.reason, expires_in)
        .await
        .map_err(|e| err(StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(Json(serde_json::to_value(receipt).expect("receipt always serializes")))
}

#[derive(Deserialize)]
struct RollbackRequest {
    key: String,
    operator_id: String,
}

async fn config_rollback(
    _auth: AuthBearer,
    State(state): State<Arc<BrainState>>,
    Json(req): Json<RollbackRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let receipt = state
        .config
        .rollback_override(&req.key, &req.operator_id)
        .await
        .map_err(|e| err(StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(Json(receipt))
}

async fn config_receipts(State(state): State<Arc<BrainState>>) -> impl IntoResponse {
    Json(state.config.receipts())
}

#[derive(Deserialize)]
struct BulkOverrideRequest {
    overrides: Vec<OverrideRequest>,
}

async fn config_bulk(
    _auth: AuthBearer,
    State(state): State<Arc<BrainState>>,
    Json(req): Json<BulkOverrideRequest>,
) -> impl IntoResponse {
    let mut receipts = Vec::new();
    let mut noops = Vec::new();
    let mut errors = Vec::new();
    for item in req.overrides {
        if state.config.is_secret(&item.key) && item.value == serde_json::json!(MASKED) {
            noops.push(item.key);
            continue;
        }
        let expires_in = item.expires_in_secs.map(chrono::Duration::seconds);
        match state.config.create_override(&item.key, item.value, &item.operator_id, &item.reason, expires_in).await {
            Ok(r) => receipts.push(r),
            Err(e) => {
                warn!(key = %item.key, error = %e, "bulk override item failed");
                errors.push(serde_json::json!({ "key": item.key, "error": e.to_string() }));
            }
        }
    }
    Json(serde_json::json!({ "receipts": receipts, "noops": noops, "errors": errors }))
}

/// Named presets are out of scope for this core beyond a pass-through stub:
/// a preset is just a bulk override list the operator tooling resolves
/// client-side and posts through `/config/bulk`.
async fn config_preset(
    _auth: AuthBearer,
    axum::extract::Path(name): axum::extract::Path<String>,
) -> impl IntoResponse {
    err(StatusCode::NOT_IMPLEMENTED, format!("preset {name} must be applied via /config/bulk"))
}
