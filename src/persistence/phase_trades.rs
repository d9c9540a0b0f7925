use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::error::BrainError;
use crate::types::PhaseId;

pub struct TradeRow {
    pub phase_id: PhaseId,
    pub signal_id: String,
    pub pnl_usd: f64,
    pub t_fill: DateTime<Utc>,
}

pub async fn insert(pool: &PgPool, phase_id: PhaseId, signal_id: &str, pnl_usd: f64, t_fill: DateTime<Utc>) -> Result<(), BrainError> {
    sqlx::query("INSERT INTO phase_trades (phase_id, signal_id, pnl_usd, t_fill) VALUES ($1, $2, $3, $4)")
        .bind(phase_id.to_string())
        .bind(signal_id)
        .bind(pnl_usd)
        .bind(t_fill)
        .execute(pool)
        .await
        .map_err(|e| BrainError::TransientStore(format!("insert phase trade: {e}")))?;
    Ok(())
}

/// Load trades for `phase_id` within the rolling window, used to rehydrate
/// the Performance Tracker's ledger on startup.
pub async fn load_within_window(pool: &PgPool, phase_id: PhaseId, since: DateTime<Utc>) -> Result<Vec<TradeRow>, BrainError> {
    let rows = sqlx::query("SELECT signal_id, pnl_usd, t_fill FROM phase_trades WHERE phase_id = $1 AND t_fill >= $2 ORDER BY t_fill ASC")
        .bind(phase_id.to_string())
        .bind(since)
        .fetch_all(pool)
        .await
        .map_err(|e| BrainError::TransientStore(format!("load phase trades: {e}")))?;

    rows.into_iter()
        .map(|row| {
            Ok(TradeRow {
                phase_id,
                signal_id: row.try_get("signal_id").map_err(|e| BrainError::TransientStore(e.to_string()))?,
                pnl_usd: row.try_get("pnl_usd").map_err(|e| BrainError::TransientStore(e.to_string()))?,
                t_fill: row.try_get("t_fill").map_err(|e| BrainError::TransientStore(e.to_string()))?,
            })
        })
        .collect()
}
