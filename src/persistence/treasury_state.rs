use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use crate::error::BrainError;
use crate::treasury::TreasuryState;

/// Single-row table, updated in place (spec §6).
pub async fn load(pool: &PgPool) -> Result<Option<TreasuryState>, BrainError> {
    let row = sqlx::query("SELECT futures_wallet, spot_wallet, high_watermark, total_swept FROM treasury_state WHERE id")
        .fetch_optional(pool)
        .await
        .map_err(|e| BrainError::TransientStore(format!("load treasury state: {e}")))?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(TreasuryState {
        futures_wallet: row.try_get::<Decimal, _>("futures_wallet").map_err(db_err)?,
        spot_wallet: row.try_get::<Decimal, _>("spot_wallet").map_err(db_err)?,
        high_watermark: row.try_get::<Decimal, _>("high_watermark").map_err(db_err)?,
        total_swept: row.try_get::<Decimal, _>("total_swept").map_err(db_err)?,
    }))
}

pub async fn save(pool: &PgPool, state: &TreasuryState) -> Result<(), BrainError> {
    sqlx::query(
        "INSERT INTO treasury_state (id, futures_wallet, spot_wallet, high_watermark, total_swept, updated_at) \
         VALUES (TRUE, $1, $2, $3, $4, now()) \
         ON CONFLICT (id) DO UPDATE SET \
         futures_wallet = EXCLUDED.futures_wallet, spot_wallet = EXCLUDED.spot_wallet, \
         high_watermark = EXCLUDED.high_watermark, total_swept = EXCLUDED.total_swept, updated_at = now()",
    )
    .bind(state.futures_wallet)
    .bind(state.spot_wallet)
    .bind(state.high_watermark)
    .bind(state.total_swept)
    .execute(pool)
    .await
    .map_err(|e| BrainError::TransientStore(format!("save treasury state: {e}")))?;
    Ok(())
}

fn db_err(e: sqlx::Error) -> BrainError {
    BrainError::TransientStore(format!("decode row: {e}"))
}
