use sqlx::{PgPool, Row};

use crate::breaker::BreakerEvent;
use crate::error::BrainError;

pub async fn insert(pool: &PgPool, event: &BreakerEvent) -> Result<(), BrainError> {
    sqlx::query(
        "INSERT INTO breaker_events (prev, next, reason, equity, operator_id, timestamp) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(event.prev.to_string())
    .bind(event.next.to_string())
    .bind(&event.reason)
    .bind(event.equity)
    .bind(&event.operator_id)
    .bind(event.timestamp)
    .execute(pool)
    .await
    .map_err(|e| BrainError::TransientStore(format!("insert breaker event: {e}")))?;
    Ok(())
}

/// The most recent transition's `next` state, used only for audit display;
/// the Breaker itself always starts a fresh process in `Inactive` and
/// re-derives halts from live equity/loss reports rather than trusting a
/// stale persisted state.
pub async fn latest_state(pool: &PgPool) -> Result<Option<String>, BrainError> {
    let row = sqlx::query("SELECT next FROM breaker_events ORDER BY timestamp DESC LIMIT 1")
        .fetch_optional(pool)
        .await
        .map_err(|e| BrainError::TransientStore(format!("load latest breaker event: {e}")))?;
    Ok(row.map(|r| r.try_get::<String, _>("next")).transpose().map_err(|e| BrainError::TransientStore(e.to_string()))?)
}
