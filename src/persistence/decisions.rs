// Backs `arbitrator::DecisionLog` with the `decisions` table. `signal_id` is
// the primary key, which is what makes step 1 of the pipeline (dedup) and
// the duplicate-replay scenario (S4) hold even across restarts.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::arbitrator::{Decision, DecisionLog};
use crate::error::BrainError;

pub struct PostgresDecisionLog {
    pool: PgPool,
}

impl PostgresDecisionLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DecisionLog for PostgresDecisionLog {
    async fn seen(&self, signal_id: &str) -> Result<Option<Decision>, BrainError> {
        let row = sqlx::query("SELECT snapshot FROM decisions WHERE signal_id = $1")
            .bind(signal_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BrainError::TransientStore(format!("lookup decision: {e}")))?;

        let Some(row) = row else { return Ok(None) };
        let snapshot: serde_json::Value = row
            .try_get("snapshot")
            .map_err(|e| BrainError::TransientStore(format!("decode snapshot: {e}")))?;
        let decision: Decision = serde_json::from_value(snapshot)
            .map_err(|e| BrainError::TransientStore(format!("deserialize decision: {e}")))?;
        Ok(Some(decision))
    }

    async fn record(&self, decision: &Decision) -> Result<(), BrainError> {
        let snapshot = serde_json::to_value(decision)
            .map_err(|e| BrainError::Validation(format!("serialize decision: {e}")))?;

        sqlx::query(
            "INSERT INTO decisions (signal_id, id, phase_id, symbol, side, approved, requested_notional, authorized_notional, reason, snapshot, t_decided) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (signal_id) DO NOTHING",
        )
        .bind(&decision.signal_id)
        .bind(decision.id)
        .bind(decision.phase_id.to_string())
        .bind(&decision.symbol)
        .bind(decision.side.to_string())
        .bind(decision.approved)
        .bind(decision.requested_notional)
        .bind(decision.authorized_notional)
        .bind(decision.reason.to_string())
        .bind(snapshot)
        .bind(decision.t_decided)
        .execute(&self.pool)
        .await
        .map_err(|e| BrainError::TransientStore(format!("insert decision: {e}")))?;

        Ok(())
    }
}
