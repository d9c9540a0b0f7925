use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BrainError;
use crate::treasury::SweepStatus;

pub async fn insert_pending(pool: &PgPool, id: Uuid, amount: Decimal) -> Result<(), BrainError> {
    sqlx::query("INSERT INTO sweep_records (id, amount, t_requested, status) VALUES ($1, $2, now(), 'pending')")
        .bind(id)
        .bind(amount)
        .execute(pool)
        .await
        .map_err(|e| BrainError::TransientStore(format!("insert sweep record: {e}")))?;
    Ok(())
}

pub async fn complete(pool: &PgPool, id: Uuid, status: SweepStatus, error: Option<&str>) -> Result<(), BrainError> {
    let status_str = match status {
        SweepStatus::Pending => "pending",
        SweepStatus::Completed => "completed",
        SweepStatus::Failed => "failed",
    };
    sqlx::query("UPDATE sweep_records SET status = $2, error = $3, t_completed = now() WHERE id = $1")
        .bind(id)
        .bind(status_str)
        .bind(error)
        .execute(pool)
        .await
        .map_err(|e| BrainError::TransientStore(format!("complete sweep record: {e}")))?;
    Ok(())
}
