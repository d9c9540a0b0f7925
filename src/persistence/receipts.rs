use sqlx::{PgPool, Row};

use crate::config::{Receipt, ReceiptAction};
use crate::error::BrainError;

pub async fn load_all(pool: &PgPool) -> Result<Vec<Receipt>, BrainError> {
    let rows = sqlx::query(
        "SELECT id, key, action, previous_value, new_value, operator_id, reason, expires_at, signature, timestamp \
         FROM config_receipts ORDER BY timestamp ASC",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| BrainError::TransientStore(format!("load receipts: {e}")))?;

    rows.into_iter()
        .map(|row| {
            let action_str: String = row.try_get("action").map_err(db_err)?;
            let action = match action_str.as_str() {
                "override" => ReceiptAction::Override,
                "rollback" => ReceiptAction::Rollback,
                "propose" => ReceiptAction::Propose,
                other => return Err(BrainError::TransientStore(format!("unknown receipt action {other}"))),
            };
            Ok(Receipt {
                id: row.try_get("id").map_err(db_err)?,
                key: row.try_get("key").map_err(db_err)?,
                previous_value: row.try_get("previous_value").map_err(db_err)?,
                new_value: row.try_get("new_value").map_err(db_err)?,
                operator_id: row.try_get("operator_id").map_err(db_err)?,
                reason: row.try_get("reason").map_err(db_err)?,
                action,
                expires_at: row.try_get("expires_at").map_err(db_err)?,
                timestamp: row.try_get("timestamp").map_err(db_err)?,
                signature: row.try_get("signature").map_err(db_err)?,
            })
        })
        .collect()
}

pub async fn insert(pool: &PgPool, receipt: &Receipt) -> Result<(), BrainError> {
    let action = match receipt.action {
        ReceiptAction::Override => "override",
        ReceiptAction::Rollback => "rollback",
        ReceiptAction::Propose => "propose",
    };
    sqlx::query(
        "INSERT INTO config_receipts (id, key, action, previous_value, new_value, operator_id, reason, expires_at, signature, timestamp) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(receipt.id)
    .bind(&receipt.key)
    .bind(action)
    .bind(&receipt.previous_value)
    .bind(&receipt.new_value)
    .bind(&receipt.operator_id)
    .bind(&receipt.reason)
    .bind(receipt.expires_at)
    .bind(&receipt.signature)
    .bind(receipt.timestamp)
    .execute(pool)
    .await
    .map_err(|e| BrainError::TransientStore(format!("insert receipt: {e}")))?;
    Ok(())
}

fn db_err(e: sqlx::Error) -> BrainError {
    BrainError::TransientStore(format!("decode row: {e}"))
}
