use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::config::{ConfigStore, Override, Receipt};
use crate::error::BrainError;

/// Load every currently-active override, used to rebuild the Config
/// Registry's in-memory cache on startup (spec §5: cache is rebuilt from the
/// store then kept consistent via write-through).
pub async fn load_active(pool: &PgPool) -> Result<Vec<Override>, BrainError> {
    let rows = sqlx::query(
        "SELECT id, key, value, previous_value, operator_id, reason, expires_at, created_at, active \
         FROM config_overrides WHERE active",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| BrainError::TransientStore(format!("load_active overrides: {e}")))?;

    rows.into_iter()
        .map(|row| {
            Ok(Override {
                id: row.try_get("id").map_err(db_err)?,
                key: row.try_get("key").map_err(db_err)?,
                value: row.try_get("value").map_err(db_err)?,
                previous_value: row.try_get("previous_value").map_err(db_err)?,
                operator_id: row.try_get("operator_id").map_err(db_err)?,
                reason: row.try_get("reason").map_err(db_err)?,
                expires_at: row.try_get("expires_at").map_err(db_err)?,
                created_at: row.try_get("created_at").map_err(db_err)?,
                active: row.try_get("active").map_err(db_err)?,
            })
        })
        .collect()
}

pub async fn insert(pool: &PgPool, ov: &Override) -> Result<(), BrainError> {
    sqlx::query(
        "INSERT INTO config_overrides (id, key, value, previous_value, operator_id, reason, expires_at, active, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(ov.id)
    .bind(&ov.key)
    .bind(&ov.value)
    .bind(&ov.previous_value)
    .bind(&ov.operator_id)
    .bind(&ov.reason)
    .bind(ov.expires_at)
    .bind(ov.active)
    .bind(ov.created_at)
    .execute(pool)
    .await
    .map_err(|e| BrainError::TransientStore(format!("insert override: {e}")))?;
    Ok(())
}

pub async fn deactivate(pool: &PgPool, key: &str, deactivated_by: &str) -> Result<(), BrainError> {
    sqlx::query(
        "UPDATE config_overrides SET active = FALSE, deactivated_at = now(), deactivated_by = $2 \
         WHERE key = $1 AND active",
    )
    .bind(key)
    .bind(deactivated_by)
    .execute(pool)
    .await
    .map_err(|e| BrainError::TransientStore(format!("deactivate override: {e}")))?;
    Ok(())
}

/// Load the full receipt log, used alongside [`load_active`] to rehydrate
/// the registry on startup.
pub async fn load_all_receipts(pool: &PgPool) -> Result<Vec<Receipt>, BrainError> {
    crate::persistence::receipts::load_all(pool).await
}

fn db_err(e: sqlx::Error) -> BrainError {
    BrainError::TransientStore(format!("decode row: {e}"))
}

/// Postgres-backed [`ConfigStore`], wiring the Config Registry's
/// override/receipt writes through to the relational store (spec §4.1
/// restart safety).
pub struct PostgresConfigStore {
    pool: PgPool,
}

impl PostgresConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigStore for PostgresConfigStore {
    async fn insert_override(&self, ov: &Override) -> Result<(), BrainError> {
        insert(&self.pool, ov).await
    }

    async fn deactivate_override(&self, key: &str, deactivated_by: &str) -> Result<(), BrainError> {
        deactivate(&self.pool, key, deactivated_by).await
    }

    async fn insert_receipt(&self, receipt: &Receipt) -> Result<(), BrainError> {
        crate::persistence::receipts::insert(&self.pool, receipt).await
    }
}
