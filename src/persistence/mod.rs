// =============================================================================
// Persistence — the relational store as arbiter of truth
// =============================================================================
//
// One repository module per table family, mirroring the teacher's
// `binance/client.rs` one-file-per-concern layout. No pack example pairs
// `sqlx` with Postgres directly; the combination is grounded on the broader
// retrieved-example manifests (`gjwang-zero_x_infinity`, `N0tT1m-invest-iq`)
// which use this exact feature set for financial persistence. Logged in
// DESIGN.md.
//
// Every query uses the runtime `sqlx::query`/`query_as` API rather than the
// compile-time-checked `query!` macros, since those require a reachable
// database at build time.
// =============================================================================

pub mod breaker_events;
pub mod decisions;
pub mod overrides;
pub mod phase_trades;
pub mod receipts;
pub mod sweep_records;
pub mod treasury_state;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::BrainError;

pub async fn connect(dsn: &str) -> Result<PgPool, BrainError> {
    PgPoolOptions::new()
        .max_connections(16)
        .connect(dsn)
        .await
        .map_err(|e| BrainError::TransientStore(format!("connect: {e}")))
}

/// Run pending migrations. A migration failure is fatal: the core never
/// starts against a schema it doesn't recognize.
pub async fn run_migrations(pool: &PgPool) -> Result<(), BrainError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| BrainError::Fatal(format!("migration failed: {e}")))
}
