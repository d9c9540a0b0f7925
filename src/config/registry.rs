// =============================================================================
// Config Registry — provenance resolution, safety enforcement, signed receipts
// =============================================================================
//
// Provenance order (later overrides earlier): default -> env -> file ->
// active override. Concurrency: create/rollback serialized per key via a
// per-key mutex map, the same "one lock per mutable resource" discipline the
// source used for the risk engine's `Inner` and the regime detector's cache,
// generalised to a map instead of a single field.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::catalog::{ConfigItem, Safety};
use crate::error::BrainError;

type HmacSha256 = Hmac<Sha256>;

/// A single override row (spec §3 "Override").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Override {
    pub id: Uuid,
    pub key: String,
    pub value: Value,
    pub previous_value: Value,
    pub operator_id: String,
    pub reason: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

/// The action recorded on a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptAction {
    Override,
    Rollback,
    Propose,
}

/// An append-only, HMAC-signed audit entry (spec §3 "Receipt").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: Uuid,
    pub key: String,
    pub previous_value: Value,
    pub new_value: Value,
    pub operator_id: String,
    pub reason: String,
    pub action: ReceiptAction,
    pub expires_at: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
    pub signature: String,
}

/// The canonical payload signed into every receipt.
#[derive(Serialize)]
struct CanonicalReceipt<'a> {
    id: Uuid,
    key: &'a str,
    previous_value: &'a Value,
    new_value: &'a Value,
    operator_id: &'a str,
    action: ReceiptAction,
    timestamp: DateTime<Utc>,
}

/// Produce the hex HMAC-SHA256 signature of `payload`, the same
/// sign-and-hex-encode idiom used for Binance request signing.
fn sign(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Effective value plus the provenance chain that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct Effective {
    pub key: String,
    pub value: Value,
    pub provenance: Vec<(&'static str, Value)>,
}

/// Write-through persistence for overrides and receipts (spec §4.1: restart
/// safety — an override created before a crash must still be active after
/// restart). Implemented against Postgres by the persistence layer; an
/// in-memory no-op backs the registry by default so unit tests don't need a
/// live database, the same `DecisionLog`-style trait-at-the-boundary shape
/// the Signal Arbitrator uses for its own restart-safety requirement.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn insert_override(&self, ov: &Override) -> Result<(), BrainError>;
    async fn deactivate_override(&self, key: &str, deactivated_by: &str) -> Result<(), BrainError>;
    async fn insert_receipt(&self, receipt: &Receipt) -> Result<(), BrainError>;
}

struct NoopConfigStore;

#[async_trait]
impl ConfigStore for NoopConfigStore {
    async fn insert_override(&self, _ov: &Override) -> Result<(), BrainError> {
        Ok(())
    }

    async fn deactivate_override(&self, _key: &str, _deactivated_by: &str) -> Result<(), BrainError> {
        Ok(())
    }

    async fn insert_receipt(&self, _receipt: &Receipt) -> Result<(), BrainError> {
        Ok(())
    }
}

/// The Config Registry: catalog + override cache + receipt log.
pub struct ConfigRegistry {
    catalog: HashMap<&'static str, ConfigItem>,
    env_overrides: HashMap<String, Value>,
    file_overrides: RwLock<HashMap<String, Value>>,
    active_overrides: RwLock<HashMap<String, Override>>,
    receipts: RwLock<Vec<Receipt>>,
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    secret: Vec<u8>,
    store: RwLock<Arc<dyn ConfigStore>>,
}

impl std::fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRegistry")
            .field("catalog_size", &self.catalog.len())
            .finish()
    }
}

impl ConfigRegistry {
    /// Build a registry from the seeded catalog. Fails fast (per DESIGN.md
    /// Open Question decision 3) if any `tighten_only` key is missing a
    /// declared `risk_direction`. Overrides are not durably persisted until
    /// [`set_store`](Self::set_store) attaches a real store.
    pub fn new(items: Vec<ConfigItem>, secret: impl Into<Vec<u8>>) -> Result<Self, BrainError> {
        let mut catalog = HashMap::new();
        for item in items {
            if item.safety == Safety::TightenOnly && item.risk_direction.is_none() {
                return Err(BrainError::Fatal(format!(
                    "catalog key {} is tighten_only but declares no risk_direction",
                    item.key
                )));
            }
            catalog.insert(item.key, item);
        }

        Ok(Self {
            catalog,
            env_overrides: HashMap::new(),
            file_overrides: RwLock::new(HashMap::new()),
            active_overrides: RwLock::new(HashMap::new()),
            receipts: RwLock::new(Vec::new()),
            key_locks: Mutex::new(HashMap::new()),
            secret: secret.into(),
            store: RwLock::new(Arc::new(NoopConfigStore)),
        })
    }

    /// Attach the durable store backing override/receipt writes. Called once
    /// during startup after the relational store connects.
    pub fn set_store(&self, store: Arc<dyn ConfigStore>) {
        *self.store.write() = store;
    }

    /// Load the `env` provenance layer: any `BRAIN_CFG__<KEY_WITH_UNDERSCORES>`
    /// variable overrides the default for that key, parsed as JSON (falling
    /// back to a raw string if it does not parse).
    pub fn load_env_layer(&mut self) {
        for item in self.catalog.values() {
            let env_key = format!(
                "BRAIN_CFG__{}",
                item.key.to_uppercase().replace('.', "__")
            );
            if let Ok(raw) = std::env::var(&env_key) {
                let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
                self.env_overrides.insert(item.key.to_string(), value);
            }
        }
    }

    /// Rehydrate the active-override cache and receipt log from persisted
    /// storage on startup (spec §5: "rebuilt from the store on startup").
    pub fn rehydrate(&self, overrides: Vec<Override>, receipts: Vec<Receipt>) {
        let mut active = self.active_overrides.write();
        for ov in overrides.into_iter().filter(|o| o.active) {
            active.insert(ov.key.clone(), ov);
        }
        *self.receipts.write() = receipts;
    }

    pub fn get_catalog(&self) -> Vec<ConfigItem> {
        self.catalog.values().cloned().collect()
    }

    /// Whether `key` is catalogued as a secret (spec §6: masked `*****` on
    /// read, writes of the masked sentinel are no-ops). `false` for unknown
    /// keys; callers validate existence separately.
    pub fn is_secret(&self, key: &str) -> bool {
        self.catalog.get(key).map(|i| i.secret).unwrap_or(false)
    }

    async fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.key_locks
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Resolve the effective value of `key`, sweeping any expired override
    /// in-place. Returns `None` if the key is not in the catalog.
    pub fn get_effective(&self, key: &str) -> Option<Effective> {
        let item = self.catalog.get(key)?;
        let mut provenance = vec![("default", item.default.clone())];

        if let Some(v) = self.env_overrides.get(key) {
            provenance.push(("env", v.clone()));
        }
        if let Some(v) = self.file_overrides.read().get(key) {
            provenance.push(("file", v.clone()));
        }

        self.sweep_expired(key);
        if let Some(ov) = self.active_overrides.read().get(key) {
            provenance.push(("active_override", ov.value.clone()));
        }

        let value = provenance.last().expect("default always present").1.clone();
        Some(Effective {
            key: key.to_string(),
            value,
            provenance,
        })
    }

    /// Convenience: resolve and coerce to `f64`.
    pub fn get_f64(&self, key: &str) -> f64 {
        self.get_effective(key)
            .and_then(|e| e.value.as_f64())
            .unwrap_or(0.0)
    }

    pub fn get_i64(&self, key: &str) -> i64 {
        self.get_effective(key)
            .and_then(|e| e.value.as_i64())
            .unwrap_or(0)
    }

    fn sweep_expired(&self, key: &str) {
        let now = Utc::now();
        let mut active = self.active_overrides.write();
        if let Some(ov) = active.get(key) {
            if let Some(expiry) = ov.expires_at {
                if expiry < now {
                    let mut gone = active.remove(key).expect("checked above");
                    gone.active = false;
                    info!(key, "override expired and was swept on read");
                }
            }
        }
    }

    /// Create (or replace) the active override for `key`. The override and
    /// its receipt are durably written before the in-memory cache is
    /// updated, so a crash between the two never leaves memory ahead of the
    /// store.
    #[instrument(skip(self, value, reason))]
    pub async fn create_override(
        &self,
        key: &str,
        value: Value,
        operator_id: &str,
        reason: &str,
        expires_in: Option<chrono::Duration>,
    ) -> Result<Receipt, BrainError> {
        let item = self
            .catalog
            .get(key)
            .ok_or_else(|| BrainError::Validation(format!("unknown config key {key}")))?
            .clone();

        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;

        let current = self
            .get_effective(key)
            .expect("catalog entry exists")
            .value;

        item.schema
            .validate(&value)
            .map_err(BrainError::Validation)?;

        self.check_safety(&item, &current, &value)?;

        let now = Utc::now();
        let ov = Override {
            id: Uuid::new_v4(),
            key: key.to_string(),
            value: value.clone(),
            previous_value: current.clone(),
            operator_id: operator_id.to_string(),
            reason: reason.to_string(),
            expires_at: expires_in.map(|d| now + d),
            created_at: now,
            active: true,
        };
        let receipt = self.build_receipt(
            key,
            current,
            value,
            operator_id,
            reason,
            ReceiptAction::Override,
            ov.expires_at,
        );

        let store = self.store.read().clone();
        store.insert_override(&ov).await?;
        store.insert_receipt(&receipt).await?;

        self.active_overrides.write().insert(key.to_string(), ov);
        self.receipts.write().push(receipt.clone());

        info!(key, operator_id, "override created");
        Ok(receipt)
    }

    /// Deactivate the active override for `key`, restoring the provenance
    /// chain to the prior effective value. If the durable deactivation
    /// fails, the in-memory override is restored so the cache stays
    /// consistent with the store.
    #[instrument(skip(self))]
    pub async fn rollback_override(&self, key: &str, operator_id: &str) -> Result<Receipt, BrainError> {
        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;

        let removed = self
            .active_overrides
            .write()
            .remove(key)
            .ok_or_else(|| BrainError::Validation(format!("no active override for {key}")))?;

        let restored = self
            .get_effective(key)
            .expect("catalog entry exists")
            .value;

        let receipt = self.build_receipt(
            key,
            removed.value.clone(),
            restored,
            operator_id,
            "rollback",
            ReceiptAction::Rollback,
            None,
        );

        let store = self.store.read().clone();
        if let Err(e) = store.deactivate_override(key, operator_id).await {
            self.active_overrides.write().insert(key.to_string(), removed);
            return Err(e);
        }
        store.insert_receipt(&receipt).await?;

        self.receipts.write().push(receipt.clone());

        info!(key, operator_id, "override rolled back");
        Ok(receipt)
    }

    /// Build a signed receipt without recording it; callers commit it to
    /// `self.receipts` only after the durable write succeeds.
    fn build_receipt(
        &self,
        key: &str,
        previous_value: Value,
        new_value: Value,
        operator_id: &str,
        reason: &str,
        action: ReceiptAction,
        expires_at: Option<DateTime<Utc>>,
    ) -> Receipt {
        let id = Uuid::new_v4();
        let timestamp = Utc::now();
        let canonical = CanonicalReceipt {
            id,
            key,
            previous_value: &previous_value,
            new_value: &new_value,
            operator_id,
            action,
            timestamp,
        };
        let payload = serde_json::to_vec(&canonical).expect("canonical receipt always serializes");
        let signature = sign(&self.secret, &payload);

        Receipt {
            id,
            key: key.to_string(),
            previous_value,
            new_value,
            operator_id: operator_id.to_string(),
            reason: reason.to_string(),
            action,
            expires_at,
            timestamp,
            signature,
        }
    }

    /// Verify a receipt's signature against the configured secret (testable
    /// invariant 4).
    pub fn verify_receipt(&self, receipt: &Receipt) -> bool {
        let canonical = CanonicalReceipt {
            id: receipt.id,
            key: &receipt.key,
            previous_value: &receipt.previous_value,
            new_value: &receipt.new_value,
            operator_id: &receipt.operator_id,
            action: receipt.action,
            timestamp: receipt.timestamp,
        };
        let payload = serde_json::to_vec(&canonical).expect("canonical receipt always serializes");
        sign(&self.secret, &payload) == receipt.signature
    }

    pub fn receipts(&self) -> Vec<Receipt> {
        self.receipts.read().clone()
    }

    fn check_safety(&self, item: &ConfigItem, current: &Value, new: &Value) -> Result<(), BrainError> {
        match item.safety {
            Safety::Immutable => Err(BrainError::SafetyViolation(format!(
                "{} is immutable",
                item.key
            ))),
            Safety::TightenOnly => {
                let dir = item
                    .risk_direction
                    .expect("new() refuses to load tighten_only keys without a direction");
                let (cur, new) = (
                    current.as_f64().ok_or_else(|| BrainError::Validation("non-numeric current value".into()))?,
                    new.as_f64().ok_or_else(|| BrainError::Validation("non-numeric new value".into()))?,
                );
                let ok = match dir {
                    crate::config::catalog::RiskDirection::HigherIsRiskier => new <= cur,
                    crate::config::catalog::RiskDirection::LowerIsRiskier => new >= cur,
                };
                if ok {
                    Ok(())
                } else {
                    Err(BrainError::SafetyViolation(format!(
                        "{} is tighten_only ({:?}): {new} is riskier than {cur}",
                        item.key, dir
                    )))
                }
            }
            Safety::RaiseOnly => {
                let (cur, new) = (
                    current.as_f64().ok_or_else(|| BrainError::Validation("non-numeric current value".into()))?,
                    new.as_f64().ok_or_else(|| BrainError::Validation("non-numeric new value".into()))?,
                );
                if new >= cur {
                    Ok(())
                } else {
                    Err(BrainError::SafetyViolation(format!(
                        "{} is raise_only: {new} < {cur}",
                        item.key
                    )))
                }
            }
            Safety::AppendOnly => {
                let (cur, new) = (
                    current.as_array().ok_or_else(|| BrainError::Validation("expected array".into()))?,
                    new.as_array().ok_or_else(|| BrainError::Validation("expected array".into()))?,
                );
                if cur.iter().all(|v| new.contains(v)) {
                    Ok(())
                } else {
                    Err(BrainError::SafetyViolation(format!(
                        "{} is append_only: new value drops existing elements",
                        item.key
                    )))
                }
            }
            Safety::Tunable => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::catalog::{keys, seed};

    fn registry() -> ConfigRegistry {
        ConfigRegistry::new(seed(), b"test-secret".to_vec()).unwrap()
    }

    #[test]
    fn tighten_only_key_without_direction_is_rejected_at_load() {
        let bad = ConfigItem {
            key: "risk.bad",
            title: "bad",
            description: "bad",
            category: "risk",
            safety: Safety::TightenOnly,
            apply: crate::config::catalog::ApplyMode::Live,
            schema: crate::config::catalog::ValueSchema::number(None, None),
            default: serde_json::json!(1.0),
            risk_direction: None,
            secret: false,
        };
        let err = ConfigRegistry::new(vec![bad], b"s".to_vec()).unwrap_err();
        assert!(matches!(err, BrainError::Fatal(_)));
    }

    #[tokio::test]
    async fn tighten_only_violation_rejected_s3() {
        let reg = registry();
        let err = reg
            .create_override(
                keys::RISK_MAX_ACCOUNT_LEVERAGE,
                serde_json::json!(20.0),
                "op1",
                "raise leverage",
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BrainError::SafetyViolation(_)));
        assert_eq!(reg.get_f64(keys::RISK_MAX_ACCOUNT_LEVERAGE), 10.0);
        assert!(reg.receipts().is_empty());
    }

    #[tokio::test]
    async fn tighten_only_lowering_succeeds() {
        let reg = registry();
        let receipt = reg
            .create_override(
                keys::RISK_MAX_ACCOUNT_LEVERAGE,
                serde_json::json!(5.0),
                "op1",
                "lower leverage",
                None,
            )
            .await
            .unwrap();
        assert_eq!(reg.get_f64(keys::RISK_MAX_ACCOUNT_LEVERAGE), 5.0);
        assert!(reg.verify_receipt(&receipt));
    }

    #[tokio::test]
    async fn round_trip_override_then_rollback() {
        let reg = registry();
        reg.create_override(
            keys::RISK_MAX_ACCOUNT_LEVERAGE,
            serde_json::json!(3.0),
            "op1",
            "tighten",
            None,
        )
        .await
        .unwrap();
        reg.rollback_override(keys::RISK_MAX_ACCOUNT_LEVERAGE, "op1")
            .await
            .unwrap();
        assert_eq!(reg.get_f64(keys::RISK_MAX_ACCOUNT_LEVERAGE), 10.0);
        assert_eq!(reg.receipts().len(), 2);
    }

    #[tokio::test]
    async fn at_most_one_active_override_per_key() {
        let reg = registry();
        reg.create_override(keys::RISK_MAX_ACCOUNT_LEVERAGE, serde_json::json!(8.0), "op1", "a", None)
            .await
            .unwrap();
        reg.create_override(keys::RISK_MAX_ACCOUNT_LEVERAGE, serde_json::json!(6.0), "op1", "b", None)
            .await
            .unwrap();
        assert_eq!(reg.active_overrides.read().len(), 1);
        assert_eq!(reg.get_f64(keys::RISK_MAX_ACCOUNT_LEVERAGE), 6.0);
    }

    #[tokio::test]
    async fn secret_key_is_flagged_for_masking() {
        let reg = registry();
        assert!(!reg.is_secret(keys::RISK_MAX_ACCOUNT_LEVERAGE));
        assert!(!reg.is_secret("no.such.key"));
    }
}
