// =============================================================================
// Allocation Engine — equity-tier weight transitions via smoothstep
// =============================================================================
//
// Maps current equity to per-phase weights and a leverage cap. The "most
// recently computed snapshot, read under a guard, recomputed on demand"
// caching idiom mirrors `RegimeDetector::current_regime()`.
// =============================================================================

use parking_lot::RwLock;
use serde::Serialize;

use crate::config::catalog::keys;
use crate::config::ConfigRegistry;

/// Per-phase weights, always summing to 1 within floating tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AllocationVector {
    pub w1: f64,
    pub w2: f64,
    pub w3: f64,
}

impl AllocationVector {
    pub const ZERO: AllocationVector = AllocationVector { w1: 0.0, w2: 0.0, w3: 0.0 };

    pub fn get(&self, phase: crate::types::PhaseId) -> f64 {
        match phase {
            crate::types::PhaseId::P1 => self.w1,
            crate::types::PhaseId::P2 => self.w2,
            crate::types::PhaseId::P3 => self.w3,
            crate::types::PhaseId::Manual => 0.0,
        }
    }

    /// `Sigma w_i = 1 +/- 1e-9` and each `w_i` in `[0,1]` (spec invariant 5).
    pub fn is_valid(&self) -> bool {
        let sum = self.w1 + self.w2 + self.w3;
        (sum - 1.0).abs() <= 1e-9
            && (0.0..=1.0).contains(&self.w1)
            && (0.0..=1.0).contains(&self.w2)
            && (0.0..=1.0).contains(&self.w3)
    }

    fn renormalize(self) -> Self {
        let sum = self.w1 + self.w2 + self.w3;
        if sum <= 0.0 {
            return Self::ZERO;
        }
        Self {
            w1: self.w1 / sum,
            w2: self.w2 / sum,
            w3: self.w3 / sum,
        }
    }

    fn lerp(a: Self, b: Self, t: f64) -> Self {
        let s = smoothstep(t);
        Self {
            w1: a.w1 + (b.w1 - a.w1) * s,
            w2: a.w2 + (b.w2 - a.w2) * s,
            w3: a.w3 + (b.w3 - a.w3) * s,
        }
        .renormalize()
    }
}

/// `s(x) = 3x^2 - 2x^3`, `x` clamped to `[0,1]` first.
fn smoothstep(x: f64) -> f64 {
    let x = x.clamp(0.0, 1.0);
    3.0 * x * x - 2.0 * x * x * x
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tier {
    Micro,
    Small,
    Medium,
    Large,
    Institutional,
}

impl Tier {
    pub fn max_leverage(self) -> f64 {
        match self {
            Tier::Micro => 20.0,
            Tier::Small => 10.0,
            Tier::Medium => 5.0,
            Tier::Large => 3.0,
            Tier::Institutional => 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocationSnapshot {
    pub equity: f64,
    pub tier: Tier,
    pub computed: AllocationVector,
    pub effective: AllocationVector,
    pub max_leverage: f64,
    pub manual_override_active: bool,
}

struct TierBounds {
    start_p2: f64,
    full_p2: f64,
    start_p3: f64,
}

/// Classify `equity` into a tier and its anchor vector, given the
/// configured transition points.
fn classify(equity: f64, bounds: &TierBounds) -> (Tier, AllocationVector) {
    let TierBounds { start_p2, full_p2, start_p3 } = *bounds;

    if equity < start_p2 {
        (Tier::Micro, AllocationVector { w1: 1.0, w2: 0.0, w3: 0.0 })
    } else if equity < full_p2 {
        let t = (equity - start_p2) / (full_p2 - start_p2).max(f64::EPSILON);
        let from = AllocationVector { w1: 0.8, w2: 0.2, w3: 0.0 };
        let to = AllocationVector { w1: 0.2, w2: 0.8, w3: 0.0 };
        (Tier::Small, AllocationVector::lerp(from, to, t))
    } else if equity < start_p3 {
        (Tier::Medium, AllocationVector { w1: 0.2, w2: 0.8, w3: 0.0 })
    } else if equity < 2.0 * start_p3 {
        let t = (equity - start_p3) / start_p3.max(f64::EPSILON);
        let from = AllocationVector { w1: 0.2, w2: 0.8, w3: 0.0 };
        let to = AllocationVector { w1: 0.2, w2: 0.4, w3: 0.4 };
        (Tier::Large, AllocationVector::lerp(from, to, t))
    } else {
        (Tier::Institutional, AllocationVector { w1: 0.1, w2: 0.4, w3: 0.5 })
    }
}

/// An active manual allocation override (set via the config registry or a
/// dedicated admin call; validated the same way a config override is).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ManualOverride {
    pub vector: AllocationVector,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub struct AllocationEngine {
    snapshot: RwLock<AllocationSnapshot>,
    manual_override: RwLock<Option<ManualOverride>>,
}

impl AllocationEngine {
    pub fn new(initial_equity: f64, config: &ConfigRegistry) -> Self {
        let snapshot = Self::compute(initial_equity, config, None);
        Self {
            snapshot: RwLock::new(snapshot),
            manual_override: RwLock::new(None),
        }
    }

    fn compute(
        equity: f64,
        config: &ConfigRegistry,
        manual_override: Option<ManualOverride>,
    ) -> AllocationSnapshot {
        let bounds = TierBounds {
            start_p2: config.get_f64(keys::ALLOC_START_P2),
            full_p2: config.get_f64(keys::ALLOC_FULL_P2),
            start_p3: config.get_f64(keys::ALLOC_START_P3),
        };
        let (tier, computed) = classify(equity, &bounds);

        let now = chrono::Utc::now();
        let active_override = manual_override.filter(|o| {
            o.expires_at.map(|e| e > now).unwrap_or(true) && o.vector.is_valid()
        });

        let effective = active_override.map(|o| o.vector).unwrap_or(computed);

        AllocationSnapshot {
            equity,
            tier,
            computed,
            effective,
            max_leverage: tier.max_leverage(),
            manual_override_active: active_override.is_some(),
        }
    }

    /// Recompute and publish a fresh snapshot for the given equity.
    pub fn refresh(&self, equity: f64, config: &ConfigRegistry) {
        let manual = *self.manual_override.read();
        let snap = Self::compute(equity, config, manual);
        *self.snapshot.write() = snap;
    }

    pub fn set_manual_override(&self, vector: AllocationVector, expires_at: Option<chrono::DateTime<chrono::Utc>>) -> Result<(), String> {
        if !vector.is_valid() {
            return Err("override vector does not satisfy sum=1 and w_i in [0,1]".to_string());
        }
        *self.manual_override.write() = Some(ManualOverride { vector, expires_at });
        Ok(())
    }

    pub fn clear_manual_override(&self) {
        *self.manual_override.write() = None;
    }

    pub fn current(&self) -> AllocationSnapshot {
        self.snapshot.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::catalog::seed;

    fn registry() -> ConfigRegistry {
        ConfigRegistry::new(seed(), b"s".to_vec()).unwrap()
    }

    #[test]
    fn s1_micro_tier() {
        let reg = registry();
        let eng = AllocationEngine::new(800.0, &reg);
        let snap = eng.current();
        assert_eq!(snap.tier, Tier::Micro);
        assert_eq!(snap.max_leverage, 20.0);
        assert!((snap.effective.w1 - 1.0).abs() < 1e-9);
        assert_eq!(snap.effective.w2, 0.0);
    }

    #[test]
    fn boundary_at_start_p2_is_small_tier_800020() {
        let reg = registry();
        let eng = AllocationEngine::new(1500.0, &reg);
        let snap = eng.current();
        assert_eq!(snap.tier, Tier::Small);
        assert!((snap.effective.w1 - 0.8).abs() < 1e-9);
        assert!((snap.effective.w2 - 0.2).abs() < 1e-9);
    }

    #[test]
    fn boundary_at_full_p2_is_0_2_0_8() {
        let reg = registry();
        let eng = AllocationEngine::new(5000.0, &reg);
        let snap = eng.current();
        assert!((snap.effective.w1 - 0.2).abs() < 1e-9);
        assert!((snap.effective.w2 - 0.8).abs() < 1e-9);
    }

    #[test]
    fn vector_always_normalized() {
        let reg = registry();
        for equity in [0.0, 100.0, 1500.0, 3000.0, 5000.0, 10000.0, 25000.0, 40000.0, 100000.0] {
            let eng = AllocationEngine::new(equity, &reg);
            assert!(eng.current().effective.is_valid(), "equity={equity}");
        }
    }

    #[test]
    fn manual_override_takes_precedence() {
        let reg = registry();
        let eng = AllocationEngine::new(800.0, &reg);
        eng.set_manual_override(AllocationVector { w1: 0.5, w2: 0.5, w3: 0.0 }, None)
            .unwrap();
        eng.refresh(800.0, &reg);
        let snap = eng.current();
        assert!(snap.manual_override_active);
        assert_eq!(snap.effective, AllocationVector { w1: 0.5, w2: 0.5, w3: 0.0 });
        assert_eq!(snap.computed.w1, 1.0);
    }

    #[test]
    fn invalid_manual_override_rejected() {
        let reg = registry();
        let eng = AllocationEngine::new(800.0, &reg);
        let err = eng
            .set_manual_override(AllocationVector { w1: 0.9, w2: 0.9, w3: 0.0 }, None)
            .unwrap_err();
        assert!(err.contains("sum=1"));
    }
}
