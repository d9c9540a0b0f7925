// =============================================================================
// Config Registry — catalog of tunable parameters
// =============================================================================
//
// Every tunable parameter the rest of the core reads lives here as a seeded
// `ConfigItem`, the same "one `default_x()` helper per field" discipline the
// source used for `RuntimeConfig`, generalised into a data-driven catalog so
// items can carry safety/schema metadata and be overridden at runtime.
// =============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Safety semantics governing how a key's effective value may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Safety {
    Immutable,
    TightenOnly,
    RaiseOnly,
    AppendOnly,
    Tunable,
}

/// For `tighten_only` keys, which direction of numeric change is "safer".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskDirection {
    HigherIsRiskier,
    LowerIsRiskier,
}

/// Coarse value-schema description used to validate override payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueSchema {
    Number { min: Option<f64>, max: Option<f64> },
    Integer { min: Option<i64>, max: Option<i64> },
    Bool,
    Enum { variants: Vec<String> },
    Array { element: Box<ValueSchema> },
}

impl ValueSchema {
    pub fn number(min: Option<f64>, max: Option<f64>) -> Self {
        Self::Number { min, max }
    }

    /// Validate that `value` satisfies this schema's type and bounds.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        match self {
            ValueSchema::Number { min, max } => {
                let n = value
                    .as_f64()
                    .ok_or_else(|| "expected a number".to_string())?;
                if let Some(min) = min {
                    if n < *min {
                        return Err(format!("{n} is below minimum {min}"));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(format!("{n} is above maximum {max}"));
                    }
                }
                Ok(())
            }
            ValueSchema::Integer { min, max } => {
                let n = value
                    .as_i64()
                    .ok_or_else(|| "expected an integer".to_string())?;
                if let Some(min) = min {
                    if n < *min {
                        return Err(format!("{n} is below minimum {min}"));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(format!("{n} is above maximum {max}"));
                    }
                }
                Ok(())
            }
            ValueSchema::Bool => value
                .as_bool()
                .map(|_| ())
                .ok_or_else(|| "expected a bool".to_string()),
            ValueSchema::Enum { variants } => {
                let s = value
                    .as_str()
                    .ok_or_else(|| "expected a string".to_string())?;
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(format!("{s} is not one of {variants:?}"))
                }
            }
            ValueSchema::Array { element } => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| "expected an array".to_string())?;
                for item in arr {
                    element.validate(item)?;
                }
                Ok(())
            }
        }
    }
}

/// A catalog entry describing one tunable parameter (spec §3 "Config item").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigItem {
    pub key: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub safety: Safety,
    pub apply: ApplyMode,
    pub schema: ValueSchema,
    pub default: Value,
    pub risk_direction: Option<RiskDirection>,
    /// Masked as `*****` on every read path; a write of the masked sentinel
    /// back to this key is a no-op (spec §6). No current catalog key is an
    /// actual secret, but the mechanism exists independent of that.
    pub secret: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    Live,
    Restart,
    Deploy,
}

/// Dotted key constants, grouped by owning component.
pub mod keys {
    pub const RISK_MAX_ACCOUNT_LEVERAGE: &str = "risk.maxAccountLeverage";
    pub const RISK_ALPHA_VETO_THRESHOLD: &str = "risk.alphaVetoThreshold";
    pub const RISK_MAX_CORRELATION: &str = "risk.maxCorrelation";
    pub const RISK_CORRELATION_PENALTY: &str = "risk.correlationPenalty";
    pub const RISK_MIN_POSITION_FLOOR: &str = "risk.minPositionFloorUsd";
    pub const RISK_CORRELATION_REFRESH_SECS: &str = "risk.correlationRefreshSecs";
    pub const RISK_BETA_REFRESH_SECS: &str = "risk.betaRefreshSecs";

    pub const ALLOC_START_P2: &str = "allocation.startP2";
    pub const ALLOC_FULL_P2: &str = "allocation.fullP2";
    pub const ALLOC_START_P3: &str = "allocation.startP3";

    pub const PERF_WINDOW_DAYS: &str = "performance.windowDays";
    pub const PERF_MIN_TRADE_COUNT: &str = "performance.minTradeCount";
    pub const PERF_MALUS_THRESHOLD: &str = "performance.malusThreshold";
    pub const PERF_MALUS_MULTIPLIER: &str = "performance.malusMultiplier";
    pub const PERF_BONUS_THRESHOLD: &str = "performance.bonusThreshold";
    pub const PERF_BONUS_MULTIPLIER: &str = "performance.bonusMultiplier";

    pub const BREAKER_CONSECUTIVE_LOSS_LIMIT: &str = "breaker.consecutiveLossLimit";
    pub const BREAKER_CONSECUTIVE_LOSS_WINDOW_SECS: &str = "breaker.consecutiveLossWindowSecs";
    pub const BREAKER_SOFT_COOLDOWN_SECS: &str = "breaker.softCooldownSecs";
    pub const BREAKER_MAX_DAILY_DRAWDOWN: &str = "breaker.maxDailyDrawdown";
    pub const BREAKER_MIN_EQUITY: &str = "breaker.minEquity";

    pub const TREASURY_RESERVE_FLOOR: &str = "treasury.reserveFloorUsd";
    pub const TREASURY_SWEEP_THRESHOLD_FRAC: &str = "treasury.sweepThresholdFrac";
    pub const TREASURY_MAX_RETRIES: &str = "treasury.maxRetries";
    pub const TREASURY_RETRY_BASE_DELAY_MS: &str = "treasury.retryBaseDelayMs";

    pub const ARB_MAX_SINGLE_POSITION_FRAC: &str = "arbitrator.maxSinglePositionFrac";
    pub const ARB_INTENT_DEADLINE_MS: &str = "arbitrator.intentDeadlineMs";
}

macro_rules! item {
    ($key:expr, $title:expr, $desc:expr, $category:expr, $safety:expr, $apply:expr, $schema:expr, $default:expr, $direction:expr) => {
        ConfigItem {
            key: $key,
            title: $title,
            description: $desc,
            category: $category,
            safety: $safety,
            apply: $apply,
            schema: $schema,
            default: serde_json::json!($default),
            risk_direction: $direction,
            secret: false,
        }
    };
}

/// Seed the full catalog. Every `tighten_only` item **must** declare a
/// `risk_direction` — `ConfigRegistry::new` refuses to start otherwise (see
/// DESIGN.md, Open Question decision 3).
pub fn seed() -> Vec<ConfigItem> {
    use ApplyMode::*;
    use RiskDirection::*;
    use Safety::*;

    vec![
        item!(
            keys::RISK_MAX_ACCOUNT_LEVERAGE,
            "Max account leverage",
            "Hard ceiling on portfolio leverage used as a secondary guard alongside tier caps",
            "risk",
            TightenOnly,
            Live,
            ValueSchema::number(Some(1.0), Some(50.0)),
            10.0,
            Some(HigherIsRiskier)
        ),
        item!(
            keys::RISK_ALPHA_VETO_THRESHOLD,
            "Tail-risk veto threshold (Hill-alpha)",
            "Below this Hill-alpha estimate, new risk is vetoed as TAIL_RISK",
            "risk",
            TightenOnly,
            Live,
            ValueSchema::number(Some(0.0), Some(10.0)),
            2.0,
            Some(LowerIsRiskier)
        ),
        item!(
            keys::RISK_MAX_CORRELATION,
            "Max pairwise correlation",
            "Above this absolute correlation to an open position, the correlation penalty applies",
            "risk",
            TightenOnly,
            Live,
            ValueSchema::number(Some(0.0), Some(1.0)),
            0.8,
            Some(HigherIsRiskier)
        ),
        item!(
            keys::RISK_CORRELATION_PENALTY,
            "Correlation penalty multiplier",
            "Multiplier applied to candidate notional when the correlation guard fires",
            "risk",
            Tunable,
            Live,
            ValueSchema::number(Some(0.0), Some(1.0)),
            0.5,
            None
        ),
        item!(
            keys::RISK_MIN_POSITION_FLOOR,
            "Minimum position floor (USD)",
            "Below this notional a reduced position is vetoed instead of approved",
            "risk",
            Tunable,
            Live,
            ValueSchema::number(Some(0.0), None),
            25.0,
            None
        ),
        item!(
            keys::RISK_CORRELATION_REFRESH_SECS,
            "Correlation matrix refresh cadence (s)",
            "How often the correlation matrix snapshot is recomputed",
            "risk",
            Tunable,
            Live,
            ValueSchema::Integer { min: Some(10), max: None },
            300,
            None
        ),
        item!(
            keys::RISK_BETA_REFRESH_SECS,
            "Portfolio beta refresh cadence (s)",
            "How often portfolio beta to the reference symbol is recomputed",
            "risk",
            Tunable,
            Live,
            ValueSchema::Integer { min: Some(10), max: None },
            60,
            None
        ),
        item!(
            keys::ALLOC_START_P2,
            "Equity: start of P2 tier (USD)",
            "Equity at which phase-2 allocation begins phasing in",
            "allocation",
            Tunable,
            Live,
            ValueSchema::number(Some(0.0), None),
            1500.0,
            None
        ),
        item!(
            keys::ALLOC_FULL_P2,
            "Equity: full P2 tier (USD)",
            "Equity at which phase-2 allocation reaches its medium-tier weight",
            "allocation",
            Tunable,
            Live,
            ValueSchema::number(Some(0.0), None),
            5000.0,
            None
        ),
        item!(
            keys::ALLOC_START_P3,
            "Equity: start of P3 tier (USD)",
            "Equity at which phase-3 allocation begins phasing in",
            "allocation",
            Tunable,
            Live,
            ValueSchema::number(Some(0.0), None),
            25000.0,
            None
        ),
        item!(
            keys::PERF_WINDOW_DAYS,
            "Performance rolling window (days)",
            "Trade PnL samples older than this are trimmed from the Sharpe calculation",
            "performance",
            Tunable,
            Live,
            ValueSchema::Integer { min: Some(1), max: None },
            7,
            None
        ),
        item!(
            keys::PERF_MIN_TRADE_COUNT,
            "Minimum trade count for modifier",
            "Below this sample count the modifier is a cold-start pass-through of 1.0",
            "performance",
            Tunable,
            Live,
            ValueSchema::Integer { min: Some(1), max: None },
            10,
            None
        ),
        item!(
            keys::PERF_MALUS_THRESHOLD,
            "Sharpe malus threshold",
            "Below this Sharpe the malus multiplier is applied",
            "performance",
            Tunable,
            Live,
            ValueSchema::number(None, None),
            0.0,
            None
        ),
        item!(
            keys::PERF_MALUS_MULTIPLIER,
            "Sharpe malus multiplier",
            "Size modifier applied when Sharpe is below the malus threshold",
            "performance",
            Tunable,
            Live,
            ValueSchema::number(Some(0.0), Some(1.0)),
            0.5,
            None
        ),
        item!(
            keys::PERF_BONUS_THRESHOLD,
            "Sharpe bonus threshold",
            "Above this Sharpe the bonus multiplier is applied",
            "performance",
            Tunable,
            Live,
            ValueSchema::number(None, None),
            2.0,
            None
        ),
        item!(
            keys::PERF_BONUS_MULTIPLIER,
            "Sharpe bonus multiplier",
            "Size modifier applied when Sharpe is above the bonus threshold",
            "performance",
            Tunable,
            Live,
            ValueSchema::number(Some(1.0), Some(3.0)),
            1.2,
            None
        ),
        item!(
            keys::BREAKER_CONSECUTIVE_LOSS_LIMIT,
            "Consecutive loss limit",
            "Number of losses within the rolling window that trips SOFT_HALTED",
            "breaker",
            TightenOnly,
            Live,
            ValueSchema::Integer { min: Some(1), max: None },
            3,
            Some(HigherIsRiskier)
        ),
        item!(
            keys::BREAKER_CONSECUTIVE_LOSS_WINDOW_SECS,
            "Consecutive loss rolling window (s)",
            "Window over which consecutive losses are counted",
            "breaker",
            Tunable,
            Live,
            ValueSchema::Integer { min: Some(60), max: None },
            3600,
            None
        ),
        item!(
            keys::BREAKER_SOFT_COOLDOWN_SECS,
            "Soft-halt cooldown (s)",
            "Duration SOFT_HALTED remains active before automatic exit to INACTIVE",
            "breaker",
            Tunable,
            Live,
            ValueSchema::Integer { min: Some(0), max: None },
            1800,
            None
        ),
        item!(
            keys::BREAKER_MAX_DAILY_DRAWDOWN,
            "Max daily drawdown fraction",
            "Daily drawdown fraction at or above which the breaker hard-halts",
            "breaker",
            TightenOnly,
            Live,
            ValueSchema::number(Some(0.0), Some(1.0)),
            0.15,
            Some(HigherIsRiskier)
        ),
        item!(
            keys::BREAKER_MIN_EQUITY,
            "Minimum equity (USD)",
            "Equity at or below which the breaker hard-halts",
            "breaker",
            TightenOnly,
            Live,
            ValueSchema::number(Some(0.0), None),
            150.0,
            Some(LowerIsRiskier)
        ),
        item!(
            keys::TREASURY_RESERVE_FLOOR,
            "Treasury reserve floor (USD)",
            "Futures wallet balance that must never be swept below",
            "treasury",
            RaiseOnly,
            Live,
            ValueSchema::number(Some(0.0), None),
            200.0,
            None
        ),
        item!(
            keys::TREASURY_SWEEP_THRESHOLD_FRAC,
            "Sweep threshold fraction",
            "Excess above the high watermark, as a fraction of the watermark, that triggers a sweep",
            "treasury",
            Tunable,
            Live,
            ValueSchema::number(Some(0.0), Some(5.0)),
            0.20,
            None
        ),
        item!(
            keys::TREASURY_MAX_RETRIES,
            "Sweep max retries",
            "Maximum retry attempts for a failed sweep movement",
            "treasury",
            Tunable,
            Live,
            ValueSchema::Integer { min: Some(0), max: None },
            3,
            None
        ),
        item!(
            keys::TREASURY_RETRY_BASE_DELAY_MS,
            "Sweep retry base delay (ms)",
            "Base delay for the sweep retry backoff",
            "treasury",
            Tunable,
            Live,
            ValueSchema::Integer { min: Some(0), max: None },
            500,
            None
        ),
        item!(
            keys::ARB_MAX_SINGLE_POSITION_FRAC,
            "Max single position fraction",
            "Ceiling on candidate notional as a fraction of equity * phase weight",
            "arbitrator",
            TightenOnly,
            Live,
            ValueSchema::number(Some(0.0), Some(1.0)),
            1.0,
            Some(HigherIsRiskier)
        ),
        item!(
            keys::ARB_INTENT_DEADLINE_MS,
            "Per-intent processing deadline (ms)",
            "Intents exceeding this deadline are vetoed with TIMEOUT",
            "arbitrator",
            Tunable,
            Live,
            ValueSchema::Integer { min: Some(1), max: None },
            1000,
            None
        ),
    ]
}
