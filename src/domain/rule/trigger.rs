use super::weekday::Weekday;
use crate::domain::market::Timeframe;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::time_of_day::TimeOfDay;

/// Comparison used by `price` and `indicator` triggers (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Lte,
    Gte,
    CrossesAbove,
    CrossesBelow,
}

/// Which field of the market snapshot a price/indicator trigger reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceReference {
    Ltp,
    Bid,
    Ask,
    Open,
    High,
    Low,
}

/// The indicator family named by an `indicator` trigger (spec §4.2,
/// "Concrete indicators implemented").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Rsi,
    Macd,
    EmaCrossover,
    VolumeSpike,
}

/// Typed, per-kind indicator parameters, materialized from the trigger's
/// generic `params` JSON object (spec §3 trigger table: "params"). Kept as
/// a separate type from `IndicatorKind` -- rather than one serde-tagged
/// enum merging both -- so the wire shape matches the spec's literal
/// `{indicator, params}` pair instead of a single discriminated union.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorParams {
    Rsi { period: usize },
    Macd,
    EmaCrossover { fast: usize, slow: usize },
    VolumeSpike { lookback: usize, multiplier: f64 },
}

impl IndicatorParams {
    pub fn parse(kind: IndicatorKind, params: &serde_json::Value) -> anyhow::Result<Self> {
        let get_usize = |key: &str| -> anyhow::Result<usize> {
            params
                .get(key)
                .and_then(|v| v.as_u64())
                .map(|v| v as usize)
                .ok_or_else(|| anyhow::anyhow!("indicator params missing required field '{}'", key))
        };
        let get_f64 = |key: &str| -> anyhow::Result<f64> {
            params
                .get(key)
                .and_then(|v| v.as_f64())
                .ok_or_else(|| anyhow::anyhow!("indicator params missing required field '{}'", key))
        };

        match kind {
            IndicatorKind::Rsi => Ok(IndicatorParams::Rsi {
                period: get_usize("period")?,
            }),
            IndicatorKind::Macd => Ok(IndicatorParams::Macd),
            IndicatorKind::EmaCrossover => Ok(IndicatorParams::EmaCrossover {
                fast: get_usize("fast")?,
                slow: get_usize("slow")?,
            }),
            IndicatorKind::VolumeSpike => Ok(IndicatorParams::VolumeSpike {
                lookback: get_usize("lookback")?,
                multiplier: get_f64("multiplier")?,
            }),
        }
    }
}

/// One of the six trigger families (spec §3, "Trigger Configurations").
///
/// Tagged on `type` so the `trigger_type` column and JSON config in the
/// store absorb new families without a schema migration (spec §4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerConfig {
    Price {
        condition: Condition,
        price: Decimal,
        reference: PriceReference,
    },
    Time {
        at: TimeOfDay,
        on_days: Vec<Weekday>,
        #[serde(default)]
        market_only: bool,
    },
    Indicator {
        indicator: IndicatorKind,
        timeframe: Timeframe,
        condition: Condition,
        value: f64,
        #[serde(default)]
        params: serde_json::Value,
    },
    OrderStatus {
        order_id: String,
        status: crate::domain::market::OrderStatus,
    },
    Compound {
        operator: BoolOperator,
        conditions: Vec<TriggerConfig>,
    },
    TrailingStop {
        trail_percent: Decimal,
        initial_price: Decimal,
        highest_price: Decimal,
        reference: PriceReference,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolOperator {
    And,
    Or,
}

/// Maximum nesting depth for `compound` triggers (spec §9, "Compound
/// recursion... a small explicit depth limit (<=4) avoids pathological
/// inputs").
pub const MAX_COMPOUND_DEPTH: usize = 4;

impl TriggerConfig {
    /// Schema + invariant validation performed at write time (spec §4.1).
    /// Unknown fields are already silently ignored by serde; this catches
    /// the invariants serde alone cannot express, including materializing
    /// and checking each indicator's typed params.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_at_depth(0)
    }

    fn validate_at_depth(&self, depth: usize) -> anyhow::Result<()> {
        if depth > MAX_COMPOUND_DEPTH {
            anyhow::bail!(
                "compound trigger nesting exceeds max depth {}",
                MAX_COMPOUND_DEPTH
            );
        }

        match self {
            TriggerConfig::Price { price, .. } => {
                if *price <= Decimal::ZERO {
                    anyhow::bail!("price trigger price must be positive");
                }
                Ok(())
            }
            TriggerConfig::Time { on_days, .. } => {
                if on_days.is_empty() {
                    anyhow::bail!("time trigger must specify at least one weekday");
                }
                Ok(())
            }
            TriggerConfig::Indicator {
                indicator,
                value,
                params,
                ..
            } => {
                if !value.is_finite() {
                    anyhow::bail!("indicator trigger value must be finite");
                }
                match IndicatorParams::parse(*indicator, params)? {
                    IndicatorParams::Rsi { period } if period < 2 => {
                        anyhow::bail!("rsi period must be >= 2")
                    }
                    IndicatorParams::EmaCrossover { fast, slow } if fast >= slow => {
                        anyhow::bail!("ema_crossover requires fast < slow")
                    }
                    IndicatorParams::VolumeSpike {
                        lookback,
                        multiplier,
                    } if lookback == 0 || multiplier <= 0.0 => {
                        anyhow::bail!("volume_spike requires lookback > 0 and multiplier > 0")
                    }
                    _ => Ok(()),
                }
            }
            TriggerConfig::OrderStatus { order_id, .. } => {
                if order_id.trim().is_empty() {
                    anyhow::bail!("order_status trigger requires a non-empty order_id");
                }
                Ok(())
            }
            TriggerConfig::Compound { conditions, .. } => {
                if conditions.is_empty() {
                    anyhow::bail!("compound trigger requires at least one sub-condition");
                }
                for c in conditions {
                    c.validate_at_depth(depth + 1)?;
                }
                Ok(())
            }
            TriggerConfig::TrailingStop { trail_percent, .. } => {
                if *trail_percent < Decimal::ZERO {
                    anyhow::bail!("trailing_stop trail_percent must not be negative");
                }
                Ok(())
            }
        }
    }

    /// True for families whose evaluation needs a live market snapshot, per
    /// spec §4.5 `extract_instruments`: `{price, indicator, compound,
    /// trailing_stop}` need market data; `time` and `order_status` don't.
    pub fn needs_market_data(&self) -> bool {
        match self {
            TriggerConfig::Price { .. }
            | TriggerConfig::Indicator { .. }
            | TriggerConfig::TrailingStop { .. } => true,
            TriggerConfig::Compound { conditions, .. } => {
                conditions.iter().any(|c| c.needs_market_data())
            }
            TriggerConfig::Time { .. } | TriggerConfig::OrderStatus { .. } => false,
        }
    }
}
