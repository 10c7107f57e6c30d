use crate::domain::evaluation::context::EvalContext;
use crate::domain::indicators;
use crate::domain::market::Timeframe;
use crate::domain::rule::trigger::{Condition, IndicatorKind, IndicatorParams};

/// Pure indicator-family evaluator (spec §4.2, "Indicator"): "Given the
/// instrument's candle buffer for the specified timeframe, compute the
/// indicator via C3 and compare current value against `value` using
/// `lte/gte/crosses_*`. Insufficient history ⇒ no fire."
///
/// Crossing conditions compare the indicator computed over all completed
/// candles (`current`) against the indicator computed one bar earlier
/// (`previous`), recomputed from a one-shorter slice -- the indicator
/// engine is stateless, so this is the only way to express "the prior
/// value" without smuggling mutable state into the kernel.
pub fn evaluate(
    indicator: IndicatorKind,
    timeframe: Timeframe,
    condition: Condition,
    threshold: f64,
    params: &serde_json::Value,
    ctx: &EvalContext,
) -> bool {
    let Ok(typed_params) = IndicatorParams::parse(indicator, params) else {
        return false;
    };
    let candles = ctx.candles_for(timeframe);

    let Some(current) = compute(indicator, typed_params, candles) else {
        return false;
    };

    match condition {
        Condition::Lte => current <= threshold,
        Condition::Gte => current >= threshold,
        Condition::CrossesAbove | Condition::CrossesBelow => {
            if candles.is_empty() {
                return false;
            }
            let Some(previous) = compute(indicator, typed_params, &candles[..candles.len() - 1])
            else {
                return false;
            };
            match condition {
                Condition::CrossesAbove => previous < threshold && current >= threshold,
                Condition::CrossesBelow => previous > threshold && current <= threshold,
                _ => unreachable!(),
            }
        }
    }
}

fn compute(
    indicator: IndicatorKind,
    params: IndicatorParams,
    candles: &[crate::domain::market::Candle],
) -> Option<f64> {
    match (indicator, params) {
        (IndicatorKind::Rsi, IndicatorParams::Rsi { period }) => indicators::rsi(candles, period),
        (IndicatorKind::Macd, IndicatorParams::Macd) => indicators::macd_histogram(candles),
        (IndicatorKind::EmaCrossover, IndicatorParams::EmaCrossover { fast, slow }) => {
            indicators::ema_crossover(candles, fast, slow)
        }
        (IndicatorKind::VolumeSpike, IndicatorParams::VolumeSpike { lookback, multiplier }) => {
            indicators::volume_spike(candles, lookback, multiplier)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn candles_with_spike() -> Vec<crate::domain::market::Candle> {
        let mut v: Vec<_> = (0..5)
            .map(|i| crate::domain::market::Candle {
                timestamp: i * 60,
                open: dec!(100),
                high: dec!(100),
                low: dec!(100),
                close: dec!(100),
                volume: dec!(10),
            })
            .collect();
        v.push(crate::domain::market::Candle {
            timestamp: 5 * 60,
            open: dec!(100),
            high: dec!(100),
            low: dec!(100),
            close: dec!(100),
            volume: dec!(200),
        });
        v
    }

    #[test]
    fn volume_spike_indicator_fires_on_gte() {
        let candles = candles_with_spike();
        let mut ctx = EvalContext::at(Utc::now());
        let mut by_tf = HashMap::new();
        by_tf.insert(Timeframe::OneMin, candles.as_slice());
        ctx.candles_by_timeframe = by_tf;

        let fired = evaluate(
            IndicatorKind::VolumeSpike,
            Timeframe::OneMin,
            Condition::Gte,
            3.0,
            &serde_json::json!({"lookback": 5, "multiplier": 3.0}),
            &ctx,
        );
        assert!(fired);
    }

    #[test]
    fn insufficient_history_never_fires() {
        let ctx = EvalContext::at(Utc::now());
        let fired = evaluate(
            IndicatorKind::Rsi,
            Timeframe::OneMin,
            Condition::Lte,
            30.0,
            &serde_json::json!({"period": 14}),
            &ctx,
        );
        assert!(!fired);
    }
}
