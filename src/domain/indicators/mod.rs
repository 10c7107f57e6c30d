//! Candle Buffer & Indicator Engine (C3, spec §4.3): "a dispatch table keyed
//! by name; each entry returns a scalar or null-if-insufficient-data. No
//! iteration order assumptions."
//!
//! Each function is re-derived from scratch over the candle slice it is
//! given rather than carrying incremental state across calls, so the
//! evaluator kernel can treat indicator values as pure functions of
//! `(candles, params)` -- recomputing the value one bar earlier (for
//! `crosses_above`/`crosses_below`) is just calling the same function on a
//! shorter slice.

use crate::domain::market::Candle;
use ta::indicators::{
    ExponentialMovingAverage, MovingAverageConvergenceDivergence, RelativeStrengthIndex,
};
use ta::Next;

/// `rsi(period)` (spec §4.2): Wilder relative strength index over closing
/// prices. Null until at least `period + 1` closes are available.
pub fn rsi(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.len() <= period {
        return None;
    }
    let mut indicator = RelativeStrengthIndex::new(period).ok()?;
    let mut value = None;
    for c in candles {
        value = Some(indicator.next(close_f64(c)));
    }
    value
}

/// `macd_histogram()` (spec §4.2): MACD histogram (fast=12, slow=26,
/// signal=9) over closing prices, using the standard default periods since
/// the trigger schema does not expose them.
pub fn macd_histogram(candles: &[Candle]) -> Option<f64> {
    const SLOW: usize = 26;
    const SIGNAL: usize = 9;
    if candles.len() < SLOW + SIGNAL {
        return None;
    }
    let mut indicator = MovingAverageConvergenceDivergence::new(12, SLOW, SIGNAL).ok()?;
    let mut value = None;
    for c in candles {
        value = Some(indicator.next(close_f64(c)).histogram);
    }
    value
}

/// `ema_crossover(fast, slow)` (spec §4.2): "returns fast - slow". Positive
/// once the fast average has crossed above the slow average.
pub fn ema_crossover(candles: &[Candle], fast: usize, slow: usize) -> Option<f64> {
    if candles.len() < slow {
        return None;
    }
    let mut fast_ema = ExponentialMovingAverage::new(fast).ok()?;
    let mut slow_ema = ExponentialMovingAverage::new(slow).ok()?;
    let mut value = None;
    for c in candles {
        let price = close_f64(c);
        value = Some(fast_ema.next(price) - slow_ema.next(price));
    }
    value
}

/// `volume_spike(lookback, multiplier)` (spec §4.2): "returns current/avg
/// ratio" of the latest bar's volume against the mean of the preceding
/// `lookback` bars.
pub fn volume_spike(candles: &[Candle], lookback: usize, multiplier: f64) -> Option<f64> {
    let _ = multiplier; // the ratio itself is returned; the caller compares it against `value`.
    if candles.len() <= lookback {
        return None;
    }
    let (history, current) = candles.split_at(candles.len() - 1);
    let window = &history[history.len() - lookback..];
    let avg: f64 = window
        .iter()
        .map(|c| c.volume.to_string().parse::<f64>().unwrap_or(0.0))
        .sum::<f64>()
        / lookback as f64;
    if avg == 0.0 {
        return None;
    }
    let current_volume = current[0].volume.to_string().parse::<f64>().unwrap_or(0.0);
    Some(current_volume / avg)
}

fn close_f64(c: &Candle) -> f64 {
    c.close.to_string().parse::<f64>().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(close: rust_decimal::Decimal, volume: rust_decimal::Decimal, ts: i64) -> Candle {
        Candle {
            timestamp: ts,
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }

    #[test]
    fn rsi_is_null_until_enough_history() {
        let candles = vec![candle(dec!(100), dec!(1), 0), candle(dec!(101), dec!(1), 60)];
        assert_eq!(rsi(&candles, 14), None);
    }

    #[test]
    fn volume_spike_detects_a_spike_bar() {
        let mut candles: Vec<Candle> = (0..5)
            .map(|i| candle(dec!(100), dec!(10), i * 60))
            .collect();
        candles.push(candle(dec!(100), dec!(100), 5 * 60));
        let ratio = volume_spike(&candles, 5, 3.0).unwrap();
        assert!(ratio >= 9.0 && ratio <= 11.0);
    }

    #[test]
    fn volume_spike_null_without_enough_lookback() {
        let candles = vec![candle(dec!(100), dec!(10), 0)];
        assert_eq!(volume_spike(&candles, 5, 3.0), None);
    }
}
