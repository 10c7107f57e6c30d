use crate::domain::market::{Candle, OrderEvent, Timeframe};
use crate::domain::rule::trigger::PriceReference;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// A point-in-time snapshot of the fields a price/indicator trigger can
/// reference (spec §3 trigger table, `reference ∈ {ltp,bid,ask,open,high,low}`).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarketSnapshot {
    pub ltp: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
}

impl MarketSnapshot {
    pub fn get(&self, reference: PriceReference) -> Option<Decimal> {
        match reference {
            PriceReference::Ltp => self.ltp,
            PriceReference::Bid => self.bid,
            PriceReference::Ask => self.ask,
            PriceReference::Open => self.open,
            PriceReference::High => self.high,
            PriceReference::Low => self.low,
        }
    }
}

/// Every input a trigger evaluator may read (spec §4.2, "Purity contract"):
/// "the context carries every input they may need (market_data snapshot,
/// previous reference prices, current time, inbound order event)". Built by
/// the dispatcher (C7), never by the kernel itself.
#[derive(Debug, Clone)]
pub struct EvalContext<'a> {
    pub now: DateTime<Utc>,
    pub market: Option<MarketSnapshot>,
    /// Previous reference price for `crosses_above`/`crosses_below`
    /// comparisons, owned by the dispatcher's per-instrument map (spec §4.7,
    /// "Per-instrument previous-price tracking").
    pub prev_price: Option<Decimal>,
    pub order_event: Option<&'a OrderEvent>,
    /// Completed candles per timeframe for the instrument the rule targets,
    /// used by indicator triggers (spec §4.3 `get_completed_candles`).
    pub candles_by_timeframe: HashMap<Timeframe, &'a [Candle]>,
}

impl<'a> EvalContext<'a> {
    /// Minimal context for time-only / order-status-only evaluation (no
    /// market snapshot needed), used by the 1-Hz time ticker (spec §4.7).
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            market: None,
            prev_price: None,
            order_event: None,
            candles_by_timeframe: HashMap::new(),
        }
    }

    pub fn candles_for(&self, timeframe: Timeframe) -> &[Candle] {
        self.candles_by_timeframe
            .get(&timeframe)
            .copied()
            .unwrap_or(&[])
    }
}
