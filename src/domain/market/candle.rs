use super::timeframe::Timeframe;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A single OHLCV bar. `timestamp` is the bar's start time (unix seconds),
/// always aligned to its timeframe's window boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    fn new(price: Decimal, volume: Decimal, window_start: i64) -> Self {
        Self {
            timestamp: window_start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    fn update(&mut self, price: Decimal, volume: Decimal) {
        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;
        self.volume += volume;
    }
}

/// Per (user x instrument x timeframe) ring of OHLCV bars (spec §3, §4.3).
///
/// The tail element is the in-progress bar; `get_completed_candles` excludes
/// it, matching the spec's guidance that indicators should generally compute
/// over completed history only.
#[derive(Debug)]
pub struct CandleBuffer {
    timeframe: Timeframe,
    max_candles: usize,
    bars: VecDeque<Candle>,
    seeded: bool,
    // Whether the tail bar is still open for in-place mutation by add_tick.
    // Seeded bars are historical and finalized, so a seed leaves this false;
    // the next tick always opens a fresh bar rather than reopening history.
    tail_is_live: bool,
}

impl CandleBuffer {
    pub fn new(timeframe: Timeframe, max_candles: usize) -> Self {
        Self {
            timeframe,
            max_candles,
            bars: VecDeque::with_capacity(max_candles),
            seeded: false,
            tail_is_live: false,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Bulk-loads historical bars in ascending time order to prime
    /// indicators. Bars loaded this way are considered finalized: later
    /// ticks whose timestamps fall in their windows never mutate them --
    /// the next `add_tick` always opens a fresh bar instead of reopening
    /// the seeded tail.
    pub fn seed(&mut self, historical: Vec<Candle>) {
        for bar in historical {
            self.push_bounded(bar);
        }
        self.seeded = true;
        self.tail_is_live = false;
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Folds one tick into the buffer. Appends a fresh bar when the tick
    /// falls in a new window; otherwise mutates the in-progress tail bar.
    pub fn add_tick(&mut self, price: Decimal, volume: Decimal, ts_secs: i64) {
        let window_start = self.timeframe.window_start(ts_secs);

        match self.bars.back_mut() {
            Some(tail) if self.tail_is_live && tail.timestamp == window_start => {
                tail.update(price, volume);
            }
            _ => {
                let bar = Candle::new(price, volume, window_start);
                self.push_bounded(bar);
                self.tail_is_live = true;
            }
        }
    }

    fn push_bounded(&mut self, bar: Candle) {
        self.bars.push_back(bar);
        while self.bars.len() > self.max_candles {
            self.bars.pop_front();
        }
    }

    /// All bars including the in-progress tail one.
    pub fn get_candles(&self) -> Vec<Candle> {
        self.bars.iter().copied().collect()
    }

    /// All bars excluding the in-progress tail one.
    pub fn get_completed_candles(&self) -> Vec<Candle> {
        let len = self.bars.len();
        if len == 0 {
            return Vec::new();
        }
        self.bars.iter().take(len - 1).copied().collect()
    }
}
