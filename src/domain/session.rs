//! Per-user session state (spec §3, "UserSession").

use crate::domain::market::{Candle, CandleBuffer, Timeframe};
use crate::domain::rule::Rule;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

/// Access/refresh credential pair for a user's brokerage connection.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credentials {
    /// True once the token is within `threshold` of expiry (spec §4.5,
    /// "refresh_credentials... when the token is within a threshold of
    /// expiry").
    pub fn needs_refresh(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        now + threshold >= self.expires_at
    }
}

/// Whether monitoring is currently active for a user, or paused pending
/// credential recovery (spec §7, `MonitoringPausedError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Paused,
}

/// Holds everything the dispatcher needs for one active user (spec §3,
/// "UserSession... credential tokens, portfolio-stream handle,
/// market-data-stream handle, current instrument subscription set,
/// per-instrument last-reference-price map, candle buffers, and a snapshot
/// of the user's rules").
pub struct UserSession {
    pub user_id: i64,
    pub status: SessionStatus,
    pub credentials: Credentials,
    pub subscribed_instruments: HashSet<i64>,
    /// Last-seen reference price per instrument, used for `crosses_*`
    /// comparisons (spec §4.7, "Per-instrument previous-price tracking").
    pub prev_prices: HashMap<i64, Decimal>,
    /// Candle buffers keyed by `(instrument_token, timeframe)`.
    pub candle_buffers: HashMap<(i64, Timeframe), CandleBuffer>,
    pub rules: Vec<Rule>,
}

impl UserSession {
    pub fn new(user_id: i64, credentials: Credentials, rules: Vec<Rule>) -> Self {
        Self {
            user_id,
            status: SessionStatus::Active,
            credentials,
            subscribed_instruments: HashSet::new(),
            prev_prices: HashMap::new(),
            candle_buffers: HashMap::new(),
            rules,
        }
    }

    /// True once the session no longer guards any enabled rule (spec §3,
    /// "destroyed when their enabled-rule count drops to zero").
    pub fn is_empty(&self) -> bool {
        self.rules.iter().all(|r| !r.enabled)
    }

    /// Removes a rule from the in-memory snapshot, e.g. after OCO
    /// cancellation (spec §4.7, "drop it from the in-memory session
    /// snapshot").
    pub fn drop_rule(&mut self, rule_id: i64) {
        self.rules.retain(|r| r.id != rule_id);
    }

    pub fn candles_for(&self, instrument_token: i64, timeframe: Timeframe) -> &[Candle] {
        self.candle_buffers
            .get(&(instrument_token, timeframe))
            .map(|b| b.get_completed_candles())
            .unwrap_or(&[])
    }
}

/// Union of `instrument_token` across rules whose trigger family needs
/// market data (spec §4.5, `extract_instruments`).
pub fn extract_instruments(rules: &[Rule]) -> HashSet<i64> {
    rules
        .iter()
        .filter(|r| r.enabled && r.trigger_config.needs_market_data())
        .filter_map(|r| r.instrument_token)
        .collect()
}
