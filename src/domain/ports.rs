//! Collaborator interfaces the domain depends on but does not implement
//! (spec §4.4 Rule Store, §4.6 Stream Clients, §6 Brokerage REST API).
//! Implementations live in `infrastructure`.

use crate::domain::market::{OrderEvent, Tick};
use crate::domain::rule::{ActionConfig, FireLog, Rule, TriggerConfig};
use crate::error::MonitorResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc::Receiver;

/// Persistent CRUD and change-feed polling for rules and fire logs
/// (spec §4.4).
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn create_rule(&self, rule: &Rule) -> MonitorResult<Rule>;
    async fn get_rule(&self, id: i64) -> MonitorResult<Option<Rule>>;
    async fn update_rule(&self, rule: &Rule) -> MonitorResult<()>;
    async fn disable_rule(&self, id: i64) -> MonitorResult<()>;
    async fn delete_rule(&self, id: i64) -> MonitorResult<()>;

    /// All enabled, non-expired, non-exhausted rules, optionally scoped to
    /// one user.
    async fn list_active_rules(&self, user_id: Option<i64>) -> MonitorResult<Vec<Rule>>;

    /// Rules whose `updated_at` is strictly newer than `since`, so the
    /// daemon can reload changes without external IPC (spec §4.4, "Polling
    /// helper").
    async fn list_updated_since(&self, since: DateTime<Utc>) -> MonitorResult<Vec<Rule>>;

    /// Transactional: increments `fire_count`, stamps `fired_at`, flips
    /// `enabled=false` if `max_fires` is reached, and appends a `FireLog`
    /// row in the same transaction (spec §4.4, §4.7 "Idempotency").
    async fn record_fire(
        &self,
        rule_id: i64,
        fired_at: DateTime<Utc>,
        trigger_snapshot: serde_json::Value,
        action_taken: serde_json::Value,
        action_result: serde_json::Value,
    ) -> MonitorResult<()>;

    /// Used by the trailing-stop persistence path (spec §4.4).
    async fn update_trigger_config(&self, rule_id: i64, new_config: &TriggerConfig) -> MonitorResult<()>;

    async fn list_logs(&self, rule_id: Option<i64>) -> MonitorResult<Vec<FireLog>>;
}

/// Outcome of a brokerage order call, captured verbatim into the FireLog
/// (spec §3, "action_result").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BrokerOrderAck {
    pub order_id: String,
    pub raw_response: serde_json::Value,
}

/// Opaque brokerage REST collaborator (spec §6, "Brokerage REST API"). The
/// `api_key`/`api_secret` signing pair is process-wide infrastructure; each
/// call is additionally authenticated with the calling user's own
/// `access_token` (spec §4.5, per-user credentials).
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn place_order(&self, access_token: &str, action: &ActionConfig) -> MonitorResult<BrokerOrderAck>;
    async fn cancel_order(&self, access_token: &str, order_id: &str) -> MonitorResult<()>;
    async fn modify_order(
        &self,
        access_token: &str,
        order_id: &str,
        price: Option<Decimal>,
        quantity: Option<Decimal>,
    ) -> MonitorResult<()>;
    /// Used by the CLI at rule creation to snapshot LTP for trailing-stop
    /// initialization (spec §6).
    async fn get_quote(&self, access_token: &str, instrument_token: i64) -> MonitorResult<Decimal>;
    async fn refresh_token(&self, refresh_token: &str) -> MonitorResult<crate::domain::session::Credentials>;
}

/// Order-status event stream, one per user session (spec §4.6, "Portfolio/
/// order event stream").
#[async_trait]
pub trait PortfolioStream: Send + Sync {
    async fn connect(&self, credentials: &crate::domain::session::Credentials) -> MonitorResult<Receiver<OrderEvent>>;
}

/// Tick feed, one per user session (spec §4.6, "Market-data stream").
#[async_trait]
pub trait MarketDataStream: Send + Sync {
    async fn connect(&self, credentials: &crate::domain::session::Credentials) -> MonitorResult<Receiver<Tick>>;
    /// Flushes subscribe/unsubscribe deltas; must be re-issued for the full
    /// desired set immediately after a reconnect (spec §4.6, "Reconnection
    /// must re-subscribe the current instrument set before processing user
    /// data").
    async fn set_subscriptions(&self, instrument_tokens: &[i64]) -> MonitorResult<()>;
    async fn get_historical_candles(
        &self,
        instrument_token: i64,
        timeframe: crate::domain::market::Timeframe,
        limit: usize,
    ) -> MonitorResult<Vec<crate::domain::market::Candle>>;
}
