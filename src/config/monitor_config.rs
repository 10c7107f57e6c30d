use anyhow::{Context, Result};
use std::env;

/// Process-wide monitor tuning, loaded from the environment (spec §6).
#[derive(Debug, Clone)]
pub struct MonitorEnvConfig {
    pub database_url: String,
    pub market_hours_timezone: String,
    pub rule_poll_interval_secs: u64,
    pub time_trigger_tolerance_secs: i64,
    pub backoff_initial_secs: u64,
    pub backoff_max_secs: u64,
    pub heartbeat_idle_secs: u64,
    pub heartbeat_pong_timeout_secs: u64,
    pub max_candles_per_buffer: usize,
    pub max_instrument_subscriptions_per_user: usize,
    pub session_teardown_grace_secs: u64,
    pub broker_rest_timeout_secs: u64,
    pub stream_connect_timeout_secs: u64,
    pub token_refresh_timeout_secs: u64,
}

impl MonitorEnvConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/monitor.db".to_string()),
            market_hours_timezone: env::var("MARKET_HOURS_TIMEZONE")
                .unwrap_or_else(|_| "IST".to_string()),
            rule_poll_interval_secs: parse_env_or("RULE_POLL_INTERVAL_SECS", 30)?,
            time_trigger_tolerance_secs: parse_env_or("TIME_TRIGGER_TOLERANCE_SECS", 60)?,
            backoff_initial_secs: parse_env_or("BACKOFF_INITIAL_SECS", 1)?,
            backoff_max_secs: parse_env_or("BACKOFF_MAX_SECS", 60)?,
            heartbeat_idle_secs: parse_env_or("HEARTBEAT_IDLE_SECS", 30)?,
            heartbeat_pong_timeout_secs: parse_env_or("HEARTBEAT_PONG_TIMEOUT_SECS", 10)?,
            max_candles_per_buffer: parse_env_or("MAX_CANDLES_PER_BUFFER", 200)?,
            max_instrument_subscriptions_per_user: parse_env_or(
                "MAX_INSTRUMENT_SUBSCRIPTIONS_PER_USER",
                500,
            )?,
            session_teardown_grace_secs: parse_env_or("SESSION_TEARDOWN_GRACE_SECS", 120)?,
            broker_rest_timeout_secs: parse_env_or("BROKER_REST_TIMEOUT_SECS", 10)?,
            stream_connect_timeout_secs: parse_env_or("STREAM_CONNECT_TIMEOUT_SECS", 15)?,
            token_refresh_timeout_secs: parse_env_or("TOKEN_REFRESH_TIMEOUT_SECS", 10)?,
        })
    }
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", key, e))
            .context(format!("parsing {}", key)),
        Err(_) => Ok(default),
    }
}
