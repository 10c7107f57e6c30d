//! Configuration module.
//!
//! Composes broker and monitor sub-configs the way `rustrade`'s `Config`
//! composes `BrokerEnvConfig` / `StrategyEnvConfig` / `RiskEnvConfig` into a
//! single struct read once at startup.

mod broker_config;
mod monitor_config;

pub use broker_config::BrokerEnvConfig;
pub use monitor_config::MonitorEnvConfig;

use anyhow::Result;

#[derive(Debug, Clone)]
pub struct Config {
    pub broker: BrokerEnvConfig,
    pub monitor: MonitorEnvConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            broker: BrokerEnvConfig::from_env(),
            monitor: MonitorEnvConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_env() {
        let config = Config::from_env().expect("should parse with defaults");
        assert_eq!(config.monitor.rule_poll_interval_secs, 30);
        assert_eq!(config.monitor.time_trigger_tolerance_secs, 60);
        assert_eq!(config.monitor.max_candles_per_buffer, 200);
    }
}
