use std::env;

/// Brokerage credentials and endpoints, loaded from the environment.
///
/// Grouped the way `rustrade`'s `BrokerEnvConfig` groups per-broker fields,
/// collapsed here to the single opaque brokerage collaborator the core talks
/// to (see spec §6, "Brokerage REST API").
#[derive(Debug, Clone)]
pub struct BrokerEnvConfig {
    pub api_base_url: String,
    pub portfolio_stream_url: String,
    pub market_data_stream_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub token_encryption_key: String,
}

impl BrokerEnvConfig {
    pub fn from_env() -> Self {
        Self {
            api_base_url: env::var("BROKER_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.broker.example".to_string()),
            portfolio_stream_url: env::var("BROKER_PORTFOLIO_STREAM_URL")
                .unwrap_or_else(|_| "wss://stream.broker.example/portfolio".to_string()),
            market_data_stream_url: env::var("BROKER_MARKET_DATA_STREAM_URL")
                .unwrap_or_else(|_| "wss://stream.broker.example/ticks".to_string()),
            api_key: env::var("BROKER_API_KEY").unwrap_or_default(),
            api_secret: env::var("BROKER_API_SECRET").unwrap_or_default(),
            token_encryption_key: env::var("TOKEN_ENCRYPTION_KEY").unwrap_or_default(),
        }
    }
}
