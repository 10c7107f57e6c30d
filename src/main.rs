use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, Level};
use tracing_subscriber::prelude::*;

use trade_monitor_core::application::stream_clients::{WebSocketMarketDataStream, WebSocketPortfolioStream};
use trade_monitor_core::application::{Daemon, SessionManager};
use trade_monitor_core::config::Config;
use trade_monitor_core::infrastructure::broker_client::RestBrokerClient;
use trade_monitor_core::infrastructure::persistence::{Database, SqliteRuleStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("Initializing trade monitor core...");

    let config = Config::from_env()?;

    let db = Database::connect(&config.monitor.database_url).await?;
    let rule_store: Arc<dyn trade_monitor_core::domain::ports::RuleStore> = Arc::new(SqliteRuleStore::new(&db));

    let broker_client: Arc<dyn trade_monitor_core::domain::ports::BrokerClient> = Arc::new(RestBrokerClient::new(
        &config.broker,
        config.monitor.broker_rest_timeout_secs,
    ));

    // Each user session gets its own stream connection (spec §4.5/§4.6), so
    // `SessionManager` is handed factories rather than pre-built instances.
    let market_data_stream_factory: trade_monitor_core::application::session_manager::MarketDataStreamFactory = {
        let ws_url = config.broker.market_data_stream_url.clone();
        let backoff_initial = Duration::from_secs(config.monitor.backoff_initial_secs);
        let backoff_max = Duration::from_secs(config.monitor.backoff_max_secs);
        let heartbeat_idle = Duration::from_secs(config.monitor.heartbeat_idle_secs);
        let heartbeat_pong_timeout = Duration::from_secs(config.monitor.heartbeat_pong_timeout_secs);
        Arc::new(move || {
            Arc::new(WebSocketMarketDataStream::new(
                ws_url.clone(),
                backoff_initial,
                backoff_max,
                heartbeat_idle,
                heartbeat_pong_timeout,
            )) as Arc<dyn trade_monitor_core::domain::ports::MarketDataStream>
        })
    };

    let portfolio_stream_factory: trade_monitor_core::application::session_manager::PortfolioStreamFactory = {
        let ws_url = config.broker.portfolio_stream_url.clone();
        let backoff_initial = Duration::from_secs(config.monitor.backoff_initial_secs);
        let backoff_max = Duration::from_secs(config.monitor.backoff_max_secs);
        let heartbeat_idle = Duration::from_secs(config.monitor.heartbeat_idle_secs);
        let heartbeat_pong_timeout = Duration::from_secs(config.monitor.heartbeat_pong_timeout_secs);
        Arc::new(move || {
            Arc::new(WebSocketPortfolioStream::new(
                ws_url.clone(),
                backoff_initial,
                backoff_max,
                heartbeat_idle,
                heartbeat_pong_timeout,
            )) as Arc<dyn trade_monitor_core::domain::ports::PortfolioStream>
        })
    };

    let session_manager = SessionManager::new(
        rule_store.clone(),
        broker_client.clone(),
        market_data_stream_factory,
        portfolio_stream_factory,
        config.monitor.max_instrument_subscriptions_per_user,
        Duration::from_secs(config.monitor.session_teardown_grace_secs),
        Duration::from_secs(config.monitor.stream_connect_timeout_secs),
        Duration::from_secs(config.monitor.token_refresh_timeout_secs),
    );

    let daemon = Daemon::new(
        session_manager,
        rule_store,
        broker_client,
        Duration::from_secs(config.monitor.rule_poll_interval_secs),
        config.monitor.time_trigger_tolerance_secs,
        config.monitor.max_candles_per_buffer,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let daemon_handle = tokio::spawn(daemon.run(shutdown_rx));

    info!("Trade monitor core running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping daemon...");
    let _ = shutdown_tx.send(true);

    if let Err(e) = daemon_handle.await {
        error!(error = %e, "daemon task panicked");
    }

    info!("Trade monitor core stopped.");
    Ok(())
}
