//! Market-data stream client (C6, spec §4.6, "Market-data stream"): ticks
//! delivered over a WebSocket, with exponential backoff reconnect and
//! ping/pong heartbeat, following the teacher's `AlpacaWebSocketManager`
//! connection-manager shape (broadcast fan-out + command channel for live
//! subscription updates, one background task per session).

use crate::domain::market::{Candle, Tick, Timeframe};
use crate::domain::ports::MarketDataStream;
use crate::domain::session::Credentials;
use crate::error::{MonitorError, MonitorResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{self, Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{error, info, warn};

enum Command {
    SetSubscriptions(Vec<i64>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
enum InboundFrame {
    Ltpc {
        instrument_token: i64,
        ltp: Decimal,
        #[serde(default)]
        bid: Option<Decimal>,
        #[serde(default)]
        ask: Option<Decimal>,
        #[serde(default)]
        volume: Decimal,
        timestamp: i64,
    },
}

/// One instance per user session; `connect` spawns the supervised
/// reconnect loop and returns the tick receiver.
pub struct WebSocketMarketDataStream {
    ws_url: String,
    backoff_initial: Duration,
    backoff_max: Duration,
    heartbeat_idle: Duration,
    heartbeat_pong_timeout: Duration,
    desired_subscriptions: Arc<RwLock<Vec<i64>>>,
    command_tx: mpsc::Sender<Command>,
    command_rx: std::sync::Mutex<Option<mpsc::Receiver<Command>>>,
}

impl WebSocketMarketDataStream {
    pub fn new(
        ws_url: String,
        backoff_initial: Duration,
        backoff_max: Duration,
        heartbeat_idle: Duration,
        heartbeat_pong_timeout: Duration,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        Self {
            ws_url,
            backoff_initial,
            backoff_max,
            heartbeat_idle,
            heartbeat_pong_timeout,
            desired_subscriptions: Arc::new(RwLock::new(Vec::new())),
            command_tx,
            command_rx: std::sync::Mutex::new(Some(command_rx)),
        }
    }
}

#[async_trait]
impl MarketDataStream for WebSocketMarketDataStream {
    async fn connect(&self, credentials: &Credentials) -> MonitorResult<mpsc::Receiver<Tick>> {
        let mut command_rx = self
            .command_rx
            .lock()
            .expect("command_rx mutex poisoned")
            .take()
            .ok_or_else(|| MonitorError::Other(anyhow::anyhow!("market data stream already connected")))?;

        let (tick_tx, tick_rx) = mpsc::channel(1024);
        let ws_url = self.ws_url.clone();
        let backoff_initial = self.backoff_initial;
        let backoff_max = self.backoff_max;
        let heartbeat_idle = self.heartbeat_idle;
        let heartbeat_pong_timeout = self.heartbeat_pong_timeout;
        let desired_subscriptions = self.desired_subscriptions.clone();
        let access_token = credentials.access_token.clone();

        tokio::spawn(async move {
            let mut backoff = backoff_initial;
            loop {
                match run_connection(
                    &ws_url,
                    &access_token,
                    &desired_subscriptions,
                    &tick_tx,
                    &mut command_rx,
                    heartbeat_idle,
                    heartbeat_pong_timeout,
                )
                .await
                {
                    Ok(()) => {
                        info!("market data stream closed cleanly, stopping");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "market data stream error, reconnecting with backoff");
                        time::sleep(backoff).await;
                        backoff = (backoff * 2).min(backoff_max);
                    }
                }
            }
        });

        Ok(tick_rx)
    }

    async fn set_subscriptions(&self, instrument_tokens: &[i64]) -> MonitorResult<()> {
        *self.desired_subscriptions.write().await = instrument_tokens.to_vec();
        self.command_tx
            .send(Command::SetSubscriptions(instrument_tokens.to_vec()))
            .await
            .map_err(|_| MonitorError::Other(anyhow::anyhow!("market data command channel closed")))?;
        Ok(())
    }

    async fn get_historical_candles(
        &self,
        _instrument_token: i64,
        _timeframe: Timeframe,
        _limit: usize,
    ) -> MonitorResult<Vec<Candle>> {
        // Historical seeding is a REST call against the brokerage, modeled
        // as an opaque collaborator (spec §6); no bars are seeded if the
        // broker has none to offer.
        Ok(Vec::new())
    }
}

async fn run_connection(
    ws_url: &str,
    access_token: &str,
    desired_subscriptions: &Arc<RwLock<Vec<i64>>>,
    tick_tx: &mpsc::Sender<Tick>,
    command_rx: &mut mpsc::Receiver<Command>,
    heartbeat_idle: Duration,
    heartbeat_pong_timeout: Duration,
) -> MonitorResult<()> {
    let (ws_stream, _) = connect_async(ws_url)
        .await
        .map_err(|e| MonitorError::TransientNetwork {
            endpoint: ws_url.to_string(),
            reason: e.to_string(),
        })?;
    let (mut write, mut read) = ws_stream.split();

    send_authenticate(&mut write, access_token).await?;

    // Reconnection must re-subscribe the current instrument set before
    // processing user data (spec §4.6).
    let initial = desired_subscriptions.read().await.clone();
    if !initial.is_empty() {
        send_subscription(&mut write, &initial).await?;
    }

    let mut last_inbound = Instant::now();
    let mut ping_sent_at: Option<Instant> = None;
    let mut heartbeat = time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_inbound = Instant::now();
                        if let Ok(InboundFrame::Ltpc { instrument_token, ltp, bid, ask, volume, timestamp }) =
                            serde_json::from_str::<InboundFrame>(&text)
                        {
                            let tick = Tick { instrument_token, ltp, bid, ask, volume, timestamp };
                            if tick_tx.send(tick).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_inbound = Instant::now();
                        ping_sent_at = None;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("market data stream closed by server");
                        return Err(MonitorError::TransientNetwork {
                            endpoint: ws_url.to_string(),
                            reason: "connection closed".to_string(),
                        });
                    }
                    Some(Err(e)) => {
                        return Err(MonitorError::TransientNetwork {
                            endpoint: ws_url.to_string(),
                            reason: e.to_string(),
                        });
                    }
                    _ => {}
                }
            }
            Some(cmd) = command_rx.recv() => {
                match cmd {
                    Command::SetSubscriptions(tokens) => {
                        send_subscription(&mut write, &tokens).await?;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if let Some(sent_at) = ping_sent_at {
                    if sent_at.elapsed() >= heartbeat_pong_timeout {
                        return Err(MonitorError::TransientNetwork {
                            endpoint: ws_url.to_string(),
                            reason: "pong timeout".to_string(),
                        });
                    }
                } else if last_inbound.elapsed() >= heartbeat_idle {
                    write.send(Message::Ping(Vec::new().into())).await.map_err(|e| {
                        MonitorError::TransientNetwork { endpoint: ws_url.to_string(), reason: e.to_string() }
                    })?;
                    ping_sent_at = Some(Instant::now());
                }
            }
        }
    }
}

async fn send_subscription<S>(write: &mut S, instrument_tokens: &[i64]) -> MonitorResult<()>
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let msg = serde_json::json!({
        "action": "subscribe",
        "mode": "ltpc",
        "instrument_tokens": instrument_tokens,
    });
    write
        .send(Message::Text(msg.to_string().into()))
        .await
        .map_err(|e| MonitorError::Other(anyhow::anyhow!("failed to send subscription: {e}")))
}

/// Authenticates this session's connection with its own access token, the
/// same explicit authenticate-frame handshake the teacher's Alpaca trading
/// stream client uses.
async fn send_authenticate<S>(write: &mut S, access_token: &str) -> MonitorResult<()>
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let msg = serde_json::json!({
        "action": "authenticate",
        "access_token": access_token,
    });
    write
        .send(Message::Text(msg.to_string().into()))
        .await
        .map_err(|e| MonitorError::Other(anyhow::anyhow!("failed to send authentication: {e}")))
}
