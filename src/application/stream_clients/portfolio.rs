//! Portfolio/order-event stream client (C6, spec §4.6, "Portfolio/order
//! event stream"): line-oriented JSON order-status frames over a
//! WebSocket, sharing the market-data client's backoff/heartbeat
//! discipline.

use crate::domain::market::{OrderEvent, OrderStatus};
use crate::domain::ports::PortfolioStream;
use crate::domain::session::Credentials;
use crate::error::{MonitorError, MonitorResult};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{error, warn};

#[derive(Debug, Deserialize)]
struct InboundOrderFrame {
    order_id: String,
    status: OrderStatus,
    #[serde(default)]
    raw_payload: serde_json::Value,
}

/// One instance per user session, built fresh by the session manager's
/// portfolio-stream factory.
pub struct WebSocketPortfolioStream {
    ws_url: String,
    backoff_initial: Duration,
    backoff_max: Duration,
    heartbeat_idle: Duration,
    heartbeat_pong_timeout: Duration,
}

impl WebSocketPortfolioStream {
    pub fn new(
        ws_url: String,
        backoff_initial: Duration,
        backoff_max: Duration,
        heartbeat_idle: Duration,
        heartbeat_pong_timeout: Duration,
    ) -> Self {
        Self {
            ws_url,
            backoff_initial,
            backoff_max,
            heartbeat_idle,
            heartbeat_pong_timeout,
        }
    }
}

#[async_trait]
impl PortfolioStream for WebSocketPortfolioStream {
    async fn connect(&self, credentials: &Credentials) -> MonitorResult<mpsc::Receiver<OrderEvent>> {
        let (event_tx, event_rx) = mpsc::channel(256);
        let ws_url = self.ws_url.clone();
        let backoff_initial = self.backoff_initial;
        let backoff_max = self.backoff_max;
        let heartbeat_idle = self.heartbeat_idle;
        let heartbeat_pong_timeout = self.heartbeat_pong_timeout;
        let access_token = credentials.access_token.clone();

        tokio::spawn(async move {
            let mut backoff = backoff_initial;
            loop {
                match run_connection(&ws_url, &access_token, &event_tx, heartbeat_idle, heartbeat_pong_timeout).await {
                    Ok(()) => break,
                    Err(e) => {
                        error!(error = %e, "portfolio stream error, reconnecting with backoff");
                        time::sleep(backoff).await;
                        backoff = (backoff * 2).min(backoff_max);
                    }
                }
            }
        });

        Ok(event_rx)
    }
}

async fn run_connection(
    ws_url: &str,
    access_token: &str,
    event_tx: &mpsc::Sender<OrderEvent>,
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

    {
        use futures_util::SinkExt;
        let auth_msg = serde_json::json!({
            "action": "authenticate",
            "access_token": access_token,
        });
        write
            .send(Message::Text(auth_msg.to_string().into()))
            .await
            .map_err(|e| MonitorError::Other(anyhow::anyhow!("failed to send authentication: {e}")))?;
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
                        if let Ok(frame) = serde_json::from_str::<InboundOrderFrame>(&text) {
                            let event = OrderEvent {
                                order_id: frame.order_id,
                                status: frame.status,
                                raw_payload: frame.raw_payload,
                            };
                            if event_tx.send(event).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_inbound = Instant::now();
                        ping_sent_at = None;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("portfolio stream closed by server");
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
            _ = heartbeat.tick() => {
                use futures_util::SinkExt;
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
