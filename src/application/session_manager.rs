//! User Session Manager (C5, spec §4.5): per-user lifecycle, credential
//! refresh, and instrument-set diffing. Per-user state is mutated only by
//! the daemon's dispatcher task (spec §4.5, "Concurrency"). Stream
//! connections and subscriptions are strictly per-user (spec §4.6): a
//! fresh `MarketDataStream`/`PortfolioStream` instance is built from the
//! supplied factories for every session rather than sharing one
//! process-wide connection.

use crate::domain::market::{OrderEvent, Tick};
use crate::domain::ports::{BrokerClient, MarketDataStream, PortfolioStream, RuleStore};
use crate::domain::rule::Rule;
use crate::domain::session::{extract_instruments, Credentials, SessionStatus, UserSession};
use crate::error::{MonitorError, MonitorResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Threshold before a credential's expiry at which a refresh is attempted
/// (spec §4.5, "within a threshold of expiry").
const REFRESH_THRESHOLD: ChronoDuration = ChronoDuration::minutes(5);

/// Builds a fresh, unconnected market-data stream for one user session.
pub type MarketDataStreamFactory = Arc<dyn Fn() -> Arc<dyn MarketDataStream> + Send + Sync>;
/// Builds a fresh, unconnected portfolio stream for one user session.
pub type PortfolioStreamFactory = Arc<dyn Fn() -> Arc<dyn PortfolioStream> + Send + Sync>;

/// A [`UserSession`] plus the stream handles the dispatcher multiplexes
/// over (spec §3, "portfolio-stream handle, market-data-stream handle").
pub struct ActiveSession {
    pub session: UserSession,
    pub tick_rx: mpsc::Receiver<Tick>,
    pub order_rx: mpsc::Receiver<OrderEvent>,
    pub market_data_stream: Arc<dyn MarketDataStream>,
}

pub struct SessionManager {
    rule_store: Arc<dyn RuleStore>,
    broker_client: Arc<dyn BrokerClient>,
    market_data_stream_factory: MarketDataStreamFactory,
    portfolio_stream_factory: PortfolioStreamFactory,
    sessions: HashMap<i64, ActiveSession>,
    /// Sessions whose enabled-rule count dropped to zero, awaiting
    /// `session_teardown_grace` before actual removal (spec §5).
    pending_teardowns: HashMap<i64, Instant>,
    max_instrument_subscriptions_per_user: usize,
    session_teardown_grace: Duration,
    stream_connect_timeout: Duration,
    token_refresh_timeout: Duration,
}

impl SessionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rule_store: Arc<dyn RuleStore>,
        broker_client: Arc<dyn BrokerClient>,
        market_data_stream_factory: MarketDataStreamFactory,
        portfolio_stream_factory: PortfolioStreamFactory,
        max_instrument_subscriptions_per_user: usize,
        session_teardown_grace: Duration,
        stream_connect_timeout: Duration,
        token_refresh_timeout: Duration,
    ) -> Self {
        Self {
            rule_store,
            broker_client,
            market_data_stream_factory,
            portfolio_stream_factory,
            sessions: HashMap::new(),
            pending_teardowns: HashMap::new(),
            max_instrument_subscriptions_per_user,
            session_teardown_grace,
            stream_connect_timeout,
            token_refresh_timeout,
        }
    }

    pub fn get(&self, user_id: i64) -> Option<&ActiveSession> {
        self.sessions.get(&user_id)
    }

    pub fn get_mut(&mut self, user_id: i64) -> Option<&mut ActiveSession> {
        self.sessions.get_mut(&user_id)
    }

    pub fn active_user_ids(&self) -> Vec<i64> {
        self.sessions.keys().copied().collect()
    }

    pub fn all_sessions_mut(&mut self) -> impl Iterator<Item = &mut ActiveSession> {
        self.sessions.values_mut()
    }

    /// Lazily creates a session on first need: loads credentials, opens a
    /// dedicated pair of streams for this user (spec §4.5, "ensure_session").
    pub async fn ensure_session(&mut self, user_id: i64, rules: Vec<Rule>) -> MonitorResult<()> {
        self.pending_teardowns.remove(&user_id);
        if self.sessions.contains_key(&user_id) {
            return Ok(());
        }

        // Placeholder until the brokerage's credential store is wired in;
        // refresh_credentials replaces this on the first 401/near-expiry.
        let credentials = Credentials {
            access_token: String::new(),
            refresh_token: String::new(),
            expires_at: chrono::Utc::now(),
        };

        let mut session = UserSession::new(user_id, credentials, rules);
        let market_data_stream = (self.market_data_stream_factory)();
        let portfolio_stream = (self.portfolio_stream_factory)();

        let tick_rx = tokio::time::timeout(
            self.stream_connect_timeout,
            market_data_stream.connect(&session.credentials),
        )
        .await
        .map_err(|_| MonitorError::TransientNetwork {
            endpoint: "market_data_stream".to_string(),
            reason: "connect timed out".to_string(),
        })??;
        let order_rx = tokio::time::timeout(
            self.stream_connect_timeout,
            portfolio_stream.connect(&session.credentials),
        )
        .await
        .map_err(|_| MonitorError::TransientNetwork {
            endpoint: "portfolio_stream".to_string(),
            reason: "connect timed out".to_string(),
        })??;

        self.reconcile_instruments(&market_data_stream, &mut session).await?;

        info!(user_id, "user session established");
        self.sessions.insert(
            user_id,
            ActiveSession {
                session,
                tick_rx,
                order_rx,
                market_data_stream,
            },
        );
        Ok(())
    }

    /// Schedules the session for removal after `session_teardown_grace`
    /// rather than destroying it immediately, so a user whose rules briefly
    /// drop to zero enabled doesn't pay a full stream-reconnect cost if a
    /// new rule arrives moments later (spec §5, "grace-period teardown").
    pub async fn tear_down(&mut self, user_id: i64) {
        if self.sessions.contains_key(&user_id) {
            self.pending_teardowns
                .insert(user_id, Instant::now() + self.session_teardown_grace);
            info!(user_id, "user session scheduled for teardown");
        }
    }

    /// Removes any session whose teardown grace period has elapsed. Called
    /// from the daemon's 1Hz ticker.
    pub fn expire_pending_teardowns(&mut self) {
        let now = Instant::now();
        let expired: Vec<i64> = self
            .pending_teardowns
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(user_id, _)| *user_id)
            .collect();

        for user_id in expired {
            self.pending_teardowns.remove(&user_id);
            if self.sessions.remove(&user_id).is_some() {
                info!(user_id, "user session torn down after grace period");
            }
        }
    }

    /// Diffs the rules' required instrument set against the session's
    /// current subscriptions and issues subscribe/unsubscribe deltas
    /// (spec §4.5, "reconcile"). Cancels any pending teardown: a revived
    /// rule set means the user is active again.
    pub async fn reconcile(&mut self, user_id: i64, rules: Vec<Rule>) -> MonitorResult<()> {
        self.pending_teardowns.remove(&user_id);
        let Some(active) = self.sessions.get_mut(&user_id) else {
            return Ok(());
        };
        active.session.rules = rules;
        let market_data_stream = active.market_data_stream.clone();
        self.reconcile_instruments(&market_data_stream, &mut active.session).await
    }

    /// Caps the desired instrument set at `max_instrument_subscriptions_per_user`,
    /// evicting the instruments whose most-recently-updated referencing rule
    /// is oldest (spec §5, "per-user subscription cap with oldest-unused
    /// eviction").
    async fn reconcile_instruments(
        &self,
        market_data_stream: &Arc<dyn MarketDataStream>,
        session: &mut UserSession,
    ) -> MonitorResult<()> {
        let mut desired = extract_instruments(&session.rules);

        if desired.len() > self.max_instrument_subscriptions_per_user {
            let mut last_touched: HashMap<i64, DateTime<Utc>> = HashMap::new();
            for rule in session
                .rules
                .iter()
                .filter(|r| r.enabled && r.trigger_config.needs_market_data())
            {
                let Some(token) = rule.instrument_token else { continue };
                last_touched
                    .entry(token)
                    .and_modify(|t| {
                        if rule.updated_at > *t {
                            *t = rule.updated_at;
                        }
                    })
                    .or_insert(rule.updated_at);
            }

            let mut ranked: Vec<i64> = desired.iter().copied().collect();
            ranked.sort_by_key(|token| std::cmp::Reverse(last_touched.get(token).copied()));
            let evicted = ranked.len() - self.max_instrument_subscriptions_per_user;
            warn!(
                user_id = session.user_id,
                evicted,
                cap = self.max_instrument_subscriptions_per_user,
                "instrument subscription cap reached, evicting oldest-unused instruments"
            );
            desired = ranked
                .into_iter()
                .take(self.max_instrument_subscriptions_per_user)
                .collect();
        }

        if desired != session.subscribed_instruments {
            let tokens: Vec<i64> = desired.iter().copied().collect();
            market_data_stream.set_subscriptions(&tokens).await?;
            session.subscribed_instruments = desired;
        }
        Ok(())
    }

    /// Obtains a new access token via the refresh flow; on permanent
    /// failure or timeout, marks monitoring as paused (spec §4.5,
    /// "refresh_credentials").
    pub async fn refresh_credentials(&mut self, user_id: i64) -> MonitorResult<()> {
        let Some(active) = self.sessions.get_mut(&user_id) else {
            return Ok(());
        };
        let refresh_token = active.session.credentials.refresh_token.clone();

        match tokio::time::timeout(self.token_refresh_timeout, self.broker_client.refresh_token(&refresh_token)).await {
            Ok(Ok(new_credentials)) => {
                active.session.credentials = new_credentials;
                active.session.status = SessionStatus::Active;
                info!(user_id, "credentials refreshed");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(user_id, error = %e, "credential refresh failed, pausing monitoring");
                active.session.status = SessionStatus::Paused;
                Err(MonitorError::MonitoringPaused {
                    user_id,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                warn!(user_id, "credential refresh timed out, pausing monitoring");
                active.session.status = SessionStatus::Paused;
                Err(MonitorError::MonitoringPaused {
                    user_id,
                    reason: "refresh timed out".to_string(),
                })
            }
        }
    }

    pub fn needs_refresh(&self, user_id: i64, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.sessions
            .get(&user_id)
            .is_some_and(|s| s.session.credentials.needs_refresh(now, REFRESH_THRESHOLD))
    }

    pub fn rule_store(&self) -> &Arc<dyn RuleStore> {
        &self.rule_store
    }
}
