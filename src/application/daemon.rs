//! Daemon loop (C7, spec §4.7): the rule-poll task, the per-session tick/
//! order-event dispatcher, and the 1-Hz time ticker, following the
//! teacher's tick-interval `tokio::select!` loop shape (`Sentinel::run`).

use crate::application::action_executor;
use crate::application::session_manager::{ActiveSession, SessionManager};
use crate::domain::evaluation::context::{EvalContext, MarketSnapshot};
use crate::domain::evaluation::kernel::evaluate_rule;
use crate::domain::evaluation::result::RuleResult;
use crate::domain::market::{Candle, CandleBuffer, OrderEvent, Tick, Timeframe};
use crate::domain::ports::{BrokerClient, RuleStore};
use crate::domain::rule::trigger::TriggerConfig;
use crate::domain::rule::Rule;
use crate::domain::session::UserSession;
use crate::error::MonitorResult;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tracing::{error, info, warn};

pub struct Daemon {
    session_manager: SessionManager,
    rule_store: Arc<dyn RuleStore>,
    broker_client: Arc<dyn BrokerClient>,
    rule_poll_interval: Duration,
    dispatch_interval: Duration,
    time_trigger_tolerance_secs: i64,
    max_candles_per_buffer: usize,
}

impl Daemon {
    pub fn new(
        session_manager: SessionManager,
        rule_store: Arc<dyn RuleStore>,
        broker_client: Arc<dyn BrokerClient>,
        rule_poll_interval: Duration,
        time_trigger_tolerance_secs: i64,
        max_candles_per_buffer: usize,
    ) -> Self {
        Self {
            session_manager,
            rule_store,
            broker_client,
            rule_poll_interval,
            dispatch_interval: Duration::from_millis(100),
            time_trigger_tolerance_secs,
            max_candles_per_buffer,
        }
    }

    /// Runs until `shutdown` reports `true` (spec §5, "Cancellation").
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut rule_poll = time::interval(self.rule_poll_interval);
        let mut time_ticker = time::interval(Duration::from_secs(1));
        let mut dispatch_ticker = time::interval(self.dispatch_interval);
        let mut last_poll: Option<DateTime<Utc>> = None;

        loop {
            tokio::select! {
                _ = rule_poll.tick() => {
                    if let Err(e) = self.poll_rules(&mut last_poll).await {
                        error!(error = %e, "rule poll failed");
                    }
                }
                _ = time_ticker.tick() => {
                    self.evaluate_time_triggers().await;
                    self.session_manager.expire_pending_teardowns();
                }
                _ = dispatch_ticker.tick() => {
                    self.drain_sessions().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("daemon received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        }
    }

    /// Reloads rules changed since the last pass, creating/reconciling/
    /// tearing down sessions as needed (spec §4.4 "Polling helper", §4.5
    /// "Concurrency").
    async fn poll_rules(&mut self, last_poll: &mut Option<DateTime<Utc>>) -> MonitorResult<()> {
        let poll_started_at = Utc::now();
        let changed = match *last_poll {
            None => self.rule_store.list_active_rules(None).await?,
            Some(since) => self.rule_store.list_updated_since(since).await?,
        };
        *last_poll = Some(poll_started_at);

        if changed.is_empty() {
            return Ok(());
        }

        let mut by_user: HashMap<i64, Vec<Rule>> = HashMap::new();
        for rule in changed {
            by_user.entry(rule.user_id).or_default().push(rule);
        }

        for (user_id, touched) in by_user {
            let active_for_user: Vec<Rule> = touched.into_iter().filter(|r| r.should_evaluate(Utc::now())).collect();

            if active_for_user.is_empty() {
                self.session_manager.tear_down(user_id).await;
                continue;
            }

            // A session sees its full rule set on every reconcile, not just
            // the delta, so load the user's complete active set.
            let full = self.rule_store.list_active_rules(Some(user_id)).await?;

            if self.session_manager.get(user_id).is_some() {
                self.session_manager.reconcile(user_id, full).await?;
            } else {
                self.session_manager.ensure_session(user_id, full).await?;
            }
        }

        Ok(())
    }

    async fn evaluate_time_triggers(&mut self) {
        let now = Utc::now();
        let tolerance = self.time_trigger_tolerance_secs;
        let mut tagged: Vec<(i64, RuleResult)> = Vec::new();

        for active in self.session_manager.all_sessions_mut() {
            let user_id = active.session.user_id;
            for rule in active
                .session
                .rules
                .iter()
                .filter(|r| !r.trigger_config.needs_market_data() && r.should_evaluate(now))
            {
                let ctx = EvalContext::at(now);
                let result = evaluate_rule(rule, &ctx, tolerance);
                if !result.skipped {
                    tagged.push((user_id, result));
                }
            }
        }

        self.process_results(tagged).await;
    }

    /// Drains whatever tick/order-event traffic has arrived on each
    /// session's stream handles since the last pass.
    async fn drain_sessions(&mut self) {
        let now = Utc::now();
        let tolerance = self.time_trigger_tolerance_secs;
        let max_candles = self.max_candles_per_buffer;
        let mut tagged: Vec<(i64, RuleResult)> = Vec::new();

        for active in self.session_manager.all_sessions_mut() {
            let user_id = active.session.user_id;
            drain_ticks(active, now, tolerance, max_candles, &mut tagged, user_id);
            drain_order_events(active, now, tolerance, &mut tagged, user_id);
        }

        self.process_results(tagged).await;
    }

    /// Persists trigger-config updates and firings, executes actions, and
    /// propagates OCO cancellations (spec §4.7 "Action execution",
    /// "Idempotency").
    async fn process_results(&mut self, tagged: Vec<(i64, RuleResult)>) {
        for (user_id, result) in tagged {
            if let Some(new_config) = &result.trigger_config_update {
                if let Err(e) = self.rule_store.update_trigger_config(result.rule_id, new_config).await {
                    error!(rule_id = result.rule_id, error = %e, "failed to persist trigger_config update");
                    continue;
                }
                if let Some(active) = self.session_manager.get_mut(user_id) {
                    if let Some(rule) = active.session.rules.iter_mut().find(|r| r.id == result.rule_id) {
                        rule.trigger_config = new_config.clone();
                    }
                }
            }

            if !result.fired {
                continue;
            }

            let Some(action) = result.action.clone() else { continue };
            let fired_at = Utc::now();

            let trigger_snapshot = self
                .session_manager
                .get(user_id)
                .and_then(|a| a.session.rules.iter().find(|r| r.id == result.rule_id))
                .map(|r| serde_json::to_value(&r.trigger_config).unwrap_or(serde_json::Value::Null))
                .unwrap_or(serde_json::Value::Null);
            let action_taken = serde_json::to_value(&action).unwrap_or(serde_json::Value::Null);

            let access_token = self
                .session_manager
                .get(user_id)
                .map(|a| a.session.credentials.access_token.clone())
                .unwrap_or_default();
            let action_result =
                action_executor::execute(&self.broker_client, &access_token, result.rule_id, &action).await;

            if let Err(e) = self
                .rule_store
                .record_fire(result.rule_id, fired_at, trigger_snapshot, action_taken, action_result)
                .await
            {
                error!(rule_id = result.rule_id, error = %e, "failed to record firing");
            }

            if let Some(active) = self.session_manager.get_mut(user_id) {
                if let Some(rule) = active.session.rules.iter_mut().find(|r| r.id == result.rule_id) {
                    rule.record_fire(fired_at);
                }
            }

            for cancel_id in &result.rules_to_cancel {
                if let Err(e) = self.rule_store.disable_rule(*cancel_id).await {
                    error!(rule_id = cancel_id, error = %e, "failed to disable OCO peer rule");
                    continue;
                }
                if let Some(active) = self.session_manager.get_mut(user_id) {
                    active.session.drop_rule(*cancel_id);
                    warn!(rule_id = cancel_id, "rule cancelled by OCO peer firing");
                }
            }

            if let Some(active) = self.session_manager.get_mut(user_id) {
                if active.session.is_empty() {
                    self.session_manager.tear_down(user_id).await;
                }
            }
        }
    }
}

fn drain_ticks(
    active: &mut ActiveSession,
    now: DateTime<Utc>,
    tolerance_secs: i64,
    max_candles: usize,
    tagged: &mut Vec<(i64, RuleResult)>,
    user_id: i64,
) {
    loop {
        let tick = match active.tick_rx.try_recv() {
            Ok(tick) => tick,
            Err(_) => break,
        };
        let results = apply_tick(&mut active.session, &tick, now, tolerance_secs, max_candles);
        tagged.extend(results.into_iter().map(|r| (user_id, r)));
    }
}

fn drain_order_events(
    active: &mut ActiveSession,
    now: DateTime<Utc>,
    tolerance_secs: i64,
    tagged: &mut Vec<(i64, RuleResult)>,
    user_id: i64,
) {
    loop {
        let event = match active.order_rx.try_recv() {
            Ok(event) => event,
            Err(_) => break,
        };
        let results = apply_order_event(&active.session, &event, now, tolerance_secs);
        tagged.extend(results.into_iter().map(|r| (user_id, r)));
    }
}

/// Feeds a tick into the relevant candle buffers, builds the evaluation
/// context, and evaluates every rule on that instrument (spec §4.7,
/// "Per-instrument previous-price tracking").
fn apply_tick(
    session: &mut UserSession,
    tick: &Tick,
    now: DateTime<Utc>,
    tolerance_secs: i64,
    max_candles: usize,
) -> Vec<RuleResult> {
    let token = tick.instrument_token;
    let prev_price = session.prev_prices.get(&token).copied();

    let timeframes = needed_timeframes(&session.rules, token);
    for tf in &timeframes {
        session
            .candle_buffers
            .entry((token, *tf))
            .or_insert_with(|| CandleBuffer::new(*tf, max_candles))
            .add_tick(tick.ltp, tick.volume, tick.timestamp);
    }

    let completed: HashMap<Timeframe, Vec<Candle>> = timeframes
        .iter()
        .map(|tf| {
            let bars = session
                .candle_buffers
                .get(&(token, *tf))
                .map(|b| b.get_completed_candles())
                .unwrap_or_default();
            (*tf, bars)
        })
        .collect();

    let mut candles_by_timeframe = HashMap::new();
    for (tf, bars) in &completed {
        candles_by_timeframe.insert(*tf, bars.as_slice());
    }

    let snapshot = MarketSnapshot {
        ltp: Some(tick.ltp),
        bid: tick.bid,
        ask: tick.ask,
        ..Default::default()
    };
    let ctx = EvalContext {
        now,
        market: Some(snapshot),
        prev_price,
        order_event: None,
        candles_by_timeframe,
    };

    let mut results = Vec::new();
    for rule in session
        .rules
        .iter()
        .filter(|r| r.instrument_token == Some(token) && r.should_evaluate(now))
    {
        let result = evaluate_rule(rule, &ctx, tolerance_secs);
        if !result.skipped {
            results.push(result);
        }
    }

    session.prev_prices.insert(token, tick.ltp);
    results
}

fn apply_order_event(
    session: &UserSession,
    event: &OrderEvent,
    now: DateTime<Utc>,
    tolerance_secs: i64,
) -> Vec<RuleResult> {
    let ctx = EvalContext {
        now,
        market: None,
        prev_price: None,
        order_event: Some(event),
        candles_by_timeframe: HashMap::new(),
    };

    session
        .rules
        .iter()
        .filter(|r| involves_order_status(&r.trigger_config) && r.should_evaluate(now))
        .map(|rule| evaluate_rule(rule, &ctx, tolerance_secs))
        .filter(|r| !r.skipped)
        .collect()
}

fn needed_timeframes(rules: &[Rule], token: i64) -> HashSet<Timeframe> {
    let mut set = HashSet::new();
    for rule in rules.iter().filter(|r| r.instrument_token == Some(token)) {
        collect_timeframes(&rule.trigger_config, &mut set);
    }
    set
}

fn collect_timeframes(trigger: &TriggerConfig, set: &mut HashSet<Timeframe>) {
    match trigger {
        TriggerConfig::Indicator { timeframe, .. } => {
            set.insert(*timeframe);
        }
        TriggerConfig::Compound { conditions, .. } => {
            for c in conditions {
                collect_timeframes(c, set);
            }
        }
        _ => {}
    }
}

fn involves_order_status(trigger: &TriggerConfig) -> bool {
    match trigger {
        TriggerConfig::OrderStatus { .. } => true,
        TriggerConfig::Compound { conditions, .. } => conditions.iter().any(involves_order_status),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rule::action::{BrokerOrderType, Product, TransactionType};
    use crate::domain::rule::trigger::{Condition, PriceReference};
    use crate::domain::rule::ActionConfig;
    use rust_decimal_macros::dec;

    fn rule(trigger_config: TriggerConfig) -> Rule {
        let now = Utc::now();
        Rule {
            id: 1,
            user_id: 7,
            name: "r".into(),
            enabled: true,
            expires_at: None,
            max_fires: Some(1),
            fire_count: 0,
            trigger_config,
            action_config: ActionConfig::PlaceOrder {
                symbol: "X".into(),
                transaction_type: TransactionType::Sell,
                quantity: dec!(1),
                order_type: BrokerOrderType::Market,
                product: Product::I,
                price: None,
            },
            instrument_token: Some(100),
            symbol: None,
            linked_trade_id: None,
            linked_order_id: None,
            created_at: now,
            updated_at: now,
            fired_at: None,
        }
    }

    #[test]
    fn apply_tick_fires_a_static_price_stop_loss() {
        let mut session = UserSession::new(
            7,
            crate::domain::session::Credentials {
                access_token: String::new(),
                refresh_token: String::new(),
                expires_at: Utc::now(),
            },
            vec![rule(TriggerConfig::Price {
                condition: Condition::Lte,
                price: dec!(2400),
                reference: PriceReference::Ltp,
            })],
        );

        let tick = Tick {
            instrument_token: 100,
            ltp: dec!(2399),
            bid: None,
            ask: None,
            volume: dec!(0),
            timestamp: 0,
        };

        let results = apply_tick(&mut session, &tick, Utc::now(), 60, 200);
        assert_eq!(results.len(), 1);
        assert!(results[0].fired);
        assert_eq!(session.prev_prices.get(&100), Some(&dec!(2399)));
    }

    #[test]
    fn apply_tick_feeds_indicator_candle_buffers() {
        let mut session = UserSession::new(
            7,
            crate::domain::session::Credentials {
                access_token: String::new(),
                refresh_token: String::new(),
                expires_at: Utc::now(),
            },
            vec![rule(TriggerConfig::Indicator {
                indicator: crate::domain::rule::trigger::IndicatorKind::VolumeSpike,
                timeframe: Timeframe::OneMin,
                condition: Condition::Gte,
                value: 2.0,
                params: serde_json::json!({"lookback": 3, "multiplier": 2.0}),
            })],
        );

        let tick = Tick {
            instrument_token: 100,
            ltp: dec!(100),
            bid: None,
            ask: None,
            volume: dec!(5),
            timestamp: 0,
        };
        apply_tick(&mut session, &tick, Utc::now(), 60, 200);
        assert!(session.candle_buffers.contains_key(&(100, Timeframe::OneMin)));
    }
}
