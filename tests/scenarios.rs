//! End-to-end literal scenarios (spec §8, "Concrete end-to-end scenarios").
//! Exercises the evaluator kernel, the candle buffer/session state, and the
//! SQLite rule store together the way the daemon's dispatcher threads them.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use trade_monitor_core::application::session_manager::SessionManager;
use trade_monitor_core::domain::evaluation::context::{EvalContext, MarketSnapshot};
use trade_monitor_core::domain::evaluation::kernel::evaluate_rule;
use trade_monitor_core::domain::market::{OrderEvent, OrderStatus, Tick};
use trade_monitor_core::domain::ports::{BrokerClient, BrokerOrderAck, MarketDataStream, PortfolioStream};
use trade_monitor_core::domain::rule::action::{BrokerOrderType, Product, TransactionType};
use trade_monitor_core::domain::rule::trigger::{Condition, PriceReference};
use trade_monitor_core::domain::rule::{ActionConfig, Rule, TriggerConfig};
use trade_monitor_core::domain::session::{Credentials, SessionStatus, UserSession};
use trade_monitor_core::error::MonitorResult;
use trade_monitor_core::infrastructure::persistence::{Database, SqliteRuleStore};
use trade_monitor_core::domain::ports::RuleStore;
use chrono::Utc;
use std::time::Duration;

fn stop_loss_rule(id: i64, price: Decimal, instrument_token: i64, linked_order_id: Option<String>) -> Rule {
    let now = Utc::now();
    Rule {
        id,
        user_id: 1,
        name: "SL".into(),
        enabled: true,
        expires_at: None,
        max_fires: Some(1),
        fire_count: 0,
        trigger_config: TriggerConfig::Price {
            condition: Condition::Lte,
            price,
            reference: PriceReference::Ltp,
        },
        action_config: ActionConfig::PlaceOrder {
            symbol: "RELIANCE".into(),
            transaction_type: TransactionType::Sell,
            quantity: dec!(10),
            order_type: BrokerOrderType::Market,
            product: Product::I,
            price: None,
        },
        instrument_token: Some(instrument_token),
        symbol: Some("RELIANCE".into()),
        linked_trade_id: None,
        linked_order_id,
        created_at: now,
        updated_at: now,
        fired_at: None,
    }
}

fn ctx_at_price(price: Decimal, prev: Option<Decimal>) -> EvalContext<'static> {
    let mut ctx = EvalContext::at(Utc::now());
    ctx.market = Some(MarketSnapshot {
        ltp: Some(price),
        ..Default::default()
    });
    ctx.prev_price = prev;
    ctx
}

struct RecordingBrokerClient;

#[async_trait]
impl BrokerClient for RecordingBrokerClient {
    async fn place_order(&self, _access_token: &str, _action: &ActionConfig) -> MonitorResult<BrokerOrderAck> {
        Ok(BrokerOrderAck {
            order_id: "BROKER-ORDER-1".to_string(),
            raw_response: serde_json::json!({"status": "accepted"}),
        })
    }
    async fn cancel_order(&self, _access_token: &str, _order_id: &str) -> MonitorResult<()> {
        Ok(())
    }
    async fn modify_order(
        &self,
        _access_token: &str,
        _order_id: &str,
        _price: Option<Decimal>,
        _quantity: Option<Decimal>,
    ) -> MonitorResult<()> {
        Ok(())
    }
    async fn get_quote(&self, _access_token: &str, _instrument_token: i64) -> MonitorResult<Decimal> {
        Ok(dec!(0))
    }
    async fn refresh_token(&self, _refresh_token: &str) -> MonitorResult<Credentials> {
        Ok(Credentials {
            access_token: "new-access".into(),
            refresh_token: "new-refresh".into(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }
}

/// No-op stream stand-ins for scenario 6: they just need to connect
/// successfully so `SessionManager::ensure_session` can build a real
/// session around the `RecordingBrokerClient`.
struct NoopMarketDataStream;

#[async_trait]
impl MarketDataStream for NoopMarketDataStream {
    async fn connect(&self, _credentials: &Credentials) -> MonitorResult<tokio::sync::mpsc::Receiver<Tick>> {
        let (_tx, rx) = tokio::sync::mpsc::channel(1);
        Ok(rx)
    }
    async fn set_subscriptions(&self, _instrument_tokens: &[i64]) -> MonitorResult<()> {
        Ok(())
    }
    async fn get_historical_candles(
        &self,
        _instrument_token: i64,
        _timeframe: trade_monitor_core::domain::market::Timeframe,
        _limit: usize,
    ) -> MonitorResult<Vec<trade_monitor_core::domain::market::Candle>> {
        Ok(Vec::new())
    }
}

struct NoopPortfolioStream;

#[async_trait]
impl PortfolioStream for NoopPortfolioStream {
    async fn connect(&self, _credentials: &Credentials) -> MonitorResult<tokio::sync::mpsc::Receiver<OrderEvent>> {
        let (_tx, rx) = tokio::sync::mpsc::channel(1);
        Ok(rx)
    }
}

/// Scenario 1: static price stop-loss fires, with fire_count/FireLog/broker
/// order id all threading through the rule store.
#[tokio::test]
async fn scenario_1_static_price_stop_loss_fires_and_logs() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let store = SqliteRuleStore::new(&db);
    let broker = RecordingBrokerClient;

    let rule = stop_loss_rule(0, dec!(2400), 100, None);
    let created = store.create_rule(&rule).await.unwrap();

    for price in [dec!(2500), dec!(2450)] {
        let ctx = ctx_at_price(price, None);
        let result = evaluate_rule(&created, &ctx, 60);
        assert!(!result.fired, "must not fire above the stop price");
    }

    let ctx = ctx_at_price(dec!(2400), None);
    let result = evaluate_rule(&created, &ctx, 60);
    assert!(result.fired, "must fire once ltp reaches the stop price");

    let ack = broker.place_order("tok", result.action.as_ref().unwrap()).await.unwrap();
    store
        .record_fire(
            created.id,
            Utc::now(),
            serde_json::to_value(&created.trigger_config).unwrap(),
            serde_json::to_value(result.action.as_ref().unwrap()).unwrap(),
            serde_json::json!({"order_id": ack.order_id}),
        )
        .await
        .unwrap();

    let persisted = store.get_rule(created.id).await.unwrap().unwrap();
    assert_eq!(persisted.fire_count, 1);
    assert!(!persisted.enabled, "rule auto-disables once max_fires is reached");

    let logs = store.list_logs(Some(created.id)).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action_result["order_id"], "BROKER-ORDER-1");
}

/// Scenario 3: crosses_above only fires on a genuine crossing, not merely
/// being above the threshold on two consecutive ticks.
#[tokio::test]
async fn scenario_3_crosses_above_requires_a_genuine_crossing() {
    let now = Utc::now();
    let rule = Rule {
        trigger_config: TriggerConfig::Price {
            condition: Condition::CrossesAbove,
            price: dec!(2700),
            reference: PriceReference::Ltp,
        },
        ..stop_loss_rule(1, dec!(2400), 100, None)
    };
    let rule = Rule { updated_at: now, ..rule };

    // First tick: no previous price recorded yet.
    let ctx1 = ctx_at_price(dec!(2705), None);
    assert!(!evaluate_rule(&rule, &ctx1, 60).fired);

    // Second tick: both prev and current are above 2700, not a crossing.
    let ctx2 = ctx_at_price(dec!(2710), Some(dec!(2705)));
    assert!(!evaluate_rule(&rule, &ctx2, 60).fired);

    // Third tick: prev below, current above -- a genuine crossing.
    let ctx3 = ctx_at_price(dec!(2710), Some(dec!(2690)));
    assert!(evaluate_rule(&rule, &ctx3, 60).fired);
}

/// Scenario 5: OCO cancels its peer on fill. SL firing disables TARGET in
/// the store and drops it from the in-memory session; TARGET then never
/// fires again even on a qualifying tick.
#[tokio::test]
async fn scenario_5_oco_cancels_its_peer_on_fill() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let store = SqliteRuleStore::new(&db);

    let sl = stop_loss_rule(0, dec!(2400), 100, Some("ORD-1".into()));
    let target = Rule {
        trigger_config: TriggerConfig::Price {
            condition: Condition::Gte,
            price: dec!(2700),
            reference: PriceReference::Ltp,
        },
        linked_order_id: Some("ORD-1".into()),
        ..stop_loss_rule(0, dec!(2400), 100, None)
    };

    let sl = store.create_rule(&sl).await.unwrap();
    let target = store.create_rule(&target).await.unwrap();

    let sl_companion = Rule {
        trigger_config: TriggerConfig::OrderStatus {
            order_id: "ORD-1".into(),
            status: OrderStatus::Complete,
        },
        action_config: ActionConfig::CancelRule { rule_id: target.id },
        ..stop_loss_rule(0, dec!(0), 100, None)
    };

    let mut session = UserSession::new(
        1,
        Credentials {
            access_token: String::new(),
            refresh_token: String::new(),
            expires_at: Utc::now(),
        },
        vec![sl.clone(), target.clone(), sl_companion.clone()],
    );

    let fill = OrderEvent {
        order_id: "ORD-1".into(),
        status: OrderStatus::Complete,
        raw_payload: serde_json::json!({}),
    };
    let mut ctx = EvalContext::at(Utc::now());
    ctx.order_event = Some(&fill);

    let result = evaluate_rule(&sl_companion, &ctx, 60);
    assert!(result.fired);
    assert_eq!(result.rules_to_cancel, vec![target.id]);

    store.disable_rule(target.id).await.unwrap();
    session.drop_rule(target.id);

    assert!(!session.rules.iter().any(|r| r.id == target.id));
    let target_after = store.get_rule(target.id).await.unwrap().unwrap();
    assert!(!target_after.enabled);

    // A subsequent qualifying tick must not fire TARGET: it is no longer in
    // the active rule set or the session snapshot.
    let active_after = store.list_active_rules(Some(1)).await.unwrap();
    assert!(!active_after.iter().any(|r| r.id == target.id));
}

/// Scenario 6: credential refresh restores streams. After a 401, a
/// successful refresh (routed through `SessionManager::refresh_credentials`,
/// not a manual field assignment) yields fresh credentials and the session
/// transitions back to Active so monitoring resumes.
#[tokio::test]
async fn scenario_6_credential_refresh_restores_active_status() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let store: Arc<dyn RuleStore> = Arc::new(SqliteRuleStore::new(&db));
    let broker: Arc<dyn BrokerClient> = Arc::new(RecordingBrokerClient);

    let market_data_factory: trade_monitor_core::application::session_manager::MarketDataStreamFactory =
        Arc::new(|| Arc::new(NoopMarketDataStream) as Arc<dyn MarketDataStream>);
    let portfolio_factory: trade_monitor_core::application::session_manager::PortfolioStreamFactory =
        Arc::new(|| Arc::new(NoopPortfolioStream) as Arc<dyn PortfolioStream>);

    let mut session_manager = SessionManager::new(
        store,
        broker,
        market_data_factory,
        portfolio_factory,
        500,
        Duration::from_secs(120),
        Duration::from_secs(15),
        Duration::from_secs(10),
    );

    let rule = stop_loss_rule(0, dec!(2400), 100, None);
    session_manager.ensure_session(1, vec![rule]).await.unwrap();

    {
        let active = session_manager.get_mut(1).unwrap();
        active.session.credentials = Credentials {
            access_token: "stale".into(),
            refresh_token: "refresh-me".into(),
            expires_at: Utc::now() - chrono::Duration::seconds(1),
        };
        active.session.status = SessionStatus::Paused;
    }

    session_manager.refresh_credentials(1).await.unwrap();

    let active = session_manager.get(1).unwrap();
    assert_eq!(active.session.status, SessionStatus::Active);
    assert_eq!(active.session.credentials.access_token, "new-access");
    assert!(!active.session.credentials.needs_refresh(Utc::now(), chrono::Duration::minutes(5)));
}
