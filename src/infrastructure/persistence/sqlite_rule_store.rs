use crate::domain::ports::RuleStore;
use crate::domain::rule::{ActionConfig, FireLog, Rule, TriggerConfig};
use crate::error::{MonitorError, MonitorResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use super::database::Database;

/// SQLite-backed [`RuleStore`] (spec §4.4). Configs round-trip through
/// `serde_json` into TEXT columns; timestamps are stored as RFC 3339
/// strings so the schema needs no sqlx chrono-sqlite coupling.
pub struct SqliteRuleStore {
    pool: SqlitePool,
}

impl SqliteRuleStore {
    pub fn new(database: &Database) -> Self {
        Self {
            pool: database.pool.clone(),
        }
    }

    fn row_to_rule(row: &sqlx::sqlite::SqliteRow) -> MonitorResult<Rule> {
        let trigger_config: TriggerConfig = serde_json::from_str(row.try_get("trigger_config")?)
            .map_err(|e| MonitorError::Other(anyhow::anyhow!("corrupt trigger_config: {e}")))?;
        let action_config: ActionConfig = serde_json::from_str(row.try_get("action_config")?)
            .map_err(|e| MonitorError::Other(anyhow::anyhow!("corrupt action_config: {e}")))?;

        Ok(Rule {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            enabled: row.try_get("enabled")?,
            expires_at: parse_opt_timestamp(row.try_get("expires_at")?)?,
            max_fires: row
                .try_get::<Option<i64>, _>("max_fires")?
                .map(|v| v as u32),
            fire_count: row.try_get::<i64, _>("fire_count")? as u32,
            trigger_config,
            action_config,
            instrument_token: row.try_get("instrument_token")?,
            symbol: row.try_get("symbol")?,
            linked_trade_id: row.try_get("linked_trade_id")?,
            linked_order_id: row.try_get("linked_order_id")?,
            created_at: parse_timestamp(row.try_get("created_at")?)?,
            updated_at: parse_timestamp(row.try_get("updated_at")?)?,
            fired_at: parse_opt_timestamp(row.try_get("fired_at")?)?,
        })
    }
}

fn parse_timestamp(raw: String) -> MonitorResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MonitorError::Other(anyhow::anyhow!("corrupt timestamp '{raw}': {e}")))
}

fn parse_opt_timestamp(raw: Option<String>) -> MonitorResult<Option<DateTime<Utc>>> {
    raw.map(parse_timestamp).transpose()
}

#[async_trait]
impl RuleStore for SqliteRuleStore {
    async fn create_rule(&self, rule: &Rule) -> MonitorResult<Rule> {
        let trigger_json = serde_json::to_string(&rule.trigger_config)
            .map_err(|e| MonitorError::Other(e.into()))?;
        let action_json = serde_json::to_string(&rule.action_config)
            .map_err(|e| MonitorError::Other(e.into()))?;

        let id: i64 = sqlx::query(
            r#"
            INSERT INTO monitor_rules
                (user_id, name, enabled, trigger_type, trigger_config, action_type, action_config,
                 instrument_token, symbol, linked_trade_id, linked_order_id,
                 fire_count, max_fires, expires_at, fired_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(rule.user_id)
        .bind(&rule.name)
        .bind(rule.enabled)
        .bind(trigger_type_name(&rule.trigger_config))
        .bind(trigger_json)
        .bind(action_type_name(&rule.action_config))
        .bind(action_json)
        .bind(rule.instrument_token)
        .bind(&rule.symbol)
        .bind(rule.linked_trade_id)
        .bind(&rule.linked_order_id)
        .bind(rule.fire_count as i64)
        .bind(rule.max_fires.map(|v| v as i64))
        .bind(rule.expires_at.map(|t| t.to_rfc3339()))
        .bind(rule.fired_at.map(|t| t.to_rfc3339()))
        .bind(rule.created_at.to_rfc3339())
        .bind(rule.updated_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await?
        .try_get("id")?;

        let mut persisted = rule.clone();
        persisted.id = id;
        Ok(persisted)
    }

    async fn get_rule(&self, id: i64) -> MonitorResult<Option<Rule>> {
        let row = sqlx::query("SELECT * FROM monitor_rules WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_rule).transpose()
    }

    async fn update_rule(&self, rule: &Rule) -> MonitorResult<()> {
        let trigger_json = serde_json::to_string(&rule.trigger_config)
            .map_err(|e| MonitorError::Other(e.into()))?;
        let action_json = serde_json::to_string(&rule.action_config)
            .map_err(|e| MonitorError::Other(e.into()))?;

        sqlx::query(
            r#"
            UPDATE monitor_rules SET
                name = ?, enabled = ?, trigger_type = ?, trigger_config = ?,
                action_type = ?, action_config = ?, instrument_token = ?, symbol = ?,
                linked_trade_id = ?, linked_order_id = ?, fire_count = ?, max_fires = ?,
                expires_at = ?, fired_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&rule.name)
        .bind(rule.enabled)
        .bind(trigger_type_name(&rule.trigger_config))
        .bind(trigger_json)
        .bind(action_type_name(&rule.action_config))
        .bind(action_json)
        .bind(rule.instrument_token)
        .bind(&rule.symbol)
        .bind(rule.linked_trade_id)
        .bind(&rule.linked_order_id)
        .bind(rule.fire_count as i64)
        .bind(rule.max_fires.map(|v| v as i64))
        .bind(rule.expires_at.map(|t| t.to_rfc3339()))
        .bind(rule.fired_at.map(|t| t.to_rfc3339()))
        .bind(rule.updated_at.to_rfc3339())
        .bind(rule.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn disable_rule(&self, id: i64) -> MonitorResult<()> {
        sqlx::query("UPDATE monitor_rules SET enabled = 0, updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_rule(&self, id: i64) -> MonitorResult<()> {
        sqlx::query("DELETE FROM monitor_rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_active_rules(&self, user_id: Option<i64>) -> MonitorResult<Vec<Rule>> {
        let rows = match user_id {
            Some(uid) => {
                sqlx::query(
                    "SELECT * FROM monitor_rules WHERE enabled = 1 AND user_id = ? \
                     AND (max_fires IS NULL OR fire_count < max_fires) \
                     AND (expires_at IS NULL OR expires_at > ?)",
                )
                .bind(uid)
                .bind(Utc::now().to_rfc3339())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM monitor_rules WHERE enabled = 1 \
                     AND (max_fires IS NULL OR fire_count < max_fires) \
                     AND (expires_at IS NULL OR expires_at > ?)",
                )
                .bind(Utc::now().to_rfc3339())
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(Self::row_to_rule).collect()
    }

    async fn list_updated_since(&self, since: DateTime<Utc>) -> MonitorResult<Vec<Rule>> {
        let rows = sqlx::query("SELECT * FROM monitor_rules WHERE updated_at > ?")
            .bind(since.to_rfc3339())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_rule).collect()
    }

    async fn record_fire(
        &self,
        rule_id: i64,
        fired_at: DateTime<Utc>,
        trigger_snapshot: serde_json::Value,
        action_taken: serde_json::Value,
        action_result: serde_json::Value,
    ) -> MonitorResult<()> {
        // Transactional: fire_count/enabled flip and the FireLog row commit
        // together (spec §4.7, "Idempotency & duplicate prevention").
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT user_id, fire_count, max_fires FROM monitor_rules WHERE id = ?")
            .bind(rule_id)
            .fetch_one(&mut *tx)
            .await?;
        let user_id: i64 = row.try_get("user_id")?;
        let fire_count: i64 = row.try_get("fire_count")?;
        let max_fires: Option<i64> = row.try_get("max_fires")?;
        let new_count = fire_count + 1;
        let auto_disable = max_fires.is_some_and(|max| new_count >= max);

        sqlx::query(
            "UPDATE monitor_rules SET fire_count = ?, fired_at = ?, updated_at = ?, \
             enabled = CASE WHEN ? THEN 0 ELSE enabled END WHERE id = ?",
        )
        .bind(new_count)
        .bind(fired_at.to_rfc3339())
        .bind(fired_at.to_rfc3339())
        .bind(auto_disable)
        .bind(rule_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO monitor_logs (user_id, rule_id, trigger_snapshot, action_taken, action_result, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(rule_id)
        .bind(trigger_snapshot.to_string())
        .bind(action_taken.to_string())
        .bind(action_result.to_string())
        .bind(fired_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_trigger_config(&self, rule_id: i64, new_config: &TriggerConfig) -> MonitorResult<()> {
        let json = serde_json::to_string(new_config).map_err(|e| MonitorError::Other(e.into()))?;
        sqlx::query("UPDATE monitor_rules SET trigger_config = ?, updated_at = ? WHERE id = ?")
            .bind(json)
            .bind(Utc::now().to_rfc3339())
            .bind(rule_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_logs(&self, rule_id: Option<i64>) -> MonitorResult<Vec<FireLog>> {
        let rows = match rule_id {
            Some(id) => {
                sqlx::query("SELECT * FROM monitor_logs WHERE rule_id = ? ORDER BY created_at DESC")
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM monitor_logs ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter()
            .map(|row| -> MonitorResult<FireLog> {
                Ok(FireLog {
                    id: row.try_get("id")?,
                    rule_id: row.try_get("rule_id")?,
                    user_id: row.try_get("user_id")?,
                    trigger_snapshot: serde_json::from_str(row.try_get("trigger_snapshot")?)
                        .map_err(|e| MonitorError::Other(e.into()))?,
                    action_taken: serde_json::from_str(row.try_get("action_taken")?)
                        .map_err(|e| MonitorError::Other(e.into()))?,
                    action_result: serde_json::from_str(row.try_get("action_result")?)
                        .map_err(|e| MonitorError::Other(e.into()))?,
                    created_at: parse_timestamp(row.try_get("created_at")?)?,
                })
            })
            .collect()
    }
}

fn trigger_type_name(trigger: &TriggerConfig) -> &'static str {
    match trigger {
        TriggerConfig::Price { .. } => "price",
        TriggerConfig::Time { .. } => "time",
        TriggerConfig::Indicator { .. } => "indicator",
        TriggerConfig::OrderStatus { .. } => "order_status",
        TriggerConfig::Compound { .. } => "compound",
        TriggerConfig::TrailingStop { .. } => "trailing_stop",
    }
}

fn action_type_name(action: &ActionConfig) -> &'static str {
    match action {
        ActionConfig::PlaceOrder { .. } => "place_order",
        ActionConfig::CancelOrder { .. } => "cancel_order",
        ActionConfig::ModifyOrder { .. } => "modify_order",
        ActionConfig::CancelRule { .. } => "cancel_rule",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rule::action::{BrokerOrderType, Product, TransactionType};
    use crate::domain::rule::trigger::{Condition, PriceReference};
    use rust_decimal_macros::dec;

    async fn store() -> SqliteRuleStore {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        SqliteRuleStore::new(&db)
    }

    fn sample_rule() -> Rule {
        let now = Utc::now();
        Rule {
            id: 0,
            user_id: 1,
            name: "SL".into(),
            enabled: true,
            expires_at: None,
            max_fires: Some(1),
            fire_count: 0,
            trigger_config: TriggerConfig::Price {
                condition: Condition::Lte,
                price: dec!(2400),
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
            instrument_token: Some(100),
            symbol: Some("RELIANCE".into()),
            linked_trade_id: None,
            linked_order_id: None,
            created_at: now,
            updated_at: now,
            fired_at: None,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = store().await;
        let created = store.create_rule(&sample_rule()).await.unwrap();
        let fetched = store.get_rule(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "SL");
        assert_eq!(fetched.trigger_config, created.trigger_config);
    }

    #[tokio::test]
    async fn record_fire_increments_and_auto_disables_at_max() {
        let store = store().await;
        let created = store.create_rule(&sample_rule()).await.unwrap();

        store
            .record_fire(
                created.id,
                Utc::now(),
                serde_json::json!({}),
                serde_json::json!({}),
                serde_json::json!({"order_id": "X1"}),
            )
            .await
            .unwrap();

        let fetched = store.get_rule(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.fire_count, 1);
        assert!(!fetched.enabled);

        let logs = store.list_logs(Some(created.id)).await.unwrap();
        assert_eq!(logs.len(), 1);
    }

    #[tokio::test]
    async fn list_active_rules_excludes_exhausted_and_expired() {
        let store = store().await;
        let mut r = sample_rule();
        r.max_fires = Some(1);
        let created = store.create_rule(&r).await.unwrap();
        store
            .record_fire(
                created.id,
                Utc::now(),
                serde_json::json!({}),
                serde_json::json!({}),
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let active = store.list_active_rules(None).await.unwrap();
        assert!(active.is_empty());
    }
}
