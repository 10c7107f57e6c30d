//! Rule model & validator (C1, spec §4.1).

pub mod action;
pub mod time_of_day;
pub mod trigger;
pub mod weekday;

pub use action::ActionConfig;
pub use trigger::TriggerConfig;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The unit of automation (spec §3, "Rule").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub user_id: i64,
    pub name: String,

    pub enabled: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_fires: Option<u32>,
    pub fire_count: u32,

    pub trigger_config: TriggerConfig,
    pub action_config: ActionConfig,

    pub instrument_token: Option<i64>,
    pub symbol: Option<String>,

    pub linked_trade_id: Option<i64>,
    pub linked_order_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub fired_at: Option<DateTime<Utc>>,
}

impl Rule {
    /// Validates the whole rule at write time (spec §4.1). Rejects the rule
    /// before it is ever persisted -- never silently normalized.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("rule name must not be empty");
        }
        self.trigger_config.validate()?;
        self.action_config.validate()?;

        if let ActionConfig::CancelRule { rule_id } = &self.action_config
            && *rule_id == self.id
        {
            anyhow::bail!("cancel_rule action cannot target its own rule");
        }

        Ok(())
    }

    /// The evaluability predicate from spec §3:
    /// `enabled ∧ fire_count < max_fires (or max_fires = null) ∧ (expires_at
    /// = null ∨ now < expires_at)`. Non-evaluable rules are skipped, never
    /// evaluated.
    pub fn should_evaluate(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(max) = self.max_fires
            && self.fire_count >= max
        {
            return false;
        }
        if let Some(expires_at) = self.expires_at
            && now >= expires_at
        {
            return false;
        }
        true
    }

    /// Accounts for one firing: increments `fire_count`, stamps `fired_at`,
    /// and auto-disables once `max_fires` is reached (spec §3 invariant:
    /// "once fire_count reaches max_fires the rule is auto-disabled").
    /// Pure state transition; the daemon is responsible for persisting it
    /// transactionally alongside the FireLog row (spec §4.7).
    pub fn record_fire(&mut self, fired_at: DateTime<Utc>) {
        self.fire_count += 1;
        self.fired_at = Some(fired_at);
        self.updated_at = fired_at;
        if let Some(max) = self.max_fires
            && self.fire_count >= max
        {
            self.enabled = false;
        }
    }
}

/// Append-only audit record per firing attempt (spec §3, "FireLog").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FireLog {
    pub id: i64,
    pub rule_id: i64,
    pub user_id: i64,
    pub trigger_snapshot: serde_json::Value,
    pub action_taken: serde_json::Value,
    pub action_result: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
