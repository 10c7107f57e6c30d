use crate::domain::rule::{ActionConfig, TriggerConfig};

/// The outcome of evaluating one rule against one context (spec §4.2,
/// "Return shape -- RuleResult").
#[derive(Debug, Clone, PartialEq)]
pub struct RuleResult {
    pub rule_id: i64,
    pub fired: bool,
    pub skipped: bool,
    /// Populated only when `fired`.
    pub action: Option<ActionConfig>,
    /// Populated when the fired action is `cancel_rule`; also used to
    /// propagate OCO cancellations (spec §4.2).
    pub rules_to_cancel: Vec<i64>,
    /// Non-null whenever the evaluator has a side-effect intent on the
    /// rule's own config (trailing stop moving its high-water mark). The
    /// daemon persists it; the kernel itself never mutates anything.
    pub trigger_config_update: Option<TriggerConfig>,
}

impl RuleResult {
    pub fn skipped(rule_id: i64) -> Self {
        Self {
            rule_id,
            fired: false,
            skipped: true,
            action: None,
            rules_to_cancel: Vec::new(),
            trigger_config_update: None,
        }
    }

    pub fn not_fired(rule_id: i64) -> Self {
        Self {
            rule_id,
            fired: false,
            skipped: false,
            action: None,
            rules_to_cancel: Vec::new(),
            trigger_config_update: None,
        }
    }

    pub fn not_fired_with_update(rule_id: i64, update: TriggerConfig) -> Self {
        Self {
            rule_id,
            fired: false,
            skipped: false,
            action: None,
            rules_to_cancel: Vec::new(),
            trigger_config_update: Some(update),
        }
    }

    pub fn fired(rule_id: i64, action: ActionConfig) -> Self {
        let rules_to_cancel = match &action {
            ActionConfig::CancelRule { rule_id } => vec![*rule_id],
            _ => Vec::new(),
        };
        Self {
            rule_id,
            fired: true,
            skipped: false,
            action: Some(action),
            rules_to_cancel,
            trigger_config_update: None,
        }
    }
}
