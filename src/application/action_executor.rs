//! Action Executor (C7, spec §4.7, "Action execution"): translates a fired
//! rule's `action_config` into a brokerage call, capturing whatever the
//! broker returns (or the error it raised) into `action_result` for the
//! FireLog. `cancel_rule` is a purely local action: it never touches the
//! broker.

use crate::domain::ports::BrokerClient;
use crate::domain::rule::ActionConfig;
use std::sync::Arc;
use tracing::warn;

/// Runs the action and returns a JSON value suitable for `FireLog.action_result`
/// regardless of whether the broker accepted or rejected it -- the log must
/// capture both outcomes (spec §3, "action_result").
pub async fn execute(
    broker_client: &Arc<dyn BrokerClient>,
    access_token: &str,
    rule_id: i64,
    action: &ActionConfig,
) -> serde_json::Value {
    let outcome = match action {
        ActionConfig::PlaceOrder { .. } => broker_client
            .place_order(access_token, action)
            .await
            .map(|ack| serde_json::json!({ "order_id": ack.order_id, "raw_response": ack.raw_response })),
        ActionConfig::CancelOrder { order_id } => broker_client
            .cancel_order(access_token, order_id)
            .await
            .map(|()| serde_json::json!({ "cancelled_order_id": order_id })),
        ActionConfig::ModifyOrder {
            order_id,
            price,
            quantity,
        } => broker_client
            .modify_order(access_token, order_id, *price, *quantity)
            .await
            .map(|()| serde_json::json!({ "modified_order_id": order_id })),
        ActionConfig::CancelRule { rule_id } => {
            // Handled entirely by the dispatcher via RuleResult::rules_to_cancel;
            // no broker round trip for a purely in-system action.
            Ok(serde_json::json!({ "cancelled_rule_id": rule_id }))
        }
    };

    match outcome {
        Ok(result) => result,
        Err(e) => {
            warn!(rule_id, error = %e, "action execution failed");
            serde_json::json!({ "error": e.to_string() })
        }
    }
}
