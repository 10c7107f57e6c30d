use crate::domain::evaluation::context::EvalContext;
use crate::domain::rule::trigger::{BoolOperator, TriggerConfig};

/// The per-sub-condition outcome a recursive evaluation needs: whether it
/// fired, and any config update it wants persisted (spec §4.2, "Compound
/// recursion").
pub struct SubEval {
    pub fired: bool,
    pub config_update: Option<TriggerConfig>,
}

/// Pure compound-family evaluator (spec §4.2, "Compound"): "Each
/// sub-condition is a dict with a `"type"` tag selecting the family; each
/// is evaluated against the same context. `and` = all true; `or` = any
/// true." Takes the top-level trigger dispatcher as `eval_sub` so this
/// module does not need to depend on the kernel.
pub fn evaluate<F>(
    operator: BoolOperator,
    conditions: &[TriggerConfig],
    ctx: &EvalContext,
    mut eval_sub: F,
) -> (bool, Option<TriggerConfig>)
where
    F: FnMut(&TriggerConfig, &EvalContext) -> SubEval,
{
    let mut updated_conditions = Vec::with_capacity(conditions.len());
    let mut any_update = false;
    let mut results = Vec::with_capacity(conditions.len());

    for condition in conditions {
        let sub = eval_sub(condition, ctx);
        results.push(sub.fired);
        match sub.config_update {
            Some(updated) => {
                any_update = true;
                updated_conditions.push(updated);
            }
            None => updated_conditions.push(condition.clone()),
        }
    }

    let fired = match operator {
        BoolOperator::And => !results.is_empty() && results.iter().all(|f| *f),
        BoolOperator::Or => results.iter().any(|f| *f),
    };

    let config_update = any_update.then(|| TriggerConfig::Compound {
        operator,
        conditions: updated_conditions,
    });

    (fired, config_update)
}
