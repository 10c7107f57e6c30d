//! Evaluator Kernel (C2, spec §4.2): "Pure functions, one per trigger
//! family... no I/O, no sleeping, no logging inside an evaluator -- the
//! context carries every input they may need."

use super::context::EvalContext;
use super::families::{compound, indicator, order_status, price, time, trailing_stop};
use super::result::RuleResult;
use crate::domain::rule::trigger::TriggerConfig;
use crate::domain::rule::Rule;

/// The outcome of evaluating a single [`TriggerConfig`], independent of the
/// rule it belongs to. Used both at the top level and recursively for
/// `compound` sub-conditions.
pub struct TriggerEval {
    pub fired: bool,
    pub config_update: Option<TriggerConfig>,
}

/// Dispatches a trigger config to its family evaluator (spec §4.2 per-family
/// semantics). `tolerance_secs` configures the `time` family's window
/// (spec §6, `time_trigger_tolerance_secs`).
pub fn evaluate_trigger(
    trigger: &TriggerConfig,
    ctx: &EvalContext,
    tolerance_secs: i64,
) -> TriggerEval {
    match trigger {
        TriggerConfig::Price {
            condition,
            price: threshold,
            reference,
        } => TriggerEval {
            fired: price::evaluate(*condition, *threshold, *reference, ctx),
            config_update: None,
        },
        TriggerConfig::Time {
            at,
            on_days,
            market_only,
        } => TriggerEval {
            fired: time::evaluate(*at, on_days, *market_only, ctx, tolerance_secs),
            config_update: None,
        },
        TriggerConfig::Indicator {
            indicator: kind,
            timeframe,
            condition,
            value,
            params,
        } => TriggerEval {
            fired: indicator::evaluate(*kind, *timeframe, *condition, *value, params, ctx),
            config_update: None,
        },
        TriggerConfig::OrderStatus { order_id, status } => TriggerEval {
            fired: order_status::evaluate(order_id, *status, ctx),
            config_update: None,
        },
        TriggerConfig::Compound {
            operator,
            conditions,
        } => {
            let (fired, config_update) = compound::evaluate(*operator, conditions, ctx, |sub, c| {
                let eval = evaluate_trigger(sub, c, tolerance_secs);
                compound::SubEval {
                    fired: eval.fired,
                    config_update: eval.config_update,
                }
            });
            TriggerEval {
                fired,
                config_update,
            }
        }
        TriggerConfig::TrailingStop {
            trail_percent,
            initial_price,
            highest_price,
            reference,
        } => {
            let outcome = trailing_stop::evaluate(
                *trail_percent,
                *initial_price,
                *highest_price,
                *reference,
                ctx,
            );
            TriggerEval {
                fired: outcome.fired,
                config_update: outcome.updated_config,
            }
        }
    }
}

/// Top-level entry point (spec §4.2, "Return shape -- RuleResult"): gates on
/// `rule.should_evaluate`, dispatches the trigger, and on a fire, attaches
/// the rule's configured action (and any OCO cancellation it implies).
pub fn evaluate_rule(rule: &Rule, ctx: &EvalContext, tolerance_secs: i64) -> RuleResult {
    if !rule.should_evaluate(ctx.now) {
        return RuleResult::skipped(rule.id);
    }

    let eval = evaluate_trigger(&rule.trigger_config, ctx, tolerance_secs);

    if eval.fired {
        RuleResult::fired(rule.id, rule.action_config.clone())
    } else if let Some(update) = eval.config_update {
        RuleResult::not_fired_with_update(rule.id, update)
    } else {
        RuleResult::not_fired(rule.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evaluation::context::MarketSnapshot;
    use crate::domain::rule::action::{BrokerOrderType, Product, TransactionType};
    use crate::domain::rule::trigger::{BoolOperator, Condition, PriceReference};
    use crate::domain::rule::ActionConfig;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample_rule(trigger_config: TriggerConfig) -> Rule {
        let now = Utc::now();
        Rule {
            id: 1,
            user_id: 1,
            name: "r".into(),
            enabled: true,
            expires_at: None,
            max_fires: Some(1),
            fire_count: 0,
            trigger_config,
            action_config: ActionConfig::PlaceOrder {
                symbol: "RELIANCE".into(),
                transaction_type: TransactionType::Sell,
                quantity: dec!(1),
                order_type: BrokerOrderType::Market,
                product: Product::I,
                price: None,
            },
            instrument_token: Some(1),
            symbol: Some("RELIANCE".into()),
            linked_trade_id: None,
            linked_order_id: None,
            created_at: now,
            updated_at: now,
            fired_at: None,
        }
    }

    #[test]
    fn disabled_rule_is_skipped_not_evaluated() {
        let mut rule = sample_rule(TriggerConfig::Price {
            condition: Condition::Lte,
            price: dec!(2400),
            reference: PriceReference::Ltp,
        });
        rule.enabled = false;
        let ctx = EvalContext::at(Utc::now());
        let result = evaluate_rule(&rule, &ctx, 60);
        assert!(result.skipped);
        assert!(!result.fired);
    }

    #[test]
    fn firing_rule_attaches_its_action() {
        let rule = sample_rule(TriggerConfig::Price {
            condition: Condition::Lte,
            price: dec!(2400),
            reference: PriceReference::Ltp,
        });
        let mut ctx = EvalContext::at(Utc::now());
        ctx.market = Some(MarketSnapshot {
            ltp: Some(dec!(2350)),
            ..Default::default()
        });
        let result = evaluate_rule(&rule, &ctx, 60);
        assert!(result.fired);
        assert!(result.action.is_some());
    }

    // Mirrors spec §8 scenario 4: compound AND of a price trigger and a
    // time trigger.
    #[test]
    fn compound_and_requires_every_sub_condition() {
        use crate::domain::rule::time_of_day::TimeOfDay;
        use crate::domain::rule::weekday::Weekday;
        use chrono::TimeZone;

        let rule = sample_rule(TriggerConfig::Compound {
            operator: BoolOperator::And,
            conditions: vec![
                TriggerConfig::Price {
                    condition: Condition::Lte,
                    price: dec!(2400),
                    reference: PriceReference::Ltp,
                },
                TriggerConfig::Time {
                    at: TimeOfDay::try_from("14:00".to_string()).unwrap(),
                    on_days: vec![Weekday::Mon],
                    market_only: false,
                },
            ],
        });

        // 2024-06-03 is a Monday; 14:00:00 IST == 08:30:00 UTC.
        let on_time = Utc.with_ymd_and_hms(2024, 6, 3, 8, 30, 0).unwrap();
        let mut ctx = EvalContext::at(on_time);
        ctx.market = Some(MarketSnapshot {
            ltp: Some(dec!(2350)),
            ..Default::default()
        });
        assert!(evaluate_rule(&rule, &ctx, 60).fired);

        let outside_tolerance = Utc.with_ymd_and_hms(2024, 6, 3, 8, 35, 0).unwrap();
        let mut ctx2 = EvalContext::at(outside_tolerance);
        ctx2.market = Some(MarketSnapshot {
            ltp: Some(dec!(2350)),
            ..Default::default()
        });
        assert!(!evaluate_rule(&rule, &ctx2, 60).fired);
    }
}
