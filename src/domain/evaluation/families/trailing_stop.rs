use crate::domain::evaluation::context::EvalContext;
use crate::domain::rule::trigger::{PriceReference, TriggerConfig};
use rust_decimal::Decimal;

/// Outcome of evaluating a `trailing_stop` trigger: either it fires, or it
/// doesn't and may carry an updated high-water mark to persist.
pub struct TrailingStopOutcome {
    pub fired: bool,
    pub updated_config: Option<TriggerConfig>,
}

/// Pure trailing-stop evaluator (spec §3, "trailing_stop"): "Stop =
/// highest_price × (1 − trail_percent/100). Fires when reference ≤ stop.
/// When reference > highest_price, emit a config update with the new
/// high-water mark (no fire)."
pub fn evaluate(
    trail_percent: Decimal,
    initial_price: Decimal,
    highest_price: Decimal,
    reference: PriceReference,
    ctx: &EvalContext,
) -> TrailingStopOutcome {
    let Some(current) = ctx.market.and_then(|m| m.get(reference)) else {
        return TrailingStopOutcome {
            fired: false,
            updated_config: None,
        };
    };

    if current > highest_price {
        return TrailingStopOutcome {
            fired: false,
            updated_config: Some(TriggerConfig::TrailingStop {
                trail_percent,
                initial_price,
                highest_price: current,
                reference,
            }),
        };
    }

    let hundred = Decimal::from(100);
    let stop = highest_price * (Decimal::ONE - trail_percent / hundred);
    TrailingStopOutcome {
        fired: current <= stop,
        updated_config: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evaluation::context::MarketSnapshot;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn ctx_with_ltp(ltp: Decimal) -> EvalContext<'static> {
        let mut c = EvalContext::at(Utc::now());
        c.market = Some(MarketSnapshot {
            ltp: Some(ltp),
            ..Default::default()
        });
        c
    }

    // Mirrors spec §8 scenario 2: trail_percent=15, initial=highest=1000,
    // ticks 1000, 1100, 1200, 1020.
    #[test]
    fn raises_floor_then_fires_on_breach() {
        let tick1 = evaluate(
            dec!(15),
            dec!(1000),
            dec!(1000),
            PriceReference::Ltp,
            &ctx_with_ltp(dec!(1000)),
        );
        assert!(!tick1.fired);
        assert!(tick1.updated_config.is_none());

        let tick2 = evaluate(
            dec!(15),
            dec!(1000),
            dec!(1000),
            PriceReference::Ltp,
            &ctx_with_ltp(dec!(1100)),
        );
        assert!(!tick2.fired);
        match tick2.updated_config {
            Some(TriggerConfig::TrailingStop { highest_price, .. }) => {
                assert_eq!(highest_price, dec!(1100));
            }
            _ => panic!("expected a high-water mark update"),
        }

        let tick3 = evaluate(
            dec!(15),
            dec!(1000),
            dec!(1100),
            PriceReference::Ltp,
            &ctx_with_ltp(dec!(1200)),
        );
        assert!(!tick3.fired);
        match tick3.updated_config {
            Some(TriggerConfig::TrailingStop { highest_price, .. }) => {
                assert_eq!(highest_price, dec!(1200));
            }
            _ => panic!("expected a high-water mark update"),
        }

        // stop = 1200 * 0.85 = 1020
        let tick4 = evaluate(
            dec!(15),
            dec!(1000),
            dec!(1200),
            PriceReference::Ltp,
            &ctx_with_ltp(dec!(1020)),
        );
        assert!(tick4.fired);
        assert!(tick4.updated_config.is_none());
    }

    #[test]
    fn missing_reference_never_fires_or_updates() {
        let ctx = EvalContext::at(Utc::now());
        let outcome = evaluate(dec!(15), dec!(1000), dec!(1000), PriceReference::Ltp, &ctx);
        assert!(!outcome.fired);
        assert!(outcome.updated_config.is_none());
    }
}
