use crate::domain::evaluation::context::EvalContext;
use crate::domain::rule::trigger::{Condition, PriceReference};

/// Pure price-family evaluator (spec §4.2, "Price").
///
/// `current = market_data[reference]`; if missing, do not fire. `lte/gte`
/// use `<=`/`>=`. `crosses_above` requires `prev < threshold && current >=
/// threshold`; `crosses_below` mirrors it. Without a previous price,
/// crossings cannot fire.
pub fn evaluate(
    condition: Condition,
    threshold: rust_decimal::Decimal,
    reference: PriceReference,
    ctx: &EvalContext,
) -> bool {
    let Some(current) = ctx.market.and_then(|m| m.get(reference)) else {
        return false;
    };

    match condition {
        Condition::Lte => current <= threshold,
        Condition::Gte => current >= threshold,
        Condition::CrossesAbove => match ctx.prev_price {
            Some(prev) => prev < threshold && current >= threshold,
            None => false,
        },
        Condition::CrossesBelow => match ctx.prev_price {
            Some(prev) => prev > threshold && current <= threshold,
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evaluation::context::MarketSnapshot;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn ctx(ltp: rust_decimal::Decimal, prev: Option<rust_decimal::Decimal>) -> EvalContext<'static> {
        let mut c = EvalContext::at(Utc::now());
        c.market = Some(MarketSnapshot {
            ltp: Some(ltp),
            ..Default::default()
        });
        c.prev_price = prev;
        c
    }

    #[test]
    fn lte_fires_when_at_or_below_threshold() {
        assert!(evaluate(
            Condition::Lte,
            dec!(2400),
            PriceReference::Ltp,
            &ctx(dec!(2400), None)
        ));
        assert!(!evaluate(
            Condition::Lte,
            dec!(2400),
            PriceReference::Ltp,
            &ctx(dec!(2401), None)
        ));
    }

    #[test]
    fn crosses_above_requires_a_genuine_crossing() {
        // No previous price at all: cannot fire.
        assert!(!evaluate(
            Condition::CrossesAbove,
            dec!(2700),
            PriceReference::Ltp,
            &ctx(dec!(2705), None)
        ));
        // Both sample points above threshold: no crossing occurred.
        assert!(!evaluate(
            Condition::CrossesAbove,
            dec!(2700),
            PriceReference::Ltp,
            &ctx(dec!(2710), Some(dec!(2705)))
        ));
        // Genuine crossing from below to at-or-above.
        assert!(evaluate(
            Condition::CrossesAbove,
            dec!(2700),
            PriceReference::Ltp,
            &ctx(dec!(2710), Some(dec!(2690)))
        ));
    }

    #[test]
    fn missing_reference_never_fires() {
        let c = EvalContext::at(Utc::now());
        assert!(!evaluate(Condition::Lte, dec!(100), PriceReference::Ltp, &c));
    }
}
