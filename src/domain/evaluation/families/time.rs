use crate::domain::evaluation::context::EvalContext;
use crate::domain::rule::time_of_day::TimeOfDay;
use crate::domain::rule::weekday::Weekday;
use chrono::{FixedOffset, Timelike};

/// India Standard Time, a fixed UTC+5:30 offset with no DST (spec glossary,
/// "IST").
fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 1800).expect("IST offset is a valid fixed offset")
}

/// Pure time-family evaluator (spec §4.2, "Time"): "Fires if
/// `now.weekday ∈ on_days` and `0 ≤ (now − target) < tolerance`... If
/// `market_only`, Sat/Sun are excluded regardless of `on_days`."
pub fn evaluate(
    at: TimeOfDay,
    on_days: &[Weekday],
    market_only: bool,
    ctx: &EvalContext,
    tolerance_secs: i64,
) -> bool {
    let local_now = ctx.now.with_timezone(&ist_offset());
    let today = Weekday::from_chrono(local_now.weekday());

    if market_only && today.is_weekend() {
        return false;
    }
    if !on_days.contains(&today) {
        return false;
    }

    let Some(target) = local_now.date_naive().and_hms_opt(at.hour, at.minute, 0) else {
        return false;
    };
    let target = target.and_local_timezone(ist_offset()).single();
    let Some(target) = target else {
        return false;
    };

    let delta = (local_now - target).num_seconds();
    delta >= 0 && delta < tolerance_secs
}
