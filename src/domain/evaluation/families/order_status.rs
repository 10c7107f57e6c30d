use crate::domain::evaluation::context::EvalContext;
use crate::domain::market::OrderStatus;

/// Pure order-status-family evaluator (spec §3, "order_status"): fires when
/// an inbound order event matches both the watched `order_id` and `status`.
/// Without an inbound event in the context, it never fires -- this family
/// is driven by the portfolio stream, not the poll/tick cadence.
pub fn evaluate(order_id: &str, status: OrderStatus, ctx: &EvalContext) -> bool {
    match ctx.order_event {
        Some(event) => event.order_id == order_id && event.status == status,
        None => false,
    }
}
