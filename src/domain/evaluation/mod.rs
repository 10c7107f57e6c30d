//! Evaluator Kernel (C2, spec §4.2).

pub mod context;
pub mod families;
pub mod kernel;
pub mod result;

pub use context::{EvalContext, MarketSnapshot};
pub use kernel::{evaluate_rule, evaluate_trigger, TriggerEval};
pub use result::RuleResult;
