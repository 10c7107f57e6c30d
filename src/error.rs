//! Error taxonomy for the trade monitor core.
//!
//! Mirrors the kinds distinguished in the design: validation failures are
//! rejected at write time and never persisted, transient network and auth
//! failures drive backoff/refresh at the stream layer, broker rejections are
//! recorded against the firing rule, and evaluator invariant violations are
//! a bug surface that must never silently corrupt state.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("rule validation failed: {reason}")]
    Validation { reason: String },

    #[error("transient network error talking to {endpoint}: {reason}")]
    TransientNetwork { endpoint: String, reason: String },

    #[error("authentication error for user {user_id}: {reason}")]
    Auth { user_id: i64, reason: String },

    #[error("broker rejected order for rule {rule_id}: {reason}")]
    BrokerRejection { rule_id: i64, reason: String },

    #[error("evaluator invariant violated for rule {rule_id}: {reason}")]
    EvaluatorInvariant { rule_id: i64, reason: String },

    #[error("monitoring paused for user {user_id}: {reason}")]
    MonitoringPaused { user_id: i64, reason: String },

    #[error("rule store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
