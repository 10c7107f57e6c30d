use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single update from the market-data stream (spec §4.6, "Market-data
/// stream"). `instrument_token` is the opaque broker key; `ltp` is the
/// last-traded price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub instrument_token: i64,
    pub ltp: Decimal,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub volume: Decimal,
    pub timestamp: i64,
}

/// Order-status update from the portfolio stream (spec §4.6, "Portfolio
/// stream").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: String,
    pub status: OrderStatus,
    pub raw_payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Complete,
    Rejected,
    Cancelled,
    PartiallyFilled,
}
