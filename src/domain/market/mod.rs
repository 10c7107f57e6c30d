pub mod candle;
pub mod event;
pub mod timeframe;

pub use candle::{Candle, CandleBuffer};
pub use event::{OrderEvent, OrderStatus, Tick};
pub use timeframe::Timeframe;
