pub mod enums;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{OrderSide, SignalKind};
pub use structs::{Kline, LotSize, Position, TradeRecord};
