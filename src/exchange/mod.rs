//! Certificate exchange core.
//!
//! Order/product data model, hierarchy-matching oracles, the eligibility
//! predicate and the continuous-double-auction order book for renewable
//! energy certificate trading.

pub mod book;
pub mod error;
pub mod hierarchy;
pub mod matching;
pub mod product;
pub mod types;

// Re-export main types for convenience
pub use book::{OrderBook, OrderBookStats, SubmissionResult};
pub use error::{ExchangeError, ExchangeResult};
pub use hierarchy::{DeviceTypeRegistry, DeviceTypeService, LocationRegistry, LocationService};
pub use product::{CategoryPath, DeviceVintage, GenerationTime, Product, VintageOperator};
pub use types::{
    BookSnapshot, Order, OrderId, OrderStatus, Price, PriceLevelInfo, Side, Trade, TradeId,
    Volume,
};
