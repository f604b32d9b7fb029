//! Renewable Energy Certificate Trading Engine
//!
//! A matching engine for renewable-energy-certificate exchanges. Sellers
//! post asks carrying one concrete certificate provenance (device type,
//! location, vintage); buyers post bids describing the provenance profile
//! they will accept. The engine decides eligibility through hierarchy
//! oracles and clears eligible pairs with strict price/time/sequence
//! priority.
//!
//! # Features
//!
//! - **Profile-aware matching**: hierarchical device-type and location
//!   filters plus vintage ceilings, evaluated through swappable oracles
//! - **Continuous double auction**: synchronous per-order clearing with
//!   deterministic tie-breaking and maker-price execution
//! - **Serialized book writer**: `submit`/`cancel`/`expire` never interleave;
//!   reads observe consistent snapshots
//! - **Speculative predicate evaluation**: eligibility filters run in
//!   parallel before the serialized commit phase
//! - **Comprehensive monitoring**: built-in metrics with Prometheus support
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use rec_exchange_engine::exchange::{
//!     DeviceTypeRegistry, LocationRegistry, Order, OrderBook, Product,
//! };
//!
//! let devices = Arc::new(DeviceTypeRegistry::from_paths(&[
//!     "Solar/Photovoltaic/RoofMounted",
//!     "Wind/Onshore",
//! ])?);
//! let locations = Arc::new(LocationRegistry::from_paths(&["Germany/Bavaria"])?);
//! let book = OrderBook::new(devices, locations);
//!
//! // Offer 50 units of roof-mounted solar at 100 ticks
//! let product = Product::any()
//!     .with_device_types(vec!["Solar/Photovoltaic/RoofMounted".parse()?]);
//! let ask = Order::new_ask("seller-1", 100, 50, product, chrono::Utc::now())?;
//! book.submit(ask)?;
//!
//! // Bid for any solar certificate
//! let filter = Product::any().with_device_types(vec!["Solar".parse()?]);
//! let bid = Order::new_bid("buyer-1", 110, 20, filter, chrono::Utc::now());
//! let result = book.submit(bid)?;
//! assert_eq!(result.trades.len(), 1);
//!
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! Each side of the book is an ordered map keyed by
//! `(price, valid_from, sequence)`, so best-price/time retrieval and the
//! clearing rank order are the same iteration. Matching runs in two phases:
//! a pure phase that collects and filters the price-compatible candidate
//! prefix (parallel, abortable without side effects), and a commit phase
//! that executes maker by maker under the single writer lock.

pub mod exchange;
pub mod metrics;
pub mod utils;

// Re-export commonly used types
pub use exchange::{
    error::{ExchangeError, ExchangeResult},
    types::{Order, OrderId, OrderStatus, Price, Side, Trade, Volume},
    OrderBook, Product, SubmissionResult,
};

pub use crate::metrics::ExchangeMetrics;
