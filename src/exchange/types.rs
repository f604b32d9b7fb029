use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::exchange::error::{ExchangeError, ExchangeResult};
use crate::exchange::hierarchy::{DeviceTypeService, LocationService};
use crate::exchange::product::Product;

pub type OrderId = Uuid;
pub type TradeId = Uuid;
pub type Price = u64; // Price in ticks per certificate unit
pub type Volume = u64; // Certificate units (1 unit = 1 MWh)

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Ask,
    Bid,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Ask => Side::Bid,
            Side::Bid => Side::Ask,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Ask => write!(f, "ASK"),
            Side::Bid => write!(f, "BID"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Active,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    /// Terminal statuses admit no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Expired
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner: String,
    pub side: Side,
    pub status: OrderStatus,
    pub price: Price,
    pub original_volume: Volume,
    pub remaining_volume: Volume,
    pub filled_volume: Volume,
    pub product: Product,
    /// Earliest instant the order may match; also the time-priority tiebreak
    pub valid_from: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Monotonic tiebreak assigned by the book on submission
    pub sequence: u64,
}

impl Order {
    fn new(
        owner: impl Into<String>,
        side: Side,
        price: Price,
        volume: Volume,
        product: Product,
        valid_from: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            side,
            status: OrderStatus::Active,
            price,
            original_volume: volume,
            remaining_volume: volume,
            filled_volume: 0,
            product,
            valid_from,
            expires_at: None,
            sequence: 0,
        }
    }

    /// Sell-side order offering a certificate with one fixed provenance.
    ///
    /// The product must resolve to exactly one device-type entry.
    pub fn new_ask(
        owner: impl Into<String>,
        price: Price,
        volume: Volume,
        product: Product,
        valid_from: DateTime<Utc>,
    ) -> ExchangeResult<Self> {
        if product.device_type.len() != 1 {
            return Err(ExchangeError::InvalidOrder(
                "ask product must name exactly one device type".to_string(),
            ));
        }
        Ok(Self::new(owner, Side::Ask, price, volume, product, valid_from))
    }

    /// Buy-side order expressing an acceptable provenance profile
    pub fn new_bid(
        owner: impl Into<String>,
        price: Price,
        volume: Volume,
        product: Product,
        valid_from: DateTime<Utc>,
    ) -> Self {
        Self::new(owner, Side::Bid, price, volume, product, valid_from)
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Apply an execution of `volume` units.
    ///
    /// Moves the order to `PartiallyFilled` or `Filled`; rejects overfills
    /// and fills against terminal orders.
    pub fn fill(&mut self, volume: Volume) -> ExchangeResult<()> {
        if self.status.is_terminal() {
            return Err(ExchangeError::InvalidState);
        }
        if volume == 0 || volume > self.remaining_volume {
            return Err(ExchangeError::InvalidOrder(
                "fill volume exceeds remaining volume".to_string(),
            ));
        }

        self.remaining_volume -= volume;
        self.filled_volume += volume;
        self.status = if self.remaining_volume == 0 {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };

        Ok(())
    }

    pub fn cancel(&mut self) -> ExchangeResult<()> {
        if self.status.is_terminal() {
            return Err(ExchangeError::InvalidState);
        }
        self.status = OrderStatus::Cancelled;
        Ok(())
    }

    pub fn expire(&mut self) -> ExchangeResult<()> {
        if self.status.is_terminal() {
            return Err(ExchangeError::InvalidState);
        }
        self.status = OrderStatus::Expired;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }

    /// Ask-side eligibility test against a bid's product filter
    pub fn matches_product(
        &self,
        filter: &Product,
        devices: &dyn DeviceTypeService,
        locations: &dyn LocationService,
    ) -> ExchangeResult<bool> {
        self.product.filter_by(filter, devices, locations)
    }

    /// Sugar for `self.matches_product(&bid.product, ..)`
    pub fn matches(
        &self,
        bid: &Order,
        devices: &dyn DeviceTypeService,
        locations: &dyn LocationService,
    ) -> ExchangeResult<bool> {
        self.matches_product(&bid.product, devices, locations)
    }
}

/// Immutable record of a single execution. Created only by the matching
/// engine; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub ask_id: OrderId,
    pub bid_id: OrderId,
    pub price: Price,
    pub volume: Volume,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    pub fn new(ask_id: OrderId, bid_id: OrderId, price: Price, volume: Volume) -> Self {
        Self {
            id: Uuid::new_v4(),
            ask_id,
            bid_id,
            price,
            volume,
            executed_at: Utc::now(),
        }
    }
}

/// Where a resting order sits in the book (index entry for cancellation)
#[derive(Debug, Clone, Copy)]
pub struct OrderLocation {
    pub side: Side,
    pub price: Price,
    pub valid_from: DateTime<Utc>,
    pub sequence: u64,
}

/// Aggregated depth view of the live book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub timestamp: DateTime<Utc>,
    pub asks: Vec<PriceLevelInfo>,
    pub bids: Vec<PriceLevelInfo>,
    pub last_trade_price: Option<Price>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLevelInfo {
    pub price: Price,
    pub volume: Volume,
    pub order_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::product::{CategoryPath, DeviceVintage};

    fn path(s: &str) -> CategoryPath {
        s.parse().unwrap()
    }

    fn solar_product() -> Product {
        Product::any()
            .with_device_types(vec![path("Solar/Photovoltaic")])
            .with_vintage(DeviceVintage::new(2019))
    }

    #[test]
    fn test_ask_requires_single_device_type() {
        let ask = Order::new_ask("seller-1", 100, 50, solar_product(), Utc::now());
        assert!(ask.is_ok());

        let no_device = Order::new_ask("seller-1", 100, 50, Product::any(), Utc::now());
        assert!(matches!(no_device, Err(ExchangeError::InvalidOrder(_))));

        let two_devices = Order::new_ask(
            "seller-1",
            100,
            50,
            Product::any().with_device_types(vec![path("Solar"), path("Wind")]),
            Utc::now(),
        );
        assert!(matches!(two_devices, Err(ExchangeError::InvalidOrder(_))));
    }

    #[test]
    fn test_order_creation() {
        let order = Order::new_bid("buyer-1", 120, 30, Product::any(), Utc::now());

        assert_eq!(order.side, Side::Bid);
        assert_eq!(order.status, OrderStatus::Active);
        assert_eq!(order.original_volume, 30);
        assert_eq!(order.remaining_volume, 30);
        assert_eq!(order.filled_volume, 0);
        assert_eq!(order.sequence, 0);
    }

    #[test]
    fn test_order_fill_transitions() {
        let mut order = Order::new_bid("buyer-1", 120, 100, Product::any(), Utc::now());

        order.fill(30).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.remaining_volume, 70);
        assert_eq!(order.filled_volume, 30);

        order.fill(70).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.remaining_volume, 0);
        assert!(order.is_terminal());
    }

    #[test]
    fn test_overfill_rejected() {
        let mut order = Order::new_bid("buyer-1", 120, 100, Product::any(), Utc::now());
        assert!(order.fill(150).is_err());
        assert_eq!(order.remaining_volume, 100);
        assert_eq!(order.status, OrderStatus::Active);
    }

    #[test]
    fn test_no_transition_out_of_terminal() {
        let mut order = Order::new_bid("buyer-1", 120, 10, Product::any(), Utc::now());
        order.fill(10).unwrap();

        assert_eq!(order.cancel(), Err(ExchangeError::InvalidState));
        assert_eq!(order.expire(), Err(ExchangeError::InvalidState));
        assert_eq!(order.fill(1), Err(ExchangeError::InvalidState));
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[test]
    fn test_cancel_from_partially_filled() {
        let mut order = Order::new_bid("buyer-1", 120, 10, Product::any(), Utc::now());
        order.fill(4).unwrap();
        order.cancel().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        // Second cancel fails explicitly rather than silently succeeding
        assert_eq!(order.cancel(), Err(ExchangeError::InvalidState));
    }

    #[test]
    fn test_validity_and_expiry_windows() {
        let now = Utc::now();
        let order = Order::new_bid("buyer-1", 120, 10, Product::any(), now)
            .with_expiry(now + chrono::Duration::hours(1));

        assert!(order.is_valid_at(now));
        assert!(!order.is_valid_at(now - chrono::Duration::seconds(1)));
        assert!(!order.is_expired_at(now));
        assert!(order.is_expired_at(now + chrono::Duration::hours(2)));
    }

    #[test]
    fn test_order_serialization_round_trip() {
        let order = Order::new_ask("seller-1", 100, 50, solar_product(), Utc::now()).unwrap();
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, back);
    }
}
