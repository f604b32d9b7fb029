use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::exchange::error::{ExchangeError, ExchangeResult};
use crate::exchange::hierarchy::{DeviceTypeService, LocationService};
use crate::exchange::matching::MatchingEngine;
use crate::exchange::types::{
    BookSnapshot, Order, OrderId, OrderLocation, Price, PriceLevelInfo, Side, Trade, Volume,
};

/// Best-first sort keys. Ask side ascends by price, bid side descends via
/// `Reverse`; `valid_from` then the submission sequence break all remaining
/// ties, so iteration order is the clearing rank order and no two keys
/// ever collide.
type AskKey = (Price, DateTime<Utc>, u64);
type BidKey = (Reverse<Price>, DateTime<Utc>, u64);

/// Live (non-terminal) orders plus the trade log. Mutated only behind the
/// book's writer lock.
#[derive(Debug, Default)]
struct LiveBook {
    asks: BTreeMap<AskKey, Order>,
    bids: BTreeMap<BidKey, Order>,
    locations: HashMap<OrderId, OrderLocation>,
    trades: Vec<Trade>,
}

impl LiveBook {
    fn location_of(order: &Order) -> OrderLocation {
        OrderLocation {
            side: order.side,
            price: order.price,
            valid_from: order.valid_from,
            sequence: order.sequence,
        }
    }

    fn insert(&mut self, order: Order) {
        let location = Self::location_of(&order);
        self.locations.insert(order.id, location);
        match order.side {
            Side::Ask => {
                self.asks
                    .insert((order.price, order.valid_from, order.sequence), order);
            }
            Side::Bid => {
                self.bids.insert(
                    (Reverse(order.price), order.valid_from, order.sequence),
                    order,
                );
            }
        }
    }

    fn order_at(&self, location: &OrderLocation) -> Option<&Order> {
        match location.side {
            Side::Ask => self
                .asks
                .get(&(location.price, location.valid_from, location.sequence)),
            Side::Bid => self.bids.get(&(
                Reverse(location.price),
                location.valid_from,
                location.sequence,
            )),
        }
    }

    fn order_at_mut(&mut self, location: &OrderLocation) -> Option<&mut Order> {
        match location.side {
            Side::Ask => self
                .asks
                .get_mut(&(location.price, location.valid_from, location.sequence)),
            Side::Bid => self.bids.get_mut(&(
                Reverse(location.price),
                location.valid_from,
                location.sequence,
            )),
        }
    }

    fn remove(&mut self, location: &OrderLocation) -> Option<Order> {
        let removed = match location.side {
            Side::Ask => self
                .asks
                .remove(&(location.price, location.valid_from, location.sequence)),
            Side::Bid => self.bids.remove(&(
                Reverse(location.price),
                location.valid_from,
                location.sequence,
            )),
        };
        if let Some(order) = &removed {
            self.locations.remove(&order.id);
        }
        removed
    }
}

/// Outcome of a submission: the order's resulting state plus the trades
/// the clearing walk produced (possibly none).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub order: Order,
    pub trades: Vec<Trade>,
}

/// Continuous-double-auction order book for certificate trading.
///
/// `submit`, `cancel` and `expire` serialize on a single writer lock, so a
/// clearing walk can never interleave with another mutation. Reads take the
/// shared lock and observe a consistent snapshot. Terminal orders move to a
/// concurrently readable archive.
pub struct OrderBook {
    live: RwLock<LiveBook>,
    terminal: DashMap<OrderId, Order>,

    devices: Arc<dyn DeviceTypeService>,
    locations: Arc<dyn LocationService>,

    sequence: AtomicU64,
    last_trade_price: AtomicU64,

    // Statistics
    total_trades: AtomicU64,
    total_volume: AtomicU64,
}

impl OrderBook {
    pub fn new(devices: Arc<dyn DeviceTypeService>, locations: Arc<dyn LocationService>) -> Self {
        info!("Creating certificate order book");

        Self {
            live: RwLock::new(LiveBook::default()),
            terminal: DashMap::new(),
            devices,
            locations,
            sequence: AtomicU64::new(0),
            last_trade_price: AtomicU64::new(0),
            total_trades: AtomicU64::new(0),
            total_volume: AtomicU64::new(0),
        }
    }

    /// Submit an order: validate, match against the opposite side, rest any
    /// remainder in the book.
    pub fn submit(&self, order: Order) -> ExchangeResult<SubmissionResult> {
        debug!(
            "Submitting {} order {} price={} volume={}",
            order.side, order.id, order.price, order.remaining_volume
        );

        MatchingEngine::validate_for_submission(&order)?;

        let now = Utc::now();
        let mut live = self.live.write();

        if live.locations.contains_key(&order.id) || self.terminal.contains_key(&order.id) {
            return Err(ExchangeError::InvalidOrder(
                "order id already known to the book".to_string(),
            ));
        }

        let mut order = order;
        order.sequence = self.next_sequence();

        let trades = if order.is_valid_at(now) {
            self.clear_incoming(&mut live, &mut order, now)?
        } else {
            debug!("Order {} not valid yet; resting without matching", order.id);
            Vec::new()
        };

        if order.is_terminal() {
            self.terminal.insert(order.id, order.clone());
        } else {
            live.insert(order.clone());
        }

        if !trades.is_empty() {
            info!(
                "Order {} matched: {} trade(s), {} units",
                order.id,
                trades.len(),
                trades.iter().map(|t| t.volume).sum::<Volume>()
            );
        }

        Ok(SubmissionResult { order, trades })
    }

    /// Cancel a resting order.
    ///
    /// Unknown ids fail with `OrderNotFound`; terminal orders (including a
    /// second cancel) fail with `InvalidState` and leave the book untouched.
    pub fn cancel(&self, order_id: &OrderId) -> ExchangeResult<Order> {
        debug!("Cancelling order {}", order_id);

        let mut live = self.live.write();

        let location = match live.locations.get(order_id) {
            Some(location) => *location,
            None if self.terminal.contains_key(order_id) => {
                return Err(ExchangeError::InvalidState)
            }
            None => return Err(ExchangeError::OrderNotFound),
        };

        let mut order = live.remove(&location).ok_or(ExchangeError::OrderNotFound)?;
        order.cancel()?;
        self.terminal.insert(order.id, order.clone());

        info!(
            "Order {} cancelled, {} units unfilled",
            order.id, order.remaining_volume
        );
        Ok(order)
    }

    /// Transition every live order whose expiry has elapsed to `Expired`.
    ///
    /// Driven by an external scheduler tick; `now` is the scheduler's clock.
    pub fn expire(&self, now: DateTime<Utc>) -> Vec<Order> {
        let mut live = self.live.write();

        let due: Vec<OrderLocation> = live
            .asks
            .values()
            .chain(live.bids.values())
            .filter(|order| order.is_expired_at(now))
            .map(LiveBook::location_of)
            .collect();

        let mut expired = Vec::with_capacity(due.len());
        for location in due {
            if let Some(mut order) = live.remove(&location) {
                match order.expire() {
                    Ok(()) => {
                        self.terminal.insert(order.id, order.clone());
                        expired.push(order);
                    }
                    Err(e) => {
                        // Live orders are never terminal; keep the book intact
                        warn!("Refusing to expire order {}: {}", order.id, e);
                        live.insert(order);
                    }
                }
            }
        }

        if !expired.is_empty() {
            info!("Expired {} order(s)", expired.len());
        }
        expired
    }

    /// Snapshot of resting orders, optionally restricted to one owner.
    /// Returns clones; internal state is never exposed.
    pub fn get_orders(&self, owner: Option<&str>) -> Vec<Order> {
        let live = self.live.read();
        live.asks
            .values()
            .chain(live.bids.values())
            .filter(|order| owner.map_or(true, |o| order.owner == o))
            .cloned()
            .collect()
    }

    /// Look up a single order, resting or archived
    pub fn get_order(&self, order_id: &OrderId) -> Option<Order> {
        {
            let live = self.live.read();
            if let Some(location) = live.locations.get(order_id) {
                return live.order_at(location).cloned();
            }
        }
        self.terminal.get(order_id).map(|entry| entry.value().clone())
    }

    /// All trades executed so far, in execution order
    pub fn get_trades(&self) -> Vec<Trade> {
        self.live.read().trades.clone()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.live.read().asks.keys().next().map(|key| key.0)
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.live.read().bids.keys().next().map(|key| key.0 .0)
    }

    /// Best-ask/best-bid gap. Price-crossed orders can legitimately rest
    /// when their products do not match, so a crossed book reports `None`.
    pub fn spread(&self) -> Option<Price> {
        let live = self.live.read();
        let best_ask = live.asks.keys().next().map(|key| key.0);
        let best_bid = live.bids.keys().next().map(|key| key.0 .0);
        match (best_ask, best_bid) {
            (Some(ask), Some(bid)) if ask > bid => Some(ask - bid),
            _ => None,
        }
    }

    pub fn last_trade_price(&self) -> Option<Price> {
        let price = self.last_trade_price.load(Ordering::Relaxed);
        if price == 0 {
            None
        } else {
            Some(price)
        }
    }

    /// Number of resting orders
    pub fn total_orders(&self) -> usize {
        self.live.read().locations.len()
    }

    /// Aggregated depth per price level
    pub fn snapshot(&self) -> BookSnapshot {
        let live = self.live.read();

        BookSnapshot {
            timestamp: Utc::now(),
            asks: Self::aggregate_levels(live.asks.values()),
            bids: Self::aggregate_levels(live.bids.values()),
            last_trade_price: self.last_trade_price(),
        }
    }

    pub fn get_stats(&self) -> OrderBookStats {
        let live = self.live.read();
        let best_ask = live.asks.keys().next().map(|key| key.0);
        let best_bid = live.bids.keys().next().map(|key| key.0 .0);

        OrderBookStats {
            ask_orders: live.asks.len(),
            bid_orders: live.bids.len(),
            best_ask,
            best_bid,
            last_trade_price: self.last_trade_price(),
            total_trades: self.total_trades.load(Ordering::Relaxed),
            total_volume: self.total_volume.load(Ordering::Relaxed),
        }
    }

    // Private helper methods

    /// The clearing walk.
    ///
    /// Phase 1 is pure: collect the price-compatible, currently valid
    /// candidate prefix in book priority order and evaluate product
    /// eligibility (in parallel). Any error here rejects the submit before
    /// the book has been touched. Phase 2 commits executions candidate by
    /// candidate at the resting order's price.
    fn clear_incoming(
        &self,
        live: &mut LiveBook,
        order: &mut Order,
        now: DateTime<Utc>,
    ) -> ExchangeResult<Vec<Trade>> {
        let candidates: Vec<&Order> = match order.side {
            Side::Bid => live
                .asks
                .iter()
                .take_while(|(key, _)| MatchingEngine::prices_cross(key.0, order.price))
                .map(|(_, resting)| resting)
                .filter(|resting| resting.is_valid_at(now))
                .collect(),
            Side::Ask => live
                .bids
                .iter()
                .take_while(|(key, _)| MatchingEngine::prices_cross(order.price, key.0 .0))
                .map(|(_, resting)| resting)
                .filter(|resting| resting.is_valid_at(now))
                .collect(),
        };

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let verdicts = MatchingEngine::filter_eligible(
            order,
            &candidates,
            self.devices.as_ref(),
            self.locations.as_ref(),
        )?;

        let eligible: Vec<OrderId> = candidates
            .iter()
            .zip(verdicts)
            .filter_map(|(resting, eligible)| eligible.then_some(resting.id))
            .collect();

        let mut trades = Vec::new();
        for maker_id in eligible {
            if order.remaining_volume == 0 {
                break;
            }

            let location = match live.locations.get(&maker_id) {
                Some(location) => *location,
                None => continue,
            };

            // One maker = one atomic commit unit: trade, both volumes, both
            // statuses, index removal all happen before the next candidate.
            let maker_filled = {
                let maker = match live.order_at_mut(&location) {
                    Some(maker) => maker,
                    None => continue,
                };

                let fill_volume = order.remaining_volume.min(maker.remaining_volume);
                let (ask_id, bid_id) = match order.side {
                    Side::Bid => (maker.id, order.id),
                    Side::Ask => (order.id, maker.id),
                };

                // Execution at the resting order's price: the taker pays the
                // maker's price, never the other way around
                let trade = Trade::new(ask_id, bid_id, maker.price, fill_volume);

                maker.fill(fill_volume)?;
                order.fill(fill_volume)?;

                debug!(
                    "Executed {} units at {} between ask {} and bid {}",
                    fill_volume, trade.price, trade.ask_id, trade.bid_id
                );
                trades.push(trade);
                maker.is_terminal()
            };

            if maker_filled {
                if let Some(filled_maker) = live.remove(&location) {
                    self.terminal.insert(filled_maker.id, filled_maker);
                }
            }
        }

        if !trades.is_empty() {
            let executed_volume: Volume = trades.iter().map(|t| t.volume).sum();
            self.total_trades
                .fetch_add(trades.len() as u64, Ordering::Relaxed);
            self.total_volume.fetch_add(executed_volume, Ordering::Relaxed);
            if let Some(last_trade) = trades.last() {
                self.last_trade_price
                    .store(last_trade.price, Ordering::Relaxed);
            }
            live.trades.extend(trades.iter().cloned());
        }

        Ok(trades)
    }

    fn aggregate_levels<'a>(orders: impl Iterator<Item = &'a Order>) -> Vec<PriceLevelInfo> {
        let mut levels: Vec<PriceLevelInfo> = Vec::new();
        for order in orders {
            match levels.last_mut() {
                Some(level) if level.price == order.price => {
                    level.volume += order.remaining_volume;
                    level.order_count += 1;
                }
                _ => levels.push(PriceLevelInfo {
                    price: order.price,
                    volume: order.remaining_volume,
                    order_count: 1,
                }),
            }
        }
        levels
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct OrderBookStats {
    pub ask_orders: usize,
    pub bid_orders: usize,
    pub best_ask: Option<Price>,
    pub best_bid: Option<Price>,
    pub last_trade_price: Option<Price>,
    pub total_trades: u64,
    pub total_volume: u64,
}
