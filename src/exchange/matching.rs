use rayon::prelude::*;
use tracing::debug;

use crate::exchange::error::{ExchangeError, ExchangeResult};
use crate::exchange::hierarchy::{DeviceTypeService, LocationService};
use crate::exchange::types::{Order, OrderStatus, Price, Side};

/// Pure matching-phase helpers.
///
/// Everything here is side-effect free: the book evaluates candidates
/// through these functions on an immutable view, then commits executions
/// pair-by-pair under its writer lock.
pub struct MatchingEngine;

impl MatchingEngine {
    /// Validate an order about to enter the book
    pub fn validate_for_submission(order: &Order) -> ExchangeResult<()> {
        if order.original_volume == 0 || order.remaining_volume == 0 {
            return Err(ExchangeError::InvalidOrder(
                "volume must be positive".to_string(),
            ));
        }

        if order.status != OrderStatus::Active || order.filled_volume != 0 {
            return Err(ExchangeError::InvalidOrder(
                "only freshly created orders can be submitted".to_string(),
            ));
        }

        if let Some(expires_at) = order.expires_at {
            // An order that would expire before becoming valid can never match
            if expires_at <= order.valid_from {
                return Err(ExchangeError::InvalidOrder(
                    "order expires before it becomes valid".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Price compatibility: a trade is possible iff the seller asks no more
    /// than the buyer offers.
    pub fn prices_cross(ask_price: Price, bid_price: Price) -> bool {
        ask_price <= bid_price
    }

    /// Product eligibility for an (incoming, resting) pair.
    ///
    /// The predicate is always oriented ask-against-bid-filter, so the
    /// verdict depends only on the two products, not on which of them
    /// arrived last.
    pub fn pair_eligible(
        incoming: &Order,
        resting: &Order,
        devices: &dyn DeviceTypeService,
        locations: &dyn LocationService,
    ) -> ExchangeResult<bool> {
        let (ask, bid) = match incoming.side {
            Side::Ask => (incoming, resting),
            Side::Bid => (resting, incoming),
        };
        ask.matches(bid, devices, locations)
    }

    /// Evaluate the eligibility predicate for every candidate, speculatively
    /// in parallel. Order-preserving; the first oracle failure aborts the
    /// whole evaluation so the submit can be rejected before any mutation.
    pub fn filter_eligible(
        incoming: &Order,
        candidates: &[&Order],
        devices: &dyn DeviceTypeService,
        locations: &dyn LocationService,
    ) -> ExchangeResult<Vec<bool>> {
        let verdicts: ExchangeResult<Vec<bool>> = candidates
            .par_iter()
            .copied()
            .map(|resting| Self::pair_eligible(incoming, resting, devices, locations))
            .collect();

        let verdicts = verdicts?;
        debug!(
            "Eligibility for order {}: {}/{} candidates eligible",
            incoming.id,
            verdicts.iter().filter(|v| **v).count(),
            candidates.len()
        );
        Ok(verdicts)
    }
}
