use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeError {
    /// Malformed order: bad product, volume or expiry. The caller must fix
    /// the input; the engine never retries these.
    InvalidOrder(String),

    /// Operation referenced an order id the book does not know
    OrderNotFound,

    /// Operation on an order in a terminal state (e.g. cancel after fill)
    InvalidState,

    /// A hierarchy oracle (device type / location) failed. The affected
    /// match attempt is rejected rather than treated as a non-match.
    OracleUnavailable(String),
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeError::InvalidOrder(reason) => write!(f, "Invalid order: {}", reason),
            ExchangeError::OrderNotFound => write!(f, "Order not found"),
            ExchangeError::InvalidState => write!(f, "Order is in a terminal state"),
            ExchangeError::OracleUnavailable(reason) => {
                write!(f, "Hierarchy oracle unavailable: {}", reason)
            }
        }
    }
}

impl std::error::Error for ExchangeError {}

/// Result type for exchange operations
pub type ExchangeResult<T> = Result<T, ExchangeError>;
