//! Price-lookup capability consumed by the engine.
//!
//! The engine never computes prices. It asks a [`PriceOracle`] for the USD
//! price of one display unit of a denomination and treats any failure as a
//! hard `PriceUnavailable` error for the computation that needed it.
//!
//! - [`PriceOracle`]: the narrow trait the borrow-limit and liquidation
//!   code depend on
//! - [`PriceBook`]: an in-memory implementation fed by an external price
//!   collaborator, with staleness checks

mod provider;
mod types;

pub use provider::PriceBook;
pub use types::{PriceData, PriceSource};

use alloy::primitives::U256;
use std::sync::Arc;

/// Reasons a price cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("no price recorded for {0}")]
    NoPrice(String),

    #[error("price for {0} is zero")]
    ZeroPrice(String),

    #[error("price for {denom} is {age_secs}s old (max {max_age_secs}s)")]
    Stale {
        denom: String,
        age_secs: u64,
        max_age_secs: u64,
    },
}

/// Source of USD prices (WAD per display unit).
pub trait PriceOracle {
    /// Current price of `denom` as seen at time `now`.
    fn price(&self, denom: &str, now: u64) -> Result<U256, OracleError>;
}

impl<T: PriceOracle + ?Sized> PriceOracle for &T {
    fn price(&self, denom: &str, now: u64) -> Result<U256, OracleError> {
        (**self).price(denom, now)
    }
}

impl<T: PriceOracle + ?Sized> PriceOracle for Arc<T> {
    fn price(&self, denom: &str, now: u64) -> Result<U256, OracleError> {
        (**self).price(denom, now)
    }
}
