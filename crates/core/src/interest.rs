//! Utilization-driven interest rate model.
//!
//! Borrow rate is piecewise linear in utilization:
//!
//! ```text
//! borrow = base + slope_low * min(u, kink) + slope_high * max(u - kink, 0)
//! supply = borrow * u * (1 - reserve_factor)
//! ```

use alloy::primitives::U256;
use serde::Serialize;

use crate::error::Result;
use crate::market::MarketState;
use crate::math::{self, WAD};
use crate::registry::{InterestCurve, TokenDenomParams};

/// Annualized rates of one market (all WAD).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rates {
    #[serde(with = "crate::math::serde_decimal")]
    pub utilization: U256,
    #[serde(with = "crate::math::serde_decimal")]
    pub borrow_apy: U256,
    #[serde(with = "crate::math::serde_decimal")]
    pub supply_apy: U256,
}

/// Borrowed fraction of supplied liquidity, clamped to `[0, 1]`.
pub fn utilization(market: &MarketState) -> Result<U256> {
    let supplied = market.total_supplied()?;
    if supplied.is_zero() {
        return Ok(U256::ZERO);
    }
    Ok(math::from_ratio(market.total_borrowed, supplied)?.min(WAD))
}

/// Borrow rate at `utilization`.
pub fn borrow_rate(curve: &InterestCurve, utilization: U256) -> Result<U256> {
    let below = utilization.min(curve.kink_utilization);
    let above = utilization.saturating_sub(curve.kink_utilization);

    let rate = math::add(curve.base_rate, math::wad_mul_down(curve.slope_low, below)?)?;
    math::add(rate, math::wad_mul_down(curve.slope_high, above)?)
}

/// Supply rate earned by uToken holders.
pub fn supply_rate(borrow_rate: U256, utilization: U256, reserve_factor: U256) -> Result<U256> {
    let gross = math::wad_mul_down(borrow_rate, utilization)?;
    math::wad_mul_down(gross, WAD.saturating_sub(reserve_factor))
}

/// Current borrow and supply rates of `market`.
pub fn rates(market: &MarketState, params: &TokenDenomParams) -> Result<Rates> {
    let utilization = utilization(market)?;
    let borrow_apy = borrow_rate(&params.interest, utilization)?;
    let supply_apy = supply_rate(borrow_apy, utilization, params.reserve_factor)?;

    Ok(Rates {
        utilization,
        borrow_apy,
        supply_apy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::parse_decimal;

    fn wad(s: &str) -> U256 {
        parse_decimal(s).unwrap()
    }

    fn params() -> TokenDenomParams {
        TokenDenomParams::new("uumee", "UMEE", 6)
            .with_reserve_factor(wad("0.1"))
            .with_interest(InterestCurve {
                base_rate: wad("0.02"),
                kink_utilization: wad("0.8"),
                slope_low: wad("0.2"),
                slope_high: wad("2"),
            })
    }

    fn market(liquidity: u64, borrowed: u64) -> MarketState {
        let mut market = MarketState::new("uumee", 0, 1);
        market.liquidity = U256::from(liquidity);
        market.total_borrowed = U256::from(borrowed);
        market
    }

    #[test]
    fn test_rates_below_kink() {
        let rates = rates(&market(500, 500), &params()).unwrap();
        assert_eq!(rates.utilization, wad("0.5"));
        assert_eq!(rates.borrow_apy, wad("0.12"));
        assert_eq!(rates.supply_apy, wad("0.054"));
    }

    #[test]
    fn test_rates_above_kink() {
        let rates = rates(&market(100, 900), &params()).unwrap();
        assert_eq!(rates.utilization, wad("0.9"));
        // 0.02 + 0.2 * 0.8 + 2 * 0.1
        assert_eq!(rates.borrow_apy, wad("0.38"));
    }

    #[test]
    fn test_empty_market() {
        let rates = rates(&market(0, 0), &params()).unwrap();
        assert_eq!(rates.utilization, U256::ZERO);
        assert_eq!(rates.borrow_apy, wad("0.02"));
        assert_eq!(rates.supply_apy, U256::ZERO);
    }

    #[test]
    fn test_utilization_clamped() {
        // Reserves larger than cash push borrowed above supplied
        let mut market = market(100, 900);
        market.total_reserved = U256::from(150u64);
        assert!(market.total_borrowed > market.total_supplied().unwrap());
        assert_eq!(utilization(&market).unwrap(), WAD);
    }

    #[test]
    fn test_full_reserve_factor_pays_nothing() {
        assert_eq!(supply_rate(wad("0.3"), wad("0.5"), WAD).unwrap(), U256::ZERO);
    }
}
