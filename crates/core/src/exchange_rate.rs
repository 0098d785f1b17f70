//! Interest accrual and uToken exchange-rate advancement.

use alloy::primitives::U256;
use tracing::debug;

use crate::error::{LeverageError, Result};
use crate::interest;
use crate::market::MarketState;
use crate::math::{self, SECONDS_PER_YEAR, WAD};
use crate::registry::TokenDenomParams;

/// Result of accruing one market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accrual {
    /// Market after accrual
    pub market: MarketState,
    /// Interest added to total borrowed
    pub interest: U256,
    /// Portion of `interest` credited to reserves
    pub reserved: U256,
    /// Seconds accrued
    pub elapsed: u64,
}

impl Accrual {
    pub fn exchange_rate(&self) -> U256 {
        self.market.exchange_rate
    }
}

/// Accrue `elapsed` seconds of interest on `market` at its current rate.
///
/// Interest compounds on every call. The reserve-factor share goes to
/// reserves; the rest raises the exchange rate. A zero interval, or a
/// market with nothing borrowed, leaves every figure unchanged.
pub fn accrue(market: &MarketState, params: &TokenDenomParams, elapsed: u64) -> Result<Accrual> {
    let mut next = market.clone();
    next.last_accrual = market.last_accrual.saturating_add(elapsed);

    if elapsed == 0 || market.adjusted_borrowed.is_zero() {
        return Ok(Accrual {
            market: next,
            interest: U256::ZERO,
            reserved: U256::ZERO,
            elapsed,
        });
    }

    let rates = interest::rates(market, params)?;

    // Growth is rounded up so that debt never lags the curve
    let growth = math::mul_div_up(
        rates.borrow_apy,
        U256::from(elapsed),
        U256::from(SECONDS_PER_YEAR),
    )?;
    next.borrow_index = math::wad_mul_up(market.borrow_index, math::add(WAD, growth)?)?;
    next.refresh_total_borrowed()?;

    let interest = math::sub(next.total_borrowed, market.total_borrowed)?;
    let reserved = math::wad_mul_up(interest, params.reserve_factor)?.min(interest);
    next.total_reserved = math::add(next.total_reserved, reserved)?;
    next.recompute_exchange_rate()?;

    if next.exchange_rate < market.exchange_rate {
        return Err(LeverageError::InvariantViolation {
            denom: market.denom.clone(),
            detail: format!(
                "accrual lowered exchange rate from {} to {}",
                math::format_decimal(market.exchange_rate),
                math::format_decimal(next.exchange_rate)
            ),
        });
    }

    debug!(
        denom = %market.denom,
        elapsed,
        borrow_apy = %math::format_decimal(rates.borrow_apy),
        interest = %interest,
        reserved = %reserved,
        exchange_rate = %math::format_decimal(next.exchange_rate),
        "Interest accrued"
    );

    Ok(Accrual {
        market: next,
        interest,
        reserved,
        elapsed,
    })
}
