//! Per-denomination market accounting.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::{LeverageError, Result};
use crate::math::{self, WAD};
use crate::position::BorrowPosition;
use crate::registry::Denom;

/// Aggregate state of one market.
///
/// Borrows are tracked as adjusted amounts: a borrower owes
/// `adjusted * borrow_index`, so accrual only touches the index and the
/// market totals, never individual positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketState {
    pub denom: Denom,
    /// Base tokens held by the module, reserves included
    #[serde(with = "crate::math::serde_amount")]
    pub liquidity: U256,
    /// Outstanding debt, rounded up from the adjusted total
    #[serde(with = "crate::math::serde_amount")]
    pub total_borrowed: U256,
    /// Sum of all adjusted borrow positions
    #[serde(with = "crate::math::serde_amount")]
    pub adjusted_borrowed: U256,
    /// Base tokens retained for the protocol
    #[serde(with = "crate::math::serde_amount")]
    pub total_reserved: U256,
    /// uTokens in circulation
    #[serde(with = "crate::math::serde_amount")]
    pub utoken_supply: U256,
    /// uTokens locked as collateral
    #[serde(with = "crate::math::serde_amount")]
    pub total_collateral: U256,
    /// Base tokens per uToken (WAD)
    #[serde(with = "crate::math::serde_decimal")]
    pub exchange_rate: U256,
    /// Debt per adjusted borrow unit (WAD)
    #[serde(with = "crate::math::serde_decimal")]
    pub borrow_index: U256,
    /// Time of the last accrual
    pub last_accrual: u64,
    /// Registry version used by the last accrual
    pub params_version: u64,
    /// Set after an invariant violation or once a write-down leaves the
    /// uTokens without backing; rejects every mutation
    #[serde(default)]
    pub halted: bool,
}

impl MarketState {
    /// Empty market created when a denomination is registered.
    pub fn new(denom: impl Into<Denom>, now: u64, params_version: u64) -> Self {
        Self {
            denom: denom.into(),
            liquidity: U256::ZERO,
            total_borrowed: U256::ZERO,
            adjusted_borrowed: U256::ZERO,
            total_reserved: U256::ZERO,
            utoken_supply: U256::ZERO,
            total_collateral: U256::ZERO,
            exchange_rate: WAD,
            borrow_index: WAD,
            last_accrual: now,
            params_version,
            halted: false,
        }
    }

    fn violation(&self, detail: impl Into<String>) -> LeverageError {
        LeverageError::InvariantViolation {
            denom: self.denom.clone(),
            detail: detail.into(),
        }
    }

    /// Base tokens backing all uTokens: `liquidity + borrowed - reserved`.
    pub fn total_supplied(&self) -> Result<U256> {
        self.liquidity
            .checked_add(self.total_borrowed)
            .and_then(|v| v.checked_sub(self.total_reserved))
            .ok_or_else(|| self.violation("reserves exceed liquidity plus borrows"))
    }

    /// Cash that may leave the module through withdrawals or borrows.
    pub fn available_liquidity(&self) -> U256 {
        self.liquidity.saturating_sub(self.total_reserved)
    }

    /// Base tokens redeemable for `utokens`, rounded down.
    pub fn utokens_to_base_down(&self, utokens: U256) -> Result<U256> {
        math::wad_mul_down(utokens, self.exchange_rate)
    }

    /// uTokens worth `amount` base tokens, rounded down.
    pub fn base_to_utokens_down(&self, amount: U256) -> Result<U256> {
        math::wad_div_down(amount, self.exchange_rate)
    }

    /// Reprice uTokens against the current backing.
    ///
    /// With no uTokens outstanding the rate is left where it is, so the
    /// next supplier mints at the last known rate.
    pub fn recompute_exchange_rate(&mut self) -> Result<()> {
        if self.utoken_supply.is_zero() {
            return Ok(());
        }
        self.exchange_rate = math::wad_div_down(self.total_supplied()?, self.utoken_supply)?;
        Ok(())
    }

    /// Recompute `total_borrowed` from the adjusted total, rounded up.
    pub fn refresh_total_borrowed(&mut self) -> Result<()> {
        self.total_borrowed = math::mul_div_up(self.adjusted_borrowed, self.borrow_index, WAD)?;
        Ok(())
    }

    /// Debt owed by `position`.
    pub fn owed(&self, position: &BorrowPosition) -> Result<U256> {
        position.owed(self.borrow_index)
    }

    /// Record a new loan of `amount` against `position`.
    pub fn add_debt(&mut self, position: &mut BorrowPosition, amount: U256) -> Result<()> {
        // Rounded up: the borrower owes at least what they received
        let adjusted = math::wad_div_up(amount, self.borrow_index)?;
        position.adjusted = math::add(position.adjusted, adjusted)?;
        self.adjusted_borrowed = math::add(self.adjusted_borrowed, adjusted)?;
        self.refresh_total_borrowed()
    }

    /// Split a repayment of up to `amount` into the adjusted units it
    /// retires and the base tokens those units are worth.
    ///
    /// Covering the owed debt retires the whole position. A partial
    /// repayment retires whole units only, rounded down, and is charged
    /// their value rounded up, which never exceeds `amount`.
    pub fn repayment(&self, position: &BorrowPosition, amount: U256) -> Result<(U256, U256)> {
        let owed = self.owed(position)?;
        if amount >= owed {
            return Ok((position.adjusted, owed));
        }
        let adjusted = math::mul_div_down(amount, WAD, self.borrow_index)?;
        let applied = math::mul_div_up(adjusted, self.borrow_index, WAD)?.min(amount);
        Ok((adjusted, applied))
    }

    /// Apply a repayment of up to `amount` to `position`. Returns the base
    /// tokens actually applied.
    ///
    /// Fails with `InvalidAmount` when `amount` is worth less than one
    /// adjusted unit, so a payment is never taken without reducing debt.
    pub fn reduce_debt(&mut self, position: &mut BorrowPosition, amount: U256) -> Result<U256> {
        let (adjusted, applied) = self.repayment(position, amount)?;
        if adjusted.is_zero() {
            return Err(LeverageError::InvalidAmount(format!(
                "repayment of {amount} {} retires no debt at index {}",
                self.denom,
                math::format_decimal(self.borrow_index)
            )));
        }
        self.remove_adjusted(position, adjusted)?;
        Ok(applied)
    }

    /// Forgive all of `position`'s debt. Returns the drop in `total_borrowed`.
    pub fn write_off_debt(&mut self, position: &mut BorrowPosition) -> Result<U256> {
        let before = self.total_borrowed;
        self.remove_adjusted(position, position.adjusted)?;
        Ok(before.saturating_sub(self.total_borrowed))
    }

    fn remove_adjusted(&mut self, position: &mut BorrowPosition, adjusted: U256) -> Result<()> {
        position.adjusted = position
            .adjusted
            .checked_sub(adjusted)
            .ok_or_else(|| self.violation("repayment exceeds position"))?;
        self.adjusted_borrowed = self
            .adjusted_borrowed
            .checked_sub(adjusted)
            .ok_or_else(|| self.violation("position exceeds market borrows"))?;
        self.refresh_total_borrowed()
    }

    /// Check the accounting invariants of this market.
    pub fn check_invariants(&self) -> Result<()> {
        self.total_supplied()?;
        if self.total_collateral > self.utoken_supply {
            return Err(self.violation("collateral exceeds uToken supply"));
        }
        if self.exchange_rate.is_zero() && !self.halted {
            return Err(self.violation("exchange rate is zero"));
        }
        Ok(())
    }
}
