//! Per-account lending positions.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::math::{self, WAD};
use crate::registry::Denom;

/// Denominations an account touches; most accounts hold a handful.
pub type DenomList = SmallVec<[Denom; 4]>;

/// Amount of one denomination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: Denom,
    #[serde(with = "crate::math::serde_amount")]
    pub amount: U256,
}

impl Coin {
    pub fn new(denom: impl Into<Denom>, amount: U256) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

/// uTokens held in one market.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyPosition {
    /// All uTokens held, collateral included
    #[serde(with = "crate::math::serde_amount")]
    pub utokens: U256,
    /// Subset of `utokens` locked as collateral
    #[serde(with = "crate::math::serde_amount")]
    pub collateral: U256,
}

impl SupplyPosition {
    /// uTokens not locked as collateral.
    pub fn free(&self) -> U256 {
        self.utokens.saturating_sub(self.collateral)
    }

    pub fn is_empty(&self) -> bool {
        self.utokens.is_zero()
    }
}

/// Debt in one market, stored as an adjusted amount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowPosition {
    /// Owed amount divided by the borrow index at the time of borrowing
    #[serde(with = "crate::math::serde_amount")]
    pub adjusted: U256,
}

impl BorrowPosition {
    /// Debt at `borrow_index`, rounded up.
    pub fn owed(&self, borrow_index: U256) -> Result<U256> {
        math::mul_div_up(self.adjusted, borrow_index, WAD)
    }

    pub fn is_empty(&self) -> bool {
        self.adjusted.is_zero()
    }
}

/// Everything one account holds across markets.
///
/// Entries are created on first use and kept when they drop to zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPosition {
    #[serde(default)]
    pub supplies: BTreeMap<Denom, SupplyPosition>,
    #[serde(default)]
    pub borrows: BTreeMap<Denom, BorrowPosition>,
    /// Time of the most recent liquidation of this account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_liquidated: Option<u64>,
}

impl AccountPosition {
    pub fn supply(&self, denom: &str) -> SupplyPosition {
        self.supplies.get(denom).copied().unwrap_or_default()
    }

    pub fn supply_mut(&mut self, denom: &str) -> &mut SupplyPosition {
        self.supplies.entry(denom.to_string()).or_default()
    }

    pub fn borrow(&self, denom: &str) -> BorrowPosition {
        self.borrows.get(denom).copied().unwrap_or_default()
    }

    pub fn borrow_mut(&mut self, denom: &str) -> &mut BorrowPosition {
        self.borrows.entry(denom.to_string()).or_default()
    }

    /// Denominations with non-zero collateral.
    pub fn collateral_denoms(&self) -> DenomList {
        self.supplies
            .iter()
            .filter(|(_, s)| !s.collateral.is_zero())
            .map(|(denom, _)| denom.clone())
            .collect()
    }

    /// Denominations with outstanding debt.
    pub fn debt_denoms(&self) -> DenomList {
        self.borrows
            .iter()
            .filter(|(_, b)| !b.is_empty())
            .map(|(denom, _)| denom.clone())
            .collect()
    }

    /// Every denomination with a non-zero supply or borrow.
    pub fn active_denoms(&self) -> DenomList {
        let mut denoms: DenomList = self
            .supplies
            .iter()
            .filter(|(_, s)| !s.is_empty())
            .map(|(denom, _)| denom.clone())
            .collect();
        for denom in self.debt_denoms() {
            if !denoms.contains(&denom) {
                denoms.push(denom);
            }
        }
        denoms
    }

    pub fn has_debt(&self) -> bool {
        self.borrows.values().any(|b| !b.is_empty())
    }

    pub fn has_collateral(&self) -> bool {
        self.supplies.values().any(|s| !s.collateral.is_zero())
    }

    /// Copy restricted to a single denomination.
    pub fn only(&self, denom: &str) -> Self {
        Self {
            supplies: self
                .supplies
                .get_key_value(denom)
                .map(|(k, v)| (k.clone(), *v))
                .into_iter()
                .collect(),
            borrows: self
                .borrows
                .get_key_value(denom)
                .map(|(k, v)| (k.clone(), *v))
                .into_iter()
                .collect(),
            last_liquidated: self.last_liquidated,
        }
    }

    /// First denomination whose collateral exceeds its supply.
    pub fn over_collateralized_denom(&self) -> Option<&str> {
        self.supplies
            .iter()
            .find(|(_, s)| s.collateral > s.utokens)
            .map(|(denom, _)| denom.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_utokens() {
        let supply = SupplyPosition {
            utokens: U256::from(100u64),
            collateral: U256::from(30u64),
        };
        assert_eq!(supply.free(), U256::from(70u64));
    }

    #[test]
    fn test_zero_entries_are_kept() {
        let mut account = AccountPosition::default();
        account.supply_mut("uumee").utokens = U256::from(5u64);
        account.supply_mut("uumee").utokens = U256::ZERO;

        assert!(account.supplies.contains_key("uumee"));
        assert!(account.active_denoms().is_empty());
    }

    #[test]
    fn test_denom_lists() {
        let mut account = AccountPosition::default();
        let atom = account.supply_mut("uatom");
        atom.utokens = U256::from(10u64);
        atom.collateral = U256::from(10u64);
        account.supply_mut("uumee").utokens = U256::from(4u64);
        account.borrow_mut("uusdc").adjusted = U256::from(7u64);

        assert_eq!(account.collateral_denoms().as_slice(), ["uatom".to_string()]);
        assert_eq!(account.debt_denoms().as_slice(), ["uusdc".to_string()]);
        assert_eq!(account.active_denoms().len(), 3);
        assert!(account.has_debt() && account.has_collateral());

        let only = account.only("uumee");
        assert_eq!(only.supplies.len(), 1);
        assert!(only.borrows.is_empty());
    }

    #[test]
    fn test_owed_rounds_up() {
        let position = BorrowPosition {
            adjusted: U256::from(3u64),
        };
        // 3 * 1.1 = 3.3 -> 4
        let index = WAD + WAD / U256::from(10u64);
        assert_eq!(position.owed(index).unwrap(), U256::from(4u64));
    }
}
