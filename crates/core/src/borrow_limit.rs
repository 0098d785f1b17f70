//! Collateral valuation and borrow limits.
//!
//! For every denomination an account holds as collateral:
//!
//! ```text
//! value     = collateral_utokens * exchange_rate * price / 10^exponent
//! limit     = sum(value * collateral_weight)
//! threshold = sum(value * liquidation_threshold)
//! ```
//!
//! Collateral values round down and debt values round up. A missing or
//! stale price for any denomination the account holds makes the whole
//! account unpriceable.

use alloy::primitives::U256;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{LeverageError, Result};
use crate::market::MarketState;
use crate::math;
use crate::oracle::{OracleError, PriceOracle};
use crate::position::AccountPosition;
use crate::registry::{Denom, RegistrySnapshot};

/// Read access to market state by denomination.
pub trait MarketLookup {
    fn market_state(&self, denom: &str) -> Result<&MarketState>;
}

impl MarketLookup for BTreeMap<Denom, MarketState> {
    fn market_state(&self, denom: &str) -> Result<&MarketState> {
        self.get(denom)
            .ok_or_else(|| LeverageError::NotRegistered(denom.to_string()))
    }
}

/// Liquidation state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Borrowed value at or below the liquidation threshold
    Healthy,
    /// Borrowed value above the liquidation threshold
    Eligible,
}

/// USD valuation of one account (all WAD).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccountValues {
    #[serde(with = "crate::math::serde_decimal")]
    pub collateral_value: U256,
    #[serde(with = "crate::math::serde_decimal")]
    pub limit: U256,
    #[serde(with = "crate::math::serde_decimal")]
    pub threshold: U256,
    #[serde(with = "crate::math::serde_decimal")]
    pub borrowed_value: U256,
}

impl AccountValues {
    /// Borrowed value does not exceed the borrow limit.
    pub fn within_limit(&self) -> bool {
        self.borrowed_value <= self.limit
    }

    pub fn is_eligible(&self) -> bool {
        self.borrowed_value > self.threshold
    }

    pub fn status(&self) -> HealthStatus {
        if self.is_eligible() {
            HealthStatus::Eligible
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Values accounts against one registry snapshot and one price source.
pub struct BorrowLimitCalculator<'a, O: ?Sized> {
    registry: &'a RegistrySnapshot,
    oracle: &'a O,
    now: u64,
}

impl<'a, O: PriceOracle + ?Sized> BorrowLimitCalculator<'a, O> {
    pub fn new(registry: &'a RegistrySnapshot, oracle: &'a O, now: u64) -> Self {
        Self {
            registry,
            oracle,
            now,
        }
    }

    /// Oracle price of `denom`. A zero price counts as unavailable.
    pub fn price(&self, denom: &str) -> Result<U256> {
        let price = self
            .oracle
            .price(denom, self.now)
            .map_err(|err| LeverageError::price(denom, err))?;
        if price.is_zero() {
            return Err(LeverageError::price(denom, OracleError::ZeroPrice(denom.to_string())));
        }
        Ok(price)
    }

    /// USD value of `amount` base tokens, rounded down.
    pub fn token_value_down(&self, denom: &str, amount: U256) -> Result<U256> {
        let params = self.registry.get(denom)?;
        if amount.is_zero() {
            return Ok(U256::ZERO);
        }
        math::value_down(amount, self.price(denom)?, params.exponent)
    }

    /// USD value of `amount` base tokens, rounded up.
    pub fn token_value_up(&self, denom: &str, amount: U256) -> Result<U256> {
        let params = self.registry.get(denom)?;
        if amount.is_zero() {
            return Ok(U256::ZERO);
        }
        math::value_up(amount, self.price(denom)?, params.exponent)
    }

    /// USD value of `utokens` of `market`, rounded down.
    pub fn utoken_value(&self, market: &MarketState, utokens: U256) -> Result<U256> {
        let base = market.utokens_to_base_down(utokens)?;
        self.token_value_down(&market.denom, base)
    }

    /// Full (unweighted) collateral value.
    pub fn collateral_value(&self, account: &AccountPosition, markets: &impl MarketLookup) -> Result<U256> {
        Ok(self.evaluate(account, markets)?.collateral_value)
    }

    /// Collateral value weighted by collateral weight.
    pub fn limit_value(&self, account: &AccountPosition, markets: &impl MarketLookup) -> Result<U256> {
        Ok(self.evaluate(account, markets)?.limit)
    }

    /// Collateral value weighted by liquidation threshold.
    pub fn threshold_value(&self, account: &AccountPosition, markets: &impl MarketLookup) -> Result<U256> {
        Ok(self.evaluate(account, markets)?.threshold)
    }

    /// Value of all debt, rounded up.
    pub fn borrowed_value(&self, account: &AccountPosition, markets: &impl MarketLookup) -> Result<U256> {
        let mut total = U256::ZERO;
        for (denom, position) in account.borrows.iter().filter(|(_, b)| !b.is_empty()) {
            let owed = markets.market_state(denom)?.owed(position)?;
            total = math::add(total, self.token_value_up(denom, owed)?)?;
        }
        Ok(total)
    }

    /// Value of every uToken held, collateral included.
    pub fn supplied_value(&self, account: &AccountPosition, markets: &impl MarketLookup) -> Result<U256> {
        let mut total = U256::ZERO;
        for (denom, supply) in account.supplies.iter().filter(|(_, s)| !s.is_empty()) {
            let value = self.utoken_value(markets.market_state(denom)?, supply.utokens)?;
            total = math::add(total, value)?;
        }
        Ok(total)
    }

    /// Collateral, limit, threshold and borrowed value in one pass.
    pub fn evaluate(&self, account: &AccountPosition, markets: &impl MarketLookup) -> Result<AccountValues> {
        let mut values = AccountValues::default();

        for (denom, supply) in account.supplies.iter().filter(|(_, s)| !s.collateral.is_zero()) {
            let params = self.registry.get(denom)?;
            let value = self.utoken_value(markets.market_state(denom)?, supply.collateral)?;

            values.collateral_value = math::add(values.collateral_value, value)?;
            values.limit = math::add(values.limit, math::wad_mul_down(value, params.collateral_weight)?)?;
            values.threshold = math::add(
                values.threshold,
                math::wad_mul_down(value, params.liquidation_threshold)?,
            )?;
        }

        values.borrowed_value = self.borrowed_value(account, markets)?;
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{parse_decimal, WAD};
    use crate::oracle::{OracleError, PriceBook};
    use crate::position::BorrowPosition;
    use crate::registry::{TokenDenomParams, TokenRegistry};

    fn wad(s: &str) -> U256 {
        parse_decimal(s).unwrap()
    }

    fn setup() -> (TokenRegistry, PriceBook, BTreeMap<Denom, MarketState>) {
        let registry = TokenRegistry::new();
        registry
            .register(TokenDenomParams::new("uatom", "ATOM", 6).with_collateral(wad("0.8"), wad("0.85")))
            .unwrap();
        registry.register(TokenDenomParams::new("uusdc", "USDC", 6)).unwrap();

        let prices = PriceBook::new(60);
        prices.set_price("uatom", wad("10"), 0);
        prices.set_price("uusdc", WAD, 0);

        let mut markets = BTreeMap::new();
        let mut atom = MarketState::new("uatom", 0, 1);
        atom.exchange_rate = wad("1.5");
        markets.insert("uatom".to_string(), atom);
        markets.insert("uusdc".to_string(), MarketState::new("uusdc", 0, 1));

        (registry, prices, markets)
    }

    fn account() -> AccountPosition {
        let mut account = AccountPosition::default();
        let atom = account.supply_mut("uatom");
        atom.utokens = U256::from(200_000_000u64);
        atom.collateral = U256::from(100_000_000u64);
        *account.borrow_mut("uusdc") = BorrowPosition {
            adjusted: U256::from(1_000_000_000u64),
        };
        account
    }

    #[test]
    fn test_evaluate() {
        let (registry, prices, markets) = setup();
        let snapshot = registry.snapshot();
        let calc = BorrowLimitCalculator::new(&snapshot, &prices, 0);

        let values = calc.evaluate(&account(), &markets).unwrap();
        // 100 uATOM * 1.5 = 150 ATOM at $10
        assert_eq!(values.collateral_value, wad("1500"));
        assert_eq!(values.limit, wad("1200"));
        assert_eq!(values.threshold, wad("1275"));
        assert_eq!(values.borrowed_value, wad("1000"));
        assert!(values.within_limit());
        assert_eq!(values.status(), HealthStatus::Healthy);

        assert_eq!(calc.supplied_value(&account(), &markets).unwrap(), wad("3000"));
    }

    #[test]
    fn test_missing_price_is_a_hard_failure() {
        let (registry, prices, markets) = setup();
        prices.remove_price("uatom");
        let snapshot = registry.snapshot();
        let calc = BorrowLimitCalculator::new(&snapshot, &prices, 0);

        assert_eq!(
            calc.limit_value(&account(), &markets),
            Err(LeverageError::PriceUnavailable {
                denom: "uatom".to_string(),
                source: OracleError::NoPrice("uatom".to_string()),
            })
        );
    }

    #[test]
    fn test_stale_price_is_a_hard_failure() {
        let (registry, prices, markets) = setup();
        let snapshot = registry.snapshot();
        let calc = BorrowLimitCalculator::new(&snapshot, &prices, 61);

        assert!(matches!(
            calc.evaluate(&account(), &markets),
            Err(LeverageError::PriceUnavailable { .. })
        ));
    }

    #[test]
    fn test_zero_price_is_unavailable() {
        struct ZeroOracle;
        impl PriceOracle for ZeroOracle {
            fn price(&self, _denom: &str, _now: u64) -> std::result::Result<U256, OracleError> {
                Ok(U256::ZERO)
            }
        }

        let (registry, _, markets) = setup();
        let snapshot = registry.snapshot();
        let calc = BorrowLimitCalculator::new(&snapshot, &ZeroOracle, 0);

        assert_eq!(
            calc.collateral_value(&account(), &markets),
            Err(LeverageError::PriceUnavailable {
                denom: "uatom".to_string(),
                source: OracleError::ZeroPrice("uatom".to_string()),
            })
        );
    }

    #[test]
    fn test_eligibility_boundary() {
        let values = AccountValues {
            threshold: U256::from(10u64),
            borrowed_value: U256::from(10u64),
            ..Default::default()
        };
        assert_eq!(values.status(), HealthStatus::Healthy);

        let values = AccountValues {
            borrowed_value: U256::from(11u64),
            ..values
        };
        assert_eq!(values.status(), HealthStatus::Eligible);
    }
}
