//! Read entry points.
//!
//! Every query reads committed state only. Markets are not projected
//! forward to the current time; the figures are those of the last
//! committed accrual.

use alloy::primitives::{Address, U256};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::borrow_limit::{AccountValues, HealthStatus};
use crate::clock::Clock;
use crate::config::LiquidationConfig;
use crate::engine::LeverageEngine;
use crate::error::{LeverageError, Result};
use crate::interest::{self, Rates};
use crate::market::MarketState;
use crate::oracle::PriceOracle;
use crate::position::{AccountPosition, Coin};
use crate::registry::{utoken_denom, Denom, TokenDenomParams};
use crate::store::LedgerStore;

/// Aggregate view of one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketSummary {
    pub denom: Denom,
    pub symbol: String,
    pub exponent: u8,
    /// USD per display unit, absent when the oracle has no usable price
    #[serde(with = "crate::math::serde_decimal_opt")]
    pub oracle_price: Option<U256>,
    #[serde(with = "crate::math::serde_decimal")]
    pub exchange_rate: U256,
    #[serde(flatten)]
    pub rates: Rates,
    #[serde(with = "crate::math::serde_amount")]
    pub market_size: U256,
    #[serde(with = "crate::math::serde_decimal_opt")]
    pub market_size_usd: Option<U256>,
    #[serde(with = "crate::math::serde_amount")]
    pub available_borrow: U256,
    #[serde(with = "crate::math::serde_amount")]
    pub total_borrowed: U256,
    #[serde(with = "crate::math::serde_amount")]
    pub reserved: U256,
    #[serde(with = "crate::math::serde_amount")]
    pub utoken_supply: U256,
    #[serde(with = "crate::math::serde_amount")]
    pub total_collateral: U256,
    pub halted: bool,
}

/// Borrow position of one account against its collateral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccountHealth {
    #[serde(flatten)]
    pub values: AccountValues,
    pub status: HealthStatus,
}

impl<O, C, S> LeverageEngine<O, C, S>
where
    O: PriceOracle,
    C: Clock,
    S: LedgerStore,
{
    fn committed_markets(&self) -> BTreeMap<Denom, MarketState> {
        self.ledger().read(|store| {
            store
                .markets()
                .into_iter()
                .map(|market| (market.denom.clone(), market))
                .collect()
        })
    }

    fn committed_market(&self, denom: &str) -> Result<MarketState> {
        if !self.registry().is_registered(denom) {
            return Err(LeverageError::NotRegistered(denom.to_string()));
        }
        self.ledger()
            .read(|store| store.market(denom))
            .ok_or_else(|| LeverageError::NotRegistered(denom.to_string()))
    }

    /// Committed position, restricted to `denom` when given.
    fn committed_account(&self, address: &Address, denom: Option<&str>) -> Result<AccountPosition> {
        let account = self
            .ledger()
            .read(|store| store.account(address))
            .unwrap_or_default();
        match denom {
            Some(denom) => {
                if !self.registry().is_registered(denom) {
                    return Err(LeverageError::NotRegistered(denom.to_string()));
                }
                Ok(account.only(denom))
            }
            None => Ok(account),
        }
    }

    fn account_values(&self, address: &Address, denom: Option<&str>) -> Result<AccountValues> {
        let account = self.committed_account(address, denom)?;
        let markets = self.committed_markets();
        self.with_context(|ctx| ctx.calculator().evaluate(&account, &markets))
    }

    /// Parameters of every registered token.
    pub fn registered_tokens(&self) -> Vec<TokenDenomParams> {
        self.registry().snapshot().tokens().cloned().collect()
    }

    /// Liquidation policy in force.
    pub fn params(&self) -> LiquidationConfig {
        self.liquidation().config().clone()
    }

    /// Debt owed by `address`, in base tokens.
    pub fn borrowed(&self, address: Address, denom: Option<&str>) -> Result<Vec<Coin>> {
        let account = self.committed_account(&address, denom)?;
        let markets = self.committed_markets();

        let mut coins = Vec::new();
        for (denom, position) in account.borrows.iter().filter(|(_, b)| !b.is_empty()) {
            let market = markets
                .get(denom)
                .ok_or_else(|| LeverageError::NotRegistered(denom.clone()))?;
            coins.push(Coin::new(denom.clone(), market.owed(position)?));
        }
        Ok(coins)
    }

    /// USD value of the debt of `address`.
    pub fn borrowed_value(&self, address: Address, denom: Option<&str>) -> Result<U256> {
        let account = self.committed_account(&address, denom)?;
        let markets = self.committed_markets();
        self.with_context(|ctx| ctx.calculator().borrowed_value(&account, &markets))
    }

    /// Base tokens redeemable by `address` for all of its uTokens.
    pub fn supplied(&self, address: Address, denom: Option<&str>) -> Result<Vec<Coin>> {
        let account = self.committed_account(&address, denom)?;
        let markets = self.committed_markets();

        let mut coins = Vec::new();
        for (denom, supply) in account.supplies.iter().filter(|(_, s)| !s.is_empty()) {
            let market = markets
                .get(denom)
                .ok_or_else(|| LeverageError::NotRegistered(denom.clone()))?;
            coins.push(Coin::new(denom.clone(), market.utokens_to_base_down(supply.utokens)?));
        }
        Ok(coins)
    }

    /// USD value of everything `address` has supplied.
    pub fn supplied_value(&self, address: Address, denom: Option<&str>) -> Result<U256> {
        let account = self.committed_account(&address, denom)?;
        let markets = self.committed_markets();
        self.with_context(|ctx| ctx.calculator().supplied_value(&account, &markets))
    }

    /// Base tokens held in reserve for `denom`.
    pub fn reserve_amount(&self, denom: &str) -> Result<U256> {
        Ok(self.committed_market(denom)?.total_reserved)
    }

    /// uTokens `address` has locked as collateral.
    pub fn collateral(&self, address: Address, denom: Option<&str>) -> Result<Vec<Coin>> {
        let account = self.committed_account(&address, denom)?;
        Ok(account
            .supplies
            .iter()
            .filter(|(_, s)| !s.collateral.is_zero())
            .map(|(denom, s)| Coin::new(utoken_denom(denom), s.collateral))
            .collect())
    }

    /// Unweighted USD value of the collateral of `address`.
    pub fn collateral_value(&self, address: Address, denom: Option<&str>) -> Result<U256> {
        Ok(self.account_values(&address, denom)?.collateral_value)
    }

    pub fn exchange_rate(&self, denom: &str) -> Result<U256> {
        Ok(self.committed_market(denom)?.exchange_rate)
    }

    /// Base tokens that may currently be borrowed from `denom`.
    pub fn available_borrow(&self, denom: &str) -> Result<U256> {
        Ok(self.committed_market(denom)?.available_liquidity())
    }

    fn rates(&self, denom: &str) -> Result<Rates> {
        let market = self.committed_market(denom)?;
        let params = self.registry().get(denom)?;
        interest::rates(&market, &params)
    }

    pub fn supply_apy(&self, denom: &str) -> Result<U256> {
        Ok(self.rates(denom)?.supply_apy)
    }

    pub fn borrow_apy(&self, denom: &str) -> Result<U256> {
        Ok(self.rates(denom)?.borrow_apy)
    }

    /// USD value of all base tokens backing `denom`'s uTokens.
    pub fn market_size(&self, denom: &str) -> Result<U256> {
        let size = self.token_market_size(denom)?;
        self.with_context(|ctx| ctx.calculator().token_value_down(denom, size))
    }

    /// Base tokens backing `denom`'s uTokens.
    pub fn token_market_size(&self, denom: &str) -> Result<U256> {
        self.committed_market(denom)?.total_supplied()
    }

    /// Collateral value of `address` weighted by collateral weights.
    pub fn borrow_limit(&self, address: Address) -> Result<U256> {
        Ok(self.account_values(&address, None)?.limit)
    }

    /// Collateral value of `address` weighted by liquidation thresholds.
    pub fn liquidation_threshold(&self, address: Address) -> Result<U256> {
        Ok(self.account_values(&address, None)?.threshold)
    }

    /// Accounts currently eligible for liquidation.
    pub fn liquidation_targets(&self) -> Vec<Address> {
        self.with_context(|ctx| self.liquidation().targets(self.ledger(), ctx))
    }

    pub fn market_summary(&self, denom: &str) -> Result<MarketSummary> {
        let market = self.committed_market(denom)?;
        let params = self.registry().get(denom)?;
        let rates = interest::rates(&market, &params)?;
        let market_size = market.total_supplied()?;

        // Price problems leave the USD fields empty rather than failing
        let (oracle_price, market_size_usd) = self.with_context(|ctx| {
            let calculator = ctx.calculator();
            let price = calculator.price(denom).ok();
            let size = price.and_then(|_| calculator.token_value_down(denom, market_size).ok());
            (price, size)
        });

        Ok(MarketSummary {
            denom: market.denom.clone(),
            symbol: params.symbol,
            exponent: params.exponent,
            oracle_price,
            exchange_rate: market.exchange_rate,
            rates,
            market_size,
            market_size_usd,
            available_borrow: market.available_liquidity(),
            total_borrowed: market.total_borrowed,
            reserved: market.total_reserved,
            utoken_supply: market.utoken_supply,
            total_collateral: market.total_collateral,
            halted: market.halted,
        })
    }

    /// uTokens of `denom` locked as collateral across all accounts.
    pub fn total_collateral(&self, denom: &str) -> Result<U256> {
        Ok(self.committed_market(denom)?.total_collateral)
    }

    /// Base tokens of `denom` owed across all accounts.
    pub fn total_borrowed(&self, denom: &str) -> Result<U256> {
        Ok(self.committed_market(denom)?.total_borrowed)
    }

    pub fn health(&self, address: Address) -> Result<AccountHealth> {
        let values = self.account_values(&address, None)?;
        Ok(AccountHealth {
            values,
            status: values.status(),
        })
    }
}
