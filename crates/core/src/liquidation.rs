//! Liquidation of under-collateralized accounts.
//!
//! An account is eligible once its borrowed value exceeds its liquidation
//! threshold. A liquidator repays part of one debt denomination and takes
//! the borrower's collateral in a reward denomination worth the repaid
//! value plus the reward token's liquidation incentive:
//!
//! ```text
//! repay        = min(requested, owed * close_factor)
//! seize_value  = value(repay) * (1 + incentive)
//! seize        = utokens(seize_value / reward_price)
//! reserve_cut  = (seize - seize / (1 + incentive)) * reserve_share
//! ```
//!
//! If the borrower holds less reward collateral than `seize`, everything
//! available is taken and the repayment shrinks in proportion.

use alloy::primitives::{Address, U256};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::borrow_limit::AccountValues;
use crate::config::LiquidationConfig;
use crate::error::{LeverageError, Result};
use crate::ledger::{OpContext, PositionLedger};
use crate::market::MarketState;
use crate::math::{self, WAD};
use crate::oracle::PriceOracle;
use crate::position::Coin;
use crate::registry::{utoken_denom, Denom, RegistrySnapshot};
use crate::store::LedgerStore;

/// Effects of one liquidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiquidationOutcome {
    pub borrower: Address,
    pub liquidator: Address,
    /// Base tokens repaid on the borrower's behalf
    pub repaid: Coin,
    /// uTokens taken from the borrower's collateral
    pub seized: Coin,
    /// uTokens credited to the liquidator
    pub reward: Coin,
    /// Base tokens moved into reserves
    pub reserved: Coin,
    /// Seize was capped by the borrower's collateral
    pub partial: bool,
    /// Borrower valuation after the liquidation
    pub borrower_after: AccountValues,
}

/// Debt forgiven by a bad-debt sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadDebt {
    pub account: Address,
    pub denom: Denom,
    /// Debt owed when written off
    #[serde(with = "crate::math::serde_amount")]
    pub amount: U256,
    /// Part absorbed by reserves
    #[serde(with = "crate::math::serde_amount")]
    pub covered_by_reserves: U256,
    /// Part charged to suppliers through the exchange rate
    #[serde(with = "crate::math::serde_amount")]
    pub shortfall: U256,
}

/// Prices and bonus fixed for the duration of one liquidation.
struct SeizeQuote {
    repay_price: U256,
    repay_exponent: u8,
    reward_price: U256,
    reward_exponent: u8,
    bonus_factor: U256,
}

impl SeizeQuote {
    /// Reward uTokens owed for repaying `repaid` base tokens, rounded down.
    fn seize(&self, repaid: U256, reward_market: &MarketState) -> Result<U256> {
        let repay_value = math::value_down(repaid, self.repay_price, self.repay_exponent)?;
        let seize_value = math::wad_mul_down(repay_value, self.bonus_factor)?;
        let seize_base =
            math::amount_from_value_down(seize_value, self.reward_price, self.reward_exponent)?;
        reward_market.base_to_utokens_down(seize_base)
    }
}

/// Liquidation policy over a ledger.
#[derive(Debug, Clone, Default)]
pub struct LiquidationEngine {
    config: LiquidationConfig,
}

impl LiquidationEngine {
    pub fn new(config: LiquidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LiquidationConfig {
        &self.config
    }

    /// Close factor for an account with `borrowed_value` of debt.
    ///
    /// Small positions may be closed in one call.
    pub fn close_factor(&self, borrowed_value: U256) -> U256 {
        if borrowed_value < self.config.small_liquidation_usd {
            WAD
        } else {
            self.config.close_factor
        }
    }

    /// Repay up to `max_repay` of `borrower`'s `repay_denom` debt and seize
    /// `reward_denom` collateral in exchange.
    #[allow(clippy::too_many_arguments)]
    pub fn liquidate<S, O>(
        &self,
        ledger: &PositionLedger<S>,
        ctx: &OpContext<'_, O>,
        liquidator: Address,
        borrower: Address,
        repay_denom: &str,
        max_repay: U256,
        reward_denom: &str,
    ) -> Result<LiquidationOutcome>
    where
        S: LedgerStore,
        O: PriceOracle + ?Sized,
    {
        if max_repay.is_zero() {
            return Err(LeverageError::InvalidAmount("repay amount must be positive".to_string()));
        }
        let repay_params = ctx.registry.get(repay_denom)?;
        let reward_params = ctx.registry.get(reward_denom)?;
        let calculator = ctx.calculator();

        let outcome = ledger.transact(ctx.registry, ctx.now, |txn| {
            let before = txn.evaluate(&calculator, &borrower)?;
            if !before.is_eligible() {
                return Err(LeverageError::NotEligible(borrower));
            }

            let account = txn.account_view(&borrower);
            if !self.config.allow_multiple_per_step {
                if let Some(at) = account.last_liquidated.filter(|at| *at == ctx.now) {
                    return Err(LeverageError::AlreadyLiquidated { account: borrower, at });
                }
            }

            let available = account.supply(reward_denom).collateral;
            if available.is_zero() {
                return Err(LeverageError::InsufficientCollateral {
                    account: borrower,
                    denom: reward_denom.to_string(),
                });
            }

            let mut debt = account.borrow(repay_denom);
            let owed = txn.market(repay_denom)?.owed(&debt)?;
            if owed.is_zero() {
                return Err(LeverageError::InvalidAmount(format!(
                    "{borrower} owes no {repay_denom}"
                )));
            }

            let max_close = math::wad_mul_up(owed, self.close_factor(before.borrowed_value))?.min(owed);
            let quote = SeizeQuote {
                repay_price: calculator.price(repay_denom)?,
                repay_exponent: repay_params.exponent,
                reward_price: calculator.price(reward_denom)?,
                reward_exponent: reward_params.exponent,
                bonus_factor: math::add(WAD, reward_params.liquidation_incentive)?,
            };

            // Seize is priced off the debt actually retired, not the request
            let repay_market = txn.market(repay_denom)?.clone();
            let reward_market = txn.market(reward_denom)?.clone();
            let (_, mut repay) = repay_market.repayment(&debt, max_repay.min(max_close))?;
            let mut seize = quote.seize(repay, &reward_market)?;

            let partial = seize > available;
            if partial {
                let scaled = math::mul_div_up(repay, available, seize)?.min(repay);
                repay = repay_market.repayment(&debt, scaled)?.1;
                seize = available;
            }
            if repay.is_zero() || seize.is_zero() {
                return Err(LeverageError::InvalidAmount(
                    "liquidation too small to retire debt and seize collateral".to_string(),
                ));
            }

            let bonus = math::sub(seize, math::wad_div_up(seize, quote.bonus_factor)?)?;
            let reserve_utokens = math::wad_mul_down(bonus, self.config.reserve_share)?;
            let reward = math::sub(seize, reserve_utokens)?;

            // Debt side
            let repay_market = txn.market(repay_denom)?;
            let repaid = repay_market.reduce_debt(&mut debt, repay)?;
            repay_market.liquidity = math::add(repay_market.liquidity, repaid)?;

            // Collateral side: reserve cut is burned into reserves
            let reward_market = txn.market(reward_denom)?;
            reward_market.total_collateral = math::sub(reward_market.total_collateral, seize)?;
            let reserved = reward_market.utokens_to_base_down(reserve_utokens)?;
            reward_market.utoken_supply = math::sub(reward_market.utoken_supply, reserve_utokens)?;
            reward_market.total_reserved = math::add(reward_market.total_reserved, reserved)?;

            let position = txn.account(borrower);
            *position.borrow_mut(repay_denom) = debt;
            let supply = position.supply_mut(reward_denom);
            supply.utokens = math::sub(supply.utokens, seize)?;
            supply.collateral = math::sub(supply.collateral, seize)?;
            position.last_liquidated = Some(ctx.now);

            let supply = txn.account(liquidator).supply_mut(reward_denom);
            supply.utokens = math::add(supply.utokens, reward)?;

            let borrower_after = txn.evaluate(&calculator, &borrower)?;

            Ok(LiquidationOutcome {
                borrower,
                liquidator,
                repaid: Coin::new(repay_denom, repaid),
                seized: Coin::new(utoken_denom(reward_denom), seize),
                reward: Coin::new(utoken_denom(reward_denom), reward),
                reserved: Coin::new(reward_denom, reserved),
                partial,
                borrower_after,
            })
        })?;

        info!(
            %borrower,
            %liquidator,
            repay_denom,
            repaid = %outcome.repaid.amount,
            reward_denom,
            seized = %outcome.seized.amount,
            reserved = %outcome.reserved.amount,
            partial = outcome.partial,
            "Liquidated"
        );
        Ok(outcome)
    }

    /// Accounts eligible for liquidation in committed state, ordered by
    /// address. Unpriceable accounts are skipped.
    pub fn targets<S, O>(&self, ledger: &PositionLedger<S>, ctx: &OpContext<'_, O>) -> Vec<Address>
    where
        S: LedgerStore,
        O: PriceOracle + ?Sized,
    {
        let calculator = ctx.calculator();
        ledger.read(|store| {
            let markets: std::collections::BTreeMap<Denom, _> = store
                .markets()
                .into_iter()
                .map(|m| (m.denom.clone(), m))
                .collect();

            store
                .accounts()
                .into_iter()
                .filter(|(_, position)| position.has_debt())
                .filter_map(|(address, position)| {
                    match calculator.evaluate(&position, &markets) {
                        Ok(values) => values.is_eligible().then_some(address),
                        Err(err) => {
                            debug!(account = %address, error = %err, "Skipping unpriceable account");
                            None
                        }
                    }
                })
                .collect()
        })
    }

    /// Write off debt of accounts left with no collateral.
    ///
    /// Reserves of the debt denomination absorb the loss first; any
    /// remainder lowers that market's exchange rate.
    pub fn sweep_bad_debt<S>(
        &self,
        ledger: &PositionLedger<S>,
        registry: &RegistrySnapshot,
        now: u64,
    ) -> Result<Vec<BadDebt>>
    where
        S: LedgerStore,
    {
        let candidates = self.bad_debt_candidates(ledger);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        self.write_off_bad_debt(ledger, registry, now, &candidates)
    }

    /// Accounts holding debt and no collateral in committed state, with
    /// their debt denominations in open markets.
    pub fn bad_debt_candidates<S: LedgerStore>(
        &self,
        ledger: &PositionLedger<S>,
    ) -> Vec<(Address, Vec<Denom>)> {
        ledger.read(|store| {
            store
                .accounts()
                .into_iter()
                .filter(|(_, position)| position.has_debt() && !position.has_collateral())
                .map(|(address, position)| {
                    let denoms = position
                        .debt_denoms()
                        .into_iter()
                        .filter(|d| store.market(d).is_some_and(|m| !m.halted))
                        .collect();
                    (address, denoms)
                })
                .collect()
        })
    }

    /// Write off the debt of `candidates` in one transaction.
    ///
    /// Each account is checked again against the transaction state; one
    /// that has posted collateral since it was selected keeps its debt.
    pub fn write_off_bad_debt<S>(
        &self,
        ledger: &PositionLedger<S>,
        registry: &RegistrySnapshot,
        now: u64,
        candidates: &[(Address, Vec<Denom>)],
    ) -> Result<Vec<BadDebt>>
    where
        S: LedgerStore,
    {
        ledger.transact(registry, now, |txn| {
            let mut records = Vec::new();
            for (account, denoms) in candidates {
                let position = txn.account_view(account);
                if position.has_collateral() {
                    debug!(%account, "Collateral posted since selection, keeping debt");
                    continue;
                }

                for denom in denoms {
                    let mut debt = position.borrow(denom);
                    if debt.is_empty() {
                        continue;
                    }

                    let market = match txn.market(denom) {
                        Ok(market) => market,
                        Err(LeverageError::MarketHalted(_)) => {
                            debug!(%account, denom = %denom, "Market halted, keeping debt");
                            continue;
                        }
                        Err(err) => return Err(err),
                    };
                    let owed = market.owed(&debt)?;
                    let reduction = market.write_off_debt(&mut debt)?;
                    let covered = reduction.min(market.total_reserved);
                    market.total_reserved = math::sub(market.total_reserved, covered)?;
                    let shortfall = math::sub(reduction, covered)?;

                    if !shortfall.is_zero() {
                        txn.mark_write_down(denom);
                    }
                    *txn.account(*account).borrow_mut(denom) = debt;

                    warn!(
                        %account,
                        denom = %denom,
                        amount = %owed,
                        covered = %covered,
                        shortfall = %shortfall,
                        "Bad debt written off"
                    );
                    records.push(BadDebt {
                        account: *account,
                        denom: denom.clone(),
                        amount: owed,
                        covered_by_reserves: covered,
                        shortfall,
                    });
                }
            }
            Ok(records)
        })
    }
}
