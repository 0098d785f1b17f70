//! Position ledger: the only writer of markets and positions.
//!
//! Every mutation runs inside a [`Txn`], an overlay over committed state.
//! The first touch of a market accrues it to the current time, so interest
//! is settled before any principal moves. Checks run against the overlay;
//! the store sees the result only as one [`ChangeSet`] once the operation
//! has fully succeeded. A failed operation leaves the store untouched.

use alloy::primitives::{Address, U256};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{error, info, warn};

use crate::borrow_limit::{AccountValues, BorrowLimitCalculator};
use crate::error::{Action, LeverageError, Result};
use crate::exchange_rate;
use crate::market::MarketState;
use crate::math;
use crate::oracle::PriceOracle;
use crate::position::AccountPosition;
use crate::registry::{utoken_denom, Denom, RegistrySnapshot};
use crate::store::{ChangeSet, LedgerSnapshot, LedgerStore, MemoryStore};

/// Inputs shared by every operation: one registry version, one price
/// source and one point in time.
pub struct OpContext<'a, O: ?Sized> {
    pub registry: &'a RegistrySnapshot,
    pub oracle: &'a O,
    pub now: u64,
}

impl<'a, O: PriceOracle + ?Sized> OpContext<'a, O> {
    pub fn new(registry: &'a RegistrySnapshot, oracle: &'a O, now: u64) -> Self {
        Self {
            registry,
            oracle,
            now,
        }
    }

    pub fn calculator(&self) -> BorrowLimitCalculator<'a, O> {
        BorrowLimitCalculator::new(self.registry, self.oracle, self.now)
    }
}

/// Uncommitted view of the ledger for one operation.
pub struct Txn<'a, S: ?Sized> {
    store: &'a S,
    registry: &'a RegistrySnapshot,
    now: u64,
    markets: BTreeMap<Denom, MarketState>,
    committed_rates: BTreeMap<Denom, U256>,
    accounts: BTreeMap<Address, AccountPosition>,
    write_downs: BTreeSet<Denom>,
}

impl<'a, S: LedgerStore + ?Sized> Txn<'a, S> {
    fn new(store: &'a S, registry: &'a RegistrySnapshot, now: u64) -> Self {
        Self {
            store,
            registry,
            now,
            markets: BTreeMap::new(),
            committed_rates: BTreeMap::new(),
            accounts: BTreeMap::new(),
            write_downs: BTreeSet::new(),
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn registry(&self) -> &'a RegistrySnapshot {
        self.registry
    }

    fn load_market(&mut self, denom: &str) -> Result<()> {
        if self.markets.contains_key(denom) {
            return Ok(());
        }

        let params = self.registry.get(denom)?;
        let market = self
            .store
            .market(denom)
            .ok_or_else(|| LeverageError::NotRegistered(denom.to_string()))?;
        if market.halted {
            return Err(LeverageError::MarketHalted(denom.to_string()));
        }

        let elapsed = match self.now.checked_sub(market.last_accrual) {
            Some(elapsed) => elapsed,
            None => {
                warn!(
                    denom,
                    now = self.now,
                    last_accrual = market.last_accrual,
                    "Clock behind last accrual, skipping interest"
                );
                0
            }
        };

        let mut accrued = exchange_rate::accrue(&market, params, elapsed)?.market;
        accrued.params_version = self.registry.version;

        self.committed_rates.insert(denom.to_string(), market.exchange_rate);
        self.markets.insert(denom.to_string(), accrued);
        Ok(())
    }

    /// Market accrued to the transaction time.
    pub fn market(&mut self, denom: &str) -> Result<&mut MarketState> {
        self.load_market(denom)?;
        self.markets
            .get_mut(denom)
            .ok_or_else(|| LeverageError::NotRegistered(denom.to_string()))
    }

    /// Markets as this transaction sees them: accrued copies where touched,
    /// committed state elsewhere.
    pub fn market_views(&self) -> Vec<MarketState> {
        self.store
            .markets()
            .into_iter()
            .map(|committed| {
                self.markets
                    .get(&committed.denom)
                    .cloned()
                    .unwrap_or(committed)
            })
            .collect()
    }

    /// Account position, created empty on first use.
    pub fn account(&mut self, address: Address) -> &mut AccountPosition {
        let store = self.store;
        self.accounts
            .entry(address)
            .or_insert_with(|| store.account(&address).unwrap_or_default())
    }

    /// Copy of an account without marking it as written.
    pub fn account_view(&self, address: &Address) -> AccountPosition {
        self.accounts
            .get(address)
            .cloned()
            .or_else(|| self.store.account(address))
            .unwrap_or_default()
    }

    /// Accrue every market the account holds anything in.
    pub fn load_account_markets(&mut self, address: &Address) -> Result<()> {
        for denom in self.account_view(address).active_denoms() {
            self.load_market(&denom)?;
        }
        Ok(())
    }

    /// Value an account against the transaction state.
    pub fn evaluate<O: PriceOracle + ?Sized>(
        &mut self,
        calculator: &BorrowLimitCalculator<'_, O>,
        address: &Address,
    ) -> Result<AccountValues> {
        self.load_account_markets(address)?;
        let account = self.account_view(address);
        calculator.evaluate(&account, &self.markets)
    }

    /// Allow the exchange rate of `denom` to drop in this transaction.
    pub fn mark_write_down(&mut self, denom: &str) {
        self.write_downs.insert(denom.to_string());
    }

    fn finish(mut self) -> Result<ChangeSet> {
        for (denom, market) in self.markets.iter_mut() {
            market.recompute_exchange_rate()?;
            if market.exchange_rate.is_zero() && self.write_downs.contains(denom) {
                warn!(
                    denom = %denom,
                    utoken_supply = %market.utoken_supply,
                    "Write-down left uTokens without backing, halting market"
                );
                market.halted = true;
            }
            market.check_invariants()?;

            let committed = self.committed_rates.get(denom).copied().unwrap_or_default();
            if market.exchange_rate < committed {
                if !self.write_downs.contains(denom) {
                    return Err(LeverageError::InvariantViolation {
                        denom: denom.clone(),
                        detail: format!(
                            "exchange rate fell from {} to {}",
                            math::format_decimal(committed),
                            math::format_decimal(market.exchange_rate)
                        ),
                    });
                }
                warn!(
                    denom = %denom,
                    from = %math::format_decimal(committed),
                    to = %math::format_decimal(market.exchange_rate),
                    "Exchange rate written down"
                );
            }
        }

        for (address, account) in &self.accounts {
            if let Some(denom) = account.over_collateralized_denom() {
                return Err(LeverageError::InvariantViolation {
                    denom: denom.to_string(),
                    detail: format!("collateral of {address} exceeds its supply"),
                });
            }
        }

        Ok(ChangeSet {
            markets: self.markets,
            accounts: self.accounts,
        })
    }
}

/// Authoritative store of markets and positions.
#[derive(Debug, Default)]
pub struct PositionLedger<S = MemoryStore> {
    store: RwLock<S>,
}

impl<S: LedgerStore> PositionLedger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: RwLock::new(store),
        }
    }

    /// Run `f` against committed state.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.store.read())
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot::capture(&*self.store.read())
    }

    /// Replace committed state with the contents of `snapshot`.
    pub fn restore(&self, snapshot: LedgerSnapshot) {
        let mut store = self.store.write();
        info!(
            markets = snapshot.markets.len(),
            accounts = snapshot.accounts.len(),
            "Restoring ledger snapshot"
        );
        snapshot.restore_into(&mut *store);
    }

    /// Create an empty market for a newly registered denomination.
    /// Returns false if the market already exists.
    pub fn open_market(&self, denom: &str, now: u64, params_version: u64) -> bool {
        let mut store = self.store.write();
        if store.market(denom).is_some() {
            return false;
        }
        let mut changes = ChangeSet::default();
        changes
            .markets
            .insert(denom.to_string(), MarketState::new(denom, now, params_version));
        store.apply(changes);
        true
    }

    /// Run one operation atomically.
    ///
    /// Either every write of `f` is committed or none is. An invariant
    /// violation additionally halts the offending market.
    pub fn transact<T>(
        &self,
        registry: &RegistrySnapshot,
        now: u64,
        f: impl FnOnce(&mut Txn<'_, S>) -> Result<T>,
    ) -> Result<T> {
        let mut store = self.store.write();

        let result = {
            let mut txn = Txn::new(&*store, registry, now);
            f(&mut txn).and_then(|value| Ok((value, txn.finish()?)))
        };

        match result {
            Ok((value, changes)) => {
                store.apply(changes);
                Ok(value)
            }
            Err(err) => {
                if let Some(denom) = err.halted_denom() {
                    Self::halt(&mut *store, denom, &err);
                }
                Err(err)
            }
        }
    }

    fn halt(store: &mut S, denom: &str, cause: &LeverageError) {
        let Some(mut market) = store.market(denom) else {
            return;
        };
        error!(denom, error = %cause, "Halting market");
        market.halted = true;
        let mut changes = ChangeSet::default();
        changes.markets.insert(denom.to_string(), market);
        store.apply(changes);
    }

    /// Deposit `amount` base tokens. Returns the uTokens minted.
    pub fn supply<O: PriceOracle + ?Sized>(
        &self,
        ctx: &OpContext<'_, O>,
        account: Address,
        denom: &str,
        amount: U256,
    ) -> Result<U256> {
        ensure_positive(amount)?;
        let params = ctx.registry.get(denom)?;
        if !params.enable_supply {
            return Err(LeverageError::DenomDisabled {
                denom: denom.to_string(),
                action: Action::Supply,
            });
        }

        let minted = self.transact(ctx.registry, ctx.now, |txn| {
            let market = txn.market(denom)?;

            if !params.max_supply.is_zero() {
                let after = math::add(market.total_supplied()?, amount)?;
                if after > params.max_supply {
                    return Err(LeverageError::MaxSupplyExceeded {
                        denom: denom.to_string(),
                        requested: amount,
                        max_supply: params.max_supply,
                    });
                }
            }

            let minted = market.base_to_utokens_down(amount)?;
            if minted.is_zero() {
                return Err(LeverageError::InvalidAmount(format!(
                    "{amount}{denom} is worth less than one uToken"
                )));
            }
            market.liquidity = math::add(market.liquidity, amount)?;
            market.utoken_supply = math::add(market.utoken_supply, minted)?;

            let supply = txn.account(account).supply_mut(denom);
            supply.utokens = math::add(supply.utokens, minted)?;
            Ok(minted)
        })?;

        info!(%account, denom, %amount, %minted, "Supplied");
        Ok(minted)
    }

    /// Redeem `utokens` free uTokens. Returns the base tokens paid out.
    pub fn withdraw<O: PriceOracle + ?Sized>(
        &self,
        ctx: &OpContext<'_, O>,
        account: Address,
        denom: &str,
        utokens: U256,
    ) -> Result<U256> {
        ensure_positive(utokens)?;
        ctx.registry.get(denom)?;

        let paid = self.transact(ctx.registry, ctx.now, |txn| {
            let free = txn.account_view(&account).supply(denom).free();
            if utokens > free {
                return Err(LeverageError::InsufficientBalance {
                    denom: utoken_denom(denom),
                    requested: utokens,
                    available: free,
                });
            }

            let market = txn.market(denom)?;
            let paid = market.utokens_to_base_down(utokens)?;
            let available = market.available_liquidity();
            if paid > available {
                return Err(LeverageError::InsufficientLiquidity {
                    denom: denom.to_string(),
                    requested: paid,
                    available,
                });
            }
            market.liquidity = math::sub(market.liquidity, paid)?;
            market.utoken_supply = math::sub(market.utoken_supply, utokens)?;

            let position = txn.account(account);
            let supply = position.supply_mut(denom);
            supply.utokens = math::sub(supply.utokens, utokens)?;

            if position.has_debt() {
                ensure_within_limit(txn, ctx, &account)?;
            }
            Ok(paid)
        })?;

        info!(%account, denom, %utokens, %paid, "Withdrew");
        Ok(paid)
    }

    /// Lock free uTokens as collateral.
    pub fn collateralize<O: PriceOracle + ?Sized>(
        &self,
        ctx: &OpContext<'_, O>,
        account: Address,
        denom: &str,
        utokens: U256,
    ) -> Result<()> {
        ensure_positive(utokens)?;
        let params = ctx.registry.get(denom)?;
        if params.collateral_weight.is_zero() {
            return Err(LeverageError::DenomDisabled {
                denom: denom.to_string(),
                action: Action::Collateralize,
            });
        }

        self.transact(ctx.registry, ctx.now, |txn| {
            let market = txn.market(denom)?;
            market.total_collateral = math::add(market.total_collateral, utokens)?;

            let supply = txn.account(account).supply_mut(denom);
            if utokens > supply.free() {
                return Err(LeverageError::InsufficientBalance {
                    denom: utoken_denom(denom),
                    requested: utokens,
                    available: supply.free(),
                });
            }
            supply.collateral = math::add(supply.collateral, utokens)?;

            if params.max_collateral_share < math::WAD {
                ensure_collateral_share(txn, ctx, denom, params.max_collateral_share)?;
            }
            Ok(())
        })?;

        info!(%account, denom, %utokens, "Collateralized");
        Ok(())
    }

    /// Unlock collateral back into free uTokens.
    pub fn decollateralize<O: PriceOracle + ?Sized>(
        &self,
        ctx: &OpContext<'_, O>,
        account: Address,
        denom: &str,
        utokens: U256,
    ) -> Result<()> {
        ensure_positive(utokens)?;
        ctx.registry.get(denom)?;

        self.transact(ctx.registry, ctx.now, |txn| {
            let locked = txn.account_view(&account).supply(denom).collateral;
            if utokens > locked {
                return Err(LeverageError::InsufficientBalance {
                    denom: utoken_denom(denom),
                    requested: utokens,
                    available: locked,
                });
            }

            let market = txn.market(denom)?;
            market.total_collateral = math::sub(market.total_collateral, utokens)?;

            let position = txn.account(account);
            let supply = position.supply_mut(denom);
            supply.collateral = math::sub(supply.collateral, utokens)?;

            if position.has_debt() {
                ensure_within_limit(txn, ctx, &account)?;
            }
            Ok(())
        })?;

        info!(%account, denom, %utokens, "Decollateralized");
        Ok(())
    }

    /// Lend `amount` base tokens to `account` against its collateral.
    pub fn borrow<O: PriceOracle + ?Sized>(
        &self,
        ctx: &OpContext<'_, O>,
        account: Address,
        denom: &str,
        amount: U256,
    ) -> Result<()> {
        ensure_positive(amount)?;
        let params = ctx.registry.get(denom)?;
        if !params.enable_borrow {
            return Err(LeverageError::DenomDisabled {
                denom: denom.to_string(),
                action: Action::Borrow,
            });
        }

        self.transact(ctx.registry, ctx.now, |txn| {
            let mut position = txn.account_view(&account).borrow(denom);

            let market = txn.market(denom)?;
            let available = market.available_liquidity();
            if amount > available {
                return Err(LeverageError::InsufficientLiquidity {
                    denom: denom.to_string(),
                    requested: amount,
                    available,
                });
            }
            market.liquidity = math::sub(market.liquidity, amount)?;
            market.add_debt(&mut position, amount)?;

            *txn.account(account).borrow_mut(denom) = position;
            ensure_within_limit(txn, ctx, &account)
        })?;

        info!(%account, denom, %amount, "Borrowed");
        Ok(())
    }

    /// Repay up to `amount` of debt. Overpayment is clamped to the owed
    /// balance; returns the amount actually applied, which is what the
    /// retired debt is worth and may fall short of `amount` by rounding.
    pub fn repay<O: PriceOracle + ?Sized>(
        &self,
        ctx: &OpContext<'_, O>,
        account: Address,
        denom: &str,
        amount: U256,
    ) -> Result<U256> {
        ensure_positive(amount)?;
        ctx.registry.get(denom)?;

        let applied = self.transact(ctx.registry, ctx.now, |txn| {
            let mut position = txn.account_view(&account).borrow(denom);

            let market = txn.market(denom)?;
            if market.owed(&position)?.is_zero() {
                return Ok(U256::ZERO);
            }
            let applied = market.reduce_debt(&mut position, amount)?;
            market.liquidity = math::add(market.liquidity, applied)?;

            *txn.account(account).borrow_mut(denom) = position;
            Ok(applied)
        })?;

        info!(%account, denom, %amount, %applied, "Repaid");
        Ok(applied)
    }

    /// Move `amount` base tokens out of reserves.
    pub fn withdraw_reserves(
        &self,
        registry: &RegistrySnapshot,
        now: u64,
        denom: &str,
        amount: U256,
    ) -> Result<()> {
        ensure_positive(amount)?;

        self.transact(registry, now, |txn| {
            let market = txn.market(denom)?;
            if amount > market.total_reserved {
                return Err(LeverageError::InsufficientBalance {
                    denom: denom.to_string(),
                    requested: amount,
                    available: market.total_reserved,
                });
            }
            if amount > market.liquidity {
                return Err(LeverageError::InsufficientLiquidity {
                    denom: denom.to_string(),
                    requested: amount,
                    available: market.liquidity,
                });
            }
            market.liquidity = math::sub(market.liquidity, amount)?;
            market.total_reserved = math::sub(market.total_reserved, amount)?;
            Ok(())
        })?;

        info!(denom, %amount, "Reserves withdrawn");
        Ok(())
    }

    /// Accrue every registered market that is not halted. Returns the
    /// denominations accrued.
    pub fn accrue_all(&self, registry: &RegistrySnapshot, now: u64) -> Result<Vec<Denom>> {
        let open: Vec<Denom> = self.read(|store| {
            store
                .markets()
                .into_iter()
                .filter(|m| !m.halted && registry.is_registered(&m.denom))
                .map(|m| m.denom)
                .collect()
        });

        self.transact(registry, now, |txn| {
            for denom in &open {
                txn.market(denom)?;
            }
            Ok(())
        })?;

        Ok(open)
    }
}

fn ensure_positive(amount: U256) -> Result<()> {
    if amount.is_zero() {
        return Err(LeverageError::InvalidAmount("amount must be positive".to_string()));
    }
    Ok(())
}

/// Fail unless the account's borrowed value is within its borrow limit.
pub(crate) fn ensure_within_limit<S, O>(
    txn: &mut Txn<'_, S>,
    ctx: &OpContext<'_, O>,
    account: &Address,
) -> Result<()>
where
    S: LedgerStore + ?Sized,
    O: PriceOracle + ?Sized,
{
    let values = txn.evaluate(&ctx.calculator(), account)?;
    if !values.within_limit() {
        return Err(LeverageError::BorrowLimitExceeded {
            borrowed: values.borrowed_value,
            limit: values.limit,
        });
    }
    Ok(())
}

/// Fail if `denom` holds more than `max_share` of all collateral value.
fn ensure_collateral_share<S, O>(
    txn: &Txn<'_, S>,
    ctx: &OpContext<'_, O>,
    denom: &str,
    max_share: U256,
) -> Result<()>
where
    S: LedgerStore + ?Sized,
    O: PriceOracle + ?Sized,
{
    let calculator = ctx.calculator();
    let mut total = U256::ZERO;
    let mut token = U256::ZERO;

    for market in txn.market_views() {
        if market.total_collateral.is_zero() || !ctx.registry.is_registered(&market.denom) {
            continue;
        }
        let value = calculator.utoken_value(&market, market.total_collateral)?;
        if market.denom == denom {
            token = value;
        }
        total = math::add(total, value)?;
    }

    if token > math::wad_mul_down(total, max_share)? {
        return Err(LeverageError::MaxCollateralShare {
            denom: denom.to_string(),
        });
    }
    Ok(())
}
