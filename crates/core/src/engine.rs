//! Lending engine facade.
//!
//! Wires the registry, ledger and liquidation policy to one price oracle
//! and one clock. Each entry point takes a registry snapshot and the
//! current time once, then runs to completion against the ledger.

use alloy::primitives::{Address, U256};
use tracing::{info, instrument, warn};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::ledger::{OpContext, PositionLedger};
use crate::liquidation::{BadDebt, LiquidationEngine, LiquidationOutcome};
use crate::oracle::PriceOracle;
use crate::registry::{Denom, TokenDenomParams, TokenRegistry};
use crate::store::{LedgerSnapshot, LedgerStore, MemoryStore};

/// Collateralized lending engine.
pub struct LeverageEngine<O, C, S = MemoryStore> {
    config: EngineConfig,
    registry: TokenRegistry,
    ledger: PositionLedger<S>,
    liquidation: LiquidationEngine,
    oracle: O,
    clock: C,
}

impl<O, C> LeverageEngine<O, C, MemoryStore>
where
    O: PriceOracle,
    C: Clock,
{
    /// Engine over an empty in-memory ledger.
    pub fn new(config: EngineConfig, oracle: O, clock: C) -> Self {
        Self::with_store(config, MemoryStore::new(), oracle, clock)
    }
}

impl<O, C, S> LeverageEngine<O, C, S>
where
    O: PriceOracle,
    C: Clock,
    S: LedgerStore,
{
    pub fn with_store(config: EngineConfig, store: S, oracle: O, clock: C) -> Self {
        let liquidation = LiquidationEngine::new(config.liquidation.clone());
        Self {
            config,
            registry: TokenRegistry::new(),
            ledger: PositionLedger::new(store),
            liquidation,
            oracle,
            clock,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &PositionLedger<S> {
        &self.ledger
    }

    pub fn liquidation(&self) -> &LiquidationEngine {
        &self.liquidation
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Run `f` with one registry snapshot, the oracle and the current time.
    pub(crate) fn with_context<T>(&self, f: impl FnOnce(&OpContext<'_, O>) -> T) -> T {
        let snapshot = self.registry.snapshot();
        let ctx = OpContext::new(&snapshot, &self.oracle, self.clock.now());
        f(&ctx)
    }

    /// Register a new denomination and open its market.
    #[instrument(skip(self, params), fields(denom = %params.base_denom))]
    pub fn register_token(&self, params: TokenDenomParams) -> Result<u64> {
        let denom = params.base_denom.clone();
        params.log_params();
        let version = self.registry.register(params)?;

        if !self.ledger.open_market(&denom, self.clock.now(), version) {
            warn!(denom = %denom, "Market already present, keeping existing state");
        }
        Ok(version)
    }

    /// Replace the parameters of a registered denomination.
    ///
    /// Interest up to now is settled under the old parameters first.
    #[instrument(skip(self, params), fields(denom = %params.base_denom))]
    pub fn update_params(&self, params: TokenDenomParams) -> Result<u64> {
        let denom = params.base_denom.clone();
        let old = self.registry.snapshot();
        old.get(&denom)?;

        let halted = self
            .ledger
            .read(|store| store.market(&denom).is_some_and(|m| m.halted));
        if !halted {
            self.ledger.transact(&old, self.clock.now(), |txn| {
                txn.market(&denom)?;
                Ok(())
            })?;
        }

        let version = self.registry.update(params)?;
        info!(denom = %denom, version, "Token parameters updated");
        Ok(version)
    }

    #[instrument(skip(self))]
    pub fn supply(&self, account: Address, denom: &str, amount: U256) -> Result<U256> {
        self.with_context(|ctx| self.ledger.supply(ctx, account, denom, amount))
    }

    #[instrument(skip(self))]
    pub fn withdraw(&self, account: Address, denom: &str, utokens: U256) -> Result<U256> {
        self.with_context(|ctx| self.ledger.withdraw(ctx, account, denom, utokens))
    }

    #[instrument(skip(self))]
    pub fn collateralize(&self, account: Address, denom: &str, utokens: U256) -> Result<()> {
        self.with_context(|ctx| self.ledger.collateralize(ctx, account, denom, utokens))
    }

    #[instrument(skip(self))]
    pub fn decollateralize(&self, account: Address, denom: &str, utokens: U256) -> Result<()> {
        self.with_context(|ctx| self.ledger.decollateralize(ctx, account, denom, utokens))
    }

    #[instrument(skip(self))]
    pub fn borrow(&self, account: Address, denom: &str, amount: U256) -> Result<()> {
        self.with_context(|ctx| self.ledger.borrow(ctx, account, denom, amount))
    }

    #[instrument(skip(self))]
    pub fn repay(&self, account: Address, denom: &str, amount: U256) -> Result<U256> {
        self.with_context(|ctx| self.ledger.repay(ctx, account, denom, amount))
    }

    #[instrument(skip(self))]
    pub fn liquidate(
        &self,
        liquidator: Address,
        borrower: Address,
        repay_denom: &str,
        max_repay: U256,
        reward_denom: &str,
    ) -> Result<LiquidationOutcome> {
        self.with_context(|ctx| {
            self.liquidation.liquidate(
                &self.ledger,
                ctx,
                liquidator,
                borrower,
                repay_denom,
                max_repay,
                reward_denom,
            )
        })
    }

    /// Accrue every open market to now.
    #[instrument(skip(self))]
    pub fn accrue_all(&self) -> Result<Vec<Denom>> {
        let snapshot = self.registry.snapshot();
        self.ledger.accrue_all(&snapshot, self.clock.now())
    }

    /// Write off debt of accounts with no collateral left.
    #[instrument(skip(self))]
    pub fn sweep_bad_debt(&self) -> Result<Vec<BadDebt>> {
        let snapshot = self.registry.snapshot();
        self.liquidation
            .sweep_bad_debt(&self.ledger, &snapshot, self.clock.now())
    }

    #[instrument(skip(self))]
    pub fn withdraw_reserves(&self, denom: &str, amount: U256) -> Result<()> {
        let snapshot = self.registry.snapshot();
        self.ledger
            .withdraw_reserves(&snapshot, self.clock.now(), denom, amount)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }

    /// Load a ledger snapshot. Markets of unregistered denominations are
    /// kept but unusable until the denomination is registered.
    pub fn restore(&self, snapshot: LedgerSnapshot) {
        for market in &snapshot.markets {
            if !self.registry.is_registered(&market.denom) {
                warn!(denom = %market.denom, "Snapshot market has no registered token");
            }
        }
        self.ledger.restore(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::LeverageError;
    use crate::math::{parse_decimal, SECONDS_PER_YEAR, WAD};
    use crate::oracle::PriceBook;
    use alloy::primitives::address;
    use std::sync::Arc;

    const ALICE: Address = address!("00000000000000000000000000000000000a11ce");
    const BOB: Address = address!("0000000000000000000000000000000000000b0b");

    fn wad(s: &str) -> U256 {
        parse_decimal(s).unwrap()
    }

    fn setup() -> (LeverageEngine<Arc<PriceBook>, Arc<ManualClock>>, Arc<PriceBook>, Arc<ManualClock>) {
        let prices = Arc::new(PriceBook::new(u64::MAX));
        let clock = Arc::new(ManualClock::new(1_000));
        let engine = LeverageEngine::new(EngineConfig::testing(), prices.clone(), clock.clone());

        engine
            .register_token(
                TokenDenomParams::new("uatom", "ATOM", 6).with_collateral(wad("0.7"), wad("0.75")),
            )
            .unwrap();
        engine
            .register_token(TokenDenomParams::new("uusdc", "USDC", 6))
            .unwrap();
        prices.set_price("uatom", wad("10"), 1_000);
        prices.set_price("uusdc", WAD, 1_000);
        (engine, prices, clock)
    }

    #[test]
    fn test_register_twice_fails() {
        let (engine, _, _) = setup();
        assert!(matches!(
            engine.register_token(TokenDenomParams::new("uatom", "ATOM", 6)),
            Err(LeverageError::InvalidParams { .. })
        ));
    }

    #[test]
    fn test_round_trip_through_facade() {
        let (engine, _, clock) = setup();
        engine.supply(BOB, "uusdc", U256::from(1_000_000_000u64)).unwrap();
        engine.supply(ALICE, "uatom", U256::from(10_000_000u64)).unwrap();
        engine.collateralize(ALICE, "uatom", U256::from(10_000_000u64)).unwrap();
        engine.borrow(ALICE, "uusdc", U256::from(50_000_000u64)).unwrap();

        clock.advance(SECONDS_PER_YEAR);
        engine.accrue_all().unwrap();

        let market = engine.ledger().read(|s| s.market("uusdc")).unwrap();
        assert!(market.total_borrowed > U256::from(50_000_000u64));
        assert!(market.exchange_rate > WAD);
        assert_eq!(market.last_accrual, 1_000 + SECONDS_PER_YEAR);
    }

    #[test]
    fn test_update_params_accrues_first() {
        let (engine, _, clock) = setup();
        engine.supply(BOB, "uusdc", U256::from(1_000_000_000u64)).unwrap();
        engine.supply(ALICE, "uatom", U256::from(10_000_000u64)).unwrap();
        engine.collateralize(ALICE, "uatom", U256::from(10_000_000u64)).unwrap();
        engine.borrow(ALICE, "uusdc", U256::from(50_000_000u64)).unwrap();
        let version_before = engine.registry().version();

        clock.advance(3_600);
        let version = engine
            .update_params(TokenDenomParams::new("uusdc", "USDC", 6).with_reserve_factor(wad("0.2")))
            .unwrap();

        assert!(version > version_before);
        let market = engine.ledger().read(|s| s.market("uusdc")).unwrap();
        assert_eq!(market.last_accrual, 4_600);
        assert_eq!(market.params_version, version_before);
    }

    #[test]
    fn test_update_unknown_denom() {
        let (engine, _, _) = setup();
        assert_eq!(
            engine.update_params(TokenDenomParams::new("uosmo", "OSMO", 6)),
            Err(LeverageError::NotRegistered("uosmo".to_string()))
        );
    }

    #[test]
    fn test_snapshot_restore() {
        let (engine, _, _) = setup();
        engine.supply(BOB, "uusdc", U256::from(5_000u64)).unwrap();
        let snapshot = engine.snapshot();

        let (other, _, _) = setup();
        other.restore(snapshot.clone());
        assert_eq!(other.snapshot(), snapshot);
    }
}
