//! Collateralized lending and liquidation engine.
//!
//! Suppliers deposit base tokens and receive uTokens redeemable at a
//! rising exchange rate. uTokens locked as collateral back borrows up to a
//! weighted borrow limit; accounts whose debt passes their liquidation
//! threshold can be liquidated by anyone.
//!
//! Components:
//! - [`TokenRegistry`]: versioned per-denomination risk parameters
//! - [`interest`]: utilization-driven borrow and supply rates
//! - [`exchange_rate`]: interest accrual and uToken pricing
//! - [`PositionLedger`]: the only writer of markets and positions
//! - [`BorrowLimitCalculator`]: USD valuation of accounts
//! - [`LiquidationEngine`]: eligibility, seize/repay sizing, bad debt
//!
//! [`LeverageEngine`] wires them to a [`PriceOracle`] and a [`Clock`].

mod borrow_limit;
pub mod clock;
pub mod config;
mod engine;
mod error;
pub mod exchange_rate;
pub mod interest;
mod ledger;
mod liquidation;
mod market;
pub mod math;
pub mod oracle;
mod position;
mod query;
mod registry;
mod store;

pub use borrow_limit::{AccountValues, BorrowLimitCalculator, HealthStatus, MarketLookup};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    load_deployment, load_deployment_from_env, EngineConfig, LiquidationConfig, OracleConfig,
    ResolvedDeployment, TokensConfig,
};
pub use engine::LeverageEngine;
pub use error::{Action, LeverageError, Result};
pub use interest::Rates;
pub use ledger::{OpContext, PositionLedger, Txn};
pub use liquidation::{BadDebt, LiquidationEngine, LiquidationOutcome};
pub use market::MarketState;
pub use oracle::{OracleError, PriceBook, PriceData, PriceOracle, PriceSource};
pub use position::{AccountPosition, BorrowPosition, Coin, DenomList, SupplyPosition};
pub use query::{AccountHealth, MarketSummary};
pub use registry::{
    is_valid_denom, utoken_denom, Denom, InterestCurve, RegistrySnapshot, TokenDenomParams,
    TokenRegistry, MAX_EXPONENT, UTOKEN_PREFIX,
};
pub use store::{AccountEntry, ChangeSet, LedgerSnapshot, LedgerStore, MemoryStore};
