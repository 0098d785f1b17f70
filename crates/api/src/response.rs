//! Typed query responses.
//!
//! Amounts are written as base-10 integer strings and fixed-point values
//! as decimal strings, so JSON consumers never lose precision.

use alloy::primitives::{Address, U256};
use leverage_core::{AccountHealth, Coin, LiquidationConfig, MarketSummary, TokenDenomParams};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredTokensResponse {
    pub registry: Vec<TokenDenomParams>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamsResponse {
    pub params: LiquidationConfig,
}

/// Per-account balances (`borrowed`, `supplied`, `collateral`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoinsResponse {
    pub address: Address,
    pub coins: Vec<Coin>,
}

/// USD value of one account quantity (all `*-value`, `borrow-limit`,
/// `liquidation-threshold` queries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountValueResponse {
    pub address: Address,
    #[serde(with = "leverage_core::math::serde_decimal")]
    pub value: U256,
}

/// Token amount of one market quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmountResponse {
    pub amount: Coin,
}

/// Fixed-point figure of one market (rates, exchange rate, USD size).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecimalResponse {
    pub denom: String,
    #[serde(with = "leverage_core::math::serde_decimal")]
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiquidationTargetsResponse {
    pub targets: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub address: Address,
    #[serde(flatten)]
    pub health: AccountHealth,
}

/// Response to a [`QueryRequest`](crate::QueryRequest), tagged with the
/// same `query` name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "query", rename_all = "kebab-case")]
pub enum QueryResponse {
    RegisteredTokens(RegisteredTokensResponse),
    Params(ParamsResponse),
    Borrowed(CoinsResponse),
    BorrowedValue(AccountValueResponse),
    Supplied(CoinsResponse),
    SuppliedValue(AccountValueResponse),
    Reserved(AmountResponse),
    Collateral(CoinsResponse),
    CollateralValue(AccountValueResponse),
    ExchangeRate(DecimalResponse),
    AvailableBorrow(AmountResponse),
    SupplyApy(DecimalResponse),
    BorrowApy(DecimalResponse),
    MarketSize(DecimalResponse),
    TokenMarketSize(AmountResponse),
    BorrowLimit(AccountValueResponse),
    LiquidationThreshold(AccountValueResponse),
    LiquidationTargets(LiquidationTargetsResponse),
    MarketSummary(MarketSummary),
    TotalCollateral(AmountResponse),
    TotalBorrowed(AmountResponse),
    Health(HealthResponse),
}
