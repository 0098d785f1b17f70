//! Query requests.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// One read against the engine.
///
/// Serialized with a `query` tag in kebab case:
///
/// ```json
/// { "query": "borrowed", "address": "0x…", "denom": "uatom" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "kebab-case")]
pub enum QueryRequest {
    RegisteredTokens,
    Params,
    Borrowed {
        address: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        denom: Option<String>,
    },
    BorrowedValue {
        address: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        denom: Option<String>,
    },
    Supplied {
        address: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        denom: Option<String>,
    },
    SuppliedValue {
        address: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        denom: Option<String>,
    },
    Reserved {
        denom: String,
    },
    Collateral {
        address: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        denom: Option<String>,
    },
    CollateralValue {
        address: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        denom: Option<String>,
    },
    ExchangeRate {
        denom: String,
    },
    AvailableBorrow {
        denom: String,
    },
    SupplyApy {
        denom: String,
    },
    BorrowApy {
        denom: String,
    },
    MarketSize {
        denom: String,
    },
    TokenMarketSize {
        denom: String,
    },
    BorrowLimit {
        address: Address,
    },
    LiquidationThreshold {
        address: Address,
    },
    LiquidationTargets,
    MarketSummary {
        denom: String,
    },
    TotalCollateral {
        denom: String,
    },
    TotalBorrowed {
        denom: String,
    },
    Health {
        address: Address,
    },
}

impl QueryRequest {
    /// Request name as it appears in the `query` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisteredTokens => "registered-tokens",
            Self::Params => "params",
            Self::Borrowed { .. } => "borrowed",
            Self::BorrowedValue { .. } => "borrowed-value",
            Self::Supplied { .. } => "supplied",
            Self::SuppliedValue { .. } => "supplied-value",
            Self::Reserved { .. } => "reserved",
            Self::Collateral { .. } => "collateral",
            Self::CollateralValue { .. } => "collateral-value",
            Self::ExchangeRate { .. } => "exchange-rate",
            Self::AvailableBorrow { .. } => "available-borrow",
            Self::SupplyApy { .. } => "supply-apy",
            Self::BorrowApy { .. } => "borrow-apy",
            Self::MarketSize { .. } => "market-size",
            Self::TokenMarketSize { .. } => "token-market-size",
            Self::BorrowLimit { .. } => "borrow-limit",
            Self::LiquidationThreshold { .. } => "liquidation-threshold",
            Self::LiquidationTargets => "liquidation-targets",
            Self::MarketSummary { .. } => "market-summary",
            Self::TotalCollateral { .. } => "total-collateral",
            Self::TotalBorrowed { .. } => "total-borrowed",
            Self::Health { .. } => "health",
        }
    }
}
