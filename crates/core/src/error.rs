//! Error taxonomy for the lending engine.

use alloy::primitives::{Address, U256};

use crate::oracle::OracleError;
use crate::registry::Denom;

/// Result alias used across the engine.
pub type Result<T, E = LeverageError> = std::result::Result<T, E>;

/// Which user action a disabled-denomination failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Supply,
    Borrow,
    Collateralize,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Supply => write!(f, "supply"),
            Self::Borrow => write!(f, "borrow"),
            Self::Collateralize => write!(f, "collateralize"),
        }
    }
}

/// Every failure an engine operation can report.
///
/// All variants except [`LeverageError::InvariantViolation`] are raised
/// before anything is committed, so the ledger is unchanged when an
/// operation returns one of them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LeverageError {
    #[error("denom {0} is not registered")]
    NotRegistered(Denom),

    #[error("{action} is disabled for {denom}")]
    DenomDisabled { denom: Denom, action: Action },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("insufficient balance of {denom}: requested {requested}, available {available}")]
    InsufficientBalance {
        denom: Denom,
        requested: U256,
        available: U256,
    },

    #[error("insufficient liquidity of {denom}: requested {requested}, available {available}")]
    InsufficientLiquidity {
        denom: Denom,
        requested: U256,
        available: U256,
    },

    #[error("borrow limit exceeded: borrowed value {borrowed} exceeds limit {limit}")]
    BorrowLimitExceeded { borrowed: U256, limit: U256 },

    #[error("price unavailable for {denom}: {source}")]
    PriceUnavailable {
        denom: Denom,
        #[source]
        source: OracleError,
    },

    #[error("account {0} is not eligible for liquidation")]
    NotEligible(Address),

    #[error("account {account} holds no {denom} collateral to seize")]
    InsufficientCollateral { account: Address, denom: Denom },

    #[error("account {account} was already liquidated at {at}")]
    AlreadyLiquidated { account: Address, at: u64 },

    #[error("supplying {requested} {denom} would exceed max supply {max_supply}")]
    MaxSupplyExceeded {
        denom: Denom,
        requested: U256,
        max_supply: U256,
    },

    #[error("collateral share of {denom} would exceed its maximum")]
    MaxCollateralShare { denom: Denom },

    #[error("invalid token parameters for {denom}: {reason}")]
    InvalidParams { denom: Denom, reason: String },

    #[error("market {0} is halted")]
    MarketHalted(Denom),

    #[error("invariant violated in market {denom}: {detail}")]
    InvariantViolation { denom: Denom, detail: String },

    #[error("arithmetic overflow")]
    MathOverflow,
}

impl LeverageError {
    /// Wrap an oracle failure for `denom`.
    pub fn price(denom: &str, source: OracleError) -> Self {
        Self::PriceUnavailable {
            denom: denom.to_string(),
            source,
        }
    }

    /// Denomination to halt when this error is fatal.
    pub fn halted_denom(&self) -> Option<&str> {
        match self {
            Self::InvariantViolation { denom, .. } => Some(denom),
            _ => None,
        }
    }
}
