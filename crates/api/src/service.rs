//! Dispatch of query requests against an engine.

use alloy::primitives::{Address, U256};
use leverage_core::{
    utoken_denom, Clock, Coin, LedgerStore, LeverageEngine, LeverageError, PriceOracle,
};
use tracing::{debug, instrument};

use crate::request::QueryRequest;
use crate::response::*;

/// Failure to answer a query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Engine(#[from] LeverageError),
}

/// Read-only front end of a [`LeverageEngine`].
pub struct QueryService<'a, O, C, S> {
    engine: &'a LeverageEngine<O, C, S>,
}

impl<'a, O, C, S> QueryService<'a, O, C, S>
where
    O: PriceOracle,
    C: Clock,
    S: LedgerStore,
{
    pub fn new(engine: &'a LeverageEngine<O, C, S>) -> Self {
        Self { engine }
    }

    /// Answer a JSON request with a JSON response.
    pub fn handle_json(&self, request: &str) -> Result<String, QueryError> {
        let request: QueryRequest = serde_json::from_str(request)?;
        let response = self.handle(&request)?;
        Ok(serde_json::to_string(&response)?)
    }

    #[instrument(skip(self), fields(query = request.name()))]
    pub fn handle(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
        let engine = self.engine;
        let response = match request {
            QueryRequest::RegisteredTokens => {
                QueryResponse::RegisteredTokens(RegisteredTokensResponse {
                    registry: engine.registered_tokens(),
                })
            }
            QueryRequest::Params => QueryResponse::Params(ParamsResponse {
                params: engine.params(),
            }),
            QueryRequest::Borrowed { address, denom } => QueryResponse::Borrowed(coins(
                *address,
                engine.borrowed(*address, denom.as_deref())?,
            )),
            QueryRequest::BorrowedValue { address, denom } => QueryResponse::BorrowedValue(
                value(*address, engine.borrowed_value(*address, denom.as_deref())?),
            ),
            QueryRequest::Supplied { address, denom } => QueryResponse::Supplied(coins(
                *address,
                engine.supplied(*address, denom.as_deref())?,
            )),
            QueryRequest::SuppliedValue { address, denom } => QueryResponse::SuppliedValue(
                value(*address, engine.supplied_value(*address, denom.as_deref())?),
            ),
            QueryRequest::Reserved { denom } => {
                QueryResponse::Reserved(amount(denom, engine.reserve_amount(denom)?))
            }
            QueryRequest::Collateral { address, denom } => QueryResponse::Collateral(coins(
                *address,
                engine.collateral(*address, denom.as_deref())?,
            )),
            QueryRequest::CollateralValue { address, denom } => QueryResponse::CollateralValue(
                value(*address, engine.collateral_value(*address, denom.as_deref())?),
            ),
            QueryRequest::ExchangeRate { denom } => {
                QueryResponse::ExchangeRate(decimal(denom, engine.exchange_rate(denom)?))
            }
            QueryRequest::AvailableBorrow { denom } => {
                QueryResponse::AvailableBorrow(amount(denom, engine.available_borrow(denom)?))
            }
            QueryRequest::SupplyApy { denom } => {
                QueryResponse::SupplyApy(decimal(denom, engine.supply_apy(denom)?))
            }
            QueryRequest::BorrowApy { denom } => {
                QueryResponse::BorrowApy(decimal(denom, engine.borrow_apy(denom)?))
            }
            QueryRequest::MarketSize { denom } => {
                QueryResponse::MarketSize(decimal(denom, engine.market_size(denom)?))
            }
            QueryRequest::TokenMarketSize { denom } => {
                QueryResponse::TokenMarketSize(amount(denom, engine.token_market_size(denom)?))
            }
            QueryRequest::BorrowLimit { address } => {
                QueryResponse::BorrowLimit(value(*address, engine.borrow_limit(*address)?))
            }
            QueryRequest::LiquidationThreshold { address } => QueryResponse::LiquidationThreshold(
                value(*address, engine.liquidation_threshold(*address)?),
            ),
            QueryRequest::LiquidationTargets => {
                QueryResponse::LiquidationTargets(LiquidationTargetsResponse {
                    targets: engine.liquidation_targets(),
                })
            }
            QueryRequest::MarketSummary { denom } => {
                QueryResponse::MarketSummary(engine.market_summary(denom)?)
            }
            QueryRequest::TotalCollateral { denom } => QueryResponse::TotalCollateral(
                amount(&utoken_denom(denom), engine.total_collateral(denom)?),
            ),
            QueryRequest::TotalBorrowed { denom } => {
                QueryResponse::TotalBorrowed(amount(denom, engine.total_borrowed(denom)?))
            }
            QueryRequest::Health { address } => QueryResponse::Health(HealthResponse {
                address: *address,
                health: engine.health(*address)?,
            }),
        };

        debug!("Query answered");
        Ok(response)
    }
}

fn coins(address: Address, coins: Vec<Coin>) -> CoinsResponse {
    CoinsResponse { address, coins }
}

fn value(address: Address, value: U256) -> AccountValueResponse {
    AccountValueResponse { address, value }
}

fn amount(denom: &str, amount: U256) -> AmountResponse {
    AmountResponse {
        amount: Coin::new(denom, amount),
    }
}

fn decimal(denom: &str, value: U256) -> DecimalResponse {
    DecimalResponse {
        denom: denom.to_string(),
        value,
    }
}
