//! Query surface of the lending engine.
//!
//! - [`QueryRequest`]: one variant per read entry point, JSON-tagged by name
//! - [`QueryResponse`]: the matching typed responses
//! - [`QueryService`]: answers requests against a [`leverage_core::LeverageEngine`]

mod request;
mod response;
mod service;

pub use request::QueryRequest;
pub use response::{
    AccountValueResponse, AmountResponse, CoinsResponse, DecimalResponse, HealthResponse,
    LiquidationTargetsResponse, ParamsResponse, QueryResponse, RegisteredTokensResponse,
};
pub use service::{QueryError, QueryService};
