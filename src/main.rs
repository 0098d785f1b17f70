//! Lending engine runner.
//!
//! Loads a deployment (engine profile, token parameters, genesis prices and
//! an optional ledger snapshot), accrues every market to the current time
//! and prints market summaries and liquidation targets as JSON.
//!
//! Environment:
//! - `CONFIG_DIR`: configuration directory (default `./config`)
//! - `DEPLOYMENT`: deployment name (default `local`)
//! - `RUST_LOG`: log filter

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use leverage_api::{QueryRequest, QueryResponse, QueryService};
use leverage_core::math::wad_to_f64;
use leverage_core::{
    load_deployment_from_env, Clock, LedgerSnapshot, LeverageEngine, PriceBook, PriceData,
    PriceSource, SystemClock,
};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,leverage_core=debug")),
        )
        .init();

    let deployment = load_deployment_from_env()?;
    info!(
        deployment = %deployment.name,
        description = deployment.description.as_deref().unwrap_or(""),
        "Deployment loaded"
    );
    deployment.engine.log_config();

    let clock = SystemClock;
    let now = clock.now();

    let prices = PriceBook::new(deployment.engine.oracle.max_price_age_secs);
    for genesis in &deployment.prices {
        prices.insert(
            genesis.denom.clone(),
            PriceData::new(genesis.price, now, PriceSource::Genesis),
        );
    }

    let engine = LeverageEngine::new(deployment.engine.clone(), prices, clock);
    for params in deployment.tokens.iter().cloned() {
        engine
            .register_token(params)
            .context("Failed to register token")?;
    }
    info!(tokens = deployment.tokens.len(), "Tokens registered");

    if let Some(path) = &deployment.snapshot {
        let snapshot = LedgerSnapshot::from_file(path)?;
        engine.restore(snapshot);
    }

    let accrued = engine.accrue_all()?;
    info!(markets = accrued.len(), "Markets accrued");

    let swept = engine.sweep_bad_debt()?;
    if !swept.is_empty() {
        warn!(accounts = swept.len(), "Bad debt written off at startup");
    }

    let stale = engine.oracle().stale_denoms(now);
    if !stale.is_empty() {
        warn!(denoms = ?stale, "Stale prices");
    }

    let service = QueryService::new(&engine);
    let mut summaries = Vec::new();
    for denom in &accrued {
        match service.handle(&QueryRequest::MarketSummary {
            denom: denom.clone(),
        }) {
            Ok(QueryResponse::MarketSummary(summary)) => {
                info!(
                    denom = %summary.denom,
                    utilization = wad_to_f64(summary.rates.utilization),
                    borrow_apy = wad_to_f64(summary.rates.borrow_apy),
                    supply_apy = wad_to_f64(summary.rates.supply_apy),
                    "Market"
                );
                summaries.push(summary);
            }
            Ok(_) => {}
            Err(err) => warn!(denom = %denom, error = %err, "No summary for market"),
        }
    }
    let targets = service.handle(&QueryRequest::LiquidationTargets)?;

    let report = serde_json::json!({
        "deployment": deployment.name,
        "time": now,
        "markets": summaries,
        "liquidation_targets": targets,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
