//! Configuration system for the lending engine.
//!
//! This module provides:
//! - Engine runtime configuration (profiles, liquidation policy, oracle tolerance)
//! - Token parameter files
//! - Deployment configuration (ties everything together)

mod engine;
mod loader;
mod token;

pub use engine::{EngineConfig, LiquidationConfig, OracleConfig};

pub use token::TokensConfig;

pub use loader::{
    load_deployment, load_deployment_from_env, validate_denom, DeploymentConfig,
    DeploymentDetails, DeploymentLoader, EngineOverrides, GenesisPrice, LiquidationOverrides,
    OracleOverrides, ResolvedDeployment,
};
