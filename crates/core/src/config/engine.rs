//! Engine configuration with profile support.
//!
//! Profiles (`default`, `testing`, `conservative`) bundle the liquidation
//! policy and oracle tolerance. The chosen configuration is handed to the
//! engine explicitly; nothing reads it from global state.

use alloy::primitives::U256;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::math::{self, WAD};

/// Runtime configuration of the lending engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Liquidation policy
    #[serde(default)]
    pub liquidation: LiquidationConfig,

    /// Price tolerance
    #[serde(default)]
    pub oracle: OracleConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Liquidation policy parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationConfig {
    /// Largest fraction of one debt denomination a single call may repay
    #[serde(with = "crate::math::serde_decimal", default = "default_close_factor")]
    pub close_factor: U256,

    /// Borrowed value (USD) below which a position may be closed in full
    #[serde(with = "crate::math::serde_decimal", default = "default_small_liquidation")]
    pub small_liquidation_usd: U256,

    /// Share of the liquidation bonus routed to reserves
    #[serde(with = "crate::math::serde_decimal", default = "default_reserve_share")]
    pub reserve_share: U256,

    /// Whether a borrower may be liquidated more than once at the same time
    #[serde(default = "default_allow_multiple")]
    pub allow_multiple_per_step: bool,
}

fn default_close_factor() -> U256 {
    WAD / U256::from(2u64)
}
fn default_small_liquidation() -> U256 {
    WAD * U256::from(100u64)
}
fn default_reserve_share() -> U256 {
    WAD / U256::from(10u64)
}
fn default_allow_multiple() -> bool {
    true
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            close_factor: default_close_factor(),
            small_liquidation_usd: default_small_liquidation(),
            reserve_share: default_reserve_share(),
            allow_multiple_per_step: default_allow_multiple(),
        }
    }
}

/// Oracle tolerance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Prices older than this are treated as unavailable
    #[serde(default = "default_max_price_age")]
    pub max_price_age_secs: u64,
}

fn default_max_price_age() -> u64 {
    300
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            max_price_age_secs: default_max_price_age(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            liquidation: LiquidationConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config {:?}", path))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse engine config {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Profile for tests and local replays: no staleness, every liquidation
    /// may close the full debt, no reserve cut.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            liquidation: LiquidationConfig {
                close_factor: WAD,
                small_liquidation_usd: U256::ZERO,
                reserve_share: U256::ZERO,
                allow_multiple_per_step: true,
            },
            oracle: OracleConfig {
                max_price_age_secs: u64::MAX,
            },
        }
    }

    /// Profile with small liquidation steps and a tight price window.
    pub fn conservative() -> Self {
        Self {
            profile: "conservative".to_string(),
            liquidation: LiquidationConfig {
                close_factor: WAD / U256::from(4u64),
                small_liquidation_usd: WAD * U256::from(500u64),
                reserve_share: WAD / U256::from(5u64),
                allow_multiple_per_step: false,
            },
            oracle: OracleConfig {
                max_price_age_secs: 60,
            },
        }
    }

    /// Profile by name.
    pub fn load_profile(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "default" => Some(Self::default()),
            "testing" | "test" => Some(Self::testing()),
            "conservative" => Some(Self::conservative()),
            _ => None,
        }
    }

    /// Profile from the LEVERAGE_PROFILE environment variable, or default.
    pub fn from_env() -> Self {
        let profile = std::env::var("LEVERAGE_PROFILE").unwrap_or_else(|_| "default".to_string());
        Self::load_profile(&profile).unwrap_or_default()
    }

    /// Check policy bounds.
    pub fn validate(&self) -> anyhow::Result<()> {
        let liq = &self.liquidation;
        if liq.close_factor.is_zero() || liq.close_factor > WAD {
            anyhow::bail!(
                "close_factor must be in (0, 1], got {}",
                math::format_decimal(liq.close_factor)
            );
        }
        if liq.reserve_share > WAD {
            anyhow::bail!(
                "reserve_share must be at most 1, got {}",
                math::format_decimal(liq.reserve_share)
            );
        }
        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Engine configuration loaded");
        tracing::info!(
            close_factor = %math::format_decimal(self.liquidation.close_factor),
            small_liquidation_usd = %math::format_decimal(self.liquidation.small_liquidation_usd),
            reserve_share = %math::format_decimal(self.liquidation.reserve_share),
            allow_multiple_per_step = self.liquidation.allow_multiple_per_step,
            "Liquidation policy"
        );
        tracing::info!(
            max_price_age_secs = self.oracle.max_price_age_secs,
            "Oracle tolerance"
        );
    }
}
