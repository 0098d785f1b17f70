//! Deployment loader that ties together all configuration.
//!
//! A deployment file names the engine profile, the token file, optional
//! policy overrides, genesis prices and an optional ledger snapshot:
//!
//! ```toml
//! [deployment]
//! name = "local"
//! profile = "default"
//! tokens = "local"                      # config/tokens/local.toml
//! snapshot = "${STATE_DIR}/ledger.json" # optional
//!
//! [engine.liquidation]
//! close_factor = "0.5"
//!
//! [[prices]]
//! denom = "uumee"
//! price = "0.004"
//! ```

use alloy::primitives::U256;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::info;

use super::{EngineConfig, TokensConfig};
use crate::math;
use crate::registry::{self, TokenDenomParams};

/// Deployment file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub deployment: DeploymentDetails,
    /// Engine overrides on top of the profile
    #[serde(default)]
    pub engine: Option<EngineOverrides>,
    /// Prices seeded into the price book at startup
    #[serde(default)]
    pub prices: Vec<GenesisPrice>,
}

/// Deployment metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentDetails {
    /// Deployment name (e.g., "local")
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Engine profile name
    #[serde(default)]
    pub profile: Option<String>,
    /// Token file name (without extension)
    pub tokens: String,
    /// Ledger snapshot path, relative to the config directory
    #[serde(default)]
    pub snapshot: Option<String>,
}

/// Engine configuration overrides. Decimals are strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineOverrides {
    #[serde(default)]
    pub liquidation: Option<LiquidationOverrides>,
    #[serde(default)]
    pub oracle: Option<OracleOverrides>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiquidationOverrides {
    #[serde(default)]
    pub close_factor: Option<String>,
    #[serde(default)]
    pub small_liquidation_usd: Option<String>,
    #[serde(default)]
    pub reserve_share: Option<String>,
    #[serde(default)]
    pub allow_multiple_per_step: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleOverrides {
    #[serde(default)]
    pub max_price_age_secs: Option<u64>,
}

/// Price recorded in a deployment file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisPrice {
    pub denom: String,
    /// USD per display unit
    #[serde(with = "crate::math::serde_decimal")]
    pub price: U256,
}

/// Fully resolved deployment configuration.
#[derive(Debug, Clone)]
pub struct ResolvedDeployment {
    /// Deployment name
    pub name: String,
    pub description: Option<String>,
    /// Engine configuration (with deployment overrides applied)
    pub engine: EngineConfig,
    /// Token parameters, in file order
    pub tokens: Vec<TokenDenomParams>,
    /// Genesis prices
    pub prices: Vec<GenesisPrice>,
    /// Ledger snapshot to restore
    pub snapshot: Option<PathBuf>,
}

/// Deployment loader over a config directory.
pub struct DeploymentLoader {
    config_dir: PathBuf,
}

impl DeploymentLoader {
    /// Create a new deployment loader from a config directory.
    pub fn new(config_dir: impl AsRef<Path>) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();
        if !config_dir.is_dir() {
            anyhow::bail!("Config directory {:?} does not exist", config_dir);
        }
        Ok(Self { config_dir })
    }

    /// Load a deployment by name.
    pub fn load(&self, deployment_name: &str) -> Result<ResolvedDeployment> {
        info!(deployment = deployment_name, "Loading deployment configuration");

        let path = self
            .config_dir
            .join("deployments")
            .join(format!("{}.toml", deployment_name));
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Deployment '{}' not found at {:?}", deployment_name, path))?;
        let deployment: DeploymentConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse deployment {:?}", path))?;

        let tokens_path = self
            .config_dir
            .join("tokens")
            .join(format!("{}.toml", deployment.deployment.tokens));
        let tokens = TokensConfig::from_file(&tokens_path)?;

        for price in &deployment.prices {
            if tokens.get(&price.denom).is_none() {
                anyhow::bail!("Genesis price for unknown token {}", price.denom);
            }
        }

        let engine = self.build_engine_config(&deployment)?;

        let snapshot = deployment
            .deployment
            .snapshot
            .as_deref()
            .map(|s| self.config_dir.join(expand_env(s)));

        Ok(ResolvedDeployment {
            name: deployment.deployment.name,
            description: deployment.deployment.description,
            engine,
            tokens: tokens.tokens,
            prices: deployment.prices,
            snapshot,
        })
    }

    /// Load deployment from environment variable DEPLOYMENT.
    pub fn load_from_env(&self) -> Result<ResolvedDeployment> {
        let deployment_name = std::env::var("DEPLOYMENT").unwrap_or_else(|_| "local".to_string());
        self.load(&deployment_name)
    }

    fn build_engine_config(&self, deployment: &DeploymentConfig) -> Result<EngineConfig> {
        // Start with base config from profile or environment
        let mut config = match &deployment.deployment.profile {
            Some(profile) => EngineConfig::load_profile(profile)
                .ok_or_else(|| anyhow::anyhow!("Unknown engine profile '{}'", profile))?,
            None => EngineConfig::from_env(),
        };

        let parse = |field: &str, s: &str| -> Result<U256> {
            math::parse_decimal(s).with_context(|| format!("Invalid {} override '{}'", field, s))
        };

        if let Some(ovr) = &deployment.engine {
            if let Some(liq) = &ovr.liquidation {
                if let Some(v) = &liq.close_factor {
                    config.liquidation.close_factor = parse("close_factor", v)?;
                }
                if let Some(v) = &liq.small_liquidation_usd {
                    config.liquidation.small_liquidation_usd = parse("small_liquidation_usd", v)?;
                }
                if let Some(v) = &liq.reserve_share {
                    config.liquidation.reserve_share = parse("reserve_share", v)?;
                }
                if let Some(v) = liq.allow_multiple_per_step {
                    config.liquidation.allow_multiple_per_step = v;
                }
            }
            if let Some(v) = ovr.oracle.as_ref().and_then(|o| o.max_price_age_secs) {
                config.oracle.max_price_age_secs = v;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Names of the deployment files in the config directory.
    pub fn available_deployments(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.config_dir.join("deployments")) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                if path.extension()? != "toml" {
                    return None;
                }
                path.file_stem()?.to_str().map(str::to_string)
            })
            .collect();
        names.sort();
        names
    }
}

static ENV_VAR_RE: LazyLock<regex_lite::Regex> =
    LazyLock::new(|| regex_lite::Regex::new(r"\$\{([^}]+)\}").expect("static regex"));

/// Expand ${VAR_NAME} patterns with environment variable values.
fn expand_env(s: &str) -> String {
    let mut result = s.to_string();
    for cap in ENV_VAR_RE.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }
    result
}

/// Check that a string is a usable denomination.
pub fn validate_denom(denom: &str) -> Result<()> {
    if !registry::is_valid_denom(denom) {
        anyhow::bail!("Invalid denomination '{}'", denom);
    }
    Ok(())
}

/// Load a deployment from the default config directory.
///
/// Uses CONFIG_DIR env var or defaults to "./config".
pub fn load_deployment(deployment_name: &str) -> Result<ResolvedDeployment> {
    let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "./config".to_string());
    let loader = DeploymentLoader::new(&config_dir)?;
    loader.load(deployment_name)
}

/// Load deployment from DEPLOYMENT env var.
pub fn load_deployment_from_env() -> Result<ResolvedDeployment> {
    let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "./config".to_string());
    let loader = DeploymentLoader::new(&config_dir)?;
    loader.load_from_env()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, deployment: &str) {
        std::fs::create_dir_all(dir.join("deployments")).unwrap();
        std::fs::create_dir_all(dir.join("tokens")).unwrap();
        std::fs::write(
            dir.join("tokens").join("test.toml"),
            r#"
            [[tokens]]
            base_denom = "uumee"
            symbol = "UMEE"
            exponent = 6
            collateral_weight = "0.25"
            liquidation_threshold = "0.3"
            reserve_factor = "0.1"
            base_rate = "0.02"
            kink_utilization = "0.8"
            slope_low = "0.2"
            slope_high = "1.5"
            liquidation_incentive = "0.1"
            "#,
        )
        .unwrap();
        std::fs::write(dir.join("deployments").join("test.toml"), deployment).unwrap();
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("leverage-loader-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_expand_env() {
        // Unique var name to avoid conflicts with parallel tests
        std::env::set_var("LOADER_TEST_VAR", "state");
        assert_eq!(expand_env("${LOADER_TEST_VAR}/ledger.json"), "state/ledger.json");
        assert_eq!(expand_env("no_vars"), "no_vars");
        assert_eq!(expand_env("${LOADER_MISSING_VAR}"), "${LOADER_MISSING_VAR}");
        std::env::remove_var("LOADER_TEST_VAR");
    }

    #[test]
    fn test_load_deployment_with_overrides() {
        let dir = temp_dir("overrides");
        write_config(
            &dir,
            r#"
            [deployment]
            name = "test"
            profile = "conservative"
            tokens = "test"
            snapshot = "ledger.json"

            [engine.liquidation]
            close_factor = "0.4"

            [[prices]]
            denom = "uumee"
            price = "0.004"
            "#,
        );

        let loader = DeploymentLoader::new(&dir).unwrap();
        assert_eq!(loader.available_deployments(), vec!["test".to_string()]);

        let resolved = loader.load("test").unwrap();
        assert_eq!(resolved.engine.profile, "conservative");
        assert_eq!(
            resolved.engine.liquidation.close_factor,
            math::parse_decimal("0.4").unwrap()
        );
        assert!(!resolved.engine.liquidation.allow_multiple_per_step);
        assert_eq!(resolved.tokens.len(), 1);
        assert_eq!(resolved.prices[0].price, math::parse_decimal("0.004").unwrap());
        assert_eq!(resolved.snapshot, Some(dir.join("ledger.json")));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_unknown_price_denom_rejected() {
        let dir = temp_dir("unknown-price");
        write_config(
            &dir,
            r#"
            [deployment]
            name = "test"
            profile = "default"
            tokens = "test"

            [[prices]]
            denom = "uosmo"
            price = "1"
            "#,
        );

        let loader = DeploymentLoader::new(&dir).unwrap();
        assert!(loader.load("test").is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_validate_denom() {
        assert!(validate_denom("uumee").is_ok());
        assert!(validate_denom("9lives").is_err());
    }
}
