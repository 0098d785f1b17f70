//! Token parameter files.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::registry::TokenDenomParams;

/// Token parameter file structure (`[[tokens]]` tables).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokensConfig {
    pub tokens: Vec<TokenDenomParams>,
}

impl TokensConfig {
    /// Load and validate a token file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read token file {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Invalid token file {:?}", path))
    }

    /// Parse and validate TOML text.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every entry and reject duplicate denominations.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = BTreeSet::new();
        for token in &self.tokens {
            token.validate()?;
            if !seen.insert(token.base_denom.as_str()) {
                anyhow::bail!("Duplicate token entry for {}", token.base_denom);
            }
        }
        Ok(())
    }

    /// Find a token by denomination.
    pub fn get(&self, denom: &str) -> Option<&TokenDenomParams> {
        self.tokens.iter().find(|t| t.base_denom == denom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKENS: &str = r#"
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

        [[tokens]]
        base_denom = "uatom"
        symbol = "ATOM"
        exponent = 6
        collateral_weight = "0.7"
        liquidation_threshold = "0.75"
        reserve_factor = "0.1"
        base_rate = "0.03"
        kink_utilization = "0.75"
        slope_low = "0.15"
        slope_high = "2"
        liquidation_incentive = "0.05"
        max_supply = "1000000000000"
    "#;

    #[test]
    fn test_parse_tokens() {
        let config = TokensConfig::parse(TOKENS).unwrap();
        assert_eq!(config.tokens.len(), 2);
        assert_eq!(config.get("uatom").unwrap().symbol, "ATOM");
        assert!(config.get("uosmo").is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let doubled = format!("{TOKENS}{}", &TOKENS[TOKENS.find("[[tokens]]").unwrap()..]);
        assert!(TokensConfig::parse(&doubled).is_err());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let bad = TOKENS.replace("collateral_weight = \"0.25\"", "collateral_weight = \"0.5\"");
        assert!(TokensConfig::parse(&bad).is_err());
    }
}
