//! Token registry: governance-set risk parameters per base denomination.
//!
//! Parameters are published as immutable, versioned [`RegistrySnapshot`]s.
//! An engine operation takes one snapshot up front and uses it to the end,
//! so a concurrent parameter update is either fully visible or not at all.

use alloy::primitives::U256;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::info;

use crate::error::{LeverageError, Result};
use crate::math::{self, WAD};

/// Base token denomination, e.g. `uumee`.
pub type Denom = String;

/// Prefix of uToken denominations.
pub const UTOKEN_PREFIX: &str = "u/";

/// Largest display exponent; keeps `10^exponent * WAD` well inside `U256`.
pub const MAX_EXPONENT: u8 = 36;

static DENOM_RE: LazyLock<regex_lite::Regex> = LazyLock::new(|| {
    regex_lite::Regex::new(r"^[a-zA-Z][a-zA-Z0-9/:._-]{2,127}$").expect("static regex")
});

/// Check a denomination against the Cosmos SDK denom pattern.
pub fn is_valid_denom(denom: &str) -> bool {
    DENOM_RE.is_match(denom)
}

/// uToken denomination for a base denomination.
pub fn utoken_denom(base_denom: &str) -> Denom {
    format!("{UTOKEN_PREFIX}{base_denom}")
}

fn default_true() -> bool {
    true
}

fn default_one() -> U256 {
    WAD
}

/// Piecewise-linear borrow curve.
///
/// Below the kink the borrow rate grows by `slope_low` per unit of
/// utilization; past the kink it grows by `slope_high`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestCurve {
    /// Borrow rate at 0% utilization
    #[serde(with = "crate::math::serde_decimal")]
    pub base_rate: U256,
    /// Utilization where the second slope starts
    #[serde(with = "crate::math::serde_decimal")]
    pub kink_utilization: U256,
    /// Rate increase per unit of utilization below the kink
    #[serde(with = "crate::math::serde_decimal")]
    pub slope_low: U256,
    /// Rate increase per unit of utilization above the kink
    #[serde(with = "crate::math::serde_decimal")]
    pub slope_high: U256,
}

impl Default for InterestCurve {
    fn default() -> Self {
        // 2% base, 80% kink, +20% to the kink, +200% past it
        Self {
            base_rate: WAD / U256::from(50u64),
            kink_utilization: WAD * U256::from(4u64) / U256::from(5u64),
            slope_low: WAD / U256::from(5u64),
            slope_high: WAD * U256::from(2u64),
        }
    }
}

/// Risk parameters of one registered base denomination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDenomParams {
    /// Base denomination (e.g., "uumee")
    pub base_denom: Denom,
    /// Display symbol (e.g., "UMEE")
    pub symbol: String,
    /// Base units per display unit, as a power of ten
    pub exponent: u8,
    /// Haircut applied to collateral value for the borrow limit
    #[serde(with = "crate::math::serde_decimal")]
    pub collateral_weight: U256,
    /// Fraction of collateral value past which a borrower is liquidatable
    #[serde(with = "crate::math::serde_decimal")]
    pub liquidation_threshold: U256,
    /// Fraction of accrued interest kept as reserves
    #[serde(with = "crate::math::serde_decimal")]
    pub reserve_factor: U256,
    /// Borrow rate curve
    #[serde(flatten)]
    pub interest: InterestCurve,
    /// Bonus paid to liquidators seizing this token
    #[serde(with = "crate::math::serde_decimal")]
    pub liquidation_incentive: U256,
    /// Largest share of system-wide collateral value this token may hold
    #[serde(with = "crate::math::serde_decimal", default = "default_one")]
    pub max_collateral_share: U256,
    /// Supply cap in base units (0 = unlimited)
    #[serde(with = "crate::math::serde_amount", default)]
    pub max_supply: U256,
    #[serde(default = "default_true")]
    pub enable_supply: bool,
    #[serde(default = "default_true")]
    pub enable_borrow: bool,
}

impl TokenDenomParams {
    /// Parameters with no collateral power and the default curve.
    pub fn new(base_denom: impl Into<Denom>, symbol: impl Into<String>, exponent: u8) -> Self {
        Self {
            base_denom: base_denom.into(),
            symbol: symbol.into(),
            exponent,
            collateral_weight: U256::ZERO,
            liquidation_threshold: U256::ZERO,
            reserve_factor: WAD / U256::from(10u64),
            interest: InterestCurve::default(),
            liquidation_incentive: WAD / U256::from(20u64),
            max_collateral_share: WAD,
            max_supply: U256::ZERO,
            enable_supply: true,
            enable_borrow: true,
        }
    }

    pub fn with_collateral(mut self, collateral_weight: U256, liquidation_threshold: U256) -> Self {
        self.collateral_weight = collateral_weight;
        self.liquidation_threshold = liquidation_threshold;
        self
    }

    pub fn with_interest(mut self, interest: InterestCurve) -> Self {
        self.interest = interest;
        self
    }

    pub fn with_reserve_factor(mut self, reserve_factor: U256) -> Self {
        self.reserve_factor = reserve_factor;
        self
    }

    pub fn with_liquidation_incentive(mut self, incentive: U256) -> Self {
        self.liquidation_incentive = incentive;
        self
    }

    /// uToken denomination of this token.
    pub fn utoken_denom(&self) -> Denom {
        utoken_denom(&self.base_denom)
    }

    /// Check the parameter invariants.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: &str| {
            Err(LeverageError::InvalidParams {
                denom: self.base_denom.clone(),
                reason: reason.to_string(),
            })
        };

        if !is_valid_denom(&self.base_denom) {
            return fail("malformed denom");
        }
        if self.base_denom.starts_with(UTOKEN_PREFIX) {
            return fail("uTokens cannot be registered");
        }
        if self.exponent > MAX_EXPONENT {
            return fail("exponent exceeds 36");
        }
        if self.collateral_weight > self.liquidation_threshold {
            return fail("collateral weight exceeds liquidation threshold");
        }
        if self.liquidation_threshold > WAD {
            return fail("liquidation threshold exceeds 1");
        }
        if self.reserve_factor > WAD {
            return fail("reserve factor exceeds 1");
        }
        if self.interest.kink_utilization.is_zero() || self.interest.kink_utilization >= WAD {
            return fail("kink utilization must be strictly between 0 and 1");
        }
        if self.liquidation_incentive > WAD {
            return fail("liquidation incentive exceeds 1");
        }
        if self.max_collateral_share > WAD {
            return fail("max collateral share exceeds 1");
        }

        Ok(())
    }

    /// Log the parameters.
    pub fn log_params(&self) {
        info!(
            denom = %self.base_denom,
            symbol = %self.symbol,
            exponent = self.exponent,
            collateral_weight = %math::format_decimal(self.collateral_weight),
            liquidation_threshold = %math::format_decimal(self.liquidation_threshold),
            reserve_factor = %math::format_decimal(self.reserve_factor),
            liquidation_incentive = %math::format_decimal(self.liquidation_incentive),
            "Token parameters"
        );
    }
}

/// One published version of all token parameters.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    /// Bumped by every register or update
    pub version: u64,
    tokens: BTreeMap<Denom, TokenDenomParams>,
}

impl RegistrySnapshot {
    /// Parameters of `denom`.
    pub fn get(&self, denom: &str) -> Result<&TokenDenomParams> {
        self.tokens
            .get(denom)
            .ok_or_else(|| LeverageError::NotRegistered(denom.to_string()))
    }

    pub fn is_registered(&self, denom: &str) -> bool {
        self.tokens.contains_key(denom)
    }

    /// All registered tokens, ordered by denom.
    pub fn tokens(&self) -> impl Iterator<Item = &TokenDenomParams> {
        self.tokens.values()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Holder of the current registry snapshot.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl TokenRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot. Cheap to clone and never changes underneath.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Parameters of `denom` in the current snapshot.
    pub fn get(&self, denom: &str) -> Result<TokenDenomParams> {
        self.snapshot().get(denom).cloned()
    }

    pub fn is_registered(&self, denom: &str) -> bool {
        self.snapshot().is_registered(denom)
    }

    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// Add a new denomination. Returns the new registry version.
    pub fn register(&self, params: TokenDenomParams) -> Result<u64> {
        params.validate()?;
        let mut current = self.current.write();
        if current.is_registered(&params.base_denom) {
            return Err(LeverageError::InvalidParams {
                denom: params.base_denom,
                reason: "already registered".to_string(),
            });
        }
        Ok(Self::publish(&mut current, params))
    }

    /// Replace the parameters of a registered denomination. Returns the new
    /// registry version.
    pub fn update(&self, params: TokenDenomParams) -> Result<u64> {
        params.validate()?;
        let mut current = self.current.write();
        if !current.is_registered(&params.base_denom) {
            return Err(LeverageError::NotRegistered(params.base_denom));
        }
        Ok(Self::publish(&mut current, params))
    }

    fn publish(current: &mut Arc<RegistrySnapshot>, params: TokenDenomParams) -> u64 {
        let mut next = RegistrySnapshot::clone(current);
        next.version += 1;
        info!(denom = %params.base_denom, version = next.version, "Registry updated");
        next.tokens.insert(params.base_denom.clone(), params);
        let version = next.version;
        *current = Arc::new(next);
        version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::parse_decimal;

    fn wad(s: &str) -> U256 {
        parse_decimal(s).unwrap()
    }

    fn atom() -> TokenDenomParams {
        TokenDenomParams::new("uatom", "ATOM", 6).with_collateral(wad("0.8"), wad("0.85"))
    }

    #[test]
    fn test_register_and_get() {
        let registry = TokenRegistry::new();
        assert_eq!(registry.register(atom()).unwrap(), 1);
        assert!(registry.is_registered("uatom"));
        assert_eq!(registry.get("uatom").unwrap().symbol, "ATOM");
        assert_eq!(
            registry.get("uosmo"),
            Err(LeverageError::NotRegistered("uosmo".to_string()))
        );
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = TokenRegistry::new();
        registry.register(atom()).unwrap();
        assert!(matches!(
            registry.register(atom()),
            Err(LeverageError::InvalidParams { .. })
        ));
    }

    #[test]
    fn test_snapshot_isolated_from_updates() {
        let registry = TokenRegistry::new();
        registry.register(atom()).unwrap();
        let before = registry.snapshot();

        registry
            .update(atom().with_collateral(wad("0.5"), wad("0.6")))
            .unwrap();

        assert_eq!(before.version, 1);
        assert_eq!(before.get("uatom").unwrap().collateral_weight, wad("0.8"));
        assert_eq!(registry.version(), 2);
        assert_eq!(registry.get("uatom").unwrap().collateral_weight, wad("0.5"));
    }

    #[test]
    fn test_update_unknown_denom() {
        let registry = TokenRegistry::new();
        assert!(matches!(
            registry.update(atom()),
            Err(LeverageError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_validation() {
        let bad_weights = atom().with_collateral(wad("0.9"), wad("0.85"));
        assert!(bad_weights.validate().is_err());

        let bad_threshold = atom().with_collateral(wad("0.9"), wad("1.1"));
        assert!(bad_threshold.validate().is_err());

        let mut bad_kink = atom();
        bad_kink.interest.kink_utilization = WAD;
        assert!(bad_kink.validate().is_err());

        let bad_denom = TokenDenomParams::new("u/uatom", "uATOM", 6);
        assert!(bad_denom.validate().is_err());

        assert!(TokenDenomParams::new("uatom", "ATOM", MAX_EXPONENT).validate().is_ok());
        assert!(matches!(
            TokenDenomParams::new("uatom", "ATOM", 78).validate(),
            Err(LeverageError::InvalidParams { reason, .. }) if reason == "exponent exceeds 36"
        ));

        assert!(atom().validate().is_ok());
    }

    #[test]
    fn test_denom_pattern() {
        assert!(is_valid_denom("uumee"));
        assert!(is_valid_denom("ibc/27394FB092D2ECCD56123C74F36E4C1F926001CEADA9CA97EA622B25F41E5EB2"));
        assert!(!is_valid_denom("1abc"));
        assert!(!is_valid_denom("ab"));
        assert!(!is_valid_denom("ux"));
        assert!(is_valid_denom("uxx"));
        assert_eq!(utoken_denom("uumee"), "u/uumee");
    }

    #[test]
    fn test_parse_token_toml() {
        let toml_str = r#"
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
        "#;

        #[derive(Deserialize)]
        struct Tokens {
            tokens: Vec<TokenDenomParams>,
        }

        let parsed: Tokens = toml::from_str(toml_str).unwrap();
        let umee = &parsed.tokens[0];
        assert_eq!(umee.collateral_weight, wad("0.25"));
        assert_eq!(umee.interest.slope_high, wad("1.5"));
        assert_eq!(umee.max_collateral_share, WAD);
        assert_eq!(umee.max_supply, U256::ZERO);
        assert!(umee.enable_supply && umee.enable_borrow);
        assert!(umee.validate().is_ok());
    }
}
