//! In-memory price book fed by the external price collaborator.

use alloy::primitives::U256;
use dashmap::DashMap;
use tracing::debug;

use super::{OracleError, PriceData, PriceOracle, PriceSource};

/// Latest price per denomination with a staleness bound.
///
/// Writers (the price feed) and readers (the engine) may live on different
/// threads, so prices sit in a `DashMap`.
pub struct PriceBook {
    /// Latest price by denom
    prices: DashMap<String, PriceData>,
    /// Prices older than this are rejected
    max_age_secs: u64,
}

impl std::fmt::Debug for PriceBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceBook")
            .field("denoms", &self.prices.len())
            .field("max_age_secs", &self.max_age_secs)
            .finish()
    }
}

impl PriceBook {
    /// Create a new price book.
    pub fn new(max_age_secs: u64) -> Self {
        Self {
            prices: DashMap::new(),
            max_age_secs,
        }
    }

    /// Record a price observed at `timestamp`.
    pub fn set_price(&self, denom: impl Into<String>, price: U256, timestamp: u64) {
        self.insert(denom.into(), PriceData::new(price, timestamp, PriceSource::Feed));
    }

    /// Record a full price entry.
    pub fn insert(&self, denom: String, data: PriceData) {
        debug!(
            denom = %denom,
            price = %crate::math::format_decimal(data.price),
            timestamp = data.timestamp,
            source = ?data.source,
            "Price updated"
        );
        self.prices.insert(denom, data);
    }

    /// Forget the price of a denomination.
    pub fn remove_price(&self, denom: &str) -> Option<PriceData> {
        self.prices.remove(denom).map(|(_, data)| data)
    }

    /// Raw entry, ignoring staleness.
    pub fn get(&self, denom: &str) -> Option<PriceData> {
        self.prices.get(denom).map(|entry| entry.value().clone())
    }

    /// Denominations whose price is older than the staleness bound.
    pub fn stale_denoms(&self, now: u64) -> Vec<String> {
        let mut stale: Vec<String> = self
            .prices
            .iter()
            .filter(|e| e.value().is_stale(self.max_age_secs, now))
            .map(|e| e.key().clone())
            .collect();
        stale.sort();
        stale
    }

    /// Staleness bound in seconds.
    pub fn max_age_secs(&self) -> u64 {
        self.max_age_secs
    }
}

impl PriceOracle for PriceBook {
    fn price(&self, denom: &str, now: u64) -> Result<U256, OracleError> {
        let entry = self
            .prices
            .get(denom)
            .ok_or_else(|| OracleError::NoPrice(denom.to_string()))?;

        if entry.is_stale(self.max_age_secs, now) {
            return Err(OracleError::Stale {
                denom: denom.to_string(),
                age_secs: entry.age_secs(now),
                max_age_secs: self.max_age_secs,
            });
        }

        if entry.price.is_zero() {
            return Err(OracleError::ZeroPrice(denom.to_string()));
        }

        Ok(entry.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::WAD;

    #[test]
    fn test_missing_price() {
        let book = PriceBook::new(60);
        assert_eq!(
            book.price("uumee", 0),
            Err(OracleError::NoPrice("uumee".to_string()))
        );
    }

    #[test]
    fn test_fresh_and_stale_price() {
        let book = PriceBook::new(60);
        book.set_price("uatom", WAD * U256::from(10u64), 100);

        assert_eq!(book.price("uatom", 160), Ok(WAD * U256::from(10u64)));
        assert!(matches!(
            book.price("uatom", 161),
            Err(OracleError::Stale { age_secs: 61, .. })
        ));
        assert_eq!(book.stale_denoms(161), vec!["uatom".to_string()]);
    }

    #[test]
    fn test_zero_price_rejected() {
        let book = PriceBook::new(60);
        book.set_price("uatom", U256::ZERO, 0);
        assert_eq!(
            book.price("uatom", 0),
            Err(OracleError::ZeroPrice("uatom".to_string()))
        );
    }

    #[test]
    fn test_remove_price() {
        let book = PriceBook::new(60);
        book.set_price("uatom", WAD, 0);
        assert!(book.remove_price("uatom").is_some());
        assert!(book.price("uatom", 0).is_err());
    }
}
