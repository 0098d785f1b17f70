//! Oracle type definitions.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Where a recorded price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Fixed price from a deployment file
    #[default]
    Genesis,
    /// Pushed by the external price feed
    Feed,
}

/// Price data with metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceData {
    /// USD per display unit (WAD)
    #[serde(with = "crate::math::serde_decimal")]
    pub price: U256,
    /// Time the price was observed
    pub timestamp: u64,
    /// Who supplied it
    #[serde(default)]
    pub source: PriceSource,
}

impl PriceData {
    /// Create new price data.
    pub fn new(price: U256, timestamp: u64, source: PriceSource) -> Self {
        Self {
            price,
            timestamp,
            source,
        }
    }

    /// Check if price is stale.
    pub fn is_stale(&self, threshold_secs: u64, current_time: u64) -> bool {
        self.age_secs(current_time) > threshold_secs
    }

    /// Get age in seconds.
    pub fn age_secs(&self, current_time: u64) -> u64 {
        current_time.saturating_sub(self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::WAD;

    #[test]
    fn test_staleness() {
        let price = PriceData::new(WAD, 1_000, PriceSource::Feed);
        assert!(!price.is_stale(60, 1_060));
        assert!(price.is_stale(60, 1_061));

        // A timestamp from the future has zero age
        assert_eq!(price.age_secs(900), 0);
    }
}
