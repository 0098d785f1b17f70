//! Persistence seam for market and position state.

use alloy::primitives::Address;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::market::MarketState;
use crate::position::AccountPosition;
use crate::registry::Denom;

/// Writes produced by one committed operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub markets: BTreeMap<Denom, MarketState>,
    pub accounts: BTreeMap<Address, AccountPosition>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.markets.is_empty() && self.accounts.is_empty()
    }
}

/// Durable storage of markets and positions.
///
/// The engine reads through this trait and writes only whole change sets,
/// so an implementation needs no transaction support of its own.
pub trait LedgerStore {
    fn market(&self, denom: &str) -> Option<MarketState>;

    /// All markets, ordered by denom.
    fn markets(&self) -> Vec<MarketState>;

    fn account(&self, address: &Address) -> Option<AccountPosition>;

    /// All accounts, ordered by address.
    fn accounts(&self) -> Vec<(Address, AccountPosition)>;

    /// Persist every entry of `changes`.
    fn apply(&mut self, changes: ChangeSet);
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    markets: BTreeMap<Denom, MarketState>,
    accounts: BTreeMap<Address, AccountPosition>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryStore {
    fn market(&self, denom: &str) -> Option<MarketState> {
        self.markets.get(denom).cloned()
    }

    fn markets(&self) -> Vec<MarketState> {
        self.markets.values().cloned().collect()
    }

    fn account(&self, address: &Address) -> Option<AccountPosition> {
        self.accounts.get(address).cloned()
    }

    fn accounts(&self) -> Vec<(Address, AccountPosition)> {
        self.accounts
            .iter()
            .map(|(address, position)| (*address, position.clone()))
            .collect()
    }

    fn apply(&mut self, changes: ChangeSet) {
        self.markets.extend(changes.markets);
        self.accounts.extend(changes.accounts);
    }
}

/// One account in a [`LedgerSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub address: Address,
    #[serde(flatten)]
    pub position: AccountPosition,
}

/// Export of a whole ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub markets: Vec<MarketState>,
    pub accounts: Vec<AccountEntry>,
}

impl LedgerSnapshot {
    /// Capture the committed contents of `store`.
    pub fn capture<S: LedgerStore + ?Sized>(store: &S) -> Self {
        Self {
            markets: store.markets(),
            accounts: store
                .accounts()
                .into_iter()
                .map(|(address, position)| AccountEntry { address, position })
                .collect(),
        }
    }

    /// Load the snapshot into `store` as one change set.
    pub fn restore_into<S: LedgerStore + ?Sized>(self, store: &mut S) {
        store.apply(self.into_change_set());
    }

    pub fn into_change_set(self) -> ChangeSet {
        ChangeSet {
            markets: self
                .markets
                .into_iter()
                .map(|market| (market.denom.clone(), market))
                .collect(),
            accounts: self
                .accounts
                .into_iter()
                .map(|entry| (entry.address, entry.position))
                .collect(),
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize ledger snapshot")
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("Failed to parse ledger snapshot")
    }

    /// Read a snapshot from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {:?}", path))?;
        Self::from_json(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, U256};

    #[test]
    fn test_apply_overwrites_entries() {
        let mut store = MemoryStore::new();
        let mut changes = ChangeSet::default();
        changes
            .markets
            .insert("uumee".to_string(), MarketState::new("uumee", 0, 1));
        store.apply(changes);

        let mut market = store.market("uumee").unwrap();
        market.liquidity = U256::from(9u64);
        let mut changes = ChangeSet::default();
        changes.markets.insert("uumee".to_string(), market);
        store.apply(changes);

        assert_eq!(store.markets().len(), 1);
        assert_eq!(store.market("uumee").unwrap().liquidity, U256::from(9u64));
    }

    #[test]
    fn test_snapshot_json() {
        let alice = address!("00000000000000000000000000000000000a11ce");
        let mut store = MemoryStore::new();
        let mut changes = ChangeSet::default();
        let mut market = MarketState::new("uatom", 10, 1);
        market.liquidity = U256::from(1_000u64);
        market.utoken_supply = U256::from(1_000u64);
        changes.markets.insert("uatom".to_string(), market);
        let mut position = AccountPosition::default();
        position.supply_mut("uatom").utokens = U256::from(1_000u64);
        changes.accounts.insert(alice, position);
        store.apply(changes);

        let json = LedgerSnapshot::capture(&store).to_json().unwrap();
        assert!(json.contains("\"liquidity\": \"1000\""));

        let mut restored = MemoryStore::new();
        LedgerSnapshot::from_json(&json).unwrap().restore_into(&mut restored);
        assert_eq!(restored.market("uatom"), store.market("uatom"));
        assert_eq!(restored.account(&alice), store.account(&alice));
    }
}
