//! Storage contracts for the ingestion pipeline
//!
//! Two logical tables:
//! - Price store: one last-known price per market key, overwritten in place
//! - Alert log: append-only history of emitted alerts
//!
//! Implementations must make [`OddsStore::commit_cycle`] all-or-nothing: a
//! failed commit leaves neither snapshots nor alerts from that cycle behind.
//! Every write is idempotent, so a failed cycle can simply be retried.

pub mod memory;

pub use memory::{FaultPlan, MemoryStore};

use crate::error::StoreError;
use crate::models::{AlertFilter, AlertRecord, PriceSnapshot};
use async_trait::async_trait;
use std::collections::HashMap;

/// Durable last-known-price table keyed by market key
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Prices for the given keys; keys with no stored value are absent
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, i32>, StoreError>;

    /// Overwrite the snapshot of every entry's key. For duplicate keys in
    /// `entries` the last one wins.
    async fn upsert_many(&self, entries: &[PriceSnapshot]) -> Result<(), StoreError>;

    /// Point lookup
    async fn get(&self, key: &str) -> Result<Option<i32>, StoreError> {
        let mut found = self.get_many(&[key.to_string()]).await?;
        Ok(found.remove(key))
    }
}

/// Durable append-only alert history
#[async_trait]
pub trait AlertLog: Send + Sync {
    /// Insert alerts. Alerts whose id is already stored are ignored.
    async fn append(&self, alerts: &[AlertRecord]) -> Result<(), StoreError>;

    /// Alerts matching `filter`, newest first, at most `filter.effective_limit()`
    async fn query(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>, StoreError>;
}

/// Both tables behind one handle, with an atomic per-cycle commit
#[async_trait]
pub trait OddsStore: PriceStore + AlertLog {
    /// Persist one cycle's snapshots and alerts as a single unit
    async fn commit_cycle(
        &self,
        snapshots: &[PriceSnapshot],
        alerts: &[AlertRecord],
    ) -> Result<(), StoreError>;
}

/// Collapse duplicate keys keeping the last value, in first-seen order
pub(crate) fn dedupe_last_wins(entries: &[PriceSnapshot]) -> Vec<PriceSnapshot> {
    let mut index_by_key: HashMap<&str, usize> = HashMap::with_capacity(entries.len());
    let mut out: Vec<PriceSnapshot> = Vec::with_capacity(entries.len());
    for entry in entries {
        match index_by_key.get(entry.market_key.as_str()) {
            Some(&idx) => out[idx] = entry.clone(),
            None => {
                index_by_key.insert(entry.market_key.as_str(), out.len());
                out.push(entry.clone());
            }
        }
    }
    out
}
