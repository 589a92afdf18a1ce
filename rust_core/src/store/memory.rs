//! In-process store implementing the storage contracts
//!
//! Both tables live behind one lock, so `commit_cycle` applies snapshots and
//! alerts together or not at all. A [`FaultPlan`] makes individual
//! operations fail on demand for exercising failure paths.

use super::{dedupe_last_wins, AlertLog, OddsStore, PriceStore};
use crate::error::StoreError;
use crate::models::{newest_first, AlertFilter, AlertRecord, PriceSnapshot};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Which operations should fail
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultPlan {
    pub fail_reads: bool,
    pub fail_price_writes: bool,
    pub fail_alert_writes: bool,
}

#[derive(Debug, Default)]
struct Tables {
    prices: HashMap<String, PriceSnapshot>,
    alerts: Vec<AlertRecord>,
    alert_ids: HashSet<String>,
}

impl Tables {
    fn apply_snapshots(&mut self, entries: &[PriceSnapshot]) {
        for entry in dedupe_last_wins(entries) {
            self.prices.insert(entry.market_key.clone(), entry);
        }
    }

    fn apply_alerts(&mut self, alerts: &[AlertRecord]) {
        let mut ordered: Vec<&AlertRecord> = alerts.iter().collect();
        ordered.sort_by_key(|a| a.ts);
        for alert in ordered {
            if self.alert_ids.insert(alert.id.clone()) {
                self.alerts.push(alert.clone());
            }
        }
    }
}

/// Store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    faults: Mutex<FaultPlan>,
    read_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active fault plan
    pub fn set_faults(&self, plan: FaultPlan) {
        *self.faults.lock() = plan;
    }

    /// Clear all injected faults
    pub fn heal(&self) {
        self.set_faults(FaultPlan::default());
    }

    /// Number of batch price lookups served so far
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// Stored snapshot for `key`
    pub fn snapshot(&self, key: &str) -> Option<PriceSnapshot> {
        self.tables.lock().prices.get(key).cloned()
    }

    pub fn snapshot_count(&self) -> usize {
        self.tables.lock().prices.len()
    }

    pub fn alert_count(&self) -> usize {
        self.tables.lock().alerts.len()
    }

    fn faults(&self) -> FaultPlan {
        *self.faults.lock()
    }
}

fn injected(what: &str) -> StoreError {
    StoreError::Unavailable(format!("injected {} failure", what))
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, i32>, StoreError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults().fail_reads {
            return Err(injected("read"));
        }
        let tables = self.tables.lock();
        Ok(keys
            .iter()
            .filter_map(|k| tables.prices.get(k).map(|s| (k.clone(), s.price)))
            .collect())
    }

    async fn upsert_many(&self, entries: &[PriceSnapshot]) -> Result<(), StoreError> {
        if self.faults().fail_price_writes {
            return Err(injected("price write"));
        }
        self.tables.lock().apply_snapshots(entries);
        Ok(())
    }
}

#[async_trait]
impl AlertLog for MemoryStore {
    async fn append(&self, alerts: &[AlertRecord]) -> Result<(), StoreError> {
        if self.faults().fail_alert_writes {
            return Err(injected("alert write"));
        }
        self.tables.lock().apply_alerts(alerts);
        Ok(())
    }

    async fn query(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>, StoreError> {
        if self.faults().fail_reads {
            return Err(injected("read"));
        }
        let tables = self.tables.lock();
        let mut matched: Vec<AlertRecord> = tables
            .alerts
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        matched.sort_by(newest_first);
        matched.truncate(filter.effective_limit() as usize);
        Ok(matched)
    }
}

#[async_trait]
impl OddsStore for MemoryStore {
    async fn commit_cycle(
        &self,
        snapshots: &[PriceSnapshot],
        alerts: &[AlertRecord],
    ) -> Result<(), StoreError> {
        let faults = self.faults();
        if faults.fail_price_writes && !snapshots.is_empty() {
            return Err(injected("price write"));
        }
        if faults.fail_alert_writes && !alerts.is_empty() {
            return Err(injected("alert write"));
        }

        let mut tables = self.tables.lock();
        tables.apply_snapshots(snapshots);
        tables.apply_alerts(alerts);
        Ok(())
    }
}
