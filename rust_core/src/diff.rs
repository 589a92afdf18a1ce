//! Price move detection against the last known snapshot.
//!
//! Distance metric: `cents(x) = |x|` on American odds, and
//! `delta = |cents(new) - cents(old)|`. This measures change in price
//! magnitude, not implied-probability distance: -120 and +120 are 0 apart.
//! Changing it changes which moves alert, so it is kept as observed.
//!
//! Per batch:
//! 1. one batch lookup of prior prices for the distinct keys in the batch
//! 2. every quote is compared to the prior price as it stood before the
//!    batch (moves inside a batch are not chained)
//! 3. every quote is staged as the new snapshot, alert or not; for repeated
//!    keys the last quote wins
//! 4. snapshots and alerts are committed together

use crate::error::StoreError;
use crate::models::{AlertRecord, PriceSnapshot, QuoteRecord};
use crate::store::OddsStore;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Magnitude of an American-odds price in "cents"
pub fn american_cents(price: i32) -> u32 {
    price.unsigned_abs()
}

/// Distance between two American-odds prices
pub fn cents_delta(old_price: i32, new_price: i32) -> u32 {
    american_cents(old_price).abs_diff(american_cents(new_price))
}

/// Result of comparing one batch to prior prices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffOutcome {
    /// Alerts in batch order
    pub alerts: Vec<AlertRecord>,
    /// One staged snapshot per quote, in batch order
    pub snapshots: Vec<PriceSnapshot>,
    /// Quotes whose key had no prior price
    pub first_observations: usize,
}

/// Pure move detection.
///
/// A quote alerts when a prior price exists, the price actually changed and
/// `cents_delta >= threshold_cents`. An unchanged price is never a move, so
/// replaying a cycle with no upstream change emits nothing even at a zero
/// threshold.
pub fn compute_moves(
    batch: &[QuoteRecord],
    prior: &HashMap<String, i32>,
    threshold_cents: u32,
) -> DiffOutcome {
    let mut outcome = DiffOutcome {
        alerts: Vec::new(),
        snapshots: Vec::with_capacity(batch.len()),
        first_observations: 0,
    };
    let mut alert_index: HashMap<(&str, DateTime<Utc>), usize> = HashMap::new();

    for quote in batch {
        match prior.get(&quote.market_key) {
            None => outcome.first_observations += 1,
            Some(&old_price) if old_price != quote.price => {
                let delta = cents_delta(old_price, quote.price);
                if delta >= threshold_cents {
                    let alert = AlertRecord::from_move(quote, old_price, delta);
                    // Same key at the same instant is one observed move
                    let slot = (quote.market_key.as_str(), quote.observed_at);
                    match alert_index.get(&slot) {
                        Some(&idx) => outcome.alerts[idx] = alert,
                        None => {
                            alert_index.insert(slot, outcome.alerts.len());
                            outcome.alerts.push(alert);
                        }
                    }
                }
            }
            Some(_) => {}
        }
        outcome.snapshots.push(quote.to_snapshot());
    }

    outcome
}

/// Distinct market keys in first-seen order
pub fn distinct_keys(batch: &[QuoteRecord]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(batch.len());
    batch
        .iter()
        .filter(|q| seen.insert(q.market_key.as_str()))
        .map(|q| q.market_key.clone())
        .collect()
}

/// Move detection wired to a store
#[derive(Clone)]
pub struct DiffEngine {
    store: Arc<dyn OddsStore>,
}

impl DiffEngine {
    pub fn new(store: Arc<dyn OddsStore>) -> Self {
        Self { store }
    }

    /// Compare `batch` to stored prices, commit the new snapshots together
    /// with the emitted alerts and return the alerts.
    ///
    /// Any store failure fails the whole call and nothing from this batch is
    /// persisted.
    pub async fn diff(
        &self,
        batch: &[QuoteRecord],
        threshold_cents: u32,
    ) -> Result<Vec<AlertRecord>, StoreError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let keys = distinct_keys(batch);
        let prior = self.store.get_many(&keys).await?;
        debug!(
            "Loaded {} prior prices for {} distinct keys",
            prior.len(),
            keys.len()
        );

        let outcome = compute_moves(batch, &prior, threshold_cents);
        self.store
            .commit_cycle(&outcome.snapshots, &outcome.alerts)
            .await?;

        info!(
            "Diff committed: quotes={}, first_seen={}, alerts={}, threshold={}c",
            batch.len(),
            outcome.first_observations,
            outcome.alerts.len(),
            threshold_cents
        );

        Ok(outcome.alerts)
    }
}
