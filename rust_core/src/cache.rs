//! Bounded in-memory view of the newest alerts emitted by this process.
//!
//! Read optimization only. Alerts from other instances never show up here;
//! the durable alert log stays the source of truth.

use crate::models::{newest_first, AlertFilter, AlertRecord};
use parking_lot::RwLock;
use std::collections::{HashSet, VecDeque};

pub const DEFAULT_CACHE_CAPACITY: usize = 200;

#[derive(Debug)]
pub struct RecentAlertsCache {
    capacity: usize,
    // front = newest
    alerts: RwLock<VecDeque<AlertRecord>>,
}

impl Default for RecentAlertsCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl RecentAlertsCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            alerts: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Add a committed batch. Ids already cached are skipped; the oldest
    /// entries fall off once capacity is exceeded.
    pub fn push_batch(&self, batch: &[AlertRecord]) {
        if batch.is_empty() || self.capacity == 0 {
            return;
        }
        let mut alerts = self.alerts.write();
        let mut known: HashSet<String> = alerts.iter().map(|a| a.id.clone()).collect();
        for alert in batch {
            if known.insert(alert.id.clone()) {
                alerts.push_back(alert.clone());
            }
        }

        // Batches from concurrent cycles can interleave
        alerts.make_contiguous().sort_by(newest_first);
        alerts.truncate(self.capacity);
    }

    /// Up to `limit` newest alerts matching `filter`
    pub fn query(&self, filter: &AlertFilter) -> Vec<AlertRecord> {
        self.alerts
            .read()
            .iter()
            .filter(|a| filter.matches(a))
            .take(filter.effective_limit() as usize)
            .cloned()
            .collect()
    }

    pub fn recent(&self, limit: usize) -> Vec<AlertRecord> {
        self.alerts.read().iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MarketType, QuoteRecord};
    use chrono::DateTime;

    fn alert(game: &str, ms: i64) -> AlertRecord {
        let quote = QuoteRecord::new(
            "NBA",
            game,
            MarketType::Moneyline,
            "dk",
            Some("home".to_string()),
            -130,
            DateTime::from_timestamp_millis(ms).unwrap(),
        );
        AlertRecord::from_move(&quote, -110, 20)
    }

    #[test]
    fn test_newest_first_and_bounded() {
        let cache = RecentAlertsCache::new(3);
        cache.push_batch(&[alert("g1", 1_000), alert("g2", 2_000)]);
        cache.push_batch(&[alert("g3", 3_000), alert("g4", 4_000)]);

        let games: Vec<String> = cache.recent(10).into_iter().map(|a| a.game_id).collect();
        assert_eq!(games, vec!["g4", "g3", "g2"]);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_duplicate_ids_ignored() {
        let cache = RecentAlertsCache::new(10);
        cache.push_batch(&[alert("g1", 1_000)]);
        cache.push_batch(&[alert("g1", 1_000)]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_interleaved_batches_stay_ordered() {
        let cache = RecentAlertsCache::new(10);
        cache.push_batch(&[alert("g3", 3_000)]);
        cache.push_batch(&[alert("g1", 1_000), alert("g2", 2_000)]);

        let games: Vec<String> = cache.recent(10).into_iter().map(|a| a.game_id).collect();
        assert_eq!(games, vec!["g3", "g2", "g1"]);
    }

    #[test]
    fn test_query_applies_filter_and_limit() {
        let cache = RecentAlertsCache::default();
        cache.push_batch(&[alert("g1", 1_000), alert("g2", 2_000), alert("g1", 3_000)]);

        let g1 = cache.query(&AlertFilter::new().game_id("g1"));
        assert_eq!(g1.len(), 2);
        assert!(g1[0].ts > g1[1].ts);

        assert_eq!(cache.query(&AlertFilter::new().limit(1)).len(), 1);
        assert!(cache.query(&AlertFilter::new().league("NFL")).is_empty());
    }
}
