//! Ingestion orchestrator: fetch → normalize → diff/commit → cache.
//!
//! One call to [`IngestionOrchestrator::run_cycle`] is one cycle. Polling,
//! scheduling and backoff between cycles belong to the caller.

use crate::cache::RecentAlertsCache;
use crate::clients::{OddsSource, RateLimitInfo};
use crate::diff::DiffEngine;
use crate::error::IngestError;
use crate::models::{now_ms, AlertFilter, AlertRecord};
use crate::normalizer::normalize_with_report;
use crate::store::OddsStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

pub const DEFAULT_THRESHOLD_CENTS: u32 = 10;

/// Upper bounds for the I/O stages of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTimeouts {
    pub fetch: Duration,
    pub store: Duration,
}

impl Default for CycleTimeouts {
    fn default() -> Self {
        Self {
            fetch: Duration::from_secs(10),
            store: Duration::from_secs(5),
        }
    }
}

/// Result of one successful cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Alerts emitted and committed by this cycle only
    pub alerts_emitted: Vec<AlertRecord>,
    /// Normalized quotes processed
    pub quotes_seen: usize,
    pub rate_limit: RateLimitInfo,
}

pub struct IngestionOrchestrator {
    source: Arc<dyn OddsSource>,
    store: Arc<dyn OddsStore>,
    diff: DiffEngine,
    cache: Arc<RecentAlertsCache>,
    timeouts: CycleTimeouts,
}

impl IngestionOrchestrator {
    pub fn new(source: Arc<dyn OddsSource>, store: Arc<dyn OddsStore>) -> Self {
        Self {
            diff: DiffEngine::new(store.clone()),
            source,
            store,
            cache: Arc::new(RecentAlertsCache::default()),
            timeouts: CycleTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: CycleTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Share a cache across orchestrators (e.g. one per sport)
    pub fn with_cache(mut self, cache: Arc<RecentAlertsCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<RecentAlertsCache> {
        &self.cache
    }

    /// Run one ingestion cycle for `sport` (or the upcoming feed).
    ///
    /// Any fatal error fails the whole cycle with nothing committed; the
    /// caller may simply run it again.
    pub async fn run_cycle(
        &self,
        sport: Option<&str>,
        threshold_cents: u32,
    ) -> Result<CycleReport, IngestError> {
        self.source
            .validate()
            .map_err(IngestError::Configuration)?;

        let upstream = timeout(self.timeouts.fetch, self.source.fetch_odds(sport))
            .await
            .map_err(|_| IngestError::Timeout {
                stage: "upstream fetch",
                after: self.timeouts.fetch,
            })??;

        let (quotes, report) = normalize_with_report(&upstream.payload, now_ms());
        if report.skipped_events > 0 || report.skipped_outcomes > 0 {
            warn!(
                "Normalizer skipped {} events and {} outcomes from {}",
                report.skipped_events,
                report.skipped_outcomes,
                self.source.source_name()
            );
        }

        let alerts = timeout(self.timeouts.store, self.diff.diff(&quotes, threshold_cents))
            .await
            .map_err(|_| IngestError::Timeout {
                stage: "store commit",
                after: self.timeouts.store,
            })??;

        self.cache.push_batch(&alerts);

        info!(
            "Cycle complete: source={}, sport={}, quotes={}, alerts={}, remaining={:?}",
            self.source.source_name(),
            sport.unwrap_or("upcoming"),
            quotes.len(),
            alerts.len(),
            upstream.rate_limit.remaining
        );

        Ok(CycleReport {
            alerts_emitted: alerts,
            quotes_seen: quotes.len(),
            rate_limit: upstream.rate_limit,
        })
    }

    /// Filtered alert history from the durable log, newest first
    pub async fn query_alerts(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>, IngestError> {
        let alerts = timeout(self.timeouts.store, self.store.query(filter))
            .await
            .map_err(|_| IngestError::Timeout {
                stage: "alert query",
                after: self.timeouts.store,
            })??;
        Ok(alerts)
    }

    /// Newest alerts emitted by this process, from memory
    pub fn recent_alerts(&self, limit: usize) -> Vec<AlertRecord> {
        self.cache.recent(limit)
    }
}

/// Structured payload for the ingestion trigger surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerts: Option<Vec<AlertRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestResponse {
    pub fn from_result(result: &Result<CycleReport, IngestError>) -> Self {
        match result {
            Ok(report) => Self {
                ok: true,
                added: Some(report.alerts_emitted.len()),
                alerts: Some(report.alerts_emitted.clone()),
                remaining: report.rate_limit.remaining.clone(),
                used: report.rate_limit.used.clone(),
                error: None,
            },
            Err(e) => {
                error!("Ingestion cycle failed ({}): {}", e.kind(), e);
                Self {
                    ok: false,
                    added: None,
                    alerts: None,
                    remaining: None,
                    used: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::UpstreamOdds;
    use crate::error::UpstreamError;
    use crate::models::{MarketType, QuoteRecord};
    use crate::store::{MemoryStore, PriceStore};
    use async_trait::async_trait;
    use chrono::DateTime;
    use serde_json::{json, Value};

    struct StaticSource {
        payload: Value,
        delay: Duration,
    }

    #[async_trait]
    impl OddsSource for StaticSource {
        async fn fetch_odds(&self, _sport: Option<&str>) -> Result<UpstreamOdds, UpstreamError> {
            tokio::time::sleep(self.delay).await;
            Ok(UpstreamOdds {
                payload: self.payload.clone(),
                rate_limit: RateLimitInfo {
                    remaining: Some("480".to_string()),
                    used: Some("20".to_string()),
                },
            })
        }

        fn source_name(&self) -> &str {
            "static"
        }
    }

    fn payload(home_price: i64) -> Value {
        json!([{
            "id": "g1",
            "sport_title": "NBA",
            "bookmakers": [{
                "key": "dk",
                "markets": [{
                    "key": "h2h",
                    "outcomes": [{"name": "home", "price": home_price}]
                }]
            }]
        }])
    }

    fn orchestrator(price: i64, delay: Duration) -> (IngestionOrchestrator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(StaticSource {
            payload: payload(price),
            delay,
        });
        (IngestionOrchestrator::new(source, store.clone()), store)
    }

    #[tokio::test]
    async fn test_cycle_reports_alerts_and_rate_limit() {
        let (orch, store) = orchestrator(-120, Duration::ZERO);
        store
            .upsert_many(&[QuoteRecord::new(
                "NBA",
                "g1",
                MarketType::Moneyline,
                "dk",
                Some("home".to_string()),
                -110,
                DateTime::from_timestamp_millis(1_000).unwrap(),
            )
            .to_snapshot()])
            .await
            .unwrap();

        let report = orch.run_cycle(None, 5).await.unwrap();
        assert_eq!(report.quotes_seen, 1);
        assert_eq!(report.alerts_emitted.len(), 1);
        assert_eq!(report.rate_limit.remaining.as_deref(), Some("480"));
        assert_eq!(orch.recent_alerts(10).len(), 1);

        let response = IngestResponse::from_result(&Ok(report));
        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["added"], json!(1));
        assert_eq!(body["used"], json!("20"));
        assert_eq!(body["alerts"][0]["oldOdds"], json!(-110));
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_fetch_timeout_fails_cycle() {
        let (orch, store) = orchestrator(-120, Duration::from_millis(200));
        let orch = orch.with_timeouts(CycleTimeouts {
            fetch: Duration::from_millis(20),
            store: Duration::from_secs(1),
        });

        let err = orch.run_cycle(None, 10).await.unwrap_err();
        assert!(matches!(err, IngestError::Timeout { stage: "upstream fetch", .. }));
        assert_eq!(store.snapshot_count(), 0);
    }

    #[test]
    fn test_failure_response_has_no_partial_fields() {
        let result: Result<CycleReport, IngestError> =
            Err(IngestError::Configuration("missing ODDS_API_KEY".to_string()));
        let body = serde_json::to_value(IngestResponse::from_result(&result)).unwrap();
        assert_eq!(
            body,
            json!({"ok": false, "error": "configuration error: missing ODDS_API_KEY"})
        );
    }
}
