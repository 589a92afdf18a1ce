//! The Odds API (v4) client.
//!
//! `GET {base}/sports/{sport|upcoming}/odds/?regions=..&markets=h2h&oddsFormat=american&apiKey=..`

use super::{OddsSource, RateLimitInfo, UpstreamOdds};
use crate::circuit_breaker::{ApiCircuitBreaker, ApiCircuitBreakerConfig, ApiCircuitState};
use crate::error::UpstreamError;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.the-odds-api.com/v4";

/// Sport path segment used when no sport filter is given
pub const UPCOMING_SPORT: &str = "upcoming";

/// Max characters of an error body kept in `UpstreamError::Http`
const ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct OddsApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub regions: String,
    pub markets: String,
    pub odds_format: String,
    pub request_timeout: Duration,
    pub circuit_breaker: ApiCircuitBreakerConfig,
}

impl Default for OddsApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            regions: "us".to_string(),
            markets: "h2h".to_string(),
            odds_format: "american".to_string(),
            request_timeout: Duration::from_secs(10),
            circuit_breaker: ApiCircuitBreakerConfig::default(),
        }
    }
}

impl OddsApiConfig {
    /// Load from environment. A missing `ODDS_API_KEY` is left empty and
    /// reported by [`OddsSource::validate`].
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env::var("ODDS_API_BASE_URL").unwrap_or(defaults.base_url),
            api_key: env::var("ODDS_API_KEY").unwrap_or_default(),
            regions: env::var("ODDS_API_REGIONS").unwrap_or(defaults.regions),
            markets: defaults.markets,
            odds_format: defaults.odds_format,
            request_timeout: env::var("FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            circuit_breaker: ApiCircuitBreakerConfig {
                failure_threshold: env::var("ODDS_CB_FAILURE_THRESHOLD")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.circuit_breaker.failure_threshold),
                recovery_timeout: env::var("ODDS_CB_RECOVERY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.circuit_breaker.recovery_timeout),
                success_threshold: defaults.circuit_breaker.success_threshold,
            },
        }
    }
}

pub struct OddsApiClient {
    client: Client,
    config: OddsApiConfig,
    circuit_breaker: Arc<ApiCircuitBreaker>,
}

impl std::fmt::Debug for OddsApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // api key deliberately left out
        f.debug_struct("OddsApiClient")
            .field("base_url", &self.config.base_url)
            .field("circuit_breaker_state", &self.circuit_breaker.state())
            .finish()
    }
}

impl OddsApiClient {
    pub fn new(config: OddsApiConfig) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        let circuit_breaker = Arc::new(ApiCircuitBreaker::new(
            "odds_api",
            config.circuit_breaker.clone(),
        ));
        Self {
            client,
            config,
            circuit_breaker,
        }
    }

    pub fn circuit_state(&self) -> ApiCircuitState {
        self.circuit_breaker.state()
    }

    /// Full request URL for `sport` (or the upcoming feed)
    pub fn odds_url(&self, sport: Option<&str>) -> Result<Url, UpstreamError> {
        let sport = sport
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UPCOMING_SPORT);

        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| UpstreamError::Malformed(format!("invalid base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| UpstreamError::Malformed("base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["sports", sport, "odds", ""]);
        url.query_pairs_mut()
            .append_pair("regions", &self.config.regions)
            .append_pair("markets", &self.config.markets)
            .append_pair("oddsFormat", &self.config.odds_format)
            .append_pair("apiKey", &self.config.api_key);
        Ok(url)
    }

    async fn fetch_internal(&self, url: Url) -> Result<UpstreamOdds, UpstreamError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let rate_limit = RateLimitInfo::from_headers(resp.headers());

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let bytes = resp.bytes().await?;
        let payload = parse_payload(&bytes)?;
        Ok(UpstreamOdds {
            payload,
            rate_limit,
        })
    }
}

/// Decode a response body, requiring a top-level array of events
fn parse_payload(bytes: &[u8]) -> Result<Value, UpstreamError> {
    let payload: Value = serde_json::from_slice(bytes)
        .map_err(|e| UpstreamError::Malformed(format!("invalid JSON: {}", e)))?;
    if !payload.is_array() {
        return Err(UpstreamError::Malformed(
            "expected a top-level array of events".to_string(),
        ));
    }
    Ok(payload)
}

fn truncate_body(body: &str) -> String {
    body.chars().take(ERROR_BODY_LIMIT).collect()
}

#[async_trait]
impl OddsSource for OddsApiClient {
    async fn fetch_odds(&self, sport: Option<&str>) -> Result<UpstreamOdds, UpstreamError> {
        if !self.circuit_breaker.is_available() {
            return Err(UpstreamError::CircuitOpen(
                self.circuit_breaker.name().to_string(),
            ));
        }

        let url = self.odds_url(sport)?;
        debug!("Fetching odds (sport={})", sport.unwrap_or(UPCOMING_SPORT));

        let result = self.fetch_internal(url).await;
        match &result {
            Ok(odds) => {
                self.circuit_breaker.record_success();
                debug!(
                    "Odds fetched: events={}, remaining={:?}, used={:?}",
                    odds.payload.as_array().map_or(0, |a| a.len()),
                    odds.rate_limit.remaining,
                    odds.rate_limit.used
                );
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                warn!("Odds fetch failed (sport={:?}): {}", sport, e);
            }
        }
        result
    }

    fn validate(&self) -> Result<(), String> {
        if self.config.api_key.trim().is_empty() {
            return Err("missing ODDS_API_KEY".to_string());
        }
        Url::parse(&self.config.base_url)
            .map(|_| ())
            .map_err(|e| format!("invalid ODDS_API_BASE_URL '{}': {}", self.config.base_url, e))
    }

    fn source_name(&self) -> &str {
        "the-odds-api"
    }
}
