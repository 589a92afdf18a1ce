//! Upstream odds providers
//!
//! The pipeline only depends on [`OddsSource`]: a fetch returning raw vendor
//! JSON plus whatever quota signals the provider exposes.

pub mod odds_api;

pub use odds_api::{OddsApiClient, OddsApiConfig};

use crate::error::UpstreamError;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

/// Header carrying the provider's remaining request quota
pub const REQUESTS_REMAINING_HEADER: &str = "x-requests-remaining";
/// Header carrying the provider's used request count
pub const REQUESTS_USED_HEADER: &str = "x-requests-used";

/// Provider quota signals, passed through uninterpreted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub remaining: Option<String>,
    pub used: Option<String>,
}

impl RateLimitInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        Self {
            remaining: read(REQUESTS_REMAINING_HEADER),
            used: read(REQUESTS_USED_HEADER),
        }
    }
}

/// Raw upstream response for one fetch
#[derive(Debug, Clone)]
pub struct UpstreamOdds {
    /// Vendor JSON: events → bookmakers → markets → outcomes
    pub payload: serde_json::Value,
    pub rate_limit: RateLimitInfo,
}

/// Source of raw odds for one ingestion cycle
#[async_trait]
pub trait OddsSource: Send + Sync {
    /// Fetch current odds, optionally restricted to one sport key
    async fn fetch_odds(&self, sport: Option<&str>) -> Result<UpstreamOdds, UpstreamError>;

    /// Check required settings before any request is attempted.
    /// Returns a description of the first problem found.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Provider name for logging
    fn source_name(&self) -> &str;
}
