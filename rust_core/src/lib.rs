//! Oddswatch Core - sportsbook odds movement detection.
//!
//! This crate provides:
//! - Normalization of vendor odds JSON into canonical per-market quotes
//! - Move detection against a durable last-known-price store
//! - An append-only, filterable alert history
//! - Postgres and in-memory store implementations
//! - An upstream odds client guarded by a circuit breaker
//! - A per-cycle ingestion orchestrator

pub mod cache;
pub mod circuit_breaker;
pub mod clients;
pub mod db;
pub mod diff;
pub mod error;
pub mod ingest;
pub mod models;
pub mod normalizer;
pub mod store;

pub use cache::RecentAlertsCache;
pub use clients::{OddsApiClient, OddsApiConfig, OddsSource, RateLimitInfo, UpstreamOdds};
pub use db::PgOddsStore;
pub use diff::DiffEngine;
pub use error::{IngestError, StoreError, UpstreamError};
pub use ingest::{CycleReport, CycleTimeouts, IngestResponse, IngestionOrchestrator};
pub use models::{AlertFilter, AlertRecord, MarketType, PriceSnapshot, QuoteRecord};
pub use store::{AlertLog, MemoryStore, OddsStore, PriceStore};
