//! Canonical records shared by the ingestion pipeline
//!
//! - `QuoteRecord`: one observed price for one outcome at one book
//! - `PriceSnapshot`: last known price per market key
//! - `AlertRecord`: an emitted price move
//! - `AlertFilter`: optional predicates for reading the alert history

pub mod market_type;

pub use market_type::{MarketType, UnknownMarketType};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default number of alerts returned by a query without an explicit limit
pub const DEFAULT_QUERY_LIMIT: u32 = 100;

/// Upper bound on alerts returned by a single query
pub const MAX_QUERY_LIMIT: u32 = 500;

/// Build the deterministic identity of a market outcome at one book.
///
/// Format: `{game_id}:{book}:{market_type}:{outcome_side}`. Markets without
/// an outcome side drop the trailing segment.
pub fn market_key(
    game_id: &str,
    book: &str,
    market_type: MarketType,
    outcome_side: Option<&str>,
) -> String {
    match outcome_side {
        Some(side) => format!("{}:{}:{}:{}", game_id, book, market_type.as_code(), side),
        None => format!("{}:{}:{}", game_id, book, market_type.as_code()),
    }
}

/// Current time truncated to millisecond precision.
///
/// Observation timestamps feed alert ids, so they must survive a round trip
/// through storage unchanged.
pub fn now_ms() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// A single observed price for one outcome of one market at one book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRecord {
    pub market_key: String,
    pub league: String,
    pub game_id: String,
    pub market_type: MarketType,
    pub book: String,
    /// Team or side name; `None` for total markets
    pub outcome_side: Option<String>,
    /// American odds (e.g. -120, +150)
    pub price: i32,
    pub observed_at: DateTime<Utc>,
}

impl QuoteRecord {
    pub fn new(
        league: impl Into<String>,
        game_id: impl Into<String>,
        market_type: MarketType,
        book: impl Into<String>,
        outcome_side: Option<String>,
        price: i32,
        observed_at: DateTime<Utc>,
    ) -> Self {
        let game_id = game_id.into();
        let book = book.into();
        let market_key = market_key(&game_id, &book, market_type, outcome_side.as_deref());
        Self {
            market_key,
            league: league.into(),
            game_id,
            market_type,
            book,
            outcome_side,
            price,
            observed_at,
        }
    }

    /// The snapshot value this quote leaves behind once processed
    pub fn to_snapshot(&self) -> PriceSnapshot {
        PriceSnapshot {
            market_key: self.market_key.clone(),
            price: self.price,
            observed_at: self.observed_at,
        }
    }
}

/// Last known price for a market key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub market_key: String,
    pub price: i32,
    pub observed_at: DateTime<Utc>,
}

/// An emitted notification of a qualifying price move.
///
/// Immutable once created. The id is derived from the market key, the
/// observation time and the new price, so replaying an identical cycle
/// yields identical ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: String,
    pub market_key: String,
    pub league: String,
    pub game_id: String,
    pub market_type: MarketType,
    pub book: String,
    #[serde(rename = "oldOdds")]
    pub old_price: i32,
    #[serde(rename = "newOdds")]
    pub new_price: i32,
    pub delta_cents: u32,
    pub ts: DateTime<Utc>,
}

impl AlertRecord {
    /// Alert id for a move to `new_price` observed on `market_key` at
    /// `observed_at`: `{marketKey}:{observedAtMs}:{newPrice}`.
    ///
    /// Two cycles landing on the same millisecond with different prices get
    /// distinct ids; an identical replay gets the same id.
    pub fn make_id(market_key: &str, observed_at: DateTime<Utc>, new_price: i32) -> String {
        format!(
            "{}:{}:{}",
            market_key,
            observed_at.timestamp_millis(),
            new_price
        )
    }

    /// Build the alert for `quote` moving away from `old_price`
    pub fn from_move(quote: &QuoteRecord, old_price: i32, delta_cents: u32) -> Self {
        Self {
            id: Self::make_id(&quote.market_key, quote.observed_at, quote.price),
            market_key: quote.market_key.clone(),
            league: quote.league.clone(),
            game_id: quote.game_id.clone(),
            market_type: quote.market_type,
            book: quote.book.clone(),
            old_price,
            new_price: quote.price,
            delta_cents,
            ts: quote.observed_at,
        }
    }
}

/// Optional, AND-combined predicates over the alert history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertFilter {
    pub league: Option<String>,
    pub game_id: Option<String>,
    pub market_type: Option<MarketType>,
    pub book: Option<String>,
    pub min_delta_cents: Option<u32>,
    #[serde(rename = "sinceTimestamp")]
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl AlertFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn league(mut self, league: impl Into<String>) -> Self {
        self.league = Some(league.into());
        self
    }

    pub fn game_id(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }

    pub fn market_type(mut self, market_type: MarketType) -> Self {
        self.market_type = Some(market_type);
        self
    }

    pub fn book(mut self, book: impl Into<String>) -> Self {
        self.book = Some(book.into());
        self
    }

    pub fn min_delta_cents(mut self, cents: u32) -> Self {
        self.min_delta_cents = Some(cents);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Only alerts from the last `minutes` minutes. Zero means no bound.
    pub fn since_minutes(mut self, minutes: u32) -> Self {
        self.since = (minutes > 0).then(|| Utc::now() - Duration::minutes(i64::from(minutes)));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Requested limit capped at `MAX_QUERY_LIMIT`. A missing or zero
    /// limit means `DEFAULT_QUERY_LIMIT`.
    pub fn effective_limit(&self) -> u32 {
        match self.limit {
            None | Some(0) => DEFAULT_QUERY_LIMIT,
            Some(limit) => limit.min(MAX_QUERY_LIMIT),
        }
    }

    /// Whether `alert` satisfies every set predicate (limit not considered)
    pub fn matches(&self, alert: &AlertRecord) -> bool {
        self.league.as_deref().map_or(true, |l| alert.league == l)
            && self.game_id.as_deref().map_or(true, |g| alert.game_id == g)
            && self.market_type.map_or(true, |m| alert.market_type == m)
            && self.book.as_deref().map_or(true, |b| alert.book == b)
            && self.min_delta_cents.map_or(true, |d| alert.delta_cents >= d)
            && self.since.map_or(true, |s| alert.ts >= s)
    }
}

/// Newest-first ordering used by every alert read path: `ts` descending,
/// ties broken by id descending.
pub fn newest_first(a: &AlertRecord, b: &AlertRecord) -> std::cmp::Ordering {
    b.ts.cmp(&a.ts).then_with(|| b.id.cmp(&a.id))
}
