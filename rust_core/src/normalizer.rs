//! Vendor payload → `QuoteRecord` mapping
//!
//! Vendor shape (events → bookmakers → markets → outcomes):
//!
//! ```text
//! [ { "id": "game", "sport_title": "NBA",
//!     "bookmakers": [ { "key": "draftkings",
//!       "markets": [ { "key": "h2h",
//!         "outcomes": [ { "name": "Lakers", "price": -120 }, ... ] } ] } ] } ]
//! ```
//!
//! Malformed items are dropped one at a time; the batch never fails.

use crate::models::{MarketType, QuoteRecord};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// League used when an event carries no title
pub const UNKNOWN_LEAGUE: &str = "Unknown";

/// Counts of items dropped while normalizing one payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub records: usize,
    pub skipped_events: usize,
    pub skipped_bookmakers: usize,
    pub unsupported_markets: usize,
    pub skipped_outcomes: usize,
    pub duplicates: usize,
}

/// Map a vendor payload into canonical quotes observed at `now`.
pub fn normalize(payload: &Value, now: DateTime<Utc>) -> Vec<QuoteRecord> {
    normalize_with_report(payload, now).0
}

/// Same as [`normalize`], also returning what was skipped
pub fn normalize_with_report(
    payload: &Value,
    now: DateTime<Utc>,
) -> (Vec<QuoteRecord>, NormalizeReport) {
    let mut report = NormalizeReport::default();
    let mut out: Vec<QuoteRecord> = Vec::new();
    let mut index_by_key: HashMap<String, usize> = HashMap::new();

    let events = match payload.as_array() {
        Some(events) => events,
        None => return (out, report),
    };

    for event in events {
        let game_id = match non_empty_str(&event["id"]) {
            Some(id) => id,
            None => {
                report.skipped_events += 1;
                continue;
            }
        };
        let league = non_empty_str(&event["sport_title"]).unwrap_or(UNKNOWN_LEAGUE);

        for bookmaker in event["bookmakers"].as_array().into_iter().flatten() {
            let book = match non_empty_str(&bookmaker["key"]) {
                Some(book) => book,
                None => {
                    report.skipped_bookmakers += 1;
                    continue;
                }
            };

            for market in bookmaker["markets"].as_array().into_iter().flatten() {
                let market_type = match market["key"].as_str().and_then(MarketType::from_vendor_key) {
                    Some(mt) => mt,
                    None => {
                        report.unsupported_markets += 1;
                        continue;
                    }
                };

                for outcome in market["outcomes"].as_array().into_iter().flatten() {
                    let side = non_empty_str(&outcome["name"]);
                    let price = parse_american_price(&outcome["price"]);
                    let (side, price) = match (side, price) {
                        (Some(side), Some(price)) => (side, price),
                        _ => {
                            report.skipped_outcomes += 1;
                            continue;
                        }
                    };

                    let side = market_type.has_outcome_side().then(|| side.to_string());
                    let record =
                        QuoteRecord::new(league, game_id, market_type, book, side, price, now);

                    // Last write wins, first position kept
                    match index_by_key.get(&record.market_key) {
                        Some(&idx) => {
                            report.duplicates += 1;
                            out[idx] = record;
                        }
                        None => {
                            index_by_key.insert(record.market_key.clone(), out.len());
                            out.push(record);
                        }
                    }
                }
            }
        }
    }

    report.records = out.len();
    debug!(
        "Normalized {} quotes (skipped: events={}, bookmakers={}, markets={}, outcomes={}, duplicates={})",
        report.records,
        report.skipped_events,
        report.skipped_bookmakers,
        report.unsupported_markets,
        report.skipped_outcomes,
        report.duplicates
    );

    (out, report)
}

fn non_empty_str(v: &Value) -> Option<&str> {
    v.as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// Parse an American-odds price from a JSON number or numeric string.
///
/// Fractional values round to the nearest integer; non-finite or
/// out-of-range values are rejected.
fn parse_american_price(v: &Value) -> Option<i32> {
    let raw = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    let rounded = raw.round();
    if rounded < f64::from(i32::MIN) || rounded > f64::from(i32::MAX) {
        return None;
    }
    Some(rounded as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    fn event(id: Option<&str>, title: &str, outcomes: Value) -> Value {
        let mut ev = json!({
            "sport_title": title,
            "bookmakers": [
                { "key": "draftkings", "markets": [ { "key": "h2h", "outcomes": outcomes } ] }
            ]
        });
        if let Some(id) = id {
            ev["id"] = json!(id);
        }
        ev
    }

    #[test]
    fn test_well_formed_event_maps_every_outcome() {
        let payload = json!([event(
            Some("g1"),
            "NBA",
            json!([{ "name": "Lakers", "price": -120 }, { "name": "Celtics", "price": 105 }])
        )]);

        let quotes = normalize(&payload, now());
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].market_key, "g1:draftkings:ML:Lakers");
        assert_eq!(quotes[0].price, -120);
        assert_eq!(quotes[0].league, "NBA");
        assert_eq!(quotes[0].market_type, MarketType::Moneyline);
        assert_eq!(quotes[1].market_key, "g1:draftkings:ML:Celtics");
        assert_eq!(quotes[1].price, 105);
        assert!(quotes.iter().all(|q| q.observed_at == now()));
    }

    #[test]
    fn test_event_missing_id_is_dropped() {
        let payload = json!([
            event(Some("g1"), "NBA", json!([{ "name": "Lakers", "price": -120 }])),
            event(None, "NBA", json!([{ "name": "Knicks", "price": 140 }])),
        ]);

        let (quotes, report) = normalize_with_report(&payload, now());
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].game_id, "g1");
        assert_eq!(report.skipped_events, 1);
    }

    #[test]
    fn test_unsupported_markets_skipped() {
        let payload = json!([{
            "id": "g1",
            "sport_title": "NFL",
            "bookmakers": [{
                "key": "fanduel",
                "markets": [
                    { "key": "spreads", "outcomes": [{ "name": "Bears", "price": -110, "point": 3.5 }] },
                    { "key": "totals", "outcomes": [{ "name": "Over", "price": -105, "point": 44.5 }] },
                    { "key": "h2h", "outcomes": [{ "name": "Bears", "price": 150 }] }
                ]
            }]
        }]);

        let (quotes, report) = normalize_with_report(&payload, now());
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].market_key, "g1:fanduel:ML:Bears");
        assert_eq!(report.unsupported_markets, 2);
    }

    #[test]
    fn test_bad_outcomes_dropped_individually() {
        let payload = json!([event(
            Some("g1"),
            "MLB",
            json!([
                { "name": "Yankees", "price": "abc" },
                { "price": -150 },
                { "name": "Mets", "price": null },
                { "name": "Red Sox", "price": "-135" },
                { "name": "Cubs", "price": 120.4 }
            ])
        )]);

        let (quotes, report) = normalize_with_report(&payload, now());
        let prices: Vec<(String, i32)> = quotes
            .iter()
            .map(|q| (q.outcome_side.clone().unwrap(), q.price))
            .collect();
        assert_eq!(
            prices,
            vec![("Red Sox".to_string(), -135), ("Cubs".to_string(), 120)]
        );
        assert_eq!(report.skipped_outcomes, 3);
    }

    #[test]
    fn test_missing_title_defaults_league() {
        let payload = json!([{
            "id": "g9",
            "bookmakers": [{ "key": "bovada", "markets": [{ "key": "h2h", "outcomes": [{ "name": "A", "price": 100 }] }] }]
        }]);
        let quotes = normalize(&payload, now());
        assert_eq!(quotes[0].league, UNKNOWN_LEAGUE);
    }

    #[test]
    fn test_bookmaker_without_key_skipped() {
        let payload = json!([{
            "id": "g1",
            "sport_title": "NHL",
            "bookmakers": [
                { "markets": [{ "key": "h2h", "outcomes": [{ "name": "A", "price": 100 }] }] },
                { "key": "", "markets": [] },
                { "key": "betmgm", "markets": [{ "key": "h2h", "outcomes": [{ "name": "A", "price": 110 }] }] }
            ]
        }]);
        let (quotes, report) = normalize_with_report(&payload, now());
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].book, "betmgm");
        assert_eq!(report.skipped_bookmakers, 2);
    }

    #[test]
    fn test_duplicate_keys_collapse_to_last() {
        let payload = json!([event(
            Some("g1"),
            "NBA",
            json!([
                { "name": "Lakers", "price": -120 },
                { "name": "Celtics", "price": 100 },
                { "name": "Lakers", "price": -125 }
            ])
        )]);

        let (quotes, report) = normalize_with_report(&payload, now());
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].market_key, "g1:draftkings:ML:Lakers");
        assert_eq!(quotes[0].price, -125);
        assert_eq!(report.duplicates, 1);
    }

    #[test]
    fn test_empty_and_malformed_payloads_yield_nothing() {
        assert!(normalize(&json!([]), now()).is_empty());
        assert!(normalize(&json!({ "message": "quota exceeded" }), now()).is_empty());
        assert!(normalize(&Value::Null, now()).is_empty());
        assert!(normalize(&json!([1, "x", { "id": "g1", "bookmakers": "nope" }]), now()).is_empty());
    }
}
