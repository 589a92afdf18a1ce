//! Market type taxonomy for sportsbook quotes
//!
//! Closed set of bettable propositions. Only moneyline has a normalizer
//! branch today; spread and total exist so that adding them is a matter of
//! extending the vendor mapping, not reshaping records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bettable proposition kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketType {
    /// Head-to-head winner
    #[serde(rename = "ML")]
    Moneyline,
    /// Point spread
    #[serde(rename = "SPREAD")]
    Spread,
    /// Over/under
    #[serde(rename = "TOTAL")]
    Total,
}

impl MarketType {
    /// Short code used inside market keys and persisted rows
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Moneyline => "ML",
            Self::Spread => "SPREAD",
            Self::Total => "TOTAL",
        }
    }

    /// Map a vendor market key to a supported market type.
    ///
    /// Returns `None` for anything outside the supported set, including
    /// vendor keys for spread and total markets until those are mapped.
    pub fn from_vendor_key(key: &str) -> Option<Self> {
        match key {
            "h2h" => Some(Self::Moneyline),
            _ => None,
        }
    }

    /// Whether quotes of this type carry an outcome side
    pub fn has_outcome_side(&self) -> bool {
        !matches!(self, Self::Total)
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Error returned when a market type code is not recognized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown market type: {0}")]
pub struct UnknownMarketType(pub String);

impl FromStr for MarketType {
    type Err = UnknownMarketType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ML" | "MONEYLINE" => Ok(Self::Moneyline),
            "SPREAD" => Ok(Self::Spread),
            "TOTAL" => Ok(Self::Total),
            _ => Err(UnknownMarketType(s.to_string())),
        }
    }
}
