//! Core domain model for Mumbai Rent Compare.

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "mrc-core";

/// Columns every input dataset must carry.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "zone",
    "area",
    "region",
    "rent_median_1bhk",
    "rent_min_1bhk",
    "rent_max_1bhk",
    "deposit_ratio",
];

/// One area's rental summary as read from the dataset, after numeric coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ListingRecord {
    pub zone: String,
    pub area: String,
    pub region: String,
    pub rent_median_1bhk: Option<f64>,
    pub rent_min_1bhk: Option<f64>,
    pub rent_max_1bhk: Option<f64>,
    pub deposit_ratio: Option<String>,
}

/// A listing with every derived ranking field attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedListing {
    pub zone: String,
    pub area: String,
    pub region: String,
    pub rent_median_1bhk: Option<f64>,
    pub rent_min_1bhk: Option<f64>,
    pub rent_max_1bhk: Option<f64>,
    pub deposit_ratio: Option<String>,
    pub deposit_months_min: f64,
    pub proximity_score: u32,
    pub global_rank: Option<u32>,
    pub badge: Option<Badge>,
}

impl RankedListing {
    /// Tier label, or an empty string for unranked rows.
    pub fn badge_label(&self) -> &'static str {
        self.badge.map(Badge::label).unwrap_or("")
    }
}

/// Fixed price tiers derived from the dense global rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Badge {
    Budget,
    Value,
    Mid,
    #[serde(rename = "Upper Mid")]
    UpperMid,
    Premium,
    Luxury,
}

impl Badge {
    pub const ALL: [Badge; 6] = [
        Badge::Budget,
        Badge::Value,
        Badge::Mid,
        Badge::UpperMid,
        Badge::Premium,
        Badge::Luxury,
    ];

    /// Ranks 1-15 Budget, 16-25 Value, 26-40 Mid, 41-50 Upper Mid,
    /// 51-55 Premium, everything above Luxury.
    pub fn for_rank(rank: u32) -> Badge {
        match rank {
            0..=15 => Badge::Budget,
            16..=25 => Badge::Value,
            26..=40 => Badge::Mid,
            41..=50 => Badge::UpperMid,
            51..=55 => Badge::Premium,
            _ => Badge::Luxury,
        }
    }

    pub fn from_rank(rank: Option<u32>) -> Option<Badge> {
        rank.map(Badge::for_rank)
    }

    pub fn label(self) -> &'static str {
        match self {
            Badge::Budget => "Budget",
            Badge::Value => "Value",
            Badge::Mid => "Mid",
            Badge::UpperMid => "Upper Mid",
            Badge::Premium => "Premium",
            Badge::Luxury => "Luxury",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Badge::Budget => "🟢",
            Badge::Value => "🔵",
            Badge::Mid => "🟡",
            Badge::UpperMid => "🟠",
            Badge::Premium => "🔴",
            Badge::Luxury => "👑",
        }
    }

    /// Icon and label together, as shown in the dashboard legend.
    pub fn display(self) -> String {
        format!("{} {}", self.icon(), self.label())
    }
}
