use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Venue {
    pub id: String, // venue-<slug> unless the backend supplies one
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PriceTier {
    pub name: String,
    pub min_price: f64,
    pub max_price: f64,
    pub currency: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub date: DateTime<Utc>,
    pub venue: Venue,
    pub lowest_price: f64,
    pub highest_price: f64,
    /// Miles from the search reference point, one decimal.
    pub distance: f64,
    pub vendor_source: String,
    pub vendor_url: String,
    pub price_tiers: Vec<PriceTier>,
}

impl Event {
    pub fn headline(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.artist
        } else {
            &self.title
        }
    }
}

/// Cheapest first, nearest among equal prices. Stable; the input is left alone.
pub fn rank(events: &[Event]) -> Vec<Event> {
    let mut ranked = events.to_vec();
    ranked.sort_by(|a, b| {
        unsigned_zero(a.lowest_price)
            .total_cmp(&unsigned_zero(b.lowest_price))
            .then_with(|| unsigned_zero(a.distance).total_cmp(&unsigned_zero(b.distance)))
    });
    ranked
}

// `total_cmp` orders -0.0 before 0.0; they must compare equal here.
fn unsigned_zero(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}
