use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::backend::{BackendEventRecord, BackendPriceTier};
use crate::geo::Coordinates;
use crate::models::{Event, PriceTier, Venue};
use crate::utils;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdaptError {
    #[error("invalid date {value:?} for event {event}")]
    InvalidDate { event: String, value: String },
}

/// Maps backend records onto [`Event`]s, measuring distance from one reference point.
#[derive(Debug, Clone, Copy)]
pub struct EventAdapter {
    reference: Coordinates,
    timezone: Tz,
}

impl EventAdapter {
    pub fn new(reference: Coordinates, timezone: Tz) -> Self {
        Self {
            reference,
            timezone,
        }
    }

    pub fn adapt(&self, record: &BackendEventRecord) -> Result<Event, AdaptError> {
        let date = parse_event_date(&record.date, self.timezone).ok_or_else(|| {
            AdaptError::InvalidDate {
                event: record.id.clone(),
                value: record.date.clone(),
            }
        })?;

        let venue = Venue {
            id: venue_id(&record.venue_name),
            name: record.venue_name.clone(),
            address: record.location.clone(),
            lat: record.latitude,
            lng: record.longitude,
        };

        let raw_distance = self
            .reference
            .distance_to(&Coordinates::new(venue.lat, venue.lng));

        let id = if record.id.trim().is_empty() {
            stable_event_id(&venue.id, &date, &record.artist)
        } else {
            record.id.clone()
        };

        Ok(Event {
            id,
            title: record.name.clone(),
            artist: record.artist.clone(),
            date,
            venue,
            lowest_price: record.min_price,
            highest_price: record.max_price,
            distance: round_tenths(raw_distance),
            vendor_source: record.vendor.clone(),
            vendor_url: record.vendor_url.clone(),
            price_tiers: record.price_tiers.iter().map(price_tier).collect(),
        })
    }

    /// One event per record, in order. The first bad record fails the batch.
    pub fn adapt_all(&self, records: &[BackendEventRecord]) -> Result<Vec<Event>, AdaptError> {
        records.iter().map(|record| self.adapt(record)).collect()
    }
}

pub fn venue_id(venue_name: &str) -> String {
    format!("venue-{}", utils::slugify(venue_name))
}

fn round_tenths(miles: f64) -> f64 {
    (miles * 10.0).round() / 10.0
}

fn price_tier(tier: &BackendPriceTier) -> PriceTier {
    PriceTier {
        name: tier.name.clone(),
        min_price: tier.min_price,
        max_price: tier.max_price,
        currency: tier.currency.clone(),
    }
}

fn stable_event_id(venue_id: &str, date: &DateTime<Utc>, artist: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(venue_id.as_bytes());
    hasher.update(b"|");
    hasher.update(date.to_rfc3339().as_bytes());
    hasher.update(b"|");
    hasher.update(artist.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// RFC 3339, then an offset-less timestamp in `tz`, then a bare date at midnight in `tz`.
pub fn parse_event_date(raw: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;

    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}
