use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::Coordinates;

/// Reference point used for distances when the location is free text.
pub const FALLBACK_REFERENCE: Coordinates = Coordinates::new(40.7128, -74.0060);

const DEFAULT_WINDOW_DAYS: i64 = 30;
const DEFAULT_MAX_PRICE: f64 = 500.0;

#[derive(Debug, Error, PartialEq)]
pub enum CriteriaError {
    #[error("No search criteria provided")]
    Missing,
    #[error("invalid {field}: {value}")]
    InvalidParam { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Location {
    Text { value: String },
    Coords { lat: f64, lng: f64 },
}

impl Location {
    pub fn text(value: impl Into<String>) -> Self {
        Location::Text {
            value: value.into(),
        }
    }

    pub fn coords(lat: f64, lng: f64) -> Self {
        Location::Coords { lat, lng }
    }

    /// Coordinates to measure distance from, and the text sent to the backend.
    pub fn reference(&self) -> ReferenceLocation {
        match self {
            Location::Coords { lat, lng } => ReferenceLocation {
                coords: Coordinates::new(*lat, *lng),
                text: format!("{lat}, {lng}"),
            },
            Location::Text { value } => ReferenceLocation {
                coords: FALLBACK_REFERENCE,
                text: value.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceLocation {
    pub coords: Coordinates,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCriteria {
    pub query: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub location: Location,
    pub max_price: f64,
}

impl SearchCriteria {
    pub fn is_valid(&self) -> bool {
        if self.query.trim().is_empty() {
            return false;
        }
        if self.end_date < self.start_date {
            return false;
        }
        if self.max_price.is_nan() || self.max_price <= 0.0 {
            return false;
        }
        match &self.location {
            Location::Text { value } => !value.trim().is_empty(),
            Location::Coords { .. } => true,
        }
    }
}

/// Raw query parameters of a results URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParams {
    pub query: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub max_price: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
}

impl SearchParams {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = SearchParams::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "query" => &mut params.query,
                "location" => &mut params.location,
                "startDate" => &mut params.start_date,
                "endDate" => &mut params.end_date,
                "maxPrice" => &mut params.max_price,
                "lat" => &mut params.lat,
                "lng" => &mut params.lng,
                _ => continue,
            };
            *slot = Some(value.into());
        }
        params
    }

    pub fn from_url(url: &reqwest::Url) -> Self {
        Self::from_pairs(url.query_pairs())
    }

    /// Builds criteria, filling absent dates and budget relative to `now`.
    pub fn into_criteria(self, now: DateTime<Utc>) -> Result<SearchCriteria, CriteriaError> {
        let query = present(self.query).ok_or(CriteriaError::Missing)?;
        let location_text = present(self.location).ok_or(CriteriaError::Missing)?;

        let start_date = match present(self.start_date) {
            Some(raw) => parse_param_date("startDate", &raw)?,
            None => now,
        };
        let end_date = match present(self.end_date) {
            Some(raw) => parse_param_date("endDate", &raw)?,
            None => now + Duration::days(DEFAULT_WINDOW_DAYS),
        };
        let max_price = match present(self.max_price) {
            Some(raw) => parse_param_number("maxPrice", &raw)?,
            None => DEFAULT_MAX_PRICE,
        };

        let location = match (present(self.lat), present(self.lng)) {
            (Some(lat), Some(lng)) => Location::coords(
                parse_param_number("lat", &lat)?,
                parse_param_number("lng", &lng)?,
            ),
            _ => Location::text(location_text),
        };

        Ok(SearchCriteria {
            query,
            start_date,
            end_date,
            location,
            max_price,
        })
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_param_date(field: &'static str, raw: &str) -> Result<DateTime<Utc>, CriteriaError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| CriteriaError::InvalidParam {
            field,
            value: raw.to_string(),
        })
}

fn parse_param_number(field: &'static str, raw: &str) -> Result<f64, CriteriaError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| CriteriaError::InvalidParam {
            field,
            value: raw.to_string(),
        })
}
