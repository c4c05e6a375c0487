use chrono::{DateTime, Utc};
use tracing::debug;

use crate::criteria::{Location, SearchCriteria};
use crate::geo::Coordinates;
use crate::geolocation::{GeolocationError, GeolocationResolver, PositionSource};

pub const FIRST_STEP: u8 = 1;
pub const LAST_STEP: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    Start,
    End,
}

/// Search intent as it accumulates across the intake steps.
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeDraft {
    step: u8,
    pub query: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub location_text: String,
    pub coords: Option<Coordinates>,
    pub max_price: f64,
}

impl Default for IntakeDraft {
    fn default() -> Self {
        Self {
            step: FIRST_STEP,
            query: String::new(),
            start_date: None,
            end_date: None,
            location_text: String::new(),
            coords: None,
            max_price: 0.0,
        }
    }
}

impl IntakeDraft {
    pub fn step(&self) -> u8 {
        self.step
    }

    pub fn next_step(&mut self) {
        self.step = (self.step + 1).min(LAST_STEP);
    }

    pub fn prev_step(&mut self) {
        self.step = self.step.saturating_sub(1).max(FIRST_STEP);
    }

    pub fn set_date(&mut self, field: DateField, date: DateTime<Utc>) {
        match field {
            DateField::Start => self.start_date = Some(date),
            DateField::End => self.end_date = Some(date),
        }
    }

    /// Asks the platform for the current position. On failure the draft is
    /// left as it was so the location can still be typed in.
    pub async fn use_geolocation<P: PositionSource>(
        &mut self,
        resolver: &GeolocationResolver<P>,
    ) -> Result<Coordinates, GeolocationError> {
        let coords = resolver.get_current_position().await?;
        self.coords = Some(coords);
        self.location_text = format!("{:.4}, {:.4}", coords.lat, coords.lng);
        debug!(lat = coords.lat, lng = coords.lng, "draft located");
        Ok(coords)
    }

    /// `None` until both dates are chosen. Validity is left to the caller.
    pub fn submit(&self) -> Option<SearchCriteria> {
        let (start_date, end_date) = (self.start_date?, self.end_date?);
        let location = match self.coords {
            Some(coords) => Location::coords(coords.lat, coords.lng),
            None => Location::text(self.location_text.clone()),
        };
        Some(SearchCriteria {
            query: self.query.clone(),
            start_date,
            end_date,
            location,
            max_price: self.max_price,
        })
    }
}
