//! Ticket search client core.
//!
//! Search intent ([`criteria::SearchCriteria`]) goes to a remote search
//! backend; the returned records are adapted into [`models::Event`]s with a
//! distance from the reference location and ranked cheapest-then-nearest.

pub mod adapter;
pub mod backend;
pub mod config;
pub mod criteria;
pub mod geo;
pub mod geolocation;
pub mod handoff;
pub mod intake;
pub mod models;
pub mod search;
mod utils;

pub use adapter::{AdaptError, EventAdapter};
pub use backend::{BackendApi, BackendError, SearchBackend};
pub use config::{AppConfig, ConfigError, ConfigStore};
pub use criteria::{CriteriaError, Location, SearchCriteria, SearchParams};
pub use geo::{distance_miles, Coordinates};
pub use geolocation::{
    GeolocationError, GeolocationErrorKind, GeolocationResolver, GeolocationResult, PositionSource,
};
pub use handoff::{
    load_criteria, remember_criteria, save_criteria, MemoryScratch, ScratchStore, SqliteScratch,
};
pub use intake::IntakeDraft;
pub use models::{rank, Event, Venue};
pub use search::{SearchError, SearchOrchestrator, SearchSnapshot, SearchStatus};
