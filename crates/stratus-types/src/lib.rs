//! Platform-agnostic types for cached weather data.
//!
//! This crate provides the shared vocabulary used by the storage layer
//! (stratus-store), the sync engine (stratus-core) and the HTTP service
//! (stratus-service). It performs no I/O.
//!
//! # Features
//!
//! - Locations, coordinates and geocoding matches
//! - Current readings and forecast samples
//! - Condition categories with severity ranking
//! - Sync outcome and error classifications
//! - Validation helpers for coordinates and sync intervals
//!
//! # Example
//!
//! ```
//! use stratus_types::{ConditionCategory, Coordinates, Units};
//!
//! let coords = Coordinates::new(48.8566, 2.3522).unwrap();
//! assert_eq!(coords.latitude, 48.8566);
//!
//! let units: Units = "imperial".parse().unwrap();
//! assert_eq!(units.as_str(), "imperial");
//!
//! assert!(ConditionCategory::Clear.is_abrupt_change(ConditionCategory::Thunderstorm));
//! ```

pub mod error;
pub mod types;

pub use error::{ValidationError, ValidationResult};
pub use types::{
    ConditionCategory, Coordinates, DEFAULT_SYNC_INTERVAL_SECS, ErrorKind, ForecastItem,
    GeocodeMatch, HistorySource, Location, MAX_SYNC_INTERVAL_SECS, MIN_SYNC_INTERVAL_SECS,
    SourcePreference, SyncKind, SyncStatus, Units, WeatherReading, validate_sync_interval,
};
