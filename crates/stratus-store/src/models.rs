//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use stratus_types::{
    Coordinates, ErrorKind, ForecastItem, SyncKind, SyncStatus, Units, WeatherReading,
};

/// Input for creating a tracked location.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocation {
    /// Resolved place name.
    pub name: String,
    /// ISO country code.
    pub country: String,
    /// Geocoded position.
    pub coordinates: Coordinates,
    /// Initial display label; defaults to `"{name}, {country}"` when `None`.
    pub display_name: Option<String>,
    /// Sync interval in seconds.
    pub sync_interval_secs: u32,
}

/// Partial update of a location's editable metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationUpdate {
    /// New display label.
    pub display_name: Option<String>,
    /// New favorite flag.
    pub is_favorite: Option<bool>,
    /// New sync interval in seconds.
    pub sync_interval_secs: Option<u32>,
}

impl LocationUpdate {
    /// Whether the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.is_favorite.is_none() && self.sync_interval_secs.is_none()
    }
}

/// A current-weather snapshot stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    /// Database row ID.
    pub id: i64,
    /// Owning location.
    pub location_id: i64,
    /// When the snapshot was written locally.
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    /// Unit system the observation was fetched in.
    pub units: Units,
    /// The observation itself.
    #[serde(flatten)]
    pub reading: WeatherReading,
}

impl StoredSnapshot {
    /// The observation expressed in `units`.
    pub fn reading_in(&self, units: Units) -> WeatherReading {
        self.reading.converted(self.units, units)
    }

    /// This snapshot re-expressed in `units`.
    pub fn into_units(self, units: Units) -> StoredSnapshot {
        if self.units == units {
            return self;
        }
        StoredSnapshot {
            reading: self.reading.converted(self.units, units),
            units,
            ..self
        }
    }
}

/// A forecast entry stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredForecast {
    /// Database row ID.
    pub id: i64,
    /// Owning location.
    pub location_id: i64,
    /// When the forecast set was fetched.
    #[serde(with = "time::serde::rfc3339")]
    pub fetched_at: OffsetDateTime,
    /// Unit system the forecast was fetched in.
    pub units: Units,
    /// The forecast sample.
    #[serde(flatten)]
    pub item: ForecastItem,
}

impl StoredForecast {
    /// The sample expressed in `units`.
    pub fn item_in(&self, units: Units) -> ForecastItem {
        self.item.converted(self.units, units)
    }
}

/// Input for a sync outcome row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutcome {
    /// Location the cycle ran for.
    pub location_id: i64,
    /// What the cycle fetched.
    pub kind: SyncKind,
    /// Terminal state.
    pub status: SyncStatus,
    /// Failure classification.
    pub error_kind: Option<ErrorKind>,
    /// Failure message.
    pub error_message: Option<String>,
    /// Advisory note attached to a successful cycle.
    pub note: Option<String>,
    /// When the cycle started.
    pub started_at: OffsetDateTime,
    /// When the cycle reached its terminal state.
    pub completed_at: OffsetDateTime,
}

impl NewOutcome {
    /// A successful outcome.
    pub fn success(
        location_id: i64,
        kind: SyncKind,
        note: Option<String>,
        started_at: OffsetDateTime,
        completed_at: OffsetDateTime,
    ) -> Self {
        Self {
            location_id,
            kind,
            status: SyncStatus::Success,
            error_kind: None,
            error_message: None,
            note,
            started_at,
            completed_at,
        }
    }

    /// A failed outcome with its classification.
    pub fn failure(
        location_id: i64,
        kind: SyncKind,
        error_kind: ErrorKind,
        error_message: impl Into<String>,
        started_at: OffsetDateTime,
        completed_at: OffsetDateTime,
    ) -> Self {
        Self {
            location_id,
            kind,
            status: SyncStatus::Failed,
            error_kind: Some(error_kind),
            error_message: Some(error_message.into()),
            note: None,
            started_at,
            completed_at,
        }
    }
}

/// A sync outcome stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOutcome {
    /// Database row ID.
    pub id: i64,
    /// Location the cycle ran for.
    pub location_id: i64,
    /// What the cycle fetched.
    pub kind: SyncKind,
    /// Terminal state.
    pub status: SyncStatus,
    /// Failure classification.
    pub error_kind: Option<ErrorKind>,
    /// Failure message.
    pub error_message: Option<String>,
    /// Advisory note.
    pub note: Option<String>,
    /// When the cycle started.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// When the cycle reached its terminal state.
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

/// A global preference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPreference {
    /// Preference key.
    pub key: String,
    /// Raw value.
    pub value: String,
    /// Last change.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Everything a successful sync cycle writes, committed as one transaction.
#[derive(Debug, Clone)]
pub struct SyncCommit<'a> {
    /// Location the cycle ran for.
    pub location_id: i64,
    /// New current-weather observation.
    pub reading: &'a WeatherReading,
    /// Unit system the reading and forecast were fetched in.
    pub units: Units,
    /// Replacement forecast set; `None` keeps the existing set.
    pub forecast: Option<&'a [ForecastItem]>,
    /// Outcome row for the cycle.
    pub outcome: &'a NewOutcome,
}

/// Column names of the snapshot CSV export.
pub(crate) const SNAPSHOT_CSV_HEADER: [&str; 16] = [
    "location_id",
    "api_timestamp",
    "captured_at",
    "units",
    "temperature",
    "feels_like",
    "temp_min",
    "temp_max",
    "pressure",
    "humidity",
    "weather_main",
    "weather_description",
    "wind_speed",
    "wind_deg",
    "clouds",
    "visibility",
];

/// Flat CSV row for snapshot exports.
#[derive(Debug, Serialize)]
pub(crate) struct SnapshotCsvRow<'a> {
    pub location_id: i64,
    pub api_timestamp: String,
    pub captured_at: String,
    pub units: &'static str,
    pub temperature: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub pressure: u32,
    pub humidity: u8,
    pub weather_main: &'a str,
    pub weather_description: &'a str,
    pub wind_speed: f64,
    pub wind_deg: Option<u16>,
    pub clouds: u8,
    pub visibility: Option<u32>,
}
