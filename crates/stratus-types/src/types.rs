//! Core types for cached weather data.

use core::fmt;
use core::str::FromStr;
use core::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{ValidationError, ValidationResult};

/// Default per-location sync interval in seconds.
pub const DEFAULT_SYNC_INTERVAL_SECS: u32 = 600;
/// Minimum per-location sync interval in seconds.
pub const MIN_SYNC_INTERVAL_SECS: u32 = 60;
/// Maximum per-location sync interval in seconds (one day).
pub const MAX_SYNC_INTERVAL_SECS: u32 = 86_400;

/// Check a sync interval against the allowed bounds.
///
/// # Examples
///
/// ```
/// use stratus_types::validate_sync_interval;
///
/// assert_eq!(validate_sync_interval(600).unwrap(), 600);
/// assert!(validate_sync_interval(59).is_err());
/// ```
pub fn validate_sync_interval(secs: i64) -> ValidationResult<u32> {
    let min = i64::from(MIN_SYNC_INTERVAL_SECS);
    let max = i64::from(MAX_SYNC_INTERVAL_SECS);
    if (min..=max).contains(&secs) {
        // In range, so the cast cannot truncate.
        Ok(secs as u32)
    } else {
        Err(ValidationError::InvalidInterval {
            value: secs,
            min: MIN_SYNC_INTERVAL_SECS,
            max: MAX_SYNC_INTERVAL_SECS,
        })
    }
}

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coordinates {
    /// Latitude, -90 to 90.
    pub latitude: f64,
    /// Longitude, -180 to 180.
    pub longitude: f64,
}

impl Coordinates {
    /// Create validated coordinates.
    ///
    /// # Examples
    ///
    /// ```
    /// use stratus_types::Coordinates;
    ///
    /// assert!(Coordinates::new(51.5074, -0.1278).is_ok());
    /// assert!(Coordinates::new(91.0, 0.0).is_err());
    /// ```
    pub fn new(latitude: f64, longitude: f64) -> ValidationResult<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        if valid {
            Ok(Self {
                latitude,
                longitude,
            })
        } else {
            Err(ValidationError::InvalidCoordinates {
                latitude,
                longitude,
            })
        }
    }
}

/// Measurement system used for provider requests and stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Units {
    /// Celsius, metres per second.
    #[default]
    Metric,
    /// Fahrenheit, miles per hour.
    Imperial,
    /// Kelvin, metres per second.
    Standard,
}

impl Units {
    /// The provider's query value for this unit system.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
            Units::Standard => "standard",
        }
    }

    /// Size of one Celsius degree expressed in this unit system.
    ///
    /// Used to scale temperature thresholds that are configured in Celsius.
    #[must_use]
    pub fn degree_scale(&self) -> f64 {
        match self {
            Units::Metric | Units::Standard => 1.0,
            Units::Imperial => 1.8,
        }
    }

    /// Short temperature suffix for human-readable notes.
    #[must_use]
    pub fn temperature_suffix(&self) -> &'static str {
        match self {
            Units::Metric => "°C",
            Units::Imperial => "°F",
            Units::Standard => "K",
        }
    }

    /// Short wind speed suffix for human-readable notes.
    #[must_use]
    pub fn wind_suffix(&self) -> &'static str {
        match self {
            Units::Imperial => "mph",
            Units::Metric | Units::Standard => "m/s",
        }
    }

    /// Convert a temperature in this unit system to Celsius.
    ///
    /// # Examples
    ///
    /// ```
    /// use stratus_types::Units;
    ///
    /// assert_eq!(Units::Metric.to_celsius(21.0), 21.0);
    /// assert!((Units::Imperial.to_celsius(212.0) - 100.0).abs() < 1e-9);
    /// assert!((Units::Standard.to_celsius(273.15)).abs() < 1e-9);
    /// ```
    #[must_use]
    pub fn to_celsius(&self, value: f64) -> f64 {
        match self {
            Units::Metric => value,
            Units::Imperial => (value - 32.0) / 1.8,
            Units::Standard => value - 273.15,
        }
    }

    /// Convert a wind speed in this unit system to metres per second.
    #[must_use]
    pub fn to_metres_per_second(&self, value: f64) -> f64 {
        match self {
            Units::Imperial => value * 0.447_04,
            Units::Metric | Units::Standard => value,
        }
    }

    /// Convert a temperature in Celsius to this unit system.
    #[must_use]
    pub fn from_celsius(&self, value: f64) -> f64 {
        match self {
            Units::Metric => value,
            Units::Imperial => value * 1.8 + 32.0,
            Units::Standard => value + 273.15,
        }
    }

    /// Re-express a temperature in this unit system in `to`.
    ///
    /// # Examples
    ///
    /// ```
    /// use stratus_types::Units;
    ///
    /// assert!((Units::Metric.convert_temperature(18.0, Units::Imperial) - 64.4).abs() < 1e-9);
    /// assert_eq!(Units::Imperial.convert_temperature(70.0, Units::Imperial), 70.0);
    /// ```
    #[must_use]
    pub fn convert_temperature(&self, value: f64, to: Units) -> f64 {
        if *self == to {
            return value;
        }
        to.from_celsius(self.to_celsius(value))
    }

    /// Re-express a wind speed in this unit system in `to`.
    #[must_use]
    pub fn convert_wind_speed(&self, value: f64, to: Units) -> f64 {
        if self.wind_suffix() == to.wind_suffix() {
            return value;
        }
        match to {
            Units::Imperial => self.to_metres_per_second(value) / 0.447_04,
            Units::Metric | Units::Standard => self.to_metres_per_second(value),
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            "standard" => Ok(Units::Standard),
            other => Err(ValidationError::invalid(
                "units",
                format!("'{other}' is not one of metric, imperial, standard"),
            )),
        }
    }
}

/// Coarse weather condition grouping used for conflict detection.
///
/// Derived from the provider's condition group (`weather_main`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ConditionCategory {
    /// Clear sky.
    Clear,
    /// Any cloud cover.
    Clouds,
    /// Mist, fog, haze, smoke, dust and similar.
    Atmosphere,
    /// Light drizzle.
    Drizzle,
    /// Rain.
    Rain,
    /// Snow or sleet.
    Snow,
    /// Thunderstorm.
    Thunderstorm,
    /// Squalls and tornadoes.
    Extreme,
    /// Unrecognised condition group.
    Unknown,
}

impl ConditionCategory {
    /// Classify a provider condition group such as `"Clear"` or `"Thunderstorm"`.
    ///
    /// # Examples
    ///
    /// ```
    /// use stratus_types::ConditionCategory;
    ///
    /// assert_eq!(ConditionCategory::from_main("Clear"), ConditionCategory::Clear);
    /// assert_eq!(ConditionCategory::from_main("thunderstorm"), ConditionCategory::Thunderstorm);
    /// assert_eq!(ConditionCategory::from_main("Haze"), ConditionCategory::Atmosphere);
    /// ```
    #[must_use]
    pub fn from_main(main: &str) -> Self {
        match main.trim().to_ascii_lowercase().as_str() {
            "clear" => Self::Clear,
            "clouds" => Self::Clouds,
            "mist" | "smoke" | "haze" | "dust" | "fog" | "sand" | "ash" => Self::Atmosphere,
            "drizzle" => Self::Drizzle,
            "rain" => Self::Rain,
            "snow" => Self::Snow,
            "thunderstorm" => Self::Thunderstorm,
            "squall" | "tornado" => Self::Extreme,
            _ => Self::Unknown,
        }
    }

    /// Severity rank: 0 calm, 1 overcast/obscured, 2 precipitation, 3 severe.
    ///
    /// Unknown conditions rank as `None` and never take part in conflict checks.
    #[must_use]
    pub fn severity(&self) -> Option<u8> {
        match self {
            Self::Clear => Some(0),
            Self::Clouds | Self::Atmosphere => Some(1),
            Self::Drizzle | Self::Rain | Self::Snow => Some(2),
            Self::Thunderstorm | Self::Extreme => Some(3),
            Self::Unknown => None,
        }
    }

    /// Whether this category is convective or otherwise dangerous.
    #[must_use]
    pub fn is_severe(&self) -> bool {
        matches!(self, Self::Thunderstorm | Self::Extreme)
    }

    /// Whether moving from `self` to `next` is an abrupt shift.
    ///
    /// A shift is abrupt when it spans at least two severity ranks and one
    /// side is severe (for example clear to thunderstorm).
    ///
    /// # Examples
    ///
    /// ```
    /// use stratus_types::ConditionCategory::*;
    ///
    /// assert!(Clear.is_abrupt_change(Thunderstorm));
    /// assert!(Extreme.is_abrupt_change(Clouds));
    /// assert!(!Rain.is_abrupt_change(Thunderstorm));
    /// assert!(!Clear.is_abrupt_change(Rain));
    /// ```
    #[must_use]
    pub fn is_abrupt_change(&self, next: Self) -> bool {
        match (self.severity(), next.severity()) {
            (Some(a), Some(b)) => a.abs_diff(b) >= 2 && (self.is_severe() || next.is_severe()),
            _ => false,
        }
    }
}

impl fmt::Display for ConditionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Clear => "clear",
            Self::Clouds => "clouds",
            Self::Atmosphere => "atmosphere",
            Self::Drizzle => "drizzle",
            Self::Rain => "rain",
            Self::Snow => "snow",
            Self::Thunderstorm => "thunderstorm",
            Self::Extreme => "extreme",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A single observation of current conditions as returned by the provider.
///
/// Values are in the unit system that was active when the observation was
/// fetched.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WeatherReading {
    /// Air temperature.
    pub temperature: f64,
    /// Perceived temperature.
    pub feels_like: f64,
    /// Minimum temperature observed in the area.
    pub temp_min: f64,
    /// Maximum temperature observed in the area.
    pub temp_max: f64,
    /// Sea-level pressure in hPa.
    pub pressure: u32,
    /// Relative humidity percentage.
    pub humidity: u8,
    /// Provider condition group (e.g. "Clouds").
    pub condition: String,
    /// Provider condition description (e.g. "broken clouds").
    pub description: String,
    /// Provider icon code.
    pub icon: String,
    /// Wind speed.
    pub wind_speed: f64,
    /// Wind direction in degrees.
    pub wind_deg: Option<u16>,
    /// Cloud cover percentage.
    pub clouds: u8,
    /// Visibility in metres.
    pub visibility: Option<u32>,
    /// When the provider made the observation.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub api_timestamp: OffsetDateTime,
}

impl WeatherReading {
    /// Condition category of this observation.
    #[must_use]
    pub fn category(&self) -> ConditionCategory {
        ConditionCategory::from_main(&self.condition)
    }

    /// This observation, recorded in `from`, re-expressed in `to`.
    ///
    /// Only temperatures and wind speed depend on the unit system.
    #[must_use]
    pub fn converted(&self, from: Units, to: Units) -> WeatherReading {
        WeatherReading {
            temperature: from.convert_temperature(self.temperature, to),
            feels_like: from.convert_temperature(self.feels_like, to),
            temp_min: from.convert_temperature(self.temp_min, to),
            temp_max: from.convert_temperature(self.temp_max, to),
            wind_speed: from.convert_wind_speed(self.wind_speed, to),
            ..self.clone()
        }
    }
}

/// One forecast sample for a future point in time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ForecastItem {
    /// Time the forecast applies to.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub forecast_at: OffsetDateTime,
    /// Air temperature.
    pub temperature: f64,
    /// Perceived temperature.
    pub feels_like: f64,
    /// Minimum temperature.
    pub temp_min: f64,
    /// Maximum temperature.
    pub temp_max: f64,
    /// Sea-level pressure in hPa.
    pub pressure: u32,
    /// Relative humidity percentage.
    pub humidity: u8,
    /// Provider condition group.
    pub condition: String,
    /// Provider condition description.
    pub description: String,
    /// Provider icon code.
    pub icon: String,
    /// Wind speed.
    pub wind_speed: f64,
    /// Wind direction in degrees.
    pub wind_deg: Option<u16>,
    /// Cloud cover percentage.
    pub clouds: u8,
    /// Probability of precipitation, 0.0 to 1.0.
    pub pop: f64,
}

impl ForecastItem {
    /// Condition category of this sample.
    #[must_use]
    pub fn category(&self) -> ConditionCategory {
        ConditionCategory::from_main(&self.condition)
    }

    /// This sample, recorded in `from`, re-expressed in `to`.
    #[must_use]
    pub fn converted(&self, from: Units, to: Units) -> ForecastItem {
        ForecastItem {
            temperature: from.convert_temperature(self.temperature, to),
            feels_like: from.convert_temperature(self.feels_like, to),
            temp_min: from.convert_temperature(self.temp_min, to),
            temp_max: from.convert_temperature(self.temp_max, to),
            wind_speed: from.convert_wind_speed(self.wind_speed, to),
            ..self.clone()
        }
    }
}

/// A geocoding candidate for a place name.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeocodeMatch {
    /// Resolved place name.
    pub name: String,
    /// ISO country code.
    pub country: String,
    /// State or region, when the provider reports one.
    pub state: Option<String>,
    /// Resolved position.
    pub coordinates: Coordinates,
}

/// A tracked location.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Location {
    /// Database identifier.
    pub id: i64,
    /// Resolved place name.
    pub name: String,
    /// ISO country code.
    pub country: String,
    /// Position, fixed once geocoded.
    pub coordinates: Coordinates,
    /// User-editable label.
    pub display_name: String,
    /// Whether the user pinned this location.
    pub is_favorite: bool,
    /// Minimum age of cached data before a non-forced sync refetches.
    pub sync_interval_secs: u32,
    /// Creation time.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub created_at: OffsetDateTime,
    /// Last metadata update.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub updated_at: OffsetDateTime,
}

impl Location {
    /// The configured sync interval as a [`Duration`].
    #[must_use]
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.sync_interval_secs))
    }
}

/// What a sync cycle fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SyncKind {
    /// Current conditions only (forecast degraded).
    Current,
    /// Forecast only.
    Forecast,
    /// Current conditions and forecast.
    Combined,
}

impl SyncKind {
    /// Stable string form used in storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncKind::Current => "current",
            SyncKind::Forecast => "forecast",
            SyncKind::Combined => "combined",
        }
    }

    /// Parse the storage form, returning `None` for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "current" => Some(SyncKind::Current),
            "forecast" => Some(SyncKind::Forecast),
            "combined" => Some(SyncKind::Combined),
            _ => None,
        }
    }
}

/// Terminal state of a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SyncStatus {
    /// The cycle reached `Done`.
    Success,
    /// The cycle reached `Failed`.
    Failed,
}

impl SyncStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
        }
    }

    /// Parse the storage form, returning `None` for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(SyncStatus::Success),
            "failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }
}

/// Stable error classification shared by the engine, the outcome log and
/// HTTP responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ErrorKind {
    /// Unknown location or unresolvable place name.
    NotFound,
    /// Inbound or outbound rate limit hit.
    RateLimited,
    /// Network failure, timeout or provider 5xx.
    ProviderUnavailable,
    /// Provider returned a malformed payload.
    InvalidResponse,
    /// A forced sync collided with an in-flight cycle.
    SyncInProgress,
    /// Malformed input.
    Validation,
    /// Local database failure.
    Storage,
}

impl ErrorKind {
    /// Stable string form used in storage and responses.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ProviderUnavailable => "provider_unavailable",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::SyncInProgress => "sync_in_progress",
            ErrorKind::Validation => "validation",
            ErrorKind::Storage => "storage",
        }
    }

    /// Parse the storage form, returning `None` for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_found" => Some(ErrorKind::NotFound),
            "rate_limited" => Some(ErrorKind::RateLimited),
            "provider_unavailable" => Some(ErrorKind::ProviderUnavailable),
            "invalid_response" => Some(ErrorKind::InvalidResponse),
            "sync_in_progress" => Some(ErrorKind::SyncInProgress),
            "validation" => Some(ErrorKind::Validation),
            "storage" => Some(ErrorKind::Storage),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which source served a history response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum HistorySource {
    /// The provider's historical endpoint.
    Api,
    /// Locally stored snapshots.
    Local,
}

impl HistorySource {
    /// Label used in the `X-History-Source` header.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HistorySource::Api => "api",
            HistorySource::Local => "local",
        }
    }
}

impl fmt::Display for HistorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller preference for history reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SourcePreference {
    /// Provider first, local snapshots as fallback.
    #[default]
    Auto,
    /// Provider only; failures propagate.
    Api,
    /// Local snapshots only.
    Local,
}

impl FromStr for SourcePreference {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SourcePreference::Auto),
            "api" => Ok(SourcePreference::Api),
            "local" => Ok(SourcePreference::Local),
            other => Err(ValidationError::invalid(
                "source",
                format!("'{other}' is not one of auto, api, local"),
            )),
        }
    }
}
