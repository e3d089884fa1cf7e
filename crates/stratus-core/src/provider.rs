//! Provider gateway abstraction.
//!
//! This module provides the [`WeatherProvider`] trait that abstracts over
//! the OpenWeatherMap HTTP client and the in-memory mock used in tests.

use async_trait::async_trait;

use stratus_types::{Coordinates, ForecastItem, GeocodeMatch, Units, WeatherReading};

use crate::error::ProviderResult;

/// Typed gateway to an external weather and geocoding provider.
///
/// Implementations classify every failure as a
/// [`ProviderError`](crate::ProviderError) and never retry internally.
///
/// # Example
///
/// ```
/// use stratus_core::{MockProvider, WeatherProvider};
/// use stratus_types::{Coordinates, Units};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let provider = MockProvider::new();
/// let coords = Coordinates::new(51.5074, -0.1278).unwrap();
///
/// let reading = provider.fetch_current(coords, Units::Metric).await.unwrap();
/// println!("{} {}", reading.temperature, reading.description);
/// # }
/// ```
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Whether credentials for the provider are present.
    fn is_configured(&self) -> bool;

    /// Fetch current conditions at a position.
    async fn fetch_current(
        &self,
        coords: Coordinates,
        units: Units,
    ) -> ProviderResult<WeatherReading>;

    /// Fetch the multi-day forecast at a position, earliest first.
    async fn fetch_forecast(
        &self,
        coords: Coordinates,
        units: Units,
    ) -> ProviderResult<Vec<ForecastItem>>;

    /// Fetch one historical observation per day for the previous `days` days.
    ///
    /// Implementations may issue one upstream request per day, so callers
    /// charge `days` requests against their outbound budget. An empty result
    /// is not an error.
    async fn fetch_history(
        &self,
        coords: Coordinates,
        days: u32,
        units: Units,
    ) -> ProviderResult<Vec<WeatherReading>>;

    /// Resolve a place name, optionally restricted to a country.
    ///
    /// Returns candidates best first; an empty list means nothing matched.
    async fn geocode(&self, name: &str, country: Option<&str>)
    -> ProviderResult<Vec<GeocodeMatch>>;
}
