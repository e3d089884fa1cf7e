//! Mock weather provider for testing.
//!
//! This module provides a mock provider that can be used for unit and
//! integration testing without network access or an API key.
//!
//! The [`MockProvider`] implements the [`WeatherProvider`] trait, allowing it
//! to be used interchangeably with the real client in generic code.
//!
//! # Features
//!
//! - **Call counters**: Assert how often each gateway method was hit
//! - **Failure injection**: Fail a specific operation permanently or the next N current fetches
//! - **Latency simulation**: Delay every call to exercise timeouts and overlap
//! - **Queued readings**: Script a sequence of current observations

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};

use stratus_types::{Coordinates, ForecastItem, GeocodeMatch, Units, WeatherReading};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::WeatherProvider;

/// Gateway operation selector for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOperation {
    /// `fetch_current`
    Current,
    /// `fetch_forecast`
    Forecast,
    /// `fetch_history`
    History,
    /// `geocode`
    Geocode,
}

/// A scripted weather provider for testing.
///
/// Implements [`WeatherProvider`] for use in generic code and tests.
///
/// # Example
///
/// ```
/// use stratus_core::{MockOperation, MockProvider, ProviderError, WeatherProvider};
/// use stratus_types::{Coordinates, Units};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let provider = MockProvider::new();
/// let coords = Coordinates::new(48.85, 2.35).unwrap();
///
/// provider
///     .set_failure(MockOperation::Forecast, Some(ProviderError::RateLimited))
///     .await;
///
/// assert!(provider.fetch_current(coords, Units::Metric).await.is_ok());
/// assert!(provider.fetch_forecast(coords, Units::Metric).await.is_err());
/// assert_eq!(provider.total_calls(), 2);
/// # }
/// ```
pub struct MockProvider {
    configured: AtomicBool,
    current: RwLock<WeatherReading>,
    queued: Mutex<VecDeque<WeatherReading>>,
    forecast: RwLock<Vec<ForecastItem>>,
    history: RwLock<Vec<WeatherReading>>,
    places: RwLock<Vec<GeocodeMatch>>,
    current_calls: AtomicU32,
    forecast_calls: AtomicU32,
    history_calls: AtomicU32,
    geocode_calls: AtomicU32,
    current_failure: RwLock<Option<ProviderError>>,
    forecast_failure: RwLock<Option<ProviderError>>,
    history_failure: RwLock<Option<ProviderError>>,
    geocode_failure: RwLock<Option<ProviderError>>,
    /// Number of upcoming current fetches to fail before succeeding.
    remaining_failures: AtomicU32,
    /// Simulated latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
    active_current: AtomicU32,
    peak_current: AtomicU32,
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider")
            .field("configured", &self.configured.load(Ordering::Relaxed))
            .field("total_calls", &self.total_calls())
            .field("latency_ms", &self.latency_ms.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        MockProviderBuilder::new().build()
    }
}

impl MockProvider {
    /// Create a mock provider with default data.
    pub fn new() -> Self {
        Self::default()
    }

    /// A plausible observation of broken clouds at 18°C, stamped now.
    pub fn sample_reading() -> WeatherReading {
        WeatherReading {
            temperature: 18.0,
            feels_like: 17.4,
            temp_min: 16.2,
            temp_max: 19.8,
            pressure: 1014,
            humidity: 68,
            condition: "Clouds".to_string(),
            description: "broken clouds".to_string(),
            icon: "04d".to_string(),
            wind_speed: 4.1,
            wind_deg: Some(230),
            clouds: 75,
            visibility: Some(10_000),
            api_timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// `count` forecast samples three hours apart, starting three hours from now.
    pub fn sample_forecast(count: usize) -> Vec<ForecastItem> {
        let start = OffsetDateTime::now_utc();
        (0..count)
            .map(|i| {
                let step = time::Duration::hours(3 * (i as i64 + 1));
                ForecastItem {
                    forecast_at: start + step,
                    temperature: 17.0 + (i % 4) as f64,
                    feels_like: 16.5 + (i % 4) as f64,
                    temp_min: 15.0,
                    temp_max: 21.0,
                    pressure: 1013,
                    humidity: 70,
                    condition: "Clouds".to_string(),
                    description: "scattered clouds".to_string(),
                    icon: "03d".to_string(),
                    wind_speed: 3.5,
                    wind_deg: Some(220),
                    clouds: 40,
                    pop: 0.1,
                }
            })
            .collect()
    }

    fn default_places() -> Vec<GeocodeMatch> {
        let place = |name: &str, country: &str, latitude, longitude| GeocodeMatch {
            name: name.to_string(),
            country: country.to_string(),
            state: None,
            coordinates: Coordinates {
                latitude,
                longitude,
            },
        };
        vec![
            place("London", "GB", 51.5074, -0.1278),
            place("Paris", "FR", 48.8566, 2.3522),
            place("Tokyo", "JP", 35.6762, 139.6503),
            place("London", "CA", 42.9849, -81.2453),
        ]
    }

    async fn simulate(&self, op: MockOperation) -> ProviderResult<()> {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if op == MockOperation::Current && self.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(ProviderError::Unavailable("mock transient failure".to_string()));
        }

        match self.failure_slot(op).read().await.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn failure_slot(&self, op: MockOperation) -> &RwLock<Option<ProviderError>> {
        match op {
            MockOperation::Current => &self.current_failure,
            MockOperation::Forecast => &self.forecast_failure,
            MockOperation::History => &self.history_failure,
            MockOperation::Geocode => &self.geocode_failure,
        }
    }

    // --- Test control methods ---

    /// Set the reading returned once the queue is empty.
    pub async fn set_reading(&self, reading: WeatherReading) {
        *self.current.write().await = reading;
    }

    /// Queue a reading to be returned by the next current fetch.
    pub async fn push_reading(&self, reading: WeatherReading) {
        self.queued.lock().await.push_back(reading);
    }

    /// Set the forecast set.
    pub async fn set_forecast(&self, forecast: Vec<ForecastItem>) {
        *self.forecast.write().await = forecast;
    }

    /// Set the historical observations.
    pub async fn set_history(&self, history: Vec<WeatherReading>) {
        *self.history.write().await = history;
    }

    /// Replace the geocoding catalog.
    pub async fn set_places(&self, places: Vec<GeocodeMatch>) {
        *self.places.write().await = places;
    }

    /// Make one operation fail with `error`, or clear it with `None`.
    pub async fn set_failure(&self, op: MockOperation, error: Option<ProviderError>) {
        *self.failure_slot(op).write().await = error;
    }

    /// Fail the next `count` current fetches as unavailable, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Mark the provider as configured or not.
    pub fn set_configured(&self, configured: bool) {
        self.configured.store(configured, Ordering::Relaxed);
    }

    /// Set simulated latency for every call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of `fetch_current` calls.
    pub fn current_calls(&self) -> u32 {
        self.current_calls.load(Ordering::Relaxed)
    }

    /// Number of `fetch_forecast` calls.
    pub fn forecast_calls(&self) -> u32 {
        self.forecast_calls.load(Ordering::Relaxed)
    }

    /// Number of `fetch_history` calls.
    pub fn history_calls(&self) -> u32 {
        self.history_calls.load(Ordering::Relaxed)
    }

    /// Number of `geocode` calls.
    pub fn geocode_calls(&self) -> u32 {
        self.geocode_calls.load(Ordering::Relaxed)
    }

    /// Number of calls across all operations.
    pub fn total_calls(&self) -> u32 {
        self.current_calls() + self.forecast_calls() + self.history_calls() + self.geocode_calls()
    }

    /// Highest number of `fetch_current` calls that were running at once.
    pub fn peak_concurrent_current(&self) -> u32 {
        self.peak_current.load(Ordering::Relaxed)
    }

    /// Reset all call counters.
    pub fn reset_calls(&self) {
        for counter in [
            &self.current_calls,
            &self.forecast_calls,
            &self.history_calls,
            &self.geocode_calls,
            &self.peak_current,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl WeatherProvider for MockProvider {
    fn is_configured(&self) -> bool {
        self.configured.load(Ordering::Relaxed)
    }

    async fn fetch_current(
        &self,
        _coords: Coordinates,
        _units: Units,
    ) -> ProviderResult<WeatherReading> {
        self.current_calls.fetch_add(1, Ordering::Relaxed);
        let active = self.active_current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_current.fetch_max(active, Ordering::SeqCst);

        let result = self.simulate(MockOperation::Current).await;
        self.active_current.fetch_sub(1, Ordering::SeqCst);
        result?;

        if let Some(reading) = self.queued.lock().await.pop_front() {
            return Ok(reading);
        }
        Ok(self.current.read().await.clone())
    }

    async fn fetch_forecast(
        &self,
        _coords: Coordinates,
        _units: Units,
    ) -> ProviderResult<Vec<ForecastItem>> {
        self.forecast_calls.fetch_add(1, Ordering::Relaxed);
        self.simulate(MockOperation::Forecast).await?;
        Ok(self.forecast.read().await.clone())
    }

    async fn fetch_history(
        &self,
        _coords: Coordinates,
        days: u32,
        _units: Units,
    ) -> ProviderResult<Vec<WeatherReading>> {
        self.history_calls.fetch_add(1, Ordering::Relaxed);
        self.simulate(MockOperation::History).await?;
        Ok(self
            .history
            .read()
            .await
            .iter()
            .take(days as usize)
            .cloned()
            .collect())
    }

    async fn geocode(
        &self,
        name: &str,
        country: Option<&str>,
    ) -> ProviderResult<Vec<GeocodeMatch>> {
        self.geocode_calls.fetch_add(1, Ordering::Relaxed);
        self.simulate(MockOperation::Geocode).await?;

        let places = self.places.read().await;
        Ok(places
            .iter()
            .filter(|place| place.name.eq_ignore_ascii_case(name.trim()))
            .filter(|place| country.is_none_or(|c| place.country.eq_ignore_ascii_case(c.trim())))
            .cloned()
            .collect())
    }
}

/// Builder for creating mock providers with custom data.
#[derive(Debug)]
pub struct MockProviderBuilder {
    reading: WeatherReading,
    forecast: Vec<ForecastItem>,
    history: Vec<WeatherReading>,
    places: Vec<GeocodeMatch>,
    configured: bool,
    latency: Duration,
}

impl Default for MockProviderBuilder {
    fn default() -> Self {
        Self {
            reading: MockProvider::sample_reading(),
            forecast: MockProvider::sample_forecast(40),
            history: Vec::new(),
            places: MockProvider::default_places(),
            configured: true,
            latency: Duration::ZERO,
        }
    }
}

impl MockProviderBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current reading.
    #[must_use]
    pub fn reading(mut self, reading: WeatherReading) -> Self {
        self.reading = reading;
        self
    }

    /// Set the current temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.reading.temperature = temperature;
        self
    }

    /// Set the forecast set.
    #[must_use]
    pub fn forecast(mut self, forecast: Vec<ForecastItem>) -> Self {
        self.forecast = forecast;
        self
    }

    /// Set the historical observations.
    #[must_use]
    pub fn history(mut self, history: Vec<WeatherReading>) -> Self {
        self.history = history;
        self
    }

    /// Add a geocoding candidate.
    #[must_use]
    pub fn place(mut self, place: GeocodeMatch) -> Self {
        self.places.push(place);
        self
    }

    /// Set whether the provider reports itself configured.
    #[must_use]
    pub fn configured(mut self, configured: bool) -> Self {
        self.configured = configured;
        self
    }

    /// Set simulated latency for every call.
    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Build the mock provider.
    #[must_use]
    pub fn build(self) -> MockProvider {
        MockProvider {
            configured: AtomicBool::new(self.configured),
            current: RwLock::new(self.reading),
            queued: Mutex::new(VecDeque::new()),
            forecast: RwLock::new(self.forecast),
            history: RwLock::new(self.history),
            places: RwLock::new(self.places),
            current_calls: AtomicU32::new(0),
            forecast_calls: AtomicU32::new(0),
            history_calls: AtomicU32::new(0),
            geocode_calls: AtomicU32::new(0),
            current_failure: RwLock::new(None),
            forecast_failure: RwLock::new(None),
            history_failure: RwLock::new(None),
            geocode_failure: RwLock::new(None),
            remaining_failures: AtomicU32::new(0),
            latency_ms: AtomicU64::new(self.latency.as_millis() as u64),
            active_current: AtomicU32::new(0),
            peak_current: AtomicU32::new(0),
        }
    }
}
