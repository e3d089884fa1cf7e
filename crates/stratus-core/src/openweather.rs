//! OpenWeatherMap HTTP client.
//!
//! Implements [`WeatherProvider`] against the OpenWeatherMap REST API:
//!
//! - current conditions: `{base_url}/weather`
//! - 5-day / 3-hour forecast: `{base_url}/forecast`
//! - geocoding: `{geo_url}/direct`
//! - history: `{history_url}/onecall/timemachine`, one request per day at 12:00 UTC
//!
//! Every failure is classified into a [`ProviderError`]; nothing is retried.
//!
//! # Example
//!
//! ```no_run
//! use stratus_core::{OpenWeatherClient, OpenWeatherConfig, WeatherProvider};
//! use stratus_types::{Coordinates, Units};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OpenWeatherClient::new(OpenWeatherConfig::new("my-api-key"))?;
//! let coords = Coordinates::new(51.5074, -0.1278)?;
//!
//! let reading = client.fetch_current(coords, Units::Metric).await?;
//! println!("{}°C, {}", reading.temperature, reading.description);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use time::{OffsetDateTime, Time};
use tracing::debug;

use stratus_types::{Coordinates, ForecastItem, GeocodeMatch, Units, WeatherReading};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::WeatherProvider;

/// Default endpoint for current weather and forecasts.
pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";
/// Default geocoding endpoint.
pub const DEFAULT_GEO_URL: &str = "https://api.openweathermap.org/geo/1.0";
/// Default One Call endpoint used for history.
pub const DEFAULT_HISTORY_URL: &str = "https://api.openweathermap.org/data/3.0";

const GEOCODE_LIMIT: u32 = 5;

/// Connection settings for [`OpenWeatherClient`].
#[derive(Clone)]
pub struct OpenWeatherConfig {
    /// API key; `None` leaves the client unconfigured.
    pub api_key: Option<String>,
    /// Current weather and forecast endpoint.
    pub base_url: String,
    /// Geocoding endpoint.
    pub geo_url: String,
    /// One Call endpoint for history.
    pub history_url: String,
    /// HTTP timeout per request.
    pub timeout: Duration,
}

impl std::fmt::Debug for OpenWeatherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenWeatherConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("geo_url", &self.geo_url)
            .field("history_url", &self.history_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for OpenWeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            geo_url: DEFAULT_GEO_URL.to_string(),
            history_url: DEFAULT_HISTORY_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl OpenWeatherConfig {
    /// Default endpoints with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Point every endpoint at one base URL (used by tests and proxies).
    #[must_use]
    pub fn with_single_endpoint(mut self, url: &str) -> Self {
        let url = url.trim_end_matches('/');
        self.base_url = url.to_string();
        self.geo_url = url.to_string();
        self.history_url = url.to_string();
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP client for OpenWeatherMap.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    config: OpenWeatherConfig,
}

impl OpenWeatherClient {
    /// Create a client.
    pub fn new(config: OpenWeatherConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("HTTP client setup failed: {e}")))?;

        Ok(Self { client, config })
    }

    /// The active configuration.
    pub fn config(&self) -> &OpenWeatherConfig {
        &self.config
    }

    fn api_key(&self) -> ProviderResult<&str> {
        self.config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::Unavailable("OpenWeatherMap API key is missing".to_string())
            })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> ProviderResult<T> {
        let key = self.api_key()?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .query(params)
            .query(&[("appid", key)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Unavailable("weather API request timed out".to_string())
                } else {
                    ProviderError::Unavailable(format!("weather API network error: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("weather API read failed: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::InvalidResponse(format!("unexpected payload: {e}")))
    }

    async fn fetch_history_point(
        &self,
        coords: Coordinates,
        target: i64,
        units: Units,
    ) -> ProviderResult<Option<WeatherReading>> {
        let url = format!("{}/onecall/timemachine", self.config.history_url);
        let mut params = coordinate_params(coords, units);
        params.push(("dt", target.to_string()));

        let response: TimemachineResponse = self.get_json(&url, &params).await?;
        let point = match response.data {
            Some(points) if !points.is_empty() => points
                .into_iter()
                .min_by_key(|p| p.dt.unwrap_or(target).abs_diff(target)),
            _ => response.current,
        };

        point.map(|p| p.into_reading(target)).transpose()
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    fn is_configured(&self) -> bool {
        self.api_key().is_ok()
    }

    async fn fetch_current(
        &self,
        coords: Coordinates,
        units: Units,
    ) -> ProviderResult<WeatherReading> {
        let url = format!("{}/weather", self.config.base_url);
        let response: CurrentResponse = self
            .get_json(&url, &coordinate_params(coords, units))
            .await?;
        response.into_reading()
    }

    async fn fetch_forecast(
        &self,
        coords: Coordinates,
        units: Units,
    ) -> ProviderResult<Vec<ForecastItem>> {
        let url = format!("{}/forecast", self.config.base_url);
        let response: ForecastResponse = self
            .get_json(&url, &coordinate_params(coords, units))
            .await?;
        response
            .list
            .into_iter()
            .map(ForecastEntry::into_item)
            .collect()
    }

    async fn fetch_history(
        &self,
        coords: Coordinates,
        days: u32,
        units: Units,
    ) -> ProviderResult<Vec<WeatherReading>> {
        let now = OffsetDateTime::now_utc();
        let mut readings = Vec::new();

        for day_offset in 1..=i64::from(days) {
            let target = (now - time::Duration::days(day_offset))
                .replace_time(Time::MIDNIGHT)
                + time::Duration::hours(12);
            if let Some(reading) = self
                .fetch_history_point(coords, target.unix_timestamp(), units)
                .await?
            {
                readings.push(reading);
            }
        }

        readings.sort_by(|a, b| b.api_timestamp.cmp(&a.api_timestamp));
        Ok(readings)
    }

    async fn geocode(
        &self,
        name: &str,
        country: Option<&str>,
    ) -> ProviderResult<Vec<GeocodeMatch>> {
        let url = format!("{}/direct", self.config.geo_url);
        let query = match country.map(str::trim).filter(|c| !c.is_empty()) {
            Some(country) => format!("{},{}", name.trim(), country),
            None => name.trim().to_string(),
        };
        let params = [("q", query), ("limit", GEOCODE_LIMIT.to_string())];

        let entries: Vec<GeoEntry> = self.get_json(&url, &params).await?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                let coordinates = Coordinates::new(entry.lat, entry.lon).ok()?;
                Some(GeocodeMatch {
                    name: entry.name,
                    country: entry.country,
                    state: entry.state,
                    coordinates,
                })
            })
            .collect())
    }
}

fn coordinate_params(coords: Coordinates, units: Units) -> Vec<(&'static str, String)> {
    vec![
        ("lat", coords.latitude.to_string()),
        ("lon", coords.longitude.to_string()),
        ("units", units.as_str().to_string()),
    ]
}

/// Map a non-success HTTP status to a provider error.
fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let mut message = format!("weather API request failed ({})", status.as_u16());
    if let Ok(ErrorBody {
        message: Some(detail),
    }) = serde_json::from_str::<ErrorBody>(body)
    {
        message = format!("{message}: {detail}");
    }

    match status {
        StatusCode::NOT_FOUND => ProviderError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Unavailable(message),
        s if s.is_server_error() => ProviderError::Unavailable(message),
        _ => ProviderError::InvalidResponse(message),
    }
}

fn timestamp(secs: i64) -> ProviderResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| ProviderError::InvalidResponse(format!("bad timestamp {secs}: {e}")))
}

fn first_condition(conditions: Vec<WireCondition>) -> ProviderResult<WireCondition> {
    conditions
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("missing weather condition".to_string()))
}

// ==========================================================================
// Wire Types
// ==========================================================================

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMain {
    temp: f64,
    feels_like: f64,
    temp_min: f64,
    temp_max: f64,
    pressure: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct WireCondition {
    main: String,
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct WireWind {
    speed: f64,
    deg: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WireClouds {
    all: f64,
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    dt: i64,
    main: WireMain,
    weather: Vec<WireCondition>,
    wind: WireWind,
    clouds: WireClouds,
    visibility: Option<u32>,
}

impl CurrentResponse {
    fn into_reading(self) -> ProviderResult<WeatherReading> {
        let condition = first_condition(self.weather)?;
        Ok(WeatherReading {
            temperature: self.main.temp,
            feels_like: self.main.feels_like,
            temp_min: self.main.temp_min,
            temp_max: self.main.temp_max,
            pressure: self.main.pressure.round() as u32,
            humidity: self.main.humidity.round() as u8,
            condition: condition.main,
            description: condition.description,
            icon: condition.icon,
            wind_speed: self.wind.speed,
            wind_deg: self.wind.deg.map(|d| d.round() as u16),
            clouds: self.clouds.all.round() as u8,
            visibility: self.visibility,
            api_timestamp: timestamp(self.dt)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    list: Vec<ForecastEntry>,
}

#[derive(Debug, Deserialize)]
struct ForecastEntry {
    dt: i64,
    main: WireMain,
    weather: Vec<WireCondition>,
    wind: WireWind,
    clouds: WireClouds,
    #[serde(default)]
    pop: f64,
}

impl ForecastEntry {
    fn into_item(self) -> ProviderResult<ForecastItem> {
        let condition = first_condition(self.weather)?;
        Ok(ForecastItem {
            forecast_at: timestamp(self.dt)?,
            temperature: self.main.temp,
            feels_like: self.main.feels_like,
            temp_min: self.main.temp_min,
            temp_max: self.main.temp_max,
            pressure: self.main.pressure.round() as u32,
            humidity: self.main.humidity.round() as u8,
            condition: condition.main,
            description: condition.description,
            icon: condition.icon,
            wind_speed: self.wind.speed,
            wind_deg: self.wind.deg.map(|d| d.round() as u16),
            clouds: self.clouds.all.round() as u8,
            pop: self.pop.clamp(0.0, 1.0),
        })
    }
}

#[derive(Debug, Deserialize)]
struct GeoEntry {
    name: String,
    lat: f64,
    lon: f64,
    #[serde(default)]
    country: String,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimemachineResponse {
    data: Option<Vec<TimemachinePoint>>,
    current: Option<TimemachinePoint>,
}

#[derive(Debug, Deserialize)]
struct TimemachinePoint {
    dt: Option<i64>,
    temp: Option<f64>,
    feels_like: Option<f64>,
    pressure: Option<f64>,
    humidity: Option<f64>,
    wind_speed: Option<f64>,
    wind_deg: Option<f64>,
    clouds: Option<f64>,
    visibility: Option<u32>,
    #[serde(default)]
    weather: Vec<WireCondition>,
}

impl TimemachinePoint {
    fn into_reading(self, target: i64) -> ProviderResult<WeatherReading> {
        let temp = self.temp.unwrap_or(0.0);
        let condition = self.weather.into_iter().next();
        let (main, description, icon) = match condition {
            Some(c) => (c.main, c.description, c.icon),
            None => ("Unknown".to_string(), "unknown".to_string(), "01d".to_string()),
        };

        Ok(WeatherReading {
            temperature: temp,
            feels_like: self.feels_like.unwrap_or(temp),
            temp_min: temp,
            temp_max: temp,
            pressure: self.pressure.unwrap_or(0.0).round() as u32,
            humidity: self.humidity.unwrap_or(0.0).round() as u8,
            condition: main,
            description,
            icon,
            wind_speed: self.wind_speed.unwrap_or(0.0),
            wind_deg: self.wind_deg.map(|d| d.round() as u16),
            clouds: self.clouds.unwrap_or(0.0).round() as u8,
            visibility: self.visibility,
            api_timestamp: timestamp(self.dt.unwrap_or(target))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn london() -> Coordinates {
        Coordinates::new(51.5074, -0.1278).unwrap()
    }

    fn client_for(server: &MockServer) -> OpenWeatherClient {
        let config = OpenWeatherConfig::new("test-key")
            .with_single_endpoint(&server.uri())
            .timeout(Duration::from_secs(2));
        OpenWeatherClient::new(config).unwrap()
    }

    fn current_body() -> serde_json::Value {
        json!({
            "dt": 1_710_000_000,
            "main": {
                "temp": 12.3, "feels_like": 11.1, "temp_min": 10.0,
                "temp_max": 14.0, "pressure": 1012, "humidity": 81
            },
            "weather": [{"main": "Rain", "description": "light rain", "icon": "10d"}],
            "wind": {"speed": 5.1, "deg": 240},
            "clouds": {"all": 90},
            "visibility": 8000
        })
    }

    #[tokio::test]
    async fn test_fetch_current() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .and(query_param("units", "metric"))
            .and(query_param("appid", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
            .mount(&server)
            .await;

        let reading = client_for(&server)
            .fetch_current(london(), Units::Metric)
            .await
            .unwrap();

        assert_eq!(reading.temperature, 12.3);
        assert_eq!(reading.pressure, 1012);
        assert_eq!(reading.condition, "Rain");
        assert_eq!(reading.wind_deg, Some(240));
        assert_eq!(reading.visibility, Some(8000));
        assert_eq!(reading.api_timestamp.unix_timestamp(), 1_710_000_000);
    }

    #[tokio::test]
    async fn test_fetch_forecast_defaults_missing_pop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "list": [
                    {
                        "dt": 1_710_010_800,
                        "main": {"temp": 11.0, "feels_like": 10.0, "temp_min": 9.0,
                                 "temp_max": 12.0, "pressure": 1010, "humidity": 85},
                        "weather": [{"main": "Clouds", "description": "overcast", "icon": "04n"}],
                        "wind": {"speed": 3.0},
                        "clouds": {"all": 100},
                        "pop": 0.35
                    },
                    {
                        "dt": 1_710_021_600,
                        "main": {"temp": 10.0, "feels_like": 9.0, "temp_min": 9.0,
                                 "temp_max": 11.0, "pressure": 1009, "humidity": 88},
                        "weather": [{"main": "Clear", "description": "clear sky", "icon": "01n"}],
                        "wind": {"speed": 2.0, "deg": 10},
                        "clouds": {"all": 0}
                    }
                ]
            })))
            .mount(&server)
            .await;

        let items = client_for(&server)
            .fetch_forecast(london(), Units::Metric)
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].pop, 0.35);
        assert_eq!(items[0].wind_deg, None);
        assert_eq!(items[1].pop, 0.0);
    }

    #[tokio::test]
    async fn test_geocode_builds_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/direct"))
            .and(query_param("q", "Paris,FR"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "Paris", "lat": 48.8589, "lon": 2.32, "country": "FR", "state": "Ile-de-France"}
            ])))
            .mount(&server)
            .await;

        let matches = client_for(&server).geocode("Paris", Some("FR")).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].country, "FR");
        assert_eq!(matches[0].state.as_deref(), Some("Ile-de-France"));
    }

    #[tokio::test]
    async fn test_status_classification() {
        let server = MockServer::start().await;
        Mock::given(path("/weather"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"cod": "404", "message": "city not found"})),
            )
            .mount(&server)
            .await;
        Mock::given(path("/forecast"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(path("/direct"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server);

        match client.fetch_current(london(), Units::Metric).await {
            Err(ProviderError::NotFound(msg)) => assert!(msg.contains("city not found")),
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert_eq!(
            client.fetch_forecast(london(), Units::Metric).await,
            Err(ProviderError::RateLimited)
        );
        assert!(matches!(
            client.geocode("Paris", None).await,
            Err(ProviderError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(path("/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"dt": 1})))
            .mount(&server)
            .await;

        assert!(matches!(
            client_for(&server).fetch_current(london(), Units::Metric).await,
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_weather_array_is_invalid_response() {
        let server = MockServer::start().await;
        let mut body = current_body();
        body["weather"] = json!([]);
        Mock::given(path("/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        assert!(matches!(
            client_for(&server).fetch_current(london(), Units::Metric).await,
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(path("/weather"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(current_body())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let config = OpenWeatherConfig::new("test-key")
            .with_single_endpoint(&server.uri())
            .timeout(Duration::from_millis(200));
        let client = OpenWeatherClient::new(config).unwrap();

        assert!(matches!(
            client.fetch_current(london(), Units::Metric).await,
            Err(ProviderError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_history_picks_nearest_point_and_sorts() {
        let server = MockServer::start().await;
        Mock::given(path("/onecall/timemachine"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"dt": 1_000, "temp": 5.0, "weather": [{"main": "Snow", "description": "snow", "icon": "13d"}]}
                ]
            })))
            .mount(&server)
            .await;

        let readings = client_for(&server)
            .fetch_history(london(), 3, Units::Metric)
            .await
            .unwrap();

        assert_eq!(readings.len(), 3);
        assert!(readings.iter().all(|r| r.condition == "Snow"));
        assert_eq!(readings[0].feels_like, 5.0);
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let client = OpenWeatherClient::new(OpenWeatherConfig::default()).unwrap();
        assert!(!client.is_configured());
        assert!(matches!(
            client.fetch_current(london(), Units::Metric).await,
            Err(ProviderError::Unavailable(msg)) if msg.contains("API key")
        ));
    }

    #[test]
    fn test_config_debug_hides_key() {
        let config = OpenWeatherConfig::new("secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("***"));
    }
}
