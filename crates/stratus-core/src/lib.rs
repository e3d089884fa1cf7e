//! Synchronization and reconciliation engine for a local weather cache.
//!
//! This crate keeps a local SQLite cache of weather data for a set of tracked
//! locations in step with a remote weather provider, while respecting the
//! provider's rate limits.
//!
//! # Features
//!
//! - **Cache-aware sync**: skip provider calls while cached data is fresh
//! - **Per-location serialization**: at most one sync cycle per location
//! - **Graceful degradation**: a failed forecast fetch keeps the last forecast
//! - **Conflict notes**: advisory annotations for sharp data shifts
//! - **Source-attributed history**: provider or local snapshots, never mixed
//! - **Background scheduler**: periodic non-forced syncs
//! - **Rate limiting**: sliding-window budgets for inbound and outbound calls
//! - **Insights**: forecast confidence, impact scores, timeline and alerts
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use stratus_core::{Engine, OpenWeatherClient, OpenWeatherConfig, RateLimitConfig, SyncSettings};
//! use stratus_store::Store;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Store::open_default()?;
//!     let api_key = std::env::var("OPENWEATHER_API_KEY")?;
//!     let provider = OpenWeatherClient::new(OpenWeatherConfig::new(api_key))?;
//!     let (_settings_tx, settings_rx) = watch::channel(SyncSettings::default());
//!     let engine = Engine::new(
//!         store,
//!         Arc::new(provider),
//!         settings_rx,
//!         RateLimitConfig::outbound_default(),
//!     );
//!
//!     let berlin = engine.add_location("Berlin", Some("DE")).await?;
//!     let view = engine.sync(berlin.id, false).await?;
//!     if let Some(current) = view.current {
//!         println!("{}: {}°C", view.location.display_name, current.reading.temperature);
//!     }
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod insights;
pub mod mock;
pub mod openweather;
pub mod provider;
pub mod rate_limit;
pub mod reconcile;
pub mod scheduler;
pub mod settings;
pub mod status;
pub mod sync;

pub use catalog::{ExportBundle, LocationOverview, LocationPatch, MAX_EXPORT_DAYS};
pub use conflict::ConflictPolicy;
pub use engine::{Engine, WeatherView};
pub use error::{Error, ProviderError, ProviderResult, Result};
pub use insights::{
    ChangeSummary, ConfidenceLabel, EventSeverity, ForecastConfidence, ImpactScores,
    TimelineEvent, WeatherInsights, build_insights,
};
pub use mock::{MockOperation, MockProvider, MockProviderBuilder};
pub use openweather::{OpenWeatherClient, OpenWeatherConfig};
pub use provider::WeatherProvider;
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use reconcile::{HistoryResult, MAX_HISTORY_DAYS};
pub use scheduler::{DEFAULT_TICK, Scheduler, TickReport};
pub use settings::{DEFAULT_PROVIDER_TIMEOUT, SyncSettings};
pub use status::SystemStatus;

// Re-export from stratus-types
pub use stratus_types::{
    Coordinates, ErrorKind, ForecastItem, GeocodeMatch, HistorySource, Location,
    SourcePreference, Units, WeatherReading,
};
