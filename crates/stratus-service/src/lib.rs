//! Background sync scheduler and HTTP REST API for a local weather cache.
//!
//! This crate provides a service that:
//! - Tracks a set of locations and keeps their weather cached in SQLite
//! - Syncs each location on its own interval from a background scheduler
//! - Exposes a REST API for the catalog, cached weather, history and exports
//! - Rate limits inbound requests per client address
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check (never rate limited)
//! - `GET /api/status` - Fleet health and scheduler state
//! - `GET|POST /api/locations` - List or add tracked locations
//! - `GET /api/locations/overview` - Dashboard summary
//! - `GET|PATCH|DELETE /api/locations/{id}` - Inspect, edit or remove a location
//! - `POST /api/locations/{id}/sync?force=` - Run a sync cycle
//! - `GET /api/locations/{id}/weather` - Cached weather with insights
//! - `GET /api/locations/{id}/history?days=&source=` - Source-attributed history
//! - `GET /api/locations/{id}/export` and `export.csv` - Downloads
//! - `GET /api/preferences`, `PATCH /api/preferences/{key}` - Global preferences
//! - `POST /api/scheduler/start|stop` - Scheduler control
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/stratus/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [storage]
//! path = "~/.local/share/stratus/weather.db"
//!
//! [provider]
//! api_key_env = "OPENWEATHER_API_KEY"
//! timeout_secs = 30
//! rate_limit_requests = 50    # outbound calls per window, all locations
//! rate_limit_window_secs = 60
//!
//! [sync]
//! tick_secs = 30
//! conflict_temperature_delta = 15.0
//! conflict_window_secs = 10800
//!
//! [security]
//! rate_limit_enabled = true
//! rate_limit_requests = 120   # per client address
//! rate_limit_window_secs = 60
//! ```

pub mod api;
pub mod config;
pub mod middleware;
pub mod state;

pub use config::{
    Config, ConfigError, ProviderConfig, SecurityConfig, ServerConfig, StorageConfig, SyncConfig,
};
pub use state::{AppState, SchedulerState, SchedulerStatus};
