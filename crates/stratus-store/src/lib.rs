//! Local persistence for tracked locations and cached weather data.
//!
//! This crate provides SQLite-based storage for the weather cache:
//! the location catalog, append-only current-weather snapshots, the
//! replace-on-sync forecast set, the sync outcome audit log and global
//! preferences.
//!
//! # Features
//!
//! - Location catalog with cascading deletes
//! - Snapshot history queried by observation time
//! - Transactional forecast replacement
//! - Sync outcome log for health reporting
//! - CSV export of stored snapshots
//!
//! # Example
//!
//! ```no_run
//! use stratus_store::{SnapshotQuery, Store};
//!
//! let store = Store::open_default()?;
//!
//! for location in store.list_locations()? {
//!     let recent = store.query_snapshots(&SnapshotQuery::new().location(location.id).limit(10))?;
//!     println!("{}: {} snapshots", location.display_name, recent.len());
//! }
//! # Ok::<(), stratus_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{
    LocationUpdate, NewLocation, NewOutcome, StoredForecast, StoredOutcome, StoredPreference,
    StoredSnapshot, SyncCommit,
};
pub use queries::{OutcomeQuery, SnapshotQuery};
pub use store::Store;

/// Preference key for the measurement system.
pub const PREF_UNITS: &str = "units";
/// Preference key for the default sync interval in seconds.
pub const PREF_REFRESH_INTERVAL: &str = "refresh_interval";

/// Preferences seeded into a fresh database.
pub const DEFAULT_PREFERENCES: [(&str, &str); 2] =
    [(PREF_UNITS, "metric"), (PREF_REFRESH_INTERVAL, "600")];

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/stratus/weather.db`
/// - macOS: `~/Library/Application Support/stratus/weather.db`
/// - Windows: `C:\Users\<user>\AppData\Local\stratus\weather.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("stratus")
        .join("weather.db")
}
