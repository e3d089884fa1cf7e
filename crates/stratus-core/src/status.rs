//! Fleet health aggregation.

use serde::Serialize;
use time::OffsetDateTime;

use crate::engine::Engine;
use crate::error::Result;

/// Aggregate health of all tracked locations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    /// Number of tracked locations.
    pub total_locations: u64,
    /// Locations with at least one stored snapshot.
    pub synced_locations: u64,
    /// Failed sync outcomes in the trailing 24 hours.
    pub failed_sync_last_24h: u64,
    /// Most recent successful sync across all locations.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success_sync: Option<OffsetDateTime>,
    /// Effective global sync interval.
    pub sync_interval_seconds: u32,
    /// Whether the provider credential is configured.
    pub api_configured: bool,
}

impl Engine {
    /// Compute the current [`SystemStatus`]. Read-only.
    pub async fn status(&self) -> Result<SystemStatus> {
        let since = OffsetDateTime::now_utc() - time::Duration::hours(24);
        let settings = self.settings();
        let store = self.inner.store.lock().await;

        Ok(SystemStatus {
            total_locations: store.count_locations()?,
            synced_locations: store.count_locations_with_snapshots()?,
            failed_sync_last_24h: store.count_failed_since(since)?,
            last_success_sync: store.last_success_at()?,
            sync_interval_seconds: settings.default_interval_secs,
            api_configured: self.inner.provider.is_configured(),
        })
    }
}
