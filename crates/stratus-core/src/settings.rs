//! Engine settings.
//!
//! [`SyncSettings`] is an explicit configuration value read by the engine.
//! The boundary layer owns a [`watch`](tokio::sync::watch) sender and
//! republishes a fresh value whenever the `units` or `refresh_interval`
//! preference changes; the engine only ever reads the latest value.

use std::time::Duration;

use tracing::warn;

use stratus_store::{PREF_REFRESH_INTERVAL, PREF_UNITS, StoredPreference};
use stratus_types::{
    DEFAULT_SYNC_INTERVAL_SECS, MAX_SYNC_INTERVAL_SECS, MIN_SYNC_INTERVAL_SECS, Units,
};

use crate::conflict::ConflictPolicy;

/// Default timeout for a single provider call.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings consumed by the sync engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Unit system for provider requests.
    pub units: Units,
    /// Sync interval given to newly added locations and reported by status.
    pub default_interval_secs: u32,
    /// Conflict thresholds.
    pub conflict: ConflictPolicy,
    /// Bound on a single provider call.
    pub provider_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            units: Units::Metric,
            default_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            conflict: ConflictPolicy::default(),
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }
}

impl SyncSettings {
    /// Overlay stored preferences onto these settings.
    ///
    /// Unparseable values are logged and ignored so that a bad row never
    /// stops the engine.
    pub fn with_preferences(mut self, preferences: &[StoredPreference]) -> Self {
        for pref in preferences {
            match pref.key.as_str() {
                PREF_UNITS => match pref.value.parse::<Units>() {
                    Ok(units) => self.units = units,
                    Err(e) => warn!("Ignoring stored units preference: {}", e),
                },
                PREF_REFRESH_INTERVAL => match pref.value.trim().parse::<u32>() {
                    Ok(secs) => {
                        self.default_interval_secs =
                            secs.clamp(MIN_SYNC_INTERVAL_SECS, MAX_SYNC_INTERVAL_SECS);
                    }
                    Err(_) => warn!(
                        "Ignoring stored refresh_interval preference '{}'",
                        pref.value
                    ),
                },
                _ => {}
            }
        }
        self
    }

    /// Set the conflict policy.
    #[must_use]
    pub fn conflict(mut self, conflict: ConflictPolicy) -> Self {
        self.conflict = conflict;
        self
    }

    /// Set the per-call provider timeout.
    #[must_use]
    pub fn provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn pref(key: &str, value: &str) -> StoredPreference {
        StoredPreference {
            key: key.to_string(),
            value: value.to_string(),
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_preferences_overlay() {
        let settings = SyncSettings::default()
            .with_preferences(&[pref("units", "imperial"), pref("refresh_interval", "900")]);
        assert_eq!(settings.units, Units::Imperial);
        assert_eq!(settings.default_interval_secs, 900);
    }

    #[test]
    fn test_bad_preferences_are_ignored() {
        let settings = SyncSettings::default().with_preferences(&[
            pref("units", "kelvin"),
            pref("refresh_interval", "soon"),
            pref("theme", "dark"),
        ]);
        assert_eq!(settings, SyncSettings::default());
    }

    #[test]
    fn test_refresh_interval_floor() {
        let settings = SyncSettings::default().with_preferences(&[pref("refresh_interval", "5")]);
        assert_eq!(settings.default_interval_secs, MIN_SYNC_INTERVAL_SECS);

        let settings =
            SyncSettings::default().with_preferences(&[pref("refresh_interval", "604800")]);
        assert_eq!(settings.default_interval_secs, MAX_SYNC_INTERVAL_SECS);
    }
}
