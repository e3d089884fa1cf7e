//! Conflict detection between consecutive observations.
//!
//! A conflict is an advisory: the new reading is always persisted, and the
//! detector only produces a human-readable note describing a sharp shift
//! against the immediately prior snapshot.
//!
//! # Example
//!
//! ```
//! use stratus_core::ConflictPolicy;
//!
//! let policy = ConflictPolicy::default();
//! assert_eq!(policy.temperature_delta, 15.0);
//! assert_eq!(policy.window_secs, 10_800);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use stratus_store::StoredSnapshot;
use stratus_types::{Units, WeatherReading};

/// Thresholds for flagging a sharp shift between two observations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConflictPolicy {
    /// Temperature delta in metric degrees above which a shift is flagged.
    ///
    /// Scaled to the active unit system before comparison.
    pub temperature_delta: f64,
    /// Only prior snapshots captured within this many seconds are compared.
    ///
    /// A location whose sync interval is longer uses its interval instead.
    pub window_secs: u64,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self {
            temperature_delta: 15.0,
            window_secs: 3 * 60 * 60,
        }
    }
}

impl ConflictPolicy {
    /// Temperature threshold expressed in `units`.
    pub fn threshold_in(&self, units: Units) -> f64 {
        self.temperature_delta * units.degree_scale()
    }

    /// Effective comparison window for a location with the given interval.
    pub fn window_for(&self, sync_interval: Duration) -> Duration {
        Duration::from_secs(self.window_secs).max(sync_interval)
    }

    /// Compare `next` against the prior snapshot and describe any sharp shift.
    ///
    /// `next` is expressed in `units`; the prior snapshot is converted from
    /// the unit system it was fetched in before comparing.
    ///
    /// Returns `None` when there is no prior snapshot, when it falls outside
    /// the comparison window, or when the shift stays under both thresholds.
    pub fn detect(
        &self,
        previous: Option<&StoredSnapshot>,
        next: &WeatherReading,
        units: Units,
        sync_interval: Duration,
        now: OffsetDateTime,
    ) -> Option<String> {
        let previous = previous?;
        let age = now - previous.captured_at;
        if age.is_negative() || age.unsigned_abs() >= self.window_for(sync_interval) {
            return None;
        }

        let prior = previous.reading_in(units);
        let mut shifts = Vec::new();

        let delta = next.temperature - prior.temperature;
        if delta.abs() > self.threshold_in(units) {
            shifts.push(format!(
                "temperature moved {:+.1}{} ({:.1} to {:.1})",
                delta,
                units.temperature_suffix(),
                prior.temperature,
                next.temperature
            ));
        }

        let (from, to) = (prior.category(), next.category());
        if from.is_abrupt_change(to) {
            shifts.push(format!("conditions changed abruptly from {from} to {to}"));
        }

        if shifts.is_empty() {
            return None;
        }

        Some(format!(
            "Large data shift since the previous sync {} minutes ago: {}. The latest reading is kept as the source of truth.",
            age.whole_minutes(),
            shifts.join("; ")
        ))
    }
}
