//! Location catalog, preferences and exports.
//!
//! These are the CRUD-side operations of the engine. They never call the
//! provider except to geocode a new location, and they never write weather
//! data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info};

use stratus_store::{
    LocationUpdate, NewLocation, OutcomeQuery, PREF_REFRESH_INTERVAL, PREF_UNITS, SnapshotQuery,
    StoredOutcome, StoredPreference, StoredSnapshot,
};
use stratus_types::{
    ForecastItem, Location, MAX_SYNC_INTERVAL_SECS, MIN_SYNC_INTERVAL_SECS, Units,
    validate_sync_interval,
};

use crate::engine::Engine;
use crate::error::{Error, Result};

/// Largest window accepted by the export operations.
pub const MAX_EXPORT_DAYS: u32 = 365;

/// Number of sync outcomes included in an export bundle.
const EXPORT_OUTCOME_LIMIT: u32 = 20;

/// Partial update of a location's editable metadata.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LocationPatch {
    /// New display label; must not be blank.
    pub display_name: Option<String>,
    /// New favorite flag.
    pub is_favorite: Option<bool>,
    /// New sync interval in seconds.
    pub sync_interval_secs: Option<i64>,
}

/// Dashboard summary of one location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationOverview {
    pub location: Location,
    pub current: Option<StoredSnapshot>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_synced: Option<OffsetDateTime>,
}

/// Everything known about one location, for download.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportBundle {
    #[serde(with = "time::serde::rfc3339")]
    pub exported_at: OffsetDateTime,
    pub history_days: u32,
    pub location: Location,
    pub current: Option<StoredSnapshot>,
    pub forecast: Vec<ForecastItem>,
    /// Stored snapshots inside the window, newest first.
    pub history: Vec<StoredSnapshot>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_synced: Option<OffsetDateTime>,
    /// Most recent sync outcomes, newest first.
    pub recent_outcomes: Vec<StoredOutcome>,
}

impl Engine {
    /// Geocode `name` and start tracking the first match.
    ///
    /// If the resolved place is already tracked the existing location is
    /// returned unchanged.
    pub async fn add_location(&self, name: &str, country: Option<&str>) -> Result<Location> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid("name", "must not be empty"));
        }
        let country = country.map(str::trim).filter(|c| !c.is_empty());

        let settings = self.settings();
        let matches = self
            .guarded(
                "geocode",
                settings.provider_timeout,
                self.inner.provider.geocode(name, country),
            )
            .await?;

        let place = matches.into_iter().next().ok_or_else(|| {
            Error::NotFound(match country {
                Some(country) => format!("no place matches '{name}, {country}'"),
                None => format!("no place matches '{name}'"),
            })
        })?;

        let store = self.inner.store.lock().await;
        if let Some(existing) = store.find_location(&place.name, &place.country)? {
            debug!(
                "Location {}, {} already tracked as {}",
                place.name, place.country, existing.id
            );
            return Ok(existing);
        }

        let location = store.insert_location(&NewLocation {
            name: place.name,
            country: place.country,
            coordinates: place.coordinates,
            display_name: None,
            sync_interval_secs: settings.default_interval_secs,
        })?;
        Ok(location)
    }

    /// All tracked locations, favorites first, then by name.
    pub async fn list_locations(&self) -> Result<Vec<Location>> {
        let store = self.inner.store.lock().await;
        Ok(store.list_locations()?)
    }

    /// A tracked location by id.
    pub async fn get_location(&self, location_id: i64) -> Result<Location> {
        self.require_location(location_id).await
    }

    /// Apply a metadata patch to a location.
    pub async fn update_location(&self, location_id: i64, patch: LocationPatch) -> Result<Location> {
        let display_name = match patch.display_name {
            Some(name) if name.trim().is_empty() => {
                return Err(Error::invalid("display_name", "must not be empty"));
            }
            Some(name) => Some(name.trim().to_string()),
            None => None,
        };
        let sync_interval_secs = patch
            .sync_interval_secs
            .map(validate_sync_interval)
            .transpose()?;

        let update = LocationUpdate {
            display_name,
            is_favorite: patch.is_favorite,
            sync_interval_secs,
        };

        let store = self.inner.store.lock().await;
        if update.is_empty() {
            return store
                .get_location(location_id)?
                .ok_or(Error::LocationNotFound(location_id));
        }
        Ok(store.update_location(location_id, &update)?)
    }

    /// Stop tracking a location and drop all of its data.
    pub async fn delete_location(&self, location_id: i64) -> Result<()> {
        let store = self.inner.store.lock().await;
        if store.delete_location(location_id)? {
            Ok(())
        } else {
            Err(Error::LocationNotFound(location_id))
        }
    }

    /// Latest snapshot and sync time of every tracked location.
    pub async fn overview(&self) -> Result<Vec<LocationOverview>> {
        let units = self.settings().units;
        let store = self.inner.store.lock().await;
        let mut last_synced = store.last_success_by_location()?;

        store
            .list_locations()?
            .into_iter()
            .map(|location| {
                let current = store
                    .latest_snapshot(location.id)?
                    .map(|s| s.into_units(units));
                Ok(LocationOverview {
                    last_synced: last_synced.remove(&location.id),
                    current,
                    location,
                })
            })
            .collect()
    }

    /// All stored preferences ordered by key.
    pub async fn list_preferences(&self) -> Result<Vec<StoredPreference>> {
        let store = self.inner.store.lock().await;
        Ok(store.list_preferences()?)
    }

    /// Validate and store a preference.
    ///
    /// Only `units` and `refresh_interval` are accepted. Callers publish the
    /// resulting settings themselves; the engine picks them up on its next
    /// operation.
    pub async fn set_preference(&self, key: &str, value: &str) -> Result<StoredPreference> {
        let value = value.trim();
        let normalized = match key {
            PREF_UNITS => value.parse::<Units>()?.as_str().to_string(),
            PREF_REFRESH_INTERVAL => match value.parse::<i64>() {
                Ok(secs) => validate_sync_interval(secs)?.to_string(),
                Err(_) => {
                    return Err(Error::invalid(
                        PREF_REFRESH_INTERVAL,
                        format!(
                            "must be an integer between {MIN_SYNC_INTERVAL_SECS} and \
                             {MAX_SYNC_INTERVAL_SECS} seconds"
                        ),
                    ));
                }
            },
            other => {
                return Err(Error::invalid("key", format!("unknown preference '{other}'")));
            }
        };

        let store = self.inner.store.lock().await;
        let stored = store.set_preference(key, &normalized)?;
        info!("Preference {} set to {}", key, normalized);
        Ok(stored)
    }

    /// Bundle a location's cached data and the last `history_days` of snapshots.
    pub async fn export(&self, location_id: i64, history_days: u32) -> Result<ExportBundle> {
        check_export_days(history_days)?;
        let exported_at = OffsetDateTime::now_utc();
        let since = exported_at - time::Duration::days(i64::from(history_days));

        let store = self.inner.store.lock().await;
        let location = store
            .get_location(location_id)?
            .ok_or(Error::LocationNotFound(location_id))?;

        let units = self.settings().units;
        let history = store
            .query_snapshots(&SnapshotQuery::new().location(location_id).since(since))?
            .into_iter()
            .map(|s| s.into_units(units))
            .collect();
        let forecast = store
            .get_forecasts(location_id)?
            .iter()
            .map(|f| f.item_in(units))
            .collect();
        let recent_outcomes = store.query_outcomes(
            &OutcomeQuery::new()
                .location(location_id)
                .limit(EXPORT_OUTCOME_LIMIT),
        )?;
        let last_synced = store.last_success(location_id)?.map(|o| o.completed_at);
        let current = store
            .latest_snapshot(location_id)?
            .map(|s| s.into_units(units));

        Ok(ExportBundle {
            exported_at,
            history_days,
            current,
            location,
            forecast,
            history,
            last_synced,
            recent_outcomes,
        })
    }

    /// The same snapshot window as [`Engine::export`], as CSV text.
    pub async fn export_history_csv(&self, location_id: i64, history_days: u32) -> Result<String> {
        check_export_days(history_days)?;
        let since = OffsetDateTime::now_utc() - time::Duration::days(i64::from(history_days));

        let store = self.inner.store.lock().await;
        if store.get_location(location_id)?.is_none() {
            return Err(Error::LocationNotFound(location_id));
        }

        let mut buf = Vec::new();
        let rows = store.export_snapshots_csv(
            &SnapshotQuery::new().location(location_id).since(since),
            &mut buf,
        )?;
        debug!("Exported {} snapshots for location {}", rows, location_id);

        String::from_utf8(buf).map_err(|e| Error::Storage(format!("CSV export is not UTF-8: {e}")))
    }
}

fn check_export_days(days: u32) -> Result<()> {
    if (1..=MAX_EXPORT_DAYS).contains(&days) {
        Ok(())
    } else {
        Err(Error::invalid(
            "history_days",
            format!("must be between 1 and {MAX_EXPORT_DAYS}"),
        ))
    }
}
