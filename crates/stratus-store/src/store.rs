//! Main store implementation.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};

use stratus_types::{
    Coordinates, ErrorKind, ForecastItem, Location, SyncKind, SyncStatus, Units,
    WeatherReading,
};

use crate::error::{Error, Result};
use crate::models::{
    LocationUpdate, NewLocation, NewOutcome, SNAPSHOT_CSV_HEADER, SnapshotCsvRow, StoredForecast,
    StoredOutcome, StoredPreference, StoredSnapshot, SyncCommit,
};
use crate::queries::{OUTCOME_COLUMNS, OutcomeQuery, SNAPSHOT_COLUMNS, SnapshotQuery};
use crate::schema;

const LOCATION_COLUMNS: &str = "id, name, country, latitude, longitude, display_name, \
     is_favorite, sync_interval_secs, created_at, updated_at";

const FORECAST_COLUMNS: &str = "id, location_id, forecast_at, fetched_at, temperature, \
     feels_like, temp_min, temp_max, pressure, humidity, weather_main, weather_description, \
     weather_icon, wind_speed, wind_deg, clouds, pop, units";

/// SQLite-based store for locations and cached weather.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        // Cascading deletes depend on foreign keys being enforced
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

// Location operations
impl Store {
    /// Insert a new tracked location.
    ///
    /// Fails with [`Error::DuplicateLocation`] if the name and country pair
    /// is already tracked.
    pub fn insert_location(&self, new: &NewLocation) -> Result<Location> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let display_name = new
            .display_name
            .clone()
            .unwrap_or_else(|| format!("{}, {}", new.name, new.country));

        let inserted = self.conn.execute(
            "INSERT INTO locations (name, country, latitude, longitude, display_name,
             is_favorite, sync_interval_secs, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?7)",
            rusqlite::params![
                new.name,
                new.country,
                new.coordinates.latitude,
                new.coordinates.longitude,
                display_name,
                new.sync_interval_secs,
                now,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(Error::DuplicateLocation {
                    name: new.name.clone(),
                    country: new.country.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        let id = self.conn.last_insert_rowid();
        info!("Added location {} ({}, {})", id, new.name, new.country);

        self.get_location(id)?.ok_or(Error::LocationNotFound(id))
    }

    /// Get a location by ID.
    pub fn get_location(&self, id: i64) -> Result<Option<Location>> {
        let location = self
            .conn
            .query_row(
                &format!("SELECT {LOCATION_COLUMNS} FROM locations WHERE id = ?"),
                [id],
                location_from_row,
            )
            .optional()?;

        Ok(location)
    }

    /// Find a location by its resolved name and country (case-insensitive).
    pub fn find_location(&self, name: &str, country: &str) -> Result<Option<Location>> {
        let location = self
            .conn
            .query_row(
                &format!(
                    "SELECT {LOCATION_COLUMNS} FROM locations
                     WHERE name = ?1 COLLATE NOCASE AND country = ?2 COLLATE NOCASE"
                ),
                [name, country],
                location_from_row,
            )
            .optional()?;

        Ok(location)
    }

    /// List all locations, favorites first, then by name.
    pub fn list_locations(&self) -> Result<Vec<Location>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LOCATION_COLUMNS} FROM locations
             ORDER BY is_favorite DESC, name COLLATE NOCASE ASC, id ASC"
        ))?;

        let locations = stmt
            .query_map([], location_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(locations)
    }

    /// Apply a metadata update and return the updated location.
    pub fn update_location(&self, id: i64, update: &LocationUpdate) -> Result<Location> {
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let changed = self.conn.execute(
            "UPDATE locations SET
                display_name = COALESCE(?2, display_name),
                is_favorite = COALESCE(?3, is_favorite),
                sync_interval_secs = COALESCE(?4, sync_interval_secs),
                updated_at = ?5
             WHERE id = ?1",
            rusqlite::params![
                id,
                update.display_name,
                update.is_favorite,
                update.sync_interval_secs,
                now
            ],
        )?;

        if changed == 0 {
            return Err(Error::LocationNotFound(id));
        }

        debug!("Updated location {}: {:?}", id, update);
        self.get_location(id)?.ok_or(Error::LocationNotFound(id))
    }

    /// Delete a location and, by cascade, its snapshots, forecasts and outcomes.
    ///
    /// Returns `false` if the location did not exist.
    pub fn delete_location(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM locations WHERE id = ?", [id])?;

        if deleted > 0 {
            info!("Deleted location {}", id);
        }
        Ok(deleted > 0)
    }

    /// Count tracked locations.
    pub fn count_locations(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM locations", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

// Snapshot operations
impl Store {
    /// Append a current-weather snapshot.
    pub fn insert_snapshot(
        &self,
        location_id: i64,
        reading: &WeatherReading,
        units: Units,
        captured_at: OffsetDateTime,
    ) -> Result<i64> {
        insert_snapshot_on(&self.conn, location_id, reading, units, captured_at)
    }

    /// Query snapshots with filters.
    pub fn query_snapshots(&self, query: &SnapshotQuery) -> Result<Vec<StoredSnapshot>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let snapshots = stmt
            .query_map(params_ref.as_slice(), snapshot_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(snapshots)
    }

    /// The "current" snapshot: greatest `api_timestamp` for the location.
    pub fn latest_snapshot(&self, location_id: i64) -> Result<Option<StoredSnapshot>> {
        let query = SnapshotQuery::new().location(location_id).limit(1);
        let mut snapshots = self.query_snapshots(&query)?;
        Ok(snapshots.pop())
    }

    /// The snapshot immediately before the latest one.
    pub fn previous_snapshot(&self, location_id: i64) -> Result<Option<StoredSnapshot>> {
        let query = SnapshotQuery::new().location(location_id).limit(1).offset(1);
        let mut snapshots = self.query_snapshots(&query)?;
        Ok(snapshots.pop())
    }

    /// Count snapshots, optionally for a single location.
    pub fn count_snapshots(&self, location_id: Option<i64>) -> Result<u64> {
        let count: i64 = match location_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM weather_snapshots WHERE location_id = ?",
                [id],
                |row| row.get(0),
            )?,
            None => {
                self.conn
                    .query_row("SELECT COUNT(*) FROM weather_snapshots", [], |row| {
                        row.get(0)
                    })?
            }
        };

        Ok(count as u64)
    }

    /// Count locations that have at least one stored snapshot.
    pub fn count_locations_with_snapshots(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT location_id) FROM weather_snapshots",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Write the snapshots matching `query` as CSV, returning the row count.
    ///
    /// A header row is always written, even when no snapshots match.
    pub fn export_snapshots_csv<W: Write>(&self, query: &SnapshotQuery, writer: W) -> Result<usize> {
        let snapshots = self.query_snapshots(query)?;

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        wtr.write_record(SNAPSHOT_CSV_HEADER)?;

        for snapshot in &snapshots {
            let reading = &snapshot.reading;
            wtr.serialize(SnapshotCsvRow {
                location_id: snapshot.location_id,
                api_timestamp: format_rfc3339(reading.api_timestamp)?,
                captured_at: format_rfc3339(snapshot.captured_at)?,
                units: snapshot.units.as_str(),
                temperature: reading.temperature,
                feels_like: reading.feels_like,
                temp_min: reading.temp_min,
                temp_max: reading.temp_max,
                pressure: reading.pressure,
                humidity: reading.humidity,
                weather_main: &reading.condition,
                weather_description: &reading.description,
                wind_speed: reading.wind_speed,
                wind_deg: reading.wind_deg,
                clouds: reading.clouds,
                visibility: reading.visibility,
            })?;
        }

        wtr.flush()?;
        Ok(snapshots.len())
    }
}

// Forecast operations
impl Store {
    /// Replace the full forecast set for a location in one transaction.
    ///
    /// Readers never observe an empty or mixed set.
    pub fn replace_forecasts(
        &mut self,
        location_id: i64,
        items: &[ForecastItem],
        units: Units,
        fetched_at: OffsetDateTime,
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let inserted = replace_forecasts_on(&tx, location_id, items, units, fetched_at)?;
        tx.commit()?;

        debug!("Replaced forecast for location {}: {} entries", location_id, inserted);
        Ok(inserted)
    }

    /// Get the forecast set for a location, earliest first.
    pub fn get_forecasts(&self, location_id: i64) -> Result<Vec<StoredForecast>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FORECAST_COLUMNS} FROM forecasts
             WHERE location_id = ? ORDER BY forecast_at ASC, id ASC"
        ))?;

        let forecasts = stmt
            .query_map([location_id], forecast_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(forecasts)
    }

    /// Count forecast entries, optionally for a single location.
    pub fn count_forecasts(&self, location_id: Option<i64>) -> Result<u64> {
        let count: i64 = match location_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM forecasts WHERE location_id = ?",
                [id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM forecasts", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }
}

// Sync outcome operations
impl Store {
    /// Append one sync outcome row.
    pub fn record_outcome(&self, outcome: &NewOutcome) -> Result<i64> {
        insert_outcome_on(&self.conn, outcome)
    }

    /// Persist a successful sync cycle atomically.
    ///
    /// Inserts the snapshot, replaces the forecast set when one is given and
    /// appends the outcome row. Returns the new snapshot ID.
    pub fn commit_sync(&mut self, commit: &SyncCommit<'_>) -> Result<i64> {
        let tx = self.conn.transaction()?;
        let captured_at = commit.outcome.completed_at;

        let snapshot_id = insert_snapshot_on(
            &tx,
            commit.location_id,
            commit.reading,
            commit.units,
            captured_at,
        )?;
        if let Some(items) = commit.forecast {
            replace_forecasts_on(&tx, commit.location_id, items, commit.units, captured_at)?;
        }
        insert_outcome_on(&tx, commit.outcome)?;

        tx.commit()?;

        debug!(
            "Committed sync for location {}: snapshot {}, forecast replaced: {}",
            commit.location_id,
            snapshot_id,
            commit.forecast.is_some()
        );
        Ok(snapshot_id)
    }

    /// Query the outcome log with filters.
    pub fn query_outcomes(&self, query: &OutcomeQuery) -> Result<Vec<StoredOutcome>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let outcomes = stmt
            .query_map(params_ref.as_slice(), outcome_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(outcomes)
    }

    /// The most recent successful outcome for a location.
    pub fn last_success(&self, location_id: i64) -> Result<Option<StoredOutcome>> {
        let query = OutcomeQuery::new()
            .location(location_id)
            .status(SyncStatus::Success)
            .limit(1);
        let mut outcomes = self.query_outcomes(&query)?;
        Ok(outcomes.pop())
    }

    /// Completion time of the most recent successful sync across all locations.
    pub fn last_success_at(&self) -> Result<Option<OffsetDateTime>> {
        let latest: Option<i64> = self.conn.query_row(
            "SELECT MAX(completed_at) FROM sync_outcomes WHERE status = 'success'",
            [],
            |row| row.get(0),
        )?;

        latest
            .map(|ts| {
                OffsetDateTime::from_unix_timestamp(ts)
                    .map_err(|e| Error::InvalidTimestamp(e.to_string()))
            })
            .transpose()
    }

    /// Completion time of the latest successful sync for every location that has one.
    pub fn last_success_by_location(&self) -> Result<HashMap<i64, OffsetDateTime>> {
        let mut stmt = self.conn.prepare(
            "SELECT location_id, MAX(completed_at) FROM sync_outcomes
             WHERE status = 'success' GROUP BY location_id",
        )?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, timestamp(row, 1)?)))?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;

        Ok(rows)
    }

    /// Count failed outcomes completed at or after `since`.
    pub fn count_failed_since(&self, since: OffsetDateTime) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_outcomes WHERE status = 'failed' AND completed_at >= ?",
            [since.unix_timestamp()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Count outcomes, optionally for a single location.
    pub fn count_outcomes(&self, location_id: Option<i64>) -> Result<u64> {
        let count: i64 = match location_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM sync_outcomes WHERE location_id = ?",
                [id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM sync_outcomes", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }
}

// Preference operations
impl Store {
    /// Get a preference by key.
    pub fn get_preference(&self, key: &str) -> Result<Option<StoredPreference>> {
        let preference = self
            .conn
            .query_row(
                "SELECT key, value, updated_at FROM preferences WHERE key = ?",
                [key],
                preference_from_row,
            )
            .optional()?;

        Ok(preference)
    }

    /// List all preferences ordered by key.
    pub fn list_preferences(&self) -> Result<Vec<StoredPreference>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value, updated_at FROM preferences ORDER BY key")?;

        let preferences = stmt
            .query_map([], preference_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(preferences)
    }

    /// Insert or overwrite a preference.
    pub fn set_preference(&self, key: &str, value: &str) -> Result<StoredPreference> {
        let now = OffsetDateTime::now_utc();

        self.conn.execute(
            "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            rusqlite::params![key, value, now.unix_timestamp()],
        )?;

        debug!("Set preference {} = {}", key, value);
        Ok(StoredPreference {
            key: key.to_string(),
            value: value.to_string(),
            updated_at: now.replace_nanosecond(0).unwrap_or(now),
        })
    }
}

fn insert_snapshot_on(
    conn: &Connection,
    location_id: i64,
    reading: &WeatherReading,
    units: Units,
    captured_at: OffsetDateTime,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO weather_snapshots (location_id, api_timestamp, captured_at, temperature,
         feels_like, temp_min, temp_max, pressure, humidity, weather_main, weather_description,
         weather_icon, wind_speed, wind_deg, clouds, visibility, units)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        rusqlite::params![
            location_id,
            reading.api_timestamp.unix_timestamp(),
            captured_at.unix_timestamp(),
            reading.temperature,
            reading.feels_like,
            reading.temp_min,
            reading.temp_max,
            reading.pressure,
            reading.humidity,
            reading.condition,
            reading.description,
            reading.icon,
            reading.wind_speed,
            reading.wind_deg,
            reading.clouds,
            reading.visibility,
            units.as_str(),
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

fn replace_forecasts_on(
    conn: &Connection,
    location_id: i64,
    items: &[ForecastItem],
    units: Units,
    fetched_at: OffsetDateTime,
) -> Result<usize> {
    conn.execute("DELETE FROM forecasts WHERE location_id = ?", [location_id])?;

    let mut stmt = conn.prepare(
        "INSERT INTO forecasts (location_id, forecast_at, fetched_at, temperature, feels_like,
         temp_min, temp_max, pressure, humidity, weather_main, weather_description,
         weather_icon, wind_speed, wind_deg, clouds, pop, units)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
    )?;

    let fetched_at = fetched_at.unix_timestamp();
    for item in items {
        stmt.execute(rusqlite::params![
            location_id,
            item.forecast_at.unix_timestamp(),
            fetched_at,
            item.temperature,
            item.feels_like,
            item.temp_min,
            item.temp_max,
            item.pressure,
            item.humidity,
            item.condition,
            item.description,
            item.icon,
            item.wind_speed,
            item.wind_deg,
            item.clouds,
            item.pop,
            units.as_str(),
        ])?;
    }

    Ok(items.len())
}

fn insert_outcome_on(conn: &Connection, outcome: &NewOutcome) -> Result<i64> {
    conn.execute(
        "INSERT INTO sync_outcomes (location_id, kind, status, error_kind, error_message,
         note, started_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            outcome.location_id,
            outcome.kind.as_str(),
            outcome.status.as_str(),
            outcome.error_kind.map(|k| k.as_str()),
            outcome.error_message,
            outcome.note,
            outcome.started_at.unix_timestamp(),
            outcome.completed_at.unix_timestamp(),
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

fn format_rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&Rfc3339)
        .map_err(|e| Error::InvalidTimestamp(e.to_string()))
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let secs: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn units_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Units> {
    let value: String = row.get(idx)?;
    value.parse().map_err(|_| unexpected_text(idx, &value))
}

fn unexpected_text(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unexpected value '{value}'").into(),
    )
}

fn location_from_row(row: &Row<'_>) -> rusqlite::Result<Location> {
    Ok(Location {
        id: row.get(0)?,
        name: row.get(1)?,
        country: row.get(2)?,
        coordinates: Coordinates {
            latitude: row.get(3)?,
            longitude: row.get(4)?,
        },
        display_name: row.get(5)?,
        is_favorite: row.get(6)?,
        sync_interval_secs: row.get(7)?,
        created_at: timestamp(row, 8)?,
        updated_at: timestamp(row, 9)?,
    })
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<StoredSnapshot> {
    Ok(StoredSnapshot {
        id: row.get(0)?,
        location_id: row.get(1)?,
        captured_at: timestamp(row, 3)?,
        units: units_at(row, 17)?,
        reading: WeatherReading {
            temperature: row.get(4)?,
            feels_like: row.get(5)?,
            temp_min: row.get(6)?,
            temp_max: row.get(7)?,
            pressure: row.get(8)?,
            humidity: row.get(9)?,
            condition: row.get(10)?,
            description: row.get(11)?,
            icon: row.get(12)?,
            wind_speed: row.get(13)?,
            wind_deg: row.get(14)?,
            clouds: row.get(15)?,
            visibility: row.get(16)?,
            api_timestamp: timestamp(row, 2)?,
        },
    })
}

fn forecast_from_row(row: &Row<'_>) -> rusqlite::Result<StoredForecast> {
    Ok(StoredForecast {
        id: row.get(0)?,
        location_id: row.get(1)?,
        fetched_at: timestamp(row, 3)?,
        units: units_at(row, 17)?,
        item: ForecastItem {
            forecast_at: timestamp(row, 2)?,
            temperature: row.get(4)?,
            feels_like: row.get(5)?,
            temp_min: row.get(6)?,
            temp_max: row.get(7)?,
            pressure: row.get(8)?,
            humidity: row.get(9)?,
            condition: row.get(10)?,
            description: row.get(11)?,
            icon: row.get(12)?,
            wind_speed: row.get(13)?,
            wind_deg: row.get(14)?,
            clouds: row.get(15)?,
            pop: row.get(16)?,
        },
    })
}

fn outcome_from_row(row: &Row<'_>) -> rusqlite::Result<StoredOutcome> {
    let kind: String = row.get(2)?;
    let status: String = row.get(3)?;
    let error_kind: Option<String> = row.get(4)?;

    Ok(StoredOutcome {
        id: row.get(0)?,
        location_id: row.get(1)?,
        kind: SyncKind::parse(&kind).ok_or_else(|| unexpected_text(2, &kind))?,
        status: SyncStatus::parse(&status).ok_or_else(|| unexpected_text(3, &status))?,
        error_kind: error_kind
            .map(|k| ErrorKind::parse(&k).ok_or_else(|| unexpected_text(4, &k)))
            .transpose()?,
        error_message: row.get(5)?,
        note: row.get(6)?,
        started_at: timestamp(row, 7)?,
        completed_at: timestamp(row, 8)?,
    })
}

fn preference_from_row(row: &Row<'_>) -> rusqlite::Result<StoredPreference> {
    Ok(StoredPreference {
        key: row.get(0)?,
        value: row.get(1)?,
        updated_at: timestamp(row, 2)?,
    })
}
