//! Database schema and migrations.

use rusqlite::Connection;
use time::OffsetDateTime;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        // Fresh database - create all tables
        create_schema_v1(conn)?;
        migrate_to_v2(conn)?;
        seed_preferences(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if version < SCHEMA_VERSION {
        migrate(conn, version)?;
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
///
/// All timestamps are unix seconds in UTC.
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- Tracked locations
        CREATE TABLE IF NOT EXISTS locations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            country TEXT NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            display_name TEXT NOT NULL,
            is_favorite INTEGER NOT NULL DEFAULT 0,
            sync_interval_secs INTEGER NOT NULL DEFAULT 600,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(name, country)
        );

        -- Current-weather observations (append-only)
        CREATE TABLE IF NOT EXISTS weather_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            location_id INTEGER NOT NULL REFERENCES locations(id) ON DELETE CASCADE,
            api_timestamp INTEGER NOT NULL,
            captured_at INTEGER NOT NULL,
            temperature REAL NOT NULL,
            feels_like REAL NOT NULL,
            temp_min REAL NOT NULL,
            temp_max REAL NOT NULL,
            pressure INTEGER NOT NULL,
            humidity INTEGER NOT NULL,
            weather_main TEXT NOT NULL,
            weather_description TEXT NOT NULL,
            weather_icon TEXT NOT NULL,
            wind_speed REAL NOT NULL,
            wind_deg INTEGER,
            clouds INTEGER NOT NULL,
            visibility INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_snapshots_location_time
            ON weather_snapshots(location_id, api_timestamp);

        -- Forecast entries (replaced on every sync)
        CREATE TABLE IF NOT EXISTS forecasts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            location_id INTEGER NOT NULL REFERENCES locations(id) ON DELETE CASCADE,
            forecast_at INTEGER NOT NULL,
            fetched_at INTEGER NOT NULL,
            temperature REAL NOT NULL,
            feels_like REAL NOT NULL,
            temp_min REAL NOT NULL,
            temp_max REAL NOT NULL,
            pressure INTEGER NOT NULL,
            humidity INTEGER NOT NULL,
            weather_main TEXT NOT NULL,
            weather_description TEXT NOT NULL,
            weather_icon TEXT NOT NULL,
            wind_speed REAL NOT NULL,
            wind_deg INTEGER,
            clouds INTEGER NOT NULL,
            pop REAL NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_forecasts_location_time
            ON forecasts(location_id, forecast_at);

        -- Sync outcome audit log (append-only)
        CREATE TABLE IF NOT EXISTS sync_outcomes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            location_id INTEGER NOT NULL REFERENCES locations(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            error_kind TEXT,
            error_message TEXT,
            note TEXT,
            started_at INTEGER NOT NULL,
            completed_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_outcomes_location_time
            ON sync_outcomes(location_id, completed_at);
        CREATE INDEX IF NOT EXISTS idx_outcomes_status_time
            ON sync_outcomes(status, completed_at);

        -- Global preferences
        CREATE TABLE IF NOT EXISTS preferences (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#,
    )?;

    Ok(())
}

/// Insert default preferences without overwriting existing values.
fn seed_preferences(conn: &Connection) -> Result<()> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    for (key, value) in crate::DEFAULT_PREFERENCES {
        conn.execute(
            "INSERT OR IGNORE INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, value, now],
        )?;
    }
    Ok(())
}

/// Run migrations from old_version to current.
fn migrate(conn: &Connection, old_version: i32) -> Result<()> {
    if old_version < 2 {
        migrate_to_v2(conn)?;
    }
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Version 2: record the unit system each observation was fetched in.
///
/// Rows written before the column existed were fetched in the default
/// metric system.
fn migrate_to_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        ALTER TABLE weather_snapshots ADD COLUMN units TEXT NOT NULL DEFAULT 'metric';
        ALTER TABLE forecasts ADD COLUMN units TEXT NOT NULL DEFAULT 'metric';
        "#,
    )?;
    Ok(())
}
