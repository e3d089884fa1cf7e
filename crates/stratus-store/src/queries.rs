//! Query builders for snapshots and sync outcomes.
//!
//! Both [`SnapshotQuery`] and [`OutcomeQuery`] follow the builder pattern
//! and default to newest-first ordering.
//!
//! # Example
//!
//! ```
//! use stratus_store::{OutcomeQuery, SnapshotQuery, Store};
//! use stratus_types::SyncStatus;
//! use time::{Duration, OffsetDateTime};
//!
//! let store = Store::open_in_memory()?;
//! let last_week = OffsetDateTime::now_utc() - Duration::days(7);
//!
//! let snapshots = store.query_snapshots(
//!     &SnapshotQuery::new().location(1).since(last_week).limit(50),
//! )?;
//!
//! let failures = store.query_outcomes(
//!     &OutcomeQuery::new().location(1).status(SyncStatus::Failed),
//! )?;
//! # Ok::<(), stratus_store::Error>(())
//! ```

use time::OffsetDateTime;

use stratus_types::SyncStatus;

pub(crate) const SNAPSHOT_COLUMNS: &str = "id, location_id, api_timestamp, captured_at, \
     temperature, feels_like, temp_min, temp_max, pressure, humidity, weather_main, \
     weather_description, weather_icon, wind_speed, wind_deg, clouds, visibility, units";

pub(crate) const OUTCOME_COLUMNS: &str = "id, location_id, kind, status, error_kind, \
     error_message, note, started_at, completed_at";

/// Fluent query builder for weather snapshots.
///
/// Filters apply to the provider observation time (`api_timestamp`).
/// Ties on `api_timestamp` are broken by insertion order.
#[derive(Debug, Default, Clone)]
pub struct SnapshotQuery {
    /// Filter by location ID.
    pub location_id: Option<i64>,
    /// Filter snapshots observed at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Filter snapshots observed at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by api_timestamp descending (newest first).
    pub newest_first: bool,
}

impl SnapshotQuery {
    /// Create a new query: all locations, no time range, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Filter by location ID.
    pub fn location(mut self, location_id: i64) -> Self {
        self.location_id = Some(location_id);
        self
    }

    /// Filter to snapshots observed at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to snapshots observed at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results by oldest first.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(location_id) = self.location_id {
            conditions.push("location_id = ?");
            params.push(Box::new(location_id));
        }

        if let Some(since) = self.since {
            conditions.push("api_timestamp >= ?");
            params.push(Box::new(since.unix_timestamp()));
        }

        if let Some(until) = self.until {
            conditions.push("api_timestamp <= ?");
            params.push(Box::new(until.unix_timestamp()));
        }

        (where_clause(&conditions), params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM weather_snapshots {where_clause} \
             ORDER BY api_timestamp {order}, id {order}"
        );
        push_paging(&mut sql, self.limit, self.offset);
        sql
    }
}

/// Fluent query builder for the sync outcome log.
///
/// Results are ordered by completion time, newest first by default.
#[derive(Debug, Default, Clone)]
pub struct OutcomeQuery {
    /// Filter by location ID.
    pub location_id: Option<i64>,
    /// Filter by terminal status.
    pub status: Option<SyncStatus>,
    /// Filter outcomes completed at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Order by completed_at descending (newest first).
    pub newest_first: bool,
}

impl OutcomeQuery {
    /// Create a new query: all locations and statuses, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Filter by location ID.
    pub fn location(mut self, location_id: i64) -> Self {
        self.location_id = Some(location_id);
        self
    }

    /// Filter by status.
    pub fn status(mut self, status: SyncStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filter to outcomes completed at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Order results by oldest first.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(location_id) = self.location_id {
            conditions.push("location_id = ?");
            params.push(Box::new(location_id));
        }

        if let Some(status) = self.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(since) = self.since {
            conditions.push("completed_at >= ?");
            params.push(Box::new(since.unix_timestamp()));
        }

        (where_clause(&conditions), params)
    }

    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT {OUTCOME_COLUMNS} FROM sync_outcomes {where_clause} \
             ORDER BY completed_at {order}, id {order}"
        );
        push_paging(&mut sql, self.limit, None);
        sql
    }
}

fn where_clause(conditions: &[&str]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

fn push_paging(sql: &mut String, limit: Option<u32>, offset: Option<u32>) {
    // SQLite requires a LIMIT before OFFSET
    match (limit, offset) {
        (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
        (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
        (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
        (None, None) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    // ==================== SnapshotQuery Tests ====================

    #[test]
    fn test_snapshot_query_new_defaults() {
        let query = SnapshotQuery::new();
        assert!(query.location_id.is_none());
        assert!(query.since.is_none());
        assert!(query.until.is_none());
        assert!(query.limit.is_none());
        assert!(query.offset.is_none());
        assert!(query.newest_first);
    }

    #[test]
    fn test_snapshot_query_default_is_oldest_first() {
        assert!(!SnapshotQuery::default().newest_first);
    }

    #[test]
    fn test_snapshot_query_build_where_empty() {
        let (where_clause, params) = SnapshotQuery::new().build_where();
        assert!(where_clause.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_snapshot_query_build_where_all_filters() {
        let query = SnapshotQuery::new()
            .location(7)
            .since(datetime!(2024-01-01 00:00:00 UTC))
            .until(datetime!(2024-01-31 23:59:59 UTC));
        let (where_clause, params) = query.build_where();

        assert_eq!(
            where_clause,
            "WHERE location_id = ? AND api_timestamp >= ? AND api_timestamp <= ?"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_snapshot_query_build_sql_basic() {
        let sql = SnapshotQuery::new().build_sql();

        assert!(sql.contains("FROM weather_snapshots"));
        assert!(sql.contains("ORDER BY api_timestamp DESC, id DESC"));
        assert!(!sql.contains("WHERE"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn test_snapshot_query_build_sql_paging() {
        let sql = SnapshotQuery::new().limit(10).offset(20).build_sql();
        assert!(sql.ends_with("LIMIT 10 OFFSET 20"));

        let sql = SnapshotQuery::new().offset(5).build_sql();
        assert!(sql.ends_with("LIMIT -1 OFFSET 5"));
    }

    #[test]
    fn test_snapshot_query_oldest_first() {
        let sql = SnapshotQuery::new().oldest_first().build_sql();
        assert!(sql.contains("ORDER BY api_timestamp ASC, id ASC"));
    }

    // ==================== OutcomeQuery Tests ====================

    #[test]
    fn test_outcome_query_filters() {
        let query = OutcomeQuery::new()
            .location(3)
            .status(SyncStatus::Failed)
            .since(datetime!(2024-06-01 00:00:00 UTC))
            .limit(20);
        let (where_clause, params) = query.build_where();

        assert!(where_clause.contains("location_id = ?"));
        assert!(where_clause.contains("status = ?"));
        assert!(where_clause.contains("completed_at >= ?"));
        assert_eq!(params.len(), 3);

        let sql = query.build_sql();
        assert!(sql.contains("FROM sync_outcomes"));
        assert!(sql.ends_with("LIMIT 20"));
    }
}
