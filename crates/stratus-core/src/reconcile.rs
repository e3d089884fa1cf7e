//! History reconciliation.
//!
//! Serves a window of historical observations from exactly one source: the
//! provider's historical endpoint or locally stored snapshots. The chosen
//! source is always reported, and records from the two sources are never
//! mixed in one result.
//!
//! The window starts at midnight UTC `days` days ago.

use serde::Serialize;
use time::{Date, OffsetDateTime, Time};
use tracing::{debug, warn};

use stratus_store::SnapshotQuery;
use stratus_types::{HistorySource, Location, SourcePreference, WeatherReading};

use crate::engine::Engine;
use crate::error::{Error, Result};

/// Largest history window accepted by [`Engine::get_history`].
pub const MAX_HISTORY_DAYS: u32 = 30;

/// Source-attributed history records, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryResult {
    /// Which source served every record.
    pub source: HistorySource,
    /// The records.
    pub records: Vec<WeatherReading>,
}

/// Start of a history window of `days` days ending at `now`.
pub fn window_start(now: OffsetDateTime, days: u32) -> OffsetDateTime {
    (now - time::Duration::days(i64::from(days))).replace_time(Time::MIDNIGHT)
}

impl Engine {
    /// Historical observations for the last `days` days.
    ///
    /// - [`SourcePreference::Local`]: stored snapshots, at most one per UTC
    ///   calendar day (the newest of that day), at most `days` records.
    /// - [`SourcePreference::Api`]: the provider's records inside the window;
    ///   provider failures propagate.
    /// - [`SourcePreference::Auto`]: the provider's records when the call
    ///   succeeds with at least one record inside the window, otherwise local.
    pub async fn get_history(
        &self,
        location_id: i64,
        days: u32,
        source: SourcePreference,
    ) -> Result<HistoryResult> {
        if !(1..=MAX_HISTORY_DAYS).contains(&days) {
            return Err(Error::invalid(
                "days",
                format!("must be between 1 and {MAX_HISTORY_DAYS}"),
            ));
        }

        let location = self.require_location(location_id).await?;
        let now = OffsetDateTime::now_utc();
        let start = window_start(now, days);

        match source {
            SourcePreference::Local => self.local_history(location_id, days, start).await,
            SourcePreference::Api => self.api_history(&location, days, start).await,
            SourcePreference::Auto => match self.api_history(&location, days, start).await {
                Ok(result) if !result.records.is_empty() => Ok(result),
                Ok(_) => {
                    debug!(
                        "Provider returned no history for location {}, using local snapshots",
                        location_id
                    );
                    self.local_history(location_id, days, start).await
                }
                Err(e) => {
                    warn!(
                        "Provider history failed for location {}, using local snapshots: {}",
                        location_id, e
                    );
                    self.local_history(location_id, days, start).await
                }
            },
        }
    }

    async fn local_history(
        &self,
        location_id: i64,
        days: u32,
        start: OffsetDateTime,
    ) -> Result<HistoryResult> {
        let snapshots = {
            let store = self.inner.store.lock().await;
            store.query_snapshots(&SnapshotQuery::new().location(location_id).since(start))?
        };

        let units = self.settings().units;
        let records = one_per_day(
            snapshots.into_iter().map(|s| s.reading_in(units)),
            days as usize,
        );
        Ok(HistoryResult {
            source: HistorySource::Local,
            records,
        })
    }

    async fn api_history(
        &self,
        location: &Location,
        days: u32,
        start: OffsetDateTime,
    ) -> Result<HistoryResult> {
        let settings = self.settings();
        let timeout = settings.provider_timeout.saturating_mul(days);

        let mut records = self
            .guarded_many(
                "history",
                days,
                timeout,
                self.inner
                    .provider
                    .fetch_history(location.coordinates, days, settings.units),
            )
            .await?;

        records.retain(|r| r.api_timestamp >= start);
        records.sort_by(|a, b| b.api_timestamp.cmp(&a.api_timestamp));

        Ok(HistoryResult {
            source: HistorySource::Api,
            records,
        })
    }

    pub(crate) async fn require_location(&self, location_id: i64) -> Result<Location> {
        let store = self.inner.store.lock().await;
        store
            .get_location(location_id)?
            .ok_or(Error::LocationNotFound(location_id))
    }
}

/// Keep the first record seen for each UTC date, up to `limit` records.
///
/// Input is expected newest first, so the newest record of each day wins.
fn one_per_day(records: impl Iterator<Item = WeatherReading>, limit: usize) -> Vec<WeatherReading> {
    let mut last_day: Option<Date> = None;
    let mut kept = Vec::new();

    for record in records {
        let day = record.api_timestamp.date();
        if last_day == Some(day) {
            continue;
        }
        last_day = Some(day);
        kept.push(record);
        if kept.len() == limit {
            break;
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;
    use time::macros::datetime;

    fn at(ts: OffsetDateTime) -> WeatherReading {
        let mut reading = MockProvider::sample_reading();
        reading.api_timestamp = ts;
        reading
    }

    #[test]
    fn test_window_start_is_midnight() {
        let now = datetime!(2024-03-10 15:42:10 UTC);
        assert_eq!(window_start(now, 5), datetime!(2024-03-05 00:00:00 UTC));
    }

    #[test]
    fn test_one_per_day_keeps_newest() {
        let records = vec![
            at(datetime!(2024-03-10 21:00 UTC)),
            at(datetime!(2024-03-10 06:00 UTC)),
            at(datetime!(2024-03-09 23:00 UTC)),
            at(datetime!(2024-03-08 12:00 UTC)),
            at(datetime!(2024-03-08 03:00 UTC)),
        ];

        let kept = one_per_day(records.into_iter(), 10);
        let stamps: Vec<_> = kept.iter().map(|r| r.api_timestamp).collect();
        assert_eq!(
            stamps,
            vec![
                datetime!(2024-03-10 21:00 UTC),
                datetime!(2024-03-09 23:00 UTC),
                datetime!(2024-03-08 12:00 UTC),
            ]
        );
    }

    #[test]
    fn test_one_per_day_truncates() {
        let records = (0..10).map(|d| at(datetime!(2024-03-20 12:00 UTC) - time::Duration::days(d)));
        assert_eq!(one_per_day(records, 4).len(), 4);
    }
}
