//! Sync orchestrator.
//!
//! One sync cycle moves through `Idle -> Fetching -> {Persisting -> Done} | Failed`:
//!
//! 1. Resolve the location. An unknown id fails immediately and writes nothing.
//! 2. Non-forced calls return the cached view when the last successful sync
//!    is younger than the location's interval. No provider call is made and
//!    no outcome is written.
//! 3. Fetch current weather. A failure here is terminal: one failed outcome
//!    is recorded and the error is returned.
//! 4. Fetch the forecast. A failure here degrades the cycle: the previous
//!    forecast set is kept and the view carries a note.
//! 5. Compare the new reading with the prior snapshot and note sharp shifts.
//! 6. Commit snapshot, forecast replacement and outcome in one transaction.
//!
//! At most one cycle per location runs at a time. A second non-forced call
//! waits for the running cycle and receives its result; a forced call is
//! rejected with [`Error::SyncInProgress`]. The cycle runs on its own task,
//! so a caller that stops waiting does not cancel it.

use std::sync::{Arc, PoisonError};

use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use stratus_store::{NewOutcome, Store, SyncCommit};
use stratus_types::{ForecastItem, Location, SyncKind, WeatherReading};

use crate::engine::{Engine, EngineInner, WeatherView, assemble_view};
use crate::error::{Error, Result};
use crate::settings::SyncSettings;

/// Removes a location's in-flight entry when the cycle ends, even on panic.
struct InFlightGuard {
    inner: Arc<EngineInner>,
    location_id: i64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.location_id);
    }
}

enum Claim {
    Leader(watch::Sender<Option<Result<WeatherView>>>),
    Follower(watch::Receiver<Option<Result<WeatherView>>>),
}

impl Engine {
    /// Synchronize one location with the provider.
    ///
    /// With `force == false` the call is cache-aware and joins an in-flight
    /// cycle if there is one. With `force == true` the cache is bypassed and
    /// an in-flight cycle causes [`Error::SyncInProgress`].
    pub async fn sync(&self, location_id: i64, force: bool) -> Result<WeatherView> {
        match self.claim(location_id, force)? {
            Claim::Follower(mut rx) => {
                debug!("Joining in-flight sync for location {}", location_id);
                let outcome = rx.wait_for(Option::is_some).await;
                match outcome {
                    Ok(slot) => slot.clone().unwrap_or(Err(aborted(location_id))),
                    Err(_) => Err(aborted(location_id)),
                }
            }
            Claim::Leader(tx) => {
                let engine = self.clone();
                let guard = InFlightGuard {
                    inner: Arc::clone(&self.inner),
                    location_id,
                };
                let task = tokio::spawn(async move {
                    let result = engine.run_cycle(location_id, force).await;
                    tx.send_replace(Some(result.clone()));
                    drop(guard);
                    result
                });
                match task.await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("Sync task for location {} failed: {}", location_id, e);
                        Err(aborted(location_id))
                    }
                }
            }
        }
    }

    fn claim(&self, location_id: i64, force: bool) -> Result<Claim> {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(rx) = in_flight.get(&location_id) {
            if force {
                debug!("Rejecting forced sync for location {}: cycle in flight", location_id);
                return Err(Error::SyncInProgress(location_id));
            }
            return Ok(Claim::Follower(rx.clone()));
        }

        let (tx, rx) = watch::channel(None);
        in_flight.insert(location_id, rx);
        Ok(Claim::Leader(tx))
    }

    async fn run_cycle(&self, location_id: i64, force: bool) -> Result<WeatherView> {
        let settings = self.settings();
        let started_at = OffsetDateTime::now_utc();
        debug!("Starting sync for location {} (force: {})", location_id, force);

        // Idle: resolve the location and check the cache.
        let location = {
            let store = self.inner.store.lock().await;
            let location = store
                .get_location(location_id)?
                .ok_or(Error::LocationNotFound(location_id))?;

            if !force && let Some(last) = store.last_success(location_id)? {
                let age = (started_at - last.completed_at).whole_seconds();
                if age < i64::from(location.sync_interval_secs) {
                    debug!(
                        "Cache hit for location {}: last sync {}s ago (interval {}s)",
                        location_id, age, location.sync_interval_secs
                    );
                    let mut view = assemble_view(&store, location, settings.units)?;
                    view.sync_note = Some(cached_note(age.max(0), view.sync_note.take()));
                    return Ok(view);
                }
            }
            location
        };

        // Fetching.
        let provider = Arc::clone(&self.inner.provider);
        let coords = location.coordinates;
        let units = settings.units;

        let reading = match self
            .guarded(
                "current weather",
                settings.provider_timeout,
                provider.fetch_current(coords, units),
            )
            .await
        {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Sync failed for location {}: {}", location_id, e);
                return Err(self
                    .record_failure(location_id, SyncKind::Combined, e, started_at)
                    .await);
            }
        };

        let mut notes = Vec::new();
        let forecast = match self
            .guarded(
                "forecast",
                settings.provider_timeout,
                provider.fetch_forecast(coords, units),
            )
            .await
        {
            Ok(items) => Some(items),
            Err(e) => {
                warn!(
                    "Forecast unavailable for location {}, keeping previous forecast: {}",
                    location_id, e
                );
                notes.push(format!(
                    "Forecast unavailable ({e}); the previous forecast is kept."
                ));
                None
            }
        };
        let fetched = Fetched {
            reading,
            forecast,
            notes,
        };
        let kind = fetched.kind();

        // Persisting.
        let mut store = self.inner.store.lock().await;
        let completed_at = OffsetDateTime::now_utc();
        let persisted = persist(
            &mut store,
            &location,
            &settings,
            &fetched,
            started_at,
            completed_at,
        );

        match persisted {
            Ok(()) => {
                debug!("Sync for location {} done ({})", location_id, kind.as_str());
                Ok(assemble_view(&store, location, units)?)
            }
            Err(e) => {
                let err = Error::from(e);
                warn!("Sync failed for location {}: {}", location_id, err);
                let outcome = NewOutcome::failure(
                    location_id,
                    kind,
                    err.kind(),
                    err.to_string(),
                    started_at,
                    OffsetDateTime::now_utc(),
                );
                if let Err(record_err) = store.record_outcome(&outcome) {
                    error!(
                        "Could not record failed sync for location {}: {}",
                        location_id, record_err
                    );
                }
                Err(err)
            }
        }
    }

    /// Write the failed outcome for a cycle and hand the error back.
    async fn record_failure(
        &self,
        location_id: i64,
        kind: SyncKind,
        err: Error,
        started_at: OffsetDateTime,
    ) -> Error {
        let outcome = NewOutcome::failure(
            location_id,
            kind,
            err.kind(),
            err.to_string(),
            started_at,
            OffsetDateTime::now_utc(),
        );
        let store = self.inner.store.lock().await;
        if let Err(record_err) = store.record_outcome(&outcome) {
            error!(
                "Could not record failed sync for location {}: {}",
                location_id, record_err
            );
        }
        err
    }
}

/// Provider data gathered by one cycle.
struct Fetched {
    reading: WeatherReading,
    forecast: Option<Vec<ForecastItem>>,
    notes: Vec<String>,
}

impl Fetched {
    fn kind(&self) -> SyncKind {
        if self.forecast.is_some() {
            SyncKind::Combined
        } else {
            SyncKind::Current
        }
    }
}

fn persist(
    store: &mut Store,
    location: &Location,
    settings: &SyncSettings,
    fetched: &Fetched,
    started_at: OffsetDateTime,
    completed_at: OffsetDateTime,
) -> stratus_store::Result<()> {
    let mut notes = Vec::with_capacity(fetched.notes.len() + 1);
    let previous = store.latest_snapshot(location.id)?;
    if let Some(conflict) = settings.conflict.detect(
        previous.as_ref(),
        &fetched.reading,
        settings.units,
        location.sync_interval(),
        completed_at,
    ) {
        info!("Conflict noted for location {}: {}", location.id, conflict);
        notes.push(conflict);
    }
    notes.extend(fetched.notes.iter().cloned());

    let note = (!notes.is_empty()).then(|| notes.join(" "));
    let outcome = NewOutcome::success(location.id, fetched.kind(), note, started_at, completed_at);
    store.commit_sync(&SyncCommit {
        location_id: location.id,
        reading: &fetched.reading,
        units: settings.units,
        forecast: fetched.forecast.as_deref(),
        outcome: &outcome,
    })?;
    Ok(())
}

fn cached_note(age_secs: i64, previous: Option<String>) -> String {
    let cached = format!("Served cached data from a sync {age_secs}s ago.");
    match previous {
        Some(note) => format!("{cached} {note}"),
        None => cached,
    }
}

fn aborted(location_id: i64) -> Error {
    Error::Storage(format!(
        "sync cycle for location {location_id} ended without a result"
    ))
}
