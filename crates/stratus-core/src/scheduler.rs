//! Background sync scheduler.
//!
//! A single loop wakes on a fixed cadence, finds the locations whose last
//! successful sync is at least one interval old, and runs a non-forced
//! [`Engine::sync`] for each of them concurrently. A failing location never
//! stops the loop or delays the others; the orchestrator has already recorded
//! the failure, so the scheduler only logs it.
//!
//! Stopping is cooperative: cancellation is observed between ticks, so a tick
//! that has started runs to completion.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::Engine;
use crate::error::Result;

/// Default scheduler cadence.
pub const DEFAULT_TICK: Duration = Duration::from_secs(30);

/// Consecutive failures logged at `warn` before a single `error`.
const WARN_FAILURES: u32 = 3;

/// What one scheduler tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Locations found due for a sync.
    pub due: usize,
    /// Syncs that succeeded.
    pub succeeded: usize,
    /// Syncs that failed.
    pub failed: usize,
}

/// Periodic driver for non-forced syncs.
#[derive(Debug)]
pub struct Scheduler {
    engine: Engine,
    tick: Duration,
    consecutive_failures: HashMap<i64, u32>,
}

impl Scheduler {
    /// Create a scheduler that wakes every `tick`.
    pub fn new(engine: Engine, tick: Duration) -> Self {
        Self {
            engine,
            tick,
            consecutive_failures: HashMap::new(),
        }
    }

    /// The cadence.
    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Run the loop on its own task until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Run the loop until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Scheduler started (tick: {}s)", self.tick.as_secs());

        let mut timer = interval(self.tick);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {}
            }

            match self.run_tick().await {
                Ok(report) if report.due > 0 => debug!(
                    "Scheduler tick: {} due, {} synced, {} failed",
                    report.due, report.succeeded, report.failed
                ),
                Ok(_) => {}
                Err(e) => warn!("Scheduler tick could not list locations: {}", e),
            }
        }

        info!("Scheduler stopped");
    }

    /// Sync every location that is due, once.
    pub async fn run_tick(&mut self) -> Result<TickReport> {
        let now = OffsetDateTime::now_utc();
        let (tracked, due): (HashSet<i64>, Vec<i64>) = {
            let store = self.engine.store().await;
            let last_success = store.last_success_by_location()?;
            let locations = store.list_locations()?;
            let due = locations
                .iter()
                .filter(|location| match last_success.get(&location.id) {
                    None => true,
                    Some(last) => {
                        (now - *last).whole_seconds() >= i64::from(location.sync_interval_secs)
                    }
                })
                .map(|location| location.id)
                .collect();
            (locations.iter().map(|location| location.id).collect(), due)
        };

        // Forget failure streaks of deleted locations.
        self.consecutive_failures.retain(|id, _| tracked.contains(id));

        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };
        if due.is_empty() {
            return Ok(report);
        }

        let results = join_all(due.iter().map(|&id| {
            let engine = self.engine.clone();
            async move { (id, engine.sync(id, false).await) }
        }))
        .await;

        for (location_id, result) in results {
            match result {
                Ok(_) => {
                    report.succeeded += 1;
                    self.consecutive_failures.remove(&location_id);
                }
                Err(e) => {
                    report.failed += 1;
                    let count = self.consecutive_failures.entry(location_id).or_insert(0);
                    *count += 1;
                    if *count <= WARN_FAILURES {
                        warn!(
                            "Scheduled sync for location {} failed: {} (attempt {})",
                            location_id, e, count
                        );
                    } else if *count == WARN_FAILURES + 1 {
                        error!(
                            "Scheduled sync for location {} failed {} times in a row, will keep trying silently",
                            location_id, count
                        );
                    }
                }
            }
        }

        Ok(report)
    }

    /// Consecutive scheduled failures recorded for a location.
    pub fn consecutive_failures(&self, location_id: i64) -> u32 {
        self.consecutive_failures
            .get(&location_id)
            .copied()
            .unwrap_or(0)
    }
}
