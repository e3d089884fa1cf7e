//! Application state shared across handlers.
//!
//! # Settings Channel
//!
//! The engine reads its [`SyncSettings`] from a `watch` channel owned here.
//! The value is rebuilt from the config file and the stored preferences at
//! startup and again whenever a preference changes, so a new `units` or
//! `refresh_interval` takes effect on the next sync without a restart.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use stratus_core::{Engine, RateLimiter, Scheduler, SyncSettings};
use time::OffsetDateTime;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;

/// How long `stop` waits for an in-flight tick before aborting the task.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state.
pub struct AppState {
    /// The sync engine.
    pub engine: Engine,
    /// Configuration the server was started with.
    pub config: Config,
    /// Publishes settings to the engine.
    pub settings_tx: watch::Sender<SyncSettings>,
    /// Scheduler control state.
    pub scheduler: SchedulerState,
    /// Inbound per-client limiter.
    pub limiter: RateLimiter<IpAddr>,
}

impl AppState {
    /// Create new application state.
    ///
    /// `settings_tx` must be the sender whose receiver was given to `engine`.
    pub fn new(engine: Engine, config: Config, settings_tx: watch::Sender<SyncSettings>) -> Arc<Self> {
        let scheduler = SchedulerState::new(config.sync.tick());
        let limiter = RateLimiter::new(config.security.inbound_limit());
        Arc::new(Self {
            engine,
            config,
            settings_tx,
            scheduler,
            limiter,
        })
    }

    /// Rebuild engine settings from the config file and stored preferences
    /// and publish them.
    pub async fn reload_settings(&self) -> stratus_core::Result<SyncSettings> {
        let preferences = self.engine.list_preferences().await?;
        let settings = self.config.sync_settings().with_preferences(&preferences);
        self.settings_tx.send_replace(settings.clone());
        Ok(settings)
    }
}

struct RunningScheduler {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    started_at: OffsetDateTime,
}

/// State for tracking and controlling the scheduler task.
pub struct SchedulerState {
    tick: Duration,
    running: Mutex<Option<RunningScheduler>>,
}

/// Scheduler status reported by the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    /// Whether the loop is running.
    pub running: bool,
    /// When the loop was started.
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// Seconds since start.
    pub uptime_seconds: Option<u64>,
    /// Loop cadence.
    pub tick_secs: u64,
}

impl SchedulerState {
    /// Create a stopped scheduler state with the given cadence.
    pub fn new(tick: Duration) -> Self {
        Self {
            tick,
            running: Mutex::new(None),
        }
    }

    /// Start the loop. Returns `false` if it is already running.
    pub async fn start(&self, engine: &Engine) -> bool {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref()
            && !current.handle.is_finished()
        {
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = Scheduler::new(engine.clone(), self.tick).spawn(cancel.clone());
        *running = Some(RunningScheduler {
            cancel,
            handle,
            started_at: OffsetDateTime::now_utc(),
        });
        true
    }

    /// Stop the loop and wait for the current tick to finish.
    /// Returns `false` if it was not running.
    pub async fn stop(&self) -> bool {
        let Some(current) = self.running.lock().await.take() else {
            return false;
        };

        current.cancel.cancel();
        let abort = current.handle.abort_handle();
        match tokio::time::timeout(STOP_TIMEOUT, current.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Scheduler task ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    "Scheduler did not stop within {}s, aborting",
                    STOP_TIMEOUT.as_secs()
                );
                abort.abort();
            }
        }
        info!("Scheduler stopped");
        true
    }

    /// Check if the scheduler is running.
    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|current| !current.handle.is_finished())
    }

    /// Current status.
    pub async fn status(&self) -> SchedulerStatus {
        let running = self.running.lock().await;
        let started_at = running
            .as_ref()
            .filter(|current| !current.handle.is_finished())
            .map(|current| current.started_at);
        let uptime_seconds = started_at.map(|start| {
            (OffsetDateTime::now_utc() - start)
                .whole_seconds()
                .max(0) as u64
        });

        SchedulerStatus {
            running: started_at.is_some(),
            started_at,
            uptime_seconds,
            tick_secs: self.tick.as_secs(),
        }
    }
}
