//! The synchronization engine handle.
//!
//! [`Engine`] owns the store, the provider gateway, the outbound rate limiter
//! and the in-flight sync registry. It is cheap to clone; every clone shares
//! the same state. Operations are split across modules:
//!
//! - [`sync`](crate::sync): the sync orchestrator
//! - [`reconcile`](crate::reconcile): history reconciliation
//! - [`status`](crate::status): fleet health
//! - [`catalog`](crate::catalog): location CRUD, preferences and exports
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use stratus_core::{Engine, MockProvider, RateLimitConfig, SyncSettings};
//! use stratus_store::Store;
//! use tokio::sync::watch;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> stratus_core::Result<()> {
//! let store = Store::open_in_memory().unwrap();
//! let (_settings_tx, settings_rx) = watch::channel(SyncSettings::default());
//! let engine = Engine::new(
//!     store,
//!     Arc::new(MockProvider::new()),
//!     settings_rx,
//!     RateLimitConfig::outbound_default(),
//! );
//!
//! let london = engine.add_location("London", Some("GB")).await?;
//! let view = engine.sync(london.id, true).await?;
//! assert!(view.current.is_some());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::warn;

use stratus_store::{StoredSnapshot, Store};
use stratus_types::{ForecastItem, Location, Units};

use crate::error::{Error, ProviderResult, Result};
use crate::insights::{WeatherInsights, build_insights};
use crate::provider::WeatherProvider;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::settings::SyncSettings;

/// Bucket key for the global outbound provider budget.
pub(crate) const OUTBOUND_BUCKET: &str = "provider";

/// Result slot shared between the cycle that runs a sync and its waiters.
pub(crate) type CycleSlot = watch::Receiver<Option<Result<WeatherView>>>;

/// Assembled view of a location's cached weather.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherView {
    /// The location.
    pub location: Location,
    /// Snapshot with the greatest observation time.
    pub current: Option<StoredSnapshot>,
    /// The current forecast set, earliest first.
    pub forecast: Vec<ForecastItem>,
    /// Completion time of the most recent successful sync.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_synced: Option<OffsetDateTime>,
    /// Derived insights.
    pub insights: Option<WeatherInsights>,
    /// Advisory note (conflict, degraded forecast or cache hit).
    pub sync_note: Option<String>,
}

pub(crate) struct EngineInner {
    pub(crate) store: Mutex<Store>,
    pub(crate) provider: Arc<dyn WeatherProvider>,
    pub(crate) outbound: RateLimiter<&'static str>,
    pub(crate) in_flight: StdMutex<HashMap<i64, CycleSlot>>,
    pub(crate) settings: watch::Receiver<SyncSettings>,
}

/// Shared handle to the sync engine.
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("provider_configured", &self.inner.provider.is_configured())
            .field("outbound", &self.inner.outbound.config())
            .field("settings", &*self.inner.settings.borrow())
            .finish()
    }
}

impl Engine {
    /// Create an engine.
    ///
    /// `settings` is read on every operation, so values published on the
    /// matching sender take effect for the next call.
    pub fn new(
        store: Store,
        provider: Arc<dyn WeatherProvider>,
        settings: watch::Receiver<SyncSettings>,
        outbound: RateLimitConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store: Mutex::new(store),
                provider,
                outbound: RateLimiter::new(outbound),
                in_flight: StdMutex::new(HashMap::new()),
                settings,
            }),
        }
    }

    /// The latest published settings.
    pub fn settings(&self) -> SyncSettings {
        self.inner.settings.borrow().clone()
    }

    /// The provider gateway.
    pub fn provider(&self) -> &Arc<dyn WeatherProvider> {
        &self.inner.provider
    }

    /// Lock the store for direct access.
    ///
    /// Intended for read-only inspection and test seeding; weather data is
    /// otherwise written only by the sync orchestrator.
    pub async fn store(&self) -> MutexGuard<'_, Store> {
        self.inner.store.lock().await
    }

    /// Whether a sync cycle for `location_id` is running.
    pub fn is_syncing(&self, location_id: i64) -> bool {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(&location_id)
    }

    /// Cached weather for a location without calling the provider.
    pub async fn get_weather(&self, location_id: i64) -> Result<WeatherView> {
        let units = self.settings().units;
        let store = self.inner.store.lock().await;
        let location = store
            .get_location(location_id)?
            .ok_or(Error::LocationNotFound(location_id))?;
        Ok(assemble_view(&store, location, units)?)
    }

    /// Run one provider call under the outbound budget and a timeout.
    pub(crate) async fn guarded<T, F>(&self, what: &str, timeout: Duration, call: F) -> Result<T>
    where
        F: Future<Output = ProviderResult<T>>,
    {
        self.guarded_many(what, 1, timeout, call).await
    }

    /// Like [`guarded`](Self::guarded) for a gateway call that issues `cost`
    /// upstream requests. All tokens are taken up front or none are.
    pub(crate) async fn guarded_many<T, F>(
        &self,
        what: &str,
        cost: u32,
        timeout: Duration,
        call: F,
    ) -> Result<T>
    where
        F: Future<Output = ProviderResult<T>>,
    {
        if let Err(retry_after) = self.inner.outbound.check_many(&OUTBOUND_BUCKET, cost) {
            let secs = retry_after.as_secs().max(1);
            warn!(
                "Outbound provider budget exhausted, refusing {} (retry in {}s)",
                what, secs
            );
            return Err(Error::RateLimited {
                message: format!("outbound provider budget exhausted; retry in {secs}s"),
                retry_after_secs: Some(secs),
            });
        }

        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::ProviderUnavailable(format!(
                "{} timed out after {}s",
                what,
                timeout.as_secs_f32()
            ))),
        }
    }
}

/// Build the view of a location from the store.
///
/// Stored values are re-expressed in `units`. The note is the one recorded
/// by the most recent successful sync.
pub(crate) fn assemble_view(
    store: &Store,
    location: Location,
    units: Units,
) -> stratus_store::Result<WeatherView> {
    let current = store
        .latest_snapshot(location.id)?
        .map(|s| s.into_units(units));
    let previous = store
        .previous_snapshot(location.id)?
        .map(|s| s.into_units(units));
    let forecast: Vec<ForecastItem> = store
        .get_forecasts(location.id)?
        .iter()
        .map(|stored| stored.item_in(units))
        .collect();
    let last_success = store.last_success(location.id)?;

    let insights = build_insights(
        current.as_ref().map(|s| &s.reading),
        previous.as_ref().map(|s| &s.reading),
        &forecast,
        units,
    );

    Ok(WeatherView {
        location,
        current,
        forecast,
        last_synced: last_success.as_ref().map(|o| o.completed_at),
        insights,
        sync_note: last_success.and_then(|o| o.note),
    })
}
