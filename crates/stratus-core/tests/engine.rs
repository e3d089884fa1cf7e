//! Engine behavior against the mock provider.
//!
//! Run with: `cargo test --package stratus-core --test engine`

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;

use stratus_core::{
    Engine, Error, ErrorKind, HistorySource, MockOperation, MockProvider, MockProviderBuilder,
    ProviderError, RateLimitConfig, SourcePreference, SyncSettings, Units, WeatherReading,
};
use stratus_store::{NewOutcome, OutcomeQuery, Store};
use stratus_types::{SyncKind, SyncStatus};

fn engine_with(provider: Arc<MockProvider>) -> Engine {
    engine_with_settings(provider, SyncSettings::default())
}

fn engine_with_settings(provider: Arc<MockProvider>, settings: SyncSettings) -> Engine {
    let (_settings_tx, rx) = watch::channel(settings);
    Engine::new(
        Store::open_in_memory().unwrap(),
        provider,
        rx,
        RateLimitConfig::outbound_default(),
    )
}

fn reading_at(temperature: f64, observed: OffsetDateTime) -> WeatherReading {
    let mut reading = MockProvider::sample_reading();
    reading.temperature = temperature;
    reading.api_timestamp = observed;
    reading
}

// ==================== Sync cycles ====================

#[tokio::test]
async fn test_forced_sync_persists_everything() {
    let provider = Arc::new(MockProvider::new());
    let engine = engine_with(provider.clone());
    let london = engine.add_location("London", Some("GB")).await.unwrap();

    let view = engine.sync(london.id, true).await.unwrap();
    assert_eq!(view.location.id, london.id);
    assert!(view.current.is_some());
    assert_eq!(view.forecast.len(), 40);
    assert!(view.last_synced.is_some());
    assert!(view.insights.is_some());
    assert_eq!(view.sync_note, None);

    let store = engine.store().await;
    assert_eq!(store.count_snapshots(Some(london.id)).unwrap(), 1);
    assert_eq!(store.count_forecasts(Some(london.id)).unwrap(), 40);
    let outcomes = store
        .query_outcomes(&OutcomeQuery::new().location(london.id))
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, SyncStatus::Success);
    assert_eq!(outcomes[0].kind, SyncKind::Combined);
}

#[tokio::test]
async fn test_sync_unknown_location() {
    let provider = Arc::new(MockProvider::new());
    let engine = engine_with(provider.clone());

    let err = engine.sync(42, true).await.unwrap_err();
    assert_eq!(err, Error::LocationNotFound(42));
    assert_eq!(provider.total_calls(), 0);
    assert_eq!(engine.store().await.count_outcomes(None).unwrap(), 0);
}

#[tokio::test]
async fn test_cache_hit_makes_no_provider_calls() {
    let provider = Arc::new(MockProvider::new());
    let engine = engine_with(provider.clone());
    let paris = engine.add_location("Paris", None).await.unwrap();

    engine.sync(paris.id, true).await.unwrap();
    provider.reset_calls();

    for _ in 0..3 {
        let view = engine.sync(paris.id, false).await.unwrap();
        assert!(view.current.is_some());
        let note = view.sync_note.unwrap();
        assert!(note.starts_with("Served cached data"), "{note}");
    }

    assert_eq!(provider.total_calls(), 0);
    let store = engine.store().await;
    assert_eq!(store.count_snapshots(Some(paris.id)).unwrap(), 1);
    assert_eq!(store.count_outcomes(Some(paris.id)).unwrap(), 1);
}

#[tokio::test]
async fn test_stale_cache_refetches() {
    let provider = Arc::new(MockProvider::new());
    let engine = engine_with(provider.clone());
    let paris = engine.add_location("Paris", None).await.unwrap();

    // A success older than the 600 s interval.
    let long_ago = OffsetDateTime::now_utc() - time::Duration::hours(1);
    engine
        .store()
        .await
        .record_outcome(&NewOutcome::success(
            paris.id,
            SyncKind::Combined,
            None,
            long_ago,
            long_ago,
        ))
        .unwrap();

    engine.sync(paris.id, false).await.unwrap();
    assert_eq!(provider.current_calls(), 1);
}

#[tokio::test]
async fn test_concurrent_syncs_share_one_cycle() {
    let provider = Arc::new(
        MockProviderBuilder::new()
            .latency(Duration::from_millis(200))
            .build(),
    );
    let engine = engine_with(provider.clone());
    let tokyo = engine.add_location("Tokyo", None).await.unwrap();
    provider.reset_calls();

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let engine = engine.clone();
            let id = tokyo.id;
            tokio::spawn(async move { engine.sync(id, false).await })
        })
        .collect();

    for handle in handles {
        let view = handle.await.unwrap().unwrap();
        assert!(view.current.is_some());
    }

    assert_eq!(provider.current_calls(), 1);
    assert_eq!(provider.peak_concurrent_current(), 1);
    assert_eq!(engine.store().await.count_outcomes(Some(tokyo.id)).unwrap(), 1);
    assert!(!engine.is_syncing(tokyo.id));
}

#[tokio::test]
async fn test_forced_sync_rejected_while_in_flight() {
    let provider = Arc::new(
        MockProviderBuilder::new()
            .latency(Duration::from_millis(300))
            .build(),
    );
    let engine = engine_with(provider.clone());
    let tokyo = engine.add_location("Tokyo", None).await.unwrap();

    let running = {
        let engine = engine.clone();
        let id = tokyo.id;
        tokio::spawn(async move { engine.sync(id, true).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.is_syncing(tokyo.id));

    let err = engine.sync(tokyo.id, true).await.unwrap_err();
    assert_eq!(err, Error::SyncInProgress(tokyo.id));
    assert_eq!(err.kind(), ErrorKind::SyncInProgress);

    running.await.unwrap().unwrap();
    assert_eq!(engine.store().await.count_outcomes(Some(tokyo.id)).unwrap(), 1);
}

#[tokio::test]
async fn test_abandoned_caller_does_not_cancel_cycle() {
    let provider = Arc::new(
        MockProviderBuilder::new()
            .latency(Duration::from_millis(200))
            .build(),
    );
    let engine = engine_with(provider.clone());
    let tokyo = engine.add_location("Tokyo", None).await.unwrap();

    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), engine.sync(tokyo.id, true)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(800)).await;
    let store = engine.store().await;
    assert_eq!(store.count_snapshots(Some(tokyo.id)).unwrap(), 1);
    assert_eq!(store.count_outcomes(Some(tokyo.id)).unwrap(), 1);
}

#[tokio::test]
async fn test_current_failure_is_terminal() {
    let provider = Arc::new(MockProvider::new());
    let engine = engine_with(provider.clone());
    let paris = engine.add_location("Paris", None).await.unwrap();
    provider
        .set_failure(
            MockOperation::Current,
            Some(ProviderError::Unavailable("HTTP 503".into())),
        )
        .await;

    let err = engine.sync(paris.id, true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
    assert_eq!(provider.forecast_calls(), 0);

    let store = engine.store().await;
    assert_eq!(store.count_snapshots(Some(paris.id)).unwrap(), 0);
    let outcomes = store
        .query_outcomes(&OutcomeQuery::new().location(paris.id))
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, SyncStatus::Failed);
    assert_eq!(outcomes[0].error_kind, Some(ErrorKind::ProviderUnavailable));
}

#[tokio::test]
async fn test_forecast_failure_degrades() {
    let provider = Arc::new(MockProvider::new());
    let engine = engine_with(provider.clone());
    let paris = engine.add_location("Paris", None).await.unwrap();
    engine.sync(paris.id, true).await.unwrap();
    let before = engine.store().await.get_forecasts(paris.id).unwrap();

    provider
        .set_failure(MockOperation::Forecast, Some(ProviderError::RateLimited))
        .await;
    let view = engine.sync(paris.id, true).await.unwrap();

    let note = view.sync_note.unwrap();
    assert!(note.contains("Forecast unavailable"), "{note}");
    assert_eq!(view.forecast.len(), before.len());

    let store = engine.store().await;
    assert_eq!(store.get_forecasts(paris.id).unwrap(), before);
    assert_eq!(store.count_snapshots(Some(paris.id)).unwrap(), 2);
    let latest = store
        .query_outcomes(&OutcomeQuery::new().location(paris.id).limit(1))
        .unwrap();
    assert_eq!(latest[0].status, SyncStatus::Success);
    assert_eq!(latest[0].kind, SyncKind::Current);
}

#[tokio::test]
async fn test_forecast_replacement_is_all_or_nothing() {
    let provider = Arc::new(MockProvider::new());
    let engine = engine_with(provider.clone());
    let paris = engine.add_location("Paris", None).await.unwrap();
    engine.sync(paris.id, true).await.unwrap();

    let mut replacement = MockProvider::sample_forecast(8);
    for item in &mut replacement {
        item.condition = "Rain".into();
        item.pop = 0.8;
    }
    provider.set_forecast(replacement).await;
    engine.sync(paris.id, true).await.unwrap();

    let forecasts = engine.store().await.get_forecasts(paris.id).unwrap();
    assert_eq!(forecasts.len(), 8);
    let fetched_at = forecasts[0].fetched_at;
    assert!(forecasts.iter().all(|f| f.fetched_at == fetched_at));
    assert!(forecasts.iter().all(|f| f.item.condition == "Rain"));
}

#[tokio::test]
async fn test_provider_timeout_is_unavailable() {
    let provider = Arc::new(
        MockProviderBuilder::new()
            .latency(Duration::from_millis(500))
            .build(),
    );
    let settings = SyncSettings::default().provider_timeout(Duration::from_millis(50));
    let engine = engine_with_settings(provider, settings);
    let store_location = {
        let store = engine.store().await;
        store
            .insert_location(&stratus_store::NewLocation {
                name: "Oslo".into(),
                country: "NO".into(),
                coordinates: stratus_core::Coordinates::new(59.91, 10.75).unwrap(),
                display_name: None,
                sync_interval_secs: 600,
            })
            .unwrap()
    };

    let err = engine.sync(store_location.id, true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
    assert!(err.to_string().contains("timed out"), "{err}");
}

#[tokio::test]
async fn test_outbound_budget_exhaustion() {
    let provider = Arc::new(MockProvider::new());
    let (_tx, rx) = watch::channel(SyncSettings::default());
    let engine = Engine::new(
        Store::open_in_memory().unwrap(),
        provider.clone(),
        rx,
        RateLimitConfig::new(3, Duration::from_secs(60)),
    );
    // geocode + current + forecast use the whole budget.
    let paris = engine.add_location("Paris", None).await.unwrap();
    engine.sync(paris.id, true).await.unwrap();

    let err = engine.sync(paris.id, true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(provider.current_calls(), 1);
    let retry = err.retry_after_secs().unwrap();
    assert!((1..=60).contains(&retry), "{retry}");

    let failed = engine
        .store()
        .await
        .query_outcomes(&OutcomeQuery::new().status(SyncStatus::Failed))
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error_kind, Some(ErrorKind::RateLimited));
}

#[tokio::test]
async fn test_history_charges_one_token_per_day() {
    let provider = Arc::new(MockProvider::new());
    let (_tx, rx) = watch::channel(SyncSettings::default());
    let engine = Engine::new(
        Store::open_in_memory().unwrap(),
        provider.clone(),
        rx,
        RateLimitConfig::new(10, Duration::from_secs(60)),
    );
    // geocode takes one token, five days of history take five more.
    let paris = engine.add_location("Paris", None).await.unwrap();
    engine
        .get_history(paris.id, 5, SourcePreference::Api)
        .await
        .unwrap();
    assert_eq!(provider.history_calls(), 1);

    // Four tokens left: a five-day window is refused before any request.
    let err = engine
        .get_history(paris.id, 5, SourcePreference::Api)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(provider.history_calls(), 1);

    // A window larger than the whole budget never reaches the provider.
    let err = engine
        .get_history(paris.id, 30, SourcePreference::Api)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(provider.history_calls(), 1);

    // The remaining tokens are still usable.
    engine
        .get_history(paris.id, 4, SourcePreference::Api)
        .await
        .unwrap();
    assert_eq!(provider.history_calls(), 2);
}

// ==================== Conflict notes ====================

#[tokio::test]
async fn test_conflict_note_for_large_shift() {
    let provider = Arc::new(MockProviderBuilder::new().temperature(18.0).build());
    let engine = engine_with(provider.clone());
    let paris = engine.add_location("Paris", None).await.unwrap();
    engine.sync(paris.id, true).await.unwrap();

    provider
        .push_reading(reading_at(35.0, OffsetDateTime::now_utc()))
        .await;
    let view = engine.sync(paris.id, true).await.unwrap();

    let note = view.sync_note.expect("conflict note");
    assert!(note.contains("+17.0°C"), "{note}");
    assert_eq!(view.current.unwrap().reading.temperature, 35.0);

    // The note is still served on cached reads.
    let cached = engine.get_weather(paris.id).await.unwrap();
    assert_eq!(cached.sync_note.as_deref(), Some(note.as_str()));
}

#[tokio::test]
async fn test_no_conflict_note_for_small_shift() {
    let provider = Arc::new(MockProviderBuilder::new().temperature(18.0).build());
    let engine = engine_with(provider.clone());
    let paris = engine.add_location("Paris", None).await.unwrap();
    engine.sync(paris.id, true).await.unwrap();

    provider
        .push_reading(reading_at(20.0, OffsetDateTime::now_utc()))
        .await;
    let view = engine.sync(paris.id, true).await.unwrap();
    assert_eq!(view.sync_note, None);
}

#[tokio::test]
async fn test_units_switch_does_not_look_like_a_shift() {
    let provider = Arc::new(MockProviderBuilder::new().temperature(18.0).build());
    let (settings_tx, rx) = watch::channel(SyncSettings::default());
    let engine = Engine::new(
        Store::open_in_memory().unwrap(),
        provider.clone(),
        rx,
        RateLimitConfig::outbound_default(),
    );
    let paris = engine.add_location("Paris", None).await.unwrap();
    engine.sync(paris.id, true).await.unwrap();

    settings_tx.send_modify(|settings| settings.units = Units::Imperial);
    let mut reading = reading_at(64.4, OffsetDateTime::now_utc());
    reading.wind_speed = Units::Metric.convert_wind_speed(reading.wind_speed, Units::Imperial);
    provider.push_reading(reading).await;
    let view = engine.sync(paris.id, true).await.unwrap();

    assert_eq!(view.sync_note, None);
    let current = view.current.unwrap();
    assert_eq!(current.units, Units::Imperial);
    assert_eq!(current.reading.temperature, 64.4);
    let change = view.insights.unwrap().change_summary.unwrap();
    assert_eq!(change.temperature_delta, 0.0);

    let store = engine.store().await;
    let previous = store.previous_snapshot(paris.id).unwrap().unwrap();
    assert_eq!(previous.units, Units::Metric);
    assert_eq!(previous.reading.temperature, 18.0);
}

// ==================== History ====================

async fn seed_week_of_snapshots(engine: &Engine, location_id: i64) {
    let now = OffsetDateTime::now_utc();
    let store = engine.store().await;
    for step in 0..(7 * 8) {
        let observed = now - time::Duration::hours(3 * step);
        store
            .insert_snapshot(location_id, &reading_at(15.0, observed), Units::Metric, observed)
            .unwrap();
    }
}

#[tokio::test]
async fn test_local_history_one_per_day() {
    let engine = engine_with(Arc::new(MockProvider::new()));
    let paris = engine.add_location("Paris", None).await.unwrap();
    seed_week_of_snapshots(&engine, paris.id).await;

    let result = engine
        .get_history(paris.id, 5, SourcePreference::Local)
        .await
        .unwrap();
    assert_eq!(result.source, HistorySource::Local);
    assert_eq!(result.records.len(), 5);

    let days: Vec<_> = result
        .records
        .iter()
        .map(|r| r.api_timestamp.date())
        .collect();
    for pair in days.windows(2) {
        assert!(pair[0] > pair[1], "not newest first: {days:?}");
    }
}

#[tokio::test]
async fn test_local_history_uses_active_units() {
    let provider = Arc::new(MockProvider::new());
    let (settings_tx, rx) = watch::channel(SyncSettings::default());
    let engine = Engine::new(
        Store::open_in_memory().unwrap(),
        provider,
        rx,
        RateLimitConfig::outbound_default(),
    );
    let paris = engine.add_location("Paris", None).await.unwrap();
    seed_week_of_snapshots(&engine, paris.id).await;

    settings_tx.send_modify(|settings| settings.units = Units::Imperial);
    let result = engine
        .get_history(paris.id, 3, SourcePreference::Local)
        .await
        .unwrap();
    assert_eq!(result.records.len(), 3);
    for record in &result.records {
        assert!((record.temperature - 59.0).abs() < 1e-9, "{}", record.temperature);
    }
}

#[tokio::test]
async fn test_auto_history_prefers_api() {
    let now = OffsetDateTime::now_utc();
    let history = (1..=3)
        .map(|d| reading_at(10.0, now - time::Duration::days(d)))
        .collect();
    let provider = Arc::new(MockProviderBuilder::new().history(history).build());
    let engine = engine_with(provider.clone());
    let paris = engine.add_location("Paris", None).await.unwrap();
    seed_week_of_snapshots(&engine, paris.id).await;

    let result = engine
        .get_history(paris.id, 5, SourcePreference::Auto)
        .await
        .unwrap();
    assert_eq!(result.source, HistorySource::Api);
    assert_eq!(result.records.len(), 3);
    assert!(result.records.iter().all(|r| r.temperature == 10.0));
}

#[tokio::test]
async fn test_auto_history_falls_back_to_local() {
    let provider = Arc::new(MockProvider::new());
    let engine = engine_with(provider.clone());
    let paris = engine.add_location("Paris", None).await.unwrap();
    seed_week_of_snapshots(&engine, paris.id).await;

    // Provider returns nothing.
    let result = engine
        .get_history(paris.id, 5, SourcePreference::Auto)
        .await
        .unwrap();
    assert_eq!(result.source, HistorySource::Local);
    assert_eq!(result.records.len(), 5);

    // Provider fails.
    provider
        .set_failure(
            MockOperation::History,
            Some(ProviderError::Unavailable("HTTP 502".into())),
        )
        .await;
    let result = engine
        .get_history(paris.id, 5, SourcePreference::Auto)
        .await
        .unwrap();
    assert_eq!(result.source, HistorySource::Local);
    assert!(result.records.iter().all(|r| r.temperature == 15.0));
}

#[tokio::test]
async fn test_api_history_propagates_failure() {
    let provider = Arc::new(MockProvider::new());
    let engine = engine_with(provider.clone());
    let paris = engine.add_location("Paris", None).await.unwrap();
    provider
        .set_failure(MockOperation::History, Some(ProviderError::RateLimited))
        .await;

    let err = engine
        .get_history(paris.id, 5, SourcePreference::Api)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
}

#[tokio::test]
async fn test_history_validates_days() {
    let engine = engine_with(Arc::new(MockProvider::new()));
    let paris = engine.add_location("Paris", None).await.unwrap();

    for days in [0, 31] {
        let err = engine
            .get_history(paris.id, days, SourcePreference::Local)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    let err = engine
        .get_history(999, 5, SourcePreference::Local)
        .await
        .unwrap_err();
    assert_eq!(err, Error::LocationNotFound(999));
}

// ==================== Status and deletion ====================

#[tokio::test]
async fn test_status_counts_recent_failures() {
    let engine = engine_with(Arc::new(MockProvider::new()));
    let paris = engine.add_location("Paris", None).await.unwrap();
    let now = OffsetDateTime::now_utc();

    {
        let store = engine.store().await;
        for hours in [1, 2, 3] {
            let at = now - time::Duration::hours(hours);
            store
                .record_outcome(&NewOutcome::failure(
                    paris.id,
                    SyncKind::Combined,
                    ErrorKind::ProviderUnavailable,
                    "HTTP 503",
                    at,
                    at,
                ))
                .unwrap();
        }
        for hours in [4, 5] {
            let at = now - time::Duration::hours(hours);
            store
                .record_outcome(&NewOutcome::success(paris.id, SyncKind::Combined, None, at, at))
                .unwrap();
        }
        let old = now - time::Duration::hours(48);
        store
            .record_outcome(&NewOutcome::failure(
                paris.id,
                SyncKind::Combined,
                ErrorKind::ProviderUnavailable,
                "HTTP 503",
                old,
                old,
            ))
            .unwrap();
    }

    let status = engine.status().await.unwrap();
    assert_eq!(status.failed_sync_last_24h, 3);
    assert_eq!(status.total_locations, 1);
    assert_eq!(status.synced_locations, 0);
    assert!(status.api_configured);
    let last = status.last_success_sync.unwrap();
    assert_eq!(last.unix_timestamp(), (now - time::Duration::hours(4)).unix_timestamp());
}

#[tokio::test]
async fn test_delete_cascades_and_leaves_status() {
    let engine = engine_with(Arc::new(MockProvider::new()));
    let paris = engine.add_location("Paris", None).await.unwrap();
    let tokyo = engine.add_location("Tokyo", None).await.unwrap();
    engine.sync(paris.id, true).await.unwrap();
    engine.sync(tokyo.id, true).await.unwrap();

    let status = engine.status().await.unwrap();
    assert_eq!(status.total_locations, 2);
    assert_eq!(status.synced_locations, 2);

    engine.delete_location(paris.id).await.unwrap();

    {
        let store = engine.store().await;
        assert_eq!(store.count_snapshots(Some(paris.id)).unwrap(), 0);
        assert_eq!(store.count_forecasts(Some(paris.id)).unwrap(), 0);
        assert_eq!(store.count_outcomes(Some(paris.id)).unwrap(), 0);
        assert_eq!(store.count_snapshots(Some(tokyo.id)).unwrap(), 1);
    }

    let status = engine.status().await.unwrap();
    assert_eq!(status.total_locations, 1);
    assert_eq!(status.synced_locations, 1);
    assert_eq!(
        engine.get_weather(paris.id).await.unwrap_err(),
        Error::LocationNotFound(paris.id)
    );
}

#[tokio::test]
async fn test_overview_lists_every_location() {
    let engine = engine_with(Arc::new(MockProvider::new()));
    let paris = engine.add_location("Paris", None).await.unwrap();
    engine.add_location("Tokyo", None).await.unwrap();
    engine.sync(paris.id, true).await.unwrap();

    let overview = engine.overview().await.unwrap();
    assert_eq!(overview.len(), 2);
    let paris_row = overview
        .iter()
        .find(|o| o.location.id == paris.id)
        .unwrap();
    assert!(paris_row.current.is_some());
    assert!(paris_row.last_synced.is_some());
    assert!(overview.iter().any(|o| o.current.is_none() && o.last_synced.is_none()));
}
