//! REST API endpoints for the stratus-service.
//!
//! This module maps HTTP requests onto [`Engine`](stratus_core::Engine)
//! operations: the location catalog, sync, cached weather, history, exports,
//! preferences, fleet status and scheduler control.
//!
//! ## Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`] with an
//! `error` message and a stable `kind`. Engine errors map to status codes:
//!
//! | kind | status |
//! |------|--------|
//! | `not_found` | 404 |
//! | `validation` | 400 |
//! | `rate_limited` | 429 with `Retry-After` |
//! | `sync_in_progress` | 409 |
//! | `provider_unavailable`, `invalid_response` | 502 |
//! | `storage` | 500 |
//!
//! # Example
//!
//! ```ignore
//! use stratus_service::api;
//!
//! let app = api::app(state);
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use stratus_core::{
    Error, ExportBundle, Location, LocationOverview, LocationPatch, SourcePreference,
    SystemStatus, WeatherView,
};
use stratus_store::StoredPreference;

use crate::state::{AppState, SchedulerStatus};

/// Retry hint used when a rate-limit error carries none.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Response header naming the source that served a history request.
pub const HISTORY_SOURCE_HEADER: &str = "x-history-source";

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Health and status
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        // Scheduler control
        .route("/api/scheduler/start", post(scheduler_start))
        .route("/api/scheduler/stop", post(scheduler_stop))
        // Location catalog
        .route("/api/locations", get(list_locations).post(add_location))
        .route("/api/locations/overview", get(locations_overview))
        .route(
            "/api/locations/{id}",
            get(get_location)
                .patch(update_location)
                .delete(delete_location),
        )
        // Weather data
        .route("/api/locations/{id}/sync", post(sync_location))
        .route("/api/locations/{id}/weather", get(get_weather))
        .route("/api/locations/{id}/history", get(get_history))
        .route("/api/locations/{id}/export", get(export_location))
        .route("/api/locations/{id}/export.csv", get(export_location_csv))
        // Preferences
        .route("/api/preferences", get(list_preferences))
        .route("/api/preferences/{key}", patch(update_preference))
}

/// The full application: routes, inbound rate limiting, tracing and CORS.
pub fn app(state: Arc<AppState>) -> Router {
    router()
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            crate::middleware::rate_limit,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers([header::HeaderName::from_static(HISTORY_SOURCE_HEADER)]),
        )
        .with_state(state)
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Service status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service version.
    pub version: &'static str,
    /// Current timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Fleet health.
    #[serde(flatten)]
    pub system: SystemStatus,
    /// Scheduler state.
    pub scheduler: SchedulerStatus,
}

/// Get fleet health and scheduler state.
async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, AppError> {
    let system = state.engine.status().await?;
    let scheduler = state.scheduler.status().await;

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
        system,
        scheduler,
    }))
}

// ==========================================================================
// Scheduler Control
// ==========================================================================

/// Response for scheduler control actions.
#[derive(Debug, Serialize)]
pub struct SchedulerActionResponse {
    pub success: bool,
    pub message: String,
    pub running: bool,
}

/// Start the scheduler.
async fn scheduler_start(State(state): State<Arc<AppState>>) -> Json<SchedulerActionResponse> {
    if !state.scheduler.start(&state.engine).await {
        return Json(SchedulerActionResponse {
            success: false,
            message: "Scheduler is already running".to_string(),
            running: true,
        });
    }

    info!("Scheduler started via API");
    Json(SchedulerActionResponse {
        success: true,
        message: "Scheduler started".to_string(),
        running: true,
    })
}

/// Stop the scheduler.
async fn scheduler_stop(State(state): State<Arc<AppState>>) -> Json<SchedulerActionResponse> {
    if !state.scheduler.stop().await {
        return Json(SchedulerActionResponse {
            success: false,
            message: "Scheduler is not running".to_string(),
            running: false,
        });
    }

    Json(SchedulerActionResponse {
        success: true,
        message: "Scheduler stopped".to_string(),
        running: false,
    })
}

// ==========================================================================
// Location Catalog
// ==========================================================================

/// Request body for tracking a new location.
#[derive(Debug, Deserialize)]
pub struct AddLocationRequest {
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
}

/// List tracked locations, favorites first.
async fn list_locations(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Location>>, AppError> {
    Ok(Json(state.engine.list_locations().await?))
}

/// Geocode and track a location.
async fn add_location(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddLocationRequest>,
) -> Result<(StatusCode, Json<Location>), AppError> {
    let location = state
        .engine
        .add_location(&request.name, request.country.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(location)))
}

/// Dashboard summary of every location.
async fn locations_overview(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<LocationOverview>>, AppError> {
    Ok(Json(state.engine.overview().await?))
}

async fn get_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Location>, AppError> {
    Ok(Json(state.engine.get_location(id).await?))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(changes): Json<LocationPatch>,
) -> Result<Json<Location>, AppError> {
    Ok(Json(state.engine.update_location(id, changes).await?))
}

/// Simple status response.
#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: &'static str,
}

/// Stop tracking a location and drop its data.
async fn delete_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<StatusMessage>, AppError> {
    state.engine.delete_location(id).await?;
    Ok(Json(StatusMessage { status: "deleted" }))
}

// ==========================================================================
// Weather Data
// ==========================================================================

/// Query parameters for a sync request.
#[derive(Debug, Default, Deserialize)]
pub struct SyncQuery {
    /// Bypass the cache. Defaults to `true`.
    pub force: Option<bool>,
}

/// Run a sync cycle and return the resulting view.
async fn sync_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<SyncQuery>,
) -> Result<Json<WeatherView>, AppError> {
    let force = params.force.unwrap_or(true);
    Ok(Json(state.engine.sync(id, force).await?))
}

/// Cached weather without contacting the provider.
async fn get_weather(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<WeatherView>, AppError> {
    Ok(Json(state.engine.get_weather(id).await?))
}

/// Query parameters for history.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Window in days (1-30). Defaults to 5.
    #[serde(default = "default_history_days")]
    pub days: u32,
    /// `auto`, `api` or `local`. Defaults to `auto`.
    #[serde(default)]
    pub source: Option<String>,
}

fn default_history_days() -> u32 {
    5
}

/// Source-attributed history.
///
/// The body is the list of records, newest first; the serving source is in
/// the `X-History-Source` header.
async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<HistoryQuery>,
) -> Result<Response, AppError> {
    let source = match params.source.as_deref() {
        Some(raw) => raw.parse::<SourcePreference>().map_err(Error::from)?,
        None => SourcePreference::default(),
    };

    let history = state.engine.get_history(id, params.days, source).await?;
    Ok((
        [(HISTORY_SOURCE_HEADER, history.source.as_str())],
        Json(history.records),
    )
        .into_response())
}

/// Query parameters for exports.
#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// Window in days (1-365). Defaults to 30.
    #[serde(default = "default_export_days")]
    pub history_days: u32,
}

fn default_export_days() -> u32 {
    30
}

/// JSON export bundle.
async fn export_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<ExportQuery>,
) -> Result<Json<ExportBundle>, AppError> {
    Ok(Json(state.engine.export(id, params.history_days).await?))
}

/// Snapshot history as CSV.
async fn export_location_csv(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let csv = state.engine.export_history_csv(id, params.history_days).await?;
    let disposition = format!("attachment; filename=\"location-{id}-history.csv\"");

    let mut response = csv.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

// ==========================================================================
// Preferences
// ==========================================================================

async fn list_preferences(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<StoredPreference>>, AppError> {
    Ok(Json(state.engine.list_preferences().await?))
}

/// Request body for a preference change.
///
/// Numbers and booleans are accepted and stored as their string form.
#[derive(Debug, Deserialize)]
pub struct PreferenceRequest {
    pub value: serde_json::Value,
}

/// Response for a preference change.
#[derive(Debug, Serialize)]
pub struct PreferenceResponse {
    pub status: &'static str,
    pub key: String,
    pub value: String,
}

/// Set a preference and republish engine settings.
async fn update_preference(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(request): Json<PreferenceRequest>,
) -> Result<Json<PreferenceResponse>, AppError> {
    let value = match request.value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => {
            return Err(AppError::BadRequest(
                "value must be a string, number or boolean".to_string(),
            ));
        }
    };

    let stored = state.engine.set_preference(&key, &value).await?;
    if let Err(e) = state.reload_settings().await {
        warn!("Preference {} saved but settings were not republished: {}", key, e);
    }

    Ok(Json(PreferenceResponse {
        status: "updated",
        key: stored.key,
        value: stored.value,
    }))
}

// ==========================================================================
// Errors
// ==========================================================================

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// An engine operation failed.
    Engine(Error),
    /// The request body could not be interpreted.
    BadRequest(String),
}

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        AppError::Engine(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error = match self {
            AppError::BadRequest(message) => {
                let body = serde_json::json!({ "error": message, "kind": "validation" });
                return (StatusCode::BAD_REQUEST, Json(body)).into_response();
            }
            AppError::Engine(error) => error,
        };

        let status = match &error {
            Error::LocationNotFound(_) | Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::SyncInProgress(_) => StatusCode::CONFLICT,
            Error::ProviderUnavailable(_) | Error::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": error.to_string(),
            "kind": error.kind().as_str(),
        });

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = error
                .retry_after_secs()
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return (
                status,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(body),
            )
                .into_response();
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use stratus_core::{Engine, MockOperation, MockProvider, ProviderError, RateLimitConfig};
    use stratus_store::Store;
    use tokio::sync::watch;
    use tower::ServiceExt;

    use crate::config::Config;

    fn create_test_state_with(provider: Arc<MockProvider>) -> Arc<AppState> {
        let config = Config::default();
        let (settings_tx, settings_rx) = watch::channel(config.sync_settings());
        let engine = Engine::new(
            Store::open_in_memory().unwrap(),
            provider,
            settings_rx,
            RateLimitConfig::outbound_default(),
        );
        AppState::new(engine, config, settings_tx)
    }

    fn create_test_state() -> Arc<AppState> {
        create_test_state_with(Arc::new(MockProvider::new()))
    }

    async fn response_body(response: Response) -> String {
        let body = response.into_body();
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn response_json(response: Response) -> serde_json::Value {
        serde_json::from_str(&response_body(response).await).unwrap()
    }

    async fn send(state: &Arc<AppState>, method: &str, uri: &str, body: Option<serde_json::Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        router().with_state(Arc::clone(state)).oneshot(request).await.unwrap()
    }

    async fn add(state: &Arc<AppState>, name: &str, country: &str) -> i64 {
        let response = send(
            state,
            "POST",
            "/api/locations",
            Some(serde_json::json!({ "name": name, "country": country })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        response_json(response).await["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = create_test_state();
        let response = send(&state, "GET", "/api/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_status_endpoint_empty() {
        let state = create_test_state();
        let response = send(&state, "GET", "/api/status", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["total_locations"], 0);
        assert_eq!(json["synced_locations"], 0);
        assert_eq!(json["failed_sync_last_24h"], 0);
        assert!(json["last_success_sync"].is_null());
        assert_eq!(json["sync_interval_seconds"], 600);
        assert_eq!(json["api_configured"], true);
        assert_eq!(json["scheduler"]["running"], false);
    }

    #[tokio::test]
    async fn test_list_locations_empty() {
        let state = create_test_state();
        let response = send(&state, "GET", "/api/locations", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response_json(response).await.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_location_and_get() {
        let state = create_test_state();
        let id = add(&state, "Paris", "FR").await;

        let response = send(&state, "GET", &format!("/api/locations/{id}"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["name"], "Paris");
        assert_eq!(json["country"], "FR");
        assert_eq!(json["sync_interval_secs"], 600);
    }

    #[tokio::test]
    async fn test_add_location_twice_returns_existing() {
        let state = create_test_state();
        let first = add(&state, "Paris", "FR").await;
        let second = add(&state, "paris", "FR").await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_add_location_unknown_place() {
        let state = create_test_state();
        let response = send(
            &state,
            "POST",
            "/api/locations",
            Some(serde_json::json!({ "name": "Atlantis" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response_json(response).await["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_add_location_blank_name() {
        let state = create_test_state();
        let response = send(
            &state,
            "POST",
            "/api/locations",
            Some(serde_json::json!({ "name": "   " })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response_json(response).await["kind"], "validation");
    }

    #[tokio::test]
    async fn test_get_location_not_found() {
        let state = create_test_state();
        let response = send(&state, "GET", "/api/locations/999", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let json = response_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("not found"));
        assert_eq!(json["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_update_location() {
        let state = create_test_state();
        let id = add(&state, "Tokyo", "JP").await;

        let response = send(
            &state,
            "PATCH",
            &format!("/api/locations/{id}"),
            Some(serde_json::json!({
                "display_name": "Home",
                "is_favorite": true,
                "sync_interval_secs": 900
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["display_name"], "Home");
        assert_eq!(json["is_favorite"], true);
        assert_eq!(json["sync_interval_secs"], 900);
    }

    #[tokio::test]
    async fn test_update_location_rejects_short_interval() {
        let state = create_test_state();
        let id = add(&state, "Tokyo", "JP").await;

        let response = send(
            &state,
            "PATCH",
            &format!("/api/locations/{id}"),
            Some(serde_json::json!({ "sync_interval_secs": 10 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_location() {
        let state = create_test_state();
        let id = add(&state, "London", "GB").await;

        let response = send(&state, "DELETE", &format!("/api/locations/{id}"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await["status"], "deleted");

        let response = send(&state, "DELETE", &format!("/api/locations/{id}"), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sync_then_weather() {
        let provider = Arc::new(MockProvider::new());
        let state = create_test_state_with(provider.clone());
        let id = add(&state, "London", "GB").await;

        let response = send(&state, "POST", &format!("/api/locations/{id}/sync"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert!(json["current"].is_object());
        assert!(!json["forecast"].as_array().unwrap().is_empty());
        assert!(json["last_synced"].is_string());
        assert_eq!(provider.current_calls(), 1);

        let response = send(&state, "GET", &format!("/api/locations/{id}/weather"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response_json(response).await["current"].is_object());
        assert_eq!(provider.current_calls(), 1);
    }

    #[tokio::test]
    async fn test_unforced_sync_uses_cache() {
        let provider = Arc::new(MockProvider::new());
        let state = create_test_state_with(provider.clone());
        let id = add(&state, "London", "GB").await;

        send(&state, "POST", &format!("/api/locations/{id}/sync"), None).await;
        let response = send(
            &state,
            "POST",
            &format!("/api/locations/{id}/sync?force=false"),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(provider.current_calls(), 1);
    }

    #[tokio::test]
    async fn test_sync_provider_failure_is_bad_gateway() {
        let provider = Arc::new(MockProvider::new());
        let state = create_test_state_with(provider.clone());
        let id = add(&state, "London", "GB").await;
        provider
            .set_failure(
                MockOperation::Current,
                Some(ProviderError::Unavailable("down".into())),
            )
            .await;

        let response = send(&state, "POST", &format!("/api/locations/{id}/sync"), None).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response_json(response).await["kind"], "provider_unavailable");
    }

    #[tokio::test]
    async fn test_sync_provider_rate_limit_sets_retry_after() {
        let provider = Arc::new(MockProvider::new());
        let state = create_test_state_with(provider.clone());
        let id = add(&state, "London", "GB").await;
        provider
            .set_failure(MockOperation::Current, Some(ProviderError::RateLimited))
            .await;

        let response = send(&state, "POST", &format!("/api/locations/{id}/sync"), None).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");
        assert_eq!(response_json(response).await["kind"], "rate_limited");
    }

    #[tokio::test]
    async fn test_history_local_header() {
        let state = create_test_state();
        let id = add(&state, "London", "GB").await;
        send(&state, "POST", &format!("/api/locations/{id}/sync"), None).await;

        let response = send(
            &state,
            "GET",
            &format!("/api/locations/{id}/history?days=3&source=local"),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[HISTORY_SOURCE_HEADER], "local");
        assert_eq!(response_json(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_history_auto_falls_back_to_local() {
        let state = create_test_state();
        let id = add(&state, "London", "GB").await;

        let response = send(&state, "GET", &format!("/api/locations/{id}/history"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[HISTORY_SOURCE_HEADER], "local");
        assert!(response_json(response).await.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_rejects_bad_params() {
        let state = create_test_state();
        let id = add(&state, "London", "GB").await;

        let response = send(
            &state,
            "GET",
            &format!("/api/locations/{id}/history?source=satellite"),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &state,
            "GET",
            &format!("/api/locations/{id}/history?days=31"),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_export_json_and_csv() {
        let state = create_test_state();
        let id = add(&state, "Paris", "FR").await;
        send(&state, "POST", &format!("/api/locations/{id}/sync"), None).await;

        let response = send(
            &state,
            "GET",
            &format!("/api/locations/{id}/export?history_days=7"),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["history_days"], 7);
        assert_eq!(json["location"]["id"], id);
        assert_eq!(json["history"].as_array().unwrap().len(), 1);
        assert_eq!(json["recent_outcomes"].as_array().unwrap().len(), 1);

        let response = send(&state, "GET", &format!("/api/locations/{id}/export.csv"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/csv")
        );
        let body = response_body(response).await;
        assert!(body.starts_with("location_id,api_timestamp"));
        assert_eq!(body.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_export_rejects_large_window() {
        let state = create_test_state();
        let id = add(&state, "Paris", "FR").await;
        let response = send(
            &state,
            "GET",
            &format!("/api/locations/{id}/export?history_days=400"),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_overview() {
        let state = create_test_state();
        add(&state, "Paris", "FR").await;
        add(&state, "Tokyo", "JP").await;

        let response = send(&state, "GET", "/api/locations/overview", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e["current"].is_null()));
    }

    #[tokio::test]
    async fn test_preferences_roundtrip_republishes_settings() {
        let state = create_test_state();

        let response = send(&state, "GET", "/api/preferences", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await.as_array().unwrap().len(), 2);

        let response = send(
            &state,
            "PATCH",
            "/api/preferences/refresh_interval",
            Some(serde_json::json!({ "value": 1200 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["status"], "updated");
        assert_eq!(json["key"], "refresh_interval");
        assert_eq!(json["value"], "1200");

        assert_eq!(state.engine.settings().default_interval_secs, 1200);
    }

    #[tokio::test]
    async fn test_preferences_reject_unknown_key() {
        let state = create_test_state();
        let response = send(
            &state,
            "PATCH",
            "/api/preferences/theme",
            Some(serde_json::json!({ "value": "dark" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &state,
            "PATCH",
            "/api/preferences/units",
            Some(serde_json::json!({ "value": ["metric"] })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_scheduler_control() {
        let state = create_test_state();

        let response = send(&state, "POST", "/api/scheduler/stop", None).await;
        let json = response_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Scheduler is not running");

        let response = send(&state, "POST", "/api/scheduler/start", None).await;
        let json = response_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["running"], true);

        let response = send(&state, "POST", "/api/scheduler/start", None).await;
        let json = response_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Scheduler is already running");

        let response = send(&state, "GET", "/api/status", None).await;
        assert_eq!(response_json(response).await["scheduler"]["running"], true);

        let response = send(&state, "POST", "/api/scheduler/stop", None).await;
        let json = response_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Scheduler stopped");
    }

    #[tokio::test]
    async fn test_app_applies_rate_limit() {
        let provider = Arc::new(MockProvider::new());
        let mut config = Config::default();
        config.security.rate_limit_requests = 2;
        let (settings_tx, settings_rx) = watch::channel(config.sync_settings());
        let engine = Engine::new(
            Store::open_in_memory().unwrap(),
            provider,
            settings_rx,
            RateLimitConfig::outbound_default(),
        );
        let state = AppState::new(engine, config, settings_tx);
        let app = app(state);

        for expected in [StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri("/api/locations")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), expected);
        }
    }
}
