//! HTTP surface over the trading desk. Handlers only translate; all
//! behaviour lives in [`TradingDesk`].

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::audit::audit_log::AuditLog;
use crate::control::desk::{StartError, SubmitError, TradingDesk};
use crate::execution::worker_pool::PoolError;
use crate::scheduling::types::{SchedulerError, SessionWindow};
use crate::types::order::OrderRequest;

const DEFAULT_AUDIT_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AppState {
    desk: Arc<TradingDesk>,
    audit: Arc<AuditLog>,
}

impl AppState {
    pub fn new(desk: Arc<TradingDesk>, audit: Arc<AuditLog>) -> Self {
        Self { desk, audit }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/place", post(place_trade))
        .route("/control/start_session", post(start_session))
        .route("/control/stop_session", post(stop_session))
        .route("/control/killer_switch", post(killer_switch))
        .route("/control/discard_pending", post(discard_pending))
        .route("/control/status", get(status))
        .route("/audit", get(audit_tail))
        .with_state(state)
}

pub async fn serve(
    bind: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind control api on {bind}"))?;
    info!(%bind, "control api listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("control api server failed")
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl ToString) -> Self {
        Self {
            status,
            message: message.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "ok": false, "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<SubmitError> for ApiError {
    fn from(error: SubmitError) -> Self {
        let status = match error {
            SubmitError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SubmitError::TradingDisabled => StatusCode::CONFLICT,
            SubmitError::Closed(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::new(status, error)
    }
}

impl From<SchedulerError> for ApiError {
    fn from(error: SchedulerError) -> Self {
        let status = match error {
            SchedulerError::InvalidWindow { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SchedulerError::SessionInProgress { .. } => StatusCode::CONFLICT,
        };
        Self::new(status, error)
    }
}

impl From<PoolError> for ApiError {
    fn from(error: PoolError) -> Self {
        let status = match error {
            PoolError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
            PoolError::Running => StatusCode::CONFLICT,
        };
        Self::new(status, error)
    }
}

impl From<StartError> for ApiError {
    fn from(error: StartError) -> Self {
        match error {
            StartError::Scheduler(error) => error.into(),
            StartError::Pool(error) => error.into(),
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

async fn place_trade(
    State(state): State<AppState>,
    Json(request): Json<OrderRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let order_id = state.desk.place(request)?;

    Ok(Json(json!({ "ok": true, "queued": true, "order_id": order_id })))
}

#[derive(Debug, Deserialize)]
struct StartRequest {
    #[serde(default)]
    duration_min: Option<u32>,
    #[serde(default)]
    cooldown_min: Option<u32>,
    /// Keep cycling after each cooldown. Off means one session, then idle.
    #[serde(default = "repeat_by_default", alias = "manual_override")]
    repeat: bool,
}

fn repeat_by_default() -> bool {
    true
}

async fn start_session(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let window = match (request.duration_min, request.cooldown_min) {
        (None, None) => None,
        (duration, cooldown) => {
            let current = state.desk.status().session;
            Some(SessionWindow::new(
                duration.unwrap_or(current.session_duration_minutes),
                cooldown.unwrap_or(current.cooldown_minutes),
            )?)
        }
    };

    let status = state.desk.start_session(window, request.repeat).await?;

    Ok(Json(json!({ "ok": true, "status": status })))
}

async fn stop_session(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = state.desk.stop_session().await;

    Json(json!({ "ok": true, "status": status }))
}

async fn killer_switch(State(state): State<AppState>) -> Json<serde_json::Value> {
    let report = state.desk.kill_switch().await;

    Json(json!(report))
}

async fn discard_pending(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let discarded = state.desk.discard_pending().await?;
    let order_ids: Vec<_> = discarded.iter().map(|order| order.id()).collect();

    Ok(Json(json!({
        "ok": true,
        "discarded": order_ids.len(),
        "order_ids": order_ids,
    })))
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!(state.desk.status()))
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    limit: Option<usize>,
}

async fn audit_tail(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
    let audit = state.audit.clone();

    let records = tokio::task::spawn_blocking(move || audit.tail(limit))
        .await
        .map_err(|error| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, error))?
        .map_err(|error| {
            error!(path = %state.audit.path().display(), %error, "failed to read audit log");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, error)
        })?;

    Ok(Json(json!({ "ok": true, "records": records })))
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::execution::testing::ThrowingVenue;
    use crate::execution::worker_pool::WorkerPool;
    use crate::execution::{DynamicVenue, testing::RecordingVenue};
    use crate::scheduling::session_scheduler::SessionScheduler;

    fn app(dir: &TempDir, venue: DynamicVenue) -> Router {
        let audit = Arc::new(AuditLog::open(dir.path().join("audit.log")).unwrap());
        let pool = Arc::new(WorkerPool::new(1, venue.clone(), audit.clone()));
        let desk = Arc::new(TradingDesk::new(
            pool,
            SessionScheduler::default(),
            venue,
            true,
        ));

        create_router(AppState::new(desk, audit))
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        body: &str,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };

        (status, json)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, Arc::new(RecordingVenue::default()));

        let (status, body) = call(&app, "GET", "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn place_is_refused_before_session_start() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, Arc::new(RecordingVenue::default()));

        let (status, body) = call(
            &app,
            "POST",
            "/place",
            r#"{"symbol":"EURUSD","action":"BUY","size":0.1}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["ok"], false);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn start_place_stop_round() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, Arc::new(RecordingVenue::default()));

        let (status, body) = call(
            &app,
            "POST",
            "/control/start_session",
            r#"{"duration_min":30,"cooldown_min":10}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"]["state"], "active");
        assert_eq!(body["status"]["session_duration_minutes"], 30);

        let (status, body) = call(
            &app,
            "POST",
            "/place",
            r#"{"symbol":"EURUSD","action":"buy","size":0.1,"sl":1.05}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["queued"], true);

        let (status, body) = call(
            &app,
            "POST",
            "/place",
            r#"{"symbol":"EURUSD","action":"buy","size":-1}"#,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["ok"], false);

        let (_, body) = call(&app, "POST", "/control/stop_session", "").await;
        assert_eq!(body["status"]["state"], "idle");
        assert_eq!(body["status"]["trading_enabled"], false);

        let (_, body) = call(&app, "GET", "/control/status", "").await;
        assert_eq!(body["executor_running"], false);
        assert_eq!(body["venue"], "recording");
    }

    #[tokio::test]
    async fn zero_minute_window_is_unprocessable() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, Arc::new(RecordingVenue::default()));

        let (status, _) = call(
            &app,
            "POST",
            "/control/start_session",
            r#"{"duration_min":0}"#,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn killer_switch_nests_venue_failure() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, Arc::new(ThrowingVenue));

        call(&app, "POST", "/control/start_session", "{}").await;
        let (status, body) = call(&app, "POST", "/control/killer_switch", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["broker_close"]["ok"], false);
        assert_eq!(body["broker_close"]["error"], "terminal not connected");
        assert_eq!(body["session"]["state"], "idle");
    }

    #[tokio::test]
    async fn one_shot_start_reports_no_override() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, Arc::new(RecordingVenue::default()));

        let (status, body) = call(
            &app,
            "POST",
            "/control/start_session",
            r#"{"duration_min":5,"repeat":false}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"]["state"], "active");
        assert_eq!(body["status"]["manual_override"], false);

        call(&app, "POST", "/control/stop_session", "").await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn discard_pending_conflicts_while_running() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, Arc::new(RecordingVenue::default()));

        call(&app, "POST", "/control/start_session", "{}").await;
        let (status, body) = call(&app, "POST", "/control/discard_pending", "").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["ok"], false);

        call(&app, "POST", "/control/stop_session", "").await;
        let (status, body) = call(&app, "POST", "/control/discard_pending", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["discarded"], 0);
    }

    #[tokio::test]
    async fn audit_endpoint_returns_records() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, Arc::new(RecordingVenue::default()));

        let (status, body) = call(&app, "GET", "/audit?limit=5", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["records"], serde_json::json!([]));
    }
}
