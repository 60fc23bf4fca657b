//! HTTP trigger server.
//!
//! Exposes the refresh and scheduler triggers plus a thin read surface
//! over the stored snapshot.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/init` | Enable the daily scheduler (idempotent) |
//! | `POST` | `/api/refresh` | Full refresh now |
//! | `POST` | `/api/refresh/{county}` | Refresh one county now |
//! | `POST` | `/api/counties/init` | Seed county metadata |
//! | `GET`  | `/api/counties` | County metadata |
//! | `GET`  | `/api/counties/{county}/inmates` | Paginated listing (`page`, `page_size`, `search`) |
//! | `GET`  | `/api/status` | Run state, scheduler state, last run |
//!
//! # Error Contract
//!
//! ```json
//! { "success": false, "message": "...", "error": { "code": "already_running", "message": "..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `invalid_source` (400),
//! `unauthorized` (401), `already_running` (409), `refresh_failed` (500),
//! `store_error` (500).
//!
//! When `[server].api_key` is set, every `POST` route requires a matching
//! `x-api-key` header.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use roster_core::counties::WISCONSIN_COUNTIES;
use roster_core::store::{CountyRow, RosterQuery};
use roster_core::{NormalizedRecord, SinkError};

use crate::app;
use crate::config::Config;
use crate::refresh::{RefreshError, RefreshReport, RefreshStatus, Refresher};
use crate::scheduler::{DailySchedule, DailyScheduler, EnableOutcome, SchedulerStatus};

const MAX_PAGE_SIZE: u32 = 200;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    refresher: Arc<Refresher>,
    scheduler: Arc<DailyScheduler>,
    api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        refresher: Arc<Refresher>,
        scheduler: Arc<DailyScheduler>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            refresher,
            scheduler,
            api_key: api_key.map(Arc::from),
        }
    }
}

/// The full route table over `state`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/init", post(handle_init))
        .route("/api/refresh", post(handle_refresh_all))
        .route("/api/refresh/{county}", post(handle_refresh_one))
        .route("/api/counties/init", post(handle_init_counties))
        .route("/api/counties", get(handle_counties))
        .route("/api/counties/{county}/inmates", get(handle_inmates))
        .route("/api/status", get(handle_status))
        .layer(cors)
        .with_state(state)
}

/// Start the trigger server on `[server].bind`.
///
/// The scheduler is enabled at startup when `schedule` is true or
/// `[schedule].enable_on_start` is set. Runs until the process exits.
pub async fn run_server(config: &Config, schedule: bool) -> anyhow::Result<()> {
    let store = app::open_store(config).await?;
    let refresher = app::build_refresher(config, store)?;
    let scheduler = Arc::new(DailyScheduler::new(
        DailySchedule::from_config(&config.schedule)?,
        refresher.clone(),
    ));

    if schedule || config.schedule.enable_on_start {
        scheduler.enable();
    }

    let state = AppState::new(refresher, scheduler, config.server.api_key.clone());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "trigger server listening");
    println!("Roster server listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            message: self.message.clone(),
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<RefreshError> for AppError {
    fn from(err: RefreshError) -> Self {
        let (status, code) = match &err {
            RefreshError::InvalidSource(_) => (StatusCode::BAD_REQUEST, "invalid_source"),
            RefreshError::AlreadyRunning(_) => (StatusCode::CONFLICT, "already_running"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "refresh_failed"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl From<SinkError> for AppError {
    fn from(err: SinkError) -> Self {
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "store_error",
            message: err.to_string(),
        }
    }
}

/// Reject the request unless it carries the configured API key.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = &state.api_key else {
        return Ok(());
    };
    let provided = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    if provided == Some(expected.as_ref()) {
        Ok(())
    } else {
        Err(AppError {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            message: "missing or invalid x-api-key".to_string(),
        })
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/init ============

#[derive(Serialize)]
struct InitResponse {
    success: bool,
    message: String,
    outcome: EnableOutcome,
    scheduler: SchedulerStatus,
}

async fn handle_init(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<InitResponse>, AppError> {
    authorize(&state, &headers)?;
    let outcome = state.scheduler.enable();
    let status = state.scheduler.status();
    let message = match outcome {
        EnableOutcome::Started => format!("Scheduler started ({})", status.schedule),
        EnableOutcome::AlreadyActive => "Scheduler already active".to_string(),
    };
    Ok(Json(InitResponse {
        success: true,
        message,
        outcome,
        scheduler: status,
    }))
}

// ============ POST /api/refresh[/{county}] ============

#[derive(Serialize)]
struct RefreshResponse {
    success: bool,
    message: String,
    report: RefreshReport,
}

fn refresh_response(report: RefreshReport) -> Json<RefreshResponse> {
    Json(RefreshResponse {
        success: true,
        message: format!(
            "{} complete: {} record(s)",
            report.scope,
            report.total_upserted()
        ),
        report,
    })
}

/// Run a refresh on its own task and wait for it.
///
/// The request future is dropped when the client disconnects; the run
/// must still reach the end of its cycle and record its outcome.
async fn run_to_completion<F>(run: F) -> Result<RefreshReport, AppError>
where
    F: Future<Output = Result<RefreshReport, RefreshError>> + Send + 'static,
{
    let report = tokio::spawn(run).await.map_err(|e| {
        tracing::error!(error = %e, "refresh task failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "refresh_failed",
            message: format!("refresh task failed: {}", e),
        }
    })??;
    Ok(report)
}

async fn handle_refresh_all(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RefreshResponse>, AppError> {
    authorize(&state, &headers)?;
    let refresher = state.refresher.clone();
    let report = run_to_completion(async move { refresher.refresh_all().await }).await?;
    Ok(refresh_response(report))
}

async fn handle_refresh_one(
    State(state): State<AppState>,
    Path(county): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RefreshResponse>, AppError> {
    authorize(&state, &headers)?;
    let refresher = state.refresher.clone();
    let report = run_to_completion(async move { refresher.refresh_one(&county).await }).await?;
    Ok(refresh_response(report))
}

// ============ Counties ============

#[derive(Serialize)]
struct InitCountiesResponse {
    success: bool,
    message: String,
    count: usize,
}

async fn handle_init_counties(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<InitCountiesResponse>, AppError> {
    authorize(&state, &headers)?;
    let count = state
        .refresher
        .store()
        .init_counties(&WISCONSIN_COUNTIES)
        .await?;
    Ok(Json(InitCountiesResponse {
        success: true,
        message: format!("Seeded {} counties", count),
        count,
    }))
}

#[derive(Serialize)]
struct CountiesResponse {
    success: bool,
    counties: Vec<CountyRow>,
}

async fn handle_counties(State(state): State<AppState>) -> Result<Json<CountiesResponse>, AppError> {
    let counties = state.refresher.store().counties().await?;
    Ok(Json(CountiesResponse {
        success: true,
        counties,
    }))
}

#[derive(Deserialize)]
struct InmatesParams {
    page: Option<u32>,
    page_size: Option<u32>,
    search: Option<String>,
}

#[derive(Serialize)]
struct InmatesResponse {
    success: bool,
    county: String,
    page: u32,
    page_size: u32,
    total: u64,
    inmates: Vec<NormalizedRecord>,
}

async fn handle_inmates(
    State(state): State<AppState>,
    Path(county): Path<String>,
    Query(params): Query<InmatesParams>,
) -> Result<Json<InmatesResponse>, AppError> {
    let mut query = RosterQuery::new(county.trim());
    if let Some(page) = params.page {
        if page == 0 {
            return Err(bad_request("page must be >= 1"));
        }
        query.page = page;
    }
    if let Some(size) = params.page_size {
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(bad_request(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        query.page_size = size;
    }
    query.search = params.search;

    let page = state.refresher.store().list_county(&query).await?;
    Ok(Json(InmatesResponse {
        success: true,
        county: query.county,
        page: query.page,
        page_size: query.page_size,
        total: page.total,
        inmates: page.records,
    }))
}

// ============ GET /api/status ============

#[derive(Serialize)]
struct StatusResponse {
    success: bool,
    refresh: RefreshStatus,
    scheduler: SchedulerStatus,
}

async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        refresh: state.refresher.status(),
        scheduler: state.scheduler.status(),
    })
}
