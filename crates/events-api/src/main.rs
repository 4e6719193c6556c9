use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chamber_core::{
    health_status, Chamber, EventRecord, HealthStatus, RunStatus, SourceStatus, VersionResponse,
    PROJECT_NAME, PROJECT_VERSION,
};
use chrono::{DateTime, Local, Utc};
use ingest::{config::LEDGER_FILE, CatalogStore, JsonCatalogStore, CATALOG_FILE};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{OpenApi, ToSchema};

mod query;

use query::{EventFilter, EventsQuery};

const SERVICE_NAME: &str = "events-api";

type ApiResult = Result<Response, (StatusCode, Json<ApiError>)>;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<JsonCatalogStore>,
    pub ledger: Option<Arc<Mutex<rusqlite::Connection>>>,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(OpenApi)]
#[openapi(
    paths(health, version, chambers, events, status),
    components(schemas(
        HealthStatus,
        VersionResponse,
        ChamberInfo,
        EventsResponse,
        EventRecord,
        Chamber,
        RunStatus,
        SourceStatus,
        ApiError
    )),
    tags(
        (name = "health", description = "Liveness and build info"),
        (name = "events", description = "Upcoming chamber events"),
        (name = "ingest", description = "Ingest run history")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = AppConfig::from_env();
    let metrics = init_metrics();

    let ledger = match ingest::open_db(&cfg.ledger_path).and_then(|conn| {
        ingest::init_schema(&conn)?;
        Ok(conn)
    }) {
        Ok(conn) => Some(Arc::new(Mutex::new(conn))),
        Err(e) => {
            tracing::warn!(error = %e, "failed to open run ledger, /v1/status disabled");
            None
        }
    };

    let state = AppState {
        store: Arc::new(JsonCatalogStore::new(&cfg.catalog_path)),
        config: cfg.clone(),
        ledger,
        metrics,
    };

    let app = build_router(state);
    let addr: SocketAddr = cfg
        .bind_addr
        .parse()
        .with_context(|| format!("BIND_ADDR must be a socket address, got {}", cfg.bind_addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}. Hint: set BIND_ADDR=127.0.0.1:3101"))?;

    tracing::info!(
        %addr,
        service = SERVICE_NAME,
        project = PROJECT_NAME,
        env = %cfg.run_env,
        data_dir = %cfg.data_dir.display(),
        catalog = %cfg.catalog_path.display(),
        "listening"
    );

    axum::serve(listener, app)
        .await
        .context("server error while serving requests")
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/v1/version", get(version))
        .route("/v1/chambers", get(chambers))
        .route("/v1/events", get(events))
        .route("/v1/status", get(status))
        .route("/v1/openapi.json", get(openapi))
        .with_state(state)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hyper=warn,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_metrics() -> Option<PrometheusHandle> {
    match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "failed to install Prometheus recorder");
            None
        }
    }
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Health check", body = HealthStatus)
    )
)]
async fn health() -> Json<HealthStatus<'static>> {
    Json(health_status(SERVICE_NAME))
}

#[utoipa::path(
    get,
    path = "/v1/version",
    tag = "health",
    responses(
        (status = 200, description = "Version info", body = VersionResponse)
    )
)]
async fn version() -> Json<VersionResponse<'static>> {
    Json(VersionResponse {
        service: SERVICE_NAME,
        project: PROJECT_NAME,
        version: PROJECT_VERSION,
    })
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "# metrics recorder not installed\n".to_string(),
        ),
    }
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChamberInfo {
    pub tag: Chamber,
    pub name: &'static str,
}

#[utoipa::path(
    get,
    path = "/v1/chambers",
    tag = "events",
    responses(
        (status = 200, description = "Known chambers", body = [ChamberInfo])
    )
)]
async fn chambers(headers: HeaderMap) -> ApiResult {
    let list: Vec<ChamberInfo> = Chamber::ALL
        .into_iter()
        .map(|tag| ChamberInfo {
            tag,
            name: tag.display_name(),
        })
        .collect();
    format_response(&headers, &list)
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    /// When the catalog was last refreshed; absent before the first ingest run.
    pub last_updated: Option<DateTime<Utc>>,
    pub count: usize,
    pub events: Vec<EventRecord>,
}

#[utoipa::path(
    get,
    path = "/v1/events",
    tag = "events",
    params(EventsQuery),
    responses(
        (status = 200, description = "Upcoming events, ascending by date", body = EventsResponse),
        (status = 422, description = "Unknown chamber or range", body = ApiError),
        (status = 500, description = "Catalog could not be read", body = ApiError)
    )
)]
async fn events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EventsQuery>,
) -> ApiResult {
    let start = Instant::now();
    counter!("events_requests_total", "route" => "events").increment(1);

    let filter = EventFilter::from_query(&query).map_err(|details| {
        counter!("events_errors_total", "type" => "validation").increment(1);
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiError {
                message: "invalid_query".to_string(),
                details,
            }),
        )
    })?;

    let catalog = state.store.read_catalog().map_err(|e| {
        counter!("events_errors_total", "type" => "catalog").increment(1);
        tracing::error!(error = %e, "failed to read catalog");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError {
                message: "catalog_unavailable".to_string(),
                details: vec![format!("{e:#}")],
            }),
        )
    })?;

    let (last_updated, stored) = match catalog {
        Some(catalog) => (Some(catalog.last_updated), catalog.events),
        None => (None, Vec::new()),
    };
    let events = filter.apply(stored, Local::now().date_naive());
    let response = EventsResponse {
        last_updated,
        count: events.len(),
        events,
    };

    histogram!("events_latency_seconds", "route" => "events").record(start.elapsed().as_secs_f64());
    format_response(&headers, &response)
}

#[utoipa::path(
    get,
    path = "/v1/status",
    tag = "ingest",
    responses(
        (status = 200, description = "Most recent ingest run", body = RunStatus),
        (status = 404, description = "No run recorded", body = ApiError)
    )
)]
async fn status(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let not_found = || {
        (
            StatusCode::NOT_FOUND,
            Json(ApiError {
                message: "no_runs".to_string(),
                details: vec![],
            }),
        )
    };

    let Some(ledger) = &state.ledger else {
        return Err(not_found());
    };
    let run = {
        let conn = ledger.lock().await;
        ingest::last_run(&conn)
    };
    match run {
        Ok(Some(run)) => format_response(&headers, &run),
        Ok(None) => Err(not_found()),
        Err(e) => {
            tracing::error!(error = %e, "failed to read run ledger");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError {
                    message: "ledger_unavailable".to_string(),
                    details: vec![format!("{e:#}")],
                }),
            ))
        }
    }
}

fn format_response<T: Serialize>(headers: &HeaderMap, response: &T) -> ApiResult {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json");

    if accept.contains("yaml") {
        let yaml = serde_yaml::to_string(response).unwrap_or_default();
        Ok(([(header::CONTENT_TYPE, "application/x-yaml")], yaml).into_response())
    } else {
        let json = serde_json::to_string_pretty(response).unwrap_or_default();
        Ok(([(header::CONTENT_TYPE, "application/json")], json).into_response())
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub run_env: String,
    pub data_dir: PathBuf,
    pub catalog_path: PathBuf,
    pub ledger_path: PathBuf,
}

impl AppConfig {
    fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = PathBuf::from(lookup("DATA_DIR").unwrap_or_else(|| "data".to_string()));
        Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3100".to_string()),
            run_env: lookup("RUN_ENV").unwrap_or_else(|| "local".to_string()),
            catalog_path: lookup("CATALOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join(CATALOG_FILE)),
            ledger_path: lookup("LEDGER_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join(LEDGER_FILE)),
            data_dir,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    pub message: String,
    pub details: Vec<String>,
}
