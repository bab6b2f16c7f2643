//! HTTP Server for the dashboard API.
//!
//! Serves dashboard snapshots computed from the active source. The active
//! source starts as the configured data path and is replaced by uploads.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | GET    | `/api/procedures` | Procedures of the active table       |
//! | POST   | `/api/dashboard`  | Snapshot for a selection             |
//! | POST   | `/api/upload`     | Upload a spreadsheet as active source|
//! | GET    | `/api/sources`    | Cached sources                       |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |

use axum::{
    extract::{Multipart, State},
    http::{header, Method},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{ProceduresResponse, UploadResponse};
use crate::cache::{CachedSource, SourceKey, TableCache};
use crate::config::DashboardConfig;
use crate::error::{ServerError, ServerResult};
use crate::models::ProcedureTable;
use crate::transform::pipeline::{build_snapshot, DashboardRequest, DashboardSnapshot};

/// Where the dashboard currently reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveSource {
    File(PathBuf),
    Upload(SourceKey),
}

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    cache: Arc<TableCache>,
    active: Arc<RwLock<Option<ActiveSource>>>,
}

impl AppState {
    pub fn new(cache: TableCache, active: Option<ActiveSource>) -> Self {
        Self {
            cache: Arc::new(cache),
            active: Arc::new(RwLock::new(active)),
        }
    }

    pub fn from_config(config: &DashboardConfig) -> Self {
        Self::new(
            TableCache::new(config.loader.clone()),
            Some(ActiveSource::File(config.data_path.clone())),
        )
    }

    pub fn active_source(&self) -> Option<ActiveSource> {
        self.active.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Switch the active source. An upload that stops being active is
    /// evicted from the cache, so only the current upload stays resident.
    pub fn set_active(&self, source: ActiveSource) {
        let previous = self
            .active
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .replace(source.clone());

        if let Some(ActiveSource::Upload(old)) = previous {
            if source != ActiveSource::Upload(old.clone()) {
                self.cache.invalidate(&old);
            }
        }
    }

    /// Table of the active source. File sources reload when changed on disk.
    pub fn active_table(&self) -> ServerResult<Arc<ProcedureTable>> {
        match self.active_source().ok_or(ServerError::NoSource)? {
            ActiveSource::File(path) => Ok(self.cache.get_or_load_path(&path)?),
            ActiveSource::Upload(key) => self.cache.get(&key).ok_or(ServerError::NoSource),
        }
    }

    /// Load uploaded bytes and make them the active source.
    pub fn upload(&self, bytes: &[u8], name: &str) -> ServerResult<UploadResponse> {
        let (key, table) = self.cache.get_or_load_bytes(bytes, name)?;
        self.set_active(ActiveSource::Upload(key.clone()));
        Ok(UploadResponse::new(&key, &table))
    }

    pub fn snapshot(&self, request: &DashboardRequest) -> ServerResult<DashboardSnapshot> {
        let table = self.active_table()?;
        Ok(build_snapshot(&table, request)?)
    }
}

/// Run loading or shaping work on the blocking pool.
async fn blocking<T, F>(work: F) -> ServerResult<T>
where
    F: FnOnce() -> ServerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ServerError::Internal(format!("Worker task failed: {}", e)))?
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/procedures", get(procedures))
        .route("/api/dashboard", post(dashboard))
        .route("/api/upload", post(upload))
        .route("/api/sources", get(sources))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: DashboardConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::from_config(&config);
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, data = %config.data_path.display(), "dashboard server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "clinica",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "procedures": "GET /api/procedures",
            "dashboard": "POST /api/dashboard",
            "upload": "POST /api/upload",
            "sources": "GET /api/sources",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

async fn procedures(State(state): State<AppState>) -> ServerResult<Json<ProceduresResponse>> {
    let table = blocking(move || state.active_table()).await?;
    Ok(Json(ProceduresResponse::from(table.as_ref())))
}

async fn dashboard(
    State(state): State<AppState>,
    Json(request): Json<DashboardRequest>,
) -> ServerResult<Json<DashboardSnapshot>> {
    blocking(move || state.snapshot(&request))
        .await
        .map(Json)
        .map_err(|e| {
            log_error(format!("Dashboard request failed: {}", e));
            e
        })
}

async fn sources(State(state): State<AppState>) -> Json<Vec<CachedSource>> {
    Json(state.cache.list())
}

/// Upload a spreadsheet (multipart field `file`)
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ServerResult<Json<UploadResponse>> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            file_data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?
                    .to_vec(),
            );
        }
    }

    let bytes = file_data.ok_or_else(|| ServerError::BadRequest("No file provided".into()))?;
    let name = file_name.ok_or_else(|| {
        ServerError::BadRequest("Uploaded file has no name, format unknown".into())
    })?;

    log_info(format!("New upload: {} ({} bytes)", name, bytes.len()));
    blocking(move || state.upload(&bytes, &name))
        .await
        .map(Json)
        .map_err(|e| {
            log_error(format!("Upload failed: {}", e));
            e
        })
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
