//! HTTP server for the transformation API.
//!
//! # API Endpoints
//!
//! | Method | Path           | Description                        |
//! |--------|----------------|------------------------------------|
//! | GET    | `/health`      | Health check                       |
//! | POST   | `/transform`   | Transform a batch of rows          |
//! | GET    | `/api/systems` | Configured CS and HS ids           |
//! | GET    | `/api/logs`    | SSE stream for real-time logs      |

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::{LogEntry, LOG_BROADCASTER};
use super::types::{error_response, SystemsResponse, TransformationRequest, TransformationResponse};
use crate::config::Repository;
use crate::error::{ElevationError, ServerError, ServerResult, TransformError};
use crate::transform::pipeline::transform_rows;

type AppState = Arc<Repository>;

impl ServerError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ServerError::Transform(e) => match e {
                TransformError::InvalidSystem { .. }
                | TransformError::PathNotFound(_)
                | TransformError::Unsupported(_) => StatusCode::BAD_REQUEST,
                TransformError::Elevation(ElevationError::Timeout(_)) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                TransformError::Elevation(_)
                | TransformError::MissingEdge { .. }
                | TransformError::SessionFinished => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServerError::Io(_) | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Build the router over a loaded repository.
pub fn build_router(repo: Arc<Repository>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    let mut router = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/transform", post(transform))
        .route("/api/systems", get(systems));
    // The log stream exposes request details; production deployments go without it.
    if !repo.in_production() {
        router = router.route("/api/logs", get(sse_logs));
    }

    router.layer(cors).with_state(repo)
}

/// Start the HTTP server
pub async fn start_server(port: u16, repo: Arc<Repository>) -> ServerResult<()> {
    let streams_logs = !repo.in_production();
    let app = build_router(repo);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 BGSTrans server running on http://localhost:{}", port);
    println!("   POST /transform    - Transform coordinates");
    println!("   GET  /api/systems  - Configured systems");
    if streams_logs {
        println!("   GET  /api/logs     - SSE log stream");
    }
    println!("   GET  /health       - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health(State(repo): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "bgstrans",
        "version": env!("CARGO_PKG_VERSION"),
        "coordinateSystems": repo.valid_cs().len(),
        "heightSystems": repo.valid_hs().len(),
        "endpoints": {
            "transform": "POST /transform",
            "systems": "GET /api/systems",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

async fn systems(State(repo): State<AppState>) -> Json<SystemsResponse> {
    Json(SystemsResponse {
        coordinate_systems: repo.valid_cs().iter().cloned().collect(),
        height_systems: repo.valid_hs().iter().cloned().collect(),
        reference_cs: repo.reference_cs().to_string(),
    })
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers drop the missed entries and keep streaming.
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

async fn run_transform(repo: &Repository, headers: &HeaderMap, body: &[u8], request_id: &str) -> ServerResult<TransformationResponse> {
    if !is_json(headers) {
        return Err(ServerError::UnsupportedMediaType);
    }
    let request: TransformationRequest =
        serde_json::from_slice(body).map_err(|e| ServerError::BadRequest(e.to_string()))?;

    LOG_BROADCASTER.log(
        LogEntry::info(format!(
            "POST /transform: {} -> {}, {} rows",
            request.systems.input_cs(),
            request.systems.output_cs(),
            request.d.len()
        ))
        .with_request(request_id),
    );

    let d = transform_rows(repo, &request.systems, &request.d, Some(request_id)).await?;
    Ok(TransformationResponse { d })
}

async fn transform(
    State(repo): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TransformationResponse>, (StatusCode, Json<Value>)> {
    let request_id = Uuid::new_v4().to_string();

    match run_transform(&repo, &headers, &body, &request_id).await {
        Ok(response) => {
            LOG_BROADCASTER.log(
                LogEntry::success(format!("{} rows transformed", response.d.len()))
                    .with_request(request_id.as_str()),
            );
            Ok(Json(response))
        }
        Err(e) => {
            LOG_BROADCASTER.log(LogEntry::error(e.to_string()).with_request(request_id.as_str()));
            Err((e.status(), Json(error_response(&e.to_string(), &request_id))))
        }
    }
}
