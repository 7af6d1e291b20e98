//! HTTP trigger surface.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/ping` | Liveness, returns `OK` |
//! | `GET`  | `/health` | Status and version |
//! | `GET`  | `/ingest` | Start an ingest run and stream its progress |
//! | `GET`  | `/resolve` | Look up a reference |
//!
//! `/ingest` accepts `lettercode`, `start`, `end`, `index`, `host`, `port`
//! and `action`. Writes only happen when `action` is `1`, `true` or `yes`.
//! When the source and the index are both reachable the run starts in the
//! background and its progress is streamed as newline-delimited JSON, ending
//! with a `finished` or `error` line. Dropping the connection cancels the run
//! at the next level boundary. Otherwise the resolved configuration is
//! returned with `source_connection`/`index_connection` flags and status 503.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "reference is required" } }
//! ```

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::canonical::Canonicalizer;
use crate::config::Config;
use crate::db;
use crate::index::{ElasticIndex, SearchIndex};
use crate::ingest::{
    stats_lookup, IngestPipeline, IngestRequest, IngestSettings, IngestSummary,
    LettercodeSelection,
};
use crate::progress::ChannelProgress;
use crate::reference::ReferenceData;
use crate::resolve::resolve;
use crate::source::{CatalogueSource, SqliteSource};

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    reference: Arc<ReferenceData>,
    /// Index used when a request does not override host, port or name.
    index: Arc<dyn SearchIndex>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        reference: Arc<ReferenceData>,
        index: Arc<dyn SearchIndex>,
    ) -> Self {
        Self {
            config,
            reference,
            index,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ping", get(handle_ping))
        .route("/health", get(handle_health))
        .route("/ingest", get(handle_ingest))
        .route("/resolve", get(handle_resolve))
        .layer(cors)
        .with_state(state)
}

/// Serve on `[server].bind` until the process ends.
pub async fn run_server(config: &Config, reference: Arc<ReferenceData>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let index: Arc<dyn SearchIndex> = Arc::new(ElasticIndex::new(&config.index)?);
    let state = AppState::new(Arc::new(config.clone()), reference, index);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!(%bind_addr, "resolver listening");
    println!("Resolver listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{:#}", err),
    }
}

// ============ GET /ping, GET /health ============

async fn handle_ping() -> &'static str {
    "OK"
}

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

// ============ GET /ingest ============

#[derive(Debug, Default, Deserialize)]
struct IngestParams {
    lettercode: Option<String>,
    start: Option<String>,
    end: Option<String>,
    index: Option<String>,
    host: Option<String>,
    port: Option<String>,
    action: Option<String>,
}

/// Resolved configuration for an ingest request.
#[derive(Debug, Serialize)]
struct IngestConfigSummary {
    lettercode: Option<String>,
    start: Option<String>,
    end: Option<String>,
    selection: LettercodeSelection,
    index: String,
    index_url: String,
    source: String,
    live: bool,
    source_connection: bool,
    index_connection: bool,
}

/// `1`, `true` and `yes` (any case) switch writes on.
pub fn is_truthy(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}

/// Index base URL with the request's host and port applied.
fn target_url(base: &str, host: Option<&str>, port: Option<&str>) -> anyhow::Result<String> {
    let mut url = reqwest::Url::parse(base).with_context(|| format!("invalid index url '{}'", base))?;
    if let Some(host) = host.filter(|h| !h.is_empty()) {
        url.set_host(Some(host))
            .with_context(|| format!("invalid host '{}'", host))?;
    }
    if let Some(port) = port.filter(|p| !p.is_empty()) {
        let port: u16 = port
            .parse()
            .with_context(|| format!("invalid port '{}'", port))?;
        url.set_port(Some(port))
            .map_err(|_| anyhow::anyhow!("url '{}' cannot carry a port", base))?;
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum RunOutcome {
    Finished { summary: IngestSummary },
    Error { message: String },
}

fn ndjson_line<T: Serialize>(value: &T) -> String {
    let mut line = serde_json::to_string(value).unwrap_or_else(|e| {
        serde_json::json!({ "event": "error", "message": e.to_string() }).to_string()
    });
    line.push('\n');
    line
}

async fn handle_ingest(
    State(state): State<AppState>,
    Query(params): Query<IngestParams>,
) -> Result<Response, AppError> {
    let selection = LettercodeSelection::from_params(
        params.lettercode.as_deref(),
        params.start.as_deref(),
        params.end.as_deref(),
    )
    .map_err(|e| bad_request(e.to_string()))?;
    let live = is_truthy(params.action.as_deref());
    let config = &state.config;

    let overridden = params.host.is_some() || params.port.is_some() || params.index.is_some();
    let index_name = params
        .index
        .clone()
        .filter(|i| !i.is_empty())
        .unwrap_or_else(|| state.index.name().to_string());
    let index_url = target_url(&config.index.url, params.host.as_deref(), params.port.as_deref())
        .map_err(|e| bad_request(format!("{:#}", e)))?;
    let index: Arc<dyn SearchIndex> = if overridden {
        Arc::new(
            ElasticIndex::with_target(&config.index, &index_url, &index_name)
                .map_err(internal)?,
        )
    } else {
        state.index.clone()
    };

    let source = match db::connect(&config.source).await {
        Ok(pool) => {
            let source = SqliteSource::new(pool);
            match source.ping().await {
                Ok(()) => Some(source),
                Err(e) => {
                    warn!(error = %e, "catalogue source ping failed");
                    None
                }
            }
        }
        Err(e) => {
            warn!(error = %format!("{:#}", e), "catalogue source unavailable");
            None
        }
    };
    let index_connection = index.ping().await.unwrap_or(false);

    let summary = IngestConfigSummary {
        lettercode: params.lettercode.clone(),
        start: params.start.clone(),
        end: params.end.clone(),
        selection: selection.clone(),
        index: index_name,
        index_url,
        source: config.source.path.display().to_string(),
        live,
        source_connection: source.is_some(),
        index_connection,
    };
    info!(?summary, "ingest requested");

    let Some(source) = source.filter(|_| index_connection) else {
        return Ok((StatusCode::SERVICE_UNAVAILABLE, Json(summary)).into_response());
    };

    let stats = stats_lookup(config).map_err(internal)?;
    let pipeline = IngestPipeline::new(
        Arc::new(source),
        index,
        Canonicalizer::new(state.reference.clone()),
        stats,
        IngestSettings::from_config(config),
    );
    let request = IngestRequest { selection, live };

    let (tx, rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = oneshot::channel();
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        let reporter = ChannelProgress::new(tx);
        let outcome = match pipeline.run(&request, &reporter, &token).await {
            Ok(summary) => RunOutcome::Finished { summary },
            Err(e) => {
                error!(error = %format!("{:#}", e), "ingest run failed");
                RunOutcome::Error {
                    message: format!("{:#}", e),
                }
            }
        };
        drop(reporter);
        let _ = done_tx.send(outcome);
    });

    // The guard lives as long as the body stream; a dropped connection cancels the run.
    let guard = cancel.drop_guard();
    let events = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        Some((ndjson_line(&event), (rx, guard)))
    });
    let finished = stream::once(async move {
        match done_rx.await {
            Ok(outcome) => ndjson_line(&outcome),
            Err(_) => ndjson_line(&RunOutcome::Error {
                message: "ingest task ended unexpectedly".to_string(),
            }),
        }
    });
    let body = Body::from_stream(events.chain(finished).map(Ok::<_, Infallible>));

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        body,
    )
        .into_response())
}

// ============ GET /resolve ============

#[derive(Debug, Deserialize)]
struct ResolveParams {
    reference: Option<String>,
}

async fn handle_resolve(
    State(state): State<AppState>,
    Query(params): Query<ResolveParams>,
) -> Result<Response, AppError> {
    let reference = params
        .reference
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| bad_request("reference is required"))?;

    match resolve(state.index.as_ref(), &reference).await {
        Ok(Some(lookup)) => Ok(Json(lookup).into_response()),
        Ok(None) => Err(not_found(format!("no record matches '{}'", reference))),
        Err(e) => Err(internal(e)),
    }
}
