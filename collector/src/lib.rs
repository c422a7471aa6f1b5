//! The collection endpoint served by every deployed environment: merges the
//! coverage written to the claim so far and answers with it encoded.

use std::{
    future::Future,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use ephemera_coverage::{
    COVEROUT_PATH, CodecError, CoverageToolchain, CoveroutResponse, ErrorResponse,
    LEGACY_COVEROUT_PATH, ToolchainError, encode,
};
use miette::Diagnostic;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_COVERDIR: &str = "/tmp/coverdir";

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum CollectorError {
    #[error("failed to bind {addr}: {source}")]
    #[diagnostic(code(collector::bind_failed))]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("collector stopped: {0}")]
    #[diagnostic(code(collector::serve_failed))]
    Serve(#[source] std::io::Error),
}

#[derive(Clone, Debug)]
pub struct CollectorConfig {
    /// Directory the instrumented workload writes its coverage into.
    pub coverdir: PathBuf,
    pub listen: SocketAddr,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            coverdir: PathBuf::from(DEFAULT_COVERDIR),
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
        }
    }
}

#[derive(Clone)]
struct CollectorState {
    coverdir: PathBuf,
    toolchain: Arc<dyn CoverageToolchain>,
}

#[derive(Debug, thiserror::Error)]
enum CollectError {
    #[error("failed to create scratch directory: {0}")]
    Scratch(#[source] std::io::Error),
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("encoding task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub fn router(config: &CollectorConfig, toolchain: Arc<dyn CoverageToolchain>) -> Router {
    let state = CollectorState {
        coverdir: config.coverdir.clone(),
        toolchain,
    };
    Router::new()
        .route(COVEROUT_PATH, get(coverout))
        .route(LEGACY_COVEROUT_PATH, get(coverout))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Binds `config.listen` and serves until `shutdown` resolves.
pub async fn run(
    config: &CollectorConfig,
    toolchain: Arc<dyn CoverageToolchain>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), CollectorError> {
    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(|source| CollectorError::BindFailed {
            addr: config.listen,
            source,
        })?;
    tracing::info!(
        addr = %config.listen,
        coverdir = %config.coverdir.display(),
        "collector listening"
    );
    axum::serve(listener, router(config, toolchain))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(CollectorError::Serve)
}

async fn coverout(State(state): State<Arc<CollectorState>>) -> Response {
    match collect(&state).await {
        Ok(merged) => (StatusCode::OK, Json(CoveroutResponse { merged })).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to collect coverage");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Merges into a scratch directory private to this request. The directory
/// is removed when `scratch` drops, on success and on failure.
async fn collect(state: &CollectorState) -> Result<String, CollectError> {
    let scratch = tempfile::Builder::new()
        .prefix("coverout-")
        .tempdir()
        .map_err(CollectError::Scratch)?;
    state.toolchain.merge(&state.coverdir, scratch.path()).await?;
    let merged_dir = scratch.path().to_path_buf();
    let merged = tokio::task::spawn_blocking(move || encode(&merged_dir)).await??;
    tracing::debug!(bytes = merged.len(), "encoded merged coverage");
    Ok(merged)
}
