use std::path::PathBuf;

use ephemera_cluster::ClusterError;
use ephemera_coverage::{CodecError, ToolchainError};
use ephemera_environment::EnvironmentError;
use miette::Diagnostic;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum LifecycleError {
    #[error("{0}")]
    #[diagnostic(code(lifecycle::configuration))]
    Configuration(String),
    #[error("no session state found at {}", path.display())]
    #[diagnostic(
        code(lifecycle::missing_session),
        help("`down` only tears down what a previous `up` recorded")
    )]
    MissingSession { path: PathBuf },
    #[error("fetching {url} failed: {message}")]
    #[diagnostic(code(lifecycle::transport))]
    Transport { url: String, message: String },
    #[error(transparent)]
    #[diagnostic(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Toolchain(#[from] ToolchainError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cluster(#[from] ClusterError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Environment(#[from] EnvironmentError),
    #[error("failed to access {}: {source}", path.display())]
    #[diagnostic(code(lifecycle::io_error))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid session state: {0}")]
    #[diagnostic(code(lifecycle::invalid_session))]
    Json(#[from] serde_json::Error),
}

impl LifecycleError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
