use std::time::Duration;

use miette::Diagnostic;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum ClusterError {
    #[error("invalid cluster configuration: {0}")]
    #[diagnostic(code(cluster::configuration))]
    Configuration(String),
    #[error("kubeconfig must contain exactly one cluster to infer the API endpoint, found {count}")]
    #[diagnostic(
        code(cluster::ambiguous_cluster),
        help("pass the API server endpoint explicitly")
    )]
    AmbiguousCluster { count: usize },
    #[error("kubernetes api returned {status} for {resource}: {message}")]
    #[diagnostic(code(cluster::api))]
    Api {
        status: u16,
        resource: String,
        message: String,
    },
    #[error("kubernetes api request failed: {0}")]
    #[diagnostic(code(cluster::http))]
    Http(#[from] reqwest::Error),
    #[error("timed out after {after:?} while {what}")]
    #[diagnostic(code(cluster::timeout))]
    Timeout { what: String, after: Duration },
    #[error("resource `{key}` is declared twice")]
    #[diagnostic(code(cluster::duplicate_resource))]
    DuplicateResource { key: String },
    #[error("resource `{resource}` depends on undeclared resource `{dependency}`")]
    #[diagnostic(code(cluster::unknown_dependency))]
    UnknownDependency { resource: String, dependency: String },
    #[error("resource graph contains a dependency cycle: {}", cycle.join(" -> "))]
    #[diagnostic(code(cluster::cycle))]
    Cycle { cycle: Vec<String> },
    #[error("unexpected state of `{key}`: {reason}")]
    #[diagnostic(code(cluster::unexpected_object))]
    UnexpectedObject { key: String, reason: String },
    #[error("json error: {0}")]
    #[diagnostic(code(cluster::json))]
    Json(#[from] serde_json::Error),
    #[error("invalid kubeconfig: {0}")]
    #[diagnostic(code(cluster::yaml))]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid base64 data: {0}")]
    #[diagnostic(code(cluster::base64))]
    Base64(#[from] base64::DecodeError),
    #[error("io error: {0}")]
    #[diagnostic(code(cluster::io))]
    Io(#[from] std::io::Error),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::Api { status: 404, .. })
    }
}
