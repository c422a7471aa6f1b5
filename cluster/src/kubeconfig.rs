use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ClusterError;

/// The subset of the kubeconfig format this workspace reads and writes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    #[serde(rename = "apiVersion", default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterEntry,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEntry {
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_skip_tls_verify: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: UserEntry,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key_data: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextEntry,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub cluster: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// The cluster, user and default namespace selected by the current context.
#[derive(Clone, Debug)]
pub struct ResolvedContext<'a> {
    pub cluster: &'a ClusterEntry,
    pub user: &'a UserEntry,
    pub namespace: Option<&'a str>,
}

impl Kubeconfig {
    pub fn from_yaml(raw: &str) -> Result<Self, ClusterError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn to_yaml(&self) -> Result<String, ClusterError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// One cluster, one user, one context pointing at `namespace`, selected
    /// as the current context.
    pub fn single(
        name: &str,
        server: impl Into<String>,
        certificate_authority_data: impl Into<String>,
        token: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            api_version: Some("v1".to_string()),
            kind: Some("Config".to_string()),
            clusters: vec![NamedCluster {
                name: name.to_string(),
                cluster: ClusterEntry {
                    server: server.into(),
                    certificate_authority_data: Some(certificate_authority_data.into()),
                    ..Default::default()
                },
            }],
            users: vec![NamedUser {
                name: name.to_string(),
                user: UserEntry {
                    token: Some(token.into()),
                    ..Default::default()
                },
            }],
            contexts: vec![NamedContext {
                name: name.to_string(),
                context: ContextEntry {
                    cluster: name.to_string(),
                    user: name.to_string(),
                    namespace: Some(namespace.into()),
                },
            }],
            current_context: Some(name.to_string()),
        }
    }

    /// The server of the only cluster entry.
    pub fn single_cluster_server(&self) -> Result<&str, ClusterError> {
        match self.clusters.as_slice() {
            [only] => Ok(only.cluster.server.as_str()),
            clusters => Err(ClusterError::AmbiguousCluster {
                count: clusters.len(),
            }),
        }
    }

    /// Follows `current-context`. Without one, a kubeconfig with a single
    /// context uses it.
    pub fn resolve(&self) -> Result<ResolvedContext<'_>, ClusterError> {
        let context = match &self.current_context {
            Some(name) => self
                .contexts
                .iter()
                .find(|c| &c.name == name)
                .ok_or_else(|| {
                    ClusterError::Configuration(format!("context `{name}` not found in kubeconfig"))
                })?,
            None => match self.contexts.as_slice() {
                [only] => only,
                _ => {
                    return Err(ClusterError::Configuration(
                        "kubeconfig has no current-context".to_string(),
                    ));
                }
            },
        };
        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == context.context.cluster)
            .ok_or_else(|| {
                ClusterError::Configuration(format!(
                    "cluster `{}` not found in kubeconfig",
                    context.context.cluster
                ))
            })?;
        let user = self
            .users
            .iter()
            .find(|u| u.name == context.context.user)
            .ok_or_else(|| {
                ClusterError::Configuration(format!(
                    "user `{}` not found in kubeconfig",
                    context.context.user
                ))
            })?;
        Ok(ResolvedContext {
            cluster: &cluster.cluster,
            user: &user.user,
            namespace: context.context.namespace.as_deref(),
        })
    }
}
