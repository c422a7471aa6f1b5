use std::fmt;

use serde::{Deserialize, Serialize};

/// The object kinds this workspace creates and deletes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Namespace,
    Secret,
    ServiceAccount,
    Role,
    ClusterRole,
    RoleBinding,
    ClusterRoleBinding,
    NetworkPolicy,
    PersistentVolumeClaim,
    Deployment,
    Service,
}

impl ResourceKind {
    fn api_prefix(self) -> &'static str {
        match self {
            ResourceKind::Namespace
            | ResourceKind::Secret
            | ResourceKind::ServiceAccount
            | ResourceKind::PersistentVolumeClaim
            | ResourceKind::Service => "/api/v1",
            ResourceKind::Role
            | ResourceKind::ClusterRole
            | ResourceKind::RoleBinding
            | ResourceKind::ClusterRoleBinding => "/apis/rbac.authorization.k8s.io/v1",
            ResourceKind::NetworkPolicy => "/apis/networking.k8s.io/v1",
            ResourceKind::Deployment => "/apis/apps/v1",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            ResourceKind::Namespace => "namespaces",
            ResourceKind::Secret => "secrets",
            ResourceKind::ServiceAccount => "serviceaccounts",
            ResourceKind::Role => "roles",
            ResourceKind::ClusterRole => "clusterroles",
            ResourceKind::RoleBinding => "rolebindings",
            ResourceKind::ClusterRoleBinding => "clusterrolebindings",
            ResourceKind::NetworkPolicy => "networkpolicies",
            ResourceKind::PersistentVolumeClaim => "persistentvolumeclaims",
            ResourceKind::Deployment => "deployments",
            ResourceKind::Service => "services",
        }
    }

    pub fn is_namespaced(self) -> bool {
        !matches!(
            self,
            ResourceKind::Namespace | ResourceKind::ClusterRole | ResourceKind::ClusterRoleBinding
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Identifies one object in the cluster. Stored in the session file so a
/// later process can delete what an earlier one created.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceKey {
    pub fn cluster_scoped(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.into(),
        }
    }

    pub fn namespaced(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn namespace_key(name: impl Into<String>) -> Self {
        Self::cluster_scoped(ResourceKind::Namespace, name)
    }

    /// `POST` target for creating this object.
    pub fn collection_path(&self) -> String {
        let prefix = self.kind.api_prefix();
        match &self.namespace {
            Some(ns) if self.kind.is_namespaced() => {
                format!("{prefix}/namespaces/{ns}/{}", self.kind.plural())
            }
            _ => format!("{prefix}/{}", self.kind.plural()),
        }
    }

    pub fn object_path(&self) -> String {
        format!("{}/{}", self.collection_path(), self.name)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{ns}/{}", self.kind, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}
