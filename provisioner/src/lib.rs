//! Issues a namespace-scoped credential for ephemeral environments.
//!
//! A scope is a namespace (adopted or created), optionally hardened with
//! network policies, plus a service account whose token is bound to a Role
//! in that namespace and a read-only ClusterRole for storage discovery.

mod credential;
mod hardening;
mod namespace;
mod rbac;

use std::collections::BTreeMap;

use ephemera_cluster::{
    ClusterApi, ClusterError, Journal, Kubeconfig, ResourceGraph, ResourceKey, WaitOptions,
    apply_graph,
    names::random_suffix,
    resources::{
        ClusterRole, ClusterRoleBinding, Namespace, Role, RoleBinding, RoleRef, Secret,
        ServiceAccount, Subject,
    },
    wait_for, with_timeout,
};

pub use credential::{TokenMaterial, credential_document};
pub use hardening::hardening_policies;
pub use namespace::{NAMESPACE_PREFIX, NamespacePlan, namespace_labels};
pub use rbac::{READ_VERBS, ROLE_VERBS, cluster_role_rules, role_rules};

const NAME_PREFIX: &str = "ephemera";
const INSTANCE_SUFFIX_LEN: usize = 8;

#[derive(Clone, Debug, Default)]
pub struct AccessScopeRequest {
    /// Existing namespace to adopt. Absent or empty creates a new one.
    pub namespace: Option<String>,
    /// API server address written into the credential document.
    pub api_endpoint: String,
    pub harden: bool,
}

/// A declared but not yet applied access scope.
#[derive(Clone, Debug)]
pub struct AccessScope {
    namespace: NamespacePlan,
    instance: String,
    service_account: String,
    api_endpoint: String,
    token_secret: ResourceKey,
}

impl AccessScope {
    pub fn namespace(&self) -> &str {
        &self.namespace.name
    }

    pub fn created_namespace(&self) -> bool {
        self.namespace.created
    }

    /// Random suffix shared by every object of this scope, so several scopes
    /// can live in one adopted namespace.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn service_account(&self) -> &str {
        &self.service_account
    }

    /// What namespaced objects declared next to this scope must wait for.
    pub fn namespace_dependency(&self) -> Option<ResourceKey> {
        self.namespace
            .created
            .then(|| ResourceKey::namespace_key(&self.namespace.name))
    }

    /// Waits for the cluster to populate the token secret and returns the
    /// credential document.
    pub async fn credential(
        &self,
        api: &dyn ClusterApi,
        wait: WaitOptions,
    ) -> Result<String, ClusterError> {
        let material = wait_for(api, &self.token_secret, wait, TokenMaterial::from_secret).await?;
        credential_document(&material, &self.api_endpoint, &self.namespace.name)
    }
}

fn install_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/component".to_string(), "install".to_string()),
        ("app.kubernetes.io/part-of".to_string(), "ephemera".to_string()),
    ])
}

/// Declares the namespace, hardening and RBAC objects of one access scope.
pub fn declare_access_scope(
    graph: &mut ResourceGraph,
    request: &AccessScopeRequest,
) -> Result<AccessScope, ClusterError> {
    if request.api_endpoint.trim().is_empty() {
        return Err(ClusterError::Configuration(
            "an API server endpoint is required to build the credential".to_string(),
        ));
    }
    let labels = install_labels();
    let plan = NamespacePlan::new(request.namespace.as_deref());
    let ns = plan.name.as_str();
    let instance = random_suffix(INSTANCE_SUFFIX_LEN);

    let ns_dep: Vec<ResourceKey> = if plan.created {
        vec![graph.declare(&Namespace::new(ns, namespace_labels(&labels)), [])?]
    } else {
        Vec::new()
    };

    if request.harden {
        for policy in hardening_policies(ns, &instance, &labels) {
            graph.declare(&policy, ns_dep.clone())?;
        }
    }

    let account = format!("{NAME_PREFIX}-{instance}");
    let role = graph.declare(
        &Role::new(account.clone(), ns, labels.clone(), role_rules()),
        ns_dep.clone(),
    )?;
    // Cluster-scoped names carry the namespace as well.
    let cluster_name = format!("{NAME_PREFIX}-{ns}-{instance}");
    let cluster_role = graph.declare(
        &ClusterRole::new(cluster_name.clone(), labels.clone(), cluster_role_rules()),
        [],
    )?;
    let sa = graph.declare(
        &ServiceAccount::new(account.clone(), ns, labels.clone()),
        ns_dep.clone(),
    )?;
    let subjects = vec![Subject::service_account(account.clone(), ns)];
    graph.declare(
        &RoleBinding::new(
            account.clone(),
            ns,
            labels.clone(),
            RoleRef::role(account.clone()),
            subjects.clone(),
        ),
        [role, sa.clone()],
    )?;
    graph.declare(
        &ClusterRoleBinding::new(
            cluster_name.clone(),
            labels.clone(),
            RoleRef::cluster_role(cluster_name),
            subjects,
        ),
        [cluster_role, sa.clone()],
    )?;
    let token_secret = graph.declare(
        &Secret::service_account_token(format!("{account}-token"), ns, labels, account.clone()),
        [sa],
    )?;

    tracing::debug!(
        namespace = ns,
        instance = %instance,
        created = plan.created,
        harden = request.harden,
        "declared access scope"
    );
    Ok(AccessScope {
        namespace: plan,
        instance,
        service_account: account,
        api_endpoint: request.api_endpoint.clone(),
        token_secret,
    })
}

/// The result of [`provision`].
#[derive(Clone, Debug)]
pub struct Provisioned {
    pub namespace: String,
    pub service_account: String,
    pub credential: String,
}

/// Declares, applies and waits for one access scope on its own.
///
/// Created objects are recorded in `journal` even when a later step fails.
pub async fn provision(
    api: &dyn ClusterApi,
    request: &AccessScopeRequest,
    wait: WaitOptions,
    journal: &mut Journal,
) -> Result<Provisioned, ClusterError> {
    let mut graph = ResourceGraph::new();
    let scope = declare_access_scope(&mut graph, request)?;
    with_timeout(
        "applying the access scope",
        wait.timeout,
        apply_graph(api, &graph, journal),
    )
    .await?;
    let credential = scope.credential(api, wait).await?;
    tracing::info!(namespace = scope.namespace(), "provisioned access scope");
    Ok(Provisioned {
        namespace: scope.namespace().to_string(),
        service_account: scope.service_account().to_string(),
        credential,
    })
}

/// An explicit endpoint wins; otherwise the ambient kubeconfig must name
/// exactly one cluster.
pub fn resolve_api_endpoint(
    explicit: Option<&str>,
    ambient: Option<&Kubeconfig>,
) -> Result<String, ClusterError> {
    if let Some(endpoint) = explicit.map(str::trim).filter(|e| !e.is_empty()) {
        return Ok(endpoint.to_string());
    }
    match ambient {
        Some(config) => Ok(config.single_cluster_server()?.to_string()),
        None => Err(ClusterError::Configuration(
            "no API server endpoint given and no kubeconfig to infer it from".to_string(),
        )),
    }
}
