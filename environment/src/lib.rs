//! Deploys one coverage collector: a claim to write coverage into, a
//! single-replica workload serving it and a `NodePort` service in front.

mod options;

use std::collections::BTreeMap;

use ephemera_cluster::{
    ClusterApi, ClusterError, Journal, ResourceGraph, ResourceKey, WaitOptions, apply_graph,
    names::{random_letters, random_suffix},
    resources::{
        Container, ContainerPort, Deployment, EnvVar, LabelSelector, NetworkPolicy,
        NetworkPolicyIngressRule, NetworkPolicyPort, PersistentVolumeClaim, PodSpec, Service,
        ServicePort, Volume, VolumeMount,
    },
    with_timeout,
};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use options::{DEFAULT_IMAGE, DEFAULT_STORAGE_SIZE, DEFAULT_TAG, DeployOptions, ResolvedOptions};

pub const COLLECTOR_PORT: u16 = 8080;
pub const COVERDIR: &str = "/tmp/coverdir";

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum EnvironmentError {
    #[error("invalid environment options: {0}")]
    #[diagnostic(code(environment::configuration))]
    Configuration(String),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cluster(#[from] ClusterError),
}

/// What a deployed environment exposes to the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EnvironmentOutputs {
    pub namespace: String,
    pub port: u16,
    pub claim_name: String,
}

/// Keys of a declared environment, used to read its outputs after apply.
#[derive(Clone, Debug)]
pub struct EnvironmentHandles {
    pub namespace: String,
    pub claim_name: String,
    pub service: ResourceKey,
}

impl EnvironmentHandles {
    /// Reads the node port of the applied service, from the apply journal
    /// when the create response carried it, otherwise from the cluster
    /// within `wait.timeout`.
    pub async fn outputs(
        &self,
        api: &dyn ClusterApi,
        journal: &Journal,
        wait: WaitOptions,
    ) -> Result<EnvironmentOutputs, EnvironmentError> {
        let port = match journal.object(&self.service).and_then(node_port) {
            Some(port) => port,
            None => {
                let service =
                    with_timeout("reading the service", wait.timeout, api.get(&self.service))
                        .await?;
                service
                    .as_ref()
                    .and_then(node_port)
                    .ok_or_else(|| ClusterError::UnexpectedObject {
                        key: self.service.to_string(),
                        reason: "service has no node port".to_string(),
                    })?
            }
        };
        Ok(EnvironmentOutputs {
            namespace: self.namespace.clone(),
            port,
            claim_name: self.claim_name.clone(),
        })
    }
}

fn node_port(service: &Value) -> Option<u16> {
    service
        .pointer("/spec/ports/0/nodePort")?
        .as_u64()
        .and_then(|p| u16::try_from(p).ok())
}

/// Declares the claim, workload, service and (when hardened) ingress policy
/// of one environment. Everything depends on `namespace_dependency` when the
/// namespace is declared in the same graph.
pub fn declare_environment(
    graph: &mut ResourceGraph,
    options: &ResolvedOptions,
    namespace_dependency: Option<ResourceKey>,
) -> Result<EnvironmentHandles, EnvironmentError> {
    let ns = options.namespace.as_str();
    let ns_dep: Vec<ResourceKey> = namespace_dependency.into_iter().collect();
    let claim_name = random_suffix(8);
    let workload = format!("collector-{claim_name}");

    let labels = BTreeMap::from([
        ("app.kubernetes.io/component".to_string(), "collector".to_string()),
        ("app.kubernetes.io/part-of".to_string(), "ephemera".to_string()),
    ]);
    let mut workload_labels = labels.clone();
    workload_labels.extend([
        ("app.kubernetes.io/name".to_string(), "ephemera-collector".to_string()),
        ("app.kubernetes.io/version".to_string(), options.tag.clone()),
        ("app.kubernetes.io/instance".to_string(), claim_name.clone()),
    ]);

    let claim = graph.declare(
        &PersistentVolumeClaim::new(
            claim_name.clone(),
            ns,
            labels.clone(),
            options.storage_class.clone(),
            options.access_modes.clone(),
            options.storage_size.clone(),
        ),
        ns_dep.clone(),
    )?;

    let mut env = vec![EnvVar::literal("COVERDIR", COVERDIR)];
    let mut volume_mounts = vec![VolumeMount {
        name: "coverdir".to_string(),
        mount_path: COVERDIR.to_string(),
        read_only: None,
    }];
    let mut volumes = vec![Volume::claim("coverdir", claim_name.clone())];
    if let Some(chain) = &options.chain_claim {
        // A private path, so the chained coverage never lands in COVERDIR.
        let path = format!("/tmp/{}", random_letters(16));
        env.push(EnvVar::literal("GOCOVERDIR", path.clone()));
        volume_mounts.push(VolumeMount {
            name: "coverages".to_string(),
            mount_path: path,
            read_only: Some(true),
        });
        volumes.push(Volume::claim("coverages", chain.clone()));
    }

    let pod = PodSpec {
        containers: vec![Container {
            name: "collector".to_string(),
            image: options.image_reference(),
            image_pull_policy: Some("Always"),
            env,
            ports: vec![ContainerPort {
                name: "api".to_string(),
                container_port: COLLECTOR_PORT,
                protocol: "TCP",
            }],
            volume_mounts,
        }],
        volumes,
    };
    let mut deployment_deps = ns_dep.clone();
    deployment_deps.push(claim);
    graph.declare(
        &Deployment::new(workload.clone(), ns, workload_labels.clone(), 1, pod),
        deployment_deps,
    )?;

    let service = graph.declare(
        &Service::node_port(
            workload.clone(),
            ns,
            labels.clone(),
            workload_labels.clone(),
            vec![ServicePort {
                name: "api".to_string(),
                port: COLLECTOR_PORT,
                target_port: COLLECTOR_PORT,
                protocol: "TCP",
            }],
        ),
        ns_dep.clone(),
    )?;

    if options.harden {
        let mut ingress = NetworkPolicy::new(
            format!("{workload}-ingress"),
            ns,
            labels,
            LabelSelector::match_labels(workload_labels),
        );
        ingress.add_ingress_rule(NetworkPolicyIngressRule {
            from: Vec::new(),
            ports: vec![NetworkPolicyPort {
                protocol: "TCP",
                port: COLLECTOR_PORT,
            }],
        });
        graph.declare(&ingress, ns_dep)?;
    }

    tracing::debug!(namespace = ns, claim = %claim_name, "declared environment");
    Ok(EnvironmentHandles {
        namespace: ns.to_string(),
        claim_name,
        service,
    })
}

/// Declares and applies one environment on its own.
///
/// Created objects are recorded in `journal` even when apply fails.
pub async fn deploy(
    api: &dyn ClusterApi,
    options: &DeployOptions,
    wait: WaitOptions,
    journal: &mut Journal,
) -> Result<EnvironmentOutputs, EnvironmentError> {
    let resolved = options.resolve()?;
    let mut graph = ResourceGraph::new();
    let handles = declare_environment(&mut graph, &resolved, None)?;
    with_timeout(
        "applying the environment",
        wait.timeout,
        apply_graph(api, &graph, journal),
    )
    .await?;
    let outputs = handles.outputs(api, journal, wait).await?;
    tracing::info!(
        namespace = %outputs.namespace,
        port = outputs.port,
        claim = %outputs.claim_name,
        "deployed environment"
    );
    Ok(outputs)
}
