use std::collections::BTreeMap;

use serde::Serialize;

use crate::{ResourceKey, ResourceKind};

/// Kubernetes object metadata.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    fn named(name: impl Into<String>, labels: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            labels,
            ..Default::default()
        }
    }

    fn namespaced(
        name: impl Into<String>,
        namespace: impl Into<String>,
        labels: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            labels,
            ..Default::default()
        }
    }
}

/// A typed object that can be declared into a [`crate::ResourceGraph`].
pub trait KubeResource: Serialize {
    const KIND: ResourceKind;

    fn metadata(&self) -> &ObjectMeta;

    fn key(&self) -> ResourceKey {
        let meta = self.metadata();
        ResourceKey {
            kind: Self::KIND,
            namespace: meta.namespace.clone().filter(|_| Self::KIND.is_namespaced()),
            name: meta.name.clone(),
        }
    }
}

macro_rules! kube_resource {
    ($($ty:ident),* $(,)?) => {
        $(
            impl KubeResource for $ty {
                const KIND: ResourceKind = ResourceKind::$ty;

                fn metadata(&self) -> &ObjectMeta {
                    &self.metadata
                }
            }
        )*
    };
}

kube_resource!(
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
);

// ---- Namespace ----

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
}

impl Namespace {
    pub fn new(name: impl Into<String>, labels: BTreeMap<String, String>) -> Self {
        Self {
            api_version: "v1",
            kind: "Namespace",
            metadata: ObjectMeta::named(name, labels),
        }
    }
}

// ---- Secret ----

pub const SERVICE_ACCOUNT_TOKEN_TYPE: &str = "kubernetes.io/service-account-token";
pub const SERVICE_ACCOUNT_NAME_ANNOTATION: &str = "kubernetes.io/service-account.name";

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    #[serde(rename = "type")]
    pub secret_type: &'static str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub string_data: BTreeMap<String, String>,
}

impl Secret {
    /// A token secret the cluster fills with `token` and `ca.crt` for the
    /// named service account.
    pub fn service_account_token(
        name: impl Into<String>,
        namespace: impl Into<String>,
        labels: BTreeMap<String, String>,
        service_account: impl Into<String>,
    ) -> Self {
        let mut metadata = ObjectMeta::namespaced(name, namespace, labels);
        metadata.annotations.insert(
            SERVICE_ACCOUNT_NAME_ANNOTATION.to_string(),
            service_account.into(),
        );
        Self {
            api_version: "v1",
            kind: "Secret",
            metadata,
            secret_type: SERVICE_ACCOUNT_TOKEN_TYPE,
            string_data: BTreeMap::new(),
        }
    }
}

// ---- ServiceAccount ----

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
}

impl ServiceAccount {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        labels: BTreeMap<String, String>,
    ) -> Self {
        Self {
            api_version: "v1",
            kind: "ServiceAccount",
            metadata: ObjectMeta::namespaced(name, namespace, labels),
        }
    }
}

// ---- RBAC ----

const RBAC_API_VERSION: &str = "rbac.authorization.k8s.io/v1";
const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
    pub verbs: Vec<String>,
}

impl PolicyRule {
    pub fn new(api_group: &str, resources: &[&str], verbs: &[&str]) -> Self {
        Self {
            api_groups: vec![api_group.to_string()],
            resources: resources.iter().map(|r| r.to_string()).collect(),
            verbs: verbs.iter().map(|v| v.to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub rules: Vec<PolicyRule>,
}

impl Role {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        labels: BTreeMap<String, String>,
        rules: Vec<PolicyRule>,
    ) -> Self {
        Self {
            api_version: RBAC_API_VERSION,
            kind: "Role",
            metadata: ObjectMeta::namespaced(name, namespace, labels),
            rules,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRole {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub rules: Vec<PolicyRule>,
}

impl ClusterRole {
    pub fn new(
        name: impl Into<String>,
        labels: BTreeMap<String, String>,
        rules: Vec<PolicyRule>,
    ) -> Self {
        Self {
            api_version: RBAC_API_VERSION,
            kind: "ClusterRole",
            metadata: ObjectMeta::named(name, labels),
            rules,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    pub api_group: &'static str,
    pub kind: &'static str,
    pub name: String,
}

impl RoleRef {
    pub fn role(name: impl Into<String>) -> Self {
        Self {
            api_group: RBAC_API_GROUP,
            kind: "Role",
            name: name.into(),
        }
    }

    pub fn cluster_role(name: impl Into<String>) -> Self {
        Self {
            api_group: RBAC_API_GROUP,
            kind: "ClusterRole",
            name: name.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub kind: &'static str,
    pub name: String,
    pub namespace: String,
}

impl Subject {
    pub fn service_account(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind: "ServiceAccount",
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBinding {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub role_ref: RoleRef,
    pub subjects: Vec<Subject>,
}

impl RoleBinding {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        labels: BTreeMap<String, String>,
        role_ref: RoleRef,
        subjects: Vec<Subject>,
    ) -> Self {
        Self {
            api_version: RBAC_API_VERSION,
            kind: "RoleBinding",
            metadata: ObjectMeta::namespaced(name, namespace, labels),
            role_ref,
            subjects,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRoleBinding {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub role_ref: RoleRef,
    pub subjects: Vec<Subject>,
}

impl ClusterRoleBinding {
    pub fn new(
        name: impl Into<String>,
        labels: BTreeMap<String, String>,
        role_ref: RoleRef,
        subjects: Vec<Subject>,
    ) -> Self {
        Self {
            api_version: RBAC_API_VERSION,
            kind: "ClusterRoleBinding",
            metadata: ObjectMeta::named(name, labels),
            role_ref,
            subjects,
        }
    }
}

// ---- PersistentVolumeClaim ----

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaim {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub spec: PersistentVolumeClaimSpec,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimSpec {
    pub storage_class_name: String,
    pub access_modes: Vec<String>,
    pub resources: VolumeResourceRequirements,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeResourceRequirements {
    pub requests: BTreeMap<String, String>,
}

impl PersistentVolumeClaim {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        labels: BTreeMap<String, String>,
        storage_class_name: impl Into<String>,
        access_modes: Vec<String>,
        storage: impl Into<String>,
    ) -> Self {
        Self {
            api_version: "v1",
            kind: "PersistentVolumeClaim",
            metadata: ObjectMeta::namespaced(name, namespace, labels),
            spec: PersistentVolumeClaimSpec {
                storage_class_name: storage_class_name.into(),
                access_modes,
                resources: VolumeResourceRequirements {
                    requests: BTreeMap::from([("storage".to_string(), storage.into())]),
                },
            },
        }
    }
}

// ---- Service ----

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub spec: ServiceSpec,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    pub selector: BTreeMap<String, String>,
    pub ports: Vec<ServicePort>,
    #[serde(rename = "type")]
    pub service_type: &'static str,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    pub name: String,
    pub port: u16,
    pub target_port: u16,
    pub protocol: &'static str,
}

impl Service {
    /// A `NodePort` service; the cluster assigns the node port.
    pub fn node_port(
        name: impl Into<String>,
        namespace: impl Into<String>,
        labels: BTreeMap<String, String>,
        selector: BTreeMap<String, String>,
        ports: Vec<ServicePort>,
    ) -> Self {
        Self {
            api_version: "v1",
            kind: "Service",
            metadata: ObjectMeta::namespaced(name, namespace, labels),
            spec: ServiceSpec {
                selector,
                ports,
                service_type: "NodePort",
            },
        }
    }
}

// ---- Deployment ----

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub spec: DeploymentSpec,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    pub replicas: u32,
    pub selector: LabelSelector,
    pub template: PodTemplateSpec,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplateSpec {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    pub containers: Vec<Container>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

impl Deployment {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        labels: BTreeMap<String, String>,
        replicas: u32,
        pod: PodSpec,
    ) -> Self {
        let namespace = namespace.into();
        Self {
            api_version: "apps/v1",
            kind: "Deployment",
            metadata: ObjectMeta::namespaced(name, namespace.clone(), labels.clone()),
            spec: DeploymentSpec {
                replicas,
                selector: LabelSelector::match_labels(labels.clone()),
                template: PodTemplateSpec {
                    metadata: ObjectMeta {
                        namespace: Some(namespace),
                        labels,
                        ..Default::default()
                    },
                    spec: pod,
                },
            },
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    pub name: String,
    pub container_port: u16,
    pub protocol: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    pub persistent_volume_claim: PersistentVolumeClaimVolumeSource,
}

impl Volume {
    pub fn claim(name: impl Into<String>, claim_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persistent_volume_claim: PersistentVolumeClaimVolumeSource {
                claim_name: claim_name.into(),
            },
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimVolumeSource {
    pub claim_name: String,
}

// ---- NetworkPolicy ----

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

impl LabelSelector {
    /// Selects everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn match_labels(labels: BTreeMap<String, String>) -> Self {
        Self {
            match_labels: labels,
            match_expressions: Vec::new(),
        }
    }

    pub fn label(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::match_labels(BTreeMap::from([(key.into(), value.into())]))
    }

    pub fn not_in(key: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            match_labels: BTreeMap::new(),
            match_expressions: vec![LabelSelectorRequirement {
                key: key.into(),
                operator: "NotIn",
                values,
            }],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: &'static str,
    pub values: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicy {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub spec: NetworkPolicySpec,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicySpec {
    pub pod_selector: LabelSelector,
    pub policy_types: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ingress: Vec<NetworkPolicyIngressRule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub egress: Vec<NetworkPolicyEgressRule>,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicyIngressRule {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub from: Vec<NetworkPolicyPeer>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<NetworkPolicyPort>,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicyEgressRule {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<NetworkPolicyPeer>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<NetworkPolicyPort>,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicyPeer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_selector: Option<LabelSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_block: Option<IpBlock>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpBlock {
    pub cidr: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub except: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicyPort {
    pub protocol: &'static str,
    pub port: u16,
}

impl NetworkPolicy {
    /// A policy without rules. Policy types are added as rules are.
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        labels: BTreeMap<String, String>,
        pod_selector: LabelSelector,
    ) -> Self {
        Self {
            api_version: "networking.k8s.io/v1",
            kind: "NetworkPolicy",
            metadata: ObjectMeta::namespaced(name, namespace, labels),
            spec: NetworkPolicySpec {
                pod_selector,
                policy_types: Vec::new(),
                ingress: Vec::new(),
                egress: Vec::new(),
            },
        }
    }

    /// Selects every pod and allows no traffic in either direction.
    pub fn deny_all(
        name: impl Into<String>,
        namespace: impl Into<String>,
        labels: BTreeMap<String, String>,
    ) -> Self {
        let mut policy = Self::new(name, namespace, labels, LabelSelector::all());
        policy.spec.policy_types = vec!["Ingress", "Egress"];
        policy
    }

    pub fn add_ingress_rule(&mut self, rule: NetworkPolicyIngressRule) {
        if !self.spec.policy_types.contains(&"Ingress") {
            self.spec.policy_types.push("Ingress");
        }
        self.spec.ingress.push(rule);
    }

    pub fn add_egress_rule(&mut self, rule: NetworkPolicyEgressRule) {
        if !self.spec.policy_types.contains(&"Egress") {
            self.spec.policy_types.push("Egress");
        }
        self.spec.egress.push(rule);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn deny_all_serializes_with_both_types_and_no_rules() {
        let policy = NetworkPolicy::deny_all("deny-all", "ns1", BTreeMap::new());
        assert_eq!(
            serde_json::to_value(&policy).unwrap(),
            json!({
                "apiVersion": "networking.k8s.io/v1",
                "kind": "NetworkPolicy",
                "metadata": { "name": "deny-all", "namespace": "ns1" },
                "spec": { "podSelector": {}, "policyTypes": ["Ingress", "Egress"] },
            })
        );
    }

    #[test]
    fn token_secret_carries_type_and_annotation() {
        let secret = Secret::service_account_token("tok", "ns1", BTreeMap::new(), "sa");
        let value = serde_json::to_value(&secret).unwrap();
        assert_eq!(value["type"], "kubernetes.io/service-account-token");
        assert_eq!(
            value["metadata"]["annotations"]["kubernetes.io/service-account.name"],
            "sa"
        );
        assert!(value.get("stringData").is_none());
    }

    #[test]
    fn cluster_scoped_keys_drop_the_namespace() {
        let role = ClusterRole::new("reader-ns1", BTreeMap::new(), Vec::new());
        assert_eq!(role.key(), ResourceKey::cluster_scoped(ResourceKind::ClusterRole, "reader-ns1"));

        let sa = ServiceAccount::new("sa", "ns1", BTreeMap::new());
        assert_eq!(
            sa.key(),
            ResourceKey::namespaced(ResourceKind::ServiceAccount, "ns1", "sa")
        );
    }

    #[test]
    fn deployment_selector_matches_template_labels() {
        let labels = BTreeMap::from([("app".to_string(), "c".to_string())]);
        let dep = Deployment::new(
            "c",
            "ns1",
            labels.clone(),
            1,
            PodSpec {
                containers: vec![Container {
                    name: "c".into(),
                    image: "img:dev".into(),
                    ..Default::default()
                }],
                volumes: Vec::new(),
            },
        );
        let value = serde_json::to_value(&dep).unwrap();
        assert_eq!(value["spec"]["selector"]["matchLabels"], json!(labels));
        assert_eq!(value["spec"]["template"]["metadata"]["labels"], json!(labels));
    }
}
