use ephemera_cluster::resources::PolicyRule;

/// Everything an environment lifecycle does to its own objects.
pub const ROLE_VERBS: [&str; 6] = ["create", "delete", "get", "patch", "list", "watch"];
pub const READ_VERBS: [&str; 3] = ["get", "list", "watch"];

/// Namespace-scoped rules for the objects an environment creates and watches.
pub fn role_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule::new(
            "",
            &[
                "persistentvolumeclaims",
                "services",
                "endpoints",
                "events",
                "pods",
            ],
            &ROLE_VERBS,
        ),
        PolicyRule::new("apps", &["deployments", "replicasets"], &ROLE_VERBS),
        PolicyRule::new("networking.k8s.io", &["networkpolicies"], &ROLE_VERBS),
    ]
}

/// Cluster-wide read access to storage classes.
pub fn cluster_role_rules() -> Vec<PolicyRule> {
    vec![PolicyRule::new(
        "storage.k8s.io",
        &["storageclasses"],
        &READ_VERBS,
    )]
}
