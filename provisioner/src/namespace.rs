use std::collections::BTreeMap;

use ephemera_cluster::names::random_suffix;

pub const NAMESPACE_PREFIX: &str = "ephemera-install";

/// The namespace an access scope lives in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespacePlan {
    pub name: String,
    /// `false` when an existing namespace was adopted.
    pub created: bool,
}

impl NamespacePlan {
    /// Adopts `requested` when it is non-empty, otherwise plans a new
    /// namespace with a random suffix.
    pub fn new(requested: Option<&str>) -> Self {
        match requested.map(str::trim).filter(|ns| !ns.is_empty()) {
            Some(name) => Self {
                name: name.to_string(),
                created: false,
            },
            None => Self {
                name: format!("{NAMESPACE_PREFIX}-{}", random_suffix(8)),
                created: true,
            },
        }
    }
}

/// Labels of a created namespace: the caller's labels plus the pod security
/// admission levels, which always win.
pub fn namespace_labels(base: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut labels = base.clone();
    for (key, value) in [
        ("pod-security.kubernetes.io/enforce", "baseline"),
        ("pod-security.kubernetes.io/enforce-version", "latest"),
        ("pod-security.kubernetes.io/warn", "baseline"),
        ("pod-security.kubernetes.io/warn-version", "latest"),
    ] {
        labels.insert(key.to_string(), value.to_string());
    }
    labels
}
