use crate::EnvironmentError;

pub const DEFAULT_TAG: &str = "dev";
pub const DEFAULT_STORAGE_SIZE: &str = "50M";
pub const DEFAULT_IMAGE: &str = "ephemera/collector";

/// Caller-facing deployment options. Unset or empty values take their
/// defaults in [`DeployOptions::resolve`].
#[derive(Clone, Debug, Default, bon::Builder)]
pub struct DeployOptions {
    #[builder(into)]
    pub namespace: String,
    #[builder(into)]
    pub tag: Option<String>,
    #[builder(into)]
    pub storage_class: Option<String>,
    #[builder(into)]
    pub storage_size: Option<String>,
    #[builder(default)]
    pub access_modes: Vec<String>,
    /// Registry prefix of the collector image, e.g. `registry.local:5000`.
    #[builder(into)]
    pub registry: Option<String>,
    /// Image repository, without registry or tag.
    #[builder(into)]
    pub image: Option<String>,
    /// Existing claim holding coverage of a previous environment, mounted
    /// read-only into this one.
    #[builder(into)]
    pub chain_claim: Option<String>,
    #[builder(default)]
    pub harden: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedOptions {
    pub namespace: String,
    pub tag: String,
    pub storage_class: String,
    pub storage_size: String,
    pub access_modes: Vec<String>,
    /// Empty or ending with exactly one `/`.
    pub registry: String,
    pub image: String,
    pub chain_claim: Option<String>,
    pub harden: bool,
}

impl ResolvedOptions {
    pub fn image_reference(&self) -> String {
        format!("{}{}:{}", self.registry, self.image, self.tag)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl DeployOptions {
    pub fn resolve(&self) -> Result<ResolvedOptions, EnvironmentError> {
        let namespace = self.namespace.trim();
        if namespace.is_empty() {
            return Err(EnvironmentError::Configuration(
                "a namespace is required".to_string(),
            ));
        }
        let storage_class = non_empty(&self.storage_class).ok_or_else(|| {
            EnvironmentError::Configuration("a storage class is required".to_string())
        })?;
        let access_modes: Vec<String> = self
            .access_modes
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
        if access_modes.is_empty() {
            return Err(EnvironmentError::Configuration(
                "at least one access mode is required".to_string(),
            ));
        }
        let registry = match non_empty(&self.registry) {
            Some(registry) => format!("{}/", registry.trim_end_matches('/')),
            None => String::new(),
        };

        Ok(ResolvedOptions {
            namespace: namespace.to_string(),
            tag: non_empty(&self.tag).unwrap_or(DEFAULT_TAG).to_string(),
            storage_class: storage_class.to_string(),
            storage_size: non_empty(&self.storage_size)
                .unwrap_or(DEFAULT_STORAGE_SIZE)
                .to_string(),
            access_modes,
            registry,
            image: non_empty(&self.image).unwrap_or(DEFAULT_IMAGE).to_string(),
            chain_claim: non_empty(&self.chain_claim).map(str::to_string),
            harden: self.harden,
        })
    }
}
