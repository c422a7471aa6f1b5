use base64::{Engine as _, engine::general_purpose::STANDARD};
use ephemera_cluster::{ClusterError, Kubeconfig};
use serde_json::Value;

const CREDENTIAL_NAME: &str = "ephemera";

/// The fields of a populated token secret, still base64 encoded as the API
/// returns them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenMaterial {
    pub token: String,
    pub ca_data: String,
}

impl TokenMaterial {
    /// `None` until the cluster has filled in both `token` and `ca.crt`.
    pub fn from_secret(secret: &Value) -> Option<Self> {
        let data = secret.get("data")?;
        let token = data.get("token")?.as_str().filter(|s| !s.is_empty())?;
        let ca_data = data.get("ca.crt")?.as_str().filter(|s| !s.is_empty())?;
        Some(Self {
            token: token.to_string(),
            ca_data: ca_data.to_string(),
        })
    }
}

/// Builds the kubeconfig handed to the pipeline. The CA data is embedded as
/// received; the token is decoded first.
pub fn credential_document(
    material: &TokenMaterial,
    api_endpoint: &str,
    namespace: &str,
) -> Result<String, ClusterError> {
    let token = String::from_utf8(STANDARD.decode(material.token.trim())?).map_err(|_| {
        ClusterError::UnexpectedObject {
            key: "token secret".to_string(),
            reason: "token is not valid UTF-8".to_string(),
        }
    })?;
    Kubeconfig::single(
        CREDENTIAL_NAME,
        api_endpoint,
        material.ca_data.clone(),
        token,
        namespace,
    )
    .to_yaml()
}
