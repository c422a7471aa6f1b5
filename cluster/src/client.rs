use std::{fmt, fs, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{Certificate, Client, Identity, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::{ClusterError, Kubeconfig, ResourceKey};

pub use futures::future::BoxFuture;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound on a single API request, independent of the lifecycle timeouts.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The three verbs the lifecycle needs from a cluster.
pub trait ClusterApi: Send + Sync {
    /// Creates the object and returns it as stored by the cluster.
    fn create<'a>(
        &'a self,
        key: &'a ResourceKey,
        body: &'a Value,
    ) -> BoxFuture<'a, Result<Value, ClusterError>>;

    fn get<'a>(&'a self, key: &'a ResourceKey)
    -> BoxFuture<'a, Result<Option<Value>, ClusterError>>;

    /// Returns `false` when the object was already gone.
    fn delete<'a>(&'a self, key: &'a ResourceKey) -> BoxFuture<'a, Result<bool, ClusterError>>;
}

/// REST client for the Kubernetes API, configured from a kubeconfig.
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl fmt::Debug for KubeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl KubeClient {
    pub fn from_kubeconfig(config: &Kubeconfig) -> Result<Self, ClusterError> {
        let resolved = config.resolve()?;
        let mut builder = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT);

        if let Some(data) = &resolved.cluster.certificate_authority_data {
            let pem = STANDARD.decode(data.trim())?;
            builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
        } else if let Some(path) = &resolved.cluster.certificate_authority {
            let pem = fs::read(path)?;
            builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
        }
        if resolved.cluster.insecure_skip_tls_verify == Some(true) {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let token = match (&resolved.user.token, &resolved.user.token_file) {
            (Some(token), _) => Some(token.trim().to_string()),
            (None, Some(path)) => Some(fs::read_to_string(path)?.trim().to_string()),
            (None, None) => None,
        };
        let has_identity = match (
            &resolved.user.client_certificate_data,
            &resolved.user.client_key_data,
        ) {
            (Some(cert), Some(key)) => {
                let mut pem = STANDARD.decode(cert.trim())?;
                pem.push(b'\n');
                pem.extend(STANDARD.decode(key.trim())?);
                builder = builder.identity(Identity::from_pem(&pem)?);
                true
            }
            _ => false,
        };
        if token.is_none() && !has_identity {
            return Err(ClusterError::Configuration(
                "kubeconfig user has neither a token nor a client certificate".to_string(),
            ));
        }

        Ok(Self {
            client: builder.build()?,
            base_url: resolved.cluster.server.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn create_object(&self, key: &ResourceKey, body: &Value) -> Result<Value, ClusterError> {
        let resp = self
            .request(Method::POST, &key.collection_path())
            .json(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(key, resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn get_object(&self, key: &ResourceKey) -> Result<Option<Value>, ClusterError> {
        let resp = self.request(Method::GET, &key.object_path()).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(api_error(key, resp).await);
        }
        Ok(Some(resp.json().await?))
    }

    async fn delete_object(&self, key: &ResourceKey) -> Result<bool, ClusterError> {
        let resp = self
            .request(Method::DELETE, &key.object_path())
            .query(&[("propagationPolicy", "Background")])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !resp.status().is_success() {
            return Err(api_error(key, resp).await);
        }
        Ok(true)
    }
}

impl ClusterApi for KubeClient {
    fn create<'a>(
        &'a self,
        key: &'a ResourceKey,
        body: &'a Value,
    ) -> BoxFuture<'a, Result<Value, ClusterError>> {
        Box::pin(self.create_object(key, body))
    }

    fn get<'a>(
        &'a self,
        key: &'a ResourceKey,
    ) -> BoxFuture<'a, Result<Option<Value>, ClusterError>> {
        Box::pin(self.get_object(key))
    }

    fn delete<'a>(&'a self, key: &'a ResourceKey) -> BoxFuture<'a, Result<bool, ClusterError>> {
        Box::pin(self.delete_object(key))
    }
}

#[derive(Deserialize)]
struct StatusBody {
    message: Option<String>,
}

async fn api_error(key: &ResourceKey, resp: Response) -> ClusterError {
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<StatusBody>(&text)
        .ok()
        .and_then(|s| s.message)
        .unwrap_or(text);
    ClusterError::Api {
        status,
        resource: key.to_string(),
        message,
    }
}
