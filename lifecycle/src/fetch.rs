use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use ephemera_coverage::{COVEROUT_PATH, CoveroutResponse, DecodeReport, Decoder, ErrorResponse};
use futures::StreamExt;
use url::Url;

use crate::LifecycleError;

pub const DEFAULT_MAX_ARTIFACT_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct FetchOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Bound on both the response body and the decoded archive.
    pub max_bytes: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(300),
            max_bytes: DEFAULT_MAX_ARTIFACT_BYTES,
        }
    }
}

/// The collection endpoint of a collector reachable at `base`. `port`
/// replaces whatever port `base` carries.
pub fn coverout_url(base: &str, port: Option<u16>) -> Result<Url, LifecycleError> {
    let invalid = |reason: &str| LifecycleError::Configuration(format!("invalid url {base:?}: {reason}"));
    let mut url = Url::parse(base.trim()).map_err(|err| invalid(&err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("expected an http or https url"));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    if let Some(port) = port {
        url.set_port(Some(port))
            .map_err(|()| invalid("cannot carry a port"))?;
    }
    url.set_path(COVEROUT_PATH);
    url.set_query(None);
    Ok(url)
}

/// Downloads merged coverage from a collector and unpacks it locally.
#[derive(Clone, Debug)]
pub struct ArtifactFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl ArtifactFetcher {
    pub fn new(options: &FetchOptions) -> Result<Self, LifecycleError> {
        let client = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .build()
            .map_err(|err| LifecycleError::Configuration(format!("http client: {err}")))?;
        Ok(Self {
            client,
            max_bytes: options.max_bytes,
        })
    }

    /// Returns the encoded archive served at `url`.
    pub async fn fetch(&self, url: &Url) -> Result<String, LifecycleError> {
        let transport = |message: String| LifecycleError::Transport {
            url: url.to_string(),
            message,
        };
        tracing::info!(%url, "fetching coverage");
        let res = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| transport(err.to_string()))?;
        let status = res.status();

        if let Some(length) = res.content_length()
            && length > self.max_bytes
        {
            return Err(transport(format!(
                "response of {length} bytes exceeds the {} byte limit",
                self.max_bytes
            )));
        }
        let mut body = Vec::new();
        let mut stream = res.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| transport(err.to_string()))?;
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(transport(format!(
                    "response exceeds the {} byte limit",
                    self.max_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorResponse>(&body)
                .map(|err| err.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).trim().to_string());
            return Err(transport(format!("server answered {status}: {message}")));
        }
        let response: CoveroutResponse = serde_json::from_slice(&body)
            .map_err(|err| transport(format!("malformed response: {err}")))?;
        Ok(response.merged)
    }

    /// Fetches from `url` and decodes into `dest`, bounded by the same limit
    /// as the download.
    pub async fn fetch_into(&self, url: &Url, dest: &Path) -> Result<DecodeReport, LifecycleError> {
        let payload = self.fetch(url).await?;
        decode_blocking(payload, dest.to_path_buf(), self.max_bytes).await
    }
}

async fn decode_blocking(
    payload: String,
    dest: PathBuf,
    max_bytes: u64,
) -> Result<DecodeReport, LifecycleError> {
    let report = tokio::task::spawn_blocking(move || {
        Decoder::with_max_size(max_bytes).decode(&payload, &dest)
    })
    .await
    .map_err(|err| LifecycleError::io("<decode task>", std::io::Error::other(err)))??;
    tracing::debug!(files = report.files.len(), bytes = report.bytes_written, "decoded coverage");
    Ok(report)
}
