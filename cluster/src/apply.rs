use std::{collections::HashMap, future::Future, time::Duration};

use serde_json::Value;

use crate::{ClusterApi, ClusterError, ResourceGraph, ResourceKey, ResourceKind};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What an apply has created so far, in creation order, with the objects as
/// the cluster returned them.
#[derive(Clone, Debug, Default)]
pub struct Journal {
    created: Vec<ResourceKey>,
    objects: HashMap<ResourceKey, Value>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> &[ResourceKey] {
        &self.created
    }

    pub fn object(&self, key: &ResourceKey) -> Option<&Value> {
        self.objects.get(key)
    }

    fn record(&mut self, key: ResourceKey, object: Value) {
        self.created.push(key.clone());
        self.objects.insert(key, object);
    }
}

/// Creates every object of `graph` in dependency order.
///
/// Stops at the first failure. Whatever was created before it stays in
/// `journal` so it can still be destroyed.
pub async fn apply_graph(
    api: &dyn ClusterApi,
    graph: &ResourceGraph,
    journal: &mut Journal,
) -> Result<(), ClusterError> {
    for declared in graph.topo_order()? {
        tracing::debug!(resource = %declared.key, "creating resource");
        let object = api.create(&declared.key, &declared.body).await?;
        journal.record(declared.key.clone(), object);
    }
    tracing::info!(count = graph.len(), "applied resources");
    Ok(())
}

pub async fn with_timeout<T, F>(what: &str, timeout: Duration, fut: F) -> Result<T, ClusterError>
where
    F: Future<Output = Result<T, ClusterError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| ClusterError::Timeout {
            what: what.to_string(),
            after: timeout,
        })?
}

/// Polls `key` until `ready` extracts a value from it.
pub async fn wait_for<T, F>(
    api: &dyn ClusterApi,
    key: &ResourceKey,
    wait: WaitOptions,
    mut ready: F,
) -> Result<T, ClusterError>
where
    F: FnMut(&Value) -> Option<T>,
{
    let what = format!("waiting for {key}");
    with_timeout(&what, wait.timeout, async {
        loop {
            if let Some(object) = api.get(key).await?
                && let Some(value) = ready(&object)
            {
                return Ok::<_, ClusterError>(value);
            }
            tokio::time::sleep(wait.poll_interval).await;
        }
    })
    .await
}

/// Deletes `created` in reverse creation order, then waits for every deleted
/// namespace to disappear. Objects that are already gone are skipped.
///
/// The whole teardown, deletes included, is bounded by `wait.timeout`.
pub async fn destroy(
    api: &dyn ClusterApi,
    created: &[ResourceKey],
    wait: WaitOptions,
) -> Result<(), ClusterError> {
    with_timeout("destroying resources", wait.timeout, async {
        let mut namespaces = Vec::new();
        for key in created.iter().rev() {
            let deleted = api.delete(key).await?;
            tracing::debug!(resource = %key, deleted, "deleting resource");
            if key.kind == ResourceKind::Namespace {
                namespaces.push(key);
            }
        }
        for key in namespaces {
            tracing::debug!(resource = %key, "waiting for namespace deletion");
            while api.get(key).await?.is_some() {
                tokio::time::sleep(wait.poll_interval).await;
            }
        }
        Ok::<_, ClusterError>(())
    })
    .await?;
    tracing::info!(count = created.len(), "destroyed resources");
    Ok(())
}
