use std::{io, path::Path};

use ephemera_cluster::ResourceKey;
use ephemera_environment::EnvironmentOutputs;
use serde::{Deserialize, Serialize};

use crate::LifecycleError;

pub const SESSION_VERSION: u32 = 1;

/// What one `up` left behind for the `down` of a later process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub version: u32,
    /// Created objects, in creation order.
    pub resources: Vec<ResourceKey>,
    /// Absent when `up` failed before the environment was ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<EnvironmentOutputs>,
}

impl SessionState {
    pub fn new(resources: Vec<ResourceKey>, outputs: Option<EnvironmentOutputs>) -> Self {
        Self {
            version: SESSION_VERSION,
            resources,
            outputs,
        }
    }

    pub async fn load(path: &Path) -> Result<Self, LifecycleError> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(LifecycleError::MissingSession {
                    path: path.to_path_buf(),
                });
            }
            Err(err) => return Err(LifecycleError::io(path, err)),
        };
        let state: Self = serde_json::from_slice(&raw)?;
        if state.version != SESSION_VERSION {
            return Err(LifecycleError::Configuration(format!(
                "session state {} has version {}, expected {SESSION_VERSION}",
                path.display(),
                state.version
            )));
        }
        Ok(state)
    }

    /// Writes the state next to its final path first, so a crash never
    /// leaves a truncated file behind.
    pub async fn save(&self, path: &Path) -> Result<(), LifecycleError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| LifecycleError::io(parent, err))?;
        }
        let raw = serde_json::to_vec_pretty(self)?;
        let mut staging = path.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = Path::new(&staging);
        tokio::fs::write(staging, raw)
            .await
            .map_err(|err| LifecycleError::io(staging, err))?;
        tokio::fs::rename(staging, path)
            .await
            .map_err(|err| LifecycleError::io(path, err))
    }

    pub async fn remove(path: &Path) -> Result<(), LifecycleError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(LifecycleError::io(path, err)),
        }
    }
}
