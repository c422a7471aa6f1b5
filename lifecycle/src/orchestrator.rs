use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use ephemera_cluster::{
    ClusterApi, Journal, Kubeconfig, ResourceGraph, WaitOptions, apply_graph, destroy,
    with_timeout,
};
use ephemera_coverage::{CoverageToolchain, DecodeReport};
use ephemera_environment::{DeployOptions, EnvironmentHandles, EnvironmentOutputs, declare_environment};
use ephemera_provisioner::{AccessScope, AccessScopeRequest, declare_access_scope, resolve_api_endpoint};
use url::Url;

use crate::{ArtifactFetcher, FetchOptions, LifecycleError, SessionState, StepOutputs, coverout_url};

pub const DEFAULT_STATE_FILE: &str = "/github/workspace/ephemera.json";

#[derive(Clone, Debug)]
pub struct LifecycleConfig {
    pub state_file: PathBuf,
    pub wait: WaitOptions,
    pub fetch: FetchOptions,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            wait: WaitOptions::default(),
            fetch: FetchOptions::default(),
        }
    }
}

/// Everything `up` needs to know about the environment to create.
#[derive(Clone, Debug, Default, bon::Builder)]
pub struct UpRequest {
    /// Existing namespace to deploy into. Absent creates a fresh one.
    #[builder(into)]
    pub namespace: Option<String>,
    /// Overrides the server of the kubeconfig in the credential document.
    #[builder(into)]
    pub api_endpoint: Option<String>,
    #[builder(into)]
    pub tag: Option<String>,
    #[builder(into)]
    pub storage_class: Option<String>,
    #[builder(into)]
    pub storage_size: Option<String>,
    #[builder(default)]
    pub access_modes: Vec<String>,
    #[builder(into)]
    pub registry: Option<String>,
    #[builder(into)]
    pub image: Option<String>,
    #[builder(into)]
    pub chain_claim: Option<String>,
    #[builder(default)]
    pub harden: bool,
}

impl UpRequest {
    fn deploy_options(&self, namespace: &str) -> DeployOptions {
        DeployOptions {
            namespace: namespace.to_string(),
            tag: self.tag.clone(),
            storage_class: self.storage_class.clone(),
            storage_size: self.storage_size.clone(),
            access_modes: self.access_modes.clone(),
            registry: self.registry.clone(),
            image: self.image.clone(),
            chain_claim: self.chain_claim.clone(),
            harden: self.harden,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpOutcome {
    pub outputs: EnvironmentOutputs,
    /// Kubeconfig scoped to the environment namespace.
    pub kubeconfig: String,
}

#[derive(Clone, Debug, Default)]
pub struct DownRequest {
    /// Address of a cluster node, without port. Required with `coverfile`.
    pub url: Option<String>,
    /// Where to write the text coverage report. No coverage is collected
    /// when absent.
    pub coverfile: Option<PathBuf>,
}

/// Drives one step of the environment lifecycle. Each step runs in its own
/// process; the session file is the only thing carried between them.
pub struct Orchestrator {
    api: Arc<dyn ClusterApi>,
    toolchain: Arc<dyn CoverageToolchain>,
    outputs: StepOutputs,
    kubeconfig: Option<Kubeconfig>,
    config: LifecycleConfig,
}

impl Orchestrator {
    pub fn new(
        api: Arc<dyn ClusterApi>,
        toolchain: Arc<dyn CoverageToolchain>,
        outputs: StepOutputs,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            api,
            toolchain,
            outputs,
            kubeconfig: None,
            config,
        }
    }

    /// The kubeconfig `api` was built from, used to infer the endpoint
    /// written into the credential document.
    pub fn with_kubeconfig(mut self, kubeconfig: Kubeconfig) -> Self {
        self.kubeconfig = Some(kubeconfig);
        self
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Creates the access scope and the environment, records them in the
    /// session file and emits the step outputs.
    ///
    /// When apply fails midway the objects created so far are still recorded
    /// so a later `down` removes them.
    pub async fn up(&self, request: &UpRequest) -> Result<UpOutcome, LifecycleError> {
        let state_file = &self.config.state_file;
        if tokio::fs::try_exists(state_file)
            .await
            .map_err(|err| LifecycleError::io(state_file, err))?
        {
            return Err(LifecycleError::Configuration(format!(
                "session state already exists at {}, run `down` first",
                state_file.display()
            )));
        }

        let api_endpoint =
            resolve_api_endpoint(request.api_endpoint.as_deref(), self.kubeconfig.as_ref())?;
        let mut graph = ResourceGraph::new();
        let scope = declare_access_scope(
            &mut graph,
            &AccessScopeRequest {
                namespace: request.namespace.clone(),
                api_endpoint,
                harden: request.harden,
            },
        )?;
        let options = request.deploy_options(scope.namespace()).resolve()?;
        let handles = declare_environment(&mut graph, &options, scope.namespace_dependency())?;
        tracing::info!(
            namespace = scope.namespace(),
            created = scope.created_namespace(),
            resources = graph.len(),
            "bringing environment up"
        );

        let mut journal = Journal::new();
        let outcome = match self.apply(&graph, &scope, &handles, &mut journal).await {
            Ok(outcome) => outcome,
            Err(err) => {
                if !journal.created().is_empty() {
                    let partial = SessionState::new(journal.created().to_vec(), None);
                    if let Err(save) = partial.save(state_file).await {
                        tracing::error!(error = %save, "failed to record partially applied resources");
                    }
                }
                return Err(err);
            }
        };

        SessionState::new(journal.created().to_vec(), Some(outcome.outputs.clone()))
            .save(state_file)
            .await?;
        self.outputs.emit("namespace", &outcome.outputs.namespace)?;
        self.outputs.emit("port", &outcome.outputs.port.to_string())?;
        self.outputs.emit("claim-name", &outcome.outputs.claim_name)?;
        self.outputs.emit("kubeconfig", &outcome.kubeconfig)?;
        tracing::info!(
            namespace = %outcome.outputs.namespace,
            port = outcome.outputs.port,
            "environment is up"
        );
        Ok(outcome)
    }

    async fn apply(
        &self,
        graph: &ResourceGraph,
        scope: &AccessScope,
        handles: &EnvironmentHandles,
        journal: &mut Journal,
    ) -> Result<UpOutcome, LifecycleError> {
        let wait = self.config.wait;
        with_timeout(
            "applying resources",
            wait.timeout,
            apply_graph(&*self.api, graph, journal),
        )
        .await?;
        let kubeconfig = scope.credential(&*self.api, wait).await?;
        let outputs = handles.outputs(&*self.api, journal, wait).await?;
        Ok(UpOutcome {
            outputs,
            kubeconfig,
        })
    }

    /// Collects coverage when asked to, then destroys everything the session
    /// recorded and deletes the session file.
    ///
    /// Destroy runs even when collection failed; the collection error is
    /// returned afterwards.
    pub async fn down(&self, request: &DownRequest) -> Result<(), LifecycleError> {
        let state_file = &self.config.state_file;
        let state = SessionState::load(state_file).await?;

        let collected = match &request.coverfile {
            Some(coverfile) => {
                let Some(base) = request.url.as_deref().filter(|u| !u.trim().is_empty()) else {
                    return Err(LifecycleError::Configuration(
                        "a url is required to collect coverage".to_string(),
                    ));
                };
                self.collect(&state, base, coverfile).await
            }
            None => Ok(()),
        };
        if let Err(err) = &collected {
            tracing::warn!(error = %err, "coverage collection failed, destroying anyway");
        }

        tracing::info!(resources = state.resources.len(), "tearing environment down");
        if let Err(err) = destroy(&*self.api, &state.resources, self.config.wait).await {
            if let Err(collect) = &collected {
                tracing::error!(error = %collect, "coverage collection failed");
            }
            return Err(err.into());
        }
        SessionState::remove(state_file).await?;
        tracing::info!("environment is down");
        collected
    }

    async fn collect(
        &self,
        state: &SessionState,
        base: &str,
        coverfile: &Path,
    ) -> Result<(), LifecycleError> {
        let outputs = state.outputs.as_ref().ok_or_else(|| {
            LifecycleError::Configuration(
                "the session never finished `up`, there is no collector to fetch from".to_string(),
            )
        })?;
        let url = coverout_url(base, Some(outputs.port))?;
        let scratch = tempfile::tempdir().map_err(|err| LifecycleError::io(std::env::temp_dir(), err))?;
        ArtifactFetcher::new(&self.config.fetch)?
            .fetch_into(&url, scratch.path())
            .await?;
        self.toolchain.report(scratch.path(), coverfile).await?;
        tracing::info!(coverfile = %coverfile.display(), "wrote coverage report");
        Ok(())
    }
}

/// Fetches merged coverage from a collector at `server` into `directory`
/// and emits `directory` as a step output.
pub async fn download(
    server: &str,
    directory: &Path,
    fetch: &FetchOptions,
    outputs: &StepOutputs,
) -> Result<DecodeReport, LifecycleError> {
    let url: Url = coverout_url(server, None)?;
    tokio::fs::create_dir_all(directory)
        .await
        .map_err(|err| LifecycleError::io(directory, err))?;
    let report = ArtifactFetcher::new(fetch)?
        .fetch_into(&url, directory)
        .await?;
    outputs.emit("directory", &directory.to_string_lossy())?;
    tracing::info!(
        directory = %directory.display(),
        files = report.files.len(),
        "downloaded coverage"
    );
    Ok(report)
}
