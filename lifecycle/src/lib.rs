//! The `up` and `down` steps of a CI run, and the session file that links
//! them across processes.

mod error;
mod fetch;
mod orchestrator;
mod outputs;
mod session;

pub use error::LifecycleError;
pub use fetch::{ArtifactFetcher, DEFAULT_MAX_ARTIFACT_BYTES, FetchOptions, coverout_url};
pub use orchestrator::{
    DEFAULT_STATE_FILE, DownRequest, LifecycleConfig, Orchestrator, UpOutcome, UpRequest,
    download,
};
pub use outputs::StepOutputs;
pub use session::{SESSION_VERSION, SessionState};
