//! Kubernetes plumbing: typed objects, a dependency graph to declare them
//! into, and a small REST client to apply and destroy them.

mod apply;
mod client;
mod error;
mod graph;
mod kind;
pub mod kubeconfig;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod names;
pub mod resources;

pub use apply::{
    DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT, Journal, WaitOptions, apply_graph, destroy,
    wait_for, with_timeout,
};
pub use client::{BoxFuture, ClusterApi, KubeClient};
pub use error::ClusterError;
pub use graph::{Declared, ResourceGraph};
pub use kind::{ResourceKey, ResourceKind};
pub use kubeconfig::Kubeconfig;
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryCluster;
pub use resources::KubeResource;
