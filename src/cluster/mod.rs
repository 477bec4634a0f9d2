//! Cluster state access.
//!
//! This module contains everything that talks to the cluster:
//!
//! - `ClusterQuery`: the two read operations the engine needs
//! - `KubectlClient`: `ClusterQuery` implemented by shelling out to `kubectl`
//! - `QueryCache`: single-flight memoization of both operations for one run

mod cache;
mod kubectl;
mod path_finder;

pub use cache::QueryCache;
pub use kubectl::KubectlClient;

use crate::DetectionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// A container of a pod, as declared in the pod spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Container name, unique within its pod.
    pub name: String,
    /// Image reference the container runs.
    pub image: String,
}

/// A pod and the images its containers run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    /// Namespace the pod lives in.
    pub namespace: String,
    /// Pod name, usually `<deployment>-<replicaset hash>-<suffix>`.
    pub name: String,
    /// Containers in declaration order.
    pub containers: Vec<Container>,
}

impl Pod {
    /// `namespace/name`, for messages.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Read-only view of a live cluster.
///
/// Implementations may take arbitrarily long; callers cache results through
/// [`QueryCache`] rather than calling these directly.
#[async_trait]
pub trait ClusterQuery: Send + Sync {
    /// Names of all namespaces, in the order the cluster reports them.
    async fn list_namespaces(&self, cancel: &CancellationToken) -> Result<Vec<String>, DetectionError>;

    /// All pods across all namespaces.
    async fn list_pods(&self, cancel: &CancellationToken) -> Result<Vec<Pod>, DetectionError>;
}
