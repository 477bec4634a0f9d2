//! In-memory fakes for unit tests.

use crate::cluster::{ClusterQuery, Container, Pod};
use crate::detection::{DigestReference, Detector, TagRegistry, VersionSource};
use crate::{DetectContext, DetectionError, ExtensionVersion};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Cluster with a fixed set of namespaces and pods that counts its queries.
#[derive(Debug, Default)]
pub(crate) struct FakeCluster {
    namespaces: Vec<String>,
    pods: Vec<Pod>,
    namespace_error: Option<DetectionError>,
    pod_error: Option<DetectionError>,
    latency: Option<Duration>,
    namespace_calls: AtomicUsize,
    pod_calls: AtomicUsize,
}

impl FakeCluster {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces.extend(namespaces.into_iter().map(Into::into));
        self
    }

    pub(crate) fn with_pod(mut self, namespace: &str, name: &str, containers: &[(&str, &str)]) -> Self {
        self.pods.push(Pod {
            namespace: namespace.to_string(),
            name: name.to_string(),
            containers: containers
                .iter()
                .map(|(name, image)| Container {
                    name: name.to_string(),
                    image: image.to_string(),
                })
                .collect(),
        });
        self
    }

    pub(crate) fn failing_namespaces(mut self, error: DetectionError) -> Self {
        self.namespace_error = Some(error);
        self
    }

    pub(crate) fn failing_pods(mut self, error: DetectionError) -> Self {
        self.pod_error = Some(error);
        self
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub(crate) fn namespace_calls(&self) -> usize {
        self.namespace_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn pod_calls(&self) -> usize {
        self.pod_calls.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ClusterQuery for FakeCluster {
    async fn list_namespaces(&self, _cancel: &CancellationToken) -> Result<Vec<String>, DetectionError> {
        self.namespace_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        match &self.namespace_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.namespaces.clone()),
        }
    }

    async fn list_pods(&self, _cancel: &CancellationToken) -> Result<Vec<Pod>, DetectionError> {
        self.pod_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        match &self.pod_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.pods.clone()),
        }
    }
}

/// Registry answering from a fixed `image -> tags` table.
///
/// Images missing from the table fail with `RegistryFailed`.
#[derive(Debug, Default)]
pub(crate) struct FakeRegistry {
    tags: HashMap<String, Vec<String>>,
    stalled: bool,
    calls: AtomicUsize,
}

impl FakeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_tags(mut self, image: &str, tags: &[&str]) -> Self {
        self.tags
            .insert(image.to_string(), tags.iter().map(|t| t.to_string()).collect());
        self
    }

    /// Each lookup stalls for five seconds unless cancelled first.
    pub(crate) fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TagRegistry for FakeRegistry {
    async fn resolve_digest_tags(
        &self,
        cancel: &CancellationToken,
        reference: &DigestReference,
    ) -> Result<Vec<String>, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stalled {
            tokio::select! {
                _ = cancel.cancelled() => return Err(DetectionError::Cancelled),
                _ = tokio::time::sleep(Duration::from_secs(5)) => {}
            }
        }
        self.tags
            .get(&reference.to_string())
            .cloned()
            .ok_or_else(|| DetectionError::registry_failed("503 Service Unavailable"))
    }
}

/// Detector with a fixed outcome that counts how often it ran.
#[derive(Debug)]
pub(crate) struct FixedDetector {
    outcome: Result<bool, DetectionError>,
    calls: Arc<AtomicUsize>,
}

impl FixedDetector {
    pub(crate) fn present() -> Self {
        Self::with_outcome(Ok(true))
    }

    pub(crate) fn absent() -> Self {
        Self::with_outcome(Ok(false))
    }

    pub(crate) fn failing(error: DetectionError) -> Self {
        Self::with_outcome(Err(error))
    }

    fn with_outcome(outcome: Result<bool, DetectionError>) -> Self {
        Self {
            outcome,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Detector for FixedDetector {
    async fn detect(&self, _ctx: &DetectContext) -> Result<bool, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Version source with a fixed outcome that counts how often it ran.
#[derive(Debug)]
pub(crate) struct FixedVersion {
    outcome: Result<ExtensionVersion, DetectionError>,
    calls: Arc<AtomicUsize>,
}

impl FixedVersion {
    pub(crate) fn ok(version: &str) -> Self {
        Self {
            outcome: Ok(ExtensionVersion::new(version)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn failing(error: DetectionError) -> Self {
        Self {
            outcome: Err(error),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl VersionSource for FixedVersion {
    async fn resolve(&self, _ctx: &DetectContext) -> Result<ExtensionVersion, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

pub(crate) fn context(cluster: FakeCluster) -> DetectContext {
    shared_context(Arc::new(cluster))
}

pub(crate) fn shared_context(cluster: Arc<FakeCluster>) -> DetectContext {
    DetectContext::new(cluster, None, CancellationToken::new())
}

pub(crate) fn context_with_registry(cluster: Arc<FakeCluster>, registry: Arc<FakeRegistry>) -> DetectContext {
    DetectContext::new(cluster, Some(registry as Arc<dyn TagRegistry>), CancellationToken::new())
}

/// `<repository>@sha256:<64 hex>`.
pub(crate) fn digest_image(repository: &str) -> String {
    format!("{repository}@sha256:{}", "0123456789abcdef".repeat(4))
}
