//! Extension tree evaluation.

use crate::cluster::{ClusterQuery, KubectlClient, QueryCache};
use crate::detection::{HttpTagRegistry, TagRegistry};
use crate::tree::{ExtensionNode, NodeKind};
use crate::{DetectOptions, DetectionError, DetectionResult};
use futures::future::{join_all, BoxFuture, FutureExt};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything a detector or version source needs for one run.
///
/// A context owns the run's [`QueryCache`], so every node evaluated against
/// the same context shares one namespace listing and one pod listing.
/// Build a fresh context for each run.
pub struct DetectContext {
    cache: QueryCache,
    registry: Option<Arc<dyn TagRegistry>>,
    cancel: CancellationToken,
}

impl DetectContext {
    /// Context over an arbitrary cluster and optional tag registry.
    ///
    /// Without a registry, digest-pinned images are reported as-is.
    pub fn new(
        cluster: Arc<dyn ClusterQuery>,
        registry: Option<Arc<dyn TagRegistry>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cache: QueryCache::new(cluster),
            registry,
            cancel,
        }
    }

    /// Context backed by `kubectl` and the HTTP tag registry.
    ///
    /// # Example
    ///
    /// ```rust
    /// use kube_ext_discovery::{CancellationToken, DetectContext, DetectOptions};
    ///
    /// let options = DetectOptions {
    ///     skip_tag_resolution: true,
    ///     ..Default::default()
    /// };
    /// let ctx = DetectContext::from_options(&options, CancellationToken::new());
    /// assert!(ctx.registry().is_none());
    /// ```
    pub fn from_options(options: &DetectOptions, cancel: CancellationToken) -> Self {
        let client = KubectlClient::from_options(options);
        debug!(kubectl = %client.program().display(), "using kubectl");

        let registry = if options.skip_tag_resolution {
            None
        } else {
            match HttpTagRegistry::new(options.registry_timeout) {
                Ok(registry) => Some(Arc::new(registry) as Arc<dyn TagRegistry>),
                Err(error) => {
                    warn!(%error, "tag resolution disabled");
                    None
                }
            }
        };

        Self::new(Arc::new(client), registry, cancel)
    }

    /// The run's memoized cluster view.
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Tag registry for digest references, if tag resolution is enabled.
    pub fn registry(&self) -> Option<&dyn TagRegistry> {
        self.registry.as_deref()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl fmt::Debug for DetectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectContext")
            .field("tag_resolution", &self.registry.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// A node that ended up `failed`, identified by its `/`-joined path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub path: String,
    pub error: DetectionError,
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.error)
    }
}

/// Aggregate of all node failures from one evaluation.
///
/// The same errors are also stored in each failed node's result; this type
/// only summarizes them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} extension node(s) failed: {}", .failures.len(), join_failures(.failures))]
pub struct EvaluationError {
    failures: Vec<NodeFailure>,
}

impl EvaluationError {
    /// Failed nodes in tree order.
    pub fn failures(&self) -> &[NodeFailure] {
        &self.failures
    }
}

fn join_failures(failures: &[NodeFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Evaluate an extension tree and fill in every reachable node's result.
///
/// Siblings are evaluated concurrently. A group's children start only once
/// the group itself is detected as present; children of absent or failed
/// groups are left unknown. A failure stays in its own branch and never
/// stops sibling evaluation.
///
/// # Arguments
///
/// * `ctx` - Run context shared by every node; cancelling its token makes
///   every node not yet finished end `failed` with `Cancelled`
/// * `nodes` - Top-level nodes of the tree, updated in place
///
/// # Errors
///
/// Returns an [`EvaluationError`] listing every failed node once all nodes
/// have been evaluated. The tree is fully populated in either case.
///
/// # Example
///
/// ```rust,no_run
/// use kube_ext_discovery::{evaluate, render_text, CancellationToken, DetectContext, DetectOptions, ExtensionKind};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let ctx = DetectContext::from_options(&DetectOptions::default(), CancellationToken::new());
///     let mut tree = ExtensionKind::default_tree();
///
///     if let Err(e) = evaluate(&ctx, &mut tree).await {
///         eprintln!("{e}");
///     }
///     print!("{}", render_text(&tree));
/// }
/// ```
pub async fn evaluate(ctx: &DetectContext, nodes: &mut [ExtensionNode]) -> Result<(), EvaluationError> {
    let failures = evaluate_group(ctx, "", nodes).await;
    if failures.is_empty() {
        Ok(())
    } else {
        Err(EvaluationError { failures })
    }
}

fn evaluate_group<'a>(
    ctx: &'a DetectContext,
    parent: &'a str,
    nodes: &'a mut [ExtensionNode],
) -> BoxFuture<'a, Vec<NodeFailure>> {
    async move {
        let outcomes = join_all(nodes.iter_mut().map(|node| evaluate_node(ctx, parent, node))).await;
        outcomes.into_iter().flatten().collect()
    }
    .boxed()
}

async fn evaluate_node(ctx: &DetectContext, parent: &str, node: &mut ExtensionNode) -> Vec<NodeFailure> {
    let path = if parent.is_empty() {
        node.name.clone()
    } else {
        format!("{parent}/{}", node.name)
    };

    if ctx.cancel_token().is_cancelled() {
        return fail(node, path, DetectionError::Cancelled);
    }

    debug!(%path, "detecting");
    match node.detector.detect(ctx).await {
        Err(error) => fail(node, path, error),
        Ok(false) => {
            debug!(%path, "not installed");
            node.result = DetectionResult::not_found();
            Vec::new()
        }
        Ok(true) => match &mut node.kind {
            NodeKind::Group(children) => {
                info!(%path, "detected");
                node.result = DetectionResult::installed(None);
                evaluate_group(ctx, &path, children).await
            }
            NodeKind::Leaf(source) => match source.resolve(ctx).await {
                Ok(version) => {
                    info!(%path, %version, "detected");
                    node.result = DetectionResult::installed(Some(version));
                    Vec::new()
                }
                Err(error) => fail(node, path, error),
            },
        },
    }
}

fn fail(node: &mut ExtensionNode, path: String, error: DetectionError) -> Vec<NodeFailure> {
    warn!(%path, %error, "detection failed");
    node.result = DetectionResult::failed(error.clone());
    vec![NodeFailure { path, error }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{NamespaceExists, NamespacePrefix, PodImageVersion, PodPrefix};
    use crate::testing::{
        context, digest_image, shared_context, FakeCluster, FakeRegistry, FixedDetector, FixedVersion,
    };
    use crate::{ErrorKind, InstallStatus};
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    fn status(tree: &[ExtensionNode], path: &str) -> InstallStatus {
        tree.iter()
            .find_map(|node| node.find(path))
            .map(|node| node.result().status)
            .unwrap_or_else(|| panic!("no node at {path}"))
    }

    fn mesh() -> ExtensionNode {
        ExtensionNode::group(
            "mesh",
            NamespacePrefix::new("mesh-system"),
            vec![
                ExtensionNode::leaf(
                    "controller",
                    NamespaceExists::new("mesh-system"),
                    PodImageVersion::new("mesh-system", "mesh-controller-"),
                ),
                ExtensionNode::leaf(
                    "gateway",
                    NamespaceExists::new("mesh-system"),
                    PodImageVersion::new("mesh-system", "mesh-gateway-"),
                ),
            ],
        )
    }

    #[tokio::test]
    async fn test_every_reachable_node_is_terminal() {
        let ctx = context(FakeCluster::new());
        let mut tree = vec![
            ExtensionNode::group(
                "a",
                FixedDetector::present(),
                vec![
                    ExtensionNode::leaf("x", FixedDetector::present(), FixedVersion::ok("x:v1")),
                    ExtensionNode::leaf("y", FixedDetector::absent(), FixedVersion::ok("y:v1")),
                    ExtensionNode::group(
                        "z",
                        FixedDetector::present(),
                        vec![ExtensionNode::leaf("w", FixedDetector::present(), FixedVersion::ok("w:v1"))],
                    ),
                ],
            ),
            ExtensionNode::leaf("b", FixedDetector::present(), FixedVersion::ok("b:v2")),
        ];

        evaluate(&ctx, &mut tree).await.unwrap();

        for node in tree.iter().flat_map(|n| n.walk()) {
            assert!(node.result().is_evaluated(), "{} left unknown", node.name());
        }
        assert_eq!(status(&tree, "a"), InstallStatus::Installed);
        assert_eq!(status(&tree, "a/y"), InstallStatus::NotFound);
        let w = tree[0].find("a/z/w").unwrap();
        assert_eq!(w.result().version.as_ref().unwrap().as_str(), "w:v1");
        assert!(tree[0].result().version.is_none());
    }

    #[tokio::test]
    async fn test_absent_parent_skips_descendants() {
        let ctx = context(FakeCluster::new());
        let child_detector = FixedDetector::present();
        let detected = child_detector.counter();
        let version = FixedVersion::ok("c:v1");
        let resolved = version.counter();
        let mut tree = vec![ExtensionNode::group(
            "root",
            FixedDetector::absent(),
            vec![ExtensionNode::leaf("child", child_detector, version)],
        )];

        evaluate(&ctx, &mut tree).await.unwrap();

        assert_eq!(status(&tree, "root"), InstallStatus::NotFound);
        assert_eq!(status(&tree, "root/child"), InstallStatus::Unknown);
        assert_eq!(detected.load(Ordering::SeqCst), 0);
        assert_eq!(resolved.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_detect_is_isolated_to_its_branch() {
        let ctx = context(FakeCluster::new());
        let child_detector = FixedDetector::present();
        let detected = child_detector.counter();
        let mut tree = vec![
            ExtensionNode::group(
                "broken",
                FixedDetector::failing(DetectionError::query_failed("connection refused")),
                vec![ExtensionNode::leaf("child", child_detector, FixedVersion::ok("c:v1"))],
            ),
            ExtensionNode::leaf("healthy", FixedDetector::present(), FixedVersion::ok("h:v1")),
        ];

        let error = evaluate(&ctx, &mut tree).await.unwrap_err();

        assert_eq!(error.failures().len(), 1);
        assert_eq!(error.failures()[0].path, "broken");
        assert_eq!(error.failures()[0].error.kind(), ErrorKind::QueryFailure);
        assert_eq!(status(&tree, "broken"), InstallStatus::Failed);
        assert_eq!(status(&tree, "broken/child"), InstallStatus::Unknown);
        assert_eq!(detected.load(Ordering::SeqCst), 0);
        assert_eq!(status(&tree, "healthy"), InstallStatus::Installed);
    }

    #[tokio::test]
    async fn test_version_failure_marks_leaf_failed() {
        let ctx = context(FakeCluster::new());
        let mut tree = vec![ExtensionNode::leaf(
            "leaf",
            FixedDetector::present(),
            FixedVersion::failing(DetectionError::not_found("no pod")),
        )];

        let error = evaluate(&ctx, &mut tree).await.unwrap_err();

        let result = tree[0].result();
        assert_eq!(result.status, InstallStatus::Failed);
        assert!(result.version.is_none());
        assert_eq!(result.error.as_ref().unwrap().kind(), ErrorKind::NotFound);
        assert_eq!(error.to_string(), "1 extension node(s) failed: leaf: no pod");
    }

    #[tokio::test]
    async fn test_many_leaves_share_one_pod_listing() {
        let fake = Arc::new(
            FakeCluster::new()
                .with_pod("ns-3", "app-3-abc", &[("app", "app:v3")])
                .with_latency(Duration::from_millis(20)),
        );
        let ctx = shared_context(fake.clone());
        let mut tree: Vec<_> = (0..10)
            .map(|i| {
                ExtensionNode::leaf(
                    format!("app-{i}"),
                    PodPrefix::new(format!("ns-{i}"), format!("app-{i}-")),
                    PodImageVersion::new(format!("ns-{i}"), format!("app-{i}-")),
                )
            })
            .collect();

        evaluate(&ctx, &mut tree).await.unwrap();

        assert_eq!(fake.pod_calls(), 1);
        assert_eq!(fake.namespace_calls(), 0);
        assert_eq!(status(&tree, "app-3"), InstallStatus::Installed);
        assert_eq!(status(&tree, "app-4"), InstallStatus::NotFound);
    }

    #[tokio::test]
    async fn test_shared_query_failure_fails_every_dependent_node() {
        let fake = Arc::new(FakeCluster::new().failing_pods(DetectionError::query_failed("Unauthorized")));
        let ctx = shared_context(fake.clone());
        let mut tree = vec![
            ExtensionNode::leaf("a", PodPrefix::new("ns", "a-"), PodImageVersion::new("ns", "a-")),
            ExtensionNode::leaf("b", PodPrefix::new("ns", "b-"), PodImageVersion::new("ns", "b-")),
        ];

        let error = evaluate(&ctx, &mut tree).await.unwrap_err();

        assert_eq!(error.failures().len(), 2);
        assert_eq!(fake.pod_calls(), 1);
        for node in &tree {
            assert_eq!(node.result().error.as_ref().unwrap().kind(), ErrorKind::QueryFailure);
        }
    }

    #[tokio::test]
    async fn test_mesh_without_namespace() {
        let ctx = context(FakeCluster::new().with_namespaces(["default"]));
        let mut tree = vec![mesh()];

        evaluate(&ctx, &mut tree).await.unwrap();

        assert_eq!(status(&tree, "mesh"), InstallStatus::NotFound);
        assert_eq!(status(&tree, "mesh/controller"), InstallStatus::Unknown);
        assert_eq!(status(&tree, "mesh/gateway"), InstallStatus::Unknown);
    }

    #[tokio::test]
    async fn test_mesh_missing_controller_pod() {
        let ctx = context(
            FakeCluster::new()
                .with_namespaces(["default", "mesh-system"])
                .with_pod("mesh-system", "mesh-gateway-7c9-x1", &[("gateway", "mesh/gateway:v1.4.0")]),
        );
        let mut tree = vec![mesh()];

        let error = evaluate(&ctx, &mut tree).await.unwrap_err();

        assert_eq!(status(&tree, "mesh"), InstallStatus::Installed);
        let controller = tree[0].find("mesh/controller").unwrap().result();
        assert_eq!(controller.status, InstallStatus::Failed);
        assert_eq!(controller.error.as_ref().unwrap().kind(), ErrorKind::NotFound);
        let gateway = tree[0].find("mesh/gateway").unwrap().result();
        assert_eq!(gateway.status, InstallStatus::Installed);
        assert_eq!(gateway.version.as_ref().unwrap().as_str(), "mesh/gateway:v1.4.0");
        assert_eq!(error.failures().len(), 1);
        assert_eq!(error.failures()[0].path, "mesh/controller");
    }

    #[tokio::test]
    async fn test_cancelled_run_issues_no_queries() {
        let fake = Arc::new(
            FakeCluster::new()
                .with_namespaces(["mesh-system"])
                .with_pod("mesh-system", "mesh-controller-1", &[("c", "mesh/controller:v1.4.0")]),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = DetectContext::new(fake.clone(), None, cancel);
        let mut tree = vec![
            mesh(),
            ExtensionNode::leaf(
                "tiller",
                PodPrefix::new("kube-system", "tiller-deploy-"),
                PodImageVersion::new("kube-system", "tiller-deploy-"),
            ),
        ];

        let error = evaluate(&ctx, &mut tree).await.unwrap_err();

        assert_eq!(error.failures().len(), 2);
        for node in &tree {
            assert_eq!(node.result().error, Some(DetectionError::Cancelled));
        }
        assert_eq!(status(&tree, "mesh/controller"), InstallStatus::Unknown);
        assert_eq!(fake.namespace_calls(), 0);
        assert_eq!(fake.pod_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_tag_lookup_fails_leaf() {
        let image = digest_image("registry.example/app");
        let cluster = Arc::new(
            FakeCluster::new()
                .with_namespaces(["default"])
                .with_pod("default", "app-5f7c-x1", &[("app", image.as_str())]),
        );
        let registry = Arc::new(FakeRegistry::new().stalled());
        let cancel = CancellationToken::new();
        let ctx = DetectContext::new(cluster, Some(registry as Arc<dyn TagRegistry>), cancel.clone());
        let mut tree = vec![ExtensionNode::leaf(
            "app",
            NamespaceExists::new("default"),
            PodImageVersion::new("default", "app-"),
        )];

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
        let started = Instant::now();
        let error = evaluate(&ctx, &mut tree).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        let result = tree[0].result();
        assert_eq!(result.status, InstallStatus::Failed);
        assert!(result.version.is_none());
        assert_eq!(result.error, Some(DetectionError::Cancelled));
        assert_eq!(error.failures()[0].path, "app");
    }

    #[test]
    fn test_context_debug_hides_internals() {
        let ctx = context(FakeCluster::new());
        let rendered = format!("{ctx:?}");
        assert!(rendered.contains("tag_resolution: false"));
    }
}
