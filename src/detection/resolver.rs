//! Version resolution from running container images.

use super::image::DigestReference;
use super::registry::TagRegistry;
use super::VersionSource;
use crate::cluster::{Container, Pod};
use crate::{DetectContext, DetectionError, ErrorKind, ExtensionVersion};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Tag that is skipped when a digest has a more specific one.
const LATEST_TAG: &str = "latest";

/// Resolve the version of the component running in a pod.
///
/// # Resolution Process
///
/// 1. Find the first pod in `namespace` whose name starts with `pod_prefix`
/// 2. Pick the container: the only one, or the one named `container`
/// 3. Take its image reference
/// 4. If the image is pinned by sha256 digest and a tag registry is
///    configured, rewrite it as `host/repo:tag` using the first tag that is
///    not `latest`
///
/// Step 4 is best-effort. A registry failure is logged and the digest
/// reference is returned unchanged. Cancellation is not a registry failure
/// and is returned as an error.
///
/// # Arguments
///
/// * `ctx` - Detection context providing the pod listing and tag registry
/// * `namespace` - Namespace the pod runs in
/// * `pod_prefix` - Pod name prefix, usually `<deployment>-`
/// * `container` - Container to read, required for multi-container pods
///
/// # Returns
///
/// The container image reference, with a digest rewritten to a tag when
/// the registry knows one.
///
/// # Errors
///
/// - `NotFound` if no pod matches, or `container` names no container
/// - `Ambiguous` if the pod has several containers and `container` is `None`
/// - `Cancelled` if the run is cancelled while listing pods or querying tags
/// - Any error from listing pods
pub async fn resolve_version(
    ctx: &DetectContext,
    namespace: &str,
    pod_prefix: &str,
    container: Option<&str>,
) -> Result<ExtensionVersion, DetectionError> {
    let image = pod_image(ctx, namespace, pod_prefix, container)
        .await
        .map_err(|e| e.context("failed to determine container image"))?;
    version_from_image(ctx, image).await
}

async fn pod_image(
    ctx: &DetectContext,
    namespace: &str,
    pod_prefix: &str,
    container: Option<&str>,
) -> Result<String, DetectionError> {
    let pods = ctx
        .cache()
        .pods(ctx.cancel_token())
        .await
        .map_err(|e| e.context("failed to get pods"))?;
    let pod = pods
        .iter()
        .find(|pod| pod.namespace == namespace && pod.name.starts_with(pod_prefix))
        .ok_or_else(|| {
            DetectionError::not_found(format!("no pod found with \"{namespace}/{pod_prefix}\" prefix"))
        })?;
    select_container(pod, container).map(|c| c.image.clone())
}

fn select_container<'a>(pod: &'a Pod, name: Option<&str>) -> Result<&'a Container, DetectionError> {
    match (pod.containers.as_slice(), name) {
        ([], _) => Err(DetectionError::not_found(format!(
            "pod {} has no containers",
            pod.qualified_name()
        ))),
        ([only], _) => Ok(only),
        (containers, None) => Err(DetectionError::Ambiguous {
            pod: pod.qualified_name(),
            containers: containers.len(),
        }),
        (containers, Some(name)) => containers.iter().find(|c| c.name == name).ok_or_else(|| {
            DetectionError::not_found(format!(
                "could not find container name {name:?} in pod {}",
                pod.qualified_name()
            ))
        }),
    }
}

async fn version_from_image(ctx: &DetectContext, image: String) -> Result<ExtensionVersion, DetectionError> {
    let Some(registry) = ctx.registry() else {
        return Ok(image.into());
    };
    let Some(reference) = DigestReference::parse(&image) else {
        return Ok(image.into());
    };

    match tagged_reference(registry, ctx.cancel_token(), &reference).await {
        Ok(tagged) => {
            debug!(%image, %tagged, "resolved digest to tag");
            Ok(tagged.into())
        }
        Err(error) if error.kind() == ErrorKind::Cancelled => Err(error),
        Err(error) => {
            warn!(%image, %error, "failed to query tags for image, reporting digest");
            Ok(image.into())
        }
    }
}

async fn tagged_reference(
    registry: &dyn TagRegistry,
    cancel: &CancellationToken,
    reference: &DigestReference,
) -> Result<String, DetectionError> {
    let tags = registry.resolve_digest_tags(cancel, reference).await?;
    let tag = select_tag(&tags).ok_or_else(|| {
        DetectionError::registry_failed(format!("no tags found for image {reference}"))
    })?;
    Ok(reference.with_tag(tag))
}

/// First tag that is not `latest`, else the first tag.
fn select_tag(tags: &[String]) -> Option<&str> {
    tags.iter()
        .find(|tag| tag.as_str() != LATEST_TAG)
        .or_else(|| tags.first())
        .map(String::as_str)
}

/// Version taken from the image of a pod's container.
///
/// Pods are matched by name prefix, so a deployment `tiller-deploy` is found
/// through its pods `tiller-deploy-<hash>-<suffix>`.
///
/// # Example
///
/// ```rust
/// use kube_ext_discovery::PodImageVersion;
///
/// let source = PodImageVersion::for_deployment("kube-system", "tiller-deploy").container("tiller");
/// assert_eq!(source.pod_prefix(), "tiller-deploy-");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodImageVersion {
    namespace: String,
    pod_prefix: String,
    container: Option<String>,
}

impl PodImageVersion {
    /// Version from the first pod in `namespace` whose name starts with `pod_prefix`.
    pub fn new(namespace: impl Into<String>, pod_prefix: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod_prefix: pod_prefix.into(),
            container: None,
        }
    }

    /// Version from the pods of a deployment.
    pub fn for_deployment(namespace: impl Into<String>, deployment: &str) -> Self {
        Self::new(namespace, format!("{deployment}-"))
    }

    /// Read the image of the named container. Required for multi-container pods.
    pub fn container(mut self, name: impl Into<String>) -> Self {
        self.container = Some(name.into());
        self
    }

    pub fn pod_prefix(&self) -> &str {
        &self.pod_prefix
    }
}

#[async_trait]
impl VersionSource for PodImageVersion {
    async fn resolve(&self, ctx: &DetectContext) -> Result<ExtensionVersion, DetectionError> {
        resolve_version(ctx, &self.namespace, &self.pod_prefix, self.container.as_deref()).await
    }
}
