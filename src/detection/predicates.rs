//! Presence checks over cached cluster state.

use super::Detector;
use crate::{DetectContext, DetectionError};
use async_trait::async_trait;

/// Check if a namespace named exactly `namespace` exists.
///
/// # Arguments
///
/// * `ctx` - Run context; the namespace listing comes from its cache
/// * `namespace` - Full namespace name, compared case-sensitively
///
/// # Returns
///
/// `Ok(true)` on an exact match, `Ok(false)` otherwise.
///
/// # Errors
///
/// Any error from the namespace listing, with the namespace name attached
/// as context. `Cancelled` is passed through the same way.
pub async fn has_namespace(ctx: &DetectContext, namespace: &str) -> Result<bool, DetectionError> {
    let namespaces = ctx
        .cache()
        .namespaces(ctx.cancel_token())
        .await
        .map_err(|e| e.context(format!("namespace {namespace:?}")))?;
    Ok(namespaces.iter().any(|ns| ns == namespace))
}

/// Check if any namespace name starts with `prefix`.
pub async fn has_namespace_with_prefix(ctx: &DetectContext, prefix: &str) -> Result<bool, DetectionError> {
    let namespaces = ctx
        .cache()
        .namespaces(ctx.cancel_token())
        .await
        .map_err(|e| e.context(format!("namespace prefix {prefix:?}")))?;
    Ok(namespaces.iter().any(|ns| ns.starts_with(prefix)))
}

/// Check if any pod in `namespace` has a name starting with `pod_prefix`.
///
/// # Arguments
///
/// * `ctx` - Run context; the pod listing comes from its cache
/// * `namespace` - Namespace the pod must run in
/// * `pod_prefix` - Leading part of the pod name, usually the deployment
///   name followed by `-`
///
/// # Errors
///
/// Any error from the pod listing, with `namespace/pod_prefix` attached.
pub async fn has_pod_with_prefix(
    ctx: &DetectContext,
    namespace: &str,
    pod_prefix: &str,
) -> Result<bool, DetectionError> {
    let pods = ctx
        .cache()
        .pods(ctx.cancel_token())
        .await
        .map_err(|e| e.context(format!("pod prefix \"{namespace}/{pod_prefix}\"")))?;
    Ok(pods
        .iter()
        .any(|pod| pod.namespace == namespace && pod.name.starts_with(pod_prefix)))
}

/// Present if a namespace with this exact name exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceExists {
    namespace: String,
}

impl NamespaceExists {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl Detector for NamespaceExists {
    async fn detect(&self, ctx: &DetectContext) -> Result<bool, DetectionError> {
        has_namespace(ctx, &self.namespace).await
    }
}

/// Present if any namespace name starts with the prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePrefix {
    prefix: String,
}

impl NamespacePrefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl Detector for NamespacePrefix {
    async fn detect(&self, ctx: &DetectContext) -> Result<bool, DetectionError> {
        has_namespace_with_prefix(ctx, &self.prefix).await
    }
}

/// Present if a pod whose name starts with the prefix runs in the namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodPrefix {
    namespace: String,
    pod_prefix: String,
}

impl PodPrefix {
    pub fn new(namespace: impl Into<String>, pod_prefix: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod_prefix: pod_prefix.into(),
        }
    }
}

#[async_trait]
impl Detector for PodPrefix {
    async fn detect(&self, ctx: &DetectContext) -> Result<bool, DetectionError> {
        has_pod_with_prefix(ctx, &self.namespace, &self.pod_prefix).await
    }
}
