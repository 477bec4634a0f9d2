//! Catalog of known cluster extensions.

use crate::detection::{NamespaceExists, NamespacePrefix, PodImageVersion, PodPrefix};
use crate::ExtensionNode;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

const ISTIO_NAMESPACE: &str = "istio-system";
const HELM_NAMESPACE: &str = "kube-system";

/// An extension this tool knows how to detect.
///
/// Each kind builds its own subtree of [`ExtensionNode`]s; evaluate the
/// subtree to find out whether and in which version the extension runs.
///
/// # Example
///
/// ```rust
/// use kube_ext_discovery::ExtensionKind;
///
/// for kind in ExtensionKind::all() {
///     println!("{}: {}", kind.name(), kind.display_name());
/// }
///
/// let kind: ExtensionKind = "helm-tiller".parse().unwrap();
/// assert_eq!(kind, ExtensionKind::HelmTiller);
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumIter,
    strum::EnumString,
    strum::Display,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum ExtensionKind {
    /// Istio service mesh control plane
    Istio,
    /// Knative serving, build and eventing
    Knative,
    /// Helm v2 server-side component
    HelmTiller,
}

impl ExtensionKind {
    /// Name of the root node, as printed in reports and accepted on the
    /// command line.
    ///
    /// ```rust
    /// use kube_ext_discovery::ExtensionKind;
    ///
    /// assert_eq!(ExtensionKind::HelmTiller.name(), "helm-tiller");
    /// ```
    pub fn name(&self) -> &'static str {
        match self {
            Self::Istio => "istio",
            Self::Knative => "knative",
            Self::HelmTiller => "helm-tiller",
        }
    }

    /// Human-readable display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Istio => "Istio",
            Self::Knative => "Knative",
            Self::HelmTiller => "Helm Tiller",
        }
    }

    /// Iterator over all known extension kinds.
    pub fn all() -> impl Iterator<Item = Self> {
        <Self as IntoEnumIterator>::iter()
    }

    /// Build the detection subtree for this extension.
    pub fn node(&self) -> ExtensionNode {
        match self {
            Self::Istio => ExtensionNode::group(
                self.name(),
                NamespacePrefix::new(ISTIO_NAMESPACE),
                vec![
                    istio_component("pilot", "istio-pilot", Some("discovery")),
                    istio_component("sidecar-injector", "istio-sidecar-injector", None),
                    istio_component("policy", "istio-policy", Some("mixer")),
                    istio_component("prometheus", "prometheus", Some("prometheus")),
                ],
            ),
            Self::Knative => ExtensionNode::group(
                self.name(),
                NamespacePrefix::new("knative-"),
                vec![
                    knative_component("serving", "knative-serving", "controller"),
                    knative_component("build", "knative-build", "build-controller"),
                    knative_component("eventing", "knative-eventing", "eventing-controller"),
                ],
            ),
            Self::HelmTiller => ExtensionNode::leaf(
                self.name(),
                PodPrefix::new(HELM_NAMESPACE, "tiller-deploy-"),
                PodImageVersion::for_deployment(HELM_NAMESPACE, "tiller-deploy").container("tiller"),
            ),
        }
    }

    /// Subtrees for every known extension, in catalog order.
    pub fn default_tree() -> Vec<ExtensionNode> {
        Self::all().map(|kind| kind.node()).collect()
    }
}

/// Istio components are detected by their deployment's pods.
fn istio_component(name: &str, deployment: &str, container: Option<&str>) -> ExtensionNode {
    let mut version = PodImageVersion::for_deployment(ISTIO_NAMESPACE, deployment);
    if let Some(container) = container {
        version = version.container(container);
    }
    ExtensionNode::leaf(
        name,
        PodPrefix::new(ISTIO_NAMESPACE, format!("{deployment}-")),
        version,
    )
}

/// Knative components each live in their own namespace.
fn knative_component(name: &str, namespace: &str, deployment: &str) -> ExtensionNode {
    ExtensionNode::leaf(
        name,
        NamespaceExists::new(namespace),
        PodImageVersion::for_deployment(namespace, deployment),
    )
}
