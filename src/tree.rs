//! Extension tree model.

use crate::detection::{Detector, VersionSource};
use crate::DetectionResult;
use std::sync::Arc;

/// What sits below a node: a version source (leaf) or child nodes (group).
#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Leaf(Arc<dyn VersionSource>),
    Group(Vec<ExtensionNode>),
}

/// One component in the extension tree.
///
/// A node is either a **leaf**, which resolves a version once detected, or a
/// **group**, whose children are evaluated once the group itself is
/// detected. Groups never resolve a version of their own.
///
/// The `result` slot starts out unknown and is filled in by
/// [`evaluate`](crate::evaluate).
///
/// # Example
///
/// ```rust
/// use kube_ext_discovery::{ExtensionNode, NamespacePrefix, PodImageVersion, PodPrefix};
///
/// let mesh = ExtensionNode::group(
///     "mesh",
///     NamespacePrefix::new("mesh-system"),
///     vec![ExtensionNode::leaf(
///         "controller",
///         PodPrefix::new("mesh-system", "mesh-controller-"),
///         PodImageVersion::new("mesh-system", "mesh-controller-"),
///     )],
/// );
/// assert!(!mesh.is_leaf());
/// assert_eq!(mesh.children().len(), 1);
/// assert!(!mesh.result().is_evaluated());
/// ```
#[derive(Debug, Clone)]
pub struct ExtensionNode {
    pub(crate) name: String,
    pub(crate) detector: Arc<dyn Detector>,
    pub(crate) kind: NodeKind,
    pub(crate) result: DetectionResult,
}

impl ExtensionNode {
    /// A component whose version is resolved once it is detected.
    pub fn leaf(
        name: impl Into<String>,
        detector: impl Detector + 'static,
        version: impl VersionSource + 'static,
    ) -> Self {
        Self::from_parts(name, Arc::new(detector), NodeKind::Leaf(Arc::new(version)))
    }

    /// A component made of sub-components.
    ///
    /// `children` must not be empty: a node is a leaf exactly when it has no
    /// children. Debug builds panic on an empty group; use
    /// [`ExtensionNode::leaf`] for a component without parts.
    pub fn group(
        name: impl Into<String>,
        detector: impl Detector + 'static,
        children: Vec<ExtensionNode>,
    ) -> Self {
        Self::from_parts(name, Arc::new(detector), NodeKind::Group(children))
    }

    /// Leaf built from shared strategy objects.
    pub fn shared_leaf(
        name: impl Into<String>,
        detector: Arc<dyn Detector>,
        version: Arc<dyn VersionSource>,
    ) -> Self {
        Self::from_parts(name, detector, NodeKind::Leaf(version))
    }

    /// Group built from a shared detector.
    pub fn shared_group(
        name: impl Into<String>,
        detector: Arc<dyn Detector>,
        children: Vec<ExtensionNode>,
    ) -> Self {
        Self::from_parts(name, detector, NodeKind::Group(children))
    }

    fn from_parts(name: impl Into<String>, detector: Arc<dyn Detector>, kind: NodeKind) -> Self {
        let name = name.into();
        if let NodeKind::Group(children) = &kind {
            debug_assert!(!children.is_empty(), "group `{name}` has no children");
        }
        Self {
            name,
            detector,
            kind,
            result: DetectionResult::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if this node resolves a version rather than holding children.
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// Child nodes in declaration order. Empty for leaves.
    pub fn children(&self) -> &[ExtensionNode] {
        match &self.kind {
            NodeKind::Group(children) => children,
            NodeKind::Leaf(_) => &[],
        }
    }

    /// The evaluation result. Unknown until evaluated.
    pub fn result(&self) -> &DetectionResult {
        &self.result
    }

    /// Depth-first search for a descendant (or this node) by `/`-separated path.
    ///
    /// ```rust
    /// use kube_ext_discovery::ExtensionKind;
    ///
    /// let istio = ExtensionKind::Istio.node();
    /// assert!(istio.find("istio/pilot").is_some());
    /// assert!(istio.find("istio/gateway").is_none());
    /// ```
    pub fn find(&self, path: &str) -> Option<&ExtensionNode> {
        let (head, rest) = match path.split_once('/') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        if head != self.name {
            return None;
        }
        match rest {
            None => Some(self),
            Some(rest) => self.children().iter().find_map(|child| child.find(rest)),
        }
    }

    /// This node and all descendants, parents before children.
    pub fn walk(&self) -> Vec<&ExtensionNode> {
        let mut nodes = vec![self];
        for child in self.children() {
            nodes.extend(child.walk());
        }
        nodes
    }
}
