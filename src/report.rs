//! Rendering of evaluated extension trees.

use crate::{ExtensionNode, ExtensionVersion, InstallStatus};
use serde::Serialize;

/// Indentation added per tree level in text output.
const INDENT: &str = "  ";

/// Render a tree as an indented list, one node per line.
///
/// Leaves show their version or status. Installed groups show only their
/// name, with their children listed beneath them; groups that are not
/// installed show their status and hide their children.
///
/// # Example
///
/// ```rust
/// use kube_ext_discovery::{render_text, ExtensionKind};
///
/// let tree = ExtensionKind::default_tree();
/// assert_eq!(render_text(&tree), "- istio: ???\n- knative: ???\n- helm-tiller: ???\n");
/// ```
pub fn render_text(nodes: &[ExtensionNode]) -> String {
    let mut out = String::new();
    write_nodes(&mut out, "", nodes);
    out
}

fn write_nodes(out: &mut String, indent: &str, nodes: &[ExtensionNode]) {
    for node in nodes {
        let result = node.result();
        let installed_group = !node.is_leaf() && result.is_installed();

        let line = if installed_group {
            format!("{indent}- {}:\n", node.name())
        } else {
            format!("{indent}- {}: {}\n", node.name(), status_text(node))
        };
        out.push_str(&line);

        if installed_group {
            write_nodes(out, &format!("{indent}{INDENT}"), node.children());
        }
    }
}

fn status_text(node: &ExtensionNode) -> String {
    let result = node.result();
    match result.status {
        InstallStatus::Installed => result
            .version
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        InstallStatus::NotFound => "<not installed>".to_string(),
        InstallStatus::Unknown => "???".to_string(),
        InstallStatus::Failed => match &result.error {
            Some(error) => format!("<error>: {error}"),
            None => "<error>".to_string(),
        },
    }
}

/// Machine-readable view of an evaluated tree.
///
/// Unlike the text output, every node is included, whatever the status of
/// its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub extensions: Vec<ReportEntry>,
}

/// One node of a [`Report`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub name: String,
    pub status: InstallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<ExtensionVersion>,
    /// Semantic version parsed from the version's image tag, if it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub children: Vec<ReportEntry>,
}

impl Report {
    /// Snapshot the results of an evaluated tree.
    pub fn from_tree(nodes: &[ExtensionNode]) -> Self {
        Self {
            extensions: nodes.iter().map(ReportEntry::from_node).collect(),
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl ReportEntry {
    fn from_node(node: &ExtensionNode) -> Self {
        let result = node.result();
        Self {
            name: node.name().to_string(),
            status: result.status,
            version: result.version.clone(),
            semver: result
                .version
                .as_ref()
                .and_then(ExtensionVersion::semver)
                .map(|v| v.to_string()),
            error: result.error.as_ref().map(ToString::to_string),
            children: node.children().iter().map(Self::from_node).collect(),
        }
    }
}
