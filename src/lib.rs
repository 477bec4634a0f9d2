//! # kube-ext-discovery
//!
//! Detection of extensions installed in a Kubernetes cluster (Istio, Knative,
//! Helm Tiller) and of the versions they run.
//!
//! Extensions are described as trees of [`ExtensionNode`]s. Each node has a
//! [`Detector`] that checks whether the component is present; leaves also
//! have a [`VersionSource`] that reads the version from the image of a
//! running container. Evaluation queries the cluster through a single
//! [`QueryCache`] per run, so a whole tree costs at most one namespace
//! listing and one pod listing.
//!
//! ## Features
//!
//! - `ExtensionKind` catalog of known extensions
//! - `evaluate()` concurrent evaluation of an extension tree
//! - `KubectlClient` cluster access through the `kubectl` CLI
//! - `HttpTagRegistry` mapping of digest-pinned images back to tags
//! - `render_text()` and `Report` for text and JSON output
//!
//! ## Example
//!
//! ```rust,no_run
//! use kube_ext_discovery::{evaluate, render_text, CancellationToken, DetectContext, DetectOptions, ExtensionKind};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let ctx = DetectContext::from_options(&DetectOptions::default(), CancellationToken::new());
//!
//!     let mut tree = ExtensionKind::default_tree();
//!     if let Err(e) = evaluate(&ctx, &mut tree).await {
//!         eprintln!("failed to detect some extensions: {e}");
//!     }
//!     print!("{}", render_text(&tree));
//! }
//! ```

mod cluster;
mod detect;
mod detection;
mod extension_kind;
mod options;
mod report;
mod status;
#[cfg(test)]
mod testing;
mod tree;

pub use cluster::{ClusterQuery, Container, KubectlClient, Pod, QueryCache};
pub use detect::{evaluate, DetectContext, EvaluationError, NodeFailure};
pub use detection::{
    has_namespace, has_namespace_with_prefix, has_pod_with_prefix, resolve_version, Detector,
    DigestReference, HttpTagRegistry, NamespaceExists, NamespacePrefix, PodImageVersion, PodPrefix,
    TagRegistry, VersionSource,
};
pub use extension_kind::ExtensionKind;
pub use options::DetectOptions;
pub use report::{render_text, Report, ReportEntry};
pub use status::{DetectionError, DetectionResult, ErrorKind, ExtensionVersion, InstallStatus};
pub use tree::ExtensionNode;

pub use tokio_util::sync::CancellationToken;
