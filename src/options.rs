//! Detection options configuration.
//!
//! This module provides the [`DetectOptions`] struct for configuring how a
//! detection run reaches the cluster and the image registry.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration options for a detection run.
///
/// # Default Behavior
///
/// By default `kubectl` is looked up on `PATH` and run against the current
/// kubeconfig context, each cluster query may take up to 30 seconds, and
/// each registry tag lookup up to 5 seconds.
///
/// # Example
///
/// ```rust
/// use kube_ext_discovery::DetectOptions;
/// use std::time::Duration;
///
/// // Use default options
/// let opts = DetectOptions::default();
///
/// // Query another cluster with a shorter timeout
/// let opts = DetectOptions {
///     kube_context: Some("staging".to_string()),
///     query_timeout: Duration::from_secs(10),
///     ..Default::default()
/// };
///
/// // Offline mode: report digest references as-is
/// let opts = DetectOptions {
///     skip_tag_resolution: true,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct DetectOptions {
    /// Explicit path to the `kubectl` binary.
    ///
    /// Default: `None` (search `PATH` and common install locations)
    pub kubectl: Option<PathBuf>,

    /// Kubeconfig context passed to `kubectl --context`.
    ///
    /// Default: `None` (current context)
    pub kube_context: Option<String>,

    /// Timeout for one `kubectl` invocation.
    ///
    /// Default: 30 seconds
    pub query_timeout: Duration,

    /// Timeout for one registry tag lookup.
    ///
    /// Default: 5 seconds
    pub registry_timeout: Duration,

    /// Skip mapping digest references to tags.
    ///
    /// When set, versions of digest-pinned images are reported as the raw
    /// `host/repo@sha256:...` reference and no registry is contacted.
    ///
    /// Default: `false`
    pub skip_tag_resolution: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            kubectl: None,
            kube_context: None,
            query_timeout: Duration::from_secs(30),
            registry_timeout: Duration::from_secs(5),
            skip_tag_resolution: false,
        }
    }
}
