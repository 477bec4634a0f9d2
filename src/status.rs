//! Detection status types representing evaluation results.

use crate::detection::parse_version;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Display version of an installed extension.
///
/// This is usually the container image reference the extension runs, with
/// digest references rewritten to a human tag where the registry allows it
/// (e.g. `gcr.io/knative-releases/serving/controller:v0.5.1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionVersion(String);

impl ExtensionVersion {
    /// Wrap a raw version string.
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// The version as displayed in reports.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Best-effort semantic version extracted from the image tag.
    ///
    /// Returns `None` for digest references and tags without a
    /// `major.minor.patch` component.
    ///
    /// # Example
    ///
    /// ```rust
    /// use kube_ext_discovery::ExtensionVersion;
    ///
    /// let version = ExtensionVersion::new("docker.io/istio/pilot:1.1.7");
    /// assert_eq!(version.semver().unwrap().to_string(), "1.1.7");
    ///
    /// let pinned = ExtensionVersion::new("gcr.io/app@sha256:abc");
    /// assert!(pinned.semver().is_none());
    /// ```
    pub fn semver(&self) -> Option<Version> {
        parse_version(&self.0)
    }
}

impl fmt::Display for ExtensionVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ExtensionVersion {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ExtensionVersion {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Coarse classification of a [`DetectionError`].
///
/// Context wrappers are looked through, so the kind always names the
/// underlying failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
#[non_exhaustive]
pub enum ErrorKind {
    /// The cluster query itself failed (spawn error, non-zero exit, timeout).
    QueryFailure,
    /// The cluster answered with something that could not be decoded.
    DecodeFailure,
    /// An expected namespace, pod or container is absent.
    NotFound,
    /// Several containers matched and no container name was given.
    Ambiguous,
    /// The tag registry could not map a digest to a tag.
    RegistryFailure,
    /// The run was cancelled while the operation was in flight.
    Cancelled,
}

/// Typed error variants for detection failures.
///
/// Errors are `Clone` because one failed cluster query is handed to every
/// node that was waiting on it.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error types
/// in future versions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DetectionError {
    /// The underlying cluster query failed.
    #[error("cluster query failed: {message}")]
    QueryFailed {
        /// What went wrong, including tool output when available.
        message: String,
    },

    /// The cluster query returned a malformed response.
    #[error("decoding cluster response failed: {message}")]
    DecodeFailed {
        /// Decoder error message.
        message: String,
    },

    /// An expected namespace, pod or container is absent.
    #[error("{message}")]
    NotFound {
        /// Which object was looked for.
        message: String,
    },

    /// A pod has several containers and no container name was given.
    #[error("pod {pod} has {containers} containers, could not disambiguate (container name not given)")]
    Ambiguous {
        /// `namespace/name` of the pod.
        pod: String,
        /// Number of containers in the pod.
        containers: usize,
    },

    /// The tag registry lookup failed or returned no usable tag.
    #[error("tag registry lookup failed: {message}")]
    RegistryFailed {
        /// What went wrong.
        message: String,
    },

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Another error annotated with the step that produced it.
    #[error("{context}: {source}")]
    Context {
        /// Step that failed, e.g. `namespace prefix "knative-"`.
        context: String,
        /// The wrapped error.
        source: Box<DetectionError>,
    },
}

impl DetectionError {
    pub(crate) fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed {
            message: message.into(),
        }
    }

    pub(crate) fn decode_failed(message: impl Into<String>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub(crate) fn registry_failed(message: impl Into<String>) -> Self {
        Self::RegistryFailed {
            message: message.into(),
        }
    }

    /// Wrap this error with a description of the step that failed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use kube_ext_discovery::{DetectionError, ErrorKind};
    ///
    /// let error = DetectionError::Cancelled.context("namespace \"istio-system\"");
    /// assert_eq!(error.kind(), ErrorKind::Cancelled);
    /// assert_eq!(error.to_string(), "namespace \"istio-system\": operation cancelled");
    /// ```
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Kind of the underlying failure, looking through context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::QueryFailed { .. } => ErrorKind::QueryFailure,
            Self::DecodeFailed { .. } => ErrorKind::DecodeFailure,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Ambiguous { .. } => ErrorKind::Ambiguous,
            Self::RegistryFailed { .. } => ErrorKind::RegistryFailure,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Context { source, .. } => source.kind(),
        }
    }
}

/// Terminal state of one extension node.
///
/// Every node starts as `Unknown`; the evaluator moves it to exactly one of
/// the other states. Nodes below an absent or failed parent stay `Unknown`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum InstallStatus {
    /// Never evaluated.
    #[default]
    Unknown,
    /// Detection ran and the extension is absent.
    NotFound,
    /// Detection ran and the extension is present.
    Installed,
    /// Detection or version resolution failed.
    Failed,
}

/// Result slot of one extension node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionResult {
    /// Terminal state, or `Unknown` if the node was never evaluated.
    pub status: InstallStatus,

    /// Resolved version. Only set for installed leaves.
    pub version: Option<ExtensionVersion>,

    /// Why the node failed. Only set when `status` is `Failed`.
    pub error: Option<DetectionError>,
}

impl DetectionResult {
    pub(crate) fn not_found() -> Self {
        Self {
            status: InstallStatus::NotFound,
            ..Default::default()
        }
    }

    pub(crate) fn installed(version: Option<ExtensionVersion>) -> Self {
        Self {
            status: InstallStatus::Installed,
            version,
            error: None,
        }
    }

    pub(crate) fn failed(error: DetectionError) -> Self {
        Self {
            status: InstallStatus::Failed,
            version: None,
            error: Some(error),
        }
    }

    /// Check if the extension was detected.
    pub fn is_installed(&self) -> bool {
        self.status == InstallStatus::Installed
    }

    /// Check if the node reached a terminal state.
    pub fn is_evaluated(&self) -> bool {
        self.status != InstallStatus::Unknown
    }
}
