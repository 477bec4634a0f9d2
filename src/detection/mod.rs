//! Detection strategies.
//!
//! This module contains the building blocks extension nodes are made of:
//!
//! - `Detector`: presence check strategies (`NamespaceExists`,
//!   `NamespacePrefix`, `PodPrefix`) over the predicate functions
//! - `VersionSource`: version strategies (`PodImageVersion`) over
//!   `resolve_version`, which maps digest-pinned images to tags through a
//!   `TagRegistry`
//! - `parse_version`: semantic version extraction from image tags

mod image;
mod parser;
mod predicates;
mod registry;
mod resolver;

pub use image::DigestReference;
pub(crate) use parser::parse_version;
pub use predicates::{
    has_namespace, has_namespace_with_prefix, has_pod_with_prefix, NamespaceExists,
    NamespacePrefix, PodPrefix,
};
pub use registry::{HttpTagRegistry, TagRegistry};
pub use resolver::{resolve_version, PodImageVersion};

use crate::{DetectContext, DetectionError, ExtensionVersion};
use async_trait::async_trait;
use std::fmt;

/// Presence check for one extension node.
///
/// Returns `Ok(true)` if the component is present, `Ok(false)` if it is
/// definitively absent, and an error if the cluster could not be queried.
#[async_trait]
pub trait Detector: Send + Sync + fmt::Debug {
    /// Check whether the component is present.
    async fn detect(&self, ctx: &DetectContext) -> Result<bool, DetectionError>;
}

/// Version lookup for a leaf extension node.
#[async_trait]
pub trait VersionSource: Send + Sync + fmt::Debug {
    /// Resolve the version of a component that is known to be present.
    async fn resolve(&self, ctx: &DetectContext) -> Result<ExtensionVersion, DetectionError>;
}
