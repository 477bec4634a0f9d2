//! Content-digest image references.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

fn digest_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([^/@]+)/([^@]+)@(sha256:[0-9a-f]{64})$").expect("Invalid regex pattern")
    })
}

/// An image reference pinned by a sha256 content digest.
///
/// Only references of the form `<host>/<repository>@sha256:<64 hex>` parse;
/// tagged images and other digest algorithms are left to the caller as-is.
///
/// # Example
///
/// ```rust
/// use kube_ext_discovery::DigestReference;
///
/// let image = format!("gcr.io/knative-releases/serving/controller@sha256:{}", "0".repeat(64));
/// let reference = DigestReference::parse(&image).unwrap();
/// assert_eq!(reference.host(), "gcr.io");
/// assert_eq!(reference.repository(), "knative-releases/serving/controller");
/// assert_eq!(reference.with_tag("v0.5.1"), "gcr.io/knative-releases/serving/controller:v0.5.1");
///
/// assert!(DigestReference::parse("gcr.io/app:v1").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DigestReference {
    host: String,
    repository: String,
    digest: String,
}

impl DigestReference {
    /// Parse a digest reference, returning `None` if `image` is not one.
    pub fn parse(image: &str) -> Option<Self> {
        let caps = digest_pattern().captures(image)?;
        Some(Self {
            host: caps[1].to_string(),
            repository: caps[2].to_string(),
            digest: caps[3].to_string(),
        })
    }

    /// Registry host, e.g. `gcr.io`.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Repository path below the host.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Digest including the algorithm prefix, e.g. `sha256:...`.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// The same image addressed by a human tag instead of the digest.
    pub fn with_tag(&self, tag: &str) -> String {
        format!("{}/{}:{}", self.host, self.repository, tag)
    }
}

impl fmt::Display for DigestReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.host, self.repository, self.digest)
    }
}
