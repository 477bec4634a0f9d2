//! Semantic version extraction from image references.

use regex::Regex;
use semver::Version;
use std::sync::OnceLock;

fn semver_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").expect("Invalid regex pattern"))
}

/// Parse a semantic version from the tag of an image reference.
///
/// Only the tag is inspected, so registry hosts and ports never leak into
/// the result:
///
/// - `docker.io/istio/pilot:1.1.7` -> 1.1.7
/// - `gcr.io/knative-releases/serving/controller:v0.5.1` -> 0.5.1
/// - `10.0.0.1:5000/tiller:v2.14.3-rc1` -> 2.14.3
///
/// Digest references and untagged images yield `None`.
pub(crate) fn parse_version(reference: &str) -> Option<Version> {
    let tag = image_tag(reference)?;
    let caps = semver_pattern().captures(tag)?;
    Version::parse(caps.get(0)?.as_str()).ok()
}

fn image_tag(reference: &str) -> Option<&str> {
    if reference.contains('@') {
        return None;
    }
    let name_start = reference.rfind('/').map_or(0, |i| i + 1);
    let last = &reference[name_start..];
    last.rfind(':').map(|i| &last[i + 1..])
}
