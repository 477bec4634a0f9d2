//! Tag lookup for digest-pinned images.

use super::image::DigestReference;
use crate::DetectionError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A container registry that can map a content digest back to tags.
#[async_trait]
pub trait TagRegistry: Send + Sync {
    /// Tags pointing at `reference`'s digest, in registry response order.
    async fn resolve_digest_tags(
        &self,
        cancel: &CancellationToken,
        reference: &DigestReference,
    ) -> Result<Vec<String>, DetectionError>;
}

/// Registry client for the `/v2/<repo>/tags/list` endpoint.
///
/// The response is expected to carry the GCR-style `manifest` map
/// (`digest -> { "tag": [...] }`). Registries that only return a flat tag
/// list have no digest mapping, so every lookup against them fails and the
/// caller falls back to the digest reference.
#[derive(Debug, Clone)]
pub struct HttpTagRegistry {
    http: Client,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    manifest: HashMap<String, ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    #[serde(default, rename = "tag")]
    tags: Vec<String>,
}

impl HttpTagRegistry {
    /// Create a client whose requests are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, DetectionError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DetectionError::registry_failed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    async fn fetch_tag_list(&self, url: &str) -> Result<TagList, DetectionError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DetectionError::registry_failed(format!("failed to query tags from {url}: {e}")))?;

        response
            .json::<TagList>()
            .await
            .map_err(|e| DetectionError::registry_failed(format!("failed to decode tag list from {url}: {e}")))
    }
}

#[async_trait]
impl TagRegistry for HttpTagRegistry {
    async fn resolve_digest_tags(
        &self,
        cancel: &CancellationToken,
        reference: &DigestReference,
    ) -> Result<Vec<String>, DetectionError> {
        let url = format!(
            "https://{}/v2/{}/tags/list",
            reference.host(),
            reference.repository()
        );
        debug!(%url, "querying registry tags");

        let list = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DetectionError::Cancelled),
            list = self.fetch_tag_list(&url) => list?,
        };
        tags_for_digest(list, reference)
    }
}

fn tags_for_digest(
    mut list: TagList,
    reference: &DigestReference,
) -> Result<Vec<String>, DetectionError> {
    let entry = list.manifest.remove(reference.digest()).ok_or_else(|| {
        DetectionError::registry_failed(format!(
            "digest {} not found in tag list of {}",
            reference.digest(),
            reference.repository()
        ))
    })?;
    if entry.tags.is_empty() {
        return Err(DetectionError::registry_failed(format!(
            "no tags found for image {reference}"
        )));
    }
    Ok(entry.tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn reference() -> DigestReference {
        DigestReference::parse(&format!("gcr.io/knative-releases/serving/controller@sha256:{}", "ab".repeat(32)))
            .unwrap()
    }

    fn decode(body: &str) -> TagList {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_tags_for_known_digest() {
        let body = format!(
            r#"{{
                "name": "knative-releases/serving/controller",
                "manifest": {{
                    "sha256:{}": {{
                        "imageSizeBytes": "1024",
                        "tag": ["latest", "v0.5.1"],
                        "timeUploadedMs": "1554000000000"
                    }},
                    "sha256:{}": {{ "tag": ["v0.4.0"] }}
                }},
                "tags": ["latest", "v0.4.0", "v0.5.1"]
            }}"#,
            "ab".repeat(32),
            "cd".repeat(32)
        );
        let tags = tags_for_digest(decode(&body), &reference()).unwrap();
        assert_eq!(tags, vec!["latest", "v0.5.1"]);
    }

    #[test]
    fn test_unknown_digest_is_registry_failure() {
        let body = format!(r#"{{ "manifest": {{ "sha256:{}": {{ "tag": ["v1"] }} }} }}"#, "cd".repeat(32));
        let error = tags_for_digest(decode(&body), &reference()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::RegistryFailure);
        assert!(error.to_string().contains("not found in tag list"));
    }

    #[test]
    fn test_untagged_digest_is_registry_failure() {
        let body = format!(r#"{{ "manifest": {{ "sha256:{}": {{ "tag": [] }} }} }}"#, "ab".repeat(32));
        let error = tags_for_digest(decode(&body), &reference()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::RegistryFailure);
        assert!(error.to_string().contains("no tags found"));
    }

    #[test]
    fn test_flat_tag_list_has_no_mapping() {
        let body = r#"{ "name": "app", "tags": ["v1", "v2"] }"#;
        let error = tags_for_digest(decode(body), &reference()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::RegistryFailure);
    }

    #[tokio::test]
    async fn test_cancelled_before_request() {
        let registry = HttpTagRegistry::new(Duration::from_secs(1)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = registry.resolve_digest_tags(&cancel, &reference()).await;
        assert_eq!(result, Err(DetectionError::Cancelled));
    }
}
