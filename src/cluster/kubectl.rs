//! `ClusterQuery` backed by the `kubectl` CLI.

use super::path_finder::{find_kubectl, KUBECTL};
use super::{ClusterQuery, Container, Pod};
use crate::{DetectOptions, DetectionError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default timeout for a single kubectl invocation.
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Cluster access through `kubectl get ... -o=json`.
///
/// Each query spawns one `kubectl` process. The process is killed if the
/// query is cancelled or times out.
///
/// # Example
///
/// ```rust,no_run
/// use kube_ext_discovery::{ClusterQuery, CancellationToken, KubectlClient};
/// use std::time::Duration;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let client = KubectlClient::new("kubectl")
///         .with_context("staging")
///         .with_timeout(Duration::from_secs(10));
///     let namespaces = client.list_namespaces(&CancellationToken::new()).await;
///     println!("{:?}", namespaces);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct KubectlClient {
    program: PathBuf,
    context: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct List<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    name: String,
    #[serde(default)]
    namespace: String,
}

#[derive(Debug, Deserialize)]
struct NamespaceItem {
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct PodItem {
    metadata: Metadata,
    #[serde(default)]
    spec: PodSpec,
}

#[derive(Debug, Default, Deserialize)]
struct PodSpec {
    #[serde(default)]
    containers: Vec<Container>,
}

impl KubectlClient {
    /// Client running the given `kubectl` binary with default settings.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            context: None,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Client configured from detection options.
    ///
    /// Without an explicit `kubectl` path the binary is looked up on `PATH`
    /// and in common install locations. If that fails the bare name is kept,
    /// so every query fails with a `QueryFailed` error that ends up in the
    /// report.
    pub fn from_options(options: &DetectOptions) -> Self {
        let program = options.kubectl.clone().unwrap_or_else(|| {
            find_kubectl().unwrap_or_else(|| {
                warn!("kubectl not found in PATH or common install locations");
                PathBuf::from(KUBECTL)
            })
        });
        let mut client = Self::new(program).with_timeout(options.query_timeout);
        client.context = options.kube_context.clone();
        client
    }

    /// Target a specific kubeconfig context.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Bound each kubectl invocation by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Path of the `kubectl` binary this client runs.
    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn run(&self, cancel: &CancellationToken, args: &[&str]) -> Result<Vec<u8>, DetectionError> {
        let mut command = Command::new(&self.program);
        if let Some(context) = &self.context {
            command.arg("--context").arg(context);
        }
        command
            .args(args)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(program = %self.program.display(), ?args, "running kubectl");
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DetectionError::Cancelled),
            result = timeout(self.timeout, command.output()) => result
                .map_err(|_| {
                    DetectionError::query_failed(format!(
                        "kubectl {} timed out after {:?}",
                        args.join(" "),
                        self.timeout
                    ))
                })?
                .map_err(|e| {
                    DetectionError::query_failed(format!(
                        "failed to run {}: {}",
                        self.program.display(),
                        e
                    ))
                })?,
        };

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(DetectionError::query_failed(format!(
                "kubectl command failed ({}). output={}",
                output.status,
                combined.trim()
            )));
        }
        Ok(output.stdout)
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<List<T>, DetectionError> {
    serde_json::from_slice(bytes).map_err(|e| DetectionError::decode_failed(e.to_string()))
}

fn decode_namespaces(bytes: &[u8]) -> Result<Vec<String>, DetectionError> {
    let list: List<NamespaceItem> = decode(bytes)?;
    Ok(list.items.into_iter().map(|item| item.metadata.name).collect())
}

fn decode_pods(bytes: &[u8]) -> Result<Vec<Pod>, DetectionError> {
    let list: List<PodItem> = decode(bytes)?;
    Ok(list
        .items
        .into_iter()
        .map(|item| Pod {
            namespace: item.metadata.namespace,
            name: item.metadata.name,
            containers: item.spec.containers,
        })
        .collect())
}

#[async_trait]
impl ClusterQuery for KubectlClient {
    async fn list_namespaces(&self, cancel: &CancellationToken) -> Result<Vec<String>, DetectionError> {
        let stdout = self.run(cancel, &["get", "namespaces", "-o=json"]).await?;
        decode_namespaces(&stdout)
    }

    async fn list_pods(&self, cancel: &CancellationToken) -> Result<Vec<Pod>, DetectionError> {
        let stdout = self
            .run(cancel, &["get", "pods", "--all-namespaces", "-o=json"])
            .await?;
        decode_pods(&stdout)
    }
}
