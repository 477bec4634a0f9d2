//! Single-flight memoization of cluster queries.

use super::{ClusterQuery, Pod};
use crate::DetectionError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type Slot<T> = OnceCell<Result<Arc<T>, DetectionError>>;

/// Memoized view of the cluster for one detection run.
///
/// Each collection is fetched at most once, on first use. Callers that
/// arrive while the fetch is in flight wait for it and receive the same
/// result; callers after it completes read the stored value without any
/// further query. A failed fetch is stored too, so a run never retries.
///
/// Build one cache per run. It is never refreshed.
pub struct QueryCache {
    client: Arc<dyn ClusterQuery>,
    namespaces: Slot<Vec<String>>,
    pods: Slot<Vec<Pod>>,
}

impl QueryCache {
    /// Empty cache in front of `client`.
    pub fn new(client: Arc<dyn ClusterQuery>) -> Self {
        Self {
            client,
            namespaces: OnceCell::new(),
            pods: OnceCell::new(),
        }
    }

    /// All namespace names.
    pub async fn namespaces(&self, cancel: &CancellationToken) -> Result<Arc<Vec<String>>, DetectionError> {
        load(&self.namespaces, cancel, move || async move {
            debug!("listing namespaces");
            self.client.list_namespaces(cancel).await
        })
        .await
    }

    /// All pods across all namespaces.
    pub async fn pods(&self, cancel: &CancellationToken) -> Result<Arc<Vec<Pod>>, DetectionError> {
        load(&self.pods, cancel, move || async move {
            debug!("listing pods");
            self.client.list_pods(cancel).await
        })
        .await
    }
}

async fn load<T, F, Fut>(
    slot: &Slot<T>,
    cancel: &CancellationToken,
    fetch: F,
) -> Result<Arc<T>, DetectionError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, DetectionError>>,
{
    if let Some(done) = slot.get() {
        return done.clone();
    }

    // A waiter that is cancelled gives up its own wait; if it was the one
    // running the fetch, the next waiter in line takes the fetch over.
    let init = slot.get_or_init(|| async move { fetch().await.map(Arc::new) });
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DetectionError::Cancelled),
        done = init => done.clone(),
    }
}
