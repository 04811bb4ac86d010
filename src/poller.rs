//! Periodic version check, conditional download, and apply callback (§4.6).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::operations::{DownloadOutcome, NodeHandle};

/// The single contract boundary between Poller and the rest of a
/// `ClusterAgent`: stage and activate a new bundle. Spec.md §9 leaves the
/// choice between a callback and a named interface open; a one-method
/// trait is preferred here because the call is `async` and the crate
/// otherwise has no use for `async-trait` — grounded on
/// `redis-enterprise::client::tower_support`'s `Pin<Box<dyn Future>>`
/// return for `Service::call`.
pub trait ApplyBundle: Send + Sync {
    fn apply(&self, data: Vec<u8>, version: u64) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Runs `check_once` immediately, then every `poll_interval` until
/// cancelled.
pub struct Poller {
    node: NodeHandle,
    current_version: Arc<AtomicU64>,
    apply: Arc<dyn ApplyBundle>,
    poll_interval: Duration,
}

impl Poller {
    pub fn new(
        node: NodeHandle,
        current_version: Arc<AtomicU64>,
        apply: Arc<dyn ApplyBundle>,
        poll_interval: Duration,
    ) -> Self {
        Poller {
            node,
            current_version,
            apply,
            poll_interval,
        }
    }

    pub async fn run(&self, cancel: &CancellationToken) {
        self.check_once(cancel).await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("poller stopping");
                    return;
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    self.check_once(cancel).await;
                }
            }
        }
    }

    /// Every error here is soft: log and let the next tick retry. The
    /// poller must never propagate a failure that would crash the agent.
    pub async fn check_once(&self, cancel: &CancellationToken) {
        let current = self.current_version.load(Ordering::SeqCst);

        let latest = match self.node.get_latest_version(cancel).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to fetch latest config version");
                return;
            }
        };
        if latest <= current {
            debug!(current, latest, "already at latest config version");
            return;
        }

        let outcome = match self.node.download_bundle(current, cancel).await {
            Ok(o) => o,
            Err(e) => {
                warn!(error = %e, "failed to download config bundle");
                return;
            }
        };
        let (data, version) = match outcome {
            DownloadOutcome::NotModified { .. } => return,
            DownloadOutcome::Bundle { data, version } => (data, version),
        };

        if let Err(e) = self.apply.apply(data, version).await {
            warn!(error = %e, version, "failed to apply config bundle");
            return;
        }
        self.current_version.store(version, Ordering::SeqCst);
        info!(version, "applied new config bundle");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::testing::MockControlPlane;
    use crate::transport::Transport;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    struct RecordingApply {
        calls: Mutex<Vec<(Vec<u8>, u64)>>,
        fail: AtomicU32,
    }

    impl RecordingApply {
        fn new() -> Self {
            RecordingApply {
                calls: Mutex::new(Vec::new()),
                fail: AtomicU32::new(0),
            }
        }
    }

    impl ApplyBundle for RecordingApply {
        fn apply(&self, data: Vec<u8>, version: u64) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                if self.fail.load(Ordering::SeqCst) > 0 {
                    return Err(crate::error::AgentError::BundleInvalid("forced failure".into()));
                }
                self.calls.lock().unwrap().push((data, version));
                Ok(())
            })
        }
    }

    fn node_handle(server: &MockControlPlane) -> NodeHandle {
        let cfg = ClientConfig::builder()
            .base_urls(vec![server.uri()])
            .tenant_id("t1")
            .cluster_id("c1")
            .node_token(Some("0123456789abcdef".into()))
            .retry_attempts(0)
            .build()
            .unwrap();
        let transport = Transport::new(cfg).unwrap();
        NodeHandle::new(transport, "t1", "c1", "n1")
    }

    #[tokio::test]
    async fn scenario1_fresh_apply_advances_version() {
        let server = MockControlPlane::start().await;
        server.mock_latest_version("t1", "c1", 1).await;
        server.mock_download_bundle("t1", "c1", b"bundle-bytes", 1).await;

        let node = node_handle(&server);
        let apply = Arc::new(RecordingApply::new());
        let poller = Poller::new(node, Arc::new(AtomicU64::new(0)), apply.clone(), Duration::from_secs(5));
        let cancel = CancellationToken::new();
        poller.check_once(&cancel).await;

        assert_eq!(poller.current_version.load(Ordering::SeqCst), 1);
        assert_eq!(apply.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scenario2_not_modified_is_noop() {
        let server = MockControlPlane::start().await;
        server.mock_latest_version("t1", "c1", 5).await;

        let node = node_handle(&server);
        let apply = Arc::new(RecordingApply::new());
        let poller = Poller::new(node, Arc::new(AtomicU64::new(5)), apply.clone(), Duration::from_secs(5));
        let cancel = CancellationToken::new();
        poller.check_once(&cancel).await;

        assert_eq!(poller.current_version.load(Ordering::SeqCst), 5);
        assert_eq!(apply.calls.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn p8_actual_304_does_not_advance_or_apply() {
        let server = MockControlPlane::start().await;
        server.mock_latest_version("t1", "c1", 6).await;
        server.mock_bundle_not_modified("t1", "c1").await;

        let node = node_handle(&server);
        let apply = Arc::new(RecordingApply::new());
        let poller = Poller::new(node, Arc::new(AtomicU64::new(5)), apply.clone(), Duration::from_secs(5));
        let cancel = CancellationToken::new();
        poller.check_once(&cancel).await;

        assert_eq!(poller.current_version.load(Ordering::SeqCst), 5);
        assert_eq!(apply.calls.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn failed_apply_does_not_advance_version() {
        let server = MockControlPlane::start().await;
        server.mock_latest_version("t1", "c1", 2).await;
        server.mock_download_bundle("t1", "c1", b"bundle-bytes", 2).await;

        let node = node_handle(&server);
        let apply = Arc::new(RecordingApply::new());
        apply.fail.store(1, Ordering::SeqCst);
        let poller = Poller::new(node, Arc::new(AtomicU64::new(0)), apply.clone(), Duration::from_secs(5));
        let cancel = CancellationToken::new();
        poller.check_once(&cancel).await;

        assert_eq!(poller.current_version.load(Ordering::SeqCst), 0);
    }
}
