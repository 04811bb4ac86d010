//! `ClusterAgent`: the per-cluster composition root (§4.8).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::bundle::BundleStore;
use crate::config::ClusterConfig;
use crate::error::Result;
use crate::health::HealthMonitor;
use crate::operations::{ClusterHandle, NodeHandle};
use crate::poller::{ApplyBundle, Poller};
use crate::supervisor::Supervisor;
use crate::transport::Transport;

/// Chains a downloaded bundle into `BundleStore::apply` followed by a
/// `Supervisor::restart` request, implementing the Poller↔agent contract
/// (§4.6/§4.8).
struct ApplyAndRestart {
    bundle_store: BundleStore,
    supervisor: Arc<Supervisor>,
}

impl ApplyBundle for ApplyAndRestart {
    fn apply(&self, data: Vec<u8>, version: u64) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.bundle_store.apply(&data, version).await?;
            self.supervisor.restart();
            Ok(())
        })
    }
}

/// One cluster's full stack: transport, bundle store, supervised child
/// process, poller, and health monitor, running as concurrent tasks under
/// a shared cancellation token.
pub struct ClusterAgent {
    name: String,
    transport: Transport,
    node: NodeHandle,
    cluster: ClusterHandle,
    bundle_store: BundleStore,
    supervisor: Arc<Supervisor>,
    current_version: Arc<AtomicU64>,
    poll_interval: std::time::Duration,
    health_check_interval: std::time::Duration,
}

impl ClusterAgent {
    pub fn new(agent_config: &crate::config::AgentConfig, cluster_config: &ClusterConfig) -> Result<Self> {
        let client_config = agent_config.client_config_for(cluster_config)?;
        let transport = Transport::new(client_config)?;
        let node = NodeHandle::new(
            transport.clone(),
            cluster_config.tenant_id.clone(),
            cluster_config.cluster_id.clone(),
            cluster_config.node_id.clone(),
        );
        let cluster = ClusterHandle::new(
            transport.clone(),
            cluster_config.tenant_id.clone(),
            cluster_config.cluster_id.clone(),
        );
        let bundle_store = BundleStore::new(cluster_config.config_dir.clone());
        let supervisor = Arc::new(Supervisor::new(
            cluster_config.overlay_binary.clone(),
            cluster_config.config_file_path(),
            cluster_config.min_backoff,
            cluster_config.max_backoff,
            cluster_config.success_threshold,
            cluster_config.graceful_timeout,
        ));

        Ok(ClusterAgent {
            name: cluster_config.name.clone(),
            transport,
            node,
            cluster,
            bundle_store,
            supervisor,
            current_version: Arc::new(AtomicU64::new(0)),
            poll_interval: cluster_config.poll_interval,
            health_check_interval: cluster_config.health_check_interval,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run this cluster's agent until `cancel` fires: best-effort master
    /// discovery, then Poller/HealthMonitor/Supervisor concurrently.
    #[instrument(skip_all, fields(cluster = %self.name))]
    pub async fn run(&self, cancel: CancellationToken) {
        if let Err(e) = self.transport.discover_master(&cancel).await {
            tracing::warn!(error = %e, "initial master discovery failed, continuing with configured order");
        }

        let apply = Arc::new(ApplyAndRestart {
            bundle_store: BundleStore::new(self.bundle_store.config_dir().to_path_buf()),
            supervisor: self.supervisor.clone(),
        });
        let poller = Poller::new(
            self.node.clone(),
            self.current_version.clone(),
            apply,
            self.poll_interval,
        );
        let (health_monitor, _health_rx) =
            HealthMonitor::new(self.transport.clone(), self.cluster.clone(), self.health_check_interval);

        let poller_cancel = cancel.clone();
        let health_cancel = cancel.clone();
        let supervisor_cancel = cancel.clone();
        let supervisor = self.supervisor.clone();

        let (_poller_res, _health_res, _supervisor_res) = tokio::join!(
            poller.run(&poller_cancel),
            health_monitor.run(&health_cancel),
            supervisor.run(&supervisor_cancel),
        );

        info!("agent stopped");
    }
}
