//! `Manager`: owns one `ClusterAgent` per configured cluster (§4.9).

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::ClusterAgent;
use crate::config::AgentConfig;
use crate::error::{AgentError, Result};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Launches and supervises one `ClusterAgent` per `ClusterConfig`,
/// independently — a fault in one cluster's agent never touches another's.
pub struct Manager {
    agents: Vec<ClusterAgent>,
    shutdown_timeout: Duration,
}

impl Manager {
    pub fn new(config: AgentConfig) -> Result<Self> {
        let mut agents = Vec::with_capacity(config.clusters.len());
        for cluster_config in &config.clusters {
            agents.push(ClusterAgent::new(&config, cluster_config)?);
        }
        Ok(Manager {
            agents,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        })
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Run every agent concurrently until `cancel` fires, then wait up to
    /// `shutdown_timeout` for all of them to finish. Agents that do not
    /// finish in time are abandoned (best-effort); the caller's process is
    /// expected to exit shortly after regardless.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(clusters = self.agents.len(), "manager starting");
        let run_all = async {
            let mut tasks = Vec::with_capacity(self.agents.len());
            for agent in &self.agents {
                let child_cancel = cancel.child_token();
                tasks.push(agent.run(child_cancel));
            }
            futures::future::join_all(tasks).await;
        };

        tokio::select! {
            _ = run_all => {
                info!("all agents exited");
                Ok(())
            }
            _ = async {
                cancel.cancelled().await;
                tokio::time::sleep(self.shutdown_timeout).await;
            } => {
                warn!(timeout_secs = self.shutdown_timeout.as_secs(), "shutdown timeout elapsed, abandoning outstanding agents");
                Err(AgentError::Io("shutdown timed out before all agents stopped".into()))
            }
        }
    }

    pub fn cluster_names(&self) -> Vec<&str> {
        self.agents.iter().map(ClusterAgent::name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;
    use crate::testing::MockControlPlane;
    use tempfile::tempdir;

    fn cluster_config(name: &str, dir: &std::path::Path) -> ClusterConfig {
        ClusterConfig {
            name: name.to_string(),
            tenant_id: "t1".into(),
            cluster_id: "c1".into(),
            node_id: "n1".into(),
            node_token: "0123456789abcdef".into(),
            cluster_token: None,
            config_dir: dir.join(name),
            overlay_binary: "true".into(),
            poll_interval: Duration::from_millis(20),
            health_check_interval: Duration::from_millis(20),
            graceful_timeout: Duration::from_millis(50),
            success_threshold: Duration::from_secs(60),
            min_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(50),
        }
    }

    #[test]
    fn builds_one_agent_per_cluster() {
        let dir = tempdir().unwrap();
        let config = AgentConfig::new(
            vec!["https://a.example.com".into()],
            vec![cluster_config("prod", dir.path()), cluster_config("staging", dir.path())],
        )
        .unwrap();
        let manager = Manager::new(config).unwrap();
        let mut names = manager.cluster_names();
        names.sort();
        assert_eq!(names, vec!["prod", "staging"]);
    }

    #[tokio::test]
    async fn run_returns_after_cancellation() {
        let dir = tempdir().unwrap();
        let server = MockControlPlane::start().await;
        server.mock_check_master(true).await;
        server.mock_latest_version("t1", "c1", 0).await;
        server.mock_cluster_replicas("t1", "c1", vec![]).await;

        let config = AgentConfig::new(vec![server.uri()], vec![cluster_config("prod", dir.path())]).unwrap();
        let manager = Manager::new(config).unwrap().with_shutdown_timeout(Duration::from_millis(200));
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();
        let handle = tokio::spawn(async move { manager.run(cancel2).await });

        tokio::time::sleep(Duration::from_millis(80)).await;
        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(result.is_ok(), "manager.run did not return after cancellation");
    }
}
