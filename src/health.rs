//! Background health probe: classifies the control plane as healthy or
//! degraded (§4.5). Publishes state via a `tokio::sync::watch` channel so
//! readers get a live, lock-free snapshot without polling the monitor.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::operations::{ClusterHandle, ReplicaRecord};
use crate::transport::Transport;

/// Health classification as of the most recent probe.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthState {
    pub healthy_replicas: u32,
    pub total_replicas: u32,
    pub last_probe_at: chrono::DateTime<Utc>,
    pub degraded: bool,
}

impl HealthState {
    fn initial() -> Self {
        HealthState {
            healthy_replicas: 0,
            total_replicas: 0,
            last_probe_at: Utc::now(),
            degraded: true,
        }
    }
}

const MASTER_ROLE: &str = "master";

/// Periodic replica-list probe and degraded-mode state machine.
pub struct HealthMonitor {
    transport: Transport,
    cluster: ClusterHandle,
    health_check_interval: Duration,
    state_tx: watch::Sender<HealthState>,
}

impl HealthMonitor {
    pub fn new(
        transport: Transport,
        cluster: ClusterHandle,
        health_check_interval: Duration,
    ) -> (Self, watch::Receiver<HealthState>) {
        let (state_tx, state_rx) = watch::channel(HealthState::initial());
        (
            HealthMonitor {
                transport,
                cluster,
                health_check_interval,
                state_tx,
            },
            state_rx,
        )
    }

    /// Run the probe loop: once immediately, then every
    /// `health_check_interval`, until `cancel` fires.
    pub async fn run(&self, cancel: &CancellationToken) {
        self.tick(cancel).await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("health monitor stopping");
                    return;
                }
                _ = tokio::time::sleep(self.health_check_interval) => {
                    self.tick(cancel).await;
                }
            }
        }
    }

    async fn tick(&self, cancel: &CancellationToken) {
        let next = self.probe_once(cancel).await;
        let was_degraded = self.state_tx.borrow().degraded;
        if next.degraded && !was_degraded {
            warn!(healthy = next.healthy_replicas, total = next.total_replicas, "control plane entered degraded mode");
        } else if !next.degraded && was_degraded {
            info!(healthy = next.healthy_replicas, total = next.total_replicas, "control plane recovered from degraded mode");
        }
        let _ = self.state_tx.send(next);
    }

    /// Probe algorithm exactly as spec.md §4.5.
    async fn probe_once(&self, cancel: &CancellationToken) -> HealthState {
        if self.transport.discover_master(cancel).await.is_err() {
            return HealthState {
                healthy_replicas: 0,
                total_replicas: 0,
                last_probe_at: Utc::now(),
                degraded: true,
            };
        }
        let replicas = match self.cluster.get_cluster_replicas(cancel).await {
            Ok(r) => r,
            Err(_) => {
                return HealthState {
                    healthy_replicas: 1,
                    total_replicas: 1,
                    last_probe_at: Utc::now(),
                    degraded: false,
                };
            }
        };
        classify(&replicas, self.health_check_interval)
    }

    /// On-demand variant used after connection errors. Performs no side
    /// effect on `Transport` (immutable after construction); returns the
    /// current replica list to the caller.
    pub async fn refresh_replicas(&self, cancel: &CancellationToken) -> Result<Vec<ReplicaRecord>> {
        self.cluster.get_cluster_replicas(cancel).await
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthState> {
        self.state_tx.subscribe()
    }
}

fn classify(replicas: &[ReplicaRecord], health_check_interval: Duration) -> HealthState {
    let stale_after = health_check_interval * 2;
    let now = Utc::now();
    let healthy = replicas
        .iter()
        .filter(|r| {
            let age = now.signed_duration_since(r.last_heartbeat);
            age.to_std().map(|a| a < stale_after).unwrap_or(false)
        })
        .count() as u32;
    let total = replicas.len() as u32;
    let has_master = replicas.iter().any(|r| r.role == MASTER_ROLE);
    let degraded = !has_master || healthy == 0;
    HealthState {
        healthy_replicas: healthy,
        total_replicas: total,
        last_probe_at: now,
        degraded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn replica(role: &str, age_secs: i64) -> ReplicaRecord {
        ReplicaRecord {
            id: "r1".into(),
            role: role.into(),
            address: "10.0.0.1:7777".into(),
            last_heartbeat: Utc::now() - ChronoDuration::seconds(age_secs),
        }
    }

    #[test]
    fn degraded_when_no_master_present() {
        let state = classify(&[replica("replica", 1)], Duration::from_secs(60));
        assert!(state.degraded);
    }

    #[test]
    fn degraded_when_all_replicas_stale() {
        let state = classify(&[replica("master", 1000)], Duration::from_secs(60));
        assert!(state.degraded);
        assert_eq!(state.healthy_replicas, 0);
    }

    #[test]
    fn healthy_when_master_present_and_fresh() {
        let state = classify(&[replica("master", 1), replica("replica", 5)], Duration::from_secs(60));
        assert!(!state.degraded);
        assert_eq!(state.healthy_replicas, 2);
        assert_eq!(state.total_replicas, 2);
    }

    #[test]
    fn p12_degraded_iff_no_master_or_all_stale() {
        let healthy_with_master = classify(&[replica("master", 1)], Duration::from_secs(60));
        assert!(!healthy_with_master.degraded);

        let no_master = classify(&[replica("replica", 1)], Duration::from_secs(60));
        assert!(no_master.degraded);

        let stale_master = classify(&[replica("master", 121)], Duration::from_secs(60));
        assert!(stale_master.degraded);
    }
}
