//! Basic example of running the overlay-agent against a control plane
//!
//! This example shows how to:
//! - Build an `AgentConfig` for a single cluster membership
//! - Start a `Manager` and let it supervise the overlay process
//! - Shut down cleanly on Ctrl-C
//!
//! Run with: cargo run --example basic_agent

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use overlay_agent::{AgentConfig, ClusterConfig, Manager};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let base_url = env::var("OVERLAY_CONTROL_PLANE_URL")
        .unwrap_or_else(|_| "https://control-plane.example.internal".to_string());
    let node_token =
        env::var("OVERLAY_NODE_TOKEN").expect("OVERLAY_NODE_TOKEN environment variable not set");

    let cluster = ClusterConfig {
        name: "prod".into(),
        tenant_id: "acme".into(),
        cluster_id: "prod-mesh".into(),
        node_id: "host-17".into(),
        node_token,
        cluster_token: None,
        config_dir: PathBuf::from("/etc/overlay-agent/prod-mesh"),
        overlay_binary: "/usr/sbin/overlay-mesh".into(),
        poll_interval: Duration::from_secs(15),
        health_check_interval: Duration::from_secs(60),
        graceful_timeout: Duration::from_secs(10),
        success_threshold: Duration::from_secs(120),
        min_backoff: Duration::from_secs(1),
        max_backoff: Duration::from_secs(60),
    };

    let config = AgentConfig::new(vec![base_url], vec![cluster])?;
    let manager = Manager::new(config)?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    println!("overlay-agent managing clusters: {:?}", manager.cluster_names());
    manager.run(cancel).await?;
    Ok(())
}
