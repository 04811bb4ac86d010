//! Simple multi-cluster setup example
//!
//! This example demonstrates driving the typed operation handles directly,
//! without going through `Manager`/`ClusterAgent` supervision — useful for
//! one-off provisioning scripts.
//!
//! Run with:
//! ```bash
//! cargo run --example cluster_setup_simple
//! ```

use std::env;

use overlay_agent::operations::CreateNodeRequest;
use overlay_agent::{ClientConfig, ClusterHandle, NodeHandle, Transport};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let base_url = env::var("OVERLAY_CONTROL_PLANE_URL")
        .unwrap_or_else(|_| "https://control-plane.example.internal".to_string());
    let tenant_id = env::var("OVERLAY_TENANT_ID").unwrap_or_else(|_| "acme".to_string());
    let cluster_id = env::var("OVERLAY_CLUSTER_ID").unwrap_or_else(|_| "prod-mesh".to_string());
    let cluster_token = env::var("OVERLAY_CLUSTER_TOKEN").ok();

    println!("Overlay Cluster Setup");
    println!("=====================");
    println!("URL: {base_url}");
    println!("Tenant: {tenant_id}, Cluster: {cluster_id}");
    println!();

    let config = ClientConfig::builder()
        .base_urls(vec![base_url])
        .tenant_id(&tenant_id)
        .cluster_id(&cluster_id)
        .cluster_token(cluster_token)
        .build()?;
    let transport = Transport::new(config)?;
    let cancel = CancellationToken::new();

    // Step 1: find the current master so writes land on the right replica.
    println!("Step 1: discovering master...");
    match transport.discover_master(&cancel).await {
        Ok(()) => println!("  found master at {:?}", transport.cached_master()),
        Err(e) => println!("  master discovery failed: {e} (falling back to configured order)"),
    }

    // Step 2: register this host as a node.
    println!("\nStep 2: registering node...");
    let cluster = ClusterHandle::new(transport.clone(), &tenant_id, &cluster_id);
    let request = CreateNodeRequest::builder().address("10.10.0.5").mtu(1400).build();
    let node_id = match cluster.create_node(&request, &cancel).await {
        Ok(created) => {
            println!("  registered as {} (token issued once, store it now)", created.node_id);
            created.node_id
        }
        Err(e) => {
            println!("  registration failed: {e}");
            return Err(e.into());
        }
    };

    // Step 3: list cluster replicas.
    println!("\nStep 3: listing replicas...");
    match cluster.get_cluster_replicas(&cancel).await {
        Ok(replicas) => {
            println!("  {} replica(s):", replicas.len());
            for r in replicas {
                println!("    - {} ({}) at {}", r.id, r.role, r.address);
            }
        }
        Err(e) => println!("  failed to list replicas: {e}"),
    }

    // Step 4: fetch the current topology for this node.
    println!("\nStep 4: fetching topology...");
    let node = NodeHandle::new(transport, &tenant_id, &cluster_id, &node_id);
    match node.get_topology(&cancel).await {
        Ok(topology) => println!(
            "  {} lighthouse(s), {} relay(s), {} route(s)",
            topology.lighthouses.len(),
            topology.relays.len(),
            topology.routes.len()
        ),
        Err(e) => println!("  topology fetch failed: {e}"),
    }

    println!("\nSetup complete. Point `overlay_binary` at this node's config and start an agent.");
    Ok(())
}
