//! End-to-end wiring check: a `ClusterAgent` polls a mock control plane,
//! extracts a downloaded bundle, and restarts its supervised child —
//! exercising Poller, BundleStore, and Supervisor together (scenario 1).

mod common;

use std::time::Duration;

use overlay_agent::{AgentConfig, ClusterAgent, ClusterConfig};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn bundle_bytes() -> Vec<u8> {
    use std::io::Write;
    let mut builder = tar::Builder::new(Vec::new());
    for name in ["config.yml", "ca.crt", "host.crt", "host.key"] {
        let contents = format!("# {name}\n");
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, contents.as_bytes()).unwrap();
    }
    let tar_bytes = builder.into_inner().unwrap();
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn scenario1_agent_applies_fresh_bundle_and_restarts_child() {
    let dir = tempdir().unwrap();
    let config_dir = dir.path().join("mesh-1");
    let marker = dir.path().join("starts");
    let script = common::write_script(
        dir.path(),
        "overlay.sh",
        &format!("echo x >> {marker}\nsleep 5\n", marker = marker.display()),
    );

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/check-master"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tenants/t1/clusters/c1/config/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"version": 1})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tenants/t1/clusters/c1/config/bundle"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Config-Version", "1")
                .set_body_bytes(bundle_bytes()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tenants/t1/clusters/c1/replicas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let cluster_config = ClusterConfig {
        name: "mesh-1".into(),
        tenant_id: "t1".into(),
        cluster_id: "c1".into(),
        node_id: "n1".into(),
        node_token: "0123456789abcdef".into(),
        cluster_token: None,
        config_dir: config_dir.clone(),
        overlay_binary: script.to_string_lossy().to_string(),
        poll_interval: Duration::from_millis(30),
        health_check_interval: Duration::from_secs(60),
        graceful_timeout: Duration::from_millis(200),
        success_threshold: Duration::from_secs(60),
        min_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(100),
    };
    let agent_config = AgentConfig::new(vec![server.uri()], vec![cluster_config]).unwrap();
    let agent = ClusterAgent::new(&agent_config, &agent_config.clusters[0]).unwrap();

    let cancel = CancellationToken::new();
    let cancel2 = cancel.clone();
    let handle = tokio::spawn(async move { agent.run(cancel2).await });

    for _ in 0..100 {
        if config_dir.join("config.yml").is_file() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    // Give the coalesced restart triggered by the apply time to land.
    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;

    for required in ["config.yml", "ca.crt", "host.crt", "host.key"] {
        assert!(config_dir.join(required).is_file(), "missing {required} after apply");
    }
    let starts = std::fs::read_to_string(&marker).unwrap_or_default();
    assert!(
        starts.lines().count() >= 2,
        "expected the initial start plus a post-apply restart, got: {starts:?}"
    );
}
