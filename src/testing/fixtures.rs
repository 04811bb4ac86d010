//! Pre-built fixtures for testing agent/control-plane interactions.
//!
//! All JSON fixtures use the builder pattern for customization, mirroring
//! `redis-enterprise`'s `DatabaseFixture`/`NodeFixture` shape. Bundle byte
//! fixtures build real gzip+tar archives so `BundleStore` tests exercise
//! genuine decode paths rather than mocked bytes.

use std::io::Write;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Value};

/// Builder for a node summary fixture.
#[derive(Debug, Clone)]
pub struct NodeSummaryFixture {
    node_id: String,
    address: String,
    mtu: u32,
    status: String,
}

impl NodeSummaryFixture {
    pub fn new(node_id: impl Into<String>) -> Self {
        NodeSummaryFixture {
            node_id: node_id.into(),
            address: "10.10.0.1".to_string(),
            mtu: 1400,
            status: "active".to_string(),
        }
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn build(self) -> Value {
        json!({
            "node_id": self.node_id,
            "address": self.address,
            "mtu": self.mtu,
            "status": self.status,
        })
    }
}

/// Builder for a cluster replica record fixture.
#[derive(Debug, Clone)]
pub struct ReplicaFixture {
    id: String,
    role: String,
    address: String,
    heartbeat_age: ChronoDuration,
}

impl ReplicaFixture {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        ReplicaFixture {
            id: id.into(),
            role: role.into(),
            address: "10.10.0.1:7777".to_string(),
            heartbeat_age: ChronoDuration::seconds(1),
        }
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// How long ago this replica last reported a heartbeat.
    pub fn heartbeat_age(mut self, age: ChronoDuration) -> Self {
        self.heartbeat_age = age;
        self
    }

    pub fn build(self) -> Value {
        let last_heartbeat: DateTime<Utc> = Utc::now() - self.heartbeat_age;
        json!({
            "id": self.id,
            "role": self.role,
            "address": self.address,
            "last_heartbeat": last_heartbeat.to_rfc3339(),
        })
    }
}

/// Builder for a topology fixture.
#[derive(Debug, Clone, Default)]
pub struct TopologyFixture {
    lighthouses: Vec<String>,
    relays: Vec<String>,
    routes: Vec<String>,
}

impl TopologyFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lighthouses(mut self, lighthouses: Vec<String>) -> Self {
        self.lighthouses = lighthouses;
        self
    }

    pub fn relays(mut self, relays: Vec<String>) -> Self {
        self.relays = relays;
        self
    }

    pub fn routes(mut self, routes: Vec<String>) -> Self {
        self.routes = routes;
        self
    }

    pub fn build(self) -> Value {
        json!({
            "lighthouses": self.lighthouses,
            "relays": self.relays,
            "routes": self.routes,
        })
    }
}

/// The four basenames a bundle must carry to validate (spec.md §3).
pub const REQUIRED_BUNDLE_MEMBERS: [&str; 4] = ["config.yml", "ca.crt", "host.crt", "host.key"];

/// Build a valid gzip+tar bundle containing the required members plus
/// whatever extra `(name, contents)` entries are given.
pub fn bundle_bytes(extra_entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for name in REQUIRED_BUNDLE_MEMBERS {
        append_file(&mut builder, name, format!("# {name} fixture\n").as_bytes());
    }
    for (name, contents) in extra_entries {
        append_file(&mut builder, name, contents);
    }
    let tar_bytes = builder.into_inner().expect("tar builder finish");
    gzip(&tar_bytes)
}

/// A bundle missing `host.key`, for testing the required-member check.
pub fn bundle_missing_required_member() -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for name in ["config.yml", "ca.crt", "host.crt"] {
        append_file(&mut builder, name, format!("# {name} fixture\n").as_bytes());
    }
    let tar_bytes = builder.into_inner().expect("tar builder finish");
    gzip(&tar_bytes)
}

/// A bundle with required members plus one path-traversal entry, for P6/
/// scenario 7.
pub fn bundle_with_traversal_entry(traversal_name: &str, contents: &[u8]) -> Vec<u8> {
    bundle_bytes(&[(traversal_name, contents)])
}

/// Bytes that are not valid gzip at all, for the decode-failure path.
pub fn not_gzip_bytes() -> Vec<u8> {
    b"this is not a gzip stream".to_vec()
}

fn append_file(builder: &mut tar::Builder<Vec<u8>>, name: &str, contents: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    let name_bytes = name.as_bytes();
    header.as_gnu_mut().unwrap().name[..name_bytes.len()].copy_from_slice(name_bytes);
    header.set_cksum();
    builder.append(&header, contents).expect("append tar entry");
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).expect("gzip write");
    encoder.finish().expect("gzip finish")
}
