//! Mock control-plane server for testing agent/SDK consumers.
//!
//! Grounded on `redis-enterprise`'s `MockEnterpriseServer`: a thin wrapper
//! around a `wiremock::MockServer` with one `mock_*` helper per endpoint
//! shape this crate's operations rely on.

use serde_json::{json, Value};
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use crate::transport::CONFIG_VERSION_HEADER;

/// A wrapper around wiremock's `MockServer` configured for this crate's
/// control-plane wire contract (§6).
pub struct MockControlPlane {
    server: MockServer,
}

impl MockControlPlane {
    pub async fn start() -> Self {
        MockControlPlane {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    pub async fn received_requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Mount a custom mock on the server.
    pub async fn mount(&self, mock: Mock) {
        mock.mount(&self.server).await;
    }

    // -- Master discovery / health --------------------------------------

    /// Mock `GET /api/v1/check-master`: 2xx iff `is_master`.
    pub async fn mock_check_master(&self, is_master: bool) {
        let status = if is_master { 200 } else { 404 };
        Mock::given(method("GET"))
            .and(path("/api/v1/check-master"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Mock `GET /health/master`.
    pub async fn mock_health_master(&self, is_master: bool, instance_id: &str) {
        Mock::given(method("GET"))
            .and(path("/health/master"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "is_master": is_master,
                "instance_id": instance_id,
                "master_url": null,
            })))
            .mount(&self.server)
            .await;
    }

    // -- Generic scaffolding used by Transport-level tests ---------------

    /// Mock any GET to `path_str` returning 200 with an empty JSON object.
    pub async fn mock_ok_marker(&self, path_str: &str) {
        Mock::given(method("GET"))
            .and(path(path_str))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&self.server)
            .await;
    }

    /// Mock any GET to `path_str` returning 500, unconditionally (used to
    /// exercise retry exhaustion and failover).
    pub async fn mock_server_error(&self, path_str: &str) {
        Mock::given(method("GET"))
            .and(path(path_str))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
            .mount(&self.server)
            .await;
    }

    /// Mock any GET to `path_str` returning 401.
    pub async fn mock_unauthorized(&self, path_str: &str) {
        Mock::given(method("GET"))
            .and(path(path_str))
            .respond_with(super::responses::unauthorized())
            .mount(&self.server)
            .await;
    }

    // -- Config version / bundle ------------------------------------------

    fn cluster_prefix(tenant: &str, cluster: &str) -> String {
        format!("/api/v1/tenants/{tenant}/clusters/{cluster}")
    }

    pub async fn mock_latest_version(&self, tenant: &str, cluster: &str, version: u64) {
        let p = format!("{}/config/version", Self::cluster_prefix(tenant, cluster));
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": version})))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_download_bundle(&self, tenant: &str, cluster: &str, bundle: &[u8], new_version: u64) {
        let p = format!("{}/config/bundle", Self::cluster_prefix(tenant, cluster));
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(CONFIG_VERSION_HEADER, new_version.to_string().as_str())
                    .set_body_bytes(bundle.to_vec()),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mock_bundle_not_modified(&self, tenant: &str, cluster: &str) {
        let p = format!("{}/config/bundle", Self::cluster_prefix(tenant, cluster));
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(304))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_upload_bundle(&self, tenant: &str, cluster: &str, new_version: u64) {
        let p = format!("{}/config/bundle", Self::cluster_prefix(tenant, cluster));
        Mock::given(method("POST"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": new_version})))
            .mount(&self.server)
            .await;
    }

    // -- Node / cluster management ----------------------------------------

    pub async fn mock_nodes_list(&self, tenant: &str, cluster: &str, nodes: Vec<Value>) {
        let total = nodes.len() as u64;
        let p = format!("{}/nodes", Self::cluster_prefix(tenant, cluster));
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": nodes,
                "page": 0,
                "page_size": total.max(1),
                "total": total,
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_create_node(&self, tenant: &str, cluster: &str, response: Value) {
        let p = format!("{}/nodes", Self::cluster_prefix(tenant, cluster));
        Mock::given(method("POST"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(201).set_body_json(response))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_cluster_replicas(&self, tenant: &str, cluster: &str, replicas: Vec<Value>) {
        let p = format!("{}/replicas", Self::cluster_prefix(tenant, cluster));
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_json(replicas))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_topology(&self, tenant: &str, cluster: &str, topology: Value) {
        let p = format!("{}/topology", Self::cluster_prefix(tenant, cluster));
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_json(topology))
            .mount(&self.server)
            .await;
    }

    /// Mock any request to a not-found path pattern.
    pub async fn mock_not_found(&self, path_pattern: &str) {
        Mock::given(method("GET"))
            .and(path_regex(path_pattern))
            .respond_with(super::responses::not_found("resource not found"))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock that only matches a specific `current_version` query
    /// parameter, for scenario coverage that distinguishes repeated polls.
    pub async fn mock_download_bundle_for_version(
        &self,
        tenant: &str,
        cluster: &str,
        current_version: u64,
        bundle: &[u8],
        new_version: u64,
    ) {
        let p = format!("{}/config/bundle", Self::cluster_prefix(tenant, cluster));
        Mock::given(method("GET"))
            .and(path(p))
            .and(query_param("current_version", current_version.to_string()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(CONFIG_VERSION_HEADER, new_version.to_string().as_str())
                    .set_body_bytes(bundle.to_vec()),
            )
            .mount(&self.server)
            .await;
    }
}
