//! Node-scoped operations, authenticated with the node's own token.
//!
//! Grounded on `redis-enterprise`'s `NodeHandler`/`BdbHandler` handle
//! pattern: a thin struct wrapping a transport plus the path prefix for
//! this resource, one method per endpoint.

use async_stream::stream;
use futures::Stream;
use reqwest::Method;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthMode;
use crate::error::{AgentError, Result};
use crate::operations::types::{
    NodeRouteSet, Page, RegisterRoutesRequest, TopologyResponse,
};
use crate::transport::Transport;

/// Node-authenticated operations: the config/bundle version surface, the
/// node's own routes, and cluster topology as seen by this node.
#[derive(Clone)]
pub struct NodeHandle {
    transport: Transport,
    tenant_id: String,
    cluster_id: String,
    node_id: String,
}

impl NodeHandle {
    pub fn new(transport: Transport, tenant_id: impl Into<String>, cluster_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        NodeHandle {
            transport,
            tenant_id: tenant_id.into(),
            cluster_id: cluster_id.into(),
            node_id: node_id.into(),
        }
    }

    pub(crate) fn prefix(&self) -> String {
        format!(
            "/api/v1/tenants/{}/clusters/{}",
            self.tenant_id, self.cluster_id
        )
    }

    pub(crate) fn transport(&self) -> &Transport {
        &self.transport
    }

    /// `GET .../config/version`
    pub async fn get_latest_version(&self, cancel: &CancellationToken) -> Result<u64> {
        #[derive(serde::Deserialize)]
        struct VersionResponse {
            version: u64,
        }
        let path = format!("{}/config/version", self.prefix());
        let resp: VersionResponse = self
            .transport
            .request_json(Method::GET, &path, None, AuthMode::Node, false, cancel)
            .await?;
        Ok(resp.version)
    }

    /// `PUT .../nodes/{self}/routes`
    pub async fn register_routes(&self, routes: Vec<String>, cancel: &CancellationToken) -> Result<()> {
        let path = format!("{}/nodes/{}/routes", self.prefix(), self.node_id);
        let body = serde_json::to_value(RegisterRoutesRequest { routes })?;
        self.transport
            .request_empty(Method::PUT, &path, Some(&body), AuthMode::Node, true, cancel)
            .await
    }

    /// `GET .../nodes/{self}/routes`
    pub async fn get_routes(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        #[derive(serde::Deserialize)]
        struct RoutesResponse {
            routes: Vec<String>,
        }
        let path = format!("{}/nodes/{}/routes", self.prefix(), self.node_id);
        let resp: RoutesResponse = self
            .transport
            .request_json(Method::GET, &path, None, AuthMode::Node, false, cancel)
            .await?;
        Ok(resp.routes)
    }

    /// `GET .../topology`
    pub async fn get_topology(&self, cancel: &CancellationToken) -> Result<TopologyResponse> {
        let path = format!("{}/topology", self.prefix());
        self.transport
            .request_json(Method::GET, &path, None, AuthMode::Node, false, cancel)
            .await
    }
}

/// Cluster-authenticated node management: create/delete/list nodes, MTU,
/// per-node token rotation, cluster-wide route listing, and role flags.
#[derive(Clone)]
pub struct ClusterHandle {
    transport: Transport,
    tenant_id: String,
    cluster_id: String,
}

impl ClusterHandle {
    pub fn new(transport: Transport, tenant_id: impl Into<String>, cluster_id: impl Into<String>) -> Self {
        ClusterHandle {
            transport,
            tenant_id: tenant_id.into(),
            cluster_id: cluster_id.into(),
        }
    }

    fn prefix(&self) -> String {
        format!(
            "/api/v1/tenants/{}/clusters/{}",
            self.tenant_id, self.cluster_id
        )
    }

    /// `POST .../nodes`
    pub async fn create_node(
        &self,
        request: &crate::operations::types::CreateNodeRequest,
        cancel: &CancellationToken,
    ) -> Result<crate::operations::types::CreateNodeResponse> {
        let path = format!("{}/nodes", self.prefix());
        let body = serde_json::to_value(request)?;
        self.transport
            .request_json(Method::POST, &path, Some(&body), AuthMode::Cluster, true, cancel)
            .await
    }

    /// `DELETE .../nodes/{n}`
    pub async fn delete_node(&self, node_id: &str, cancel: &CancellationToken) -> Result<()> {
        let path = format!("{}/nodes/{}", self.prefix(), node_id);
        self.transport
            .request_empty(Method::DELETE, &path, None, AuthMode::Cluster, true, cancel)
            .await
    }

    /// `GET .../nodes?page=&page_size=`
    pub async fn list_nodes(
        &self,
        page: u32,
        page_size: u32,
        cancel: &CancellationToken,
    ) -> Result<Page<crate::operations::types::NodeSummary>> {
        let query = crate::operations::types::ListNodesQuery { page, page_size };
        let qs = serde_urlencoded::to_string(&query)
            .map_err(|e| AgentError::InvalidConfig(format!("failed to encode query: {e}")))?;
        let path = format!("{}/nodes?{qs}", self.prefix());
        self.transport
            .request_json(Method::GET, &path, None, AuthMode::Cluster, false, cancel)
            .await
    }

    /// Stream every node across all pages, fetching one page at a time.
    pub fn list_all_nodes<'a>(
        &'a self,
        page_size: u32,
        cancel: &'a CancellationToken,
    ) -> impl Stream<Item = Result<crate::operations::types::NodeSummary>> + 'a {
        stream! {
            let mut page = 0;
            loop {
                let batch = match self.list_nodes(page, page_size, cancel).await {
                    Ok(p) => p,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                let is_last = batch.is_last_page();
                for item in batch.items {
                    yield Ok(item);
                }
                if is_last {
                    return;
                }
                page += 1;
            }
        }
    }

    /// `PUT .../nodes/{n}/mtu`
    pub async fn update_mtu(
        &self,
        node_id: &str,
        mtu: u32,
        cancel: &CancellationToken,
    ) -> Result<crate::operations::types::NodeSummary> {
        #[derive(serde::Serialize)]
        struct MtuRequest {
            mtu: u32,
        }
        let path = format!("{}/nodes/{}/mtu", self.prefix(), node_id);
        let body = serde_json::to_value(MtuRequest { mtu })?;
        self.transport
            .request_json(Method::PUT, &path, Some(&body), AuthMode::Cluster, true, cancel)
            .await
    }

    /// `POST .../nodes/{n}/rotate-token`
    pub async fn rotate_node_token(
        &self,
        node_id: &str,
        cancel: &CancellationToken,
    ) -> Result<crate::operations::types::RotateTokenResponse> {
        let path = format!("{}/nodes/{}/rotate-token", self.prefix(), node_id);
        self.transport
            .request_json(Method::POST, &path, None, AuthMode::Cluster, true, cancel)
            .await
    }

    /// `POST .../rotate-token`
    pub async fn rotate_cluster_token(
        &self,
        cancel: &CancellationToken,
    ) -> Result<crate::operations::types::RotateTokenResponse> {
        let path = format!("{}/rotate-token", self.prefix());
        self.transport
            .request_json(Method::POST, &path, None, AuthMode::Cluster, true, cancel)
            .await
    }

    /// `GET .../routes`
    pub async fn list_cluster_routes(&self, cancel: &CancellationToken) -> Result<Vec<NodeRouteSet>> {
        let path = format!("{}/routes", self.prefix());
        self.transport
            .request_json(Method::GET, &path, None, AuthMode::Cluster, false, cancel)
            .await
    }

    /// `PUT .../nodes/{n}/lighthouse`
    pub async fn set_lighthouse(&self, node_id: &str, enabled: bool, cancel: &CancellationToken) -> Result<()> {
        self.set_role_flag(node_id, "lighthouse", enabled, cancel).await
    }

    /// `PUT .../nodes/{n}/relay`
    pub async fn set_relay(&self, node_id: &str, enabled: bool, cancel: &CancellationToken) -> Result<()> {
        self.set_role_flag(node_id, "relay", enabled, cancel).await
    }

    async fn set_role_flag(
        &self,
        node_id: &str,
        role: &str,
        enabled: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        #[derive(serde::Serialize)]
        struct RoleFlagRequest {
            enabled: bool,
        }
        let path = format!("{}/nodes/{}/{}", self.prefix(), node_id, role);
        let body = serde_json::to_value(RoleFlagRequest { enabled })?;
        self.transport
            .request_empty(Method::PUT, &path, Some(&body), AuthMode::Cluster, true, cancel)
            .await
    }

    /// `GET .../replicas`
    pub async fn get_cluster_replicas(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<crate::operations::types::ReplicaRecord>> {
        let path = format!("{}/replicas", self.prefix());
        self.transport
            .request_json(Method::GET, &path, None, AuthMode::Cluster, false, cancel)
            .await
    }
}
