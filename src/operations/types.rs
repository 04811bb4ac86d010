//! DTOs shared across operation handles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// A single page of a paginated listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn is_last_page(&self) -> bool {
        (self.page as u64 + 1) * self.page_size as u64 >= self.total
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSummary {
    pub node_id: String,
    pub address: Option<String>,
    pub mtu: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateNodeResponse {
    pub node_id: String,
    /// Returned only at creation time; never retrievable again.
    pub node_token: String,
    pub address: Option<String>,
}

/// # Examples
///
/// ```
/// use overlay_agent::operations::CreateNodeRequest;
///
/// let request = CreateNodeRequest::builder().address("10.10.0.5").mtu(1400).build();
/// ```
#[derive(Debug, Clone, Serialize, TypedBuilder)]
pub struct CreateNodeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(into, strip_option))]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub mtu: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RotateTokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicaRecord {
    pub id: String,
    pub role: String,
    pub address: String,
    pub last_heartbeat: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopologyResponse {
    pub lighthouses: Vec<String>,
    pub relays: Vec<String>,
    pub routes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeRouteSet {
    pub node_id: String,
    pub routes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRoutesRequest {
    pub routes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckMasterResponse {
    pub is_master: bool,
    pub instance_id: String,
    pub master_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ListNodesQuery {
    pub page: u32,
    pub page_size: u32,
}
