//! Per-request credential selection
//!
//! ## Overview
//! - Three modes: no credential, node-scoped token, cluster-scoped token
//! - Missing-credential failures are local preconditions, never a server round-trip

use reqwest::RequestBuilder;

use crate::config::ClientConfig;
use crate::error::{AgentError, Result};

/// Wire header carrying the node-scoped token.
pub const NODE_TOKEN_HEADER: &str = "X-Node-Token";
/// Wire header carrying the cluster-scoped token.
pub const CLUSTER_TOKEN_HEADER: &str = "X-Cluster-Token";

/// Selects which credential, if any, a request must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// No credential attached (e.g. master-check probes).
    None,
    /// Node token attached.
    Node,
    /// Cluster token attached.
    Cluster,
}

impl AuthMode {
    /// Attach the selected credential to `builder`, or fail with
    /// `MissingAuth` before any request is sent.
    pub fn apply(self, builder: RequestBuilder, config: &ClientConfig) -> Result<RequestBuilder> {
        match self {
            AuthMode::None => Ok(builder),
            AuthMode::Node => {
                let token = config
                    .node_token
                    .as_deref()
                    .ok_or(AgentError::MissingAuth(self))?;
                Ok(builder.header(NODE_TOKEN_HEADER, token))
            }
            AuthMode::Cluster => {
                let token = config
                    .cluster_token
                    .as_deref()
                    .ok_or(AgentError::MissingAuth(self))?;
                Ok(builder.header(CLUSTER_TOKEN_HEADER, token))
            }
        }
    }
}
