//! Typed control-plane RPCs layered over [`crate::transport::Transport`].
//!
//! Grounded on `redis-enterprise`'s per-resource handler pattern
//! (`NodeHandler`, `ClusterHandler`, ...): each handle wraps a `Transport`
//! plus the path prefix for its resource, one method per endpoint, auth
//! mode and `preferMaster` chosen per spec.md §4.3's table.

pub mod bundle_io;
pub mod nodes;
pub mod types;

pub use bundle_io::DownloadOutcome;
pub use nodes::{ClusterHandle, NodeHandle};
pub use types::{
    CheckMasterResponse, CreateNodeRequest, CreateNodeResponse, NodeRouteSet, NodeSummary, Page,
    ReplicaRecord, RotateTokenResponse, TopologyResponse,
};
