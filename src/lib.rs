//! Per-host overlay-network agent: control-plane SDK and process supervisor
//!
//! `overlay-agent` is the host-side counterpart to an overlay-network
//! control plane. For each cluster a host belongs to, it keeps one overlay
//! data-plane process (e.g. a mesh VPN daemon) running under supervision,
//! polls the control plane for configuration updates, and periodically
//! checks cluster health.
//!
//! # Features
//!
//! - **HA-aware transport**: master discovery, sticky-master routing,
//!   per-URL retry with full-jitter backoff, and failover across a
//!   configured list of control-plane base URLs.
//! - **Typed operations**: node- and cluster-scoped control-plane calls,
//!   each carrying the auth mode its endpoint requires.
//! - **Atomic config bundles**: gzip+tar bundle validation, staged
//!   extraction, and atomic directory swap with rollback on failure.
//! - **Process supervision**: crash-restart with exponential backoff,
//!   coalesced restart requests, graceful SIGTERM→SIGKILL shutdown.
//! - **Health monitoring**: periodic replica probes publishing a live
//!   degraded/healthy snapshot.
//!
//! # Quick Start
//!
//! ```no_run
//! use overlay_agent::{AgentConfig, ClusterConfig, Manager};
//! use tokio_util::sync::CancellationToken;
//! use std::path::PathBuf;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cluster = ClusterConfig {
//!     name: "prod".into(),
//!     tenant_id: "acme".into(),
//!     cluster_id: "mesh-1".into(),
//!     node_id: "host-42".into(),
//!     node_token: "0123456789abcdef".into(),
//!     cluster_token: None,
//!     config_dir: PathBuf::from("/etc/overlay-agent/mesh-1"),
//!     overlay_binary: "nebula".into(),
//!     poll_interval: Duration::from_secs(5),
//!     health_check_interval: Duration::from_secs(60),
//!     graceful_timeout: Duration::from_secs(10),
//!     success_threshold: Duration::from_secs(60),
//!     min_backoff: Duration::from_secs(1),
//!     max_backoff: Duration::from_secs(60),
//! };
//! let config = AgentConfig::new(vec!["https://control-plane.acme.internal".into()], vec![cluster])?;
//! let manager = Manager::new(config)?;
//! manager.run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - **Transport**: [`transport`] — HA-aware HTTP client; [`auth`] — per-request credential selection
//! - **Operations**: [`operations`] — typed node/cluster control-plane calls
//! - **Config delivery**: [`bundle`] — gzip+tar bundle validate/stage/swap
//! - **Process lifecycle**: [`supervisor`] — child process state machine
//! - **Background loops**: [`poller`] — version polling; [`health`] — replica health probes
//! - **Composition**: [`agent`] — one cluster's full stack; [`manager`] — one process's full set of clusters
//! - **Configuration**: [`config`] — data contract consumed by [`Manager::new`]
//! - **Errors**: [`error`] — the `AgentError` taxonomy
//!
//! # Error Handling
//!
//! ```no_run
//! use overlay_agent::AgentError;
//!
//! fn describe(err: AgentError) {
//!     match err {
//!         AgentError::NotFound => println!("resource not found"),
//!         AgentError::Unauthorized => println!("invalid credentials"),
//!         AgentError::ServerError(msg) => println!("server error: {msg}"),
//!         e if e.is_retryable() => println!("transient: {e}"),
//!         e => println!("unexpected error: {e}"),
//!     }
//! }
//! ```

pub mod agent;
pub mod auth;
pub mod bundle;
pub mod config;
pub mod error;
pub mod health;
pub mod manager;
pub mod operations;
pub mod poller;
pub mod supervisor;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use agent::ClusterAgent;
pub use auth::AuthMode;
pub use bundle::BundleStore;
pub use config::{AgentConfig, ClientConfig, ClusterConfig};
pub use error::{AgentError, Result};
pub use health::{HealthMonitor, HealthState};
pub use manager::Manager;
pub use operations::{ClusterHandle, DownloadOutcome, NodeHandle};
pub use poller::{ApplyBundle, Poller};
pub use supervisor::{Supervisor, SupervisorState};
pub use transport::Transport;
