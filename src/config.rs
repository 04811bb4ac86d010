//! Configuration data contracts
//!
//! ## Overview
//! - `ClientConfig` configures one `Transport`: base URLs, tenant/cluster ids,
//!   credentials, retry/timeout knobs.
//! - `AgentConfig`/`ClusterConfig` are the data contract a collaborator's
//!   config-file loader must produce before calling `Manager::new` — this
//!   crate only validates the in-memory shape, it does not read or parse
//!   configuration files.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{AgentError, Result};

/// Minimum acceptable length, in bytes, for a node or cluster token.
pub const MIN_TOKEN_LEN: usize = 16;

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_WAIT_MIN: Duration = Duration::from_secs(1);
const DEFAULT_RETRY_WAIT_MAX: Duration = Duration::from_secs(30);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport configuration for one cluster's connection to the control plane.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_urls: Vec<String>,
    pub tenant_id: String,
    pub cluster_id: String,
    pub node_id: Option<String>,
    pub node_token: Option<String>,
    pub cluster_token: Option<String>,
    pub retry_attempts: u32,
    pub retry_wait_min: Duration,
    pub retry_wait_max: Duration,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for `ClientConfig`; validates spec.md §3 invariants in `build()`.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    base_urls: Vec<String>,
    tenant_id: String,
    cluster_id: String,
    node_id: Option<String>,
    node_token: Option<String>,
    cluster_token: Option<String>,
    retry_attempts: Option<u32>,
    retry_wait_min: Option<Duration>,
    retry_wait_max: Option<Duration>,
    request_timeout: Option<Duration>,
}

impl ClientConfigBuilder {
    pub fn base_urls(mut self, urls: Vec<String>) -> Self {
        self.base_urls = urls;
        self
    }

    pub fn tenant_id(mut self, id: impl Into<String>) -> Self {
        self.tenant_id = id.into();
        self
    }

    pub fn cluster_id(mut self, id: impl Into<String>) -> Self {
        self.cluster_id = id.into();
        self
    }

    pub fn node_id(mut self, id: Option<String>) -> Self {
        self.node_id = id;
        self
    }

    pub fn node_token(mut self, token: Option<String>) -> Self {
        self.node_token = token;
        self
    }

    pub fn cluster_token(mut self, token: Option<String>) -> Self {
        self.cluster_token = token;
        self
    }

    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    pub fn retry_wait_min(mut self, wait: Duration) -> Self {
        self.retry_wait_min = Some(wait);
        self
    }

    pub fn retry_wait_max(mut self, wait: Duration) -> Self {
        self.retry_wait_max = Some(wait);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Build the config, validating spec.md §3 invariants:
    /// at least one URL (each `http`/`https`, trailing slash stripped),
    /// non-empty tenant/cluster ids, `retry_wait_min <= retry_wait_max`.
    pub fn build(self) -> Result<ClientConfig> {
        if self.base_urls.is_empty() {
            return Err(AgentError::InvalidConfig(
                "at least one base URL is required".into(),
            ));
        }
        let mut base_urls = Vec::with_capacity(self.base_urls.len());
        for raw in &self.base_urls {
            let parsed = Url::parse(raw)
                .map_err(|e| AgentError::InvalidConfig(format!("invalid base URL {raw}: {e}")))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(AgentError::InvalidConfig(format!(
                    "base URL {raw} must use http or https"
                )));
            }
            base_urls.push(raw.trim_end_matches('/').to_string());
        }
        if self.tenant_id.is_empty() {
            return Err(AgentError::InvalidConfig("tenant_id is required".into()));
        }
        if self.cluster_id.is_empty() {
            return Err(AgentError::InvalidConfig("cluster_id is required".into()));
        }
        let retry_wait_min = self.retry_wait_min.unwrap_or(DEFAULT_RETRY_WAIT_MIN);
        let retry_wait_max = self.retry_wait_max.unwrap_or(DEFAULT_RETRY_WAIT_MAX);
        if retry_wait_min > retry_wait_max {
            return Err(AgentError::InvalidConfig(
                "retry_wait_min must be <= retry_wait_max".into(),
            ));
        }
        Ok(ClientConfig {
            base_urls,
            tenant_id: self.tenant_id,
            cluster_id: self.cluster_id,
            node_id: self.node_id,
            node_token: self.node_token,
            cluster_token: self.cluster_token,
            retry_attempts: self.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS),
            retry_wait_min,
            retry_wait_max,
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        })
    }
}

/// One cluster membership this host's agent must keep supervised and configured.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub name: String,
    pub tenant_id: String,
    pub cluster_id: String,
    pub node_id: String,
    pub node_token: String,
    pub cluster_token: Option<String>,
    pub config_dir: PathBuf,
    pub overlay_binary: String,
    pub poll_interval: Duration,
    pub health_check_interval: Duration,
    pub graceful_timeout: Duration,
    pub success_threshold: Duration,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl ClusterConfig {
    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AgentError::InvalidConfig("cluster name is required".into()));
        }
        if self.tenant_id.is_empty() || self.cluster_id.is_empty() || self.node_id.is_empty() {
            return Err(AgentError::InvalidConfig(format!(
                "cluster {}: tenant_id/cluster_id/node_id must be non-empty",
                self.name
            )));
        }
        if self.node_token.len() < MIN_TOKEN_LEN {
            return Err(AgentError::InvalidConfig(format!(
                "cluster {}: node_token must be at least {MIN_TOKEN_LEN} bytes",
                self.name
            )));
        }
        if let Some(token) = &self.cluster_token {
            if token.len() < MIN_TOKEN_LEN {
                return Err(AgentError::InvalidConfig(format!(
                    "cluster {}: cluster_token must be at least {MIN_TOKEN_LEN} bytes",
                    self.name
                )));
            }
        }
        if !self.config_dir.is_absolute() {
            return Err(AgentError::InvalidConfig(format!(
                "cluster {}: config_dir must be absolute",
                self.name
            )));
        }
        if self.min_backoff > self.max_backoff {
            return Err(AgentError::InvalidConfig(format!(
                "cluster {}: min_backoff must be <= max_backoff",
                self.name
            )));
        }
        Ok(())
    }

    pub fn config_file_path(&self) -> PathBuf {
        self.config_dir.join("config.yml")
    }
}

/// The full set of clusters one host's agent manages, plus the shared
/// control-plane URL list. This is the data contract spec.md §6 describes;
/// reading it from disk is left to the collaborator.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub base_urls: Vec<String>,
    pub clusters: Vec<ClusterConfig>,
}

impl AgentConfig {
    pub fn new(base_urls: Vec<String>, clusters: Vec<ClusterConfig>) -> Result<Self> {
        let cfg = AgentConfig {
            base_urls,
            clusters,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.base_urls.is_empty() {
            return Err(AgentError::InvalidConfig(
                "at least one base URL is required".into(),
            ));
        }
        for raw in &self.base_urls {
            let parsed = Url::parse(raw)
                .map_err(|e| AgentError::InvalidConfig(format!("invalid base URL {raw}: {e}")))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(AgentError::InvalidConfig(format!(
                    "base URL {raw} must use http or https"
                )));
            }
        }
        if self.clusters.is_empty() {
            return Err(AgentError::InvalidConfig(
                "at least one cluster is required".into(),
            ));
        }
        let mut names = std::collections::HashSet::new();
        for cluster in &self.clusters {
            cluster.validate()?;
            if !names.insert(cluster.name.clone()) {
                return Err(AgentError::InvalidConfig(format!(
                    "duplicate cluster name: {}",
                    cluster.name
                )));
            }
        }
        Ok(())
    }

    /// Build the `ClientConfig` a `Transport` for `cluster` should use.
    pub fn client_config_for(&self, cluster: &ClusterConfig) -> Result<ClientConfig> {
        ClientConfig::builder()
            .base_urls(self.base_urls.clone())
            .tenant_id(cluster.tenant_id.clone())
            .cluster_id(cluster.cluster_id.clone())
            .node_id(Some(cluster.node_id.clone()))
            .node_token(Some(cluster.node_token.clone()))
            .cluster_token(cluster.cluster_token.clone())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(name: &str) -> ClusterConfig {
        ClusterConfig {
            name: name.to_string(),
            tenant_id: "tenant-1".into(),
            cluster_id: "cluster-1".into(),
            node_id: "node-1".into(),
            node_token: "0123456789abcdef".into(),
            cluster_token: None,
            config_dir: PathBuf::from("/etc/overlay-agent/cluster-1"),
            overlay_binary: "nebula".into(),
            poll_interval: Duration::from_secs(5),
            health_check_interval: Duration::from_secs(60),
            graceful_timeout: Duration::from_secs(10),
            success_threshold: Duration::from_secs(60),
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }

    #[test]
    fn client_config_strips_trailing_slash() {
        let cfg = ClientConfig::builder()
            .base_urls(vec!["https://a.example.com/".into()])
            .tenant_id("t")
            .cluster_id("c")
            .build()
            .unwrap();
        assert_eq!(cfg.base_urls, vec!["https://a.example.com".to_string()]);
    }

    #[test]
    fn client_config_rejects_empty_urls() {
        let err = ClientConfig::builder()
            .tenant_id("t")
            .cluster_id("c")
            .build()
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfig(_)));
    }

    #[test]
    fn client_config_rejects_bad_scheme() {
        let err = ClientConfig::builder()
            .base_urls(vec!["ftp://a.example.com".into()])
            .tenant_id("t")
            .cluster_id("c")
            .build()
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfig(_)));
    }

    #[test]
    fn client_config_rejects_inverted_retry_window() {
        let err = ClientConfig::builder()
            .base_urls(vec!["https://a.example.com".into()])
            .tenant_id("t")
            .cluster_id("c")
            .retry_wait_min(Duration::from_secs(30))
            .retry_wait_max(Duration::from_secs(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfig(_)));
    }

    #[test]
    fn agent_config_rejects_duplicate_cluster_names() {
        let err = AgentConfig::new(
            vec!["https://a.example.com".into()],
            vec![cluster("prod"), cluster("prod")],
        )
        .unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfig(_)));
    }

    #[test]
    fn agent_config_rejects_short_token() {
        let mut c = cluster("prod");
        c.node_token = "short".into();
        let err = AgentConfig::new(vec!["https://a.example.com".into()], vec![c]).unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfig(_)));
    }

    #[test]
    fn agent_config_rejects_relative_config_dir() {
        let mut c = cluster("prod");
        c.config_dir = PathBuf::from("relative/path");
        let err = AgentConfig::new(vec!["https://a.example.com".into()], vec![c]).unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfig(_)));
    }

    #[test]
    fn agent_config_accepts_valid_shape() {
        let cfg = AgentConfig::new(
            vec!["https://a.example.com".into(), "https://b.example.com".into()],
            vec![cluster("prod"), cluster("staging")],
        )
        .unwrap();
        assert_eq!(cfg.clusters.len(), 2);
    }
}
