//! HA-aware HTTP transport: master discovery, sticky-master routing,
//! per-URL retry with full-jitter backoff, and failover across a
//! configured list of control-plane base URLs.
//!
//! ## Overview
//! - [`Transport::discover_master`] probes each base URL in order and caches
//!   the first that claims to be master.
//! - [`Transport::execute`] performs one logical HTTP exchange, retrying a
//!   single URL on transport error or 5xx, then failing over to the next
//!   URL in the list.
//! - The master cache is a single guarded cell; readers never observe a
//!   torn URL.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::auth::AuthMode;
use crate::config::ClientConfig;
use crate::error::{AgentError, Result};

/// Unauthenticated endpoint used for master discovery; returns 2xx iff the
/// queried instance is the master.
pub const CHECK_MASTER_PATH: &str = "/api/v1/check-master";

/// Response header carrying the new config version on a bundle download.
pub const CONFIG_VERSION_HEADER: &str = "X-Config-Version";

/// Unauthenticated endpoint reporting one instance's master status as JSON.
pub const HEALTH_MASTER_PATH: &str = "/health/master";

const MASTER_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Multi-URL HTTP client with master discovery, sticky-master routing,
/// failover, and retry-with-backoff. Cheap to clone: shares its connection
/// pool and master cache across clones.
#[derive(Clone)]
pub struct Transport {
    client: Arc<Client>,
    base_urls: Arc<[String]>,
    master: Arc<Mutex<Option<String>>>,
    config: Arc<ClientConfig>,
}

impl Transport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.base_urls.is_empty() {
            return Err(AgentError::NoBaseUrls);
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AgentError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Transport {
            client: Arc::new(client),
            base_urls: config.base_urls.clone().into(),
            master: Arc::new(Mutex::new(None)),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Currently cached master URL, if any. Never observes a torn value.
    pub fn cached_master(&self) -> Option<String> {
        self.master.lock().expect("master cache mutex poisoned").clone()
    }

    fn set_master(&self, url: String) {
        *self.master.lock().expect("master cache mutex poisoned") = Some(url);
    }

    /// Drop the cached master, e.g. because it just failed a request.
    pub fn clear_master_cache(&self) {
        *self.master.lock().expect("master cache mutex poisoned") = None;
    }

    /// Probe `CHECK_MASTER_PATH` on each base URL in order; the first to
    /// respond 2xx becomes the cached master. Opportunistic: callers may
    /// call this eagerly at startup and tolerate failure.
    pub async fn discover_master(&self, cancel: &CancellationToken) -> Result<()> {
        for base in self.base_urls.iter() {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            let url = format!("{base}{CHECK_MASTER_PATH}");
            let send = self.client.get(&url).timeout(MASTER_DISCOVERY_TIMEOUT).send();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                r = send => r,
            };
            match outcome {
                Ok(resp) if resp.status().is_success() => {
                    debug!(master = %base, "discovered control-plane master");
                    self.set_master(base.clone());
                    return Ok(());
                }
                Ok(resp) => trace!(url = %url, status = %resp.status(), "not master"),
                Err(e) => trace!(url = %url, error = %e, "master probe failed"),
            }
        }
        Err(AgentError::NoMasterFound)
    }

    /// `CheckMaster`: `GET /health/master` on one specific base URL,
    /// bypassing the ordered-failover list entirely — the caller already
    /// knows which instance it wants to ask.
    pub async fn check_master(
        &self,
        base_url: &str,
        cancel: &CancellationToken,
    ) -> Result<crate::operations::types::CheckMasterResponse> {
        let url = format!("{base_url}{HEALTH_MASTER_PATH}");
        let send = self.client.get(&url).send();
        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            r = send => r?,
        };
        parse_json_response(resp).await
    }

    /// Order base URLs per spec.md §4.1: cached master first (if
    /// `prefer_master` and a master is cached), else configured order.
    fn url_order(&self, prefer_master: bool) -> Vec<String> {
        if prefer_master {
            if let Some(master) = self.cached_master() {
                let mut order = Vec::with_capacity(self.base_urls.len());
                order.push(master.clone());
                order.extend(self.base_urls.iter().filter(|u| **u != master).cloned());
                return order;
            }
        }
        self.base_urls.to_vec()
    }

    async fn sleep_backoff(&self, attempt: u32, cancel: &CancellationToken) -> Result<()> {
        let min = self.config.retry_wait_min.as_secs_f64();
        let max = self.config.retry_wait_max.as_secs_f64();
        let cap = (min * 2f64.powi(attempt as i32)).min(max).max(0.0);
        let jittered = if cap <= 0.0 {
            0.0
        } else {
            rand::thread_rng().gen_range(0.0..=cap)
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            _ = tokio::time::sleep(Duration::from_secs_f64(jittered)) => Ok(()),
        }
    }

    /// Perform the retried exchange against a single URL. Returns `Ok` for
    /// any response the caller should interpret (2xx/3xx/4xx, including
    /// 401/429); returns `Err` only once transport errors or 5xx responses
    /// have exhausted `retry_attempts` against this URL — the caller should
    /// treat that as "this URL failed, try the next one".
    async fn attempt_single_url(
        &self,
        base: &str,
        method: Method,
        path: &str,
        body: Option<&[u8]>,
        content_type: &str,
        accept: &str,
        auth: AuthMode,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let url = format!("{base}{path}");
        let mut last_err: Option<AgentError> = None;
        for attempt in 0..=self.config.retry_attempts {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            let mut builder = self
                .client
                .request(method.clone(), &url)
                .header(CONTENT_TYPE, content_type)
                .header(ACCEPT, accept);
            builder = auth.apply(builder, &self.config)?;
            if let Some(bytes) = body {
                builder = builder.body(bytes.to_vec());
            }
            debug!(method = %method, url = %url, attempt, "sending request");
            let send = builder.send();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                r = send => r,
            };
            match outcome {
                Ok(resp) if resp.status().as_u16() >= 500 => {
                    warn!(url = %url, status = %resp.status(), attempt, "server error, may retry");
                    last_err = Some(AgentError::ServerError(resp.status().to_string()));
                }
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    warn!(url = %url, error = %e, attempt, "transport error, may retry");
                    last_err = Some(AgentError::from(e));
                }
            }
            if attempt < self.config.retry_attempts {
                self.sleep_backoff(attempt, cancel).await?;
            }
        }
        Err(last_err.unwrap_or_else(|| AgentError::Transport("retry loop exhausted".into())))
    }

    /// Perform one logical HTTP exchange, trying URLs in `url_order` order
    /// with per-URL retry, failing over on transport error/5xx, and
    /// treating 401/429 as terminal (no failover).
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&[u8]>,
        content_type: &str,
        accept: &str,
        auth: AuthMode,
        prefer_master: bool,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        self.execute_validated(method, path, body, content_type, accept, auth, prefer_master, cancel, None)
            .await
    }

    /// As `execute`, but `validate` runs against a successful (non-304,
    /// non-401/429) response before it is handed to the caller. A `validate`
    /// failure is treated exactly like a transport error or 5xx from this
    /// URL: it fails over to the next URL rather than surfacing to the
    /// caller, so a malformed response header on one instance doesn't sour
    /// the whole call.
    pub async fn execute_validated(
        &self,
        method: Method,
        path: &str,
        body: Option<&[u8]>,
        content_type: &str,
        accept: &str,
        auth: AuthMode,
        prefer_master: bool,
        cancel: &CancellationToken,
        validate: Option<&(dyn Fn(&Response) -> Result<()> + Send + Sync)>,
    ) -> Result<Response> {
        if self.base_urls.is_empty() {
            return Err(AgentError::NoBaseUrls);
        }
        let order = self.url_order(prefer_master);
        let mut last_err: Option<AgentError> = None;
        let mut any_failure = false;
        for base in &order {
            match self
                .attempt_single_url(base, method.clone(), path, body, content_type, accept, auth, cancel)
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::UNAUTHORIZED {
                        return Err(AgentError::Unauthorized);
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        return Err(AgentError::RateLimited);
                    }
                    if let Some(validate) = validate {
                        if let Err(e) = validate(&resp) {
                            warn!(url = %base, error = %e, "response failed validation, trying next URL");
                            any_failure = true;
                            if self.cached_master().as_deref() == Some(base.as_str()) {
                                self.clear_master_cache();
                            }
                            last_err = Some(e);
                            continue;
                        }
                    }
                    return Ok(resp);
                }
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => {
                    any_failure = true;
                    if self.cached_master().as_deref() == Some(base.as_str()) {
                        self.clear_master_cache();
                    }
                    last_err = Some(e);
                }
            }
        }
        if any_failure {
            Err(AgentError::AllInstancesFailed(Box::new(
                last_err.unwrap_or(AgentError::NoBaseUrls),
            )))
        } else {
            Err(AgentError::NoBaseUrls)
        }
    }

    /// `execute` a JSON request and deserialize a JSON success body.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        auth: AuthMode,
        prefer_master: bool,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let bytes = body.map(serde_json::to_vec).transpose()?;
        let resp = self
            .execute(
                method,
                path,
                bytes.as_deref(),
                "application/json",
                "application/json",
                auth,
                prefer_master,
                cancel,
            )
            .await?;
        parse_json_response(resp).await
    }

    /// `execute` a JSON request expecting no response body.
    pub async fn request_empty(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        auth: AuthMode,
        prefer_master: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let bytes = body.map(serde_json::to_vec).transpose()?;
        let resp = self
            .execute(
                method,
                path,
                bytes.as_deref(),
                "application/json",
                "application/json",
                auth,
                prefer_master,
                cancel,
            )
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(map_error_status(resp).await)
        }
    }

    /// `execute` a raw request, returning the response untouched so the
    /// caller can inspect status/headers before deciding how to interpret
    /// the body (used by bundle download's 304 semantics and upload).
    pub async fn request_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<&[u8]>,
        content_type: &str,
        accept: &str,
        auth: AuthMode,
        prefer_master: bool,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        self.execute(method, path, body, content_type, accept, auth, prefer_master, cancel)
            .await
    }

    /// As `request_raw`, but `validate` gets a chance to reject a response
    /// (e.g. a missing or malformed header) and push `execute` on to the
    /// next URL in the failover order instead of returning it.
    pub async fn request_raw_validated(
        &self,
        method: Method,
        path: &str,
        body: Option<&[u8]>,
        content_type: &str,
        accept: &str,
        auth: AuthMode,
        prefer_master: bool,
        cancel: &CancellationToken,
        validate: &(dyn Fn(&Response) -> Result<()> + Send + Sync),
    ) -> Result<Response> {
        self.execute_validated(
            method,
            path,
            body,
            content_type,
            accept,
            auth,
            prefer_master,
            cancel,
            Some(validate),
        )
        .await
    }
}

/// Map a non-2xx, non-401/429 response to the error taxonomy (§7).
pub async fn map_error_status(resp: Response) -> AgentError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    match status.as_u16() {
        404 => AgentError::NotFound,
        409 => AgentError::Conflict(body),
        400..=499 => AgentError::BadRequest(body),
        500..=599 => AgentError::ServerError(body),
        _ => AgentError::BadRequest(body),
    }
}

/// Parse a JSON success body with `serde_path_to_error`, or map the status
/// to the error taxonomy.
pub async fn parse_json_response<T: DeserializeOwned>(resp: Response) -> Result<T> {
    if resp.status().is_success() {
        let bytes = resp.bytes().await?;
        let de = &mut serde_json::Deserializer::from_slice(&bytes);
        serde_path_to_error::deserialize(de).map_err(|err| AgentError::ParseError {
            path: err.path().to_string(),
            message: err.inner().to_string(),
        })
    } else {
        Err(map_error_status(resp).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockControlPlane;
    use std::time::Duration as StdDuration;

    fn token_config(server: &MockControlPlane) -> ClientConfig {
        ClientConfig::builder()
            .base_urls(vec![server.uri()])
            .tenant_id("t1")
            .cluster_id("c1")
            .node_token(Some("0123456789abcdef".into()))
            .retry_attempts(2)
            .retry_wait_min(StdDuration::from_millis(1))
            .retry_wait_max(StdDuration::from_millis(5))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn discover_master_caches_first_success() {
        let server = MockControlPlane::start().await;
        server.mock_check_master(true).await;
        let transport = Transport::new(token_config(&server)).unwrap();
        let cancel = CancellationToken::new();
        transport.discover_master(&cancel).await.unwrap();
        assert_eq!(transport.cached_master(), Some(server.uri()));
    }

    #[tokio::test]
    async fn discover_master_fails_when_none_are_master() {
        let server = MockControlPlane::start().await;
        server.mock_check_master(false).await;
        let transport = Transport::new(token_config(&server)).unwrap();
        let cancel = CancellationToken::new();
        let err = transport.discover_master(&cancel).await.unwrap_err();
        assert!(matches!(err, AgentError::NoMasterFound));
    }

    #[tokio::test]
    async fn missing_auth_fails_before_sending() {
        let server = MockControlPlane::start().await;
        let cfg = ClientConfig::builder()
            .base_urls(vec![server.uri()])
            .tenant_id("t1")
            .cluster_id("c1")
            .build()
            .unwrap();
        let transport = Transport::new(cfg).unwrap();
        let cancel = CancellationToken::new();
        let err = transport
            .execute(
                Method::GET,
                "/api/v1/tenants/t1/clusters/c1/nodes",
                None,
                "application/json",
                "application/json",
                AuthMode::Cluster,
                false,
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::MissingAuth(AuthMode::Cluster)));
    }

    #[tokio::test]
    async fn p1_prefer_master_tries_cached_master_first() {
        let a = MockControlPlane::start().await;
        let b = MockControlPlane::start().await;
        b.mock_ok_marker("/marker").await;
        let cfg = ClientConfig::builder()
            .base_urls(vec![a.uri(), b.uri()])
            .tenant_id("t1")
            .cluster_id("c1")
            .node_token(Some("0123456789abcdef".into()))
            .retry_attempts(0)
            .build()
            .unwrap();
        let transport = Transport::new(cfg).unwrap();
        // Force the cache to point at `b`, which is not first in base_urls.
        transport.set_master(b.uri());
        let cancel = CancellationToken::new();
        let resp = transport
            .execute(
                Method::GET,
                "/marker",
                None,
                "application/json",
                "application/json",
                AuthMode::Node,
                true,
                &cancel,
            )
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert_eq!(a.received_requests().await.len(), 0);
    }

    #[tokio::test]
    async fn p1_no_prefer_master_tries_configured_first() {
        let a = MockControlPlane::start().await;
        let b = MockControlPlane::start().await;
        a.mock_ok_marker("/marker").await;
        let cfg = ClientConfig::builder()
            .base_urls(vec![a.uri(), b.uri()])
            .tenant_id("t1")
            .cluster_id("c1")
            .node_token(Some("0123456789abcdef".into()))
            .retry_attempts(0)
            .build()
            .unwrap();
        let transport = Transport::new(cfg).unwrap();
        transport.set_master(b.uri());
        let cancel = CancellationToken::new();
        let resp = transport
            .execute(
                Method::GET,
                "/marker",
                None,
                "application/json",
                "application/json",
                AuthMode::Node,
                false,
                &cancel,
            )
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert_eq!(b.received_requests().await.len(), 0);
    }

    #[tokio::test]
    async fn p2_master_cache_cleared_on_master_failure() {
        let a = MockControlPlane::start().await;
        let b = MockControlPlane::start().await;
        a.mock_server_error("/marker").await;
        b.mock_ok_marker("/marker").await;
        let cfg = ClientConfig::builder()
            .base_urls(vec![a.uri(), b.uri()])
            .tenant_id("t1")
            .cluster_id("c1")
            .node_token(Some("0123456789abcdef".into()))
            .retry_attempts(0)
            .retry_wait_min(StdDuration::from_millis(1))
            .retry_wait_max(StdDuration::from_millis(1))
            .build()
            .unwrap();
        let transport = Transport::new(cfg).unwrap();
        transport.set_master(a.uri());
        let cancel = CancellationToken::new();
        let resp = transport
            .execute(
                Method::GET,
                "/marker",
                None,
                "application/json",
                "application/json",
                AuthMode::Node,
                true,
                &cancel,
            )
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert_eq!(transport.cached_master(), None);
    }

    #[tokio::test]
    async fn p3_retries_exactly_attempts_plus_one_times() {
        let server = MockControlPlane::start().await;
        server.mock_server_error("/marker").await;
        let cfg = ClientConfig::builder()
            .base_urls(vec![server.uri()])
            .tenant_id("t1")
            .cluster_id("c1")
            .node_token(Some("0123456789abcdef".into()))
            .retry_attempts(3)
            .retry_wait_min(StdDuration::from_millis(1))
            .retry_wait_max(StdDuration::from_millis(1))
            .build()
            .unwrap();
        let transport = Transport::new(cfg).unwrap();
        let cancel = CancellationToken::new();
        let err = transport
            .execute(
                Method::GET,
                "/marker",
                None,
                "application/json",
                "application/json",
                AuthMode::Node,
                false,
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::AllInstancesFailed(_)));
        assert_eq!(server.received_requests().await.len(), 4);
    }

    #[tokio::test]
    async fn terminal_errors_do_not_fail_over() {
        let a = MockControlPlane::start().await;
        let b = MockControlPlane::start().await;
        a.mock_unauthorized("/marker").await;
        let cfg = ClientConfig::builder()
            .base_urls(vec![a.uri(), b.uri()])
            .tenant_id("t1")
            .cluster_id("c1")
            .node_token(Some("0123456789abcdef".into()))
            .build()
            .unwrap();
        let transport = Transport::new(cfg).unwrap();
        let cancel = CancellationToken::new();
        let err = transport
            .execute(
                Method::GET,
                "/marker",
                None,
                "application/json",
                "application/json",
                AuthMode::Node,
                false,
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Unauthorized));
        assert_eq!(b.received_requests().await.len(), 0);
    }

    #[tokio::test]
    async fn empty_base_urls_returns_no_base_urls() {
        let err = ClientConfig::builder()
            .tenant_id("t1")
            .cluster_id("c1")
            .build()
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfig(_)));
    }
}
