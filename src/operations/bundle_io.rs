//! Bundle transfer: `DownloadBundle` (conditional, §6) and `UploadBundle`.
//!
//! Kept separate from `src/bundle.rs` (`BundleStore`, which validates and
//! extracts bundle bytes to disk) — this module only moves opaque bytes
//! across the wire.

use reqwest::{Method, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::auth::AuthMode;
use crate::error::{AgentError, Result};
use crate::operations::nodes::NodeHandle;
use crate::transport::CONFIG_VERSION_HEADER;

/// Outcome of a conditional bundle download.
pub enum DownloadOutcome {
    /// Server returned 304; the caller's current version is still current.
    NotModified { current_version: u64 },
    /// Server returned a new bundle and the version it represents.
    Bundle { data: Vec<u8>, version: u64 },
}

/// Extract and parse `X-Config-Version` from a bundle-download response.
/// Only meaningful for a successful (non-304) response.
fn parse_config_version_header(resp: &reqwest::Response) -> Result<u64> {
    resp.headers()
        .get(CONFIG_VERSION_HEADER)
        .ok_or_else(|| AgentError::ParseError {
            path: CONFIG_VERSION_HEADER.to_string(),
            message: "missing response header".to_string(),
        })?
        .to_str()
        .map_err(|e| AgentError::ParseError {
            path: CONFIG_VERSION_HEADER.to_string(),
            message: e.to_string(),
        })?
        .parse::<u64>()
        .map_err(|e| AgentError::ParseError {
            path: CONFIG_VERSION_HEADER.to_string(),
            message: e.to_string(),
        })
}

impl NodeHandle {
    /// `GET .../config/bundle?current_version=v`
    ///
    /// A missing or unparseable `X-Config-Version` header on an otherwise
    /// successful response is treated as this instance's failure to serve
    /// the request, not a terminal error: `Transport` fails over to the
    /// next base URL instead of surfacing it to the `Poller`.
    pub async fn download_bundle(
        &self,
        current_version: u64,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome> {
        let path = format!(
            "{}/config/bundle?current_version={current_version}",
            self.prefix()
        );
        let resp = self
            .transport()
            .request_raw_validated(
                Method::GET,
                &path,
                None,
                "application/json",
                "application/octet-stream",
                AuthMode::Node,
                false,
                cancel,
                &|resp| {
                    if resp.status().is_success() {
                        parse_config_version_header(resp).map(|_| ())
                    } else {
                        Ok(())
                    }
                },
            )
            .await?;
        match resp.status() {
            StatusCode::NOT_MODIFIED => Ok(DownloadOutcome::NotModified { current_version }),
            status if status.is_success() => {
                let version = parse_config_version_header(&resp)?;
                let data = resp.bytes().await?.to_vec();
                Ok(DownloadOutcome::Bundle { data, version })
            }
            _ => Err(crate::transport::map_error_status(resp).await),
        }
    }

    /// `POST .../config/bundle`, `Content-Type: application/octet-stream`.
    pub async fn upload_bundle(&self, bundle: &[u8], cancel: &CancellationToken) -> Result<u64> {
        #[derive(serde::Deserialize)]
        struct UploadResponse {
            version: u64,
        }
        let path = format!("{}/config/bundle", self.prefix());
        let resp = self
            .transport()
            .request_raw(
                Method::POST,
                &path,
                Some(bundle),
                "application/octet-stream",
                "application/json",
                AuthMode::Node,
                true,
                cancel,
            )
            .await?;
        let parsed: UploadResponse = crate::transport::parse_json_response(resp).await?;
        Ok(parsed.version)
    }
}
