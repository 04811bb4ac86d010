//! Testing utilities for consumers of `overlay_agent`, and for this
//! crate's own test suite.
//!
//! Grounded on `redis-enterprise::testing`: a `wiremock`-backed mock
//! server plus builder-pattern fixtures and response helpers, gated
//! behind the `test-support` feature (and always available to this
//! crate's own `#[cfg(test)]` modules).
//!
//! # Quick Start
//!
//! ```ignore
//! use overlay_agent::testing::{MockControlPlane, fixtures, responses};
//!
//! #[tokio::test]
//! async fn test_poll_applies_new_bundle() {
//!     let server = MockControlPlane::start().await;
//!     server.mock_latest_version("tenant", "cluster", 1).await;
//!     server.mock_download_bundle("tenant", "cluster", &fixtures::bundle_bytes(&[]), 1).await;
//!     // ... build a NodeHandle against server.uri() and drive Poller::check_once
//! }
//! ```

pub mod fixtures;
pub mod responses;
pub mod server;

pub use server::MockControlPlane;

pub use wiremock::{
    matchers::{body_json, method, path, path_regex},
    Mock, MockServer, ResponseTemplate,
};
