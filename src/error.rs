//! Error types for the transport, operations, and agent components

use thiserror::Error;

use crate::auth::AuthMode;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no base URLs configured")]
    NoBaseUrls,

    #[error("missing credential for auth mode {0:?}")]
    MissingAuth(AuthMode),

    #[error("master discovery exhausted all base URLs")]
    NoMasterFound,

    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limited")]
    RateLimited,

    #[error("resource not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("all base URLs failed, last error: {0}")]
    AllInstancesFailed(Box<AgentError>),

    #[error("failed to parse response at '{path}': {message}")]
    ParseError { path: String, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("invalid bundle: {0}")]
    BundleInvalid(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::ParseError {
            path: "$".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::Io(err.to_string())
    }
}

impl AgentError {
    /// Terminal errors must not trigger failover to the next base URL.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentError::Unauthorized
                | AgentError::RateLimited
                | AgentError::MissingAuth(_)
                | AgentError::Cancelled
        )
    }

    /// Only transport-level or 5xx failures are retry/failover-eligible.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::Transport(_) | AgentError::ServerError(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AgentError::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
