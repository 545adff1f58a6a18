//! Typed error hierarchy for the gateway. Use at module boundaries (pairing,
//! routing, admin, config). Leaf/internal functions keep returning
//! `anyhow::Result` and convert at the boundary via `?`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unknown channel type: {0}")]
    UnknownChannelType(String),

    #[error("adapter '{name}' failed to start: {message}")]
    AdapterStartFailure { name: String, message: String },

    #[error("send failed on channel '{channel}': {message}")]
    SendFailure { channel: String, message: String },

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("sender not approved yet")]
    NotApprovedYet,

    #[error("backend call failed: {0}")]
    BackendFailure(String),

    #[error("authorization denied")]
    AuthorizationDenied,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Whether the core may reasonably retry the operation that produced
    /// this error. The core itself never retries (per design), but callers
    /// composing their own policy can consult this.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::SendFailure { .. } | GatewayError::BackendFailure(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
