//! Proxy failure taxonomy (§4.A "Failure semantics"): transport/timeout/5xx
//! are retried by the caller loop in `mod.rs`; protocol, remote, and
//! size-limit are not.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("transport error calling {endpoint}: {cause}")]
    Transport { endpoint: String, cause: String },

    #[error("call to {endpoint} timed out after {seconds}s")]
    Timeout { endpoint: String, seconds: f64 },

    #[error("protocol error from {endpoint}: {message}")]
    Protocol { endpoint: String, message: String },

    #[error("remote error from {endpoint}: {message}")]
    Remote { endpoint: String, message: String },

    #[error("response from {endpoint} exceeded max_response_size ({limit} bytes)")]
    SizeLimit { endpoint: String, limit: u64 },
}

impl CallError {
    /// Transport/timeout/5xx are retryable; protocol, remote, size-limit
    /// are not (§4.A).
    pub fn is_retryable(&self) -> bool {
        matches!(self, CallError::Transport { .. } | CallError::Timeout { .. })
    }
}
