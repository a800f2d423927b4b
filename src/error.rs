// src/error.rs
// Error taxonomy for model backends and the diff engine.
//
// Backend errors are fatal to an invocation (except a mid-chain rate limit,
// which the gateway absorbs by failing over). Diff errors are recovered
// locally: the committing tool turns them into tool-result strings so the
// model can correct itself.

use thiserror::Error;

/// Errors surfaced by a model backend or the gateway in front of them.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// 429-class response. Triggers failover to the next backend and a
    /// cooldown window on the one that rate-limited.
    #[error("{provider} rate limited (429): {message}")]
    RateLimited { provider: String, message: String },

    /// 529/5xx-class response. The backend is momentarily unusable; not
    /// retried across backends.
    #[error("{provider} overloaded: {message}")]
    Overloaded { provider: String, message: String },

    /// 401/403-class response. Fatal, propagates to the caller.
    #[error("{provider} authentication failed: {message}")]
    AuthFailed { provider: String, message: String },

    /// Transport-level failure, including the per-request wall-clock timeout.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered 2xx but the body was not what the API promises.
    #[error("malformed response from {provider}: {message}")]
    BadResponse { provider: String, message: String },
}

impl ProviderError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }
}

/// Errors from parsing or applying unified diffs.
#[derive(Debug, Error)]
pub enum DiffError {
    /// The diff text itself is unusable: no file markers, bad hunk header.
    #[error("malformed diff: {0}")]
    Malformed(String),

    /// The diff parsed but cannot be applied to the given original
    /// (out-of-order hunks, context that matches nowhere).
    #[error("patch did not apply: {0}")]
    ApplyFailed(String),
}
