//! Error classes for a relay cycle
//!
//! Clients return `eyre::Result` with context; the relay loop wraps those
//! failures into one of these classes so the outer loop can decide between
//! backing off and shutting down.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Every configured indexer endpoint failed for the same query
    #[error("all {attempted} indexer endpoints failed, last error: {last_error}")]
    SourceUnavailable { attempted: usize, last_error: String },

    /// Reading destination chain state (nonce, params) failed
    #[error("destination query failed: {0:#}")]
    Destination(eyre::Report),

    /// The withdrawal was rejected, or not confirmed within the wait bound
    #[error("withdrawal submission failed: {0:#}")]
    Submission(eyre::Report),

    /// The state file could not be written
    #[error("failed to persist relayer state: {0:#}")]
    Persistence(eyre::Report),
}

impl RelayError {
    /// Fatal errors stop the relayer instead of backing off
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::Persistence(_))
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::SourceUnavailable { .. } => "source_unavailable",
            RelayError::Destination(_) => "destination",
            RelayError::Submission(_) => "submission",
            RelayError::Persistence(_) => "persistence",
        }
    }
}
