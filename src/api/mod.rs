//! Network boundary for the remote feed service.
//!
//! [`FeedApi`] is the seam between the delivery engine and the transport.
//! [`HttpFeedApi`] talks JSON over reqwest; tests substitute scripted
//! implementations.

mod http;

pub use http::{HttpFeedApi, DEFAULT_REQUEST_TIMEOUT, MAX_RESPONSE_SIZE};

use crate::feed::{FullItem, ItemId, PreviewItem};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors produced by a feed transport.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Request could not be sent or the connection dropped.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Request timed out")]
    Timeout,
    /// Non-success HTTP status other than 404 on an item lookup.
    #[error("Server error: status {0}")]
    Server(u16),
    #[error("Item not found: {0}")]
    NotFound(ItemId),
    #[error("Invalid response: {0}")]
    Decode(String),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
    #[error("Insecure API URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
}

/// Coarse classification used by the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No connectivity, timeout, or a request that could not be built.
    Network,
    /// The server answered, but not with something usable.
    Server,
    /// Item detail requested for an id the server does not know.
    NotFound,
}

impl FeedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FeedError::Network(_)
            | FeedError::Timeout
            | FeedError::InvalidUrl(_)
            | FeedError::InsecureBaseUrl => ErrorKind::Network,
            FeedError::Server(_) | FeedError::Decode(_) | FeedError::ResponseTooLarge(_) => {
                ErrorKind::Server
            }
            FeedError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// True for failures where an older cached copy is better than nothing.
    pub fn allows_stale_fallback(&self) -> bool {
        match self {
            FeedError::Network(_) | FeedError::Timeout => true,
            FeedError::Server(status) => *status >= 500,
            FeedError::NotFound(_)
            | FeedError::Decode(_)
            | FeedError::ResponseTooLarge(_)
            | FeedError::InvalidUrl(_)
            | FeedError::InsecureBaseUrl => false,
        }
    }
}

/// A failure as surfaced to the rendering layer.
///
/// Cloneable snapshot of a [`FeedError`]: the kind plus the message to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&FeedError> for FeedFailure {
    fn from(err: &FeedError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for FeedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

// ============================================================================
// Transport Trait
// ============================================================================

/// The four remote operations the engine consumes.
///
/// Implementations return items in feed order and do no caching.
#[async_trait]
pub trait FeedApi: Send + Sync {
    async fn lightweight_batch(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PreviewItem>, FeedError>;

    async fn full_batch(&self, limit: usize, offset: usize) -> Result<Vec<FullItem>, FeedError>;

    async fn preload_batch(
        &self,
        offset: usize,
        batch_size: usize,
    ) -> Result<Vec<FullItem>, FeedError>;

    async fn item_detail(&self, id: &ItemId) -> Result<FullItem, FeedError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(FeedError::Timeout.kind(), ErrorKind::Network);
        assert_eq!(FeedError::Server(502).kind(), ErrorKind::Server);
        assert_eq!(FeedError::Decode("bad".into()).kind(), ErrorKind::Server);
        assert_eq!(
            FeedError::NotFound(ItemId::new("x")).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_stale_fallback_policy() {
        assert!(FeedError::Timeout.allows_stale_fallback());
        assert!(FeedError::Server(503).allows_stale_fallback());
        assert!(!FeedError::Server(400).allows_stale_fallback());
        assert!(!FeedError::NotFound(ItemId::new("x")).allows_stale_fallback());
    }

    #[test]
    fn test_failure_snapshot() {
        let failure = FeedFailure::from(&FeedError::Server(500));
        assert_eq!(failure.kind, ErrorKind::Server);
        assert_eq!(failure.to_string(), "Server error: status 500");
    }
}
