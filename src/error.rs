//! Cache Errors
//!
//! Every fallible cache operation returns [`CacheError`]. The enum is `Clone`
//! because a single load result is handed to every caller coalesced on the
//! same key, so foreign errors are kept behind `Arc`.

use std::sync::Arc;
use thiserror::Error;

/// Result alias used throughout the crate
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors surfaced by the cache layer
///
/// The variants fall into three families:
///
/// - **Transport**: `Transport`, `UnexpectedStatus`, `Backend`. The remote
///   store was unreachable or refused the command.
/// - **Serialization**: `Serialization`. A payload could not be encoded or
///   decoded into the expected shape.
/// - **Loader**: `Loader`, `LoaderPanicked`, `LoaderTimedOut`. The caller-supplied fetch failed.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// HTTP transport failure (connect, timeout, body read)
    #[cfg(feature = "http")]
    #[error("remote cache unreachable: {0}")]
    Transport(#[source] Arc<reqwest::Error>),

    /// The remote store answered with a non-success status
    #[error("remote cache rejected {command} with status {status}")]
    UnexpectedStatus {
        /// Store command that failed (`GET`, `SET`, `DEL`, `SCAN`)
        command: &'static str,
        /// HTTP status code
        status: u16,
    },

    /// Backend-specific failure (Redis command error, error body, ...)
    #[error("remote cache backend error: {0}")]
    Backend(String),

    /// Payload could not be encoded or decoded
    #[error("cache payload serialization failed: {0}")]
    Serialization(#[source] Arc<serde_json::Error>),

    /// The loader returned an error
    #[error("loader failed: {0:#}")]
    Loader(Arc<anyhow::Error>),

    /// The loader task panicked or was aborted before producing a value
    #[error("loader task for '{key}' did not complete")]
    LoaderPanicked {
        /// Key the aborted load was registered under
        key: String,
    },

    /// The loader did not finish within the refresh timeout
    #[error("loader for '{key}' timed out")]
    LoaderTimedOut {
        /// Key the load was registered under
        key: String,
    },
}

impl CacheError {
    /// Wrap a loader error
    pub fn loader(err: anyhow::Error) -> Self {
        Self::Loader(Arc::new(err))
    }

    /// `true` for failures talking to the remote store
    #[must_use]
    pub fn is_transport(&self) -> bool {
        match self {
            #[cfg(feature = "http")]
            Self::Transport(_) => true,
            Self::UnexpectedStatus { .. } | Self::Backend(_) => true,
            _ => false,
        }
    }

    /// `true` when the payload could not be (de)serialized
    #[must_use]
    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization(_))
    }

    /// `true` when the wrapped data-fetch function failed
    #[must_use]
    pub fn is_loader(&self) -> bool {
        matches!(
            self,
            Self::Loader(_) | Self::LoaderPanicked { .. } | Self::LoaderTimedOut { .. }
        )
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(err))
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(Arc::new(err))
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}
