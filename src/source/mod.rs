//! Artifact sources: where triplet bytes come from.
//!
//! The write pipeline probes an artifact with [`ArtifactSource::check`]
//! before committing to a download, then pulls the bytes with
//! [`ArtifactSource::fetch`]. Two backends exist: HTTP against the remote
//! object store, and the local filesystem for test deployments. The
//! configured `local_mode` flag picks between them via [`AnySource`].

mod http;
mod local;

pub use http::HttpSource;
pub use local::LocalSource;

use std::future::Future;

use thiserror::Error;

use crate::config::CacheConfig;

/// Errors from probing or fetching an artifact.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// The transport failed (timeout, connection refused, I/O error,
    /// unexpected status).
    #[error("transport error for {location}: {reason}")]
    Transport { location: String, reason: String },

    /// The artifact vanished between check and fetch.
    #[error("artifact {location} not found")]
    NotFound { location: String },

    /// The source did not report a length, so admission cannot be sized.
    #[error("no content length reported for {location}")]
    MissingLength { location: String },

    /// The fetched body does not match the length the check reported.
    #[error("length mismatch for {location}: expected {expected}, got {actual}")]
    LengthMismatch {
        location: String,
        expected: u64,
        actual: u64,
    },
}

/// A place artifacts can be fetched from.
///
/// Both operations are read-only with respect to the source; the engine
/// never writes back. Implementations must reject bodies whose length
/// disagrees with the length reported at check time.
pub trait ArtifactSource: Send + Sync {
    /// Probe an artifact. `Ok(Some(len))` when it exists with the given
    /// byte length, `Ok(None)` when absent.
    fn check(
        &self,
        location: &str,
    ) -> impl Future<Output = Result<Option<u64>, SourceError>> + Send;

    /// Fetch the artifact bytes, verifying the length matches
    /// `expected_len`.
    fn fetch(
        &self,
        location: &str,
        expected_len: u64,
    ) -> impl Future<Output = Result<Vec<u8>, SourceError>> + Send;
}

/// Source backend selected by configuration.
pub enum AnySource {
    Http(HttpSource),
    Local(LocalSource),
}

impl AnySource {
    /// Build the backend `config.local_mode` selects.
    pub fn from_config(config: &CacheConfig) -> Result<Self, SourceError> {
        if config.local_mode {
            Ok(Self::Local(LocalSource::new()))
        } else {
            Ok(Self::Http(HttpSource::new()?))
        }
    }
}

impl ArtifactSource for AnySource {
    async fn check(&self, location: &str) -> Result<Option<u64>, SourceError> {
        match self {
            Self::Http(source) => source.check(location).await,
            Self::Local(source) => source.check(location).await,
        }
    }

    async fn fetch(&self, location: &str, expected_len: u64) -> Result<Vec<u8>, SourceError> {
        match self {
            Self::Http(source) => source.fetch(location, expected_len).await,
            Self::Local(source) => source.fetch(location, expected_len).await,
        }
    }
}
