//! HTTP source backend against the remote object store.

use std::time::Duration;

use tracing::{debug, trace, warn};

use super::{ArtifactSource, SourceError};

/// Request timeout for both HEAD and GET.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP artifact source.
///
/// Uses a pooled async client tuned for many parallel downloads: warm
/// keepalive connections and no Nagle delay on small responses.
#[derive(Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    /// Create a source with the default timeout.
    pub fn new() -> Result<Self, SourceError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a source with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(64)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| SourceError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

impl ArtifactSource for HttpSource {
    async fn check(&self, location: &str) -> Result<Option<u64>, SourceError> {
        trace!(url = location, "HEAD request starting");

        let response = self
            .client
            .head(location)
            .send()
            .await
            .map_err(|e| SourceError::Transport {
                location: location.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(url = location, "artifact absent at source");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SourceError::Transport {
                location: location.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        match response.content_length() {
            Some(len) => {
                debug!(url = location, bytes = len, "artifact present at source");
                Ok(Some(len))
            }
            None => {
                warn!(url = location, "source did not report a content length");
                Err(SourceError::MissingLength {
                    location: location.to_string(),
                })
            }
        }
    }

    async fn fetch(&self, location: &str, expected_len: u64) -> Result<Vec<u8>, SourceError> {
        trace!(url = location, "GET request starting");

        let response = self
            .client
            .get(location)
            .send()
            .await
            .map_err(|e| SourceError::Transport {
                location: location.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound {
                location: location.to_string(),
            });
        }
        if !status.is_success() {
            return Err(SourceError::Transport {
                location: location.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Transport {
                location: location.to_string(),
                reason: e.to_string(),
            })?;

        if body.len() as u64 != expected_len {
            return Err(SourceError::LengthMismatch {
                location: location.to_string(),
                expected: expected_len,
                actual: body.len() as u64,
            });
        }

        trace!(url = location, bytes = body.len(), "artifact fetched");
        Ok(body.to_vec())
    }
}
