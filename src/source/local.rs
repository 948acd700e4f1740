//! Filesystem source backend for test deployments.
//!
//! Locations are interpreted as local paths; `check` is a stat and `fetch`
//! is a read, with the same contract as the HTTP backend.

use std::io::ErrorKind;

use tracing::debug;

use super::{ArtifactSource, SourceError};

/// Local filesystem artifact source.
#[derive(Debug, Clone, Default)]
pub struct LocalSource;

impl LocalSource {
    pub fn new() -> Self {
        Self
    }
}

impl ArtifactSource for LocalSource {
    async fn check(&self, location: &str) -> Result<Option<u64>, SourceError> {
        match tokio::fs::metadata(location).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            // Directories and other non-file entries are not artifacts.
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = location, "local artifact not found");
                Ok(None)
            }
            Err(e) => Err(SourceError::Transport {
                location: location.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn fetch(&self, location: &str, expected_len: u64) -> Result<Vec<u8>, SourceError> {
        let data = tokio::fs::read(location).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                SourceError::NotFound {
                    location: location.to_string(),
                }
            } else {
                SourceError::Transport {
                    location: location.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        if data.len() as u64 != expected_len {
            return Err(SourceError::LengthMismatch {
                location: location.to_string(),
                expected: expected_len,
                actual: data.len() as u64,
            });
        }

        Ok(data)
    }
}
