//! Write-path glue between the metadata store and the blob holder.
//!
//! Admission records a `Pending` metadata row before any bytes land, so a
//! crash or a full substrate leaves a visible row instead of orphaned
//! bytes. Sealing the row stays with the caller: the pipeline needs the
//! token and the byte count to commit, and treats a seal failure
//! differently from a write failure.

use thiserror::Error;

use super::{BlobHolder, HolderError};
use crate::metadata::{MetadataStore, StoreError};

/// Errors from the composed write path.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Recording the pending row failed.
    #[error("metadata store rejected the write: {0}")]
    Store(#[from] StoreError),

    /// The substrate write failed.
    #[error(transparent)]
    Holder(#[from] HolderError),
}

impl WriteError {
    /// Whether the failure is eviction pressure rather than a hard fault.
    pub fn is_cache_full(&self) -> bool {
        matches!(self, Self::Holder(e) if e.is_cache_full())
    }
}

/// Composition of the metadata store and the blob holder on the write path.
pub struct FileWriter<'a, H, M> {
    holder: &'a H,
    store: &'a M,
}

impl<'a, H, M> FileWriter<'a, H, M>
where
    H: BlobHolder,
    M: MetadataStore,
{
    pub fn new(holder: &'a H, store: &'a M) -> Self {
        Self { holder, store }
    }

    /// Record a pending row for `fid`, then write the bytes. Returns the
    /// substrate token the caller seals into the metadata.
    pub async fn write(&self, fid: &str, data: &[u8]) -> Result<String, WriteError> {
        self.store.create_pending_file(fid).await?;
        let token = self.holder.write_blob(fid, data).await?;
        Ok(token)
    }
}
