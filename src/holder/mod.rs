//! Physical blob holder: the local byte substrate.
//!
//! The holder owns the bytes of every resident triplet and the LRU index
//! that orders them by recency. The cache manager talks to it through
//! [`BlobHolder`]: writes on admission, reads on the serving path, tail
//! selection when eviction is requested, and purges once the grace window
//! has passed.

mod disk;
mod writer;

pub use disk::DiskHolder;
pub use writer::{FileWriter, WriteError};

use std::future::Future;

use thiserror::Error;

/// Handle to a resident triplet: enough to locate and account for the
/// bytes without holding them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripletHandle {
    /// Substrate token locating the bytes.
    pub token: String,
    /// Byte length on the substrate.
    pub size: u64,
}

/// Errors from the substrate.
#[derive(Debug, Error)]
pub enum HolderError {
    /// Admission would exceed the substrate capacity. The caller should
    /// request an eviction and abandon or retry the write.
    #[error("cache full: {needed} bytes requested, {available} available")]
    CacheFull { needed: u64, available: u64 },

    /// No blob with the given id is resident.
    #[error("blob {id} not found on substrate")]
    NotFound { id: String },

    /// Nothing resident to evict.
    #[error("substrate is empty, nothing to evict")]
    Empty,

    /// Substrate I/O failed.
    #[error("substrate I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HolderError {
    /// Whether this error signals eviction pressure.
    pub fn is_cache_full(&self) -> bool {
        matches!(self, Self::CacheFull { .. })
    }
}

/// Byte storage tier for triplets.
pub trait BlobHolder: Send + Sync {
    /// Store a blob, returning the substrate token that locates it.
    /// Fails with [`HolderError::CacheFull`] when the capacity would be
    /// exceeded.
    fn write_blob(
        &self,
        fid: &str,
        data: &[u8],
    ) -> impl Future<Output = Result<String, HolderError>> + Send;

    /// Read a resident blob, promoting its recency.
    fn read_blob(&self, fid: &str) -> impl Future<Output = Result<Vec<u8>, HolderError>> + Send;

    /// Reclaim a blob's bytes. The id may already be detached from the
    /// recency index (eviction path) or still resident (targeted delete).
    fn purge_blob(&self, id: &str) -> impl Future<Output = Result<(), HolderError>> + Send;

    /// Detach the least-recently-used triplet from the recency index and
    /// return its id. The bytes stay on the substrate until
    /// [`purge_blob`](Self::purge_blob).
    fn take_eviction_tail(&self) -> Result<String, HolderError>;
}
