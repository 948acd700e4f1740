//! Per-file metadata: the persistent state machine beside the substrate.
//!
//! Every admitted artifact has a metadata record that moves
//! `Pending → Ready`. The record is created before the bytes land on the
//! substrate and sealed (token + size) afterwards, so an interrupted
//! admission leaves a visible `Pending` row that [`rollback`] paths can
//! reclaim. Eviction deletes the record before the bytes are reclaimed.
//!
//! [`MemoryStore`] is the in-process reference implementation; production
//! deployments plug their database behind the same [`MetadataStore`] trait.
//!
//! [`rollback`]: crate::manager::CacheManager::rollback_file

use std::future::Future;

use dashmap::DashMap;
use thiserror::Error;

/// Lifecycle state of a metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Admission started; the substrate may not hold the bytes yet.
    Pending,
    /// Sealed: the bytes are resident and the token locates them.
    Ready,
}

/// One artifact's metadata row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub state: FileState,
    /// Substrate token, present once sealed.
    pub token: Option<String>,
    /// Byte length, present once sealed.
    pub size: Option<u64>,
}

/// Errors from metadata operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record for the given id.
    #[error("no metadata record for {fid}")]
    NotFound { fid: String },

    /// The record exists but is in the wrong state for the operation.
    #[error("metadata record for {fid} is {actual:?}, expected {expected:?}")]
    InvalidState {
        fid: String,
        expected: FileState,
        actual: FileState,
    },

    /// The backing database failed.
    #[error("metadata backend error: {0}")]
    Backend(String),
}

/// Persistent per-file state machine the cache engine records into.
pub trait MetadataStore: Send + Sync {
    /// Record that admission of `fid` has started. Idempotent: an existing
    /// record (in any state) is left untouched.
    fn create_pending_file(&self, fid: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Seal `fid` as `Ready` with the substrate token and byte length.
    fn commit_cache_file(
        &self,
        fid: &str,
        token: &str,
        size: u64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete the record of an evicted triplet, whatever its state.
    fn delete_file_with_triplet_id(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete a `Pending` record after a failed admission. Refuses to touch
    /// a sealed record.
    fn delete_pending_file_with_fid(
        &self,
        fid: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// In-memory reference implementation of [`MetadataStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, FileRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a record, for observation and tests.
    pub fn get(&self, fid: &str) -> Option<FileRecord> {
        self.records.get(fid).map(|r| r.value().clone())
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl MetadataStore for MemoryStore {
    async fn create_pending_file(&self, fid: &str) -> Result<(), StoreError> {
        self.records
            .entry(fid.to_string())
            .or_insert_with(|| FileRecord {
                state: FileState::Pending,
                token: None,
                size: None,
            });
        Ok(())
    }

    async fn commit_cache_file(&self, fid: &str, token: &str, size: u64) -> Result<(), StoreError> {
        match self.records.get_mut(fid) {
            Some(mut record) => {
                record.state = FileState::Ready;
                record.token = Some(token.to_string());
                record.size = Some(size);
                Ok(())
            }
            None => Err(StoreError::NotFound {
                fid: fid.to_string(),
            }),
        }
    }

    async fn delete_file_with_triplet_id(&self, id: &str) -> Result<(), StoreError> {
        match self.records.remove(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound { fid: id.to_string() }),
        }
    }

    async fn delete_pending_file_with_fid(&self, fid: &str) -> Result<(), StoreError> {
        // Remove-if-pending must be atomic; a concurrent seal between a get
        // and a remove would otherwise delete a Ready record.
        match self.records.remove_if(fid, |_, record| record.state == FileState::Pending) {
            Some(_) => Ok(()),
            None => match self.records.get(fid) {
                Some(record) => Err(StoreError::InvalidState {
                    fid: fid.to_string(),
                    expected: FileState::Pending,
                    actual: record.state,
                }),
                None => Err(StoreError::NotFound {
                    fid: fid.to_string(),
                }),
            },
        }
    }
}
