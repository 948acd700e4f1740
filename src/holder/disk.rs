//! Disk-backed blob holder.
//!
//! One file per blob under a flat substrate directory. Byte accounting is
//! a relaxed atomic and the capacity check is advisory: two racing writes
//! can land slightly over the ceiling, and the next admission then fails
//! with [`HolderError::CacheFull`] and triggers eviction.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use super::{BlobHolder, HolderError, TripletHandle};
use crate::lru::{LruError, LruIndex};

/// Disk substrate holding one file per triplet.
pub struct DiskHolder {
    root: PathBuf,
    capacity_bytes: u64,
    used_bytes: AtomicU64,
    lru: LruIndex<TripletHandle>,
}

impl DiskHolder {
    /// Create a holder rooted at `root` with the given byte capacity.
    ///
    /// The directory is created if it does not exist. Any files already
    /// present are ignored; the substrate is rebuilt from scratch on every
    /// start.
    pub fn new(root: PathBuf, capacity_bytes: u64) -> Result<Self, HolderError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            capacity_bytes,
            used_bytes: AtomicU64::new(0),
            lru: LruIndex::new(),
        })
    }

    /// Substrate token for a triplet id: a filesystem-safe file name.
    fn token_for(fid: &str) -> String {
        format!("{}.blob", fid.replace(['/', ':', '\\'], "_"))
    }

    /// Bytes currently accounted on the substrate. Advisory.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::Relaxed)
    }

    /// Configured byte capacity.
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    /// Number of triplets tracked by the recency index. Advisory.
    pub fn resident_count(&self) -> usize {
        self.lru.len()
    }

    /// Whether the id is tracked by the recency index.
    pub fn contains(&self, fid: &str) -> bool {
        self.lru.contains(fid)
    }
}

impl BlobHolder for DiskHolder {
    async fn write_blob(&self, fid: &str, data: &[u8]) -> Result<String, HolderError> {
        let needed = data.len() as u64;

        // A re-admitted id replaces its bytes, so the old entry's size
        // counts as headroom. The accounting itself is only adjusted once
        // the write has gone through; a rejected write must leave the
        // resident entry and its accounting untouched.
        let replaced = self.lru.get(fid).map(|old| old.size).unwrap_or(0);

        let used = self.used_bytes.load(Ordering::Relaxed);
        let effective_used = used.saturating_sub(replaced);
        if effective_used + needed > self.capacity_bytes {
            return Err(HolderError::CacheFull {
                needed,
                available: self.capacity_bytes.saturating_sub(effective_used),
            });
        }

        let token = Self::token_for(fid);
        tokio::fs::write(self.root.join(&token), data).await?;

        if replaced > 0 {
            self.used_bytes.fetch_sub(replaced, Ordering::Relaxed);
        }
        self.used_bytes.fetch_add(needed, Ordering::Relaxed);
        self.lru.put(
            fid,
            TripletHandle {
                token: token.clone(),
                size: needed,
            },
        );
        debug!(fid, token = %token, bytes = needed, "blob written to substrate");
        Ok(token)
    }

    async fn read_blob(&self, fid: &str) -> Result<Vec<u8>, HolderError> {
        // The index lookup promotes recency.
        let handle = self.lru.get(fid).ok_or_else(|| HolderError::NotFound {
            id: fid.to_string(),
        })?;
        let data = tokio::fs::read(self.root.join(&handle.token)).await?;
        Ok(data)
    }

    async fn purge_blob(&self, id: &str) -> Result<(), HolderError> {
        // Drop the index entry if it is still present (targeted delete);
        // after take_eviction_tail this is a no-op.
        self.lru.remove(id);

        let path = self.root.join(Self::token_for(id));
        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HolderError::NotFound { id: id.to_string() });
            }
            Err(e) => return Err(e.into()),
        };

        tokio::fs::remove_file(&path).await?;
        self.used_bytes.fetch_sub(size, Ordering::Relaxed);
        info!(id, bytes = size, "blob purged from substrate");
        Ok(())
    }

    fn take_eviction_tail(&self) -> Result<String, HolderError> {
        match self.lru.evict_tail() {
            Ok(id) => {
                debug!(id = %id, "tail triplet detached for eviction");
                Ok(id)
            }
            Err(LruError::Empty) => Err(HolderError::Empty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn holder_with_capacity(capacity: u64) -> (TempDir, DiskHolder) {
        let temp_dir = TempDir::new().unwrap();
        let holder = DiskHolder::new(temp_dir.path().to_path_buf(), capacity).unwrap();
        (temp_dir, holder)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Write and read
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn write_blob_persists_bytes_and_accounts_size() {
        let (temp_dir, holder) = holder_with_capacity(10_000);

        let token = holder.write_blob("a", b"hello").await.unwrap();

        assert!(temp_dir.path().join(&token).exists());
        assert_eq!(holder.used_bytes(), 5);
        assert_eq!(holder.resident_count(), 1);
        assert!(holder.contains("a"));
    }

    #[tokio::test]
    async fn read_blob_returns_written_bytes() {
        let (_temp_dir, holder) = holder_with_capacity(10_000);
        holder.write_blob("a", b"hello").await.unwrap();

        let data = holder.read_blob("a").await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn read_blob_missing_is_not_found() {
        let (_temp_dir, holder) = holder_with_capacity(10_000);

        let err = holder.read_blob("ghost").await.unwrap_err();
        assert!(matches!(err, HolderError::NotFound { .. }));
    }

    #[tokio::test]
    async fn rewrite_replaces_accounting_instead_of_doubling() {
        let (_temp_dir, holder) = holder_with_capacity(10_000);
        holder.write_blob("a", &[0u8; 100]).await.unwrap();
        holder.write_blob("a", &[0u8; 40]).await.unwrap();

        assert_eq!(holder.used_bytes(), 40);
        assert_eq!(holder.resident_count(), 1);
    }

    #[tokio::test]
    async fn rejected_rewrite_leaves_resident_entry_and_accounting() {
        let (_temp_dir, holder) = holder_with_capacity(100);
        holder.write_blob("a", &[1u8; 80]).await.unwrap();

        // The replacement does not fit even with the old bytes freed.
        let err = holder.write_blob("a", &[2u8; 150]).await.unwrap_err();
        assert!(err.is_cache_full());

        // The original blob is still resident and still accounted for.
        assert_eq!(holder.used_bytes(), 80);
        assert!(holder.contains("a"));
        assert_eq!(holder.read_blob("a").await.unwrap(), vec![1u8; 80]);

        // A same-size rewrite of a resident id still fits.
        holder.write_blob("a", &[3u8; 80]).await.unwrap();
        assert_eq!(holder.used_bytes(), 80);
    }

    #[tokio::test]
    async fn token_is_filesystem_safe() {
        let (temp_dir, holder) = holder_with_capacity(10_000);

        let token = holder.write_blob("bucket/obj:v1", b"x").await.unwrap();

        assert!(!token.contains('/'));
        assert!(!token.contains(':'));
        assert!(temp_dir.path().join(&token).exists());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Capacity
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn write_over_capacity_is_cache_full() {
        let (_temp_dir, holder) = holder_with_capacity(100);
        holder.write_blob("a", &[0u8; 80]).await.unwrap();

        let err = holder.write_blob("b", &[0u8; 30]).await.unwrap_err();

        assert!(err.is_cache_full());
        assert!(matches!(
            err,
            HolderError::CacheFull {
                needed: 30,
                available: 20
            }
        ));
        // The rejected blob left no trace.
        assert!(!holder.contains("b"));
        assert_eq!(holder.used_bytes(), 80);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Eviction and purge
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn take_eviction_tail_detaches_least_recent() {
        let (_temp_dir, holder) = holder_with_capacity(10_000);
        holder.write_blob("a", b"1").await.unwrap();
        holder.write_blob("b", b"2").await.unwrap();
        holder.read_blob("a").await.unwrap();

        assert_eq!(holder.take_eviction_tail().unwrap(), "b");
        assert!(!holder.contains("b"));
        // Bytes remain until purge.
        assert_eq!(holder.used_bytes(), 2);
    }

    #[tokio::test]
    async fn take_eviction_tail_on_empty_substrate_fails() {
        let (_temp_dir, holder) = holder_with_capacity(10_000);

        assert!(matches!(
            holder.take_eviction_tail(),
            Err(HolderError::Empty)
        ));
    }

    #[tokio::test]
    async fn purge_after_eviction_reclaims_bytes() {
        let (temp_dir, holder) = holder_with_capacity(10_000);
        let token = holder.write_blob("a", &[0u8; 64]).await.unwrap();

        let id = holder.take_eviction_tail().unwrap();
        holder.purge_blob(&id).await.unwrap();

        assert!(!temp_dir.path().join(&token).exists());
        assert_eq!(holder.used_bytes(), 0);
    }

    #[tokio::test]
    async fn purge_of_resident_blob_also_drops_index_entry() {
        let (_temp_dir, holder) = holder_with_capacity(10_000);
        holder.write_blob("a", &[0u8; 64]).await.unwrap();

        holder.purge_blob("a").await.unwrap();

        assert!(!holder.contains("a"));
        assert_eq!(holder.resident_count(), 0);
        assert_eq!(holder.used_bytes(), 0);
    }

    #[tokio::test]
    async fn purge_missing_blob_is_not_found() {
        let (_temp_dir, holder) = holder_with_capacity(10_000);

        let err = holder.purge_blob("ghost").await.unwrap_err();
        assert!(matches!(err, HolderError::NotFound { .. }));
    }
}
