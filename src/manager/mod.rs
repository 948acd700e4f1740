//! Cache manager: admission and eviction coordination.
//!
//! The [`CacheManager`] owns two queues and two background workers:
//!
//! - The **write pipeline** coalesces admission requests by filename and
//!   drains them in bounded batches: fetch from the source of truth, write
//!   to the substrate, seal the metadata record.
//! - The **eviction pipeline** consumes eviction requests: the LRU tail is
//!   detached and its metadata deleted immediately, then the bytes are
//!   purged once a grace window has passed, so readers that observed the
//!   entry just before eviction finish against intact bytes.
//!
//! Workers run until [`CacheManager::shutdown`] cancels them. Admission
//! outcomes are not reported to the enqueuer; callers observe residency
//! through the metadata store.

mod evict_pipeline;
mod write_pipeline;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::CacheConfig;
use crate::holder::BlobHolder;
use crate::metadata::{MetadataStore, StoreError};
use crate::source::ArtifactSource;

/// Admission queue: filenames in arrival order plus the filename→fid map.
/// Every queued filename has exactly one map entry.
#[derive(Debug, Default)]
struct WriteState {
    queue: VecDeque<String>,
    pending: HashMap<String, String>,
}

/// Purge queue: triplet ids in arrival order plus their enqueue instants.
/// An id becomes due once its age reaches the configured grace.
#[derive(Debug, Default)]
struct PurgeState {
    queue: VecDeque<String>,
    enqueued_at: HashMap<String, Instant>,
}

/// Shared state behind the facade; the workers hold an `Arc` of this.
pub(crate) struct ManagerInner<S, H, M> {
    source: S,
    holder: Arc<H>,
    store: Arc<M>,
    config: CacheConfig,
    /// Guarded by a std mutex: critical sections never await.
    write_state: Mutex<WriteState>,
    /// Async mutex: the purge worker holds the guard across its per-tick
    /// join, excluding new eviction requests for the duration.
    purge_state: tokio::sync::Mutex<PurgeState>,
}

impl<S, H, M> ManagerInner<S, H, M>
where
    S: ArtifactSource,
    H: BlobHolder,
    M: MetadataStore,
{
    fn new(source: S, holder: Arc<H>, store: Arc<M>, config: CacheConfig) -> Self {
        Self {
            source,
            holder,
            store,
            config,
            write_state: Mutex::new(WriteState::default()),
            purge_state: tokio::sync::Mutex::new(PurgeState::default()),
        }
    }

    pub(crate) fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub(crate) fn source(&self) -> &S {
        &self.source
    }

    pub(crate) fn holder(&self) -> &Arc<H> {
        &self.holder
    }

    pub(crate) fn store(&self) -> &Arc<M> {
        &self.store
    }

    fn enqueue_write(&self, fid: &str, filename: &str) {
        let mut state = self.write_state.lock().unwrap();
        // Idempotent per filename while it is still queued.
        if state.pending.contains_key(filename) {
            return;
        }
        state.pending.insert(filename.to_string(), fid.to_string());
        state.queue.push_back(filename.to_string());
        debug!(fid, filename, depth = state.queue.len(), "admission queued");
    }

    /// Take at most `max` coalesced `(filename, fid)` pairs off the queue.
    fn take_write_batch(&self, max: usize) -> Vec<(String, String)> {
        let mut state = self.write_state.lock().unwrap();
        let take = max.min(state.queue.len());
        let mut batch = Vec::with_capacity(take);
        for _ in 0..take {
            let Some(filename) = state.queue.pop_front() else {
                break;
            };
            if let Some(fid) = state.pending.remove(&filename) {
                batch.push((filename, fid));
            }
        }
        batch
    }

    /// Select the LRU tail, delete its metadata, and queue the id for a
    /// grace-delayed purge.
    ///
    /// A no-op when nothing is resident or the metadata delete fails; in
    /// both cases the substrate and the store stay consistent and the
    /// failure is logged.
    pub(crate) async fn enqueue_eviction(&self) {
        let mut purge = self.purge_state.lock().await;

        let id = match self.holder.take_eviction_tail() {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "eviction requested but no tail available");
                return;
            }
        };
        if let Err(e) = self.store.delete_file_with_triplet_id(&id).await {
            error!(%id, error = %e, "metadata delete failed, blob left in place");
            return;
        }

        purge.enqueued_at.insert(id.clone(), Instant::now());
        purge.queue.push_back(id.clone());
        info!(%id, "triplet queued for purge");
    }

    /// Remove the pending metadata row of a failed admission.
    pub(crate) async fn rollback_file(&self, fid: &str) -> Result<(), StoreError> {
        match self.store.delete_pending_file_with_fid(fid).await {
            Ok(()) => {
                info!(fid, "pending metadata rolled back");
                Ok(())
            }
            Err(e) => {
                error!(fid, error = %e, "pending metadata rollback failed");
                Err(e)
            }
        }
    }
}

/// Facade over the admission and eviction pipelines.
///
/// Constructing the manager spawns both workers; they run until
/// [`shutdown`](Self::shutdown).
pub struct CacheManager<S, H, M> {
    inner: Arc<ManagerInner<S, H, M>>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<S, H, M> CacheManager<S, H, M>
where
    S: ArtifactSource + 'static,
    H: BlobHolder + 'static,
    M: MetadataStore + 'static,
{
    /// Build the manager and spawn the two background workers.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(source: S, holder: Arc<H>, store: Arc<M>, config: CacheConfig) -> Self {
        let inner = Arc::new(ManagerInner::new(source, holder, store, config));
        let cancel = CancellationToken::new();

        let writer = tokio::spawn(write_pipeline::run(Arc::clone(&inner), cancel.clone()));
        let evictor = tokio::spawn(evict_pipeline::run(Arc::clone(&inner), cancel.clone()));

        info!(
            tick_ms = inner.config.tick_interval.as_millis() as u64,
            batch_write_max = inner.config.batch_write_max,
            grace_ms = inner.config.purge_grace.as_millis() as u64,
            "cache manager started"
        );

        Self {
            inner,
            cancel,
            workers: Mutex::new(vec![writer, evictor]),
        }
    }

    /// Request admission of an artifact.
    ///
    /// Idempotent per `filename` while the request is still queued: a
    /// duplicate call before the next drain is a no-op. The download runs
    /// in a following batch tick; callers observe the outcome through the
    /// metadata store.
    pub fn enqueue_write(&self, fid: &str, filename: &str) {
        self.inner.enqueue_write(fid, filename);
    }

    /// Request eviction of the least-recently-used triplet.
    ///
    /// The tail's metadata is deleted before this returns; its bytes are
    /// reclaimed by the purge worker after the grace window.
    pub async fn enqueue_eviction(&self) {
        self.inner.enqueue_eviction().await;
    }

    /// Remove a pending metadata record after a failed admission.
    pub async fn rollback_file(&self, fid: &str) -> Result<(), StoreError> {
        self.inner.rollback_file(fid).await
    }

    /// Stop both workers and wait for them to exit.
    ///
    /// In-flight batch work finishes; queued items that have not started
    /// are dropped (the cache is rebuilt from scratch on restart anyway).
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let workers: Vec<_> = {
            let mut guard = self.workers.lock().unwrap();
            guard.drain(..).collect()
        };
        for handle in workers {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
            }
        }
        info!("cache manager stopped");
    }
}

impl<S, H, M> Drop for CacheManager<S, H, M> {
    fn drop(&mut self) {
        // Workers hold their own Arc of the shared state; without this they
        // would outlive the facade.
        self.cancel.cancel();
    }
}
