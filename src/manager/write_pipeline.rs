//! Batched admission worker.
//!
//! One long-lived task drains the write queue on a fixed tick: at most
//! `batch_write_max` coalesced requests per tick, one download task per
//! request, joined before the next drain. The join is the backpressure
//! point; a slow batch delays the next one rather than piling up work.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ManagerInner;
use crate::holder::{BlobHolder, FileWriter};
use crate::metadata::MetadataStore;
use crate::source::ArtifactSource;

/// Worker loop. Runs until `cancel` fires.
pub(crate) async fn run<S, H, M>(inner: Arc<ManagerInner<S, H, M>>, cancel: CancellationToken)
where
    S: ArtifactSource + 'static,
    H: BlobHolder + 'static,
    M: MetadataStore + 'static,
{
    let mut interval = tokio::time::interval(inner.config().tick_interval);
    // A batch that overruns the interval must not be followed by a burst of
    // catch-up ticks; every drain keeps a real delay before the next.
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Skip the immediate first tick.
    interval.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("admission worker shutting down");
                break;
            }

            _ = interval.tick() => {
                drain_batch(&inner).await;
            }
        }
    }
}

/// Take one bounded batch off the queue and admit every item, joining the
/// whole batch before returning.
pub(crate) async fn drain_batch<S, H, M>(inner: &Arc<ManagerInner<S, H, M>>)
where
    S: ArtifactSource + 'static,
    H: BlobHolder + 'static,
    M: MetadataStore + 'static,
{
    let batch = inner.take_write_batch(inner.config().batch_write_max);
    if batch.is_empty() {
        return;
    }
    debug!(items = batch.len(), "draining admission batch");

    let mut tasks = JoinSet::new();
    for (filename, fid) in batch {
        let inner = Arc::clone(inner);
        tasks.spawn(async move {
            admit(&inner, &filename, &fid).await;
        });
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            // Admission panics are invariant breaches; re-raise them on the
            // worker instead of absorbing them in the join.
            if e.is_panic() {
                std::panic::resume_unwind(e.into_panic());
            }
        }
    }
}

/// Admit one artifact: check, fetch, write, seal.
///
/// Expected failures (absent, oversized, transport, length mismatch) drop
/// the item. A full substrate requests an eviction and rolls the pending
/// row back. Anything else is a breach of the write transaction and
/// panics the task.
async fn admit<S, H, M>(inner: &ManagerInner<S, H, M>, filename: &str, fid: &str)
where
    S: ArtifactSource,
    H: BlobHolder,
    M: MetadataStore,
{
    let expected_len = match inner.source().check(filename).await {
        Ok(Some(len)) => len,
        Ok(None) => {
            debug!(filename, "artifact absent at source, dropping");
            return;
        }
        Err(e) => {
            warn!(filename, error = %e, "source check failed, dropping");
            return;
        }
    };

    if expected_len > inner.config().max_object_size {
        debug!(
            filename,
            bytes = expected_len,
            limit = inner.config().max_object_size,
            "artifact over admission ceiling, dropping"
        );
        return;
    }

    let data = match inner.source().fetch(filename, expected_len).await {
        Ok(data) => data,
        Err(e) => {
            warn!(filename, error = %e, "fetch failed, dropping");
            return;
        }
    };

    let writer = FileWriter::new(inner.holder().as_ref(), inner.store().as_ref());
    let token = match writer.write(fid, &data).await {
        Ok(token) => token,
        Err(e) if e.is_cache_full() => {
            info!(fid, "substrate full, requesting eviction");
            inner.enqueue_eviction().await;
            // The caller retries by re-enqueueing once pressure drains; the
            // pending row must not linger meanwhile.
            let _ = inner.rollback_file(fid).await;
            return;
        }
        Err(e) => {
            error!(fid, error = %e, "substrate write failed outside cache-full");
            panic!("substrate write failed for {fid}: {e}");
        }
    };

    if let Err(e) = inner.store().commit_cache_file(fid, &token, data.len() as u64).await {
        // The bytes are on the substrate but the metadata cannot say so;
        // there is no compensating action for this divergence.
        error!(fid, token = %token, error = %e, "seal failed after substrate write");
        panic!("seal failed for {fid}: {e}");
    }
    info!(fid, token = %token, bytes = data.len(), "triplet admitted");
}
