//! Grace-delayed purge worker.
//!
//! Eviction detaches a triplet from the LRU and deletes its metadata
//! immediately; the bytes stay on the substrate until the grace window
//! passes. This worker wakes on a fixed tick, collects every queued id
//! whose grace has elapsed, and purges them in parallel.
//!
//! The purge mutex is held across the per-tick join on purpose: a purge
//! tick excludes new eviction requests for its duration, so a tail cannot
//! be selected twice while its predecessor is mid-purge.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{ManagerInner, PurgeState};
use crate::holder::BlobHolder;
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
    // A purge pass that overruns the interval must not be followed by a
    // burst of catch-up ticks; every pass keeps a real delay before the next.
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Skip the immediate first tick.
    interval.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("purge worker shutting down");
                break;
            }

            _ = interval.tick() => {
                purge_due(&inner).await;
            }
        }
    }
}

/// Purge every queued id whose grace window has elapsed.
pub(crate) async fn purge_due<S, H, M>(inner: &Arc<ManagerInner<S, H, M>>)
where
    S: ArtifactSource + 'static,
    H: BlobHolder + 'static,
    M: MetadataStore + 'static,
{
    let mut purge = inner.purge_state.lock().await;
    if purge.enqueued_at.is_empty() {
        return;
    }

    let due = split_due(&mut purge, inner.config().purge_grace);
    if due.is_empty() {
        return;
    }
    debug!(items = due.len(), "purging due triplets");

    let mut tasks = JoinSet::new();
    for id in due {
        let holder = Arc::clone(inner.holder());
        tasks.spawn(async move {
            if let Err(e) = holder.purge_blob(&id).await {
                // Not retried; the id has already left the queue and the
                // blob is considered gone.
                error!(%id, error = %e, "purge failed");
            }
        });
    }
    // Join under the purge guard; see the module docs.
    while tasks.join_next().await.is_some() {}
}

/// Move every due id out of the queue, preserving the order of the rest.
fn split_due(purge: &mut PurgeState, grace: std::time::Duration) -> Vec<String> {
    let now = Instant::now();
    let mut due = Vec::new();
    let mut waiting = VecDeque::new();
    while let Some(id) = purge.queue.pop_front() {
        match purge.enqueued_at.get(&id) {
            Some(at) if now.duration_since(*at) >= grace => {
                purge.enqueued_at.remove(&id);
                due.push(id);
            }
            Some(_) => waiting.push_back(id),
            // Unreachable while the queue/map invariant holds.
            None => {}
        }
    }
    purge.queue = waiting;
    due
}
