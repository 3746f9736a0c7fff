//! Orphan reaper.
//!
//! A vector with no link is garbage. Removing a file from a brain deletes
//! the brain's links to the file's vectors, then deletes each of those
//! vectors that no other brain still links. The reference check and the
//! delete run as one conditional statement per batch, so a vector re-linked
//! concurrently is never removed.
//!
//! Every step is idempotent. A run interrupted midway is completed by
//! running it again, and [`sweep_orphans`] collects anything left behind.

use std::time::{Duration, Instant};

use brainstore_core::{Error, Result};
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use uuid::Uuid;

use crate::context::AppContext;
use crate::retry::retry_idempotent;

/// Outcome of [`delete_file_from_brain`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReapReport {
    pub links_removed: u64,
    pub vectors_deleted: usize,
}

/// Remove `file_name` from `brain_id` and delete its newly orphaned vectors.
pub async fn delete_file_from_brain(
    ctx: &AppContext,
    brain_id: Uuid,
    file_name: &str,
) -> Result<ReapReport> {
    let start = Instant::now();
    let vector_ids = ctx.store.vector_ids_by_file_name(file_name).await?;
    if vector_ids.is_empty() {
        tracing::debug!(brain_id = %brain_id, file_name, "no vectors for file");
        return Ok(ReapReport::default());
    }

    let store = ctx.store.as_ref();
    let ids = vector_ids.as_slice();
    let links_removed = retry_idempotent(ctx.config.store.retry_policy(), "delete_links", move || {
        store.delete_links(brain_id, ids)
    })
    .await?;

    let deleted = delete_orphans(ctx, &vector_ids).await?;

    tracing::info!(
        brain_id = %brain_id,
        file_name,
        links_removed,
        vectors_deleted = deleted.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "file removed from brain"
    );
    Ok(ReapReport {
        links_removed,
        vectors_deleted: deleted.len(),
    })
}

/// Delete every candidate that no link references. Candidates are split
/// into batches of `store.lookup_batch_size` and up to
/// `store.max_concurrency` batches run at once. Returns the deleted ids.
pub async fn delete_orphans(ctx: &AppContext, candidates: &[Uuid]) -> Result<Vec<Uuid>> {
    let batch_size = ctx.config.store.lookup_batch_size.max(1);
    let concurrency = ctx.config.store.max_concurrency.max(1);
    let policy = ctx.config.store.retry_policy();
    let store = ctx.store.as_ref();

    let owned: Vec<Vec<Uuid>> = candidates.chunks(batch_size).map(<[Uuid]>::to_vec).collect();

    let batches: Vec<Vec<Uuid>> = futures::stream::iter(owned)
        .map(|batch: Vec<Uuid>| async move {
            retry_idempotent(policy, "delete_orphaned_vectors", || {
                store.delete_orphaned_vectors(&batch)
            })
            .await
        })
        .buffer_unordered(concurrency)
        .try_collect()
        .await?;

    Ok(batches.into_iter().flatten().collect())
}

/// Delete unlinked vectors older than `min_age`.
///
/// The age floor keeps the sweep away from uploads that have written their
/// vectors but not yet linked them.
pub async fn sweep_orphans(ctx: &AppContext, min_age: Duration) -> Result<usize> {
    let cutoff = chrono::Duration::from_std(min_age)
        .ok()
        .and_then(|age| chrono::Utc::now().checked_sub_signed(age))
        .ok_or_else(|| Error::InvalidInput(format!("orphan age out of range: {:?}", min_age)))?;

    let candidates = ctx.store.unlinked_vector_ids(cutoff).await?;
    if candidates.is_empty() {
        return Ok(0);
    }
    let deleted = delete_orphans(ctx, &candidates).await?;
    tracing::info!(
        candidates = candidates.len(),
        vectors_deleted = deleted.len(),
        "orphan sweep finished"
    );
    Ok(deleted.len())
}
