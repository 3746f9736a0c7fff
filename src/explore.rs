//! File listing, removal, and download for a brain's documents.

use brainstore_core::models::{FileSummary, VectorRecord};
use brainstore_core::{Error, Result};
use uuid::Uuid;

use crate::authorization::{require_role, ANY_MEMBER, OWNERS};
use crate::context::AppContext;
use crate::reaper::{self, ReapReport};
use crate::vectors::unique_files_from_vector_ids;

/// Distinct files of a brain, largest first.
pub async fn list_files(ctx: &AppContext, user_id: Uuid, brain_id: Uuid) -> Result<Vec<FileSummary>> {
    require_role(ctx, brain_id, user_id, ANY_MEMBER).await?;
    brain_files(ctx, brain_id).await
}

/// [`list_files`] without the membership check.
pub async fn brain_files(ctx: &AppContext, brain_id: Uuid) -> Result<Vec<FileSummary>> {
    let vector_ids = ctx.store.brain_vector_ids(brain_id).await?;
    let mut files = unique_files_from_vector_ids(ctx, &vector_ids).await?;
    files.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.name.cmp(&b.name)));
    Ok(files)
}

/// Remove a file from a brain. Owners only.
pub async fn delete_file(
    ctx: &AppContext,
    user_id: Uuid,
    brain_id: Uuid,
    file_name: &str,
) -> Result<ReapReport> {
    require_role(ctx, brain_id, user_id, OWNERS).await?;
    reaper::delete_file_from_brain(ctx, brain_id, file_name).await
}

/// All stored segments of `file_name`.
///
/// An unknown name yields no segments. Otherwise access is checked against
/// the first brain that linked the file, and a file with no link is
/// reported as not found.
pub async fn download_file(
    ctx: &AppContext,
    user_id: Uuid,
    file_name: &str,
) -> Result<Vec<VectorRecord>> {
    let vectors = ctx.store.vectors_by_file_name(file_name).await?;
    let Some(first) = vectors.first() else {
        return Ok(Vec::new());
    };

    let brain_id = ctx
        .store
        .brains_for_vector(first.id)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFound(format!("no brain associated with file {}", file_name)))?;

    require_role(ctx, brain_id, user_id, ANY_MEMBER).await?;
    Ok(vectors)
}
