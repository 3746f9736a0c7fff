//! Brain accessor: brains, memberships, links, and size accounting.

use brainstore_core::models::{
    Brain, BrainUpdate, BrainUser, BrainVector, NewBrain, Role, UserBrain,
};
use brainstore_core::{Error, Result};
use uuid::Uuid;

use crate::authorization::{require_role, OWNERS};
use crate::context::AppContext;
use crate::reaper;
use crate::retry::retry_idempotent;
use crate::vectors::unique_files_from_vector_ids;

pub async fn create_brain(ctx: &AppContext, new: &NewBrain) -> Result<Brain> {
    if new.name.trim().is_empty() {
        return Err(Error::InvalidInput("brain name must not be empty".into()));
    }
    let brain = ctx.store.insert_brain(new).await?;
    tracing::info!(brain_id = %brain.id, name = %brain.name, "brain created");
    Ok(brain)
}

/// Create a brain owned by `user_id`. It becomes the user's default when
/// they have none yet.
pub async fn create_brain_for_user(
    ctx: &AppContext,
    user_id: Uuid,
    new: &NewBrain,
) -> Result<Brain> {
    let brain = create_brain(ctx, new).await?;
    let is_default = ctx.store.default_brain_id(user_id).await?.is_none();
    add_user(ctx, brain.id, user_id, Role::Owner, is_default).await?;
    Ok(brain)
}

pub async fn get_brain(ctx: &AppContext, brain_id: Uuid) -> Result<Brain> {
    ctx.store
        .get_brain(brain_id)
        .await?
        .ok_or(Error::BrainNotFound(brain_id))
}

pub async fn update_brain(ctx: &AppContext, brain_id: Uuid, update: &BrainUpdate) -> Result<Brain> {
    if let Some(name) = &update.name {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("brain name must not be empty".into()));
        }
    }
    if !ctx.store.update_brain(brain_id, update).await? {
        return Err(Error::BrainNotFound(brain_id));
    }
    get_brain(ctx, brain_id).await
}

pub async fn add_user(
    ctx: &AppContext,
    brain_id: Uuid,
    user_id: Uuid,
    rights: Role,
    is_default: bool,
) -> Result<()> {
    ctx.store
        .insert_brain_user(&BrainUser {
            brain_id,
            user_id,
            rights,
            default_brain: is_default,
        })
        .await
}

/// Remove a membership. Removing one that does not exist is not an error.
pub async fn remove_user(ctx: &AppContext, brain_id: Uuid, user_id: Uuid) -> Result<()> {
    let removed = ctx.store.delete_brain_user(brain_id, user_id).await?;
    tracing::debug!(brain_id = %brain_id, user_id = %user_id, removed, "membership removed");
    Ok(())
}

pub async fn brain_users(ctx: &AppContext, brain_id: Uuid) -> Result<Vec<BrainUser>> {
    ctx.store.brain_users(brain_id).await
}

/// Brains the user belongs to, with their rights on each.
pub async fn user_brains(ctx: &AppContext, user_id: Uuid) -> Result<Vec<UserBrain>> {
    Ok(ctx
        .store
        .user_memberships(user_id)
        .await?
        .into_iter()
        .map(|(member, brain)| UserBrain {
            id: brain.id,
            name: brain.name,
            rights: member.rights,
        })
        .collect())
}

pub async fn brain_for_user(
    ctx: &AppContext,
    brain_id: Uuid,
    user_id: Uuid,
) -> Result<Option<UserBrain>> {
    Ok(user_brains(ctx, user_id)
        .await?
        .into_iter()
        .find(|b| b.id == brain_id))
}

pub async fn default_brain(ctx: &AppContext, user_id: Uuid) -> Result<Option<Brain>> {
    match ctx.store.default_brain_id(user_id).await? {
        Some(id) => ctx.store.get_brain(id).await,
        None => Ok(None),
    }
}

/// Make `brain_id` the user's only default brain.
pub async fn set_default_brain(ctx: &AppContext, brain_id: Uuid, user_id: Uuid) -> Result<()> {
    if !ctx.store.set_default_brain(user_id, brain_id).await? {
        return Err(Error::Forbidden(format!(
            "user {} is not a member of brain {}",
            user_id, brain_id
        )));
    }
    tracing::info!(brain_id = %brain_id, user_id = %user_id, "default brain set");
    Ok(())
}

/// The user's default brain, provisioning one (with an `Owner` default
/// membership) on first use.
pub async fn default_brain_or_create(ctx: &AppContext, user_id: Uuid) -> Result<Brain> {
    if let Some(brain) = default_brain(ctx, user_id).await? {
        return Ok(brain);
    }
    let brain = create_brain(ctx, &NewBrain::default()).await?;
    add_user(ctx, brain.id, user_id, Role::Owner, true).await?;
    tracing::info!(brain_id = %brain.id, user_id = %user_id, "default brain provisioned");
    Ok(brain)
}

/// Link vectors to a brain. Links that already exist are left alone.
/// Returns the number of new links.
pub async fn link_vectors(
    ctx: &AppContext,
    brain_id: Uuid,
    vector_ids: &[Uuid],
    file_sha1: &str,
) -> Result<u64> {
    let links: Vec<BrainVector> = vector_ids
        .iter()
        .map(|&vector_id| BrainVector {
            brain_id,
            vector_id,
            file_sha1: file_sha1.to_string(),
        })
        .collect();

    let store = ctx.store.as_ref();
    let links_ref = links.as_slice();
    let inserted = retry_idempotent(ctx.config.store.retry_policy(), "insert_links", move || {
        store.insert_links(links_ref)
    })
    .await?;

    tracing::debug!(brain_id = %brain_id, file_sha1, inserted, "vectors linked");
    Ok(inserted)
}

/// Sum of the sizes of the distinct files behind the brain's links.
pub async fn brain_size(ctx: &AppContext, brain_id: Uuid) -> Result<u64> {
    let vector_ids = ctx.store.brain_vector_ids(brain_id).await?;
    let files = unique_files_from_vector_ids(ctx, &vector_ids).await?;
    Ok(files.iter().map(|f| f.size).sum())
}

pub async fn remaining_brain_size(
    ctx: &AppContext,
    brain_id: Uuid,
    has_credential: bool,
) -> Result<u64> {
    let current = brain_size(ctx, brain_id).await?;
    Ok(ctx.config.quota.policy().remaining(current, has_credential))
}

/// Delete a brain on behalf of `user_id`, who must own it.
///
/// Links go first, then memberships, then the brain row. Vectors that lost
/// their last link are reaped afterwards; a crash before that point leaves
/// orphans for [`reaper::sweep_orphans`].
pub async fn delete_brain(ctx: &AppContext, brain_id: Uuid, user_id: Uuid) -> Result<()> {
    require_role(ctx, brain_id, user_id, OWNERS).await?;

    let vector_ids = ctx.store.brain_vector_ids(brain_id).await?;
    let store = ctx.store.as_ref();
    let links = retry_idempotent(ctx.config.store.retry_policy(), "delete_brain_links", move || {
        store.delete_brain_links(brain_id)
    })
    .await?;
    let members = ctx.store.delete_brain_users(brain_id).await?;
    ctx.store.delete_brain(brain_id).await?;

    let reaped = reaper::delete_orphans(ctx, &vector_ids).await?;
    tracing::info!(
        brain_id = %brain_id,
        links,
        members,
        vectors_deleted = reaped.len(),
        "brain deleted"
    );
    Ok(())
}
