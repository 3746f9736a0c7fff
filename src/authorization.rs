//! Role checks against brain membership.
//!
//! Every mutating flow calls [`require_role`] before touching the store.

use brainstore_core::models::{BrainUser, Role};
use brainstore_core::{Error, Result};
use uuid::Uuid;

use crate::context::AppContext;

pub const ANY_MEMBER: &[Role] = &[Role::Owner, Role::Editor, Role::Viewer];
pub const EDITORS: &[Role] = &[Role::Owner, Role::Editor];
pub const OWNERS: &[Role] = &[Role::Owner];

/// Return the caller's membership when it grants one of `allowed`.
///
/// Fails with [`Error::BrainNotFound`] for an unknown brain and
/// [`Error::Forbidden`] when the user is not a member or holds another role.
pub async fn require_role(
    ctx: &AppContext,
    brain_id: Uuid,
    user_id: Uuid,
    allowed: &[Role],
) -> Result<BrainUser> {
    if ctx.store.get_brain(brain_id).await?.is_none() {
        return Err(Error::BrainNotFound(brain_id));
    }

    let membership = ctx
        .store
        .get_brain_user(brain_id, user_id)
        .await?
        .ok_or_else(|| Error::Forbidden(format!("user {} has no access to brain {}", user_id, brain_id)))?;

    if !allowed.contains(&membership.rights) {
        let names: Vec<&str> = allowed.iter().map(|r| r.as_str()).collect();
        return Err(Error::Forbidden(format!(
            "this operation requires one of these roles: {}",
            names.join(", ")
        )));
    }

    Ok(membership)
}
