//! Storage abstraction for brainstore.
//!
//! The [`Store`] trait covers the four tables the ingestion pipeline works
//! against: `brains`, `brains_users` (memberships), `brains_vectors` (links)
//! and `vectors`. Implementations decode rows into typed records and report
//! failures as [`Error::Store`](crate::Error::Store) with a transient flag.
//!
//! Every write that the pipeline retries is idempotent: vector inserts and
//! link inserts ignore rows that already exist, and deletes of missing rows
//! succeed with a zero count.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Brain, BrainUpdate, BrainUser, BrainVector, FileSummary, NewBrain, NewVector, VectorRecord,
};

/// Abstract storage backend.
///
/// # Operations
///
/// | Group | Methods |
/// |-------|---------|
/// | brains | [`insert_brain`](Store::insert_brain), [`get_brain`](Store::get_brain), [`update_brain`](Store::update_brain), [`delete_brain`](Store::delete_brain) |
/// | memberships | [`insert_brain_user`](Store::insert_brain_user), [`get_brain_user`](Store::get_brain_user), [`brain_users`](Store::brain_users), [`user_memberships`](Store::user_memberships), [`delete_brain_user`](Store::delete_brain_user), [`delete_brain_users`](Store::delete_brain_users), [`set_default_brain`](Store::set_default_brain), [`default_brain_id`](Store::default_brain_id) |
/// | vectors | [`insert_vectors`](Store::insert_vectors), [`vector_ids_by_file_sha1`](Store::vector_ids_by_file_sha1), [`vector_ids_by_file_name`](Store::vector_ids_by_file_name), [`vectors_by_file_name`](Store::vectors_by_file_name), [`file_summaries`](Store::file_summaries), [`delete_orphaned_vectors`](Store::delete_orphaned_vectors), [`unlinked_vector_ids`](Store::unlinked_vector_ids) |
/// | links | [`insert_links`](Store::insert_links), [`brain_has_file`](Store::brain_has_file), [`brain_vector_ids`](Store::brain_vector_ids), [`brains_for_vector`](Store::brains_for_vector), [`delete_links`](Store::delete_links), [`delete_brain_links`](Store::delete_brain_links) |
#[async_trait]
pub trait Store: Send + Sync {
    // ---- brains ----

    /// Insert a brain, assigning its id.
    async fn insert_brain(&self, brain: &NewBrain) -> Result<Brain>;

    async fn get_brain(&self, id: Uuid) -> Result<Option<Brain>>;

    /// Apply `update`. Returns `false` when the brain does not exist.
    async fn update_brain(&self, id: Uuid, update: &BrainUpdate) -> Result<bool>;

    /// Delete the brain row only. Returns `false` when it did not exist.
    async fn delete_brain(&self, id: Uuid) -> Result<bool>;

    // ---- memberships ----

    async fn insert_brain_user(&self, member: &BrainUser) -> Result<()>;

    async fn get_brain_user(&self, brain_id: Uuid, user_id: Uuid) -> Result<Option<BrainUser>>;

    async fn brain_users(&self, brain_id: Uuid) -> Result<Vec<BrainUser>>;

    /// All memberships of a user, each paired with its brain.
    async fn user_memberships(&self, user_id: Uuid) -> Result<Vec<(BrainUser, Brain)>>;

    async fn delete_brain_user(&self, brain_id: Uuid, user_id: Uuid) -> Result<u64>;

    async fn delete_brain_users(&self, brain_id: Uuid) -> Result<u64>;

    /// Clear any default flag the user holds, then flag `brain_id`.
    ///
    /// Returns `false` (and changes nothing) when the user is not a member of
    /// `brain_id`.
    async fn set_default_brain(&self, user_id: Uuid, brain_id: Uuid) -> Result<bool>;

    async fn default_brain_id(&self, user_id: Uuid) -> Result<Option<Uuid>>;

    // ---- vectors ----

    /// Insert vectors with their writer-assigned ids. Ids already present are
    /// left untouched. Returns the number of rows actually inserted.
    async fn insert_vectors(&self, vectors: &[NewVector]) -> Result<u64>;

    async fn vector_ids_by_file_sha1(&self, file_sha1: &str) -> Result<Vec<Uuid>>;

    async fn vector_ids_by_file_name(&self, file_name: &str) -> Result<Vec<Uuid>>;

    /// Full rows for a file name, in insertion order.
    async fn vectors_by_file_name(&self, file_name: &str) -> Result<Vec<VectorRecord>>;

    /// `(file_name, file_size)` of each distinct listed vector that still
    /// exists. One entry per vector, so one file usually appears many times.
    async fn file_summaries(&self, vector_ids: &[Uuid]) -> Result<Vec<FileSummary>>;

    /// Delete every candidate that no link references, as one atomic step.
    /// Returns the ids that were deleted.
    async fn delete_orphaned_vectors(&self, candidates: &[Uuid]) -> Result<Vec<Uuid>>;

    /// Vectors with no link that were created before `created_before`.
    async fn unlinked_vector_ids(&self, created_before: DateTime<Utc>) -> Result<Vec<Uuid>>;

    // ---- links ----

    /// Insert links; existing `(brain_id, vector_id)` pairs are skipped.
    /// Returns the number of links actually inserted.
    async fn insert_links(&self, links: &[BrainVector]) -> Result<u64>;

    async fn brain_has_file(&self, brain_id: Uuid, file_sha1: &str) -> Result<bool>;

    async fn brain_vector_ids(&self, brain_id: Uuid) -> Result<Vec<Uuid>>;

    /// Brains linking the vector, oldest link first.
    async fn brains_for_vector(&self, vector_id: Uuid) -> Result<Vec<Uuid>>;

    async fn delete_links(&self, brain_id: Uuid, vector_ids: &[Uuid]) -> Result<u64>;

    async fn delete_brain_links(&self, brain_id: Uuid) -> Result<u64>;
}

/// Ids in `ids` that are not in `referenced`, preserving order.
pub fn unreferenced(ids: &[Uuid], referenced: &HashSet<Uuid>) -> Vec<Uuid> {
    ids.iter()
        .filter(|id| !referenced.contains(id))
        .copied()
        .collect()
}
