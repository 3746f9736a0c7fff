//! In-memory [`Store`] implementation for tests and embedded use.
//!
//! All four tables live behind a single `std::sync::RwLock`, so every trait
//! method observes and mutates a consistent snapshot. That makes the
//! multi-row operations (`set_default_brain`, `delete_orphaned_vectors`)
//! atomic without further bookkeeping.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    Brain, BrainUpdate, BrainUser, BrainVector, FileSummary, NewBrain, NewVector, VectorRecord,
};

use super::Store;

#[derive(Default)]
struct State {
    brains: HashMap<Uuid, Brain>,
    members: Vec<BrainUser>,
    /// Links in insertion order.
    links: Vec<BrainVector>,
    /// Vector rows keyed by id, with an insertion sequence number.
    vectors: HashMap<Uuid, (u64, VectorRecord)>,
    next_seq: u64,
}

impl State {
    fn linked_ids(&self) -> HashSet<Uuid> {
        self.links.iter().map(|l| l.vector_id).collect()
    }

    fn vectors_in_order(&self) -> Vec<&VectorRecord> {
        let mut rows: Vec<&(u64, VectorRecord)> = self.vectors.values().collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, v)| v).collect()
    }
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| Error::Internal("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| Error::Internal("in-memory store lock poisoned".into()))
    }

    /// Backdate a vector's creation time. Used to exercise age-based sweeps.
    pub fn set_vector_created_at(&self, id: Uuid, created_at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.write()?;
        Ok(match state.vectors.get_mut(&id) {
            Some((_, row)) => {
                row.created_at = created_at;
                true
            }
            None => false,
        })
    }

    pub fn vector_count(&self) -> Result<usize> {
        Ok(self.read()?.vectors.len())
    }

    pub fn link_count(&self) -> Result<usize> {
        Ok(self.read()?.links.len())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_brain(&self, brain: &NewBrain) -> Result<Brain> {
        let row = Brain {
            id: Uuid::new_v4(),
            name: brain.name.clone(),
            description: brain.description.clone(),
            status: brain.status.clone(),
            model: brain.model.clone(),
            temperature: brain.temperature,
            max_tokens: brain.max_tokens,
            openai_api_key: brain.openai_api_key.clone(),
            created_at: Utc::now(),
        };
        self.write()?.brains.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_brain(&self, id: Uuid) -> Result<Option<Brain>> {
        Ok(self.read()?.brains.get(&id).cloned())
    }

    async fn update_brain(&self, id: Uuid, update: &BrainUpdate) -> Result<bool> {
        let mut state = self.write()?;
        Ok(match state.brains.get_mut(&id) {
            Some(brain) => {
                update.apply(brain);
                true
            }
            None => false,
        })
    }

    async fn delete_brain(&self, id: Uuid) -> Result<bool> {
        Ok(self.write()?.brains.remove(&id).is_some())
    }

    async fn insert_brain_user(&self, member: &BrainUser) -> Result<()> {
        let mut state = self.write()?;
        if state
            .members
            .iter()
            .any(|m| m.brain_id == member.brain_id && m.user_id == member.user_id)
        {
            return Err(Error::InvalidInput(format!(
                "user {} is already a member of brain {}",
                member.user_id, member.brain_id
            )));
        }
        if member.default_brain {
            for m in state.members.iter_mut() {
                if m.user_id == member.user_id {
                    m.default_brain = false;
                }
            }
        }
        state.members.push(member.clone());
        Ok(())
    }

    async fn get_brain_user(&self, brain_id: Uuid, user_id: Uuid) -> Result<Option<BrainUser>> {
        Ok(self
            .read()?
            .members
            .iter()
            .find(|m| m.brain_id == brain_id && m.user_id == user_id)
            .cloned())
    }

    async fn brain_users(&self, brain_id: Uuid) -> Result<Vec<BrainUser>> {
        Ok(self
            .read()?
            .members
            .iter()
            .filter(|m| m.brain_id == brain_id)
            .cloned()
            .collect())
    }

    async fn user_memberships(&self, user_id: Uuid) -> Result<Vec<(BrainUser, Brain)>> {
        let state = self.read()?;
        Ok(state
            .members
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| state.brains.get(&m.brain_id).map(|b| (m.clone(), b.clone())))
            .collect())
    }

    async fn delete_brain_user(&self, brain_id: Uuid, user_id: Uuid) -> Result<u64> {
        let mut state = self.write()?;
        let before = state.members.len();
        state
            .members
            .retain(|m| !(m.brain_id == brain_id && m.user_id == user_id));
        Ok((before - state.members.len()) as u64)
    }

    async fn delete_brain_users(&self, brain_id: Uuid) -> Result<u64> {
        let mut state = self.write()?;
        let before = state.members.len();
        state.members.retain(|m| m.brain_id != brain_id);
        Ok((before - state.members.len()) as u64)
    }

    async fn set_default_brain(&self, user_id: Uuid, brain_id: Uuid) -> Result<bool> {
        let mut state = self.write()?;
        if !state
            .members
            .iter()
            .any(|m| m.user_id == user_id && m.brain_id == brain_id)
        {
            return Ok(false);
        }
        for m in state.members.iter_mut().filter(|m| m.user_id == user_id) {
            m.default_brain = m.brain_id == brain_id;
        }
        Ok(true)
    }

    async fn default_brain_id(&self, user_id: Uuid) -> Result<Option<Uuid>> {
        Ok(self
            .read()?
            .members
            .iter()
            .find(|m| m.user_id == user_id && m.default_brain)
            .map(|m| m.brain_id))
    }

    async fn insert_vectors(&self, vectors: &[NewVector]) -> Result<u64> {
        let mut state = self.write()?;
        let now = Utc::now();
        let mut inserted = 0;
        for v in vectors {
            if state.vectors.contains_key(&v.id) {
                continue;
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.vectors.insert(
                v.id,
                (
                    seq,
                    VectorRecord {
                        id: v.id,
                        content: v.content.clone(),
                        metadata: v.metadata.clone(),
                        embedding: v.embedding.clone(),
                        created_at: now,
                    },
                ),
            );
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn vector_ids_by_file_sha1(&self, file_sha1: &str) -> Result<Vec<Uuid>> {
        Ok(self
            .read()?
            .vectors_in_order()
            .into_iter()
            .filter(|v| v.metadata.file_sha1 == file_sha1)
            .map(|v| v.id)
            .collect())
    }

    async fn vector_ids_by_file_name(&self, file_name: &str) -> Result<Vec<Uuid>> {
        Ok(self
            .read()?
            .vectors_in_order()
            .into_iter()
            .filter(|v| v.metadata.file_name == file_name)
            .map(|v| v.id)
            .collect())
    }

    async fn vectors_by_file_name(&self, file_name: &str) -> Result<Vec<VectorRecord>> {
        Ok(self
            .read()?
            .vectors_in_order()
            .into_iter()
            .filter(|v| v.metadata.file_name == file_name)
            .cloned()
            .collect())
    }

    async fn file_summaries(&self, vector_ids: &[Uuid]) -> Result<Vec<FileSummary>> {
        let state = self.read()?;
        let mut seen = HashSet::new();
        Ok(vector_ids
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| state.vectors.get(id))
            .map(|(_, v)| FileSummary {
                name: v.metadata.file_name.clone(),
                size: v.metadata.file_size,
            })
            .collect())
    }

    async fn delete_orphaned_vectors(&self, candidates: &[Uuid]) -> Result<Vec<Uuid>> {
        let mut state = self.write()?;
        let linked = state.linked_ids();
        let mut deleted = Vec::new();
        for id in super::unreferenced(candidates, &linked) {
            if state.vectors.remove(&id).is_some() {
                deleted.push(id);
            }
        }
        Ok(deleted)
    }

    async fn unlinked_vector_ids(&self, created_before: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let state = self.read()?;
        let linked = state.linked_ids();
        Ok(state
            .vectors_in_order()
            .into_iter()
            .filter(|v| v.created_at < created_before && !linked.contains(&v.id))
            .map(|v| v.id)
            .collect())
    }

    async fn insert_links(&self, links: &[BrainVector]) -> Result<u64> {
        let mut state = self.write()?;
        let mut inserted = 0;
        for link in links {
            if state
                .links
                .iter()
                .any(|l| l.brain_id == link.brain_id && l.vector_id == link.vector_id)
            {
                continue;
            }
            state.links.push(link.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn brain_has_file(&self, brain_id: Uuid, file_sha1: &str) -> Result<bool> {
        Ok(self
            .read()?
            .links
            .iter()
            .any(|l| l.brain_id == brain_id && l.file_sha1 == file_sha1))
    }

    async fn brain_vector_ids(&self, brain_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .read()?
            .links
            .iter()
            .filter(|l| l.brain_id == brain_id)
            .map(|l| l.vector_id)
            .collect())
    }

    async fn brains_for_vector(&self, vector_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .read()?
            .links
            .iter()
            .filter(|l| l.vector_id == vector_id)
            .map(|l| l.brain_id)
            .collect())
    }

    async fn delete_links(&self, brain_id: Uuid, vector_ids: &[Uuid]) -> Result<u64> {
        let targets: HashSet<&Uuid> = vector_ids.iter().collect();
        let mut state = self.write()?;
        let before = state.links.len();
        state
            .links
            .retain(|l| !(l.brain_id == brain_id && targets.contains(&l.vector_id)));
        Ok((before - state.links.len()) as u64)
    }

    async fn delete_brain_links(&self, brain_id: Uuid) -> Result<u64> {
        let mut state = self.write()?;
        let before = state.links.len();
        state.links.retain(|l| l.brain_id != brain_id);
        Ok((before - state.links.len()) as u64)
    }
}
