//! # In-process Entry Store
//!
//! An arena of entries keyed by id plus a parent → replies index. Every
//! mutation happens under one write lock, which gives the atomicity the
//! store contract asks for (counter bumps, batch deletes) without a database.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::{Entry, EntryId, EntryPatch, NewEntry, Order, Reaction};
use crate::traits::EntryStore;

#[derive(Debug, Default)]
struct Arena {
    entries: BTreeMap<EntryId, Entry>,
    replies: HashMap<EntryId, BTreeSet<EntryId>>,
    last_id: EntryId,
}

impl Arena {
    fn entry(&self, id: EntryId) -> Result<&Entry> {
        self.entries.get(&id).ok_or(AppError::NotFound(id))
    }

    fn has_replies(&self, id: EntryId) -> bool {
        self.replies.get(&id).is_some_and(|r| !r.is_empty())
    }

    fn link(&mut self, parent_id: EntryId, child: EntryId) {
        self.replies.entry(parent_id).or_default().insert(child);
    }

    fn unlink(&mut self, parent_id: EntryId, child: EntryId) {
        if let Some(set) = self.replies.get_mut(&parent_id) {
            set.remove(&child);
            if set.is_empty() {
                self.replies.remove(&parent_id);
            }
        }
    }

    fn remove(&mut self, id: EntryId) {
        if let Some(entry) = self.entries.remove(&id) {
            if let Some(parent_id) = entry.parent_id {
                self.unlink(parent_id, id);
            }
        }
        self.replies.remove(&id);
    }
}

#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    arena: RwLock<Arena>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.arena.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn create(&self, new: NewEntry) -> Result<EntryId> {
        new.validate()?;
        let mut arena = self.arena.write().await;
        if let Some(parent_id) = new.parent_id {
            arena.entry(parent_id)?;
        }

        arena.last_id += 1;
        let id = arena.last_id;
        let entry = Entry {
            id,
            name: new.name_or_default(),
            title: new.title.clone(),
            content: new.content_or_default(),
            created_at: Utc::now(),
            like_count: 0,
            dislike_count: 0,
            parent_id: new.parent_id,
        };
        if let Some(parent_id) = entry.parent_id {
            arena.link(parent_id, id);
        }
        arena.entries.insert(id, entry);
        debug!(id, parent_id = ?new.parent_id, "entry created");
        Ok(id)
    }

    async fn get(&self, id: EntryId) -> Result<Entry> {
        self.arena.read().await.entry(id).cloned()
    }

    async fn find_root_by_title(&self, title: &str) -> Result<Option<Entry>> {
        let arena = self.arena.read().await;
        Ok(arena
            .entries
            .values()
            .find(|e| e.is_root() && e.title.as_deref() == Some(title))
            .cloned())
    }

    async fn list_roots(&self, order: Order) -> Result<Vec<Entry>> {
        let arena = self.arena.read().await;
        let mut roots: Vec<Entry> = arena.entries.values().filter(|e| e.is_root()).cloned().collect();
        order.sort(&mut roots);
        Ok(roots)
    }

    async fn list_replies(&self, parent_id: EntryId, order: Order) -> Result<Vec<Entry>> {
        let arena = self.arena.read().await;
        let mut replies: Vec<Entry> = arena
            .replies
            .get(&parent_id)
            .into_iter()
            .flatten()
            .filter_map(|id| arena.entries.get(id).cloned())
            .collect();
        order.sort(&mut replies);
        Ok(replies)
    }

    async fn list_all_replies(&self) -> Result<Vec<Entry>> {
        let arena = self.arena.read().await;
        let mut replies: Vec<Entry> = arena.entries.values().filter(|e| !e.is_root()).cloned().collect();
        Order::Ascending.sort(&mut replies);
        Ok(replies)
    }

    async fn update(&self, id: EntryId, patch: EntryPatch) -> Result<Entry> {
        patch.validate()?;
        let mut arena = self.arena.write().await;
        let old_parent = arena.entry(id)?.parent_id;

        if let Some(new_parent) = patch.parent_id {
            if !arena.entries.contains_key(&new_parent) {
                return Err(AppError::validation(format!(
                    "parent {new_parent} does not exist"
                )));
            }
            if old_parent != Some(new_parent) {
                if let Some(old) = old_parent {
                    arena.unlink(old, id);
                }
                arena.link(new_parent, id);
            }
        }

        let entry = arena.entries.get_mut(&id).ok_or(AppError::NotFound(id))?;
        patch.apply_to(entry);
        Ok(entry.clone())
    }

    async fn increment(&self, id: EntryId, reaction: Reaction) -> Result<u64> {
        let mut arena = self.arena.write().await;
        let entry = arena.entries.get_mut(&id).ok_or(AppError::NotFound(id))?;
        let counter = match reaction {
            Reaction::Like => &mut entry.like_count,
            Reaction::Dislike => &mut entry.dislike_count,
        };
        *counter += 1;
        Ok(*counter)
    }

    async fn delete(&self, id: EntryId) -> Result<()> {
        let mut arena = self.arena.write().await;
        arena.entry(id)?;
        if arena.has_replies(id) {
            return Err(AppError::validation(format!("entry {id} still has replies")));
        }
        arena.remove(id);
        Ok(())
    }

    async fn delete_all(&self, ids: &[EntryId]) -> Result<()> {
        let mut arena = self.arena.write().await;
        let doomed: HashSet<EntryId> = ids.iter().copied().collect();

        // Validate the whole batch before touching anything.
        for &id in ids {
            arena.entry(id)?;
            let survivors = arena
                .replies
                .get(&id)
                .into_iter()
                .flatten()
                .any(|child| !doomed.contains(child));
            if survivors {
                return Err(AppError::validation(format!(
                    "deleting entry {id} would orphan its replies"
                )));
            }
        }

        for &id in ids {
            arena.remove(id);
        }
        debug!(count = ids.len(), "entries deleted");
        Ok(())
    }
}
