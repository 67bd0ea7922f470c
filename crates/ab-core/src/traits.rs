//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Entry, EntryId, EntryPatch, NewEntry, Order, Reaction};

/// Persistence contract for entries.
///
/// The store owns identity, referential integrity and ordering. It never
/// cascades: removing a subtree is the tree layer's job, built on
/// [`EntryStore::delete_all`].
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Inserts with a server-assigned id and `created_at`.
    /// `NotFound` when `parent_id` does not resolve.
    async fn create(&self, entry: NewEntry) -> Result<EntryId>;

    async fn get(&self, id: EntryId) -> Result<Entry>;

    /// Lookup among entries without a parent.
    async fn find_root_by_title(&self, title: &str) -> Result<Option<Entry>>;

    async fn list_roots(&self, order: Order) -> Result<Vec<Entry>>;

    /// Direct replies of `parent_id` only.
    async fn list_replies(&self, parent_id: EntryId, order: Order) -> Result<Vec<Entry>>;

    /// Every entry that has a parent, oldest first.
    async fn list_all_replies(&self) -> Result<Vec<Entry>>;

    /// `NotFound` for a missing `id`, `ValidationError` for an unresolvable new parent.
    async fn update(&self, id: EntryId, patch: EntryPatch) -> Result<Entry>;

    /// Atomic `+1`, returns the new count.
    async fn increment(&self, id: EntryId, reaction: Reaction) -> Result<u64>;

    async fn increment_like(&self, id: EntryId) -> Result<u64> {
        self.increment(id, Reaction::Like).await
    }

    async fn increment_dislike(&self, id: EntryId) -> Result<u64> {
        self.increment(id, Reaction::Dislike).await
    }

    /// Deletes exactly one record. Refuses while the entry still has replies.
    async fn delete(&self, id: EntryId) -> Result<()>;

    /// Deletes `ids` in the given order as one unit: all or nothing.
    async fn delete_all(&self, ids: &[EntryId]) -> Result<()>;
}

/// Converts author markup into output that is safe to embed verbatim.
pub trait MarkupRenderer: Send + Sync {
    fn render(&self, source: &str) -> String;
}
