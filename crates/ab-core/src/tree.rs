//! # Tree Operations
//!
//! Builds request-scoped reply trees and performs the structural mutations
//! that must not race each other: root find-or-create, reply insertion,
//! parent reassignment and cascading delete. Those four run under one async
//! mutex, so a subtree delete can never interleave with an insert beneath it.
//!
//! Nothing here is cached; every call reads fresh state from the store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::error::{AppError, Result};
use crate::models::{Entry, EntryId, EntryPatch, NewEntry, Order};
use crate::traits::EntryStore;

/// Replies are always presented oldest first.
pub const REPLY_ORDER: Order = Order::Ascending;

/// An entry with its replies nested beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub entry: Entry,
    pub replies: Vec<TreeNode>,
}

/// One line of a flattened tree, for templates that cannot recurse.
#[derive(Debug, Clone, Copy)]
pub struct TreeRow<'a> {
    pub depth: usize,
    pub entry: &'a Entry,
}

impl TreeNode {
    /// Number of entries in this subtree, the root included.
    pub fn size(&self) -> usize {
        1 + self.replies.iter().map(TreeNode::size).sum::<usize>()
    }

    pub fn find(&self, id: EntryId) -> Option<&TreeNode> {
        if self.entry.id == id {
            return Some(self);
        }
        self.replies.iter().find_map(|r| r.find(id))
    }

    /// Nesting depth of `id` below this node (0 for the node itself).
    pub fn depth_of(&self, id: EntryId) -> Option<usize> {
        if self.entry.id == id {
            return Some(0);
        }
        self.replies.iter().find_map(|r| r.depth_of(id).map(|d| d + 1))
    }

    /// Pre-order listing with depths; siblings keep their reply order.
    pub fn rows(&self) -> Vec<TreeRow<'_>> {
        let mut rows = Vec::with_capacity(self.size());
        let mut stack = vec![(0usize, self)];
        while let Some((depth, node)) = stack.pop() {
            rows.push(TreeRow { depth, entry: &node.entry });
            stack.extend(node.replies.iter().rev().map(|r| (depth + 1, r)));
        }
        rows
    }
}

/// Outcome of [`EntryTree::resolve_or_create_root`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub entry: Entry,
    pub created: bool,
}

pub struct EntryTree {
    store: Arc<dyn EntryStore>,
    structure: Mutex<()>,
}

impl EntryTree {
    pub fn new(store: Arc<dyn EntryStore>) -> Self {
        Self {
            store,
            structure: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn EntryStore> {
        &self.store
    }

    /// Loads `root_id` and every descendant, nesting replies in [`REPLY_ORDER`].
    #[instrument(skip(self))]
    pub async fn build_tree(&self, root_id: EntryId) -> Result<TreeNode> {
        let root = self.store.get(root_id).await?;

        let mut children: HashMap<EntryId, Vec<Entry>> = HashMap::new();
        let mut seen = HashSet::from([root_id]);
        let mut frontier = vec![root_id];
        while let Some(id) = frontier.pop() {
            let mut replies = self.store.list_replies(id, REPLY_ORDER).await?;
            replies.retain(|reply| {
                let fresh = seen.insert(reply.id);
                if !fresh {
                    warn!(id = reply.id, parent_id = id, "reply reached twice, skipping");
                }
                fresh
            });
            frontier.extend(replies.iter().map(|r| r.id));
            children.insert(id, replies);
        }

        Ok(assemble(root, &mut children))
    }

    /// Find-or-create a root by title. The first write wins: later calls with
    /// the same title return the existing entry untouched.
    #[instrument(skip(self, content, name))]
    pub async fn resolve_or_create_root(
        &self,
        title: &str,
        content: Option<String>,
        name: Option<String>,
    ) -> Result<Resolved> {
        let _guard = self.structure.lock().await;

        if let Some(entry) = self.store.find_root_by_title(title).await? {
            return Ok(Resolved { entry, created: false });
        }

        let new = NewEntry {
            name,
            title: Some(title.to_string()),
            content,
            parent_id: None,
        };
        let id = self.store.create(new).await?;
        info!(id, "root entry created");
        Ok(Resolved {
            entry: self.store.get(id).await?,
            created: true,
        })
    }

    /// Inserts a reply while no subtree delete is in flight.
    pub async fn create_reply(&self, new: NewEntry) -> Result<EntryId> {
        let parent_id = new
            .parent_id
            .ok_or_else(|| AppError::validation("reply requires a parent"))?;
        let _guard = self.structure.lock().await;
        let id = self.store.create(new).await?;
        info!(id, parent_id, "reply created");
        Ok(id)
    }

    /// Applies an operator patch. A new parent must not be the entry itself
    /// or any of its descendants.
    #[instrument(skip(self, patch))]
    pub async fn edit(&self, id: EntryId, patch: EntryPatch) -> Result<Entry> {
        let _guard = self.structure.lock().await;
        self.store.get(id).await?;

        if let Some(new_parent) = patch.parent_id {
            if self.subtree_ids(id).await?.contains(&new_parent) {
                return Err(AppError::validation(format!(
                    "entry {new_parent} is inside the subtree of {id}"
                )));
            }
        }
        self.store.update(id, patch).await
    }

    /// Deletes `id` and its whole reply subtree, children before parents.
    /// Returns the removed ids in deletion order.
    #[instrument(skip(self))]
    pub async fn delete_subtree(&self, id: EntryId) -> Result<Vec<EntryId>> {
        let _guard = self.structure.lock().await;
        self.store.get(id).await?;

        let mut doomed = self.subtree_ids(id).await?;
        doomed.reverse();
        self.store.delete_all(&doomed).await?;
        info!(id, removed = doomed.len(), "subtree deleted");
        Ok(doomed)
    }

    /// Pre-order ids of the subtree rooted at `id`; a parent always precedes
    /// its replies.
    async fn subtree_ids(&self, id: EntryId) -> Result<Vec<EntryId>> {
        let mut ids = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            ids.push(current);
            let replies = self.store.list_replies(current, REPLY_ORDER).await?;
            stack.extend(replies.iter().rev().map(|r| r.id));
        }
        Ok(ids)
    }
}

fn assemble(entry: Entry, children: &mut HashMap<EntryId, Vec<Entry>>) -> TreeNode {
    let replies = children
        .remove(&entry.id)
        .unwrap_or_default()
        .into_iter()
        .map(|child| assemble(child, children))
        .collect();
    TreeNode { entry, replies }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEntryStore;

    async fn fixture() -> (EntryTree, Vec<EntryId>) {
        // 1
        // ├── 2
        // │   └── 4
        // │       └── 5
        // └── 3
        // 6 (separate root)
        let store = Arc::new(MemoryEntryStore::new());
        let tree = EntryTree::new(store);
        let r = tree.resolve_or_create_root("root", None, None).await.unwrap().entry.id;
        let a = tree.create_reply(NewEntry::reply(r)).await.unwrap();
        let b = tree.create_reply(NewEntry::reply(r)).await.unwrap();
        let c = tree.create_reply(NewEntry::reply(a)).await.unwrap();
        let d = tree.create_reply(NewEntry::reply(c)).await.unwrap();
        let other = tree.resolve_or_create_root("other", None, None).await.unwrap().entry.id;
        (tree, vec![r, a, b, c, d, other])
    }

    #[tokio::test]
    async fn build_tree_nests_every_descendant_once() {
        let (tree, ids) = fixture().await;
        let node = tree.build_tree(ids[0]).await.unwrap();

        assert_eq!(node.size(), 5);
        assert_eq!(node.depth_of(ids[0]), Some(0));
        assert_eq!(node.depth_of(ids[1]), Some(1));
        assert_eq!(node.depth_of(ids[2]), Some(1));
        assert_eq!(node.depth_of(ids[3]), Some(2));
        assert_eq!(node.depth_of(ids[4]), Some(3));
        assert!(node.find(ids[5]).is_none());

        let order: Vec<_> = node.replies.iter().map(|r| r.entry.id).collect();
        assert_eq!(order, vec![ids[1], ids[2]]);

        // Any ancestor sees the same relative depth.
        let sub = tree.build_tree(ids[1]).await.unwrap();
        assert_eq!(sub.depth_of(ids[4]), Some(2));
    }

    #[tokio::test]
    async fn rows_flatten_in_pre_order() {
        let (tree, ids) = fixture().await;
        let node = tree.build_tree(ids[0]).await.unwrap();
        let rows: Vec<_> = node.rows().iter().map(|r| (r.entry.id, r.depth)).collect();
        assert_eq!(
            rows,
            vec![(ids[0], 0), (ids[1], 1), (ids[3], 2), (ids[4], 3), (ids[2], 1)]
        );
    }

    #[tokio::test]
    async fn build_tree_of_missing_root_is_not_found() {
        let (tree, _) = fixture().await;
        assert!(matches!(tree.build_tree(99).await, Err(AppError::NotFound(99))));
    }

    #[tokio::test]
    async fn first_write_wins_on_title() {
        let store = Arc::new(MemoryEntryStore::new());
        let tree = EntryTree::new(store);
        let first = tree
            .resolve_or_create_root("hello", Some("c1".into()), Some("n1".into()))
            .await
            .unwrap();
        let second = tree
            .resolve_or_create_root("hello", Some("c2".into()), Some("n2".into()))
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.entry.id, second.entry.id);
        assert_eq!(second.entry.content, "c1");
        assert_eq!(second.entry.name, "n1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_find_or_create_yields_one_root() {
        let store = Arc::new(MemoryEntryStore::new());
        let tree = Arc::new(EntryTree::new(store.clone()));
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let tree = Arc::clone(&tree);
                tokio::spawn(async move {
                    tree.resolve_or_create_root("race", Some(format!("c{i}")), None).await
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for task in tasks {
            ids.insert(task.await.unwrap().unwrap().entry.id);
        }
        assert_eq!(ids.len(), 1);
        assert_eq!(store.list_roots(Order::Ascending).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_subtree_removes_children_first_and_spares_others() {
        let (tree, ids) = fixture().await;
        let removed = tree.delete_subtree(ids[1]).await.unwrap();
        assert_eq!(removed, vec![ids[4], ids[3], ids[1]]);

        for id in &removed {
            assert!(matches!(tree.store().get(*id).await, Err(AppError::NotFound(_))));
        }
        for id in [ids[0], ids[2], ids[5]] {
            assert!(tree.store().get(id).await.is_ok());
        }

        let all = tree.delete_subtree(ids[0]).await.unwrap();
        assert_eq!(all, vec![ids[2], ids[0]]);
        assert!(matches!(tree.delete_subtree(ids[0]).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn reply_after_delete_fails_instead_of_orphaning() {
        let (tree, ids) = fixture().await;
        tree.delete_subtree(ids[1]).await.unwrap();
        let err = tree.create_reply(NewEntry::reply(ids[3])).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn delete_subtree_racing_reply_inserts_leaves_no_orphans() {
        let (tree, ids) = fixture().await;
        let tree = Arc::new(tree);
        let (root, deepest, other) = (ids[0], ids[4], ids[5]);

        let inserts: Vec<_> = (0..32)
            .map(|i| {
                let tree = Arc::clone(&tree);
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        tokio::task::yield_now().await;
                    }
                    tree.create_reply(NewEntry::reply(deepest)).await
                })
            })
            .collect();
        let delete = {
            let tree = Arc::clone(&tree);
            tokio::spawn(async move { tree.delete_subtree(root).await })
        };

        let mut inserted = 0;
        for task in inserts {
            match task.await.unwrap() {
                Ok(_) => inserted += 1,
                Err(AppError::NotFound(id)) => assert_eq!(id, deepest),
                Err(err) => panic!("unexpected insert error: {err}"),
            }
        }
        let removed = delete.await.unwrap().unwrap();
        assert_eq!(removed.len(), 5 + inserted);

        let store = tree.store();
        for reply in store.list_all_replies().await.unwrap() {
            let parent = reply.parent_id.unwrap();
            assert!(store.get(parent).await.is_ok(), "reply {} lost parent {parent}", reply.id);
        }
        assert!(store.list_all_replies().await.unwrap().is_empty());
        assert!(matches!(store.get(root).await, Err(AppError::NotFound(_))));
        assert!(store.get(other).await.is_ok());
    }

    #[tokio::test]
    async fn edit_refuses_to_create_a_cycle() {
        let (tree, ids) = fixture().await;

        let onto_self = EntryPatch { parent_id: Some(ids[1]), ..Default::default() };
        assert!(matches!(tree.edit(ids[1], onto_self).await, Err(AppError::ValidationError(_))));

        let onto_descendant = EntryPatch { parent_id: Some(ids[4]), ..Default::default() };
        assert!(matches!(tree.edit(ids[1], onto_descendant).await, Err(AppError::ValidationError(_))));

        let elsewhere = EntryPatch { parent_id: Some(ids[5]), ..Default::default() };
        let moved = tree.edit(ids[1], elsewhere).await.unwrap();
        assert_eq!(moved.parent_id, Some(ids[5]));
        assert_eq!(tree.build_tree(ids[5]).await.unwrap().depth_of(ids[4]), Some(3));
    }
}
