//! # Board Service
//!
//! The entry point used by the web layer and the operator CLI. Public
//! submissions pass the Identity Guard, then the Markup Renderer, then reach
//! the store through [`EntryTree`]. Operator calls skip the guard but still
//! render their content, so every stored body is sanitized.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::error::{AppError, Result};
use crate::identity::{IdentityGuard, OperatorName};
use crate::models::{Entry, EntryId, EntryPatch, NewEntry, Order, Reaction};
use crate::traits::{EntryStore, MarkupRenderer};
use crate::tree::{EntryTree, Resolved, TreeNode};

pub struct Board {
    tree: EntryTree,
    guard: IdentityGuard,
    renderer: Box<dyn MarkupRenderer>,
}

impl Board {
    pub fn new(
        store: Arc<dyn EntryStore>,
        renderer: Box<dyn MarkupRenderer>,
        operator: OperatorName,
    ) -> Self {
        Self {
            tree: EntryTree::new(store),
            guard: IdentityGuard::new(operator),
            renderer,
        }
    }

    pub fn operator(&self) -> &OperatorName {
        self.guard.reserved()
    }

    fn store(&self) -> &Arc<dyn EntryStore> {
        self.tree.store()
    }

    /// Find-or-create a root entry. Without a name the post belongs to the operator.
    #[instrument(skip(self, content, name))]
    pub async fn submit_root(
        &self,
        title: &str,
        content: Option<&str>,
        name: Option<&str>,
    ) -> Result<Resolved> {
        if title.trim().is_empty() {
            return Err(AppError::validation("a post needs a title"));
        }
        let name = self
            .guard
            .check(name)?
            .unwrap_or_else(|| self.operator().to_string());
        let content = content.map(|c| self.renderer.render(c));
        self.tree
            .resolve_or_create_root(title, content, Some(name))
            .await
    }

    /// Public reply. `content` is required; a supplied name must not contain
    /// the operator name.
    #[instrument(skip(self, content, name, title))]
    pub async fn submit_reply(
        &self,
        parent_id: EntryId,
        content: &str,
        name: Option<&str>,
        title: Option<&str>,
    ) -> Result<EntryId> {
        if content.trim().is_empty() {
            return Err(AppError::validation("content is required"));
        }
        let name = self.guard.check(name)?;
        let new = NewEntry {
            name,
            title: title.filter(|t| !t.is_empty()).map(str::to_string),
            content: Some(self.renderer.render(content)),
            parent_id: Some(parent_id),
        };
        self.tree.create_reply(new).await
    }

    pub async fn render_tree(&self, root_id: EntryId) -> Result<TreeNode> {
        self.tree.build_tree(root_id).await
    }

    /// Returns the new value of the bumped counter.
    #[instrument(skip(self))]
    pub async fn bump(&self, id: EntryId, direction: Reaction) -> Result<u64> {
        self.store().increment(id, direction).await
    }

    pub async fn get(&self, id: EntryId) -> Result<Entry> {
        self.store().get(id).await
    }

    pub async fn list_roots(&self, order: Order) -> Result<Vec<Entry>> {
        self.store().list_roots(order).await
    }

    pub async fn list_replies(&self) -> Result<Vec<Entry>> {
        self.store().list_all_replies().await
    }

    /// Operator edit; new content is rendered like any submission.
    #[instrument(skip(self, patch))]
    pub async fn admin_edit(&self, id: EntryId, mut patch: EntryPatch) -> Result<Entry> {
        if patch.is_empty() {
            return Err(AppError::validation("nothing to change"));
        }
        if let Some(content) = patch.content.take() {
            patch.content = Some(self.renderer.render(&content));
        }
        let entry = self.tree.edit(id, patch).await?;
        info!(id, "entry edited by operator");
        Ok(entry)
    }

    /// Removes `id` with all its replies; returns the deleted ids.
    pub async fn admin_delete(&self, id: EntryId) -> Result<Vec<EntryId>> {
        self.tree.delete_subtree(id).await
    }

    /// Operator find-or-create of a root. Any name is allowed, the operator's
    /// own included; without one the post belongs to the operator.
    #[instrument(skip(self, content, name))]
    pub async fn admin_create_root(
        &self,
        title: &str,
        content: Option<&str>,
        name: Option<&str>,
    ) -> Result<Resolved> {
        if title.trim().is_empty() {
            return Err(AppError::validation("a post needs a title"));
        }
        let name = name
            .filter(|n| !n.is_empty())
            .map_or_else(|| self.operator().to_string(), str::to_string);
        let content = content.map(|c| self.renderer.render(c));
        self.tree
            .resolve_or_create_root(title, content, Some(name))
            .await
    }

    /// Operator insert with free-form fields. With a parent it is a reply
    /// (missing name falls back to the store default); without one it is a
    /// root and needs a title.
    #[instrument(skip(self, content, title, name))]
    pub async fn admin_create(
        &self,
        content: &str,
        parent_id: Option<EntryId>,
        title: Option<&str>,
        name: Option<&str>,
    ) -> Result<EntryId> {
        let Some(parent_id) = parent_id else {
            let title = title.ok_or_else(|| AppError::validation("a post needs a title"))?;
            let resolved = self.admin_create_root(title, Some(content), name).await?;
            return Ok(resolved.entry.id);
        };
        let new = NewEntry {
            name: name.filter(|n| !n.is_empty()).map(str::to_string),
            title: title.filter(|t| !t.is_empty()).map(str::to_string),
            content: Some(self.renderer.render(content)),
            parent_id: Some(parent_id),
        };
        self.tree.create_reply(new).await
    }

    /// Reply posted under the operator's name, bypassing the guard.
    #[instrument(skip(self, content, title))]
    pub async fn admin_create_reply(
        &self,
        content: &str,
        parent_id: EntryId,
        title: Option<&str>,
    ) -> Result<EntryId> {
        if content.trim().is_empty() {
            return Err(AppError::validation("content is required"));
        }
        let new = NewEntry::reply(parent_id)
            .with_name(self.operator().as_str())
            .with_title(title.map(str::to_string))
            .with_content(self.renderer.render(content));
        self.tree.create_reply(new).await
    }
}
