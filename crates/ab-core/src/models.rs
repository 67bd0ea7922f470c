//! # Domain Models
//!
//! The board has a single entity, the [`Entry`]. Posts and replies share the
//! same record; a missing `parent_id` marks a post (root entry).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Store-assigned, strictly increasing identifier.
pub type EntryId = i64;

pub const DEFAULT_NAME: &str = "anonymous";
pub const DEFAULT_CONTENT: &str = "nothing...";

/// Upper bound on `name`, in characters.
pub const NAME_MAX_CHARS: usize = 60;
/// Upper bound on `title`, in characters.
pub const TITLE_MAX_CHARS: usize = 300;

/// A post or a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub name: String,
    /// Lookup key for root entries; optional on replies.
    pub title: Option<String>,
    /// Rendered, already sanitized body.
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub like_count: u64,
    pub dislike_count: u64,
    /// `None` for a root entry.
    pub parent_id: Option<EntryId>,
}

impl Entry {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Insert payload. Missing fields fall back to the store defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    pub name: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub parent_id: Option<EntryId>,
}

impl NewEntry {
    pub fn root(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn reply(parent_id: EntryId) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    /// Checks field bounds. Parent resolution is the store's job.
    pub fn validate(&self) -> Result<()> {
        check_bounds(self.name.as_deref(), self.title.as_deref())
    }

    pub fn name_or_default(&self) -> String {
        self.name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_NAME.to_string())
    }

    pub fn content_or_default(&self) -> String {
        self.content
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTENT.to_string())
    }
}

/// Partial update applied by the operator. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPatch {
    pub content: Option<String>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub parent_id: Option<EntryId>,
}

impl EntryPatch {
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.title.is_none() && self.name.is_none() && self.parent_id.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        check_bounds(self.name.as_deref(), self.title.as_deref())
    }

    /// Applies every present field onto `entry`.
    pub fn apply_to(&self, entry: &mut Entry) {
        if let Some(content) = &self.content {
            entry.content = content.clone();
        }
        if let Some(title) = &self.title {
            entry.title = Some(title.clone());
        }
        if let Some(name) = &self.name {
            entry.name = name.clone();
        }
        if let Some(parent_id) = self.parent_id {
            entry.parent_id = Some(parent_id);
        }
    }
}

/// Listing order on `created_at`; ties always break on ascending `id`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

impl Order {
    /// Sorts in place by `(created_at, id)` honouring the direction for the timestamp.
    pub fn sort(self, entries: &mut [Entry]) {
        entries.sort_by(|a, b| {
            let by_time = match self {
                Order::Ascending => a.created_at.cmp(&b.created_at),
                Order::Descending => b.created_at.cmp(&a.created_at),
            };
            by_time.then(a.id.cmp(&b.id))
        });
    }
}

/// Direction of an engagement bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
    Like,
    Dislike,
}

fn check_bounds(name: Option<&str>, title: Option<&str>) -> Result<()> {
    if let Some(name) = name {
        if name.chars().count() > NAME_MAX_CHARS {
            return Err(AppError::validation(format!(
                "name exceeds {NAME_MAX_CHARS} characters"
            )));
        }
    }
    if let Some(title) = title {
        if title.chars().count() > TITLE_MAX_CHARS {
            return Err(AppError::validation(format!(
                "title exceeds {TITLE_MAX_CHARS} characters"
            )));
        }
    }
    Ok(())
}
