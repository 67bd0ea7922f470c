//! anon-board/crates/ab-core/src/lib.rs
//!
//! The comment-tree domain logic and interface definitions for anon-board.

pub mod board;
pub mod error;
pub mod identity;
pub mod memory;
pub mod models;
pub mod traits;
pub mod tree;

// Re-exporting for easier access in other crates
pub use board::*;
pub use error::*;
pub use identity::*;
pub use memory::MemoryEntryStore;
pub use models::*;
pub use traits::*;
pub use tree::*;

#[cfg(test)]
mod tests {
    use super::models::*;

    #[test]
    fn entry_serializes_with_flat_reply_tree() {
        let entry = Entry {
            id: 1,
            name: DEFAULT_NAME.to_string(),
            title: Some("hello".to_string()),
            content: "<p>world</p>".to_string(),
            created_at: chrono::Utc::now(),
            like_count: 2,
            dislike_count: 0,
            parent_id: None,
        };
        let node = super::TreeNode { entry: entry.clone(), replies: vec![] };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["title"], "hello");
        assert_eq!(json["like_count"], 2);
        assert!(json["replies"].as_array().unwrap().is_empty());
        assert!(entry.is_root());
    }

    #[test]
    fn order_breaks_timestamp_ties_by_id() {
        let now = chrono::Utc::now();
        let make = |id| Entry {
            id,
            name: DEFAULT_NAME.into(),
            title: None,
            content: DEFAULT_CONTENT.into(),
            created_at: now,
            like_count: 0,
            dislike_count: 0,
            parent_id: None,
        };
        let mut entries = vec![make(3), make(1), make(2)];
        Order::Descending.sort(&mut entries);
        let ids: Vec<_> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
