//! # ab-ui
//!
//! Askama page templates. Entry bodies are stored already rendered and are
//! emitted with `|safe`; names and titles go through askama's HTML escaping.

use ab_core::models::{Entry, EntryId};
use ab_core::tree::{TreeNode, TreeRow};
use askama::Template;

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate<'a> {
    pub title: &'a str,
    pub roots: &'a [Entry],
}

#[derive(Template)]
#[template(path = "comment.html")]
pub struct CommentTemplate<'a> {
    pub title: String,
    pub root_id: EntryId,
    pub rows: Vec<TreeRow<'a>>,
}

impl<'a> CommentTemplate<'a> {
    pub fn for_tree(tree: &'a TreeNode) -> Self {
        let title = tree
            .entry
            .title
            .clone()
            .unwrap_or_else(|| format!("#{}", tree.entry.id));
        Self { title, root_id: tree.entry.id, rows: tree.rows() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(id: EntryId, parent_id: Option<EntryId>) -> Entry {
        Entry {
            id,
            name: "<b>bob</b>".into(),
            title: parent_id.is_none().then(|| "t<i>".to_string()),
            content: "<p><em>ok</em></p>".into(),
            created_at: Utc::now(),
            like_count: 3,
            dislike_count: 1,
            parent_id,
        }
    }

    #[test]
    fn index_escapes_names_and_links_roots() {
        let roots = vec![entry(1, None)];
        let html = IndexTemplate { title: "index", roots: &roots }.render().unwrap();
        assert!(html.contains("href=\"/comment/1\""));
        assert!(html.contains("t&lt;i&gt;"));
        assert!(html.contains("&lt;b&gt;bob"));
        assert!(!html.contains("<b>bob"));
    }

    #[test]
    fn comment_page_nests_replies_and_keeps_rendered_content() {
        let tree = TreeNode {
            entry: entry(1, None),
            replies: vec![TreeNode { entry: entry(2, Some(1)), replies: vec![] }],
        };
        let page = CommentTemplate::for_tree(&tree);
        assert_eq!(page.root_id, 1);
        assert_eq!(page.title, "t<i>");

        let html = page.render().unwrap();
        assert!(html.contains("<p><em>ok</em></p>"));
        assert!(html.contains("action=\"/comment/2\""));
        assert!(html.contains("margin-left: 2em"));
        assert!(html.find("id=\"e1\"").unwrap() < html.find("id=\"e2\"").unwrap());
    }
}
