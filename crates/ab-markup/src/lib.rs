//! # ab-markup
//!
//! Restricted markdown for anon-board comments.
//!
//! The pipeline order is fixed: escape everything first, then expand the
//! dialect over the escaped text. Markup can only ever be produced by the
//! renderer itself, never passed through from the author.

mod block;
mod escape;
mod inline;
mod url;

use ab_core::traits::MarkupRenderer;
use escape::escape;

/// The comment renderer. Stateless: same input, same output.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestrictedMarkdown;

impl RestrictedMarkdown {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, source: &str) -> String {
        block::render_blocks(&escape(source))
    }
}

impl MarkupRenderer for RestrictedMarkdown {
    fn render(&self, source: &str) -> String {
        RestrictedMarkdown::render(self, source)
    }
}
