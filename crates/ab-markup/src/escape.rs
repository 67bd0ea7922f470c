//! Step one of the pipeline: nothing the author typed survives as markup.

/// Opens an inline placeholder. Stripped from input so authors cannot forge one.
pub(crate) const STASH_OPEN: char = '\u{2}';
/// Closes an inline placeholder.
pub(crate) const STASH_CLOSE: char = '\u{3}';

/// Normalizes line endings, drops control characters (tab and newline stay)
/// and entity-escapes `& < > " '`.
pub(crate) fn escape(raw: &str) -> String {
    let cleaned: String = raw
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    html_escape::encode_quoted_attribute(&cleaned).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_characters() {
        let out = escape(r#"<script>alert("x") & 'y'</script>"#);
        assert!(!out.contains('<'));
        assert!(!out.contains('>'));
        assert!(!out.contains('"'));
        assert!(!out.contains('\''));
        assert!(out.starts_with("&lt;script&gt;alert(&quot;x&quot;) &amp; "));
    }

    #[test]
    fn strips_placeholder_and_control_chars() {
        let out = escape("a\u{2}0\u{3}b\u{0}c\r\nd\te");
        assert_eq!(out, "a0bc\nd\te");
        assert!(!out.contains(STASH_OPEN));
        assert!(!out.contains(STASH_CLOSE));
    }

    #[test]
    fn slashes_stay_readable_for_urls() {
        assert_eq!(escape("http://x/y.png"), "http://x/y.png");
    }
}
