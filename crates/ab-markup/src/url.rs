//! Link and image target policy.

const ALLOWED_SCHEMES: [&str; 4] = ["http", "https", "mailto", "ftp"];

/// True for scheme-less (relative) targets and for allow-listed schemes.
///
/// Whitespace and control characters are ignored while reading the scheme,
/// since browsers skip them too (`java\tscript:`).
pub(crate) fn is_safe_target(url: &str) -> bool {
    let compact: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    let Some(colon) = compact.find(':') else {
        return true;
    };
    let scheme = &compact[..colon];
    if scheme.contains(['/', '?', '#']) {
        // The colon sits in a path or query; there is no scheme.
        return true;
    }
    let scheme = scheme.to_ascii_lowercase();
    ALLOWED_SCHEMES.contains(&scheme.as_str())
}
