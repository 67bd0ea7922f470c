//! Inline expansion over already-escaped text.
//!
//! Rules run one after another in descending priority. Each rule scans the
//! whole span and swaps every match for an opaque placeholder, so a lower
//! rule can never match across (or inside) something a higher rule already
//! claimed. That is what keeps `~` or `*` inside an image URL from turning
//! into strike-through or emphasis.

use std::collections::HashMap;

use crate::escape::{STASH_CLOSE, STASH_OPEN};
use crate::url::is_safe_target;

/// Destination of a reference definition (`[label]: url "title"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LinkTarget {
    pub url: String,
    pub title: Option<String>,
}

/// Reference definitions keyed by normalized label.
pub(crate) type References = HashMap<String, LinkTarget>;

/// Lowercases and collapses whitespace, so `[Foo  Bar]` finds `[foo bar]`.
pub(crate) fn normalize_label(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub(crate) const CODE_SPAN: u16 = 190;
pub(crate) const BACKSLASH: u16 = 180;
pub(crate) const LINK_REFERENCE: u16 = 170;
pub(crate) const LINK: u16 = 160;
pub(crate) const IMAGE_LINK: u16 = 150;
pub(crate) const IMAGE_REFERENCE: u16 = 140;
pub(crate) const LINE_BREAK: u16 = 100;
pub(crate) const EM_STRONG: u16 = 60;
pub(crate) const STRONG: u16 = 55;
pub(crate) const EMPHASIS: u16 = 50;
pub(crate) const STRIKE: u16 = 20;

/// What a rule decided at one position.
enum Step {
    /// Replace `len` bytes with this stash placeholder.
    Replace { len: usize, with: String },
    /// Copy `len` bytes through untouched.
    Keep(usize),
}

trait InlineRule: Sync {
    fn priority(&self) -> u16;
    fn starts_with(&self, c: char) -> bool;
    fn step(&self, text: &str, at: usize, cx: &mut Context<'_>) -> Step;
}

/// Stashed fragment: its HTML plus a text-only form used inside attributes.
#[derive(Debug)]
struct Fragment {
    html: String,
    plain: String,
}

pub(crate) struct Context<'r> {
    refs: &'r References,
    stash: Vec<Fragment>,
}

impl<'r> Context<'r> {
    pub(crate) fn new(refs: &'r References) -> Self {
        Self { refs, stash: Vec::new() }
    }

    fn stash(&mut self, html: String, plain: String) -> String {
        let index = self.stash.len();
        self.stash.push(Fragment { html, plain });
        format!("{STASH_OPEN}{index}{STASH_CLOSE}")
    }

    /// Runs every rule whose priority is below `ceiling` over `text`.
    fn apply(&mut self, text: &str, ceiling: u16) -> String {
        let mut work = text.to_string();
        for rule in RULES.iter().filter(|r| r.priority() < ceiling) {
            work = self.apply_rule(*rule, &work);
        }
        work
    }

    fn apply_rule(&mut self, rule: &dyn InlineRule, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut at = 0;
        while let Some(c) = text[at..].chars().next() {
            let step = if rule.starts_with(c) {
                rule.step(text, at, self)
            } else {
                Step::Keep(c.len_utf8())
            };
            match step {
                Step::Replace { len, with } => {
                    out.push_str(&with);
                    at += len;
                }
                Step::Keep(len) => {
                    out.push_str(&text[at..at + len]);
                    at += len;
                }
            }
        }
        out
    }

    /// Substitutes placeholders back, recursively.
    fn expand(&self, text: &str, plain: bool) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(open) = rest.find(STASH_OPEN) {
            out.push_str(&rest[..open]);
            let after = &rest[open + STASH_OPEN.len_utf8()..];
            let Some(close) = after.find(STASH_CLOSE) else {
                rest = after;
                continue;
            };
            if let Some(fragment) = after[..close].parse::<usize>().ok().and_then(|i| self.stash.get(i)) {
                let inner = if plain { &fragment.plain } else { &fragment.html };
                out.push_str(&self.expand(inner, plain));
            }
            rest = &after[close + STASH_CLOSE.len_utf8()..];
        }
        out.push_str(rest);
        out
    }
}

/// Expands inline markup in one block of escaped text.
pub(crate) fn render_inline(text: &str, refs: &References) -> String {
    let mut cx = Context::new(refs);
    let work = cx.apply(text, u16::MAX);
    cx.expand(&work, false)
}

static RULES: &[&dyn InlineRule] = &[
    &CodeSpan,
    &BackslashEscape,
    &LinkReference,
    &InlineLink,
    &ImageLink,
    &ImageReference,
    &LineBreak,
    &Delimited { priority: EM_STRONG, chars: &['*', '_'], runs: &[3], open: "<strong><em>", close: "</em></strong>" },
    &Delimited { priority: STRONG, chars: &['*', '_'], runs: &[2], open: "<strong>", close: "</strong>" },
    &Delimited { priority: EMPHASIS, chars: &['*', '_'], runs: &[1], open: "<em>", close: "</em>" },
    &Delimited { priority: STRIKE, chars: &['~'], runs: &[1, 2], open: "<del>", close: "</del>" },
];

fn char_at(text: &str, at: usize) -> Option<char> {
    text.get(at..)?.chars().next()
}

fn char_before(text: &str, at: usize) -> Option<char> {
    text[..at].chars().next_back()
}

/// Length in bytes of the run of `c` starting at `at`.
fn run_len(text: &str, at: usize, c: char) -> usize {
    text[at..].chars().take_while(|&x| x == c).count() * c.len_utf8()
}

/// Finds the `]` matching the `[` at `open`, honouring nesting.
fn matching_bracket(text: &str, open: usize, left: char, right: char) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, c) in text[open..].char_indices() {
        if c == left {
            depth += 1;
        } else if c == right {
            depth -= 1;
            if depth == 0 {
                return Some(open + offset);
            }
        }
    }
    None
}

/// `[label]` directly after `at`; returns (label, end of `]`).
fn trailing_label(text: &str, at: usize) -> Option<(&str, usize)> {
    if char_at(text, at) != Some('[') {
        return None;
    }
    let close = at + text[at..].find(']')?;
    Some((&text[at + 1..close], close + 1))
}

/// `(url "title")` directly after `at`; returns (target, end of `)`).
fn trailing_target(text: &str, at: usize) -> Option<(LinkTarget, usize)> {
    if char_at(text, at) != Some('(') {
        return None;
    }
    let close = matching_bracket(text, at, '(', ')')?;
    let target = parse_target(&text[at + 1..close])?;
    Some((target, close + 1))
}

/// Title delimiters as they look after escaping: `"` and `'`.
const TITLE_QUOTES: [&str; 2] = ["&quot;", "&#x27;"];

/// `url "title"` or `url 'title'`; the opening quote must follow whitespace.
fn quoted_title(raw: &str) -> Option<(&str, String)> {
    TITLE_QUOTES.iter().find_map(|quote| {
        let body = raw.strip_suffix(quote)?;
        let open = body.rfind(quote)?;
        body[..open]
            .ends_with(char::is_whitespace)
            .then(|| (body[..open].trim_end(), body[open + quote.len()..].to_string()))
    })
}

/// Splits a link destination into url and optional title, and unwraps `<url>`.
pub(crate) fn parse_target(raw: &str) -> Option<LinkTarget> {
    let raw = raw.trim();
    let (url, title) = match quoted_title(raw) {
        Some((url, title)) => (url, Some(title)),
        None => match raw.strip_suffix(')').and_then(|r| r.rfind(" (").map(|i| (r, i))) {
            Some((body, i)) => (body[..i].trim_end(), Some(body[i + 2..].to_string())),
            None => (raw, None),
        },
    };
    let url = url
        .strip_prefix("&lt;")
        .and_then(|u| u.strip_suffix("&gt;"))
        .unwrap_or(url);
    if url.is_empty() || url.contains(char::is_whitespace) {
        return None;
    }
    Some(LinkTarget { url: url.to_string(), title })
}

fn title_attr(cx: &Context<'_>, title: &Option<String>) -> String {
    match title {
        Some(title) => format!(" title=\"{}\"", cx.expand(title, true)),
        None => String::new(),
    }
}

fn anchor(cx: &mut Context<'_>, text: &str, target: &LinkTarget, len: usize) -> Step {
    let inner = cx.apply(text, LINK);
    let plain = cx.expand(&inner, true);
    let url = cx.expand(&target.url, true);
    let html = if is_safe_target(&url) {
        format!("<a href=\"{url}\"{}>{inner}</a>", title_attr(cx, &target.title))
    } else {
        tracing::debug!(%url, "dropping link with disallowed target");
        inner
    };
    Step::Replace { len, with: cx.stash(html, plain) }
}

fn image(cx: &mut Context<'_>, alt: &str, target: &LinkTarget, len: usize) -> Step {
    let alt = cx.expand(alt, true);
    let src = cx.expand(&target.url, true);
    let html = if is_safe_target(&src) {
        format!("<img alt=\"{alt}\" src=\"{src}\"{} />", title_attr(cx, &target.title))
    } else {
        tracing::debug!(%src, "dropping image with disallowed source");
        alt.clone()
    };
    Step::Replace { len, with: cx.stash(html, alt) }
}

/// `` `code` `` — content is emitted as-is (it is already escaped).
struct CodeSpan;

impl InlineRule for CodeSpan {
    fn priority(&self) -> u16 {
        CODE_SPAN
    }

    fn starts_with(&self, c: char) -> bool {
        c == '`'
    }

    fn step(&self, text: &str, at: usize, cx: &mut Context<'_>) -> Step {
        let ticks = run_len(text, at, '`');
        let start = at + ticks;
        let mut search = start;
        while let Some(found) = text[search..].find('`') {
            let pos = search + found;
            let run = run_len(text, pos, '`');
            if run == ticks {
                let content = &text[start..pos];
                let content = match content.strip_prefix(' ').and_then(|c| c.strip_suffix(' ')) {
                    Some(inner) if !inner.trim().is_empty() => inner,
                    _ => content,
                };
                let html = format!("<code>{content}</code>");
                return Step::Replace { len: pos + run - at, with: cx.stash(html, content.to_string()) };
            }
            search = pos + run;
        }
        Step::Keep(ticks)
    }
}

/// `\*` and friends produce the literal character.
struct BackslashEscape;

const ESCAPABLE: &str = "\\`*_{}[]()#+-.!~|";

impl InlineRule for BackslashEscape {
    fn priority(&self) -> u16 {
        BACKSLASH
    }

    fn starts_with(&self, c: char) -> bool {
        c == '\\'
    }

    fn step(&self, text: &str, at: usize, cx: &mut Context<'_>) -> Step {
        match char_at(text, at + 1) {
            Some(c) if ESCAPABLE.contains(c) => {
                let literal = c.to_string();
                Step::Replace { len: 1 + c.len_utf8(), with: cx.stash(literal.clone(), literal) }
            }
            _ => Step::Keep(1),
        }
    }
}

/// `[text][ref]` and `[text][]`.
struct LinkReference;

impl InlineRule for LinkReference {
    fn priority(&self) -> u16 {
        LINK_REFERENCE
    }

    fn starts_with(&self, c: char) -> bool {
        c == '['
    }

    fn step(&self, text: &str, at: usize, cx: &mut Context<'_>) -> Step {
        if char_before(text, at) == Some('!') {
            return Step::Keep(1);
        }
        let Some(close) = matching_bracket(text, at, '[', ']') else {
            return Step::Keep(1);
        };
        let label_text = &text[at + 1..close];
        let Some((label, end)) = trailing_label(text, close + 1) else {
            return Step::Keep(1);
        };
        let key = normalize_label(if label.is_empty() { label_text } else { label });
        match cx.refs.get(&key).cloned() {
            Some(target) => anchor(cx, label_text, &target, end - at),
            None => Step::Keep(1),
        }
    }
}

/// `[text](url "title")`.
struct InlineLink;

impl InlineRule for InlineLink {
    fn priority(&self) -> u16 {
        LINK
    }

    fn starts_with(&self, c: char) -> bool {
        c == '['
    }

    fn step(&self, text: &str, at: usize, cx: &mut Context<'_>) -> Step {
        if char_before(text, at) == Some('!') {
            return Step::Keep(1);
        }
        let Some(close) = matching_bracket(text, at, '[', ']') else {
            return Step::Keep(1);
        };
        match trailing_target(text, close + 1) {
            Some((target, end)) => anchor(cx, &text[at + 1..close], &target, end - at),
            None => Step::Keep(1),
        }
    }
}

/// `![alt](src "title")`.
struct ImageLink;

impl InlineRule for ImageLink {
    fn priority(&self) -> u16 {
        IMAGE_LINK
    }

    fn starts_with(&self, c: char) -> bool {
        c == '!'
    }

    fn step(&self, text: &str, at: usize, cx: &mut Context<'_>) -> Step {
        if char_at(text, at + 1) != Some('[') {
            return Step::Keep(1);
        }
        let Some(close) = matching_bracket(text, at + 1, '[', ']') else {
            return Step::Keep(1);
        };
        match trailing_target(text, close + 1) {
            Some((target, end)) => image(cx, &text[at + 2..close], &target, end - at),
            None => Step::Keep(1),
        }
    }
}

/// `![alt][ref]` and `![alt][]`.
struct ImageReference;

impl InlineRule for ImageReference {
    fn priority(&self) -> u16 {
        IMAGE_REFERENCE
    }

    fn starts_with(&self, c: char) -> bool {
        c == '!'
    }

    fn step(&self, text: &str, at: usize, cx: &mut Context<'_>) -> Step {
        if char_at(text, at + 1) != Some('[') {
            return Step::Keep(1);
        }
        let Some(close) = matching_bracket(text, at + 1, '[', ']') else {
            return Step::Keep(1);
        };
        let alt = &text[at + 2..close];
        let Some((label, end)) = trailing_label(text, close + 1) else {
            return Step::Keep(1);
        };
        let key = normalize_label(if label.is_empty() { alt } else { label });
        match cx.refs.get(&key).cloned() {
            Some(target) => image(cx, alt, &target, end - at),
            None => Step::Keep(1),
        }
    }
}

/// Two or more spaces before a newline.
struct LineBreak;

impl InlineRule for LineBreak {
    fn priority(&self) -> u16 {
        LINE_BREAK
    }

    fn starts_with(&self, c: char) -> bool {
        c == ' '
    }

    fn step(&self, text: &str, at: usize, cx: &mut Context<'_>) -> Step {
        let spaces = run_len(text, at, ' ');
        if spaces >= 2 && char_at(text, at + spaces) == Some('\n') {
            let with = cx.stash("<br />\n".to_string(), "\n".to_string());
            Step::Replace { len: spaces + 1, with }
        } else {
            Step::Keep(spaces)
        }
    }
}

/// Symmetric delimiter runs: emphasis, strong, strike-through.
struct Delimited {
    priority: u16,
    chars: &'static [char],
    /// Accepted run lengths; the closing run must match the opening one.
    runs: &'static [usize],
    open: &'static str,
    close: &'static str,
}

impl Delimited {
    fn closing(&self, text: &str, from: usize, c: char, run: usize) -> Option<usize> {
        let mut at = from;
        while let Some(x) = char_at(text, at) {
            if x != c {
                at += x.len_utf8();
                continue;
            }
            let len = run_len(text, at, c);
            let flanking = char_before(text, at).is_some_and(|p| !p.is_whitespace());
            let word_after = c == '_' && char_at(text, at + len).is_some_and(char::is_alphanumeric);
            if len == run && at > from && flanking && !word_after {
                return Some(at);
            }
            at += len;
        }
        None
    }
}

impl InlineRule for Delimited {
    fn priority(&self) -> u16 {
        self.priority
    }

    fn starts_with(&self, c: char) -> bool {
        self.chars.contains(&c)
    }

    fn step(&self, text: &str, at: usize, cx: &mut Context<'_>) -> Step {
        let Some(c) = char_at(text, at) else {
            return Step::Keep(1);
        };
        let len = run_len(text, at, c);
        let run = len / c.len_utf8();
        let opens = self.runs.contains(&run)
            && char_at(text, at + len).is_some_and(|n| !n.is_whitespace())
            && !(c == '_' && char_before(text, at).is_some_and(char::is_alphanumeric));
        if !opens {
            return Step::Keep(len);
        }
        let Some(end) = self.closing(text, at + len, c, len) else {
            return Step::Keep(len);
        };
        let inner = cx.apply(&text[at + len..end], self.priority);
        let plain = cx.expand(&inner, true);
        let html = format!("{}{inner}{}", self.open, self.close);
        Step::Replace { len: end + len - at, with: cx.stash(html, plain) }
    }
}
