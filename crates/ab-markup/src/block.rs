//! Block structure: headings, lists, code, rules and paragraphs.
//!
//! Input is already escaped, so `>` arrives as `&gt;` and block quotes
//! simply do not exist in this dialect.

use crate::inline::{normalize_label, parse_target, render_inline, LinkTarget, References};

#[derive(Debug, PartialEq, Eq)]
enum Block {
    Heading(usize, String),
    Paragraph(String),
    Code { info: Option<String>, lines: Vec<String> },
    List { ordered: bool, items: Vec<String> },
    Rule,
}

/// Renders a whole escaped document.
pub(crate) fn render_blocks(escaped: &str) -> String {
    let (lines, refs) = collect_references(escaped);
    parse(&lines)
        .into_iter()
        .map(|block| emit(block, &refs))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pulls `[label]: url "title"` lines out of the document (outside fences).
fn collect_references(text: &str) -> (Vec<&str>, References) {
    let mut refs = References::new();
    let mut kept = Vec::new();
    let mut in_fence = false;
    for line in text.lines() {
        if is_fence(line) {
            in_fence = !in_fence;
        }
        if !in_fence {
            if let Some((label, target)) = reference_definition(line) {
                refs.entry(label).or_insert(target);
                continue;
            }
        }
        kept.push(line);
    }
    (kept, refs)
}

fn reference_definition(line: &str) -> Option<(String, LinkTarget)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = line.trim_start().strip_prefix('[')?;
    let close = rest.find("]:")?;
    let label = normalize_label(&rest[..close]);
    if label.is_empty() {
        return None;
    }
    let target = parse_target(&rest[close + 2..])?;
    Some((label, target))
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

fn is_indented_code(line: &str) -> bool {
    line.starts_with("    ") || line.starts_with('\t')
}

fn strip_code_indent(line: &str) -> &str {
    line.strip_prefix("    ")
        .or_else(|| line.strip_prefix('\t'))
        .unwrap_or(line)
}

fn heading(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|&c| c == '#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    let text = rest.trim().trim_end_matches('#').trim_end();
    Some((level, text.to_string()))
}

fn is_rule(line: &str) -> bool {
    let marks: Vec<char> = line.chars().filter(|c| !c.is_whitespace()).collect();
    marks.len() >= 3
        && matches!(marks[0], '-' | '*' | '_')
        && marks.iter().all(|&c| c == marks[0])
}

/// Returns (ordered, item text) for a list item line.
fn list_item(line: &str) -> Option<(bool, &str)> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return Some((false, rest.trim_start()));
        }
    }
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 && digits <= 9 {
        if let Some(rest) = trimmed[digits..].strip_prefix(". ") {
            return Some((true, rest.trim_start()));
        }
    }
    None
}

/// Lines that end a paragraph without a blank line in between.
fn interrupts_paragraph(line: &str) -> bool {
    is_fence(line) || heading(line).is_some() || is_rule(line)
}

fn parse(lines: &[&str]) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if is_blank(line) {
            i += 1;
            continue;
        }

        if is_fence(line) {
            let info = line.trim_start()[3..].trim();
            let info = (!info.is_empty()).then(|| info.to_string());
            let mut body = Vec::new();
            i += 1;
            while i < lines.len() && !is_fence(lines[i]) {
                body.push(lines[i].to_string());
                i += 1;
            }
            i += 1; // closing fence, if any
            blocks.push(Block::Code { info, lines: body });
            continue;
        }

        if is_indented_code(line) {
            let mut body = Vec::new();
            while i < lines.len() && (is_indented_code(lines[i]) || is_blank(lines[i])) {
                body.push(strip_code_indent(lines[i]).to_string());
                i += 1;
            }
            while body.last().is_some_and(|l| is_blank(l)) {
                body.pop();
            }
            blocks.push(Block::Code { info: None, lines: body });
            continue;
        }

        if let Some((level, text)) = heading(line) {
            blocks.push(Block::Heading(level, text));
            i += 1;
            continue;
        }

        if is_rule(line) {
            blocks.push(Block::Rule);
            i += 1;
            continue;
        }

        if let Some((ordered, first)) = list_item(line) {
            let mut items = vec![first.to_string()];
            i += 1;
            while i < lines.len() {
                let next = lines[i];
                if is_blank(next) {
                    // A blank line only continues the list when another item follows.
                    let resumes = lines[i + 1..]
                        .iter()
                        .find(|l| !is_blank(l))
                        .and_then(|l| list_item(l))
                        .is_some_and(|(o, _)| o == ordered);
                    if !resumes {
                        break;
                    }
                    i += 1;
                    continue;
                }
                match list_item(next) {
                    Some((o, text)) if o == ordered => items.push(text.to_string()),
                    Some(_) => break,
                    None if interrupts_paragraph(next) => break,
                    None => {
                        if let Some(last) = items.last_mut() {
                            last.push('\n');
                            last.push_str(next.trim());
                        }
                    }
                }
                i += 1;
            }
            blocks.push(Block::List { ordered, items });
            continue;
        }

        let mut para: Vec<&str> = vec![line.trim_start()];
        i += 1;
        while i < lines.len() && !is_blank(lines[i]) && !interrupts_paragraph(lines[i]) {
            para.push(lines[i].trim_start());
            i += 1;
        }
        blocks.push(Block::Paragraph(para.join("\n").trim_end().to_string()));
    }
    blocks
}

fn emit(block: Block, refs: &References) -> String {
    match block {
        Block::Heading(level, text) => {
            format!("<h{level}>{}</h{level}>", render_inline(&text, refs))
        }
        Block::Paragraph(text) => format!("<p>{}</p>", render_inline(&text, refs)),
        Block::Code { info, lines } => {
            let class = info
                .filter(|i| i.chars().all(|c| c.is_ascii_alphanumeric() || "-_+".contains(c)))
                .map(|lang| format!(" class=\"language-{lang}\""))
                .unwrap_or_default();
            format!("<pre><code{class}>{}\n</code></pre>", lines.join("\n"))
        }
        Block::List { ordered, items } => {
            let tag = if ordered { "ol" } else { "ul" };
            let body: String = items
                .iter()
                .map(|item| format!("<li>{}</li>\n", render_inline(item, refs)))
                .collect();
            format!("<{tag}>\n{body}</{tag}>")
        }
        Block::Rule => "<hr />".to_string(),
    }
}
