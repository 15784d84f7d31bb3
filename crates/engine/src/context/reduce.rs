//! Size reduction of rendered context for the previous-turn library.
//!
//! A prior turn's note blocks are too large to resend in full on every later
//! turn. [`compact_for_l2`] keeps what the model needs to recognize and
//! re-request a block: its tag, path, title, heading outline and a short
//! content preview.

use std::sync::OnceLock;

use regex_lite::Regex;

use crate::context::token::{char_len, truncate_chars};

/// Block tags the renderers emit.
const BLOCK_TAGS: &[&str] = &[
    "note_context",
    "active_note",
    "embedded_note",
    "url_content",
    "selected_text",
    "web_tab_context",
];

/// Tag used when text carries no recognizable block.
const FALLBACK_TAG: &str = "context";

/// Result of reducing one rendered segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Reduction {
    pub content: String,
    /// Some block content was cut down to its preview.
    pub truncated: bool,
}

fn block_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        BLOCK_TAGS
            .iter()
            .filter_map(|tag| {
                let pattern = format!(r"(?s)<{tag}(?:\s[^>]*)?>(.*?)</{tag}>");
                Regex::new(&pattern).ok().map(|re| (*tag, re))
            })
            .collect()
    })
}

/// Inner text of the first `<name>…</name>` element in `body`.
fn field<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].trim())
}

/// Markdown heading lines, in document order.
fn headings(content: &str, max: usize) -> Vec<&str> {
    content
        .lines()
        .map(str::trim_start)
        .filter(|line| {
            let level = line.chars().take_while(|c| *c == '#').count();
            (1..=6).contains(&level) && line[level..].starts_with(' ')
        })
        .take(max)
        .collect()
}

struct Block<'a> {
    tag: &'a str,
    body: &'a str,
}

fn find_blocks(text: &str) -> Vec<Block<'_>> {
    let mut found: Vec<(usize, Block<'_>)> = Vec::new();
    for (tag, re) in block_patterns() {
        for caps in re.captures_iter(text) {
            if let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) {
                found.push((
                    whole.start(),
                    Block {
                        tag: *tag,
                        body: body.as_str(),
                    },
                ));
            }
        }
    }
    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, block)| block).collect()
}

fn reduce_block(block: &Block<'_>, preview_chars: usize, max_headings: usize) -> (String, bool) {
    let content = field(block.body, "content").unwrap_or_else(|| block.body.trim());
    let preview = truncate_chars(content, preview_chars);
    let truncated = char_len(preview) < char_len(content);

    let mut out = format!("<prior_{}>\n", block.tag);
    for name in ["title", "path", "url"] {
        if let Some(value) = field(block.body, name).filter(|v| !v.is_empty()) {
            out.push_str(&format!("<{name}>{value}</{name}>\n"));
        }
    }

    let outline = headings(content, max_headings);
    if !outline.is_empty() {
        out.push_str("<outline>\n");
        for heading in outline {
            out.push_str(heading);
            out.push('\n');
        }
        out.push_str("</outline>\n");
    }

    if !preview.is_empty() {
        out.push_str("<preview>\n");
        out.push_str(preview.trim_end());
        if truncated {
            out.push_str("\n[…]");
        }
        out.push_str("\n</preview>\n");
    }
    out.push_str(&format!("</prior_{}>", block.tag));
    (out, truncated)
}

/// Reduce rendered turn context to structure plus preview.
pub fn compact_for_l2(text: &str, preview_chars: usize, max_headings: usize) -> L2Reduction {
    let mut blocks = find_blocks(text);
    if blocks.is_empty() {
        if text.trim().is_empty() {
            return L2Reduction {
                content: String::new(),
                truncated: false,
            };
        }
        blocks.push(Block {
            tag: FALLBACK_TAG,
            body: text,
        });
    }

    let mut truncated = false;
    let parts: Vec<String> = blocks
        .iter()
        .map(|block| {
            let (reduced, cut) = reduce_block(block, preview_chars, max_headings);
            truncated |= cut;
            reduced
        })
        .collect();

    L2Reduction {
        content: parts.join("\n\n"),
        truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_block(path: &str, body: &str) -> String {
        format!(
            "<note_context>\n<title>{}</title>\n<path>{path}</path>\n<content>\n{body}\n</content>\n</note_context>",
            path.trim_end_matches(".md")
        )
    }

    #[test]
    fn keeps_path_title_and_outline() {
        let text = note_block("Plans.md", "# Plans\nintro\n## Q1\nship it\n### Detail\nmore");
        let reduced = compact_for_l2(&text, 600, 12);

        assert!(reduced.content.starts_with("<prior_note_context>"));
        assert!(reduced.content.contains("<path>Plans.md</path>"));
        assert!(reduced.content.contains("<title>Plans</title>"));
        assert!(reduced.content.contains("<outline>\n# Plans\n## Q1\n### Detail\n</outline>"));
        assert!(!reduced.truncated);
    }

    #[test]
    fn long_content_is_previewed() {
        let body = "x".repeat(2_000);
        let text = note_block("Big.md", &body);
        let reduced = compact_for_l2(&text, 100, 12);

        assert!(reduced.truncated);
        assert!(reduced.content.contains(&"x".repeat(100)));
        assert!(!reduced.content.contains(&"x".repeat(101)));
        assert!(reduced.content.contains("[…]"));
    }

    #[test]
    fn multiple_blocks_keep_document_order() {
        let text = format!(
            "{}\n\n<url_content>\n<url>https://example.com</url>\n<content>page</content>\n</url_content>\n\n{}",
            note_block("A.md", "alpha"),
            note_block("B.md", "beta"),
        );
        let reduced = compact_for_l2(&text, 600, 12);

        let a = reduced.content.find("A.md").unwrap();
        let url = reduced.content.find("https://example.com").unwrap();
        let b = reduced.content.find("B.md").unwrap();
        assert!(a < url && url < b);
        assert!(reduced.content.contains("<prior_url_content>"));
    }

    #[test]
    fn heading_cap_applies() {
        let body = (1..=5).map(|i| format!("# H{i}\n")).collect::<String>();
        let reduced = compact_for_l2(&note_block("H.md", &body), 600, 2);
        assert!(reduced.content.contains("<outline>\n# H1\n# H2\n</outline>"));
    }

    #[test]
    fn hashtags_are_not_headings() {
        let reduced = compact_for_l2(&note_block("T.md", "#tag line\n# Real"), 600, 12);
        assert!(reduced.content.contains("<outline>\n# Real\n</outline>"));
    }

    #[test]
    fn unstructured_text_uses_fallback_block() {
        let reduced = compact_for_l2("plain words", 600, 12);
        assert_eq!(
            reduced.content,
            "<prior_context>\n<preview>\nplain words\n</preview>\n</prior_context>"
        );
    }

    #[test]
    fn empty_text_reduces_to_nothing() {
        let reduced = compact_for_l2("  \n", 600, 12);
        assert!(reduced.content.is_empty());
        assert!(!reduced.truncated);
    }
}
