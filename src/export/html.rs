//! Static HTML rendering of a document with its comments laid out in the
//! margin, the same blocks anchored as in the terminal view.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, html};

use crate::annotate::{self, Anchor, BlockKind};
use crate::comments::CommentMap;
use crate::overlay::STORED_AUTHOR;
use crate::parsing::{LineIndex, parser_options};

const STYLE: &str = r#"
body { font-family: sans-serif; max-width: 72rem; margin: 2rem auto; }
.annotated { position: relative; width: 65%; border: 1px solid transparent; }
.annotated:hover { border-color: #6699CC; }
.annotated:hover > :not(.comment-panel) { background: #DDE4A3; }
.comment-panel { position: absolute; top: 0; left: 105%; width: 46%; font-size: 0.9em; }
.comment-panel summary { cursor: pointer; color: #65737E; }
"#;

fn intercepted_kind(tag: &Tag<'_>) -> Option<BlockKind> {
    match tag {
        Tag::Paragraph => Some(BlockKind::Paragraph),
        Tag::Heading { level, .. } => match level {
            HeadingLevel::H2 => Some(BlockKind::H2),
            HeadingLevel::H3 => Some(BlockKind::H3),
            _ => None,
        },
        Tag::BlockQuote(_) => Some(BlockKind::Blockquote),
        Tag::Item => Some(BlockKind::ListItem),
        _ => None,
    }
}

/// Renders `source` to an HTML fragment where every anchored block is
/// wrapped together with a panel of its stored comments.
pub fn render_annotated_html(source: &str, comments: &CommentMap) -> String {
    let index = LineIndex::new(source);
    let mut events = Vec::new();
    // one entry per open tag
    let mut open: Vec<Option<Anchor>> = Vec::new();

    for (event, range) in Parser::new_ext(source, parser_options()).into_offset_iter() {
        match event {
            Event::Start(tag) => {
                let anchor = intercepted_kind(&tag).and_then(|kind| {
                    annotate::wrap_decision(kind, Some(index.block_position(range.start))).anchor()
                });
                let is_item = matches!(tag, Tag::Item);

                // list items keep the wrapper inside <li> so the list stays valid
                if let Some(anchor) = anchor.filter(|_| !is_item) {
                    events.push(Event::Html(open_wrapper(anchor).into()));
                }
                events.push(Event::Start(tag));
                if let Some(anchor) = anchor.filter(|_| is_item) {
                    events.push(Event::Html(open_wrapper(anchor).into()));
                }
                open.push(anchor);
            }
            Event::End(end) => match open.pop().flatten() {
                Some(anchor) if anchor.kind == BlockKind::ListItem => {
                    events.push(Event::Html(close_wrapper(comments.get(anchor.line())).into()));
                    events.push(Event::End(end));
                }
                Some(anchor) => {
                    events.push(Event::End(end));
                    events.push(Event::Html(close_wrapper(comments.get(anchor.line())).into()));
                }
                None => events.push(Event::End(end)),
            },
            other => events.push(other),
        }
    }

    let mut out = String::with_capacity(source.len() * 2);
    html::push_html(&mut out, events.into_iter());
    out
}

/// A complete standalone page around [`render_annotated_html`].
pub fn render_annotated_page(title: &str, source: &str, comments: &CommentMap) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_html(title),
        render_annotated_html(source, comments)
    )
}

pub fn export_to_file(
    path: &Path,
    title: &str,
    source: &str,
    comments: &CommentMap,
) -> Result<()> {
    let page = render_annotated_page(title, source, comments);
    fs::write(path, page).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(
        "Exported {} comments to {}",
        comments.comment_count(),
        path.display()
    );
    Ok(())
}

fn open_wrapper(anchor: Anchor) -> String {
    format!(
        "<div class=\"annotated {}\" data-line=\"{}\">\n",
        anchor.kind.tag(),
        anchor.line()
    )
}

fn close_wrapper(comments: &[String]) -> String {
    let Some((first, rest)) = comments.split_first() else {
        return "</div>\n".to_string();
    };

    let mut out = String::from("<aside class=\"comment-panel\">");
    out.push_str(&comment_html(first));
    if !rest.is_empty() {
        out.push_str(&format!("<details><summary>+{}</summary>", rest.len()));
        for comment in rest {
            out.push_str(&comment_html(comment));
        }
        out.push_str("</details>");
    }
    out.push_str("</aside></div>\n");
    out
}

fn comment_html(text: &str) -> String {
    format!(
        "<p class=\"comment\"><strong>{STORED_AUTHOR}:</strong> {}</p>",
        escape_html(text)
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn map(line: u32, texts: &[&str]) -> CommentMap {
        let mut inner = BTreeMap::new();
        inner.insert(line, texts.iter().map(|t| t.to_string()).collect());
        CommentMap::from(inner)
    }

    #[test]
    fn test_top_level_paragraph_is_wrapped_with_panel() {
        let html = render_annotated_html("Hello\n", &map(1, &["nice"]));
        assert_eq!(
            html,
            "<div class=\"annotated p\" data-line=\"1\">\n<p>Hello</p>\n\
             <aside class=\"comment-panel\"><p class=\"comment\"><strong>User:</strong> nice</p></aside></div>\n"
        );
    }

    #[test]
    fn test_nested_paragraph_is_not_wrapped() {
        let html = render_annotated_html("> quoted\n", &CommentMap::new());
        assert!(html.starts_with("<div class=\"annotated blockquote\" data-line=\"1\">\n<blockquote>"));
        assert_eq!(html.matches("<div").count(), 1);
    }

    #[test]
    fn test_list_items_wrap_inside_li() {
        let html = render_annotated_html("- a\n- b\n", &map(2, &["x", "y", "z"]));
        assert!(html.contains("<li><div class=\"annotated li\" data-line=\"1\">\na</div>\n</li>"));
        assert!(html.contains("<details><summary>+2</summary>"));
    }

    #[test]
    fn test_indented_list_items_are_not_wrapped() {
        let html = render_annotated_html(
            "  - indented\n  - also\n\n- top\n - one space\n",
            &CommentMap::new(),
        );
        assert_eq!(html.matches("class=\"annotated li\"").count(), 1);
        assert!(html.contains("data-line=\"4\""));
        assert!(!html.contains("data-line=\"1\""));
        assert!(!html.contains("data-line=\"5\""));
    }

    #[test]
    fn test_other_headings_are_plain() {
        let html = render_annotated_html("# Title\n\n#### Deep\n\n## Section {#sec}\n", &CommentMap::new());
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<h4>Deep</h4>"));
        assert!(html.contains("<div class=\"annotated h2\" data-line=\"5\">\n<h2 id=\"sec\">Section</h2>"));
    }

    #[test]
    fn test_comment_text_is_escaped() {
        let html = render_annotated_html("Hi\n", &map(1, &["<b>&</b>"]));
        assert!(html.contains("&lt;b&gt;&amp;&lt;/b&gt;"));
    }

    #[test]
    fn test_frontmatter_is_dropped_and_lines_stay_true() {
        let source = "---\ntitle: x\n---\n\nBody\n";
        let html = render_annotated_html(source, &CommentMap::new());
        assert!(!html.contains("title: x"));
        assert!(html.contains("data-line=\"5\""));
    }

    #[test]
    fn test_raw_html_passes_through() {
        let html = render_annotated_html("<section>raw</section>\n", &CommentMap::new());
        assert_eq!(html, "<section>raw</section>\n");
    }

    #[test]
    fn test_page_has_title_and_style() {
        let page = render_annotated_page("a & b", "Text\n", &CommentMap::new());
        assert!(page.contains("<title>a &amp; b</title>"));
        assert!(page.contains("width: 65%"));
    }
}
