//! Lays a parsed [`Document`] out as a column of terminal lines.
//!
//! Every top-level node becomes one [`VisualBlock`], and a top-level list
//! contributes one block per item. A block that passes the anchoring rule in
//! [`crate::annotate`] carries the [`Anchor`] its comment panel hangs off.

use std::sync::LazyLock;

use ratatui::style::{Modifier, Style as RatatuiStyle};
use ratatui::text::{Line, Span};
use regex::Regex;
use unicode_width::UnicodeWidthStr;

use crate::annotate::{self, Anchor, BlockKind};
use crate::document::{
    Block, Document, HeadingLevel, Inline, ListItem, ListKind, Node, Style, TaskStatus, Text,
    TextOrInline,
};
use crate::theme::Base16Palette;

const MIN_WIDTH: usize = 8;
const QUOTE_PREFIX: &str = "│ ";

static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Invalid HTML tag regex"));

#[derive(Debug, Clone)]
pub struct VisualBlock {
    pub anchor: Option<Anchor>,
    pub lines: Vec<Line<'static>>,
    /// Blank rows between this block and the next.
    pub gap_after: u16,
}

impl VisualBlock {
    pub fn height(&self) -> usize {
        self.lines.len()
    }
}

/// Anchors in document order, computed the same way [`layout_document`]
/// assigns them but without rendering anything.
pub fn collect_anchors(doc: &Document) -> Vec<Anchor> {
    let mut anchors = Vec::new();
    for node in &doc.blocks {
        match &node.block {
            Block::List { items, .. } => anchors.extend(
                items
                    .iter()
                    .filter_map(|item| annotate::wrap_decision(BlockKind::ListItem, item.position).anchor()),
            ),
            block => anchors.extend(
                BlockKind::of(block)
                    .and_then(|kind| annotate::wrap_decision(kind, node.position).anchor()),
            ),
        }
    }
    anchors
}

pub fn layout_document(doc: &Document, width: u16, palette: &Base16Palette) -> Vec<VisualBlock> {
    let width = usize::from(width).max(MIN_WIDTH);
    let mut blocks = Vec::new();

    for node in &doc.blocks {
        match &node.block {
            Block::List { kind, items } => {
                for (idx, item) in items.iter().enumerate() {
                    let anchor =
                        annotate::wrap_decision(BlockKind::ListItem, item.position).anchor();
                    blocks.push(VisualBlock {
                        anchor,
                        lines: item_lines(kind, idx, item, width, palette),
                        gap_after: if idx + 1 == items.len() { 1 } else { 0 },
                    });
                }
            }
            block => {
                let lines = node_lines(node, width, palette);
                if lines.is_empty() {
                    continue;
                }
                let anchor = BlockKind::of(block)
                    .and_then(|kind| annotate::wrap_decision(kind, node.position).anchor());
                blocks.push(VisualBlock {
                    anchor,
                    lines,
                    gap_after: 1,
                });
            }
        }
    }

    if let Some(last) = blocks.last_mut() {
        last.gap_after = 0;
    }
    blocks
}

fn node_lines(node: &Node, width: usize, palette: &Base16Palette) -> Vec<Line<'static>> {
    let base = RatatuiStyle::default().fg(palette.base_05);

    match &node.block {
        Block::Heading { level, content, .. } => {
            let mut style = RatatuiStyle::default()
                .fg(palette.base_0d)
                .add_modifier(Modifier::BOLD);
            let mut spans = text_spans(content, style, palette);
            if *level == HeadingLevel::H1 {
                style = style.add_modifier(Modifier::UNDERLINED);
                spans = spans
                    .into_iter()
                    .map(|span| Span::styled(span.content.to_uppercase(), span.style.patch(style)))
                    .collect();
            }
            let prefix = format!("{} ", "#".repeat(usize::from(level.as_u8())));
            prefix_lines(
                wrap_spans(spans, width.saturating_sub(prefix.width())),
                &prefix,
                style,
            )
        }
        Block::Paragraph { content } => wrap_spans(text_spans(content, base, palette), width),
        Block::CodeBlock { content, .. } => {
            let style = RatatuiStyle::default().fg(palette.base_0b);
            content
                .lines()
                .map(|line| {
                    let shown: String = line.chars().take(width.saturating_sub(2)).collect();
                    Line::from(Span::styled(format!("  {shown}"), style))
                })
                .collect()
        }
        Block::Quote { content } => {
            let inner = nested_lines(content, width.saturating_sub(QUOTE_PREFIX.width()), palette)
                .into_iter()
                .map(|line| {
                    Line::from(
                        line.spans
                            .into_iter()
                            .map(|span| {
                                let style = span.style.add_modifier(Modifier::ITALIC);
                                Span::styled(span.content, style)
                            })
                            .collect::<Vec<_>>(),
                    )
                })
                .collect();
            let bar = RatatuiStyle::default().fg(palette.base_03);
            prefix_all(inner, QUOTE_PREFIX, bar)
        }
        Block::List { kind, items } => items
            .iter()
            .enumerate()
            .flat_map(|(idx, item)| item_lines(kind, idx, item, width, palette))
            .collect(),
        Block::Table { header, rows } => {
            let mut lines = Vec::new();
            let border = RatatuiStyle::default().fg(palette.base_03);
            if let Some(header) = header {
                let style = base.add_modifier(Modifier::BOLD);
                lines.push(table_row_line(&header.cells, width, style, border));
                lines.push(Line::from(Span::styled("─".repeat(width), border)));
            }
            for row in rows {
                lines.push(table_row_line(&row.cells, width, base, border));
            }
            lines
        }
        Block::Html { raw } => {
            let stripped = HTML_TAG_RE.replace_all(raw, " ");
            let text = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                return Vec::new();
            }
            let style = RatatuiStyle::default().fg(palette.base_04);
            wrap_spans(vec![Span::styled(text, style)], width)
        }
        Block::ThematicBreak => vec![Line::from(Span::styled(
            "─".repeat(width),
            RatatuiStyle::default().fg(palette.base_03),
        ))],
    }
}

/// Children of a quote or list item. Loose paragraphs are separated by a
/// blank row; a nested list hugs the text above it.
fn nested_lines(children: &[Node], width: usize, palette: &Base16Palette) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for (idx, child) in children.iter().enumerate() {
        let child_lines = node_lines(child, width, palette);
        if child_lines.is_empty() {
            continue;
        }
        if idx > 0 && !matches!(child.block, Block::List { .. }) {
            lines.push(Line::default());
        }
        lines.extend(child_lines);
    }
    lines
}

fn item_lines(
    kind: &ListKind,
    idx: usize,
    item: &ListItem,
    width: usize,
    palette: &Base16Palette,
) -> Vec<Line<'static>> {
    let mut marker = match kind {
        ListKind::Unordered => "• ".to_string(),
        ListKind::Ordered { start } => format!("{}. ", start + idx as u64),
    };
    match item.task_status {
        Some(TaskStatus::Checked) => marker.push_str("[x] "),
        Some(TaskStatus::Unchecked) => marker.push_str("[ ] "),
        None => {}
    }

    let style = RatatuiStyle::default().fg(palette.base_0a);
    let inner = nested_lines(&item.content, width.saturating_sub(marker.width()), palette);
    if inner.is_empty() {
        return vec![Line::from(Span::styled(marker, style))];
    }
    prefix_lines(inner, &marker, style)
}

fn table_row_line(
    cells: &[Text],
    width: usize,
    style: RatatuiStyle,
    border: RatatuiStyle,
) -> Line<'static> {
    let mut spans = Vec::new();
    let mut used = 0;
    for (idx, cell) in cells.iter().enumerate() {
        if idx > 0 {
            spans.push(Span::styled(" │ ", border));
            used += 3;
        }
        let text = truncate_to_width(&cell.plain(), width.saturating_sub(used));
        used += text.width();
        spans.push(Span::styled(text, style));
        if used >= width {
            break;
        }
    }
    Line::from(spans)
}

/// Puts `prefix` in front of the first line and an equally wide indent in
/// front of the rest.
fn prefix_lines(
    lines: Vec<Line<'static>>,
    prefix: &str,
    style: RatatuiStyle,
) -> Vec<Line<'static>> {
    let indent = " ".repeat(prefix.width());
    lines
        .into_iter()
        .enumerate()
        .map(|(idx, line)| {
            if idx > 0 && line.spans.iter().all(|span| span.content.is_empty()) {
                return line;
            }
            let lead = if idx == 0 { prefix.to_string() } else { indent.clone() };
            let mut spans = vec![Span::styled(lead, style)];
            spans.extend(line.spans);
            Line::from(spans)
        })
        .collect()
}

fn prefix_all(lines: Vec<Line<'static>>, prefix: &str, style: RatatuiStyle) -> Vec<Line<'static>> {
    lines
        .into_iter()
        .map(|line| {
            let mut spans = vec![Span::styled(prefix.to_string(), style)];
            spans.extend(line.spans);
            Line::from(spans)
        })
        .collect()
}

fn text_spans(text: &Text, base: RatatuiStyle, palette: &Base16Palette) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for item in text.iter() {
        match item {
            TextOrInline::Text(node) => {
                let style = match node.style {
                    Some(Style::Strong) => base.add_modifier(Modifier::BOLD),
                    Some(Style::Emphasis) => base.add_modifier(Modifier::ITALIC),
                    Some(Style::Strikethrough) => base.add_modifier(Modifier::CROSSED_OUT),
                    Some(Style::Code) => base.fg(palette.base_0c),
                    None => base,
                };
                spans.push(Span::styled(node.content.clone(), style));
            }
            TextOrInline::Inline(Inline::Link { text, .. }) => {
                let style = base.fg(palette.base_0d).add_modifier(Modifier::UNDERLINED);
                spans.extend(text_spans(text, style, palette));
            }
            TextOrInline::Inline(Inline::Image { alt_text, .. }) => {
                spans.push(Span::styled(format!("[{alt_text}]"), base.fg(palette.base_0e)));
            }
            TextOrInline::Inline(Inline::LineBreak) => spans.push(Span::styled("\n", base)),
            TextOrInline::Inline(Inline::SoftBreak) => spans.push(Span::styled(" ", base)),
        }
    }
    spans
}

/// Greedy word wrap that keeps each word's style. A `"\n"` inside a span
/// forces a break; words wider than `width` are split by character.
pub fn wrap_spans(spans: Vec<Span<'static>>, width: usize) -> Vec<Line<'static>> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut current_width = 0;
    let mut pending_space: Option<RatatuiStyle> = None;

    for span in spans {
        let style = span.style;
        for (idx, segment) in span.content.split('\n').enumerate() {
            if idx > 0 {
                lines.push(Line::from(std::mem::take(&mut current)));
                current_width = 0;
                pending_space = None;
            }
            let mut rest = segment;
            while !rest.is_empty() {
                let word_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                if word_end == 0 {
                    let space_end = rest
                        .find(|c: char| !c.is_whitespace())
                        .unwrap_or(rest.len());
                    if current_width > 0 {
                        pending_space = Some(style);
                    }
                    rest = &rest[space_end..];
                    continue;
                }

                let word = &rest[..word_end];
                rest = &rest[word_end..];
                let word_width = word.width();
                let space_width = usize::from(pending_space.is_some());

                if current_width > 0 && current_width + space_width + word_width > width {
                    lines.push(Line::from(std::mem::take(&mut current)));
                    current_width = 0;
                    pending_space = None;
                }
                if let Some(space_style) = pending_space.take() {
                    current.push(Span::styled(" ", space_style));
                    current_width += 1;
                }

                if word_width <= width - current_width.min(width) {
                    current.push(Span::styled(word.to_string(), style));
                    current_width += word_width;
                } else {
                    for chunk in split_by_width(word, width, width - current_width.min(width)) {
                        if current_width > 0 && current_width + chunk.width() > width {
                            lines.push(Line::from(std::mem::take(&mut current)));
                            current_width = 0;
                        }
                        current_width += chunk.width();
                        current.push(Span::styled(chunk, style));
                    }
                }
            }
        }
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(Line::from(current));
    }
    lines
}

/// Splits `word` into pieces no wider than `width`, the first one no wider
/// than `first_room` when that is non-zero.
fn split_by_width(word: &str, width: usize, first_room: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut room = if first_room > 0 { first_room } else { width };
    let mut chunk = String::new();
    let mut chunk_width = 0;
    for c in word.chars() {
        let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
        if chunk_width + w > room && !chunk.is_empty() {
            chunks.push(std::mem::take(&mut chunk));
            chunk_width = 0;
            room = width;
        }
        chunk.push(c);
        chunk_width += w;
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    chunks
}

pub fn truncate_to_width(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > width {
            break;
        }
        used += w;
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse_markdown;
    use crate::theme::ThemeId;

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn layout(source: &str, width: u16) -> Vec<VisualBlock> {
        layout_document(&parse_markdown(source), width, ThemeId::OceanicNext.palette())
    }

    #[test]
    fn test_wrap_spans_breaks_on_words() {
        let lines = wrap_spans(vec![Span::raw("one two three four")], 9);
        let text: Vec<_> = lines.iter().map(line_text).collect();
        assert_eq!(text, vec!["one two", "three", "four"]);
    }

    #[test]
    fn test_wrap_spans_keeps_styles_and_hard_breaks() {
        let bold = RatatuiStyle::default().add_modifier(Modifier::BOLD);
        let lines = wrap_spans(
            vec![
                Span::raw("plain "),
                Span::styled("bold", bold),
                Span::raw("\nnext"),
            ],
            40,
        );
        assert_eq!(lines.len(), 2);
        assert_eq!(line_text(&lines[0]), "plain bold");
        assert!(lines[0].spans.iter().any(|s| s.content == "bold" && s.style == bold));
        assert_eq!(line_text(&lines[1]), "next");
    }

    #[test]
    fn test_wrap_spans_splits_long_words() {
        let lines = wrap_spans(vec![Span::raw("abcdefghij")], 4);
        let text: Vec<_> = lines.iter().map(line_text).collect();
        assert_eq!(text, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_top_level_blocks_are_anchored() {
        let blocks = layout("## Title\n\nSome text.\n\n> quoted\n", 40);
        let lines: Vec<_> = blocks.iter().map(|b| b.anchor.map(|a| a.line())).collect();
        assert_eq!(lines, vec![Some(1), Some(3), Some(5)]);
        assert_eq!(line_text(&blocks[0].lines[0]), "## Title");
        assert_eq!(line_text(&blocks[2].lines[0]), "│ quoted");
    }

    #[test]
    fn test_list_items_become_separate_blocks() {
        let blocks = layout("- one\n- two\n  - nested\n\nafter\n", 40);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].anchor.map(|a| a.kind), Some(BlockKind::ListItem));
        assert_eq!(blocks[0].gap_after, 0);
        assert_eq!(blocks[1].gap_after, 1);

        let second: Vec<_> = blocks[1].lines.iter().map(line_text).collect();
        assert_eq!(second, vec!["• two", "  • nested"]);
        assert_eq!(blocks[2].anchor.map(|a| a.line()), Some(5));
    }

    #[test]
    fn test_indented_items_are_laid_out_without_anchor() {
        let source = "  - indented\n  - also\n\n- top\n - one space\n";
        let blocks = layout(source, 40);
        assert_eq!(blocks.len(), 4);
        let lines: Vec<_> = blocks.iter().map(|b| b.anchor.map(|a| a.line())).collect();
        assert_eq!(lines, vec![None, None, Some(4), None]);
        assert_eq!(
            collect_anchors(&parse_markdown(source))
                .iter()
                .map(|a| (a.line(), a.position.start_column))
                .collect::<Vec<_>>(),
            vec![(4, 1)]
        );
    }

    #[test]
    fn test_unintercepted_blocks_have_no_anchor() {
        let blocks = layout("# Top\n\n```\ncode\n```\n\n---\n\n#### Deep\n", 40);
        assert!(blocks.iter().all(|b| b.anchor.is_none()));
        assert_eq!(line_text(&blocks[0].lines[0]), "# TOP");
        assert_eq!(line_text(&blocks[1].lines[0]), "  code");
    }

    #[test]
    fn test_empty_html_block_is_skipped() {
        let blocks = layout("<div>\n</div>\n\ntext\n", 40);
        assert_eq!(blocks.len(), 1);
        assert_eq!(line_text(&blocks[0].lines[0]), "text");
    }

    #[test]
    fn test_collect_anchors_matches_layout() {
        let source = "Intro\n\n- a\n- b\n\n> q\n\n### h\n\n    indented code\n";
        let from_layout: Vec<_> = layout(source, 30).iter().filter_map(|b| b.anchor).collect();
        assert_eq!(collect_anchors(&parse_markdown(source)), from_layout);
        assert_eq!(from_layout.len(), 5);
    }

    #[test]
    fn test_loose_item_paragraphs_are_separated() {
        let blocks = layout("1. first\n\n   more\n2. second\n", 40);
        let first: Vec<_> = blocks[0].lines.iter().map(line_text).collect();
        assert_eq!(first, vec!["1. first", "", "   more"]);
        assert_eq!(line_text(&blocks[1].lines[0]), "2. second");
    }
}
