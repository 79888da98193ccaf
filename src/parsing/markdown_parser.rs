use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag};

use crate::document::{
    Block, Document, HeadingLevel, Inline, ListItem, ListKind, Node, Range, SourcePosition, Style,
    TableRow, TaskStatus, Text, TextNode,
};

/// GFM tables, strikethrough and task lists, YAML frontmatter and `{#id}`
/// heading attributes.
pub fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
    options
}

/// Maps byte offsets of a source text to 1-based line/column positions.
pub struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            source,
            line_starts,
        }
    }

    pub fn position(&self, offset: usize) -> SourcePosition {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        // columns count characters, not bytes
        let column = self
            .source
            .get(line_start..offset)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(offset - line_start);

        SourcePosition::new(line as u32 + 1, column as u32 + 1)
    }

    /// Position of the block starting at `offset`. Container ranges such as
    /// list items can begin at the start of the line, so leading spaces and
    /// tabs are skipped to land on the marker itself.
    pub fn block_position(&self, offset: usize) -> SourcePosition {
        let indent = self
            .source
            .get(offset..)
            .map(|rest| rest.len() - rest.trim_start_matches([' ', '\t']).len())
            .unwrap_or(0);
        self.position(offset + indent)
    }
}

pub fn parse_markdown(source: &str) -> Document {
    MarkdownParser::new(source).parse()
}

enum Frame {
    Paragraph {
        text: Text,
        start: usize,
    },
    Heading {
        level: HeadingLevel,
        id: Option<String>,
        text: Text,
        start: usize,
    },
    Quote {
        children: Vec<Node>,
        start: usize,
    },
    List {
        kind: ListKind,
        items: Vec<ListItem>,
        start: usize,
    },
    Item {
        children: Vec<Node>,
        // text of a tight item, which pulldown-cmark emits without a paragraph
        tight_text: Text,
        tight_range: Option<Range<usize>>,
        task_status: Option<TaskStatus>,
        start: usize,
    },
    CodeBlock {
        language: Option<String>,
        content: String,
        start: usize,
    },
    HtmlBlock {
        raw: String,
        start: usize,
    },
    Table {
        header: Option<TableRow>,
        rows: Vec<TableRow>,
        start: usize,
    },
    TableHead {
        row: TableRow,
    },
    TableRow {
        row: TableRow,
    },
    TableCell {
        text: Text,
    },
    Style(Style),
    Link {
        url: String,
        title: Option<String>,
        text: Text,
    },
    Image {
        url: String,
        title: Option<String>,
        alt: String,
    },
    Metadata,
    Transparent,
}

struct MarkdownParser<'a> {
    source: &'a str,
    index: LineIndex<'a>,
    stack: Vec<Frame>,
    document: Document,
}

fn non_empty(value: CowStr<'_>) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl<'a> MarkdownParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            index: LineIndex::new(source),
            stack: Vec::new(),
            document: Document::new(),
        }
    }

    fn parse(mut self) -> Document {
        let parser = Parser::new_ext(self.source, parser_options()).into_offset_iter();

        for (event, range) in parser {
            match event {
                Event::Start(tag) => self.start(tag, range.start),
                Event::End(_) => self.end(range),
                Event::Text(text) => self.text(&text, range),
                Event::Code(code) => {
                    self.push_text(TextNode::new(code.to_string(), Some(Style::Code)), range)
                }
                Event::Html(html) => self.html(&html),
                Event::InlineHtml(_) => {}
                Event::FootnoteReference(label) => self.text(&format!("[{label}]"), range),
                Event::SoftBreak => self.push_inline(Inline::SoftBreak),
                Event::HardBreak => self.push_inline(Inline::LineBreak),
                Event::Rule => {
                    let position = self.position(range.start);
                    self.attach(Node::new(Block::ThematicBreak, position, range));
                }
                Event::TaskListMarker(checked) => self.task_marker(checked),
                _ => {}
            }
        }

        self.document
    }

    fn position(&self, offset: usize) -> Option<SourcePosition> {
        Some(self.index.block_position(offset))
    }

    fn start(&mut self, tag: Tag<'_>, start: usize) {
        let frame = match tag {
            Tag::Paragraph => Frame::Paragraph {
                text: Text::default(),
                start,
            },
            Tag::Heading { level, id, .. } => Frame::Heading {
                level: HeadingLevel::from_u8(level as u8).unwrap_or(HeadingLevel::H6),
                id: id.and_then(non_empty),
                text: Text::default(),
                start,
            },
            Tag::BlockQuote(_) => Frame::Quote {
                children: Vec::new(),
                start,
            },
            Tag::CodeBlock(kind) => {
                let language = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .map(|lang| lang.to_string()),
                    CodeBlockKind::Indented => None,
                };
                Frame::CodeBlock {
                    language,
                    content: String::new(),
                    start,
                }
            }
            Tag::HtmlBlock => Frame::HtmlBlock {
                raw: String::new(),
                start,
            },
            Tag::List(first) => Frame::List {
                kind: match first {
                    Some(start) => ListKind::Ordered { start },
                    None => ListKind::Unordered,
                },
                items: Vec::new(),
                start,
            },
            Tag::Item => Frame::Item {
                children: Vec::new(),
                tight_text: Text::default(),
                tight_range: None,
                task_status: None,
                start,
            },
            Tag::Table(_) => Frame::Table {
                header: None,
                rows: Vec::new(),
                start,
            },
            Tag::TableHead => Frame::TableHead {
                row: TableRow::default(),
            },
            Tag::TableRow => Frame::TableRow {
                row: TableRow::default(),
            },
            Tag::TableCell => Frame::TableCell {
                text: Text::default(),
            },
            Tag::Emphasis => Frame::Style(Style::Emphasis),
            Tag::Strong => Frame::Style(Style::Strong),
            Tag::Strikethrough => Frame::Style(Style::Strikethrough),
            Tag::Link {
                dest_url, title, ..
            } => Frame::Link {
                url: dest_url.to_string(),
                title: non_empty(title),
                text: Text::default(),
            },
            Tag::Image {
                dest_url, title, ..
            } => Frame::Image {
                url: dest_url.to_string(),
                title: non_empty(title),
                alt: String::new(),
            },
            Tag::MetadataBlock(_) => Frame::Metadata,
            _ => Frame::Transparent,
        };
        self.stack.push(frame);
    }

    fn end(&mut self, range: Range<usize>) {
        let Some(frame) = self.stack.pop() else {
            return;
        };

        match frame {
            Frame::Paragraph { text, start } => {
                let block = Block::Paragraph { content: text };
                self.attach_block(block, start, range.end);
            }
            Frame::Heading {
                level,
                id,
                text,
                start,
            } => {
                let block = Block::Heading {
                    level,
                    id,
                    content: text,
                };
                self.attach_block(block, start, range.end);
            }
            Frame::Quote { children, start } => {
                self.attach_block(Block::Quote { content: children }, start, range.end);
            }
            Frame::List { kind, items, start } => {
                self.attach_block(Block::List { kind, items }, start, range.end);
            }
            Frame::Item {
                mut children,
                tight_text,
                tight_range,
                task_status,
                start,
            } => {
                if let Some(node) = self.tight_paragraph(tight_text, tight_range) {
                    children.push(node);
                }
                let position = self.position(start);
                if let Some(Frame::List { items, .. }) = self.stack.last_mut() {
                    items.push(ListItem {
                        content: children,
                        task_status,
                        position,
                    });
                }
            }
            Frame::CodeBlock {
                language,
                mut content,
                start,
            } => {
                if content.ends_with('\n') {
                    content.pop();
                }
                self.attach_block(Block::CodeBlock { language, content }, start, range.end);
            }
            Frame::HtmlBlock { raw, start } => {
                self.attach_block(Block::Html { raw }, start, range.end);
            }
            Frame::Table {
                header,
                rows,
                start,
            } => {
                self.attach_block(Block::Table { header, rows }, start, range.end);
            }
            Frame::TableHead { row } => {
                if let Some(Frame::Table { header, .. }) = self.stack.last_mut() {
                    *header = Some(row);
                }
            }
            Frame::TableRow { row } => {
                if let Some(Frame::Table { rows, .. }) = self.stack.last_mut() {
                    rows.push(row);
                }
            }
            Frame::TableCell { text } => match self.stack.last_mut() {
                Some(Frame::TableHead { row }) | Some(Frame::TableRow { row }) => {
                    row.cells.push(text)
                }
                _ => {}
            },
            Frame::Link { url, title, text } => {
                self.push_inline(Inline::Link { text, url, title });
            }
            Frame::Image { url, title, alt } => {
                self.push_inline(Inline::Image {
                    alt_text: alt,
                    url,
                    title,
                });
            }
            Frame::Style(_) | Frame::Metadata | Frame::Transparent => {}
        }
    }

    fn tight_paragraph(&self, text: Text, range: Option<Range<usize>>) -> Option<Node> {
        if text.is_empty() {
            return None;
        }
        let range = range.unwrap_or(0..0);
        Some(Node::new(
            Block::Paragraph { content: text },
            self.position(range.start),
            range,
        ))
    }

    fn attach_block(&mut self, block: Block, start: usize, end: usize) {
        let position = self.position(start);
        self.attach(Node::new(block, position, start..end));
    }

    /// Adds a finished block to the nearest enclosing container, or to the
    /// document when there is none.
    fn attach(&mut self, node: Node) {
        let mut target = None;
        for (idx, frame) in self.stack.iter().enumerate().rev() {
            match frame {
                Frame::Quote { .. } | Frame::Item { .. } => {
                    target = Some(idx);
                    break;
                }
                _ => continue,
            }
        }

        let Some(idx) = target else {
            self.document.blocks.push(node);
            return;
        };

        let pending = match &mut self.stack[idx] {
            Frame::Item {
                tight_text,
                tight_range,
                ..
            } => Some((std::mem::take(tight_text), tight_range.take())),
            _ => None,
        };
        let tight = pending.and_then(|(text, range)| self.tight_paragraph(text, range));

        match &mut self.stack[idx] {
            Frame::Quote { children, .. } | Frame::Item { children, .. } => {
                children.extend(tight);
                children.push(node);
            }
            _ => {}
        }
    }

    fn current_style(&self) -> Option<Style> {
        self.stack.iter().rev().find_map(|frame| match frame {
            Frame::Style(style) => Some(style.clone()),
            _ => None,
        })
    }

    fn text(&mut self, content: &str, range: Range<usize>) {
        let style = self.current_style();
        self.push_text(TextNode::new(content.to_string(), style), range);
    }

    fn push_text(&mut self, node: TextNode, range: Range<usize>) {
        for frame in self.stack.iter_mut().rev() {
            match frame {
                Frame::Style(_) | Frame::Transparent => continue,
                Frame::Paragraph { text, .. }
                | Frame::Heading { text, .. }
                | Frame::TableCell { text }
                | Frame::Link { text, .. } => {
                    text.push_text(node);
                    return;
                }
                Frame::Image { alt, .. } => {
                    alt.push_str(&node.content);
                    return;
                }
                Frame::CodeBlock { content, .. } => {
                    content.push_str(&node.content);
                    return;
                }
                Frame::HtmlBlock { raw, .. } => {
                    raw.push_str(&node.content);
                    return;
                }
                Frame::Item {
                    tight_text,
                    tight_range,
                    ..
                } => {
                    tight_text.push_text(node);
                    *tight_range = Some(match tight_range.take() {
                        Some(existing) => existing.start..range.end,
                        None => range,
                    });
                    return;
                }
                _ => return,
            }
        }
    }

    fn push_inline(&mut self, inline: Inline) {
        for frame in self.stack.iter_mut().rev() {
            match frame {
                Frame::Style(_) | Frame::Transparent => continue,
                Frame::Paragraph { text, .. }
                | Frame::Heading { text, .. }
                | Frame::TableCell { text }
                | Frame::Link { text, .. } => {
                    text.push_inline(inline);
                    return;
                }
                Frame::Item { tight_text, .. } => {
                    tight_text.push_inline(inline);
                    return;
                }
                _ => return,
            }
        }
    }

    fn html(&mut self, html: &str) {
        if let Some(Frame::HtmlBlock { raw, .. }) = self.stack.last_mut() {
            raw.push_str(html);
        }
    }

    fn task_marker(&mut self, checked: bool) {
        let status = if checked {
            TaskStatus::Checked
        } else {
            TaskStatus::Unchecked
        };
        if let Some(Frame::Item { task_status, .. }) = self
            .stack
            .iter_mut()
            .rev()
            .find(|frame| matches!(frame, Frame::Item { .. }))
        {
            *task_status = Some(status);
        }
    }
}
