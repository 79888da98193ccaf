pub type Range<Idx> = std::ops::Range<Idx>;

/// Where a block begins in the markdown source. Both fields are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourcePosition {
    pub start_line: u32,
    pub start_column: u32,
}

impl SourcePosition {
    pub fn new(start_line: u32, start_column: u32) -> Self {
        Self {
            start_line,
            start_column,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub blocks: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub block: Block,
    pub position: Option<SourcePosition>,
    pub source_range: Range<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading {
        level: HeadingLevel,
        id: Option<String>,
        content: Text,
    },
    Paragraph {
        content: Text,
    },
    CodeBlock {
        language: Option<String>,
        content: String,
    },
    Quote {
        content: Vec<Node>,
    },
    List {
        kind: ListKind,
        items: Vec<ListItem>,
    },
    Table {
        header: Option<TableRow>,
        rows: Vec<TableRow>,
    },
    Html {
        raw: String,
    },
    ThematicBreak,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Style {
    Code,
    Emphasis,
    Strong,
    Strikethrough,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextNode {
    pub content: String,
    pub style: Option<Style>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Text(Vec<TextOrInline>);

#[derive(Debug, Clone, PartialEq)]
pub enum TextOrInline {
    Text(TextNode),
    Inline(Inline),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Link {
        text: Text,
        url: String,
        title: Option<String>,
    },
    Image {
        alt_text: String,
        url: String,
        title: Option<String>,
    },
    LineBreak,
    SoftBreak,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeadingLevel {
    H1 = 1,
    H2 = 2,
    H3 = 3,
    H4 = 4,
    H5 = 5,
    H6 = 6,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListKind {
    Ordered { start: u64 },
    Unordered,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Checked,
    Unchecked,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub content: Vec<Node>,
    pub task_status: Option<TaskStatus>,
    pub position: Option<SourcePosition>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableRow {
    pub cells: Vec<Text>,
}

impl HeadingLevel {
    pub fn from_u8(level: u8) -> Option<Self> {
        match level {
            1 => Some(HeadingLevel::H1),
            2 => Some(HeadingLevel::H2),
            3 => Some(HeadingLevel::H3),
            4 => Some(HeadingLevel::H4),
            5 => Some(HeadingLevel::H5),
            6 => Some(HeadingLevel::H6),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl Node {
    pub fn new(block: Block, position: Option<SourcePosition>, source_range: Range<usize>) -> Self {
        Self {
            block,
            position,
            source_range,
        }
    }
}

impl Document {
    pub fn new() -> Self {
        Document { blocks: Vec::new() }
    }
}

impl TextNode {
    pub fn new(content: String, style: Option<Style>) -> Self {
        Self { content, style }
    }
}

impl From<&str> for Text {
    fn from(value: &str) -> Self {
        TextNode::from(value).into()
    }
}

impl From<String> for Text {
    fn from(value: String) -> Self {
        TextNode::from(value).into()
    }
}

impl From<TextNode> for Text {
    fn from(value: TextNode) -> Self {
        Self(vec![TextOrInline::Text(value)])
    }
}

impl From<&str> for TextNode {
    fn from(value: &str) -> Self {
        value.to_string().into()
    }
}

impl From<String> for TextNode {
    fn from(value: String) -> Self {
        Self {
            content: value,
            ..Default::default()
        }
    }
}

impl Text {
    pub fn push(&mut self, item: TextOrInline) {
        self.0.push(item);
    }

    pub fn push_text(&mut self, node: TextNode) {
        self.0.push(TextOrInline::Text(node));
    }

    pub fn push_inline(&mut self, inline: Inline) {
        self.0.push(TextOrInline::Inline(inline));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TextOrInline> {
        self.0.iter()
    }

    /// Flattens the text into a single display string. Soft breaks become
    /// spaces and hard breaks become newlines.
    pub fn plain(&self) -> String {
        let mut out = String::new();
        self.write_plain(&mut out);
        out
    }

    fn write_plain(&self, out: &mut String) {
        for item in &self.0 {
            match item {
                TextOrInline::Text(node) => out.push_str(&node.content),
                TextOrInline::Inline(Inline::Link { text, .. }) => text.write_plain(out),
                TextOrInline::Inline(Inline::Image { alt_text, .. }) => {
                    out.push('[');
                    out.push_str(alt_text);
                    out.push(']');
                }
                TextOrInline::Inline(Inline::LineBreak) => out.push('\n'),
                TextOrInline::Inline(Inline::SoftBreak) => out.push(' '),
            }
        }
    }
}

impl IntoIterator for Text {
    type Item = TextOrInline;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_flattens_inlines() {
        let mut text = Text::from("Read ");
        text.push_inline(Inline::Link {
            text: Text::from("the docs"),
            url: "https://example.com".to_string(),
            title: None,
        });
        text.push_inline(Inline::SoftBreak);
        text.push_text(TextNode::new("now".to_string(), Some(Style::Strong)));
        text.push_inline(Inline::LineBreak);
        text.push_inline(Inline::Image {
            alt_text: "logo".to_string(),
            url: "logo.png".to_string(),
            title: None,
        });

        assert_eq!(text.plain(), "Read the docs now\n[logo]");
    }

    #[test]
    fn test_heading_level_round_trip() {
        for level in 1..=6 {
            assert_eq!(HeadingLevel::from_u8(level).unwrap().as_u8(), level);
        }
        assert_eq!(HeadingLevel::from_u8(7), None);
    }
}
