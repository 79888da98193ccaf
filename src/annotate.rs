//! Decides which rendered blocks carry a comment overlay.
//!
//! Only five block kinds are ever intercepted. Of those, a block gets an
//! overlay iff it starts in the first column of the source, which singles out
//! top-level paragraphs, headings, blockquotes and list items; nested
//! constructs render unwrapped.

use log::debug;

use crate::document::{Block, HeadingLevel, SourcePosition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Paragraph,
    H2,
    H3,
    Blockquote,
    ListItem,
}

impl BlockKind {
    pub fn tag(self) -> &'static str {
        match self {
            BlockKind::Paragraph => "p",
            BlockKind::H2 => "h2",
            BlockKind::H3 => "h3",
            BlockKind::Blockquote => "blockquote",
            BlockKind::ListItem => "li",
        }
    }

    pub fn from_heading(level: HeadingLevel) -> Option<Self> {
        match level {
            HeadingLevel::H2 => Some(BlockKind::H2),
            HeadingLevel::H3 => Some(BlockKind::H3),
            _ => None,
        }
    }

    /// The intercepted kind of a block, if any. List items are not blocks of
    /// their own in the document tree; callers use [`BlockKind::ListItem`]
    /// directly for them.
    pub fn of(block: &Block) -> Option<Self> {
        match block {
            Block::Paragraph { .. } => Some(BlockKind::Paragraph),
            Block::Heading { level, .. } => Self::from_heading(*level),
            Block::Quote { .. } => Some(BlockKind::Blockquote),
            _ => None,
        }
    }
}

/// The line a block's comments are stored under, plus what kind of block it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Anchor {
    pub kind: BlockKind,
    pub position: SourcePosition,
}

impl Anchor {
    pub fn line(&self) -> u32 {
        self.position.start_line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrapping {
    Overlay(Anchor),
    Unwrapped(BlockKind),
}

impl Wrapping {
    pub fn anchor(self) -> Option<Anchor> {
        match self {
            Wrapping::Overlay(anchor) => Some(anchor),
            Wrapping::Unwrapped(_) => None,
        }
    }

    pub fn kind(self) -> BlockKind {
        match self {
            Wrapping::Overlay(anchor) => anchor.kind,
            Wrapping::Unwrapped(kind) => kind,
        }
    }
}

pub fn is_commentable(position: Option<SourcePosition>) -> bool {
    matches!(position, Some(p) if p.start_column == 1)
}

pub fn wrap_decision(kind: BlockKind, position: Option<SourcePosition>) -> Wrapping {
    match position {
        Some(position) if is_commentable(Some(position)) => {
            Wrapping::Overlay(Anchor { kind, position })
        }
        Some(_) => Wrapping::Unwrapped(kind),
        None => {
            debug!("<{}> has no source position, rendering without comments", kind.tag());
            Wrapping::Unwrapped(kind)
        }
    }
}
