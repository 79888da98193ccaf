//! Per-block comment overlay: hover-driven disclosure of the comments anchored
//! to a block's source line, plus the draft/submit cycle for adding one.

use log::{debug, error};

use crate::annotate::Anchor;
use crate::comments::{CommentStore, CommentStoreError};

/// Label shown next to stored comments.
pub const STORED_AUTHOR: &str = "User";
/// Label shown next to the input row.
pub const DRAFT_AUTHOR: &str = "Me";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HoverState {
    #[default]
    Idle,
    Hovered,
}

#[derive(Debug)]
pub enum SubmitOutcome {
    /// Nothing to submit.
    Ignored,
    Saved,
    /// The comment is in the in-memory map but could not be persisted.
    SavedInMemoryOnly(CommentStoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentLine<'a> {
    pub author: &'static str,
    pub text: &'a str,
}

/// What the overlay shows for a given comment list, independent of how it is
/// drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayView<'a> {
    pub first: Option<CommentLine<'a>>,
    /// Second comment onward; only populated while hovered.
    pub rest: Vec<CommentLine<'a>>,
    /// `"+N"` for the hidden comments; only while idle with more than one.
    pub indicator: Option<String>,
    /// Current draft text; `Some` iff the input row is shown.
    pub input: Option<&'a str>,
    pub bordered: bool,
    /// Drawn above neighbouring panels.
    pub raised: bool,
}

impl OverlayView<'_> {
    pub fn is_empty(&self) -> bool {
        self.first.is_none() && self.input.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct CommentOverlay {
    anchor: Anchor,
    hover: HoverState,
    draft: String,
}

impl CommentOverlay {
    pub fn new(anchor: Anchor) -> Self {
        Self {
            anchor,
            hover: HoverState::Idle,
            draft: String::new(),
        }
    }

    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    pub fn line(&self) -> u32 {
        self.anchor.line()
    }

    pub fn hover_state(&self) -> HoverState {
        self.hover
    }

    pub fn is_hovered(&self) -> bool {
        self.hover == HoverState::Hovered
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn pointer_enter(&mut self) {
        if self.hover != HoverState::Hovered {
            debug!("Hover enter on line {}", self.line());
        }
        self.hover = HoverState::Hovered;
    }

    pub fn pointer_leave(&mut self) {
        if self.hover != HoverState::Idle {
            debug!("Hover leave on line {}", self.line());
        }
        self.hover = HoverState::Idle;
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn push_char(&mut self, c: char) {
        self.draft.push(c);
    }

    pub fn pop_char(&mut self) {
        self.draft.pop();
    }

    /// Appends the draft to this block's line and clears it.
    ///
    /// Only an empty draft is refused; whitespace-only text is accepted as a
    /// comment.
    pub fn submit(&mut self, store: &mut CommentStore) -> SubmitOutcome {
        if self.draft.is_empty() {
            return SubmitOutcome::Ignored;
        }

        let line = self.line();
        let text = std::mem::take(&mut self.draft);
        let next = store.map().with_appended(line, text);

        match store.update(next) {
            Ok(()) => {
                debug!("Added comment on line {line}");
                SubmitOutcome::Saved
            }
            Err(e) => {
                error!("Failed to persist comment on line {line}: {e}");
                SubmitOutcome::SavedInMemoryOnly(e)
            }
        }
    }

    pub fn view<'a>(&'a self, comments: &'a [String]) -> OverlayView<'a> {
        let stored = |text: &'a String| CommentLine {
            author: STORED_AUTHOR,
            text: text.as_str(),
        };
        let first = comments.first().map(stored);

        match self.hover {
            HoverState::Hovered => OverlayView {
                first,
                rest: comments.iter().skip(1).map(stored).collect(),
                indicator: None,
                input: Some(self.draft.as_str()),
                bordered: true,
                raised: true,
            },
            HoverState::Idle => OverlayView {
                first,
                rest: Vec::new(),
                indicator: (comments.len() > 1).then(|| format!("+{}", comments.len() - 1)),
                input: None,
                bordered: false,
                raised: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::BlockKind;
    use crate::comments::{COMMENTS_KEY, load};
    use crate::document::SourcePosition;
    use crate::storage::{FileStorage, MemoryStorage};

    fn overlay_at(line: u32) -> CommentOverlay {
        CommentOverlay::new(Anchor {
            kind: BlockKind::Paragraph,
            position: SourcePosition::new(line, 1),
        })
    }

    fn comments(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_idle_with_three_comments_shows_first_and_count() {
        let overlay = overlay_at(3);
        let list = comments(&["a", "b", "c"]);
        let view = overlay.view(&list);

        assert_eq!(
            view.first,
            Some(CommentLine {
                author: "User",
                text: "a"
            })
        );
        assert!(view.rest.is_empty());
        assert_eq!(view.indicator.as_deref(), Some("+2"));
        assert_eq!(view.input, None);
        assert!(!view.bordered);
    }

    #[test]
    fn test_idle_with_one_comment_has_no_indicator() {
        let overlay = overlay_at(3);
        let list = comments(&["only"]);
        let view = overlay.view(&list);

        assert_eq!(view.first.map(|c| c.text), Some("only"));
        assert_eq!(view.indicator, None);
    }

    #[test]
    fn test_idle_without_comments_shows_nothing() {
        let overlay = overlay_at(3);
        let view = overlay.view(&[]);
        assert!(view.is_empty());
        assert_eq!(view.indicator, None);
    }

    #[test]
    fn test_hovered_with_three_comments_shows_all_and_empty_input() {
        let mut overlay = overlay_at(3);
        overlay.pointer_enter();
        let list = comments(&["a", "b", "c"]);
        let view = overlay.view(&list);

        assert_eq!(view.first.map(|c| c.text), Some("a"));
        let rest: Vec<_> = view.rest.iter().map(|c| c.text).collect();
        assert_eq!(rest, vec!["b", "c"]);
        assert!(view.rest.iter().all(|c| c.author == STORED_AUTHOR));
        assert_eq!(view.indicator, None);
        assert_eq!(view.input, Some(""));
        assert!(view.bordered && view.raised);
    }

    #[test]
    fn test_hover_transitions() {
        let mut overlay = overlay_at(1);
        assert_eq!(overlay.hover_state(), HoverState::Idle);
        overlay.pointer_enter();
        overlay.pointer_enter();
        assert_eq!(overlay.hover_state(), HoverState::Hovered);
        overlay.pointer_leave();
        assert_eq!(overlay.hover_state(), HoverState::Idle);
    }

    #[test]
    fn test_first_submission_creates_line_and_clears_draft() {
        let mut store = CommentStore::open(Box::new(MemoryStorage::new()));
        let mut overlay = overlay_at(5);
        overlay.pointer_enter();
        for c in "first comment".chars() {
            overlay.push_char(c);
        }

        assert!(matches!(overlay.submit(&mut store), SubmitOutcome::Saved));
        assert_eq!(store.comments_for(5), ["first comment".to_string()]);
        assert_eq!(overlay.draft(), "");

        overlay.pointer_leave();
        let list = store.comments_for(5).to_vec();
        assert_eq!(overlay.view(&list).indicator, None);
    }

    #[test]
    fn test_submission_appends_without_touching_other_lines() {
        let storage = MemoryStorage::new().with_entry(COMMENTS_KEY, r#"{"2":["x"],"5":["a"]}"#);
        let mut store = CommentStore::open(Box::new(storage));
        let mut overlay = overlay_at(5);
        overlay.set_draft("b");

        overlay.submit(&mut store);

        assert_eq!(store.comments_for(5), ["a".to_string(), "b".to_string()]);
        assert_eq!(store.comments_for(2), ["x".to_string()]);
    }

    #[test]
    fn test_empty_draft_is_ignored() {
        let mut store = CommentStore::open(Box::new(MemoryStorage::new()));
        let mut overlay = overlay_at(5);

        assert!(matches!(overlay.submit(&mut store), SubmitOutcome::Ignored));
        assert!(store.map().is_empty());
    }

    #[test]
    fn test_whitespace_only_draft_is_accepted() {
        let mut store = CommentStore::open(Box::new(MemoryStorage::new()));
        let mut overlay = overlay_at(5);
        overlay.set_draft("   ");

        assert!(matches!(overlay.submit(&mut store), SubmitOutcome::Saved));
        assert_eq!(store.comments_for(5), ["   ".to_string()]);
    }

    #[test]
    fn test_failed_persist_keeps_comment_visible() {
        let mut store = CommentStore::open(Box::new(MemoryStorage::new().with_quota(4)));
        let mut overlay = overlay_at(9);
        overlay.set_draft("does not fit");

        let outcome = overlay.submit(&mut store);

        assert!(matches!(outcome, SubmitOutcome::SavedInMemoryOnly(_)));
        assert_eq!(store.comments_for(9), ["does not fit".to_string()]);
        assert_eq!(overlay.draft(), "");
    }

    #[test]
    fn test_submitted_comment_survives_reload() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("storage.json");

        let mut store = CommentStore::open(Box::new(FileStorage::open(&path).unwrap()));
        let mut overlay = overlay_at(5);
        overlay.set_draft("first comment");
        overlay.submit(&mut store);

        let reloaded = load(&FileStorage::open(&path).unwrap()).unwrap();
        assert_eq!(reloaded.get(5), ["first comment".to_string()]);
    }
}
