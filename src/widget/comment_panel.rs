use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use unicode_width::UnicodeWidthStr;

use crate::overlay::{CommentLine, DRAFT_AUTHOR, OverlayView};
use crate::theme::Base16Palette;

pub const SUBMIT_LABEL: &str = "[Submit]";

/// Rendered body of a comment panel, positions relative to the panel's
/// inner area.
#[derive(Debug, Clone, Default)]
pub struct PanelContent {
    pub lines: Vec<Line<'static>>,
    /// `(column, row)` of the text cursor in the input row.
    pub cursor: Option<(u16, u16)>,
    /// `(column, row, width)` of the submit control.
    pub submit: Option<(u16, u16, u16)>,
}

impl PanelContent {
    pub fn height(&self) -> u16 {
        self.lines.len() as u16
    }
}

pub fn panel_content(view: &OverlayView<'_>, width: u16, palette: &Base16Palette) -> PanelContent {
    let width = usize::from(width.max(1));
    let mut content = PanelContent::default();

    for comment in view.first.iter().chain(view.rest.iter()) {
        content
            .lines
            .extend(comment_lines(comment, width, palette));
    }

    if let Some(indicator) = &view.indicator {
        content.lines.push(Line::from(Span::styled(
            indicator.clone(),
            Style::default()
                .fg(palette.base_03)
                .add_modifier(Modifier::ITALIC),
        )));
    }

    if let Some(draft) = view.input {
        let label = format!("{DRAFT_AUTHOR}: ");
        // room for the label and the cursor cell
        let room = width.saturating_sub(label.width() + 1);
        let shown = tail_to_width(draft, room);
        let row = content.lines.len() as u16;

        content.cursor = Some(((label.width() + shown.width()) as u16, row));
        content.lines.push(Line::from(vec![
            Span::styled(
                label,
                Style::default()
                    .fg(palette.base_0b)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                shown,
                Style::default().fg(palette.base_06).bg(palette.base_01),
            ),
        ]));

        let submit_row = content.lines.len() as u16;
        let submit_col = width.saturating_sub(SUBMIT_LABEL.width());
        content.submit = Some((
            submit_col as u16,
            submit_row,
            SUBMIT_LABEL.width().min(width) as u16,
        ));
        content.lines.push(Line::from(vec![
            Span::raw(" ".repeat(submit_col)),
            Span::styled(
                SUBMIT_LABEL,
                Style::default()
                    .fg(palette.base_00)
                    .bg(palette.base_0d)
                    .add_modifier(Modifier::BOLD),
            ),
        ]));
    }

    content
}

fn comment_lines(
    comment: &CommentLine<'_>,
    width: usize,
    palette: &Base16Palette,
) -> Vec<Line<'static>> {
    let label = format!("{}:", comment.author);
    let label_style = Style::default()
        .fg(palette.base_0e)
        .add_modifier(Modifier::BOLD);
    let text_style = Style::default().fg(palette.base_05);

    textwrap::wrap(&format!("{label} {}", comment.text), width)
        .into_iter()
        .enumerate()
        .map(|(idx, wrapped)| {
            if idx == 0 {
                if let Some(rest) = wrapped.strip_prefix(label.as_str()) {
                    return Line::from(vec![
                        Span::styled(label.clone(), label_style),
                        Span::styled(rest.to_string(), text_style),
                    ]);
                }
            }
            Line::from(Span::styled(wrapped.into_owned(), text_style))
        })
        .collect()
}

/// The longest suffix of `text` that fits in `width` columns.
fn tail_to_width(text: &str, width: usize) -> String {
    let mut used = 0;
    let mut start = text.len();
    for (idx, c) in text.char_indices().rev() {
        let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > width {
            break;
        }
        used += w;
        start = idx;
    }
    text[start..].to_string()
}
