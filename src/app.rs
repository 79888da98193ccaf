use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use log::{debug, error, info};
use ratatui::{
    Frame, Terminal,
    backend::Backend,
    layout::{Alignment, Constraint, Layout, Position, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Padding, Paragraph, Wrap},
};

use crate::comments::CommentStore;
use crate::document::Document;
use crate::event_source::EventSource;
use crate::layout::{self, VisualBlock};
use crate::notification::{Notice, NotificationLevel, NotificationManager};
use crate::overlay::{CommentOverlay, SubmitOutcome};
use crate::parsing::parse_markdown;
use crate::settings::Settings;
use crate::source::{MarkdownSource, SourceLoader};
use crate::theme::{Base16Palette, ThemeId};
use crate::widget::comment_panel;

const SCROLL_STEP: isize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    Quit,
}

pub enum ContentState {
    Empty,
    Loading(SourceLoader),
    Ready(Document),
    Failed(String),
}

/// Block layout for one text width, with each block's top row in document
/// coordinates.
struct LayoutCache {
    width: u16,
    blocks: Vec<VisualBlock>,
    tops: Vec<usize>,
    height: usize,
}

impl LayoutCache {
    fn build(doc: &Document, width: u16, palette: &Base16Palette) -> Self {
        let blocks = layout::layout_document(doc, width, palette);
        let mut tops = Vec::with_capacity(blocks.len());
        let mut y = 0;
        for block in &blocks {
            tops.push(y);
            y += block.height() + usize::from(block.gap_after);
        }
        debug!("Laid out {} blocks at width {width}, {y} rows", blocks.len());
        Self {
            width,
            blocks,
            tops,
            height: y,
        }
    }

    fn top_of(&self, line: u32) -> Option<usize> {
        self.blocks
            .iter()
            .position(|block| block.anchor.map(|a| a.line()) == Some(line))
            .map(|idx| self.tops[idx])
    }
}

/// Screen region belonging to one anchored block: the block itself or its
/// comment panel.
#[derive(Debug, Clone, Copy)]
struct HitArea {
    line: u32,
    rect: Rect,
    submit: Option<Rect>,
}

pub struct App {
    store: CommentStore,
    settings: Settings,
    palette: &'static Base16Palette,
    content: ContentState,
    overlays: BTreeMap<u32, CommentOverlay>,
    hovered: Option<u32>,
    scroll_offset: usize,
    viewport_height: usize,
    layout: Option<LayoutCache>,
    hit_areas: Vec<HitArea>,
    pub notifications: NotificationManager,
}

impl App {
    pub fn new(store: CommentStore, settings: Settings) -> Self {
        let theme = ThemeId::from_name(&settings.theme).unwrap_or_else(|| {
            info!("Unknown theme {:?}, using Oceanic Next", settings.theme);
            ThemeId::OceanicNext
        });
        debug!("Using theme {}", theme.name());

        let mut notifications = NotificationManager::new();
        if let Some(warning) = store.load_warning() {
            notifications.push(Notice::StoreWarning(warning.to_string()));
        }

        Self {
            store,
            settings: settings.sanitized(),
            palette: theme.palette(),
            content: ContentState::Empty,
            overlays: BTreeMap::new(),
            hovered: None,
            scroll_offset: 0,
            viewport_height: 0,
            layout: None,
            hit_areas: Vec::new(),
            notifications,
        }
    }

    /// Starts fetching the document in the background; the view shows a
    /// loading message until [`App::poll_source`] picks up the result.
    pub fn load_source(&mut self, source: Box<dyn MarkdownSource>) -> Result<()> {
        let loader = SourceLoader::spawn(source)?;
        info!("Loading {}", loader.description());
        self.content = ContentState::Loading(loader);
        Ok(())
    }

    pub fn set_markdown(&mut self, text: &str) {
        let document = parse_markdown(text);
        self.overlays = layout::collect_anchors(&document)
            .into_iter()
            .map(|anchor| (anchor.line(), CommentOverlay::new(anchor)))
            .collect();
        info!(
            "Document ready: {} blocks, {} commentable",
            document.blocks.len(),
            self.overlays.len()
        );

        self.hovered = None;
        self.layout = None;
        self.scroll_offset = 0;
        self.content = ContentState::Ready(document);
    }

    /// Returns true when the content state changed.
    pub fn poll_source(&mut self) -> bool {
        let ContentState::Loading(loader) = &self.content else {
            return false;
        };
        let Some(result) = loader.try_recv() else {
            return false;
        };
        let description = loader.description().to_string();

        match result {
            Ok(text) => self.set_markdown(&text),
            Err(message) => {
                error!("Failed to load {description}: {message}");
                self.notifications.push(Notice::DocumentUnavailable {
                    description: description.clone(),
                });
                self.content = ContentState::Failed(format!("Failed to load {description}: {message}"));
            }
        }
        true
    }

    pub fn content(&self) -> &ContentState {
        &self.content
    }

    pub fn store(&self) -> &CommentStore {
        &self.store
    }

    pub fn overlay(&self, line: u32) -> Option<&CommentOverlay> {
        self.overlays.get(&line)
    }

    pub fn hovered_line(&self) -> Option<u32> {
        self.hovered
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn handle_event(&mut self, event: Event) -> Option<AppAction> {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
            Event::Mouse(mouse) => {
                self.handle_mouse(mouse);
                None
            }
            Event::Resize(width, height) => {
                debug!("Resized to {width}x{height}");
                self.layout = None;
                None
            }
            _ => None,
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Option<AppAction> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(AppAction::Quit);
        }

        if let Some(line) = self.hovered {
            match key.code {
                KeyCode::Esc => self.set_hover(None),
                KeyCode::Enter => self.submit(line),
                KeyCode::Backspace => {
                    if let Some(overlay) = self.overlays.get_mut(&line) {
                        overlay.pop_char();
                    }
                }
                KeyCode::Tab => self.hover_next(),
                KeyCode::BackTab => self.hover_prev(),
                KeyCode::Up => self.scroll_by(-1),
                KeyCode::Down => self.scroll_by(1),
                KeyCode::PageUp => self.scroll_by(-self.page()),
                KeyCode::PageDown => self.scroll_by(self.page()),
                KeyCode::Char(c)
                    if !key
                        .modifiers
                        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
                {
                    if let Some(overlay) = self.overlays.get_mut(&line) {
                        overlay.push_char(c);
                    }
                }
                _ => {}
            }
            return None;
        }

        match key.code {
            KeyCode::Char('q') => return Some(AppAction::Quit),
            KeyCode::Char('j') | KeyCode::Down => self.scroll_by(1),
            KeyCode::Char('k') | KeyCode::Up => self.scroll_by(-1),
            KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.scroll_by(self.page() / 2)
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.scroll_by(-self.page() / 2)
            }
            KeyCode::PageDown => self.scroll_by(self.page()),
            KeyCode::PageUp => self.scroll_by(-self.page()),
            KeyCode::Char('g') | KeyCode::Home => self.scroll_offset = 0,
            KeyCode::Char('G') | KeyCode::End => self.scroll_by(isize::MAX / 2),
            KeyCode::Tab => self.hover_next(),
            KeyCode::BackTab => self.hover_prev(),
            KeyCode::Esc => {
                self.notifications.dismiss_current();
            }
            _ => {}
        }
        None
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        let (column, row) = (mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Moved | MouseEventKind::Drag(_) => {
                let target = self.line_at(column, row);
                self.set_hover(target);
            }
            MouseEventKind::Down(MouseButton::Left) => match self.submit_at(column, row) {
                Some(line) => self.submit(line),
                None => {
                    let target = self.line_at(column, row);
                    self.set_hover(target);
                }
            },
            MouseEventKind::ScrollDown => self.scroll_by(SCROLL_STEP),
            MouseEventKind::ScrollUp => self.scroll_by(-SCROLL_STEP),
            _ => {}
        }
    }

    fn line_at(&self, column: u16, row: u16) -> Option<u32> {
        let position = Position::new(column, row);
        // panels are recorded after blocks and the raised one last
        self.hit_areas
            .iter()
            .rev()
            .find(|area| area.rect.contains(position))
            .map(|area| area.line)
    }

    fn submit_at(&self, column: u16, row: u16) -> Option<u32> {
        let position = Position::new(column, row);
        self.hit_areas
            .iter()
            .rev()
            .find(|area| area.submit.is_some_and(|rect| rect.contains(position)))
            .map(|area| area.line)
    }

    fn set_hover(&mut self, target: Option<u32>) {
        let target = target.filter(|line| self.overlays.contains_key(line));
        if target == self.hovered {
            return;
        }
        if let Some(previous) = self.hovered.and_then(|line| self.overlays.get_mut(&line)) {
            previous.pointer_leave();
        }
        if let Some(next) = target.and_then(|line| self.overlays.get_mut(&line)) {
            next.pointer_enter();
        }
        self.hovered = target;
    }

    fn hover_next(&mut self) {
        let next = match self.hovered {
            Some(line) => self
                .overlays
                .range((Excluded(line), Unbounded))
                .next()
                .map(|(line, _)| *line),
            None => None,
        }
        .or_else(|| self.overlays.keys().next().copied());
        self.hover_with_keyboard(next);
    }

    fn hover_prev(&mut self) {
        let prev = match self.hovered {
            Some(line) => self
                .overlays
                .range(..line)
                .next_back()
                .map(|(line, _)| *line),
            None => None,
        }
        .or_else(|| self.overlays.keys().next_back().copied());
        self.hover_with_keyboard(prev);
    }

    fn hover_with_keyboard(&mut self, target: Option<u32>) {
        self.set_hover(target);
        let Some(line) = target else { return };
        let Some(top) = self.layout.as_ref().and_then(|cache| cache.top_of(line)) else {
            return;
        };
        if top < self.scroll_offset || top >= self.scroll_offset + self.viewport_height {
            self.scroll_offset = top;
            self.clamp_scroll();
        }
    }

    fn submit(&mut self, line: u32) {
        let Some(overlay) = self.overlays.get_mut(&line) else {
            return;
        };
        match overlay.submit(&mut self.store) {
            SubmitOutcome::Ignored => debug!("Empty comment on line {line} ignored"),
            SubmitOutcome::Saved => self.notifications.push(Notice::CommentSaved { line }),
            SubmitOutcome::SavedInMemoryOnly(e) => {
                self.notifications.push(Notice::CommentKeptInMemory {
                    line,
                    reason: e.to_string(),
                })
            }
        }
    }

    fn page(&self) -> isize {
        self.viewport_height.max(2) as isize - 1
    }

    fn scroll_by(&mut self, delta: isize) {
        self.scroll_offset = self.scroll_offset.saturating_add_signed(delta);
        self.clamp_scroll();
    }

    fn clamp_scroll(&mut self) {
        let height = self.layout.as_ref().map_or(0, |cache| cache.height);
        self.scroll_offset = self
            .scroll_offset
            .min(height.saturating_sub(self.viewport_height));
    }

    /// Block column on the left, panel column flush right.
    fn columns(&self, area: Rect) -> (Rect, Rect) {
        let share = |percent: u16| (u32::from(area.width) * u32::from(percent) / 100) as u16;
        let block_width = share(self.settings.block_width_percent);
        let panel_width = share(self.settings.panel_width_percent);
        (
            Rect::new(area.x, area.y, block_width, area.height),
            Rect::new(
                area.x + area.width - panel_width,
                area.y,
                panel_width,
                area.height,
            ),
        )
    }

    pub fn draw(&mut self, f: &mut Frame) {
        let [content_area, status_area] =
            Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(f.area());
        f.render_widget(
            Block::default().style(Style::default().bg(self.palette.base_00)),
            f.area(),
        );

        let message = match &self.content {
            ContentState::Empty => Some(("No document loaded".to_string(), self.palette.base_03)),
            ContentState::Loading(loader) => Some((
                format!("Loading {}...", loader.description()),
                self.palette.base_04,
            )),
            ContentState::Failed(message) => Some((message.clone(), self.palette.base_08)),
            ContentState::Ready(_) => None,
        };

        self.hit_areas.clear();
        match message {
            Some((text, color)) => draw_message(f, content_area, text, color),
            None => self.draw_document(f, content_area),
        }
        self.draw_status_bar(f, status_area);
    }

    fn draw_document(&mut self, f: &mut Frame, area: Rect) {
        let (block_column, panel_column) = self.columns(area);
        let text_width = block_column.width.saturating_sub(1).max(1);

        let ContentState::Ready(document) = &self.content else {
            return;
        };
        if self.layout.as_ref().map(|cache| cache.width) != Some(text_width) {
            self.layout = Some(LayoutCache::build(document, text_width, self.palette));
        }
        self.viewport_height = usize::from(area.height);
        self.clamp_scroll();

        let Some(cache) = self.layout.as_ref() else {
            return;
        };
        let palette = self.palette;
        let (scroll, viewport) = (self.scroll_offset, self.viewport_height);

        let mut hit_areas = Vec::new();
        let mut panels = Vec::new();
        for (block, &top) in cache.blocks.iter().zip(&cache.tops) {
            let Some((screen_y, skip, visible)) = clip(top, block.height(), scroll, viewport) else {
                continue;
            };
            let rect = Rect::new(block_column.x, area.y + screen_y, text_width, visible);
            let line = block.anchor.map(|anchor| anchor.line());
            let hovered = line.is_some() && line == self.hovered;

            let paragraph = if hovered {
                Paragraph::new(highlight(&block.lines, palette))
                    .style(Style::default().bg(palette.hover_bg).fg(palette.hover_fg))
            } else {
                Paragraph::new(block.lines.clone())
            };
            f.render_widget(paragraph.scroll((skip, 0)), rect);

            if let Some(line) = line {
                hit_areas.push(HitArea {
                    line,
                    rect: Rect {
                        width: block_column.width,
                        ..rect
                    },
                    submit: None,
                });
                // a panel hangs off its block's first row
                if skip == 0 {
                    panels.push((line, rect.y));
                }
            }
        }

        panels.sort_by_key(|(line, _)| Some(*line) == self.hovered);
        let bottom = area.y + area.height;
        let mut cursor = None;

        for (line, y) in panels {
            let Some(overlay) = self.overlays.get(&line) else {
                continue;
            };
            let view = overlay.view(self.store.comments_for(line));
            if view.is_empty() {
                continue;
            }

            let content =
                comment_panel::panel_content(&view, panel_column.width.saturating_sub(2), palette);
            let rect = Rect::new(
                panel_column.x,
                y,
                panel_column.width,
                (content.height() + 2).min(bottom - y),
            );

            let frame_block = if view.bordered {
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(palette.base_0d))
                    .title(format!(" line {line} "))
            } else {
                Block::default().padding(Padding::uniform(1))
            };
            let frame_block = frame_block.style(Style::default().bg(if view.raised {
                palette.base_01
            } else {
                palette.base_00
            }));
            let inner = frame_block.inner(rect);

            f.render_widget(Clear, rect);
            f.render_widget(Paragraph::new(content.lines.clone()).block(frame_block), rect);

            let submit = content.submit.and_then(|(column, row, width)| {
                (row < inner.height).then(|| Rect::new(inner.x + column, inner.y + row, width, 1))
            });
            if view.raised {
                cursor = content
                    .cursor
                    .filter(|(_, row)| *row < inner.height)
                    .map(|(column, row)| Position::new(inner.x + column, inner.y + row));
            }
            hit_areas.push(HitArea { line, rect, submit });
        }

        if let Some(position) = cursor {
            f.set_cursor_position(position);
        }
        self.hit_areas = hit_areas;
    }

    fn draw_status_bar(&self, f: &mut Frame, area: Rect) {
        let palette = self.palette;
        let (text, color) = if let Some(notification) = self.notifications.current() {
            let (label, color) = match notification.level() {
                NotificationLevel::Info => ("INFO", palette.base_0d),
                NotificationLevel::Warning => ("WARNING", palette.base_0a),
                NotificationLevel::Error => ("ERROR", palette.base_08),
            };
            let mut text = format!("[{label}] {}", notification.notice);
            match self.notifications.queued() {
                0 => {}
                queued => text.push_str(&format!(" (+{queued} more, Esc to dismiss)")),
            }
            (text, color)
        } else if self.hovered.is_some() {
            (
                "Type: Comment | Enter: Submit | Tab/Shift+Tab: Next/Prev block | ESC: Leave"
                    .to_string(),
                palette.base_03,
            )
        } else {
            (
                "j/k: Scroll | Mouse/Tab: Select block | g/G: Top/Bottom | q: Quit".to_string(),
                palette.base_03,
            )
        };

        f.render_widget(
            Paragraph::new(text).style(Style::default().fg(color).bg(palette.base_01)),
            area,
        );
    }
}

fn draw_message(f: &mut Frame, area: Rect, text: String, color: Color) {
    let [_, middle, _] = Layout::vertical([
        Constraint::Percentage(45),
        Constraint::Min(1),
        Constraint::Percentage(45),
    ])
    .areas(area);
    f.render_widget(
        Paragraph::new(text)
            .style(Style::default().fg(color))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true }),
        middle,
    );
}

fn highlight(lines: &[Line<'static>], palette: &Base16Palette) -> Vec<Line<'static>> {
    lines
        .iter()
        .map(|line| {
            Line::from(
                line.spans
                    .iter()
                    .map(|span| {
                        Span::styled(
                            span.content.clone(),
                            span.style
                                .fg(palette.hover_fg)
                                .bg(palette.hover_bg)
                                .remove_modifier(Modifier::DIM),
                        )
                    })
                    .collect::<Vec<_>>(),
            )
        })
        .collect()
}

/// Part of `[top, top + height)` inside the viewport, as
/// `(screen row, rows skipped, rows visible)`.
fn clip(top: usize, height: usize, scroll: usize, viewport: usize) -> Option<(u16, u16, u16)> {
    let bottom = top + height;
    let view_bottom = scroll + viewport;
    if height == 0 || bottom <= scroll || top >= view_bottom {
        return None;
    }
    let skip = scroll.saturating_sub(top);
    let screen_y = top.saturating_sub(scroll);
    let visible = bottom.min(view_bottom) - top.max(scroll);
    Some((screen_y as u16, skip as u16, visible as u16))
}

/// Drives the app until it asks to quit. Events are handled one at a time
/// and followed by a redraw so pointer hit-testing always matches the frame
/// on screen.
pub fn run_app_with_event_source<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    event_source: &mut dyn EventSource,
) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    let tick_rate = Duration::from_millis(50);
    let mut last_tick = Instant::now();
    let mut needs_redraw = true;

    loop {
        if app.poll_source() {
            needs_redraw = true;
        }
        if last_tick.elapsed() >= tick_rate {
            if app.notifications.update() {
                needs_redraw = true;
            }
            last_tick = Instant::now();
        }

        if needs_redraw {
            terminal.draw(|f| app.draw(f))?;
            needs_redraw = false;
        }

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event_source.poll(timeout)? {
            let event = event_source.read()?;
            if app.handle_event(event) == Some(AppAction::Quit) {
                info!("Quit requested");
                return Ok(());
            }
            needs_redraw = true;
        }
    }
}
