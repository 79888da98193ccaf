//! Status-bar notices about comment storage and document loading.

use std::fmt;
use std::time::{Duration, Instant};

use log::debug;

const INFO_DURATION: Duration = Duration::from_secs(4);
const WARNING_DURATION: Duration = Duration::from_secs(12);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Something the reader should know about that happened outside the
/// document view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Stored comments or the storage file could not be used as they were.
    StoreWarning(String),
    CommentSaved { line: u32 },
    /// The comment is shown but was not written to storage.
    CommentKeptInMemory { line: u32, reason: String },
    DocumentUnavailable { description: String },
}

impl Notice {
    pub fn level(&self) -> NotificationLevel {
        match self {
            Notice::CommentSaved { .. } => NotificationLevel::Info,
            Notice::StoreWarning(_) => NotificationLevel::Warning,
            Notice::CommentKeptInMemory { .. } | Notice::DocumentUnavailable { .. } => {
                NotificationLevel::Error
            }
        }
    }

    /// Errors stay until dismissed.
    fn lifetime(&self) -> Option<Duration> {
        match self.level() {
            NotificationLevel::Info => Some(INFO_DURATION),
            NotificationLevel::Warning => Some(WARNING_DURATION),
            NotificationLevel::Error => None,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::StoreWarning(message) => f.write_str(message),
            Notice::CommentSaved { line } => write!(f, "Comment added to line {line}"),
            Notice::CommentKeptInMemory { line, reason } => write!(
                f,
                "Comment on line {line} kept for this session only: {reason}"
            ),
            Notice::DocumentUnavailable { description } => {
                write!(f, "Failed to load {description}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub notice: Notice,
    expires_at: Option<Instant>,
}

impl Notification {
    fn new(notice: Notice, now: Instant) -> Self {
        let expires_at = notice.lifetime().map(|lifetime| now + lifetime);
        Self { notice, expires_at }
    }

    pub fn level(&self) -> NotificationLevel {
        self.notice.level()
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Pending notices, newest first. Pushing a notice equal to a pending one
/// moves it to the front instead of stacking a duplicate.
#[derive(Debug, Default)]
pub struct NotificationManager {
    pending: Vec<Notification>,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notice: Notice) {
        self.push_at(notice, Instant::now());
    }

    fn push_at(&mut self, notice: Notice, now: Instant) {
        debug!("Notice: {notice}");
        self.pending.retain(|pending| pending.notice != notice);
        self.pending.insert(0, Notification::new(notice, now));
    }

    /// Drops expired notices, returns true if any were removed.
    pub fn update(&mut self) -> bool {
        self.expire_at(Instant::now())
    }

    fn expire_at(&mut self, now: Instant) -> bool {
        let before = self.pending.len();
        self.pending.retain(|n| !n.is_expired(now));
        self.pending.len() != before
    }

    pub fn current(&self) -> Option<&Notification> {
        self.pending.first()
    }

    /// Notices waiting behind the current one.
    pub fn queued(&self) -> usize {
        self.pending.len().saturating_sub(1)
    }

    pub fn dismiss_current(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.pending.remove(0);
        true
    }
}
