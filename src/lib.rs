// Export modules for use in tests
pub mod annotate;
pub mod app;
pub mod comments;
pub mod document;
pub mod event_source;
pub mod export;
pub mod layout;
pub mod notification;
pub mod overlay;
pub mod panic_handler;
pub mod parsing;
pub mod settings;
pub mod source;
pub mod storage;
pub mod theme;
pub mod widget;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use app::{App, AppAction, ContentState, run_app_with_event_source};
