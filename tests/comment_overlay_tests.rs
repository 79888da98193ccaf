use std::time::{Duration, Instant};

use marginalia::comments::{COMMENTS_KEY, CommentStore, load};
use marginalia::event_source::{KeyCode, KeyModifiers, SimulatedEventSource};
use marginalia::settings::Settings;
use marginalia::source::FileSource;
use marginalia::storage::{FileStorage, MemoryStorage};
use marginalia::test_utils::test_helpers::{
    TestScenarioBuilder, capture_terminal_state, create_test_terminal, find_text,
};
use marginalia::{App, ContentState, run_app_with_event_source};
use tempfile::TempDir;

// Laid out rows: 0 "# TITLE", 2 "Intro text.", 4 "Target paragraph."
const DOC: &str = "# Title\n\nIntro text.\n\nTarget paragraph.\n";

fn app_with_storage(storage: MemoryStorage) -> App {
    let mut app = App::new(CommentStore::open(Box::new(storage)), Settings::default());
    app.set_markdown(DOC);
    app
}

#[test]
fn test_first_comment_is_persisted_and_shown() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("comments.json");
    let store = CommentStore::open(Box::new(FileStorage::open(&path).unwrap()));
    let mut app = App::new(store, Settings::default());
    app.set_markdown(DOC);

    let mut terminal = create_test_terminal(100, 20);
    let mut events = TestScenarioBuilder::new()
        .mouse_move(3, 4)
        .type_text("first comment")
        .press_enter()
        .quit()
        .build();

    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    assert_eq!(app.hovered_line(), Some(5));
    assert_eq!(app.overlay(5).unwrap().draft(), "");

    let stored = load(&FileStorage::open(&path).unwrap()).unwrap();
    assert_eq!(stored.get(5), ["first comment".to_string()]);
    assert!(stored.get(3).is_empty());

    let screen = capture_terminal_state(&terminal);
    assert!(screen.contains("User: first comment"));
    assert!(screen.contains("[Submit]"));
}

#[test]
fn test_single_stored_comment_has_no_count() {
    let mut app = app_with_storage(MemoryStorage::new().with_entry(COMMENTS_KEY, r#"{"5":["a"]}"#));
    let mut terminal = create_test_terminal(100, 20);
    terminal.draw(|f| app.draw(f)).unwrap();

    let screen = capture_terminal_state(&terminal);
    assert!(screen.contains("User: a"));
    assert!(!screen.contains("+1"));
    assert!(!screen.contains("Me:"));
}

#[test]
fn test_hover_reveals_all_comments() {
    let mut app = app_with_storage(
        MemoryStorage::new().with_entry(COMMENTS_KEY, r#"{"3":["a","b","c"]}"#),
    );
    let mut terminal = create_test_terminal(100, 20);
    terminal.draw(|f| app.draw(f)).unwrap();

    let idle = capture_terminal_state(&terminal);
    assert!(idle.contains("User: a"));
    assert!(idle.contains("+2"));
    assert!(!idle.contains("User: b"));

    app.handle_event(SimulatedEventSource::mouse_move(3, 2));
    terminal.draw(|f| app.draw(f)).unwrap();

    let hovered = capture_terminal_state(&terminal);
    assert!(hovered.contains("User: b"));
    assert!(hovered.contains("User: c"));
    assert!(!hovered.contains("+2"));
    assert!(hovered.contains("Me:"));

    // leaving both the block and its panel collapses it again
    app.handle_event(SimulatedEventSource::mouse_move(3, 15));
    terminal.draw(|f| app.draw(f)).unwrap();
    assert_eq!(app.hovered_line(), None);
    assert!(capture_terminal_state(&terminal).contains("+2"));
}

#[test]
fn test_unanchored_heading_is_not_hoverable() {
    let mut app = app_with_storage(MemoryStorage::new());
    let mut terminal = create_test_terminal(100, 20);
    let mut events = TestScenarioBuilder::new().mouse_move(2, 0).quit().build();

    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    assert_eq!(app.hovered_line(), None);
    assert!(app.overlay(1).is_none());
}

#[test]
fn test_keyboard_navigation_keeps_drafts_per_block() {
    let mut app = app_with_storage(MemoryStorage::new());
    let mut terminal = create_test_terminal(100, 20);
    let mut events = TestScenarioBuilder::new()
        .press_tab()
        .type_text("hi")
        .press_tab()
        .type_text("there")
        .press_backtab()
        .press_enter()
        .quit()
        .build();

    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    assert_eq!(app.store().comments_for(3), ["hi".to_string()]);
    assert!(app.store().comments_for(5).is_empty());
    assert_eq!(app.overlay(5).unwrap().draft(), "there");
}

#[test]
fn test_empty_submission_is_ignored() {
    let mut app = app_with_storage(MemoryStorage::new());
    let mut terminal = create_test_terminal(100, 20);
    let mut events = TestScenarioBuilder::new()
        .press_tab()
        .press_enter()
        .type_text("x")
        .press_backspace()
        .press_enter()
        .quit()
        .build();

    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    assert!(app.store().map().is_empty());
}

#[test]
fn test_submit_button_click() {
    let mut app = app_with_storage(MemoryStorage::new());
    let mut terminal = create_test_terminal(100, 20);
    terminal.draw(|f| app.draw(f)).unwrap();
    app.handle_event(SimulatedEventSource::mouse_move(3, 4));
    for c in "clicked".chars() {
        app.handle_event(SimulatedEventSource::char_key(c));
    }
    terminal.draw(|f| app.draw(f)).unwrap();

    let (column, row) = find_text(&terminal, "[Submit]").unwrap();
    app.handle_event(SimulatedEventSource::mouse_click(
        column + 1,
        row,
    ));

    assert_eq!(app.store().comments_for(5), ["clicked".to_string()]);
}

#[test]
fn test_failed_write_keeps_comment_for_session() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("comments.json");
    let storage = FileStorage::open(&path).unwrap().with_quota(Some(8));
    let mut app = App::new(CommentStore::open(Box::new(storage)), Settings::default());
    app.set_markdown(DOC);

    let mut terminal = create_test_terminal(100, 20);
    let mut events = TestScenarioBuilder::new()
        .mouse_move(3, 2)
        .type_text("too long to fit")
        .press_enter()
        .quit()
        .build();

    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    assert_eq!(app.store().comments_for(3), ["too long to fit".to_string()]);
    assert!(!path.exists());

    let screen = capture_terminal_state(&terminal);
    assert!(screen.contains("User: too long to fit"));
    assert!(screen.contains("[ERROR] Comment on line 3 kept for this session only"));
}

#[test]
fn test_corrupt_stored_value_starts_empty_with_warning() {
    let mut app = app_with_storage(MemoryStorage::new().with_entry(COMMENTS_KEY, "not json"));
    let mut terminal = create_test_terminal(100, 20);
    terminal.draw(|f| app.draw(f)).unwrap();

    assert!(app.store().map().is_empty());
    assert!(capture_terminal_state(&terminal).contains("[WARNING] Stored comments ignored"));
}

#[test]
fn test_missing_document_shows_failure() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = App::new(
        CommentStore::open(Box::new(MemoryStorage::new())),
        Settings::default(),
    );
    app.load_source(Box::new(FileSource::new(temp_dir.path().join("missing.md"))))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while matches!(app.content(), ContentState::Loading(_)) && Instant::now() < deadline {
        app.poll_source();
        std::thread::sleep(Duration::from_millis(10));
    }

    let mut terminal = create_test_terminal(100, 20);
    terminal.draw(|f| app.draw(f)).unwrap();

    assert!(matches!(app.content(), ContentState::Failed(_)));
    assert!(capture_terminal_state(&terminal).contains("Failed to load"));
}

#[test]
fn test_loaded_document_replaces_loading_message() {
    let temp_dir = TempDir::new().unwrap();
    let doc_path = temp_dir.path().join("doc.md");
    std::fs::write(&doc_path, DOC).unwrap();

    let mut app = App::new(
        CommentStore::open(Box::new(MemoryStorage::new())),
        Settings::default(),
    );
    app.load_source(Box::new(FileSource::new(&doc_path))).unwrap();

    let mut terminal = create_test_terminal(100, 20);
    terminal.draw(|f| app.draw(f)).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !app.poll_source() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    terminal.draw(|f| app.draw(f)).unwrap();

    let screen = capture_terminal_state(&terminal);
    assert!(screen.contains("Target paragraph."));
    assert!(!screen.contains("Loading"));
}

#[test]
fn test_indented_list_item_is_not_hoverable() {
    let mut app = App::new(
        CommentStore::open(Box::new(MemoryStorage::new())),
        Settings::default(),
    );
    // rows: 0 "• top", 1 "• one space"
    app.set_markdown("- top\n - one space\n");
    let mut terminal = create_test_terminal(100, 20);
    terminal.draw(|f| app.draw(f)).unwrap();

    app.handle_event(SimulatedEventSource::mouse_move(3, 1));
    assert_eq!(app.hovered_line(), None);
    assert!(app.overlay(2).is_none());

    app.handle_event(SimulatedEventSource::mouse_move(3, 0));
    assert_eq!(app.hovered_line(), Some(1));
}

#[test]
fn test_persistence_error_stays_until_dismissed() {
    let storage = MemoryStorage::new().with_quota(4);
    let mut app = app_with_storage(storage);
    let mut terminal = create_test_terminal(100, 20);
    let mut events = TestScenarioBuilder::new()
        .press_tab()
        .type_text("kept")
        .press_enter()
        .press_esc()
        .quit()
        .build();

    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    // leaving the block does not clear the error
    assert_eq!(app.hovered_line(), None);
    assert!(capture_terminal_state(&terminal).contains("[ERROR] Comment on line 3"));

    app.handle_event(SimulatedEventSource::key_event(
        KeyCode::Esc,
        KeyModifiers::empty(),
    ));
    terminal.draw(|f| app.draw(f)).unwrap();
    let screen = capture_terminal_state(&terminal);
    assert!(!screen.contains("[ERROR]"));
    assert!(screen.contains("q: Quit"));
}
