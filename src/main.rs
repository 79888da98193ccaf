use std::fs::File;
use std::io::stdout;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::{error, info, warn};
use ratatui::{Terminal, backend::CrosstermBackend};
use simplelog::{Config, LevelFilter, WriteLogger};

use marginalia::comments::CommentStore;
use marginalia::event_source::KeyboardEventSource;
use marginalia::export;
use marginalia::notification::Notice;
use marginalia::panic_handler::initialize_panic_handler;
use marginalia::settings::{self, Settings};
use marginalia::source::{FileSource, MarkdownSource};
use marginalia::storage::FileStorage;
use marginalia::{App, run_app_with_event_source};

/// Read a markdown document in the terminal and leave comments in its margin.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Markdown file to open
    file: PathBuf,

    /// Comment storage file, overriding the per-document default
    #[arg(long, value_name = "PATH")]
    storage: Option<PathBuf>,

    /// Settings file, overriding the platform config location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "PATH", default_value = "marginalia.log")]
    log_file: PathBuf,

    /// Log at debug level
    #[arg(long)]
    debug: bool,

    /// Write the document with its comments as a standalone HTML page and exit
    #[arg(long, value_name = "PATH")]
    export_html: Option<PathBuf>,
}

fn storage_path(args: &Args, settings: &Settings) -> Result<PathBuf> {
    if let Some(path) = &args.storage {
        return Ok(path.clone());
    }
    settings
        .storage_path_for(&args.file)
        .context("Could not determine a data directory for comment storage, pass --storage")
}

fn open_store(path: &Path, settings: &Settings) -> Result<(CommentStore, Option<String>)> {
    let (storage, recovered) = FileStorage::open_or_recover(path)
        .with_context(|| format!("Failed to open comment storage {}", path.display()))?;
    let storage = storage.with_quota(Some(settings.storage_quota_bytes));
    info!("Comment storage: {}", storage.path().display());
    Ok((CommentStore::open(Box::new(storage)), recovered))
}

fn export_html(args: &Args, target: &Path, store: &CommentStore) -> Result<()> {
    let source = FileSource::new(&args.file);
    let text = source.fetch()?;
    let title = args
        .file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("document");
    export::export_to_file(target, title, &text, store.map())?;
    println!("Wrote {}", target.display());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    WriteLogger::init(
        if args.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        },
        Config::default(),
        File::create(&args.log_file)
            .with_context(|| format!("Failed to create log file {}", args.log_file.display()))?,
    )?;

    info!("Starting marginalia for {}", args.file.display());

    let settings = settings::load_settings(args.config.as_deref());
    let storage_path = storage_path(&args, &settings)?;
    let (store, recovered) = open_store(&storage_path, &settings)?;

    if let Some(target) = &args.export_html {
        return export_html(&args, target, &store);
    }

    let mut app = App::new(store, settings);
    if let Some(message) = recovered {
        warn!("{message}");
        app.notifications.push(Notice::StoreWarning(message));
    }
    app.load_source(Box::new(FileSource::new(&args.file)))?;

    initialize_panic_handler();

    // Terminal initialization
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app_with_event_source(&mut terminal, &mut app, &mut KeyboardEventSource);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = &res {
        error!("Application error: {err:?}");
    }

    info!("Shutting down marginalia");
    res
}
