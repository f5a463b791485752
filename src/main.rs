//! iReader - bilingual instruction-card reader
//!
//! A terminal app for reading English classroom instructions with Chinese
//! support, looking up words, and practicing with a weighted quiz.

mod annotate;
mod config;
mod dataset;
mod dictionary;
mod models;
mod progress;
mod quiz;
mod storage;
mod ui;

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{info, warn};
use ratatui::prelude::*;

use config::Config;
use dataset::{DataLibrary, FileSource};
use dictionary::{DictionaryProvider, OfflineDictionary, OnlineDictionary};
use models::Subject;
use progress::Progress;
use storage::ProgressStore;
use ui::App;

// ══════════════════════════════════════════════════════════════════════════
// CLI Arguments
// ══════════════════════════════════════════════════════════════════════════

#[derive(Parser, Debug)]
#[command(name = "ireader")]
#[command(author, version, about = "Bilingual instruction-card reader and quiz", long_about = None)]
struct Args {
    /// Directory with per-subject instructions/words/patterns JSON files
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Progress file (word bank, tag statistics, lookup cache)
    #[arg(short, long)]
    state_file: Option<PathBuf>,

    /// Write a backup of settings and progress, then exit
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,

    /// Replace settings and progress with a backup, then exit
    #[arg(short, long, value_name = "FILE")]
    import: Option<PathBuf>,

    /// Never query online dictionaries
    #[arg(long)]
    offline: bool,

    /// Print the annotated HTML for TEXT using SUBJECT's word list, then exit
    #[arg(long, num_args = 2, value_names = ["SUBJECT", "TEXT"])]
    annotate: Option<Vec<String>>,
}

// ══════════════════════════════════════════════════════════════════════════
// Main Entry Point
// ══════════════════════════════════════════════════════════════════════════

fn main() -> Result<()> {
    let args = Args::parse();

    let state_file = args.state_file.unwrap_or_else(ProgressStore::default_path);
    let store = ProgressStore::new(state_file)?;
    init_logging(store.path());

    let config = Config::load().unwrap_or_else(|e| {
        warn!("using default settings: {:#}", e);
        Config::default()
    });

    if let Some(path) = args.export {
        let progress = store.load()?;
        let count = store.export_backup(&path, &config, &progress)?;
        println!("✓ Exported {} words to {}", count, path.display());
        return Ok(());
    }

    if let Some(path) = args.import {
        let backup = store.import_backup(&path, &Config::default_path())?;
        println!(
            "✓ Imported {} words and {} cached lookups",
            backup.progress.word_bank.len(),
            backup.progress.lookup_cache.len()
        );
        return Ok(());
    }

    let mut library = DataLibrary::new(Box::new(FileSource::new(args.data_dir)));

    if let Some(parts) = args.annotate {
        let [subject, text] = parts.as_slice() else {
            return Err(anyhow!("--annotate takes SUBJECT and TEXT"));
        };
        let subject = Subject::from_key(subject)
            .ok_or_else(|| anyhow!("unknown subject {:?}", subject))?;
        let data = library.get(subject);
        println!("{}", annotate::annotate(text, &data.phrase_index).to_html());
        return Ok(());
    }

    let progress = load_progress(&store);
    let provider = dictionary_provider(args.offline);

    // Run TUI
    run_tui(App::new(config, store, progress, library, provider, args.offline))
}

/// Log to a file next to the progress file; the terminal belongs to the UI.
fn init_logging(state_file: &Path) {
    let log_path = state_file.with_file_name("ireader.log");
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) else {
        return;
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
}

/// A corrupt progress file must not keep the app from starting.
fn load_progress(store: &ProgressStore) -> Progress {
    match store.load() {
        Ok(mut progress) => {
            let fixed = progress.normalize_stats();
            if fixed > 0 {
                warn!("clamped {} tag statistics with wrong > seen", fixed);
            }
            info!(
                "loaded progress: {} words, {} cached lookups",
                progress.word_bank.len(),
                progress.lookup_cache.len()
            );
            progress
        }
        Err(e) => {
            warn!("starting with empty progress: {:#}", e);
            Progress::default()
        }
    }
}

fn dictionary_provider(offline: bool) -> Arc<dyn DictionaryProvider> {
    if offline {
        return Arc::new(OfflineDictionary);
    }
    match OnlineDictionary::new() {
        Ok(online) => Arc::new(online),
        Err(e) => {
            warn!("online dictionary unavailable: {}", e);
            Arc::new(OfflineDictionary)
        }
    }
}

fn run_tui(mut app: App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run main loop
    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    // Handle any errors
    if let Err(err) = result {
        eprintln!("Error: {}", err);
        return Err(err);
    }

    Ok(())
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    while app.running {
        terminal.draw(|frame| app.render(frame))?;
        app.handle_events()?;
    }
    Ok(())
}
