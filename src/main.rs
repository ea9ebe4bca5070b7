mod app;
mod buffer;
mod config;
mod error;
mod git;
mod logging;
mod repos;
mod section;
mod ui;
mod watch;

use anyhow::{Context, Result};
use app::App;
use buffer::BufferKind;
use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use git::Git;
use logging::LogTarget;
use ratatui::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use watch::{FileWatcher, WatchEvent};

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

/// Collapsible, incrementally refreshed views of a git repository
#[derive(Parser)]
#[command(name = "stratum", version, about, args_conflicts_with_subcommands = true)]
struct Cli {
    /// Repository to open (defaults to the current directory)
    path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Open the branch manager view
    Refs {
        path: Option<PathBuf>,
    },
    /// Build a view once and print its visible text
    Print {
        /// Print the refs view instead of status
        #[arg(long)]
        refs: bool,
        path: Option<PathBuf>,
    },
    /// List repositories under the configured (or given) roots
    Repos {
        /// Maximum directory depth below each root
        #[arg(long)]
        depth: Option<usize>,
        /// Emit JSON instead of aligned rows
        #[arg(long)]
        json: bool,
        roots: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => interactive(cli.path, BufferKind::Status),
        Some(Command::Refs { path }) => interactive(path, BufferKind::Refs),
        Some(Command::Print { refs, path }) => {
            let view = if refs { BufferKind::Refs } else { BufferKind::Status };
            print_view(path, view)
        }
        Some(Command::Repos { depth, json, roots }) => list_repos(depth, json, roots),
    }
}

/// Locate the repository and load its layered configuration
fn open(path: Option<PathBuf>, target: LogTarget) -> Result<(Git, config::StratumConfig)> {
    let dir = path.unwrap_or_else(|| PathBuf::from("."));
    let git = Git::discover(&dir)?;
    let config = config::load_config(Some(git.root()));
    logging::init(&config.log, target)?;
    info!(root = %git.root().display(), "opened repository");
    Ok((git, config))
}

fn print_view(path: Option<PathBuf>, view: BufferKind) -> Result<()> {
    let (git, config) = open(path, LogTarget::Stderr)?;
    let mut app = App::new(git, config, view);
    app.refresh()?;
    print!("{}", app.buffer().render_visible());
    for diagnostic in app.buffer().diagnostics() {
        warn!(%diagnostic, "while building {}", view.label());
    }
    Ok(())
}

fn list_repos(depth: Option<usize>, json: bool, roots: Vec<PathBuf>) -> Result<()> {
    let config = config::load_config(None);
    logging::init(&config.log, LogTarget::Stderr)?;

    let roots = if roots.is_empty() {
        config.repos.root_paths()
    } else {
        roots
    };
    if roots.is_empty() {
        anyhow::bail!("No roots given and [repos] roots is empty");
    }
    let options = repos::ScanOptions::new(depth.unwrap_or(config.repos.depth), &config.repos.ignore);
    let (entries, errors) = repos::list_repositories(&roots, &options, &repos::LocalFs);
    for err in &errors {
        warn!(error = %err, "scan error");
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("Failed to serialize repositories")?
        );
        return Ok(());
    }
    let width = entries.iter().map(|e| e.name.chars().count()).max().unwrap_or(0);
    for entry in &entries {
        println!("{:<width$}  {}", entry.name, entry.path.display(), width = width);
    }
    Ok(())
}

fn interactive(path: Option<PathBuf>, view: BufferKind) -> Result<()> {
    let (git, config) = open(path, LogTarget::File)?;
    let mut app = App::new(git, config, view);
    app.refresh()?;

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app);

    // Cleanup
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = result {
        eprintln!("Error: {:?}", err);
    }
    Ok(())
}

fn start_watcher(app: &App, tx: &mpsc::Sender<WatchEvent>) -> Result<FileWatcher> {
    FileWatcher::new(&app.repo_root, app.config.watch.debounce_ms, tx.clone())
}

fn run_app(terminal: &mut Tui, app: &mut App) -> Result<()> {
    let (watch_tx, watch_rx) = mpsc::channel::<WatchEvent>();

    // Debounce state for watcher-triggered refreshes
    let mut pending_refresh = false;
    let mut refresh_deadline = Instant::now();
    let mut pending_file_count = 0usize;

    let mut watcher: Option<FileWatcher> = None;
    if app.watching {
        match start_watcher(app, &watch_tx) {
            Ok(w) => watcher = Some(w),
            Err(e) => {
                warn!(error = %e, "cannot watch repository");
                app.watching = false;
            }
        }
    }

    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                handle_key(terminal, app, key, &watch_tx, &mut watcher)?;
            }
        }

        if let Ok(WatchEvent::Changed(paths)) = watch_rx.try_recv() {
            pending_file_count += paths.len();
            pending_refresh = true;
            refresh_deadline = Instant::now() + Duration::from_millis(200);
        }

        if pending_refresh && Instant::now() >= refresh_deadline {
            pending_refresh = false;
            let count = pending_file_count;
            pending_file_count = 0;
            app.refresh()?;
            app.notify(&format!(
                "{} file{} changed",
                count,
                if count == 1 { "" } else { "s" }
            ));
        }

        app.poll_async()?;
        app.tick();

        if app.should_quit {
            return Ok(());
        }
    }
}

fn handle_key(
    terminal: &mut Tui,
    app: &mut App,
    key: KeyEvent,
    watch_tx: &mpsc::Sender<WatchEvent>,
    watcher: &mut Option<FileWatcher>,
) -> Result<()> {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => app.should_quit = true,

        KeyCode::Char('j') | KeyCode::Down => app.move_cursor(1),
        KeyCode::Char('k') | KeyCode::Up => app.move_cursor(-1),
        KeyCode::PageDown => app.move_cursor(20),
        KeyCode::PageUp => app.move_cursor(-20),
        KeyCode::Home => app.move_to_top(),
        KeyCode::End => app.move_to_bottom(),

        KeyCode::Tab => app.toggle_at_point()?,
        KeyCode::Char('g') => {
            app.refresh()?;
            app.notify("Refreshed");
        }
        KeyCode::Char('1') => app.switch_view(BufferKind::Status)?,
        KeyCode::Char('2') => app.switch_view(BufferKind::Refs)?,

        KeyCode::Enter => {
            if let Some(visit) = app.visit() {
                open_editor(terminal, app, &visit)?;
            }
        }
        KeyCode::Char('a') => app.apply_stash_at_point(false)?,
        KeyCode::Char('A') => app.apply_stash_at_point(true)?,
        KeyCode::Char('f') => {
            if let Err(e) = app.fetch() {
                app.notify(&format!("Fetch error: {:#}", e));
            }
        }

        KeyCode::Char('w') => {
            if app.watching {
                *watcher = None;
                app.watching = false;
                app.notify("Watch stopped");
            } else {
                match start_watcher(app, watch_tx) {
                    Ok(w) => {
                        *watcher = Some(w);
                        app.watching = true;
                        app.notify("Watching for changes...");
                    }
                    Err(e) => app.notify(&format!("Watch error: {}", e)),
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Open the editor at `visit`; terminal editors get the screen until they exit
fn open_editor(terminal: &mut Tui, app: &mut App, visit: &app::Visit) -> Result<()> {
    let mut launch = app::editor_command(&app.repo_root, visit);
    if !launch.blocking {
        launch.command.spawn().context("Failed to open editor")?;
        app.notify(&format!("Opened {}:{}", display(&app.repo_root, &visit.path), visit.position.line));
        return Ok(());
    }

    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;
    let status = launch.command.status();
    enable_raw_mode()?;
    execute!(io::stdout(), EnterAlternateScreen)?;
    terminal.clear()?;

    if let Err(e) = status.context("Failed to open editor") {
        app.notify(&format!("{:#}", e));
    }
    app.refresh()
}

fn display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}
