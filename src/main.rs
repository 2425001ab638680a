//! stackpanel: a terminal control panel for a self-hosted compose stack.
//!
//! This is the entry point of the application. It parses command-line arguments,
//! resolves settings, and either runs one headless command or sets up the main
//! event loop that connects the form, the compose runner and the log view.

mod app;
mod browser;
mod config;
mod envfile;
mod events;
mod logging;
mod output;
mod process;
mod runner;
mod tui;

use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand};
use crossterm::event::KeyEventKind;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::{App, AppAction};
use crate::config::{Overrides, Settings};
use crate::envfile::{EnvConfig, LoadOutcome};
use crate::events::Event;
use crate::output::StreamKind;
use crate::process::{ActionMode, ComposeAction, ComposeCommand};
use crate::runner::LogSession;
use crate::tui::TuiTerminal;

/// Queued events applied before the next redraw.
const MAX_EVENTS_PER_FRAME: usize = 512;

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "stackpanel",
    version,
    about = "Terminal control panel for a self-hosted compose stack",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Path to stackpanel.toml configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Ignore any stackpanel.toml in the current directory.
    #[arg(long)]
    no_config: bool,
    /// Directory of the compose project (default: ../..).
    #[arg(long)]
    project_dir: Option<PathBuf>,
    /// Env file to edit (default: <project-dir>/.env).
    #[arg(long)]
    env_file: Option<PathBuf>,
    /// Orchestration command prefix (default: "docker compose").
    #[arg(long)]
    compose_command: Option<String>,
    /// URL opened by the "open UI" action.
    #[arg(long)]
    ui_url: Option<String>,
    /// Max log lines kept in the log view.
    #[arg(long)]
    max_lines: Option<usize>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the current configuration.
    Show {
        /// Print secrets in clear text.
        #[arg(long)]
        reveal: bool,
    },
    /// Set one or more values (KEY=VALUE) and save the env file.
    Set {
        #[arg(required = true)]
        pairs: Vec<String>,
    },
    /// Start the stack (compose up -d --build).
    Start,
    /// Stop the stack (compose down).
    Stop,
    /// Follow the stack logs until they end or Ctrl-C.
    Logs,
    /// Show help information.
    Help,
    /// Show version information.
    Version,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    match &cli.command {
        Some(Commands::Help) => {
            Cli::command().print_help()?;
            println!();
            return Ok(ExitCode::SUCCESS);
        }
        Some(Commands::Version) => {
            println!("stackpanel {}", env!("CARGO_PKG_VERSION"));
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let settings = load_settings(&cli)?;
    let headless = cli.command.is_some();
    let _log_guard = match logging::init(settings.log_dir.as_deref(), headless) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("warning: {:#}", err);
            None
        }
    };
    info!(
        project_dir = %settings.project_dir.display(),
        env_file = %settings.env_file.display(),
        compose = %settings.compose_command,
        "stackpanel starting"
    );

    match cli.command {
        None => run_tui(settings).await,
        Some(Commands::Show { reveal }) => show(&settings, reveal),
        Some(Commands::Set { pairs }) => set_values(&settings, &pairs),
        Some(Commands::Start) => run_headless(&settings, ComposeAction::Start).await,
        Some(Commands::Stop) => run_headless(&settings, ComposeAction::Stop).await,
        Some(Commands::Logs) => follow_headless(&settings).await,
        Some(Commands::Help) | Some(Commands::Version) => Ok(ExitCode::SUCCESS),
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut file_config = config::Config::default();
    if !cli.no_config {
        let config_path = cli.config.clone().or_else(config::default_config_path);
        if let Some(path) = config_path {
            file_config = config::load_config(&path)?;
        }
    }
    let overrides = Overrides {
        project_dir: cli.project_dir.clone(),
        env_file: cli.env_file.clone(),
        compose_command: cli.compose_command.clone(),
        ui_url: cli.ui_url.clone(),
        max_log_lines: cli.max_lines,
    };
    Ok(Settings::resolve(file_config, overrides))
}

/// Everything the event loop needs to carry out an `AppAction`.
struct Panel {
    settings: Settings,
    compose: ComposeCommand,
    event_tx: mpsc::Sender<Event>,
    log_session: Option<LogSession>,
    next_session: u64,
}

impl Panel {
    async fn apply(&mut self, action: AppAction, app: &mut App) {
        let action = match action {
            AppAction::Run(run) if run.mode() == ActionMode::Streaming => AppAction::OpenLogs,
            other => other,
        };
        match action {
            AppAction::None | AppAction::Quit => {}
            AppAction::Save => match envfile::save_env(&self.settings.env_file, &app.config) {
                Ok(()) => {
                    info!(path = %self.settings.env_file.display(), "env file saved");
                    app.on_saved(&self.settings.env_file);
                }
                Err(err) => {
                    warn!(error = %err, "failed to save env file");
                    app.on_save_failed(&err.to_string());
                }
            },
            AppAction::Run(action) => {
                let spec = self.compose.spec(action);
                let tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let result = runner::run_blocking(&spec).await.map(|_| ());
                    let _ = tx.send(Event::CommandFinished { action, result }).await;
                });
            }
            AppAction::OpenLogs => {
                if let Some(previous) = self.log_session.take() {
                    previous.stop().await;
                }
                self.next_session += 1;
                let id = self.next_session;
                let spec = self.compose.spec(ComposeAction::Logs);
                match runner::run_streaming(&spec, id, self.event_tx.clone()) {
                    Ok(session) => {
                        app.open_logs(id);
                        self.log_session = Some(session);
                    }
                    Err(err) => app.on_launch_failed(&err),
                }
            }
            AppAction::CloseLogs => {
                if let Some(session) = self.log_session.take() {
                    info!(session = session.id(), pid = ?session.pid(), "closing log view");
                    tokio::spawn(session.stop());
                }
                app.close_logs();
            }
            AppAction::OpenUi => match browser::open_url(&self.settings.ui_url) {
                Ok(()) => app.set_status_message(format!("Opening {}", self.settings.ui_url)),
                Err(err) => {
                    warn!(error = %err, "failed to open browser");
                    app.set_status_warning(format!("{:#}", err));
                }
            },
        }
    }

    async fn handle_event(&mut self, event: Event, app: &mut App, terminal: &mut TuiTerminal) {
        match event {
            Event::Key(key) => {
                let action = app.handle_key(key);
                self.apply(action, app).await;
            }
            Event::CommandFinished { action, result } => {
                app.on_command_finished(action, result);
            }
            Event::LogLine { session, line, stream } => {
                app.on_log_line(session, line, stream);
            }
            Event::LogEnded { session, code, cancelled } => {
                if !cancelled {
                    app.on_log_ended(session, code);
                }
                self.on_log_ended(session);
            }
            Event::Resize { width, height } => {
                debug!(width, height, "terminal resized");
                if let Err(err) = terminal.autoresize() {
                    warn!(error = %err, "failed to resize terminal");
                }
            }
            Event::Shutdown => app.should_quit = true,
        }
    }

    fn on_log_ended(&mut self, session: u64) {
        if self.log_session.as_ref().map(LogSession::id) == Some(session) {
            self.log_session = None;
        }
    }

    async fn shutdown(&mut self) {
        if let Some(session) = self.log_session.take() {
            session.stop().await;
        }
    }
}

async fn run_tui(settings: Settings) -> Result<ExitCode> {
    let compose = ComposeCommand::new(&settings.compose_command, &settings.project_dir)?;
    let (config, load_error, skipped) = match envfile::load_env(&settings.env_file) {
        Ok((config, outcome)) => {
            info!(outcome = ?outcome, "env file loaded");
            let skipped = match outcome {
                LoadOutcome::Loaded { skipped, .. } => skipped,
                LoadOutcome::Absent => 0,
            };
            (config, None, skipped)
        }
        Err(err) => {
            warn!(error = %err, "failed to load env file");
            (EnvConfig::default(), Some(err.to_string()), 0)
        }
    };

    let mut app = App::new(config, settings.env_file.clone(), settings.max_log_lines);
    if let Some(err) = load_error {
        app.on_load_failed(&err);
    }
    if skipped > 0 {
        app.set_status_warning(format!("skipped {} line(s) without '=' in the env file", skipped));
    }

    let (event_tx, mut event_rx) = mpsc::channel(256);
    let mut panel = Panel {
        settings,
        compose,
        event_tx: event_tx.clone(),
        log_session: None,
        next_session: 0,
    };

    let mut terminal = tui::init_terminal()?;
    spawn_input_listener(event_tx.clone());
    spawn_signal_listener(event_tx);

    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let mut result = Ok(ExitCode::SUCCESS);

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                panel.handle_event(event, &mut app, &mut terminal).await;
                // a log backlog costs one redraw, not one per line
                for _ in 0..MAX_EVENTS_PER_FRAME {
                    if app.should_quit {
                        break;
                    }
                    match event_rx.try_recv() {
                        Ok(event) => panel.handle_event(event, &mut app, &mut terminal).await,
                        Err(_) => break,
                    }
                }
            }
            _ = ticker.tick() => {}
        }

        if let Err(err) = tui::draw(&mut app, &mut terminal) {
            result = Err(err.into());
            break;
        }
        if app.should_quit {
            break;
        }
    }

    panel.shutdown().await;
    tui::restore_terminal(terminal)?;
    info!("stackpanel exiting");
    result
}

fn spawn_input_listener(tx: mpsc::Sender<Event>) {
    std::thread::spawn(move || loop {
        if crossterm::event::poll(Duration::from_millis(100)).unwrap_or(false) {
            let sent = match crossterm::event::read() {
                Ok(crossterm::event::Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    tx.blocking_send(Event::Key(key))
                }
                Ok(crossterm::event::Event::Resize(width, height)) => {
                    tx.blocking_send(Event::Resize { width, height })
                }
                _ => Ok(()),
            };
            if sent.is_err() {
                break;
            }
        }
    });
}

fn spawn_signal_listener(tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        let _ = tx.send(Event::Shutdown).await;
    });
}

fn show(settings: &Settings, reveal: bool) -> Result<ExitCode> {
    let (config, outcome) = envfile::load_env(&settings.env_file)?;
    match outcome {
        LoadOutcome::Absent => println!(
            "# {} does not exist yet; showing defaults",
            settings.env_file.display()
        ),
        LoadOutcome::Loaded { .. } => println!("# {}", settings.env_file.display()),
    }
    for entry in config.entries() {
        let value = if entry.key.secret && !reveal {
            envfile::mask(&entry.value)
        } else {
            entry.value.clone()
        };
        println!("{:<16} {}", entry.key.name, value);
    }
    Ok(ExitCode::SUCCESS)
}

fn set_values(settings: &Settings, pairs: &[String]) -> Result<ExitCode> {
    let (mut config, _) = envfile::load_env(&settings.env_file)?;
    apply_pairs(&mut config, pairs)?;
    envfile::save_env(&settings.env_file, &config)?;
    for warning in config.lint() {
        eprintln!("warning: {}", warning);
    }
    println!("saved {}", settings.env_file.display());
    Ok(ExitCode::SUCCESS)
}

/// Applies `KEY=VALUE` arguments. Every pair is checked before any is applied.
fn apply_pairs(config: &mut EnvConfig, pairs: &[String]) -> Result<()> {
    let mut parsed = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("expected KEY=VALUE, got {:?}", pair);
        };
        if config.get(key).is_none() {
            let known: Vec<_> = config.entries().iter().map(|entry| entry.key.name).collect();
            bail!("unknown key {} (expected one of {})", key, known.join(", "));
        }
        parsed.push((key, value));
    }
    for (key, value) in parsed {
        config.set(key, value);
    }
    Ok(())
}

async fn run_headless(settings: &Settings, action: ComposeAction) -> Result<ExitCode> {
    let compose = ComposeCommand::new(&settings.compose_command, &settings.project_dir)?;
    let spec = compose.spec(action);
    eprintln!("{}: {}", action.label(), spec);
    match runner::run_blocking(&spec).await {
        Ok(output) => {
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            println!("{} completed successfully.", action.label());
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{}", err);
            Ok(ExitCode::from(err.exit_code()))
        }
    }
}

async fn follow_headless(settings: &Settings) -> Result<ExitCode> {
    let compose = ComposeCommand::new(&settings.compose_command, &settings.project_dir)?;
    let spec = compose.spec(ComposeAction::Logs);
    let (tx, mut rx) = mpsc::channel(256);
    let session = match runner::run_streaming(&spec, 1, tx) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("{}", err);
            return Ok(ExitCode::from(err.exit_code()));
        }
    };

    let interrupt = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let end = follow_session(session, &mut rx, interrupt, |line, stream| match stream {
        StreamKind::Stdout => println!("{}", line),
        StreamKind::Stderr => eprintln!("{}", line),
    })
    .await;
    info!(end = ?end, "log stream finished");
    Ok(match end {
        FollowEnd::Ended(Some(code)) if code != 0 => ExitCode::FAILURE,
        FollowEnd::Ended(_) | FollowEnd::Interrupted => ExitCode::SUCCESS,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FollowEnd {
    /// The stream reached its end; carries the exit code.
    Ended(Option<i32>),
    /// `interrupt` fired and the session was stopped.
    Interrupted,
}

/// Hands every relayed line to `emit` until the session ends or `interrupt`
/// completes, in which case the session is stopped first.
async fn follow_session<F>(
    session: LogSession,
    rx: &mut mpsc::Receiver<Event>,
    interrupt: F,
    mut emit: impl FnMut(&str, StreamKind),
) -> FollowEnd
where
    F: Future<Output = ()>,
{
    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(Event::LogLine { line, stream, .. }) => emit(&line, stream),
                Some(Event::LogEnded { code, .. }) => return FollowEnd::Ended(code),
                Some(_) => {}
                None => return FollowEnd::Ended(None),
            },
            _ = &mut interrupt => {
                session.stop().await;
                return FollowEnd::Interrupted;
            }
        }
    }
}
