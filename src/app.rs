//! Application state and UI logic.
//!
//! `App` owns the editable `EnvConfig`, the log view state and any pending
//! notice. Key handlers mutate that state directly and return an `AppAction`
//! for the event loop to carry out (saving, running compose, opening the
//! browser); the loop reports results back through the `on_*` methods.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::envfile::{mask, EnvConfig};
use crate::output::{LogBuffer, LogLine, StreamKind};
use crate::process::ComposeAction;
use crate::runner::RunError;

/// Which screen is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Form,
    Logs,
}

/// Modes of user input interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Standard navigation mode.
    Normal,
    /// Typing a new value for the selected field.
    Editing,
    /// Typing a filter query for the log view.
    Filter,
}

/// State of the streaming log command behind the log view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStatus {
    Idle,
    Running,
    Ended { code: Option<i32> },
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A modal message; it has to be dismissed before anything else happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
    pub level: NoticeLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone)]
struct StatusMessage {
    text: String,
    at: Instant,
    ttl: Duration,
    level: StatusLevel,
}

/// Actions resulting from user interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    None,
    Quit,
    /// Write the env file.
    Save,
    /// Run a blocking compose action.
    Run(ComposeAction),
    /// Start a log session and switch to the log view.
    OpenLogs,
    /// Stop the log session and return to the form.
    CloseLogs,
    /// Open the stack's web UI.
    OpenUi,
}

/// The main application state container.
#[derive(Debug)]
pub struct App {
    pub config: EnvConfig,
    pub env_path: PathBuf,
    /// Index of the selected form field.
    pub selected: usize,
    pub input_mode: InputMode,
    /// Edit buffer for the selected field or the filter query.
    pub input: String,
    pub view: View,
    pub reveal_secrets: bool,
    /// In-memory values differ from what was last loaded or saved.
    pub dirty: bool,
    /// Blocking compose action currently in flight.
    pub busy: Option<ComposeAction>,
    pub notice: Option<Notice>,
    pub show_help: bool,
    pub should_quit: bool,
    pub logs: LogBuffer,
    pub log_session: Option<u64>,
    pub log_status: LogStatus,
    pub log_scroll: usize,
    pub log_follow: bool,
    /// Height of the log view area (for scrolling calculations).
    pub log_view_height: usize,
    pub filter_query: Option<String>,
    /// Lines in `logs` that pass the filter.
    visible_count: usize,
    /// The env file exists but could not be read, so the form holds defaults.
    load_failed: bool,
    /// A first save press was turned into a warning; the next one overwrites.
    overwrite_armed: bool,
    status_message: Option<StatusMessage>,
}

impl App {
    pub fn new(config: EnvConfig, env_path: PathBuf, max_log_lines: usize) -> Self {
        Self {
            config,
            env_path,
            selected: 0,
            input_mode: InputMode::Normal,
            input: String::new(),
            view: View::Form,
            reveal_secrets: false,
            dirty: false,
            busy: None,
            notice: None,
            show_help: false,
            should_quit: false,
            logs: LogBuffer::new(max_log_lines),
            log_session: None,
            log_status: LogStatus::Idle,
            log_scroll: 0,
            log_follow: true,
            log_view_height: 0,
            filter_query: None,
            visible_count: 0,
            load_failed: false,
            overwrite_armed: false,
            status_message: None,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        if self.notice.is_some() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                self.notice = None;
            }
            return AppAction::None;
        }
        if self.show_help {
            if matches!(key.code, KeyCode::Char('?') | KeyCode::Esc | KeyCode::Enter) {
                self.show_help = false;
            }
            return AppAction::None;
        }
        match (self.input_mode, self.view) {
            (InputMode::Editing, _) => self.handle_edit_input(key),
            (InputMode::Filter, _) => self.handle_filter_input(key),
            (InputMode::Normal, View::Form) => self.handle_form_input(key),
            (InputMode::Normal, View::Logs) => self.handle_logs_input(key),
        }
    }

    fn handle_form_input(&mut self, key: KeyEvent) -> AppAction {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let armed = std::mem::take(&mut self.overwrite_armed);
        match key.code {
            KeyCode::Char('c') if ctrl => self.quit(),
            KeyCode::Char('s') if ctrl => self.request_save(armed),
            KeyCode::Char('q') => self.quit(),
            KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
                AppAction::None
            }
            KeyCode::Down => {
                if self.selected + 1 < self.config.len() {
                    self.selected += 1;
                }
                AppAction::None
            }
            KeyCode::Tab => {
                if !self.config.is_empty() {
                    self.selected = (self.selected + 1) % self.config.len();
                }
                AppAction::None
            }
            KeyCode::Enter => {
                self.begin_edit();
                AppAction::None
            }
            KeyCode::Char('s') => self.request_save(armed),
            KeyCode::Char('u') => self.request_run(ComposeAction::Start),
            KeyCode::Char('d') => self.request_run(ComposeAction::Stop),
            KeyCode::Char('l') => AppAction::OpenLogs,
            KeyCode::Char('o') => AppAction::OpenUi,
            KeyCode::Char('v') => {
                self.reveal_secrets = !self.reveal_secrets;
                AppAction::None
            }
            KeyCode::Char('?') => {
                self.show_help = true;
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    fn handle_logs_input(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => self.quit(),
            KeyCode::Esc | KeyCode::Char('q') => AppAction::CloseLogs,
            KeyCode::Up => {
                self.scroll_up(1);
                AppAction::None
            }
            KeyCode::Down => {
                self.scroll_down(1);
                AppAction::None
            }
            KeyCode::PageUp => {
                self.scroll_up(self.log_view_height.max(1));
                AppAction::None
            }
            KeyCode::PageDown => {
                self.scroll_down(self.log_view_height.max(1));
                AppAction::None
            }
            KeyCode::Home => {
                self.log_scroll = 0;
                self.log_follow = false;
                AppAction::None
            }
            KeyCode::End => {
                self.log_follow = true;
                self.ensure_follow();
                AppAction::None
            }
            KeyCode::Char('f') => {
                self.log_follow = !self.log_follow;
                if self.log_follow {
                    self.ensure_follow();
                }
                AppAction::None
            }
            KeyCode::Char('/') => {
                self.input_mode = InputMode::Filter;
                self.input = self.filter_query.clone().unwrap_or_default();
                AppAction::None
            }
            KeyCode::Char('?') => {
                self.show_help = true;
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    fn handle_edit_input(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.input.clear();
            }
            KeyCode::Enter => self.commit_edit(),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => {
                if !key.modifiers.contains(KeyModifiers::CONTROL) {
                    self.input.push(c);
                }
            }
            _ => {}
        }
        AppAction::None
    }

    fn handle_filter_input(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Esc | KeyCode::Enter => {
                self.input.clear();
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Backspace => {
                if self.input.pop().is_some() {
                    self.update_filter();
                }
            }
            KeyCode::Char(c) => {
                if !key.modifiers.contains(KeyModifiers::CONTROL) {
                    self.input.push(c);
                    self.update_filter();
                }
            }
            _ => {}
        }
        AppAction::None
    }

    fn quit(&mut self) -> AppAction {
        self.should_quit = true;
        AppAction::Quit
    }

    fn begin_edit(&mut self) {
        let Some(entry) = self.config.entries().get(self.selected) else {
            return;
        };
        self.input = entry.value.clone();
        self.input_mode = InputMode::Editing;
    }

    fn commit_edit(&mut self) {
        let value = std::mem::take(&mut self.input);
        self.input_mode = InputMode::Normal;
        let Some(key) = self.selected_key() else {
            return;
        };
        if self.config.get(key) != Some(value.as_str()) {
            self.config.set(key, value);
            self.dirty = true;
        }
    }

    fn update_filter(&mut self) {
        let query = self.input.trim().to_string();
        self.filter_query = if query.is_empty() { None } else { Some(query) };
        self.visible_count = match &self.filter_query {
            Some(_) => self
                .logs
                .iter()
                .filter(|line| self.passes_filter(&line.text))
                .count(),
            None => self.logs.len(),
        };
        if self.log_follow {
            self.ensure_follow();
        } else {
            self.log_scroll = self.log_scroll.min(self.max_scroll());
        }
    }

    // After a failed load the form holds defaults; writing them would wipe the
    // real file, so the first press only warns.
    fn request_save(&mut self, armed: bool) -> AppAction {
        if self.load_failed && !armed {
            self.overwrite_armed = true;
            self.set_status_warning(
                "The .env file could not be read. Press s again to overwrite it with the values shown.",
            );
            return AppAction::None;
        }
        AppAction::Save
    }

    fn request_run(&mut self, action: ComposeAction) -> AppAction {
        if let Some(current) = self.busy {
            self.set_status_warning(format!("{} is still in progress", current.label()));
            return AppAction::None;
        }
        self.busy = Some(action);
        self.set_status_message(format!("{}...", action.label()));
        AppAction::Run(action)
    }

    pub fn selected_key(&self) -> Option<&'static str> {
        self.config.entries().get(self.selected).map(|entry| entry.key.name)
    }

    /// Value of field `index` as the form should show it.
    pub fn field_display(&self, index: usize) -> String {
        let Some(entry) = self.config.entries().get(index) else {
            return String::new();
        };
        if entry.key.secret && !self.reveal_secrets {
            mask(&entry.value)
        } else {
            entry.value.clone()
        }
    }

    pub fn on_saved(&mut self, path: &Path) {
        self.dirty = false;
        self.load_failed = false;
        let mut body = format!(".env saved to {}", path.display());
        let warnings = self.config.lint();
        if !warnings.is_empty() {
            body.push_str("\n\nWarnings:");
            for warning in warnings {
                body.push_str("\n  - ");
                body.push_str(&warning);
            }
        }
        self.notice = Some(Notice {
            title: "Success".to_string(),
            body,
            level: NoticeLevel::Info,
        });
    }

    pub fn on_save_failed(&mut self, error: &str) {
        self.notice = Some(Notice {
            title: "Error".to_string(),
            body: format!("Failed to save .env file: {}", error),
            level: NoticeLevel::Error,
        });
    }

    /// The env file exists but could not be read; defaults are shown.
    pub fn on_load_failed(&mut self, error: &str) {
        self.load_failed = true;
        self.notice = Some(Notice {
            title: "Error".to_string(),
            body: format!("Failed to load .env file: {}\n\nShowing defaults.", error),
            level: NoticeLevel::Error,
        });
    }

    pub fn on_command_finished(&mut self, action: ComposeAction, result: Result<(), RunError>) {
        if self.busy == Some(action) {
            self.busy = None;
        }
        self.notice = Some(match result {
            Ok(()) => Notice {
                title: "Success".to_string(),
                body: format!("{} completed successfully.", action.label()),
                level: NoticeLevel::Info,
            },
            Err(err) => Notice {
                title: "Error".to_string(),
                body: err.to_string(),
                level: NoticeLevel::Error,
            },
        });
    }

    pub fn on_launch_failed(&mut self, err: &RunError) {
        self.notice = Some(Notice {
            title: "Error".to_string(),
            body: err.to_string(),
            level: NoticeLevel::Error,
        });
    }

    pub fn open_logs(&mut self, session: u64) {
        self.view = View::Logs;
        self.input_mode = InputMode::Normal;
        self.input.clear();
        self.logs.clear();
        self.visible_count = 0;
        self.log_session = Some(session);
        self.log_status = LogStatus::Running;
        self.log_scroll = 0;
        self.log_follow = true;
        self.filter_query = None;
    }

    pub fn close_logs(&mut self) {
        self.view = View::Form;
        self.input_mode = InputMode::Normal;
        self.input.clear();
        self.log_session = None;
        if self.log_status == LogStatus::Running {
            self.log_status = LogStatus::Stopped;
        }
    }

    pub fn on_log_line(&mut self, session: u64, text: String, stream: StreamKind) {
        if self.log_session != Some(session) {
            return;
        }
        let line = LogLine::from_raw(&text, stream);
        if self.passes_filter(&line.text) {
            self.visible_count += 1;
        }
        let mut shifted = false;
        if let Some(evicted) = self.logs.push(line) {
            if self.passes_filter(&evicted.text) {
                self.visible_count -= 1;
                shifted = true;
            }
        }
        if self.log_follow {
            self.ensure_follow();
        } else if shifted && self.log_scroll > 0 {
            self.log_scroll -= 1;
        }
    }

    pub fn on_log_ended(&mut self, session: u64, code: Option<i32>) {
        if self.log_session != Some(session) {
            return;
        }
        self.log_status = LogStatus::Ended { code };
        let message = match code {
            Some(code) => format!("log stream ended (exit {})", code),
            None => "log stream ended".to_string(),
        };
        self.set_status_message(message);
    }

    fn passes_filter(&self, text: &str) -> bool {
        match &self.filter_query {
            Some(query) => text.contains(query.as_str()),
            None => true,
        }
    }

    /// Number of lines the log view can show under the current filter.
    pub fn visible_len(&self) -> usize {
        self.visible_count
    }

    /// The `len` visible lines starting at visible index `start`.
    pub fn log_window(&self, start: usize, len: usize) -> Vec<&LogLine> {
        if self.filter_query.is_none() {
            return self.logs.window(start, len).collect();
        }
        self.logs
            .iter()
            .filter(|line| self.passes_filter(&line.text))
            .skip(start)
            .take(len)
            .collect()
    }

    fn max_scroll(&self) -> usize {
        self.visible_count
            .saturating_sub(self.log_view_height.max(1))
    }

    pub fn scroll_up(&mut self, amount: usize) {
        let max_scroll = self.max_scroll();
        let current = if self.log_follow {
            max_scroll
        } else {
            self.log_scroll
        };
        self.log_scroll = current.saturating_sub(amount).min(max_scroll);
        self.log_follow = false;
    }

    pub fn scroll_down(&mut self, amount: usize) {
        let max_scroll = self.max_scroll();
        let current = if self.log_follow {
            max_scroll
        } else {
            self.log_scroll
        };
        let next = (current + amount).min(max_scroll);
        self.log_scroll = next;
        self.log_follow = next == max_scroll;
    }

    pub fn ensure_follow(&mut self) {
        self.log_scroll = self.max_scroll();
    }

    pub fn set_log_view_height(&mut self, height: usize) {
        self.log_view_height = height;
        let max_scroll = self.max_scroll();
        if self.log_follow {
            self.log_scroll = max_scroll;
        } else {
            self.log_scroll = self.log_scroll.min(max_scroll);
        }
    }

    pub fn status_line(&self) -> String {
        match self.view {
            View::Form => {
                let running = self
                    .busy
                    .map(|action| format!("{}...", action.label()))
                    .unwrap_or_else(|| "idle".to_string());
                format!(
                    "{}{} | {} | secrets: {}",
                    self.env_path.display(),
                    if self.dirty { " (modified)" } else { "" },
                    running,
                    if self.reveal_secrets { "shown" } else { "hidden" }
                )
            }
            View::Logs => {
                let status = match self.log_status {
                    LogStatus::Idle => "idle".to_string(),
                    LogStatus::Running => "running".to_string(),
                    LogStatus::Ended { code: Some(code) } => format!("ended ({})", code),
                    LogStatus::Ended { code: None } => "ended".to_string(),
                    LogStatus::Stopped => "stopped".to_string(),
                };
                format!(
                    "logs: {} | lines: {} | follow: {} | filter: {}",
                    status,
                    self.logs.len(),
                    if self.log_follow { "on" } else { "off" },
                    self.filter_query.as_deref().unwrap_or("-")
                )
            }
        }
    }

    pub fn status_message(&self) -> Option<(&str, StatusLevel)> {
        let message = self.status_message.as_ref()?;
        if message.at.elapsed() < message.ttl {
            Some((message.text.as_str(), message.level))
        } else {
            None
        }
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.set_status(message, StatusLevel::Info);
    }

    pub fn set_status_warning(&mut self, message: impl Into<String>) {
        self.set_status(message, StatusLevel::Warning);
    }

    fn set_status(&mut self, message: impl Into<String>, level: StatusLevel) {
        self.status_message = Some(StatusMessage {
            text: message.into(),
            at: Instant::now(),
            ttl: Duration::from_secs(4),
            level,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
    }

    fn make_app() -> App {
        App::new(EnvConfig::default(), PathBuf::from("../../.env"), 100)
    }

    #[test]
    fn editing_commits_into_config() {
        let mut app = make_app();
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.input_mode, InputMode::Editing);
        assert_eq!(app.input, "3002");
        for _ in 0..4 {
            app.handle_key(key(KeyCode::Backspace));
        }
        type_text(&mut app, "4000");
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.input_mode, InputMode::Normal);
        assert_eq!(app.config.get("PORT"), Some("4000"));
        assert!(app.dirty);
    }

    #[test]
    fn escape_discards_edit() {
        let mut app = make_app();
        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.selected_key(), Some("OPENAI_API_KEY"));
        app.handle_key(key(KeyCode::Enter));
        type_text(&mut app, "sk-test");
        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.config.get("OPENAI_API_KEY"), Some(""));
        assert!(!app.dirty);
    }

    #[test]
    fn keys_while_editing_are_text_not_actions() {
        let mut app = make_app();
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.handle_key(key(KeyCode::Char('q'))), AppAction::None);
        assert_eq!(app.handle_key(key(KeyCode::Char('s'))), AppAction::None);
        assert!(!app.should_quit);
        assert_eq!(app.input, "3002qs");
    }

    #[test]
    fn secrets_are_masked_until_revealed() {
        let mut app = make_app();
        app.config.set("PROXY_PASSWORD", "hunter2");
        assert_eq!(app.field_display(4), "*******");
        assert_eq!(app.field_display(0), "3002");
        app.handle_key(key(KeyCode::Char('v')));
        assert_eq!(app.field_display(4), "hunter2");
    }

    #[test]
    fn second_run_is_refused_while_busy() {
        let mut app = make_app();
        assert_eq!(
            app.handle_key(key(KeyCode::Char('u'))),
            AppAction::Run(ComposeAction::Start)
        );
        assert_eq!(app.handle_key(key(KeyCode::Char('d'))), AppAction::None);
        assert!(matches!(app.status_message(), Some((_, StatusLevel::Warning))));

        app.on_command_finished(ComposeAction::Start, Ok(()));
        assert!(app.busy.is_none());
        let notice = app.notice.clone().unwrap();
        assert_eq!(notice.level, NoticeLevel::Info);
        assert!(notice.body.contains("completed successfully"));
    }

    #[test]
    fn notice_blocks_input_until_dismissed() {
        let mut app = make_app();
        app.on_command_finished(
            ComposeAction::Stop,
            Err(RunError::ToolNotFound {
                tool: "docker".into(),
            }),
        );
        let body = app.notice.as_ref().unwrap().body.clone();
        assert!(body.starts_with("docker not found"));
        assert_eq!(app.handle_key(key(KeyCode::Char('q'))), AppAction::None);
        app.handle_key(key(KeyCode::Esc));
        assert!(app.notice.is_none());
        assert_eq!(app.handle_key(key(KeyCode::Char('q'))), AppAction::Quit);
    }

    #[test]
    fn save_notice_lists_lint_warnings() {
        let mut app = make_app();
        app.dirty = true;
        app.on_saved(Path::new("/tmp/.env"));
        assert!(!app.dirty);
        let body = &app.notice.as_ref().unwrap().body;
        assert!(body.contains("BULL_AUTH_KEY is still the default password"));
    }

    #[test]
    fn stale_session_lines_are_ignored() {
        let mut app = make_app();
        app.open_logs(2);
        app.on_log_line(1, "old".into(), StreamKind::Stdout);
        app.on_log_line(2, "new".into(), StreamKind::Stdout);
        assert_eq!(app.logs.len(), 1);
        app.on_log_ended(1, Some(0));
        assert_eq!(app.log_status, LogStatus::Running);
        app.on_log_ended(2, Some(1));
        assert_eq!(app.log_status, LogStatus::Ended { code: Some(1) });
    }

    #[test]
    fn closing_logs_returns_to_form() {
        let mut app = make_app();
        app.open_logs(1);
        assert_eq!(app.handle_key(key(KeyCode::Esc)), AppAction::CloseLogs);
        app.close_logs();
        assert_eq!(app.view, View::Form);
        assert_eq!(app.log_status, LogStatus::Stopped);
        app.on_log_line(1, "late".into(), StreamKind::Stdout);
        assert!(app.logs.is_empty());
    }

    #[test]
    fn scrolling_leaves_and_rejoins_follow() {
        let mut app = make_app();
        app.open_logs(1);
        app.set_log_view_height(3);
        for i in 0..10 {
            app.on_log_line(1, format!("line {}", i), StreamKind::Stdout);
        }
        assert_eq!(app.log_scroll, 7);
        app.handle_key(key(KeyCode::PageUp));
        assert!(!app.log_follow);
        assert_eq!(app.log_scroll, 4);
        app.on_log_line(1, "line 10".into(), StreamKind::Stdout);
        assert_eq!(app.log_scroll, 4);
        app.handle_key(key(KeyCode::End));
        assert!(app.log_follow);
        assert_eq!(app.log_scroll, 8);
    }

    #[test]
    fn filter_narrows_visible_lines() {
        let mut app = make_app();
        app.open_logs(1);
        app.on_log_line(1, "api-1 | ready".into(), StreamKind::Stdout);
        app.on_log_line(1, "worker-1 | job done".into(), StreamKind::Stdout);
        app.handle_key(key(KeyCode::Char('/')));
        type_text(&mut app, "worker");
        assert_eq!(app.filter_query.as_deref(), Some("worker"));
        assert_eq!(app.visible_len(), 1);
        let lines = app.log_window(0, 10);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "worker-1 | job done");

        app.on_log_line(1, "api-1 | still ready".into(), StreamKind::Stdout);
        app.on_log_line(1, "worker-1 | next job".into(), StreamKind::Stdout);
        assert_eq!(app.visible_len(), 2);
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.input_mode, InputMode::Normal);
        assert_eq!(app.filter_query.as_deref(), Some("worker"));

        app.handle_key(key(KeyCode::Char('/')));
        for _ in 0.."worker".len() {
            app.handle_key(key(KeyCode::Backspace));
        }
        assert!(app.filter_query.is_none());
        assert_eq!(app.visible_len(), 4);
    }

    #[test]
    fn full_buffer_keeps_counts_and_scroll_in_step() {
        let mut app = App::new(EnvConfig::default(), PathBuf::from(".env"), 5);
        app.open_logs(1);
        app.set_log_view_height(2);
        for i in 0..5 {
            app.on_log_line(1, format!("\u{1b}[32mapi-1 |\u{1b}[0m line {}", i), StreamKind::Stdout);
        }
        app.handle_key(key(KeyCode::Up));
        assert_eq!(app.log_scroll, 2);

        app.on_log_line(1, "api-1 | line 5".into(), StreamKind::Stdout);
        assert_eq!(app.logs.len(), 5);
        assert_eq!(app.visible_len(), 5);
        assert_eq!(app.log_scroll, 1);
        let shown: Vec<_> = app.log_window(app.log_scroll, 2).iter().map(|l| l.text.clone()).collect();
        assert_eq!(shown, vec!["api-1 | line 2", "api-1 | line 3"]);
    }

    #[test]
    fn long_backlog_is_absorbed_quickly() {
        let mut app = App::new(EnvConfig::default(), PathBuf::from(".env"), 5000);
        app.open_logs(1);
        app.set_log_view_height(40);
        let started = Instant::now();
        for i in 0..20_000 {
            app.on_log_line(
                1,
                format!("\u{1b}[36mapi-1  |\u{1b}[0m request {} handled in 3ms", i),
                StreamKind::Stdout,
            );
        }
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(app.visible_len(), 5000);
        assert_eq!(app.log_scroll, 5000 - 40);
    }

    #[test]
    fn save_after_failed_load_needs_a_second_press() {
        let mut app = make_app();
        app.on_load_failed("permission denied");
        assert!(app.notice.as_ref().unwrap().body.ends_with("\n\nShowing defaults."));
        app.handle_key(key(KeyCode::Enter));
        assert!(app.notice.is_none());

        assert_eq!(app.handle_key(key(KeyCode::Char('s'))), AppAction::None);
        assert!(matches!(app.status_message(), Some((_, StatusLevel::Warning))));
        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.handle_key(key(KeyCode::Char('s'))), AppAction::None);
        assert_eq!(app.handle_key(key(KeyCode::Char('s'))), AppAction::Save);

        app.on_saved(Path::new("/tmp/.env"));
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.handle_key(key(KeyCode::Char('s'))), AppAction::Save);
    }
}
