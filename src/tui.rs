//! Terminal User Interface (TUI) rendering and management.
//!
//! This module handles initializing the terminal in raw mode, restoring it on exit,
//! and drawing the application state using `ratatui`.

use std::io::{self, Stdout};

use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};

use crate::app::{App, InputMode, LogStatus, NoticeLevel, StatusLevel, View};
use crate::output::StreamKind;

/// Type alias for the specific terminal backend used.
pub type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

const KEY_COLUMN: usize = 16;

/// Initializes the terminal for TUI mode.
///
/// Enables raw mode, enters the alternate screen, and creates a `ratatui` Terminal instance.
pub fn init_terminal() -> io::Result<TuiTerminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

/// Restores the terminal to its original state.
pub fn restore_terminal(mut terminal: TuiTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Draws the current application state to the terminal.
pub fn draw(app: &mut App, terminal: &mut TuiTerminal) -> io::Result<()> {
    execute!(terminal.backend_mut(), SetTitle(window_title(app)))?;
    terminal.draw(|frame| render(frame, app))?;
    Ok(())
}

/// Renders one frame. Split from `draw` so it works on any backend.
pub fn render(frame: &mut Frame, app: &mut App) {
    let area = frame.size();
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(4)])
        .split(area);

    match app.view {
        View::Form => render_form(frame, app, vertical[0]),
        View::Logs => render_logs(frame, app, vertical[0]),
    }
    render_status(frame, app, vertical[1]);

    if app.show_help {
        render_help(frame, app, area);
    }
    if app.notice.is_some() {
        render_notice(frame, app, area);
    }
}

fn border_style() -> Style {
    Style::default().fg(Color::DarkGray)
}

fn rounded_block(title: String) -> Block<'static> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(border_style())
}

fn render_form(frame: &mut Frame, app: &App, area: Rect) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3), Constraint::Length(3)])
        .split(area);

    let editing = app.input_mode == InputMode::Editing;
    let value_width = (parts[0].width as usize).saturating_sub(KEY_COLUMN + 6);
    let items: Vec<ListItem> = app
        .config
        .entries()
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let is_selected = idx == app.selected;
            let marker = if is_selected { "▶ " } else { "  " };
            let key_style = if is_selected {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            let value = if is_selected && editing {
                Span::styled(
                    format!("{}▌", tail(&app.input, value_width.saturating_sub(1))),
                    Style::default().fg(Color::Yellow),
                )
            } else {
                let shown = app.field_display(idx);
                if shown.is_empty() {
                    Span::styled("(empty)", Style::default().fg(Color::DarkGray))
                } else {
                    Span::raw(truncate(&shown, value_width))
                }
            };
            ListItem::new(Line::from(vec![
                Span::styled(marker, Style::default().fg(Color::Cyan)),
                Span::styled(format!("{:<width$}", entry.key.name, width = KEY_COLUMN), key_style),
                value,
            ]))
        })
        .collect();

    let title = format!(
        "Environment · {}{}",
        app.env_path.display(),
        if app.dirty { " *" } else { "" }
    );
    let mut state = ListState::default();
    state.select(Some(app.selected));
    frame.render_stateful_widget(List::new(items).block(rounded_block(title)), parts[0], &mut state);

    let hint = app
        .config
        .entries()
        .get(app.selected)
        .map(|entry| {
            if editing {
                format!("{} · Enter to keep, Esc to cancel", entry.key.description)
            } else {
                entry.key.description.to_string()
            }
        })
        .unwrap_or_default();
    frame.render_widget(
        Paragraph::new(Span::styled(hint, Style::default().fg(Color::Gray)))
            .block(rounded_block("Field".to_string())),
        parts[1],
    );

    let busy = app
        .busy
        .map(|action| format!("  [{}...]", action.label()))
        .unwrap_or_default();
    let controls = Line::from(vec![
        Span::styled("s", Style::default().fg(Color::Cyan)),
        Span::raw(" save  "),
        Span::styled("u", Style::default().fg(Color::Cyan)),
        Span::raw(" start  "),
        Span::styled("d", Style::default().fg(Color::Cyan)),
        Span::raw(" stop  "),
        Span::styled("l", Style::default().fg(Color::Cyan)),
        Span::raw(" logs  "),
        Span::styled("o", Style::default().fg(Color::Cyan)),
        Span::raw(" open UI"),
        Span::styled(busy, Style::default().fg(Color::Yellow)),
    ]);
    frame.render_widget(
        Paragraph::new(controls).block(rounded_block("Stack controls".to_string())),
        parts[2],
    );
}

fn render_logs(frame: &mut Frame, app: &mut App, area: Rect) {
    let block = rounded_block(log_title(app));
    let inner = block.inner(area);
    let height = inner.height as usize;
    let width = inner.width as usize;
    app.set_log_view_height(height);

    let total = app.visible_len();
    let start = if app.log_follow {
        total.saturating_sub(height)
    } else {
        app.log_scroll.min(total.saturating_sub(height))
    };
    let lines: Vec<Line> = app
        .log_window(start, height)
        .into_iter()
        .map(|line| {
            let style = match line.stream {
                StreamKind::Stdout => Style::default(),
                StreamKind::Stderr => Style::default().fg(Color::Yellow),
            };
            Line::from(Span::styled(truncate(&line.text, width.saturating_sub(1)), style))
        })
        .collect();

    frame.render_widget(Paragraph::new(Text::from(lines)).block(block), area);

    if total == 0 {
        let empty = if app.filter_query.is_some() {
            "No matching output"
        } else {
            "No output yet"
        };
        frame.render_widget(
            Paragraph::new(empty).style(Style::default().fg(Color::DarkGray)),
            inner,
        );
    }
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    let default_help = match app.view {
        View::Form => "↑/↓ select | Enter edit | s save | u start | d stop | l logs | o open UI | v secrets | ? help | q quit",
        View::Logs => "↑/↓ PgUp/PgDn scroll | Home/End | f follow | / filter | Esc close | ? help",
    };
    let (mut help_line, mut help_style) = match app.status_message() {
        Some((text, StatusLevel::Warning)) => (text.to_string(), Style::default().fg(Color::Yellow)),
        Some((text, StatusLevel::Info)) => (text.to_string(), Style::default().fg(Color::Gray)),
        None => (default_help.to_string(), Style::default().fg(Color::DarkGray)),
    };
    if app.input_mode == InputMode::Filter {
        help_line = format!("Filter: {} (Esc to exit)", app.input);
        help_style = Style::default().fg(Color::Gray);
    }
    let status = Paragraph::new(Text::from(vec![
        Line::from(Span::raw(app.status_line())),
        Line::from(Span::styled(help_line, help_style)),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(border_style()),
    );
    frame.render_widget(status, area);
}

fn render_help(frame: &mut Frame, app: &App, area: Rect) {
    let help_text = match app.view {
        View::Form => vec![
            "Form:",
            "  Up/Down    Select field",
            "  Enter      Edit field (Enter keeps, Esc cancels)",
            "  v          Show/hide secrets",
            "",
            "Actions:",
            "  s          Save the env file",
            "  u          Start the stack (compose up -d --build)",
            "  d          Stop the stack (compose down)",
            "  l          Follow the stack logs",
            "  o          Open the web UI",
            "",
            "General:",
            "  ?          Toggle this help",
            "  q          Quit",
        ],
        View::Logs => vec![
            "Logs:",
            "  Up/Down    Scroll one line",
            "  PgUp/PgDn  Scroll one page",
            "  Home/End   Scroll to top/bottom",
            "  f          Toggle auto-follow",
            "  /          Filter lines",
            "  Esc/q      Close (stops following)",
            "",
            "  ?          Toggle this help",
        ],
    }
    .join("\n");

    let popup_area = centered_rect(60, 60, area);
    let help_block = Paragraph::new(help_text)
        .block(
            Block::default()
                .title("Help")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        )
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    frame.render_widget(Clear, popup_area);
    frame.render_widget(help_block, popup_area);
}

fn render_notice(frame: &mut Frame, app: &App, area: Rect) {
    let Some(notice) = &app.notice else {
        return;
    };
    let accent = match notice.level {
        NoticeLevel::Info => Color::Green,
        NoticeLevel::Error => Color::Red,
    };
    let mut lines: Vec<Line> = notice.body.lines().map(|line| Line::from(line.to_string())).collect();
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Enter/Esc to close",
        Style::default().fg(Color::DarkGray),
    )));

    let popup_area = centered_rect(70, 50, area);
    let popup = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title(Span::styled(
                    notice.title.clone(),
                    Style::default().fg(accent).add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(accent)),
        );
    frame.render_widget(Clear, popup_area);
    frame.render_widget(popup, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn window_title(app: &App) -> String {
    match app.view {
        View::Form => "stackpanel".to_string(),
        View::Logs => "stackpanel · logs".to_string(),
    }
}

fn log_title(app: &App) -> String {
    match app.log_status {
        LogStatus::Running => "Logs (following)".to_string(),
        LogStatus::Ended { code: Some(code) } => format!("Logs (ended, exit {})", code),
        LogStatus::Ended { code: None } | LogStatus::Stopped => "Logs (ended)".to_string(),
        LogStatus::Idle => "Logs".to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out = text.chars().take(max.saturating_sub(1)).collect::<String>();
    out.push('~');
    out
}

// Keep the end of the edit buffer visible while typing past the width.
fn tail(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    text.chars().skip(count - max).collect()
}
