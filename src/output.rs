//! Log line storage for the log view.
//!
//! `LogBuffer` is a bounded ring of relayed lines; `display_text` turns a raw
//! line (ANSI colours, carriage-return progress bars) into plain text. Lines
//! are converted once, when they are relayed, never per frame.

use std::collections::VecDeque;

use strip_ansi_escapes::strip;

/// Indicates the source stream of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// A single line of output from a streaming command, ready for display.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub text: String,
    pub stream: StreamKind,
}

impl LogLine {
    pub fn from_raw(raw: &str, stream: StreamKind) -> Self {
        Self {
            text: display_text(raw),
            stream,
        }
    }
}

/// A fixed-capacity ring buffer for storing `LogLine`s.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    max_lines: usize,
    lines: VecDeque<LogLine>,
}

impl LogBuffer {
    /// Creates a new `LogBuffer` with the specified maximum capacity.
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            lines: VecDeque::with_capacity(max_lines.min(1024)),
        }
    }

    /// Adds a line to the buffer.
    ///
    /// Returns the oldest line if it was evicted to make room.
    pub fn push(&mut self, line: LogLine) -> Option<LogLine> {
        self.lines.push_back(line);
        if self.lines.len() > self.max_lines.max(1) {
            self.lines.pop_front()
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

    /// Up to `len` lines starting at `start`, clamped to the buffer.
    pub fn window(&self, start: usize, len: usize) -> impl Iterator<Item = &LogLine> {
        let start = start.min(self.lines.len());
        let end = start.saturating_add(len).min(self.lines.len());
        self.lines.range(start..end)
    }
}

/// Plain text for display: ANSI escapes removed, only the last
/// carriage-return segment kept.
pub fn display_text(text: &str) -> String {
    let stripped = strip(text.as_bytes());
    let plain = String::from_utf8_lossy(&stripped);
    plain.rsplit('\r').next().unwrap_or("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> LogLine {
        LogLine {
            text: text.into(),
            stream: StreamKind::Stdout,
        }
    }

    #[test]
    fn log_buffer_drops_oldest() {
        let mut buffer = LogBuffer::new(2);
        buffer.push(line("a"));
        buffer.push(line("b"));
        let evicted = buffer.push(line("c"));
        assert_eq!(evicted.map(|l| l.text), Some("a".to_string()));
        let lines = buffer.iter().map(|l| l.text.clone()).collect::<Vec<_>>();
        assert_eq!(lines, vec!["b", "c"]);
    }

    #[test]
    fn window_is_clamped_to_the_buffer() {
        let mut buffer = LogBuffer::new(10);
        for text in ["a", "b", "c", "d"] {
            buffer.push(line(text));
        }
        let texts = |start: usize, len: usize| -> Vec<String> {
            buffer.window(start, len).map(|l| l.text.clone()).collect()
        };
        assert_eq!(texts(1, 2), vec!["b", "c"]);
        assert_eq!(texts(3, 5), vec!["d"]);
        assert!(texts(9, 2).is_empty());
    }

    #[test]
    fn lines_are_converted_when_created() {
        let line = LogLine::from_raw("\u{1b}[31merror\u{1b}[0m\rretry ok", StreamKind::Stderr);
        assert_eq!(line.text, "retry ok");
        assert_eq!(line.stream, StreamKind::Stderr);
    }

    #[test]
    fn display_text_strips_colour_and_progress() {
        assert_eq!(
            display_text("\u{1b}[36mapi-1  |\u{1b}[0m listening"),
            "api-1  | listening"
        );
        assert_eq!(display_text("pull 10%\rpull 50%\rpull 100%"), "pull 100%");
    }
}
