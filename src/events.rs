//! Event definitions for the application event loop.
//!
//! Everything that happens off the UI task (terminal input, finished compose
//! commands, relayed log lines) reaches the loop as an `Event` over a single
//! channel, so widgets are only ever touched from one place.

use crossterm::event::KeyEvent;

use crate::output::StreamKind;
use crate::process::ComposeAction;
use crate::runner::RunError;

/// Represents an event in the application's main event loop.
#[derive(Debug, Clone)]
pub enum Event {
    /// A blocking compose command has finished.
    CommandFinished {
        action: ComposeAction,
        result: Result<(), RunError>,
    },
    /// A line relayed from a streaming session.
    LogLine {
        session: u64,
        line: String,
        stream: StreamKind,
    },
    /// A streaming session's stdout reached end-of-data and the child was reaped.
    LogEnded {
        session: u64,
        code: Option<i32>,
        cancelled: bool,
    },
    /// A keyboard event received from the user.
    Key(KeyEvent),
    /// The terminal window was resized.
    Resize { width: u16, height: u16 },
    /// Ctrl-C / SIGTERM delivered to the panel itself.
    Shutdown,
}
