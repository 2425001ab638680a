//! Opening the stack's web UI in the system browser.

use std::io;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Hands `url` to the platform opener without waiting for the browser.
pub fn open_url(url: &str) -> Result<()> {
    spawn_reaped(opener_command(url))
        .with_context(|| format!("failed to open {} in a browser", url))?;
    info!(url, "opened browser");
    Ok(())
}

// Starts `command` detached from the terminal; a background thread waits on
// it so finished openers do not linger as zombies.
fn spawn_reaped(mut command: Command) -> io::Result<JoinHandle<()>> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(std::thread::spawn(move || {
        if let Err(err) = child.wait() {
            warn!(error = %err, "failed to wait for browser opener");
        }
    }))
}

fn opener_command(url: &str) -> Command {
    if cfg!(target_os = "macos") {
        let mut command = Command::new("open");
        command.arg(url);
        command
    } else if cfg!(windows) {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", "", url]);
        command
    } else {
        let mut command = Command::new("xdg-open");
        command.arg(url);
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opener_passes_url_as_last_argument() {
        let command = opener_command("http://localhost:3003");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args.last().and_then(|arg| arg.to_str()), Some("http://localhost:3003"));
    }

    #[cfg(unix)]
    #[test]
    fn opener_process_is_waited_on() {
        let mut command = Command::new("sh");
        command.args(["-c", "exit 0"]);
        let reaper = spawn_reaped(command).unwrap();
        reaper.join().unwrap();
    }

    #[test]
    fn missing_opener_is_an_error() {
        let command = Command::new("stackpanel-no-such-opener");
        assert!(spawn_reaped(command).is_err());
    }
}
