//! Data structures describing the commands the panel runs.
//!
//! `ComposeAction` names what the user asked for, `CommandSpec` is the fully
//! resolved invocation (program, arguments, working directory), and
//! `CommandOutput` is what a blocking run captured.

use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

/// How the runner treats an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionMode {
    /// Wait for exit and report success or failure.
    Blocking,
    /// Relay output until the stream ends or the view is closed.
    Streaming,
}

/// Control actions on the service stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeAction {
    Start,
    Stop,
    Logs,
}

impl ComposeAction {
    /// Subcommand arguments appended to the compose command prefix.
    pub fn args(self) -> &'static [&'static str] {
        match self {
            ComposeAction::Start => &["up", "-d", "--build"],
            ComposeAction::Stop => &["down"],
            ComposeAction::Logs => &["logs", "--follow"],
        }
    }

    pub fn mode(self) -> ActionMode {
        match self {
            ComposeAction::Start | ComposeAction::Stop => ActionMode::Blocking,
            ComposeAction::Logs => ActionMode::Streaming,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ComposeAction::Start => "Starting the stack",
            ComposeAction::Stop => "Stopping the stack",
            ComposeAction::Logs => "Stack logs",
        }
    }
}

/// A resolved external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        f.write_str(&shell_words::join(parts))
    }
}

/// Builds `CommandSpec`s for compose actions from a configured prefix such as
/// `docker compose`.
#[derive(Debug, Clone)]
pub struct ComposeCommand {
    program: String,
    prefix_args: Vec<String>,
    cwd: PathBuf,
}

impl ComposeCommand {
    pub fn new(command: &str, cwd: impl Into<PathBuf>) -> Result<Self> {
        let mut parts = shell_words::split(command)
            .with_context(|| format!("failed to parse compose command {:?}", command))?;
        if parts.is_empty() {
            return Err(anyhow!("empty compose command"));
        }
        let program = parts.remove(0);
        Ok(Self {
            program,
            prefix_args: parts,
            cwd: cwd.into(),
        })
    }

    pub fn spec(&self, action: ComposeAction) -> CommandSpec {
        let mut args = self.prefix_args.clone();
        args.extend(action.args().iter().map(|arg| arg.to_string()));
        CommandSpec {
            program: self.program.clone(),
            args,
            cwd: self.cwd.clone(),
        }
    }
}

/// Captured output of a successful blocking run.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_compose_specs() {
        let compose = ComposeCommand::new("docker compose", "../..").unwrap();
        let start = compose.spec(ComposeAction::Start);
        assert_eq!(start.program, "docker");
        assert_eq!(start.args, vec!["compose", "up", "-d", "--build"]);
        assert_eq!(start.cwd, PathBuf::from("../.."));
        assert_eq!(compose.spec(ComposeAction::Stop).args, vec!["compose", "down"]);
        assert_eq!(
            compose.spec(ComposeAction::Logs).args,
            vec!["compose", "logs", "--follow"]
        );
    }

    #[test]
    fn quoted_prefix_is_split_with_shell_rules() {
        let compose = ComposeCommand::new("'/opt/my tools/docker' compose -p stack", ".").unwrap();
        let spec = compose.spec(ComposeAction::Stop);
        assert_eq!(spec.program, "/opt/my tools/docker");
        assert_eq!(spec.args, vec!["compose", "-p", "stack", "down"]);
        assert_eq!(spec.to_string(), "'/opt/my tools/docker' compose -p stack down");
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(ComposeCommand::new("   ", ".").is_err());
    }

    #[test]
    fn only_logs_streams() {
        assert_eq!(ComposeAction::Logs.mode(), ActionMode::Streaming);
        assert_eq!(ComposeAction::Start.mode(), ActionMode::Blocking);
        assert_eq!(ComposeAction::Stop.mode(), ActionMode::Blocking);
    }
}
