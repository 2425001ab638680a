//! Panel settings.
//!
//! This module defines the optional `stackpanel.toml` file, which tells the
//! panel where the stack lives and how to drive it, and resolves it together
//! with command-line overrides into the `Settings` used at runtime.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "stackpanel.toml";
pub const DEFAULT_PROJECT_DIR: &str = "../..";
pub const DEFAULT_ENV_FILE: &str = ".env";
pub const DEFAULT_COMPOSE_COMMAND: &str = "docker compose";
pub const DEFAULT_UI_URL: &str = "http://localhost:3003";
pub const DEFAULT_MAX_LOG_LINES: usize = 5000;

/// Structure of `stackpanel.toml`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding the compose project; commands run from here.
    pub project_dir: Option<PathBuf>,
    /// Env file path. Relative paths resolve against `project_dir`.
    pub env_file: Option<PathBuf>,
    /// Orchestration command prefix, split with shell rules.
    pub compose_command: Option<String>,
    /// URL opened by the "open UI" action.
    pub ui_url: Option<String>,
    /// Maximum number of log lines kept in the log view.
    pub max_log_lines: Option<usize>,
    /// Directory for the panel's own log files.
    pub log_dir: Option<PathBuf>,
}

/// Values supplied on the command line; they win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub project_dir: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub compose_command: Option<String>,
    pub ui_url: Option<String>,
    pub max_log_lines: Option<usize>,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub project_dir: PathBuf,
    pub env_file: PathBuf,
    pub compose_command: String,
    pub ui_url: String,
    pub max_log_lines: usize,
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    pub fn resolve(config: Config, overrides: Overrides) -> Self {
        let project_dir = overrides
            .project_dir
            .or(config.project_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROJECT_DIR));
        let env_file = overrides
            .env_file
            .or(config.env_file)
            .map(|path| {
                if path.is_absolute() {
                    path
                } else {
                    project_dir.join(path)
                }
            })
            .unwrap_or_else(|| project_dir.join(DEFAULT_ENV_FILE));
        Self {
            env_file,
            compose_command: overrides
                .compose_command
                .or(config.compose_command)
                .unwrap_or_else(|| DEFAULT_COMPOSE_COMMAND.to_string()),
            ui_url: overrides
                .ui_url
                .or(config.ui_url)
                .unwrap_or_else(|| DEFAULT_UI_URL.to_string()),
            max_log_lines: overrides
                .max_log_lines
                .or(config.max_log_lines)
                .unwrap_or(DEFAULT_MAX_LOG_LINES)
                .max(1),
            log_dir: config.log_dir.or_else(default_log_dir),
            project_dir,
        }
    }
}

/// Loads and parses the configuration from a file path.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// `stackpanel.toml` in the working directory, if there is one.
pub fn default_config_path() -> Option<PathBuf> {
    let path = Path::new(DEFAULT_CONFIG_FILE);
    if path.exists() {
        Some(path.to_path_buf())
    } else {
        None
    }
}

fn default_log_dir() -> Option<PathBuf> {
    cache_dir().map(|dir| dir.join("stackpanel").join("logs"))
}

fn cache_dir() -> Option<PathBuf> {
    if let Ok(path) = env::var("XDG_CACHE_HOME") {
        return Some(PathBuf::from(path));
    }
    if cfg!(windows) {
        return env::var("LOCALAPPDATA").ok().map(PathBuf::from);
    }
    env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".cache"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_optional_fields() {
        let raw = r#"
project_dir = "/srv/stack"
env_file = "config/.env"
compose_command = "podman compose"
ui_url = "http://localhost:9000"
max_log_lines = 200
log_dir = "/tmp/stackpanel"
"#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.project_dir, Some(PathBuf::from("/srv/stack")));
        assert_eq!(config.compose_command.as_deref(), Some("podman compose"));
        assert_eq!(config.max_log_lines, Some(200));

        let settings = Settings::resolve(config, Overrides::default());
        assert_eq!(settings.env_file, PathBuf::from("/srv/stack/config/.env"));
        assert_eq!(settings.ui_url, "http://localhost:9000");
        assert_eq!(settings.log_dir, Some(PathBuf::from("/tmp/stackpanel")));
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(toml::from_str::<Config>("colour = \"red\"").is_err());
    }

    #[test]
    fn defaults_point_two_levels_up() {
        let settings = Settings::resolve(Config::default(), Overrides::default());
        assert_eq!(settings.project_dir, PathBuf::from("../.."));
        assert_eq!(settings.env_file, PathBuf::from("../..").join(".env"));
        assert_eq!(settings.compose_command, "docker compose");
        assert_eq!(settings.ui_url, "http://localhost:3003");
        assert_eq!(settings.max_log_lines, DEFAULT_MAX_LOG_LINES);
    }

    #[test]
    fn overrides_win_over_file() {
        let config = Config {
            project_dir: Some(PathBuf::from("/from/file")),
            compose_command: Some("docker-compose".into()),
            max_log_lines: Some(10),
            ..Config::default()
        };
        let overrides = Overrides {
            project_dir: Some(PathBuf::from("/from/cli")),
            max_log_lines: Some(0),
            ..Overrides::default()
        };
        let settings = Settings::resolve(config, overrides);
        assert_eq!(settings.project_dir, PathBuf::from("/from/cli"));
        assert_eq!(settings.env_file, PathBuf::from("/from/cli/.env"));
        assert_eq!(settings.compose_command, "docker-compose");
        assert_eq!(settings.max_log_lines, 1);
    }
}
