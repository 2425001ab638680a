//! The stack's `KEY=VALUE` environment file.
//!
//! This module owns the fixed set of recognized keys, the in-memory
//! `EnvConfig` edited by the form, and the load/save routines for the file on
//! disk. Loading only picks up recognized keys; saving only writes non-empty
//! values, in the fixed key order.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Static description of a recognized key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvKey {
    pub name: &'static str,
    pub default: &'static str,
    pub description: &'static str,
    /// Masked in the form and in `show` unless revealed.
    pub secret: bool,
}

/// Recognized keys, in the order they are shown and written.
pub const ENV_KEYS: [EnvKey; 6] = [
    EnvKey {
        name: "PORT",
        default: "3002",
        description: "Port the API listens on",
        secret: false,
    },
    EnvKey {
        name: "OPENAI_API_KEY",
        default: "",
        description: "API key for the AI provider (optional)",
        secret: true,
    },
    EnvKey {
        name: "PROXY_SERVER",
        default: "",
        description: "Proxy server URL, e.g. http://proxy.example.com:8080 (optional)",
        secret: false,
    },
    EnvKey {
        name: "PROXY_USERNAME",
        default: "",
        description: "Proxy username (optional)",
        secret: false,
    },
    EnvKey {
        name: "PROXY_PASSWORD",
        default: "",
        description: "Proxy password (optional)",
        secret: true,
    },
    EnvKey {
        name: "BULL_AUTH_KEY",
        default: "CHANGEME",
        description: "Password protecting the job queue admin panel",
        secret: true,
    },
];

#[derive(Debug, Error)]
pub enum EnvFileError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result of reading the env file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No file on disk yet; defaults are in effect.
    Absent,
    /// The file was read. `applied` counts recognized entries, `skipped`
    /// counts non-blank lines without a `=` separator.
    Loaded { applied: usize, skipped: usize },
}

/// A single key with its current value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvEntry {
    pub key: EnvKey,
    pub value: String,
}

/// The in-memory configuration edited by the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    entries: Vec<EnvEntry>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            entries: ENV_KEYS
                .iter()
                .map(|key| EnvEntry {
                    key: *key,
                    value: key.default.to_string(),
                })
                .collect(),
        }
    }
}

impl EnvConfig {
    pub fn entries(&self) -> &[EnvEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.key.name == key)
            .map(|entry| entry.value.as_str())
    }

    /// Sets a recognized key. Returns `false` for unknown keys.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> bool {
        match self.entries.iter_mut().find(|entry| entry.key.name == key) {
            Some(entry) => {
                entry.value = value.into();
                true
            }
            None => false,
        }
    }

    /// Applies `KEY=VALUE` lines on top of the current values.
    pub fn apply_text(&mut self, text: &str) -> LoadOutcome {
        let mut applied = 0;
        let mut skipped = 0;
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                skipped += 1;
                continue;
            };
            if self.set(key, value) {
                applied += 1;
            }
        }
        LoadOutcome::Loaded { applied, skipped }
    }

    /// Renders the file contents: non-empty values only, fixed key order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            if entry.value.is_empty() {
                continue;
            }
            out.push_str(entry.key.name);
            out.push('=');
            out.push_str(&entry.value);
            out.push('\n');
        }
        out
    }

    /// Advisory warnings about suspicious values. Never blocks a save.
    pub fn lint(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(port) = self.get("PORT") {
            if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
                warnings.push("PORT should be a number".to_string());
            }
        }
        if let Some(proxy) = self.get("PROXY_SERVER") {
            if !proxy.is_empty() && !proxy.starts_with("http") {
                warnings.push(
                    "PROXY_SERVER should be a full URL (e.g. http://...)".to_string(),
                );
            }
        }
        if self.get("BULL_AUTH_KEY") == Some("CHANGEME") {
            warnings.push("BULL_AUTH_KEY is still the default password".to_string());
        }
        warnings
    }
}

/// Loads the env file at `path` on top of the defaults.
pub fn load_env(path: &Path) -> Result<(EnvConfig, LoadOutcome), EnvFileError> {
    let mut config = EnvConfig::default();
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Ok((config, LoadOutcome::Absent));
        }
        Err(source) => {
            return Err(EnvFileError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let outcome = config.apply_text(&text);
    Ok((config, outcome))
}

/// Overwrites the env file at `path` with the non-empty values of `config`.
pub fn save_env(path: &Path, config: &EnvConfig) -> Result<(), EnvFileError> {
    fs::write(path, config.render()).map_err(|source| EnvFileError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Masks a secret for display, keeping its length hint.
pub fn mask(value: &str) -> String {
    "*".repeat(value.chars().count().min(16))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn loads_recognized_keys_and_ignores_others() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "PORT=4000\nFOO=bar\n").unwrap();

        let (config, outcome) = load_env(&path).unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded { applied: 1, skipped: 0 });
        assert_eq!(config.get("PORT"), Some("4000"));
        assert_eq!(config.get("BULL_AUTH_KEY"), Some("CHANGEME"));
        assert_eq!(config.get("OPENAI_API_KEY"), Some(""));
        assert_eq!(config.get("FOO"), None);
    }

    #[test]
    fn absent_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let (config, outcome) = load_env(&dir.path().join(".env")).unwrap();
        assert_eq!(outcome, LoadOutcome::Absent);
        assert_eq!(config, EnvConfig::default());
        assert_eq!(config.get("PORT"), Some("3002"));
        assert_eq!(config.get("PROXY_SERVER"), Some(""));
    }

    #[test]
    fn value_keeps_embedded_separator() {
        let mut config = EnvConfig::default();
        config.apply_text("OPENAI_API_KEY=sk-abc=123");
        assert_eq!(config.get("OPENAI_API_KEY"), Some("sk-abc=123"));
    }

    #[test]
    fn malformed_lines_are_skipped_and_whitespace_trimmed() {
        let mut config = EnvConfig::default();
        let outcome = config.apply_text("  PORT=5000  \nnot a pair\n\n# comment\n");
        assert_eq!(outcome, LoadOutcome::Loaded { applied: 1, skipped: 2 });
        assert_eq!(config.get("PORT"), Some("5000"));
    }

    #[test]
    fn save_omits_empty_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        let mut config = EnvConfig::default();
        config.set("OPENAI_API_KEY", "sk-1");
        config.set("PROXY_USERNAME", "user");
        config.set("PROXY_PASSWORD", "pw");
        save_env(&path, &config).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(!written.contains("PROXY_SERVER"));
        assert_eq!(
            written,
            "PORT=3002\nOPENAI_API_KEY=sk-1\nPROXY_USERNAME=user\nPROXY_PASSWORD=pw\nBULL_AUTH_KEY=CHANGEME\n"
        );
    }

    #[test]
    fn save_then_load_round_trips_non_empty_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        let mut config = EnvConfig::default();
        config.set("PORT", "8080");
        config.set("BULL_AUTH_KEY", "");
        config.set("PROXY_SERVER", "http://proxy:3128");
        save_env(&path, &config).unwrap();

        let (loaded, _) = load_env(&path).unwrap();
        assert_eq!(loaded.get("PORT"), Some("8080"));
        assert_eq!(loaded.get("PROXY_SERVER"), Some("http://proxy:3128"));
        // omitted on disk, so the default comes back
        assert_eq!(loaded.get("BULL_AUTH_KEY"), Some("CHANGEME"));
    }

    #[test]
    fn save_into_missing_directory_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join(".env");
        let err = save_env(&path, &EnvConfig::default()).unwrap_err();
        assert!(matches!(err, EnvFileError::Write { .. }));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn set_rejects_unknown_keys() {
        let mut config = EnvConfig::default();
        assert!(!config.set("FOO", "bar"));
        assert_eq!(config, EnvConfig::default());
    }

    #[test]
    fn lint_flags_suspicious_values() {
        let mut config = EnvConfig::default();
        config.set("PORT", "30x2");
        config.set("PROXY_SERVER", "proxy:8080");
        let warnings = config.lint();
        assert_eq!(warnings.len(), 3);

        config.set("PORT", "3002");
        config.set("PROXY_SERVER", "http://proxy:8080");
        config.set("BULL_AUTH_KEY", "s3cret");
        assert!(config.lint().is_empty());
    }
}
