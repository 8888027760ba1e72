//! Configuration settings and validation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::paths::expand_path;
use crate::watcher::{EventKind, ExecutionMode, ResolutionPolicy};
use crate::{Error, Result};

/// Upper bound for the pooled executor.
const MAX_WORKERS: usize = 64;

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration for dirwatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shell used to run rendered commands.
    pub shell: String,

    /// Flag passed to the shell before the command string.
    pub shell_cmd: String,

    /// How subprocesses are launched relative to the watch loop.
    pub execution: ExecutionMode,

    /// Concurrent subprocess limit in pooled mode.
    pub workers: usize,

    /// Whether one or every rule claiming a directory handles an event.
    pub resolution: ResolutionPolicy,

    /// Logging options.
    pub log: LogConfig,

    /// Global values available to command templates as `Vars`.
    pub vars: BTreeMap<String, toml::Value>,

    /// Watch rules.
    pub watchers: Vec<RuleConfig>,
}

/// Logging options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Optional file that receives a copy of every log line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Emit ANSI colors on stderr.
    pub color: bool,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// A single watch rule as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Label used in log records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Directories whose direct children trigger this rule.
    pub dirs: Vec<PathBuf>,

    /// Event kinds this rule reacts to.
    #[serde(default)]
    pub events: Vec<EventKind>,

    /// Filename globs, any of which admits a file.
    #[serde(default)]
    pub matches: Vec<String>,

    /// Command template.
    pub exec: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: "/bin/bash".to_string(),
            shell_cmd: "-c".to_string(),
            execution: ExecutionMode::default(),
            workers: 4,
            resolution: ResolutionPolicy::default(),
            log: LogConfig::default(),
            vars: BTreeMap::new(),
            watchers: Vec::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: None,
            level: "info".to_string(),
            format: LogFormat::Text,
            color: false,
        }
    }
}

impl Config {
    /// Load, expand and validate the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read '{}': {e}", path.display()))
        })?;

        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        Self::from_toml(&content, &path)
    }

    /// Parse configuration from a TOML string. Relative `./` paths are
    /// resolved against the directory of `config_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or the result is invalid.
    pub fn from_toml(content: &str, config_path: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.expand_paths(config_path)?;
        config.validate()?;
        Ok(config)
    }

    fn expand_paths(&mut self, config_path: &Path) -> Result<()> {
        for rule in &mut self.watchers {
            for dir in &mut rule.dirs {
                let raw = dir.to_string_lossy().into_owned();
                *dir = PathBuf::from(expand_path(config_path, &raw)?);
            }
            rule.exec = expand_path(config_path, &rule.exec)?;
        }
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.shell.is_empty() {
            return Err(Error::config("shell cannot be empty"));
        }

        if !VALID_LEVELS.contains(&self.log.level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log.level,
                VALID_LEVELS.join(", ")
            )));
        }

        if self.workers == 0 {
            return Err(Error::config("workers cannot be 0"));
        }

        if self.workers > MAX_WORKERS {
            return Err(Error::config(format!(
                "workers cannot exceed {MAX_WORKERS}"
            )));
        }

        for (index, rule) in self.watchers.iter().enumerate() {
            let name = rule.label(index);
            if rule.dirs.is_empty() {
                return Err(Error::config(format!("{name}: dirs cannot be empty")));
            }
            if rule.exec.trim().is_empty() {
                return Err(Error::config(format!("{name}: exec cannot be empty")));
            }
            if rule.events.contains(&EventKind::Unknown) {
                return Err(Error::config(format!(
                    "{name}: 'unknown' is not a configurable event"
                )));
            }
        }

        Ok(())
    }

    /// Encode the effective configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be represented in TOML.
    pub fn dump(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Every directory named by any rule, in declaration order, without
    /// duplicates.
    #[must_use]
    pub fn watch_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for dir in self.watchers.iter().flat_map(|w| &w.dirs) {
            if !dirs.contains(dir) {
                dirs.push(dir.clone());
            }
        }
        dirs
    }
}

impl RuleConfig {
    /// Display name: the configured name or `watcher-<index>`.
    #[must_use]
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("watcher-{index}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
shell = "/bin/sh"

[log]
level = "debug"

[vars]
dest = "/srv/archive"
tags = ["a", "b"]

[[watchers]]
dirs = ["/w", "./inbox"]
events = ["create", "write"]
matches = ["*.txt"]
exec = "echo {{ .Path }}"

[[watchers]]
name = "images"
dirs = ["/w"]
events = ["remove"]
matches = ["*.png", "**/*.jpg"]
exec = "./scripts/thumb.sh {{ .Path }}"
"#;

    fn parse(content: &str) -> Result<Config> {
        Config::from_toml(content, Path::new("/etc/dirwatch/dirwatch.toml"))
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.shell, "/bin/bash");
        assert_eq!(config.shell_cmd, "-c");
        assert_eq!(config.execution, ExecutionMode::Inline);
        assert_eq!(config.resolution, ResolutionPolicy::First);
        assert_eq!(config.log.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sample() {
        let config = parse(SAMPLE).unwrap();
        assert_eq!(config.shell, "/bin/sh");
        assert_eq!(config.shell_cmd, "-c");
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.watchers.len(), 2);
        assert_eq!(
            config.watchers[0].events,
            vec![EventKind::Create, EventKind::Write]
        );
        assert_eq!(
            config.vars.get("dest"),
            Some(&toml::Value::String("/srv/archive".to_string()))
        );
    }

    #[test]
    fn test_paths_are_expanded() {
        let config = parse(SAMPLE).unwrap();
        assert_eq!(
            config.watchers[0].dirs,
            vec![PathBuf::from("/w"), PathBuf::from("/etc/dirwatch/inbox")]
        );
        assert_eq!(
            config.watchers[1].exec,
            "/etc/dirwatch/scripts/thumb.sh {{ .Path }}"
        );
        assert_eq!(config.watchers[0].exec, "echo {{ .Path }}");
    }

    #[test]
    fn test_watch_dirs_deduplicated() {
        let config = parse(SAMPLE).unwrap();
        assert_eq!(
            config.watch_dirs(),
            vec![PathBuf::from("/w"), PathBuf::from("/etc/dirwatch/inbox")]
        );
    }

    #[test]
    fn test_unknown_event_name_rejected() {
        let err = parse(
            r#"
[[watchers]]
dirs = ["/w"]
events = ["modify"]
exec = "true"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_event_not_configurable() {
        let err = parse(
            r#"
[[watchers]]
dirs = ["/w"]
events = ["unknown"]
exec = "true"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_empty_dirs() {
        let err = parse(
            r#"
[[watchers]]
dirs = []
exec = "true"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("watcher-0: dirs"));
    }

    #[test]
    fn test_validate_empty_exec() {
        let err = parse(
            r#"
[[watchers]]
name = "docs"
dirs = ["/w"]
exec = "  "
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("docs: exec"));
    }

    #[test]
    fn test_validate_empty_shell() {
        let config = Config {
            shell: String::new(),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("shell"));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.log.level = "verbose".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log level"));
    }

    #[test]
    fn test_log_level_case_insensitive() {
        for level in ["TRACE", "Debug", "INFO", "Warn", "ERROR"] {
            let mut config = Config::default();
            config.log.level = level.to_string();
            assert!(
                config.validate().is_ok(),
                "Level '{level}' should be valid (case insensitive)"
            );
        }
    }

    #[test]
    fn test_validate_workers_bounds() {
        let zero = Config {
            workers: 0,
            ..Default::default()
        };
        assert!(zero.validate().unwrap_err().to_string().contains("workers"));

        let too_many = Config {
            workers: 100,
            ..Default::default()
        };
        assert!(too_many.validate().unwrap_err().to_string().contains("64"));
    }

    #[test]
    fn test_execution_and_resolution_parse() {
        let config = parse(
            r#"
execution = "pooled"
workers = 8
resolution = "all"
"#,
        )
        .unwrap();
        assert_eq!(config.execution, ExecutionMode::Pooled);
        assert_eq!(config.workers, 8);
        assert_eq!(config.resolution, ResolutionPolicy::All);
    }

    #[test]
    fn test_dump_reparses() {
        let config = parse(SAMPLE).unwrap();
        let dumped = config.dump().unwrap();
        let reparsed: Config = toml::from_str(&dumped).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/dirwatch.toml").unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("dirwatch.toml");
        std::fs::write(
            &path,
            "[[watchers]]\ndirs = [\"./inbox\"]\nevents = [\"write\"]\nexec = \"true\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.watchers[0].dirs, vec![tmp.path().join("inbox")]);
    }
}
