//! Configuration management for dirwatch.
//!
//! Configuration comes from a TOML file. Paths in `dirs` and `exec` that
//! start with `~/` or `./` are expanded relative to the home directory and
//! the configuration file respectively.

mod paths;
mod settings;

pub use paths::expand_path;
pub use settings::{Config, LogConfig, LogFormat, RuleConfig};
