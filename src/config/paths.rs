//! Expansion of `~/` and `./` prefixes.

use std::path::Path;

use crate::{Error, Result};

/// Expand a leading `~/` to the home directory and a leading `./` to the
/// directory containing `config_path`. Anything else is returned unchanged.
///
/// # Errors
///
/// Returns an error if the input starts with `~/` and no home directory can
/// be determined.
pub fn expand_path(config_path: &Path, input: &str) -> Result<String> {
    if let Some(rest) = input.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::config("cannot expand '~': home directory unknown"))?;
        return Ok(format!("{}/{rest}", home.display()));
    }

    if let Some(rest) = input.strip_prefix("./") {
        let dir = match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        return Ok(format!("{}/{rest}", dir.display()));
    }

    Ok(input.to_string())
}
