#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use std::fs;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const CONFIG_FILE: &str = "deepppl.toml";

#[derive(Debug, Error, Diagnostic)]
#[error("config error in {}: {message}", path.display())]
#[diagnostic(code(deepppl::config))]
pub struct ConfigError {
    pub path: PathBuf,
    pub message: String,
}

/// Compilation options. Read from the `[compile]` table of `deepppl.toml`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Annotate generated local declarations with Python types.
    pub verbose: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    compile: Config,
}

impl Config {
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(raw)?;
        Ok(file.compile)
    }
}

/// Nearest `deepppl.toml` at or above `start` (a file or a directory).
pub fn find_config(start: &Path) -> Option<PathBuf> {
    let mut cur = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };
    loop {
        let candidate = cur.join(CONFIG_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        cur = cur.parent()?.to_path_buf();
    }
}

/// Defaults when no config file is found.
pub fn load_config(start: &Path) -> Result<Config, ConfigError> {
    let Some(path) = find_config(start) else {
        return Ok(Config::default());
    };
    let raw = fs::read_to_string(&path).map_err(|e| ConfigError {
        path: path.clone(),
        message: e.to_string(),
    })?;
    let config = Config::from_toml(&raw).map_err(|e| ConfigError {
        path: path.clone(),
        message: e.to_string(),
    })?;
    debug!(path = %path.display(), ?config, "loaded config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_table_sets_verbose() {
        let config = Config::from_toml("[compile]\nverbose = true\n").expect("parse");
        assert!(config.verbose);
    }

    #[test]
    fn missing_table_keeps_defaults() {
        let config = Config::from_toml("").expect("parse");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_toml("[compile]\nverbos = true\n").expect_err("should fail");
        assert!(err.to_string().contains("verbos"), "unexpected error: {err}");
    }
}
