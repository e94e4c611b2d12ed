//! Process-wide configuration.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. `depstub.toml`, found by walking up from the working directory
//! 3. Environment (`DEPSTUB_GO`, `DEPSTUB_BUILD_FLAGS`), `.env` included
//! 4. Command-line flags (applied by the CLI)
//!
//! Example `depstub.toml`:
//! ```toml
//! go = "/usr/local/go/bin/go"
//! build_flags = ["-tags=integration"]
//! use_ext_types = true
//!
//! [directive]
//! prefix = "//go:generate depstub -vendor"
//! empty_values_placeholder = true
//! ```
//!
//! Once built, a `Config` is never mutated; it is threaded by reference into detection
//! and extraction.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "depstub.toml";
pub const DEFAULT_MODEL_PACKAGE: &str = "github.com/github/depstubber/model";
pub const DEFAULT_DIRECTIVE_PREFIX: &str = "//go:generate depstub -vendor";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid config {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Rendering options for re-extraction directives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectiveStyle {
    pub prefix: String,
    /// Render an empty value list as `""` instead of omitting it.
    pub empty_values_placeholder: bool,
}

impl Default for DirectiveStyle {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_DIRECTIVE_PREFIX.to_string(),
            empty_values_placeholder: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name or path of the `go` binary.
    pub go: PathBuf,
    /// Extra flags for every `go build`.
    pub build_flags: Vec<String>,
    pub use_ext_types: bool,
    /// Import path of the declaration-model package linked into probes.
    pub model_package: String,
    /// Version of `golang.org/x/tools` required by the loader probe when it has to
    /// synthesize its own manifest.
    pub tools_version: Option<String>,
    pub directive: DirectiveStyle,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            go: PathBuf::from("go"),
            build_flags: Vec::new(),
            use_ext_types: false,
            model_package: DEFAULT_MODEL_PACKAGE.to_string(),
            tools_version: None,
            directive: DirectiveStyle::default(),
        }
    }
}

impl Config {
    /// Loads defaults overlaid with the nearest `depstub.toml` above `start_dir`.
    pub fn load(start_dir: &Path) -> Result<Self, ConfigError> {
        match Self::discover(start_dir) {
            Some(path) => Self::load_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Finds the nearest config file in `start_dir` or one of its ancestors.
    pub fn discover(start_dir: &Path) -> Option<PathBuf> {
        start_dir
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Overlays environment variables read through `lookup`.
    ///
    /// Takes a lookup function so callers can pass `std::env::var` or a fixed map.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(go) = lookup("DEPSTUB_GO").filter(|v| !v.trim().is_empty()) {
            self.go = PathBuf::from(go.trim());
        }
        if let Some(flags) = lookup("DEPSTUB_BUILD_FLAGS") {
            self.build_flags = parse_build_flags(&flags);
        }
        self
    }
}

/// Splits a flag string on whitespace.
///
/// ```
/// # use common::config::parse_build_flags;
/// assert_eq!(parse_build_flags(" -tags=x  -race "), ["-tags=x", "-race"]);
/// ```
pub fn parse_build_flags(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
