//! Configuration file parsing for `varlens.toml`.
//!
//! Searches the current directory then its ancestors unless a path is given
//! explicitly. A missing file means defaults; a malformed one is an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use varlens_rt::formatters::{CallBudget, DeclarativeSpec};
use varlens_rt::{FormatterRegistry, SessionOptions};

pub const CONFIG_FILE: &str = "varlens.toml";
pub const DEFAULT_LOG_FILTER: &str = "varlens=info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid toml in '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("formatter '{name}' has an invalid pattern: {source}")]
    Pattern {
        name: String,
        #[source]
        source: regex::Error,
    },
    #[error("formatter entry {0} has no name")]
    UnnamedFormatter(usize),
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct VarlensConfig {
    #[serde(default)]
    pub adapter: AdapterSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub formatters: Vec<DeclarativeSpec>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct AdapterSection {
    /// Per-call formatter timeout; 0 disables it.
    #[serde(default = "default_timeout_ms")]
    pub formatter_timeout_ms: u64,
    #[serde(default = "default_max_named_children")]
    pub max_named_children: usize,
}

impl Default for AdapterSection {
    fn default() -> Self {
        Self {
            formatter_timeout_ms: default_timeout_ms(),
            max_named_children: default_max_named_children(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    500
}

fn default_max_named_children() -> usize {
    1000
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct LoggingSection {
    /// `tracing-subscriber` env-filter directives.
    pub filter: Option<String>,
}

impl VarlensConfig {
    /// Load `path` if given, else search for `varlens.toml` from the current
    /// directory upwards. Defaults when nothing is found.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load_from(path);
        }
        let cwd = std::env::current_dir().map_err(|source| ConfigError::Read {
            path: PathBuf::from("."),
            source,
        })?;
        match Self::find_from(&cwd) {
            Some(found) => Self::load_from(&found),
            None => Ok(Self::default()),
        }
    }

    /// The nearest `varlens.toml` in `start` or one of its ancestors.
    pub fn find_from(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse a TOML string directly (used by tests).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            budget: CallBudget::with_timeout(Duration::from_millis(
                self.adapter.formatter_timeout_ms,
            )),
            max_named_children: self.adapter.max_named_children,
        }
    }

    /// Registry holding every `[[formatters]]` entry, in file order.
    pub fn build_registry(&self) -> Result<FormatterRegistry, ConfigError> {
        let mut registry = FormatterRegistry::new();
        for (i, spec) in self.formatters.iter().enumerate() {
            if spec.name.trim().is_empty() {
                return Err(ConfigError::UnnamedFormatter(i));
            }
            let pattern = spec.type_pattern().map_err(|source| ConfigError::Pattern {
                name: spec.name.clone(),
                source,
            })?;
            registry.register(spec.name.clone(), pattern, Arc::new(spec.build()));
        }
        Ok(registry)
    }

    pub fn log_filter(&self) -> &str {
        self.logging.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    pub fn default_template() -> &'static str {
        r#"# Varlens configuration

[adapter]
# Per-call formatter timeout in milliseconds (0 disables).
formatter_timeout_ms = 500
# Upper bound for enumerating a value's named children in one request.
max_named_children = 1000

[logging]
filter = "varlens=info"

# Formatters are matched by exact type name first, then by regex, in the
# order they appear here.
#
# [[formatters]]
# name = "VecFormatter"
# pattern = "^std::vec::Vec<.+>$"
# regex = true
# indexed = true
# summary = "vec {value}"
"#
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
