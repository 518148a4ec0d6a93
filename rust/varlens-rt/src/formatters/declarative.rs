//! Formatters declared in configuration.
//!
//! A declarative formatter has fixed capability flags and takes its children
//! from the engine's native children of the value. It gives configuration
//! files the same reach a loaded formatter script has over capabilities,
//! size and summary.

use serde::{Deserialize, Serialize};
use varlens_core::{ChildKey, DebugValue, NativeEngine, TypeDescriptor};

use super::registry::TypePattern;
use super::{Capabilities, Formatter, FormatterError};

/// One `[[formatters]]` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarativeSpec {
    pub name: String,
    pub pattern: String,
    /// Treat `pattern` as a regular expression.
    #[serde(default)]
    pub regex: bool,
    /// Indexed access with a cheap size.
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub named: bool,
    /// Fixed size. When absent the native child count is reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    /// Summary text; `{value}` expands to the engine's rendering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl DeclarativeSpec {
    pub fn type_pattern(&self) -> Result<TypePattern, regex::Error> {
        if self.regex {
            TypePattern::regex(&self.pattern)
        } else {
            Ok(TypePattern::exact(&self.pattern))
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            provides_size: self.indexed,
            provides_indexed_access: self.indexed,
            provides_named_children: self.named,
        }
    }

    pub fn build(&self) -> DeclarativeFormatter {
        DeclarativeFormatter::new(self.capabilities(), self.size, self.summary.clone())
    }
}

#[derive(Debug, Clone)]
pub struct DeclarativeFormatter {
    capabilities: Capabilities,
    size: Option<usize>,
    summary: Option<String>,
}

impl DeclarativeFormatter {
    pub fn new(capabilities: Capabilities, size: Option<usize>, summary: Option<String>) -> Self {
        Self {
            capabilities,
            size,
            summary,
        }
    }
}

impl Formatter for DeclarativeFormatter {
    fn capabilities(&self, _ty: &TypeDescriptor) -> Capabilities {
        self.capabilities
    }

    fn summary(&self, value: &DebugValue, _engine: &dyn NativeEngine) -> Option<String> {
        self.summary
            .as_ref()
            .map(|template| template.replace("{value}", &value.summary))
    }

    fn size(&self, value: &DebugValue, engine: &dyn NativeEngine) -> Result<usize, FormatterError> {
        match self.size {
            Some(size) => Ok(size),
            None => engine
                .child_count(value)
                .map_err(|e| FormatterError::Size(e.to_string())),
        }
    }

    fn materialize_child(
        &self,
        value: &DebugValue,
        key: &ChildKey,
        engine: &dyn NativeEngine,
    ) -> Result<Option<DebugValue>, FormatterError> {
        if let (Some(size), ChildKey::Index(i)) = (self.size, key) {
            if *i >= size {
                return Ok(None);
            }
        }
        engine
            .child(value, key)
            .map_err(|e| FormatterError::Materialize {
                key: key.to_string(),
                message: e.to_string(),
            })
    }
}
