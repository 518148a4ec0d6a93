//! Type formatters.
//!
//! A [`Formatter`] renders values of the types it is registered for and may
//! supply their children. What it can do is declared up front through
//! [`Capabilities`], so the inspector decides which calls are safe and cheap
//! before making any of them.
//!
//! - [`registry`] maps type patterns to formatters.
//! - [`native`] is the fallback for types without a registration.
//! - [`declarative`] builds formatters from configuration.
//! - [`diagnostics`] holds the session-scoped invocation counters.
//! - [`budget`] bounds each call with a timeout.

pub mod budget;
pub mod declarative;
pub mod diagnostics;
pub mod native;
pub mod registry;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use varlens_core::{ChildKey, DebugValue, EngineError, NativeEngine, TypeDescriptor};

pub use budget::CallBudget;
pub use declarative::{DeclarativeFormatter, DeclarativeSpec};
pub use diagnostics::{FormatterDiagnostics, InvocationCounts};
pub use native::NativeFormatter;
pub use registry::{FormatterRegistry, Registration, TypePattern};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatterError {
    #[error("size query failed: {0}")]
    Size(String),
    #[error("failed to materialize child {key}: {message}")]
    Materialize { key: String, message: String },
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("formatter aborted during {0}")]
    Aborted(&'static str),
    #[error("engine error: {0}")]
    Engine(String),
}

impl From<EngineError> for FormatterError {
    fn from(err: EngineError) -> Self {
        FormatterError::Engine(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub provides_size: bool,
    pub provides_indexed_access: bool,
    pub provides_named_children: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        provides_size: false,
        provides_indexed_access: false,
        provides_named_children: false,
    };

    pub const INDEXED: Capabilities = Capabilities {
        provides_size: true,
        provides_indexed_access: true,
        provides_named_children: false,
    };

    pub const NAMED: Capabilities = Capabilities {
        provides_size: false,
        provides_indexed_access: false,
        provides_named_children: true,
    };

    /// Indexed classification needs both flags: a cheap size and positional
    /// access.
    pub fn is_indexed(&self) -> bool {
        self.provides_indexed_access && self.provides_size
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::new();
        if self.provides_size {
            flags.push("size");
        }
        if self.provides_indexed_access {
            flags.push("indexed");
        }
        if self.provides_named_children {
            flags.push("named");
        }
        if flags.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", flags.join(","))
        }
    }
}

// ---------------------------------------------------------------------------
// Formatter trait
// ---------------------------------------------------------------------------

/// A type-specific plugin supplying a summary and/or synthetic children.
///
/// `size` must be cheap, side-effect free and idempotent. `materialize_child`
/// may be arbitrarily expensive and is only called for children a client
/// actually requested.
pub trait Formatter: Send + Sync {
    /// Capabilities for values of type `ty`. User formatters usually ignore
    /// `ty`; the native fallback derives its answer from it.
    fn capabilities(&self, ty: &TypeDescriptor) -> Capabilities;

    fn summary(&self, _value: &DebugValue, _engine: &dyn NativeEngine) -> Option<String> {
        None
    }

    fn size(&self, value: &DebugValue, engine: &dyn NativeEngine) -> Result<usize, FormatterError>;

    /// `Ok(None)` when `key` is past the end.
    fn materialize_child(
        &self,
        value: &DebugValue,
        key: &ChildKey,
        engine: &dyn NativeEngine,
    ) -> Result<Option<DebugValue>, FormatterError>;
}

/// Where a formatter came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatterSource {
    Native,
    User(String),
}

impl FormatterSource {
    pub fn name(&self) -> &str {
        match self {
            FormatterSource::Native => "native",
            FormatterSource::User(name) => name,
        }
    }
}

/// A formatter chosen for a concrete type.
#[derive(Clone)]
pub struct ResolvedFormatter {
    pub source: FormatterSource,
    pub formatter: Arc<dyn Formatter>,
}

impl ResolvedFormatter {
    pub fn is_native(&self) -> bool {
        self.source == FormatterSource::Native
    }
}

impl fmt::Debug for ResolvedFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedFormatter")
            .field("source", &self.source)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Invoker
// ---------------------------------------------------------------------------

/// Runs formatter calls under the session's budget and records every call
/// in the session's diagnostics. Calls to the native fallback are not
/// bounded.
pub struct Invoker<'a> {
    engine: &'a Arc<dyn NativeEngine>,
    budget: CallBudget,
    diagnostics: &'a mut FormatterDiagnostics,
}

impl<'a> Invoker<'a> {
    pub fn new(
        engine: &'a Arc<dyn NativeEngine>,
        budget: CallBudget,
        diagnostics: &'a mut FormatterDiagnostics,
    ) -> Self {
        Self {
            engine,
            budget,
            diagnostics,
        }
    }

    pub fn size(
        &mut self,
        resolved: &ResolvedFormatter,
        value: &DebugValue,
    ) -> Result<usize, FormatterError> {
        self.diagnostics
            .record_size(resolved.source.name(), value.type_name());
        let formatter = Arc::clone(&resolved.formatter);
        let engine = Arc::clone(self.engine);
        let value = value.clone();
        let result = self
            .budget_for(resolved)
            .run("size", move || formatter.size(&value, engine.as_ref()));
        self.note_timeout(resolved, &result);
        result
    }

    pub fn materialize(
        &mut self,
        resolved: &ResolvedFormatter,
        value: &DebugValue,
        key: &ChildKey,
    ) -> Result<Option<DebugValue>, FormatterError> {
        self.diagnostics.record_materialize(resolved.source.name());
        let formatter = Arc::clone(&resolved.formatter);
        let engine = Arc::clone(self.engine);
        let value = value.clone();
        let key = key.clone();
        let result = self.budget_for(resolved).run("materialize", move || {
            formatter.materialize_child(&value, &key, engine.as_ref())
        });
        self.note_timeout(resolved, &result);
        result
    }

    /// Summaries are optional; a failing or slow one falls back to the
    /// engine's rendering.
    pub fn summary(&mut self, resolved: &ResolvedFormatter, value: &DebugValue) -> Option<String> {
        let formatter = Arc::clone(&resolved.formatter);
        let engine = Arc::clone(self.engine);
        let owned = value.clone();
        match self
            .budget_for(resolved)
            .run("summary", move || Ok(formatter.summary(&owned, engine.as_ref())))
        {
            Ok(summary) => summary,
            Err(err) => {
                if matches!(err, FormatterError::Timeout { .. }) {
                    self.diagnostics.record_timeout(resolved.source.name());
                }
                debug!(
                    formatter = resolved.source.name(),
                    value = %value.name,
                    %err,
                    "summary unavailable"
                );
                None
            }
        }
    }

    /// Native introspection is engine code and runs inline; only user
    /// formatters get the timeout.
    fn budget_for(&self, resolved: &ResolvedFormatter) -> CallBudget {
        if resolved.is_native() {
            CallBudget::unbounded()
        } else {
            self.budget
        }
    }

    fn note_timeout<T>(
        &mut self,
        resolved: &ResolvedFormatter,
        result: &Result<T, FormatterError>,
    ) {
        if let Err(FormatterError::Timeout { .. }) = result {
            self.diagnostics.record_timeout(resolved.source.name());
        }
    }
}
