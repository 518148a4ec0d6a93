//! One debug session's inspection state.
//!
//! [`InspectionSession`] owns the engine handle, the formatter registry, the
//! invocation counters, the classification cache and the handle arena. The
//! cache and the arena are scoped to a stop: [`InspectionSession::resumed`]
//! and [`InspectionSession::stopped`] drop both at once.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use varlens_core::{
    ChildKey, DebugValue, ExecutionState, FrameId, FrameInfo, NativeEngine, ResumeKind,
    StopReason,
};

use crate::children::{self, ChildOutcome, HandleArena, HandleTarget, Window};
use crate::console::{self, CONSOLE_PREFIX};
use crate::error::InspectError;
use crate::formatters::{
    CallBudget, FormatterDiagnostics, FormatterRegistry, Invoker, ResolvedFormatter,
};
use crate::inspector::{ChildrenKind, Classification, ValueInspector};
use crate::response::{ResponseBuilder, VariableDescriptor};

pub const DEFAULT_FORMATTER_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_NAMED_CHILDREN: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub budget: CallBudget,
    /// Upper bound for a named enumeration that asked for "everything".
    pub max_named_children: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            budget: CallBudget::with_timeout(DEFAULT_FORMATTER_TIMEOUT),
            max_named_children: DEFAULT_MAX_NAMED_CHILDREN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub name: String,
    pub variables_reference: i64,
    pub expensive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariablesOutcome {
    pub variables: Vec<VariableDescriptor>,
    /// Set when the request could not be served as asked.
    pub diagnostic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluateOutcome {
    /// Console output.
    Console(String),
    Value(VariableDescriptor),
}

pub struct InspectionSession {
    engine: Arc<dyn NativeEngine>,
    registry: FormatterRegistry,
    options: SessionOptions,
    diagnostics: FormatterDiagnostics,
    inspector: ValueInspector,
    arena: HandleArena,
    stop: Option<StopReason>,
    /// No classification or handle has been handed out since the last
    /// invalidation.
    fresh: bool,
}

impl InspectionSession {
    pub fn new(
        engine: Arc<dyn NativeEngine>,
        registry: FormatterRegistry,
        options: SessionOptions,
    ) -> Self {
        let stop = match engine.state() {
            ExecutionState::Stopped(reason) => Some(reason),
            ExecutionState::Exited => None,
        };
        Self {
            engine,
            registry,
            options,
            diagnostics: FormatterDiagnostics::new(),
            inspector: ValueInspector::new(),
            arena: HandleArena::new(),
            stop,
            fresh: true,
        }
    }

    pub fn engine(&self) -> &Arc<dyn NativeEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &FormatterRegistry {
        &self.registry
    }

    pub fn diagnostics(&self) -> &FormatterDiagnostics {
        &self.diagnostics
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Reason for the current stop, `None` once the debuggee has exited.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    pub fn generation(&self) -> u32 {
        self.arena.generation()
    }

    /// Begin inspecting a new stop. State from an earlier stop is dropped
    /// unless [`Self::resumed`] already did so.
    pub fn stopped(&mut self, reason: StopReason) {
        if !self.fresh {
            self.invalidate();
        }
        info!(reason = reason.as_str(), generation = self.arena.generation(), "debuggee stopped");
        self.stop = Some(reason);
    }

    /// The debuggee ran: every classification and handle is stale.
    pub fn resumed(&mut self) {
        self.invalidate();
        self.stop = None;
    }

    fn invalidate(&mut self) {
        debug!(
            cached = self.inspector.len(),
            handles = self.arena.len(),
            "invalidating stop state"
        );
        self.inspector.invalidate();
        self.arena.invalidate();
        self.fresh = true;
    }

    /// Resume the engine and begin inspecting wherever it stops next.
    pub fn resume(&mut self, kind: ResumeKind) -> Result<ExecutionState, InspectError> {
        self.resumed();
        let state = self.engine.resume(kind)?;
        match state {
            ExecutionState::Stopped(reason) => self.stopped(reason),
            ExecutionState::Exited => info!("debuggee exited"),
        }
        Ok(state)
    }

    pub fn frames(&self) -> Result<Vec<FrameInfo>, InspectError> {
        Ok(self.engine.frames()?)
    }

    pub fn scopes(&mut self, frame: FrameId) -> Result<Vec<Scope>, InspectError> {
        if !self.engine.frames()?.iter().any(|f| f.id == frame) {
            return Err(varlens_core::EngineError::UnknownFrame(frame).into());
        }
        self.fresh = false;
        Ok(vec![Scope {
            name: "Locals".to_string(),
            variables_reference: self.arena.locals(frame),
            expensive: false,
        }])
    }

    /// Serve a `variables` request.
    pub fn variables(&mut self, reference: i64, window: Window) -> VariablesOutcome {
        let slot = match self.arena.resolve(reference) {
            Ok(slot) => slot,
            Err(err) => {
                warn!(reference, %err, "variables request for unknown handle");
                return VariablesOutcome {
                    variables: Vec::new(),
                    diagnostic: Some(err.to_string()),
                };
            }
        };
        let target = match self.arena.handle(slot) {
            Some(handle) => handle.target.clone(),
            None => {
                return VariablesOutcome {
                    variables: Vec::new(),
                    diagnostic: Some(InspectError::UnknownHandle(reference).to_string()),
                }
            }
        };

        match target {
            HandleTarget::Locals(frame) => match self.engine.locals(frame) {
                Ok(locals) => {
                    let variables = locals[window.range(locals.len())]
                        .iter()
                        .map(|local| self.describe(local))
                        .collect();
                    VariablesOutcome {
                        variables,
                        diagnostic: None,
                    }
                }
                Err(err) => VariablesOutcome {
                    variables: Vec::new(),
                    diagnostic: Some(err.to_string()),
                },
            },
            HandleTarget::Value(value) => self.expand(slot, &value, window),
        }
    }

    fn expand(&mut self, slot: usize, value: &DebugValue, window: Window) -> VariablesOutcome {
        let classification = self.classify(value);
        let provider = self.provider(&classification);
        let outcomes = match self.arena.handle_mut(slot) {
            Some(handle) => {
                let mut invoker =
                    Invoker::new(&self.engine, self.options.budget, &mut self.diagnostics);
                children::enumerate(
                    handle,
                    classification.kind,
                    &provider,
                    window,
                    self.options.max_named_children,
                    &mut invoker,
                )
            }
            None => Vec::new(),
        };

        let mut failed = 0;
        let variables = outcomes
            .into_iter()
            .map(|outcome| match outcome {
                ChildOutcome::Child(child) => self.describe(&child),
                ChildOutcome::Failed { index, error } => {
                    warn!(value = %value.name, index, %error, "child unavailable");
                    failed += 1;
                    VariableDescriptor::placeholder(index, &error)
                }
            })
            .collect();

        let diagnostic = (failed > 0)
            .then(|| format!("{} requested children of '{}' failed", failed, value.name));
        VariablesOutcome {
            variables,
            diagnostic,
        }
    }

    /// Classify `value`, from the stop cache when possible.
    pub fn classify(&mut self, value: &DebugValue) -> Classification {
        self.fresh = false;
        let mut invoker = Invoker::new(&self.engine, self.options.budget, &mut self.diagnostics);
        self.inspector.classify(value, &self.registry, &mut invoker)
    }

    /// Classify `value` and build its descriptor, allocating a handle if it
    /// is expandable.
    pub fn describe(&mut self, value: &DebugValue) -> VariableDescriptor {
        let classification = self.classify(value);
        let summary = if classification.formatter.is_native() {
            None
        } else {
            let mut invoker =
                Invoker::new(&self.engine, self.options.budget, &mut self.diagnostics);
            invoker.summary(&classification.formatter, value)
        };
        ResponseBuilder::new(&mut self.arena).describe(value, &classification, summary)
    }

    /// Evaluate `expression` in `frame`. A leading backtick runs a console
    /// command; anything else is a path `name(.field|[index])*`.
    pub fn evaluate(
        &mut self,
        frame: FrameId,
        expression: &str,
    ) -> Result<EvaluateOutcome, InspectError> {
        let expression = expression.trim();
        if expression.starts_with(CONSOLE_PREFIX) {
            let output = console::run(expression, &mut self.registry, &mut self.diagnostics);
            return Ok(EvaluateOutcome::Console(output));
        }

        let (root, path) = parse_path(expression)?;
        let mut current = self
            .engine
            .locals(frame)?
            .into_iter()
            .find(|local| local.name == root)
            .ok_or_else(|| InspectError::UnknownVariable {
                name: root.clone(),
                frame,
            })?;

        let mut walked = root;
        for key in path {
            let classification = self.classify(&current);
            let provider = self.provider(&classification);
            let mut invoker =
                Invoker::new(&self.engine, self.options.budget, &mut self.diagnostics);
            current = invoker
                .materialize(&provider, &current, &key)?
                .ok_or_else(|| InspectError::NoSuchChild {
                    path: walked.clone(),
                    key: key.to_string(),
                })?;
            match &key {
                ChildKey::Index(_) => walked.push_str(&key.to_string()),
                ChildKey::Name(name) => {
                    walked.push('.');
                    walked.push_str(name);
                }
            }
        }

        Ok(EvaluateOutcome::Value(self.describe(&current)))
    }

    /// The formatter that supplies children for a classified value. Values
    /// without declared children fall back to native introspection.
    fn provider(&self, classification: &Classification) -> ResolvedFormatter {
        match classification.kind {
            ChildrenKind::None => self.registry.native(),
            ChildrenKind::Indexed(_) | ChildrenKind::Named => classification.formatter.clone(),
        }
    }
}

/// Split `name(.field|[index])*` into the root name and its child keys.
fn parse_path(expression: &str) -> Result<(String, Vec<ChildKey>), InspectError> {
    let invalid = || InspectError::InvalidExpression(expression.to_string());
    let is_ident = |c: char| c.is_alphanumeric() || c == '_' || c == '$';

    let root_end = expression.find(|c: char| !is_ident(c)).unwrap_or(expression.len());
    let root = &expression[..root_end];
    if root.is_empty() {
        return Err(invalid());
    }

    let mut keys = Vec::new();
    let mut rest = &expression[root_end..];
    while let Some(first) = rest.chars().next() {
        match first {
            '.' => {
                let body = &rest[1..];
                let end = body.find(|c: char| !is_ident(c)).unwrap_or(body.len());
                if end == 0 {
                    return Err(invalid());
                }
                keys.push(ChildKey::Name(body[..end].to_string()));
                rest = &body[end..];
            }
            '[' => {
                let close = rest.find(']').ok_or_else(invalid)?;
                let index = rest[1..close].trim().parse::<usize>().map_err(|_| invalid())?;
                keys.push(ChildKey::Index(index));
                rest = &rest[close + 1..];
            }
            _ => return Err(invalid()),
        }
    }
    Ok((root.to_string(), keys))
}
