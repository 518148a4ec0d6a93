//! The native debugging engine seam.
//!
//! Process control, memory access and symbol resolution live behind
//! [`NativeEngine`]. The inspection layers only ask it for frames, locals and
//! the default (non-formatter) children of a value.

use crate::values::{ChildKey, DebugValue, ValueId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Index of a stack frame, most recent first.
pub type FrameId = usize;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("debuggee is not stopped")]
    NotStopped,
    #[error("unknown frame: {0}")]
    UnknownFrame(FrameId),
    #[error("unknown value: {0:?}")]
    UnknownValue(ValueId),
    #[error("invalid snapshot: {0}")]
    Snapshot(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub id: FrameId,
    pub name: String,
}

/// Why the debuggee halted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    Entry,
    #[default]
    Breakpoint,
    Step,
    Pause,
    Exception,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Entry => "entry",
            StopReason::Breakpoint => "breakpoint",
            StopReason::Step => "step",
            StopReason::Pause => "pause",
            StopReason::Exception => "exception",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeKind {
    Continue,
    StepOver,
    StepIn,
    StepOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Stopped(StopReason),
    Exited,
}

/// Access to the stopped debuggee.
///
/// Implementations are shared behind `Arc` so that a formatter call bounded
/// by a timeout can run on a helper thread; hence `Send + Sync` and `&self`
/// receivers throughout.
pub trait NativeEngine: Send + Sync {
    fn state(&self) -> ExecutionState;

    fn frames(&self) -> Result<Vec<FrameInfo>, EngineError>;

    fn locals(&self, frame: FrameId) -> Result<Vec<DebugValue>, EngineError>;

    /// Number of native children. Cheap for every [`crate::TypeKind`].
    fn child_count(&self, value: &DebugValue) -> Result<usize, EngineError>;

    /// Fetch one native child. `Ok(None)` when `key` is past the end or names
    /// no member.
    fn child(&self, value: &DebugValue, key: &ChildKey) -> Result<Option<DebugValue>, EngineError>;

    /// Let the debuggee run until the next stop (or exit).
    fn resume(&self, kind: ResumeKind) -> Result<ExecutionState, EngineError>;
}
