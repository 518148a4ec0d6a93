//! Core data model for varlens.
//!
//! Defines the debugger value model, the [`engine::NativeEngine`] seam the
//! inspection layers consume, and a [`snapshot::SnapshotEngine`] that replays
//! recorded stop events.

pub mod engine;
pub mod snapshot;
pub mod values;

pub use engine::{
    EngineError, ExecutionState, FrameId, FrameInfo, NativeEngine, ResumeKind, StopReason,
};
pub use values::{ChildKey, DebugValue, TypeDescriptor, TypeKind, ValueId};
