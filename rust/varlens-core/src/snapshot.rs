//! Snapshot engine: replays recorded stop events.
//!
//! A snapshot is a JSON document listing the stops a debuggee went through,
//! each with its frames and the value trees of their locals. Every resume
//! request advances to the next recorded stop; running past the last one
//! exits the debuggee.
//!
//! ```json
//! { "stops": [ { "reason": "breakpoint", "frames": [
//!     { "name": "main", "locals": [
//!         { "name": "v", "type": "Vec<int>", "value": "size=1", "kind": "struct",
//!           "children": [ { "name": "len", "type": "int", "value": "1" } ] } ] } ] } ] }
//! ```

use crate::engine::{
    EngineError, ExecutionState, FrameId, FrameInfo, NativeEngine, ResumeKind, StopReason,
};
use crate::values::{ChildKey, DebugValue, TypeDescriptor, ValueId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

// ---------------------------------------------------------------------------
// Serialized form
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub stops: Vec<RecordedStop>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedStop {
    #[serde(default)]
    pub reason: StopReason,
    #[serde(default)]
    pub frames: Vec<RecordedFrame>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub name: String,
    #[serde(default)]
    pub locals: Vec<ValueNode>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[default]
    Scalar,
    Struct,
    Array,
    Pointer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueNode {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub children: Vec<ValueNode>,
}

impl ValueNode {
    pub fn scalar(name: &str, type_name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            value: value.to_string(),
            kind: NodeKind::Scalar,
            children: Vec::new(),
        }
    }

    pub fn structure(name: &str, type_name: &str, value: &str, children: Vec<ValueNode>) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            value: value.to_string(),
            kind: NodeKind::Struct,
            children,
        }
    }

    pub fn array(name: &str, type_name: &str, value: &str, children: Vec<ValueNode>) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            value: value.to_string(),
            kind: NodeKind::Array,
            children,
        }
    }

    fn descriptor(&self) -> TypeDescriptor {
        match self.kind {
            NodeKind::Scalar => TypeDescriptor::scalar(&self.type_name),
            NodeKind::Pointer => TypeDescriptor::pointer(&self.type_name),
            NodeKind::Struct => TypeDescriptor::structure(
                &self.type_name,
                self.children.iter().map(|c| c.name.clone()).collect(),
            ),
            NodeKind::Array => TypeDescriptor::array(&self.type_name, self.children.len()),
        }
    }
}

// ---------------------------------------------------------------------------
// Indexed form
// ---------------------------------------------------------------------------

struct IndexedNode {
    value: DebugValue,
    children: Vec<ValueId>,
}

#[derive(Default)]
struct IndexedStop {
    reason: StopReason,
    frames: Vec<(String, Vec<ValueId>)>,
    nodes: HashMap<ValueId, IndexedNode>,
}

impl IndexedStop {
    fn build(stop: &RecordedStop) -> Self {
        let mut indexed = IndexedStop {
            reason: stop.reason,
            ..Default::default()
        };
        for (frame_idx, frame) in stop.frames.iter().enumerate() {
            let mut locals = Vec::with_capacity(frame.locals.len());
            for (slot, node) in frame.locals.iter().enumerate() {
                let id = ValueId::local(frame_idx, slot);
                indexed.insert(id, node);
                locals.push(id);
            }
            indexed.frames.push((frame.name.clone(), locals));
        }
        indexed
    }

    fn insert(&mut self, id: ValueId, node: &ValueNode) {
        let value = DebugValue::new(id, &node.name, node.descriptor(), &node.value);
        let mut children = Vec::new();
        // Scalars have no children concept even if the recording lists some.
        if node.kind != NodeKind::Scalar {
            for (i, child) in node.children.iter().enumerate() {
                let child_id = id.child(&ChildKey::Index(i));
                self.insert(child_id, child);
                children.push(child_id);
            }
        }
        self.nodes.insert(id, IndexedNode { value, children });
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A [`NativeEngine`] over a recorded [`Snapshot`].
pub struct SnapshotEngine {
    stops: Vec<IndexedStop>,
    cursor: AtomicUsize,
}

impl SnapshotEngine {
    pub fn new(snapshot: &Snapshot) -> Self {
        Self {
            stops: snapshot.stops.iter().map(IndexedStop::build).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self, EngineError> {
        let snapshot: Snapshot = serde_json::from_str(s)?;
        if snapshot.stops.is_empty() {
            return Err(EngineError::Snapshot("no recorded stops".to_string()));
        }
        Ok(Self::new(&snapshot))
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Jump directly to a recorded stop (used by `varlens inspect --stop`).
    pub fn seek(&self, index: usize) -> Result<(), EngineError> {
        if index >= self.stops.len() {
            return Err(EngineError::Snapshot(format!(
                "stop {} out of range ({} recorded)",
                index,
                self.stops.len()
            )));
        }
        self.cursor.store(index, Ordering::SeqCst);
        Ok(())
    }

    fn current(&self) -> Result<&IndexedStop, EngineError> {
        self.stops
            .get(self.cursor.load(Ordering::SeqCst))
            .ok_or(EngineError::NotStopped)
    }

    fn node(&self, id: ValueId) -> Result<&IndexedNode, EngineError> {
        self.current()?
            .nodes
            .get(&id)
            .ok_or(EngineError::UnknownValue(id))
    }
}

impl NativeEngine for SnapshotEngine {
    fn state(&self) -> ExecutionState {
        match self.current() {
            Ok(stop) => ExecutionState::Stopped(stop.reason),
            Err(_) => ExecutionState::Exited,
        }
    }

    fn frames(&self) -> Result<Vec<FrameInfo>, EngineError> {
        Ok(self
            .current()?
            .frames
            .iter()
            .enumerate()
            .map(|(id, (name, _))| FrameInfo {
                id,
                name: name.clone(),
            })
            .collect())
    }

    fn locals(&self, frame: FrameId) -> Result<Vec<DebugValue>, EngineError> {
        let stop = self.current()?;
        let (_, ids) = stop.frames.get(frame).ok_or(EngineError::UnknownFrame(frame))?;
        ids.iter()
            .map(|id| {
                stop.nodes
                    .get(id)
                    .map(|n| n.value.clone())
                    .ok_or(EngineError::UnknownValue(*id))
            })
            .collect()
    }

    fn child_count(&self, value: &DebugValue) -> Result<usize, EngineError> {
        Ok(self.node(value.id)?.children.len())
    }

    fn child(&self, value: &DebugValue, key: &ChildKey) -> Result<Option<DebugValue>, EngineError> {
        let stop = self.current()?;
        let node = self.node(value.id)?;
        let child = match key {
            ChildKey::Index(i) => node.children.get(*i).and_then(|id| stop.nodes.get(id)),
            ChildKey::Name(name) => node
                .children
                .iter()
                .filter_map(|id| stop.nodes.get(id))
                .find(|c| c.value.name == *name),
        };
        Ok(child.map(|c| c.value.clone()))
    }

    fn resume(&self, _kind: ResumeKind) -> Result<ExecutionState, EngineError> {
        if self.current().is_err() {
            return Err(EngineError::NotStopped);
        }
        self.cursor.fetch_add(1, Ordering::SeqCst);
        Ok(self.state())
    }
}
