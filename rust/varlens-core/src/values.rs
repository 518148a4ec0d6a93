//! Debugger value model.
//!
//! A [`DebugValue`] is an opaque handle to a value living in the stopped
//! debuggee. It carries only what the engine can report cheaply: a stable
//! [`ValueId`], the variable name, a [`TypeDescriptor`] and a rendered
//! summary. Children are never stored on the value itself; they are fetched
//! on demand through the engine or a formatter.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Identity of a value within one stop event.
///
/// Ids are only meaningful while the debuggee stays stopped; after a resume
/// the same number may denote a different value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u64);

impl ValueId {
    /// Id of a frame-local variable, derived from its frame and slot.
    pub fn local(frame: usize, slot: usize) -> ValueId {
        let mut hasher = DefaultHasher::new();
        ("local", frame, slot).hash(&mut hasher);
        ValueId(hasher.finish())
    }

    /// Id of a child, derived from the parent id and the child key.
    ///
    /// Deterministic, so a formatter that synthesizes the same child twice
    /// during one stop produces the same id both times.
    pub fn child(self, key: &ChildKey) -> ValueId {
        let mut hasher = DefaultHasher::new();
        self.0.hash(&mut hasher);
        key.hash(&mut hasher);
        ValueId(hasher.finish())
    }
}

/// Address of a child: a position in the child sequence or a member name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChildKey {
    Index(usize),
    Name(String),
}

impl fmt::Display for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildKey::Index(i) => write!(f, "[{}]", i),
            ChildKey::Name(name) => write!(f, "{}", name),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What native introspection knows about a type's shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypeKind {
    /// No children concept (integers, floats, enums, ...).
    Scalar,
    /// A pointer or reference; its child is the pointee.
    Pointer,
    /// An aggregate with named members.
    Struct { fields: Vec<String> },
    /// A fixed-length native array. The length is part of the type.
    Array { len: usize },
}

impl TypeKind {
    /// Whether values of this kind may have at least one child.
    pub fn may_have_children(&self) -> bool {
        match self {
            TypeKind::Scalar => false,
            TypeKind::Pointer => true,
            TypeKind::Struct { fields } => !fields.is_empty(),
            TypeKind::Array { len } => *len > 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    pub kind: TypeKind,
}

impl TypeDescriptor {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Scalar,
        }
    }

    pub fn pointer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Pointer,
        }
    }

    pub fn structure(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Struct { fields },
        }
    }

    pub fn array(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Array { len },
        }
    }

    /// Member count known from the type alone, without touching the value.
    pub fn static_field_count(&self) -> Option<usize> {
        match &self.kind {
            TypeKind::Struct { fields } => Some(fields.len()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugValue {
    pub id: ValueId,
    pub name: String,
    pub ty: TypeDescriptor,
    /// Rendered value as the native engine prints it.
    pub summary: String,
}

impl DebugValue {
    pub fn new(
        id: ValueId,
        name: impl Into<String>,
        ty: TypeDescriptor,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            ty,
            summary: summary.into(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.ty.name
    }
}
