//! Children enumeration protocol.
//!
//! Every `variablesReference` handed to a client names a [`ChildrenHandle`]
//! in the [`HandleArena`]. Handles are created lazily while describing
//! values and move through
//!
//! ```text
//! Unresolved -> SizeKnown(kind) -> FullyEnumerated { kind, Partial | Complete }
//! ```
//!
//! The last transition only happens on an explicit expand request for a
//! window `[start, start + count)`; describing a value never enumerates it.
//!
//! References encode the stop generation in their upper bits. Resuming bumps
//! the generation and drops every handle at once, so a reference from an
//! earlier stop decodes to nothing instead of aliasing a new handle.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};
use varlens_core::{ChildKey, DebugValue, FrameId, ValueId};

use crate::error::InspectError;
use crate::formatters::{FormatterError, Invoker, ResolvedFormatter};
use crate::inspector::ChildrenKind;

// ---------------------------------------------------------------------------
// Reference encoding
// ---------------------------------------------------------------------------

/// Low bits: slot + 1. High bits: generation. Stays below 2^31 because many
/// clients store references as 32-bit integers.
const SLOT_BITS: u32 = 20;
const SLOT_MASK: i64 = (1 << SLOT_BITS) - 1;
const GENERATION_BITS: u32 = 11;
const GENERATION_MASK: u32 = (1 << GENERATION_BITS) - 1;

fn encode(generation: u32, slot: usize) -> Option<i64> {
    let tagged = slot as i64 + 1;
    if tagged > SLOT_MASK {
        return None;
    }
    Some((((generation & GENERATION_MASK) as i64) << SLOT_BITS) | tagged)
}

fn decode(reference: i64) -> Option<(u32, usize)> {
    if reference <= 0 {
        return None;
    }
    let tagged = reference & SLOT_MASK;
    if tagged == 0 {
        return None;
    }
    let generation = (reference >> SLOT_BITS) as u32;
    Some((generation, (tagged - 1) as usize))
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleTarget {
    /// The locals of a frame (a scope).
    Locals(FrameId),
    Value(DebugValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    Partial,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Unresolved,
    SizeKnown(ChildrenKind),
    FullyEnumerated { kind: ChildrenKind, coverage: Coverage },
}

#[derive(Debug)]
pub struct ChildrenHandle {
    pub target: HandleTarget,
    state: HandleState,
    /// Child indices materialized so far.
    fetched: BTreeSet<usize>,
    /// Materialized children, reused by later windows.
    children: HashMap<usize, DebugValue>,
    /// Set once named enumeration ran off the end: the child count.
    named_end: Option<usize>,
}

impl ChildrenHandle {
    fn new(target: HandleTarget) -> Self {
        Self {
            target,
            state: HandleState::Unresolved,
            fetched: BTreeSet::new(),
            children: HashMap::new(),
            named_end: None,
        }
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    /// Record the classification. Only moves an unresolved handle forward.
    pub fn mark_classified(&mut self, kind: ChildrenKind) {
        if self.state == HandleState::Unresolved {
            self.state = HandleState::SizeKnown(kind);
        }
    }

    /// Named child count, known only once enumeration has seen every child.
    pub fn known_named_count(&self) -> Option<usize> {
        match self.state {
            HandleState::FullyEnumerated {
                kind: ChildrenKind::Named | ChildrenKind::None,
                coverage: Coverage::Complete,
            } => self.named_end,
            _ => None,
        }
    }

    fn record_window(&mut self, kind: ChildrenKind) {
        let complete = match kind {
            ChildrenKind::Indexed(n) => self.fetched.range(..n).count() >= n,
            ChildrenKind::Named | ChildrenKind::None => match self.named_end {
                Some(end) => self.fetched.range(..end).count() >= end,
                None => false,
            },
        };
        self.state = HandleState::FullyEnumerated {
            kind,
            coverage: if complete {
                Coverage::Complete
            } else {
                Coverage::Partial
            },
        };
    }
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct HandleArena {
    generation: u32,
    entries: Vec<ChildrenHandle>,
    by_value: HashMap<ValueId, usize>,
    by_frame: HashMap<FrameId, usize>,
}

impl Default for HandleArena {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleArena {
    pub fn new() -> Self {
        Self {
            generation: 1,
            entries: Vec::new(),
            by_value: HashMap::new(),
            by_frame: HashMap::new(),
        }
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reference for the locals of `frame`, created on first use.
    pub fn locals(&mut self, frame: FrameId) -> i64 {
        let slot = match self.by_frame.get(&frame) {
            Some(slot) => *slot,
            None => {
                let slot = self.push(HandleTarget::Locals(frame));
                self.by_frame.insert(frame, slot);
                slot
            }
        };
        self.reference(slot)
    }

    /// Slot for `value`, created on first use. The same value keeps one
    /// handle for the whole stop.
    pub fn slot_for(&mut self, value: &DebugValue) -> usize {
        if let Some(slot) = self.by_value.get(&value.id) {
            return *slot;
        }
        let slot = self.push(HandleTarget::Value(value.clone()));
        self.by_value.insert(value.id, slot);
        slot
    }

    pub fn slot_of(&self, id: ValueId) -> Option<usize> {
        self.by_value.get(&id).copied()
    }

    /// Encoded reference for `slot`, or 0 when the arena is full.
    pub fn reference(&self, slot: usize) -> i64 {
        match encode(self.generation, slot) {
            Some(reference) => reference,
            None => {
                warn!(slot, "handle arena full, value will not be expandable");
                0
            }
        }
    }

    pub fn resolve(&self, reference: i64) -> Result<usize, InspectError> {
        match decode(reference) {
            Some((generation, slot))
                if generation == self.generation & GENERATION_MASK && slot < self.entries.len() =>
            {
                Ok(slot)
            }
            _ => Err(InspectError::UnknownHandle(reference)),
        }
    }

    pub fn handle(&self, slot: usize) -> Option<&ChildrenHandle> {
        self.entries.get(slot)
    }

    pub fn handle_mut(&mut self, slot: usize) -> Option<&mut ChildrenHandle> {
        self.entries.get_mut(slot)
    }

    /// Drop every handle and start a new generation.
    pub fn invalidate(&mut self) {
        debug!(generation = self.generation, handles = self.entries.len(), "invalidating handles");
        self.generation = (self.generation + 1) & GENERATION_MASK;
        if self.generation == 0 {
            self.generation = 1;
        }
        self.entries.clear();
        self.by_value.clear();
        self.by_frame.clear();
    }

    fn push(&mut self, target: HandleTarget) -> usize {
        self.entries.push(ChildrenHandle::new(target));
        self.entries.len() - 1
    }
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

/// A requested window of children: `[start, start + count)`. A missing or
/// zero count means "to the end".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub count: Option<usize>,
}

impl Window {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(start: usize, count: usize) -> Self {
        Self {
            start,
            count: Some(count),
        }
    }

    /// From protocol arguments, where negative values mean absent.
    pub fn from_protocol(start: Option<i64>, count: Option<i64>) -> Self {
        Self {
            start: start.filter(|s| *s > 0).map(|s| s as usize).unwrap_or(0),
            count: count.filter(|c| *c > 0).map(|c| c as usize),
        }
    }

    /// Clamp to `len` items.
    pub fn range(&self, len: usize) -> std::ops::Range<usize> {
        let start = self.start.min(len);
        let end = match self.count {
            Some(count) => start.saturating_add(count).min(len),
            None => len,
        };
        start..end
    }
}

/// Result of materializing one child of a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildOutcome {
    Child(DebugValue),
    Failed { index: usize, error: FormatterError },
}

/// Materialize the children of `handle` inside `window`.
///
/// `provider` is the formatter that supplies children: the classifying
/// formatter, or native introspection for values classified as `None`.
/// Previously materialized children are reused without calling it again.
/// Named enumeration without a count stops after `max_named` children.
pub fn enumerate(
    handle: &mut ChildrenHandle,
    kind: ChildrenKind,
    provider: &ResolvedFormatter,
    window: Window,
    max_named: usize,
    invoker: &mut Invoker<'_>,
) -> Vec<ChildOutcome> {
    let value = match &handle.target {
        HandleTarget::Value(value) => value.clone(),
        HandleTarget::Locals(_) => return Vec::new(),
    };
    handle.mark_classified(kind);

    let mut outcomes = Vec::new();
    match kind {
        ChildrenKind::Indexed(n) => {
            for index in window.range(n) {
                match fetch(handle, &value, index, provider, invoker) {
                    Ok(Some(child)) => outcomes.push(ChildOutcome::Child(child)),
                    Ok(None) => outcomes.push(ChildOutcome::Failed {
                        index,
                        error: FormatterError::Materialize {
                            key: ChildKey::Index(index).to_string(),
                            message: format!(
                                "formatter reported {} children but returned none here",
                                n
                            ),
                        },
                    }),
                    Err(error) => outcomes.push(ChildOutcome::Failed { index, error }),
                }
            }
        }
        ChildrenKind::Named | ChildrenKind::None => {
            let limit = window.count.unwrap_or(max_named);
            let end = window.start.saturating_add(limit);
            for index in window.start..end {
                if handle.named_end.is_some_and(|e| index >= e) {
                    break;
                }
                match fetch(handle, &value, index, provider, invoker) {
                    Ok(Some(child)) => outcomes.push(ChildOutcome::Child(child)),
                    Ok(None) => {
                        handle.named_end = Some(index);
                        break;
                    }
                    Err(error) => outcomes.push(ChildOutcome::Failed { index, error }),
                }
            }
        }
    }

    handle.record_window(kind);
    debug!(
        value = %value.name,
        ?window,
        served = outcomes.len(),
        state = ?handle.state,
        "enumerated children"
    );
    outcomes
}

fn fetch(
    handle: &mut ChildrenHandle,
    value: &DebugValue,
    index: usize,
    provider: &ResolvedFormatter,
    invoker: &mut Invoker<'_>,
) -> Result<Option<DebugValue>, FormatterError> {
    if let Some(child) = handle.children.get(&index) {
        return Ok(Some(child.clone()));
    }
    let child = invoker.materialize(provider, value, &ChildKey::Index(index))?;
    if let Some(child) = &child {
        handle.fetched.insert(index);
        handle.children.insert(index, child.clone());
    }
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use varlens_core::TypeDescriptor;

    fn value(id: u64) -> DebugValue {
        DebugValue::new(ValueId(id), "v", TypeDescriptor::scalar("int"), "0")
    }

    #[test]
    fn references_round_trip_within_generation() {
        let mut arena = HandleArena::new();
        let slot = arena.slot_for(&value(1));
        let reference = arena.reference(slot);
        assert!(reference > 0);
        assert!(reference < i32::MAX as i64);
        assert_eq!(arena.resolve(reference).unwrap(), slot);
    }

    #[test]
    fn same_value_reuses_slot() {
        let mut arena = HandleArena::new();
        let a = arena.slot_for(&value(1));
        let b = arena.slot_for(&value(1));
        let c = arena.slot_for(&value(2));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(arena.locals(0), arena.locals(0));
    }

    #[test]
    fn invalidate_rejects_old_references() {
        let mut arena = HandleArena::new();
        let slot = arena.slot_for(&value(1));
        let old = arena.reference(slot);
        arena.invalidate();
        assert!(arena.is_empty());
        assert!(matches!(arena.resolve(old), Err(InspectError::UnknownHandle(r)) if r == old));

        // A new handle in the same slot gets a different reference.
        let slot = arena.slot_for(&value(1));
        let new = arena.reference(slot);
        assert_ne!(old, new);
        assert!(arena.resolve(old).is_err());
        assert!(arena.resolve(new).is_ok());
    }

    #[test]
    fn garbage_references_are_unknown() {
        let arena = HandleArena::new();
        assert!(arena.resolve(0).is_err());
        assert!(arena.resolve(-5).is_err());
        assert!(arena.resolve(1 << SLOT_BITS).is_err());
        assert!(arena.resolve(encode(1, 3).unwrap()).is_err());
    }

    #[test]
    fn generation_wraps_past_zero() {
        let mut arena = HandleArena::new();
        for _ in 0..GENERATION_MASK {
            arena.invalidate();
        }
        assert_eq!(arena.generation(), 1);
    }

    #[test]
    fn window_ranges() {
        assert_eq!(Window::all().range(5), 0..5);
        assert_eq!(Window::new(1, 2).range(5), 1..3);
        assert_eq!(Window::new(4, 10).range(5), 4..5);
        assert_eq!(Window::new(9, 1).range(5), 5..5);
        assert_eq!(Window::from_protocol(Some(2), Some(0)), Window { start: 2, count: None });
        assert_eq!(Window::from_protocol(Some(-1), Some(3)), Window::new(0, 3));
    }

    #[test]
    fn state_moves_forward_only() {
        let mut handle = ChildrenHandle::new(HandleTarget::Value(value(1)));
        assert_eq!(handle.state(), HandleState::Unresolved);
        handle.mark_classified(ChildrenKind::Named);
        assert_eq!(handle.state(), HandleState::SizeKnown(ChildrenKind::Named));
        handle.mark_classified(ChildrenKind::Indexed(3));
        assert_eq!(handle.state(), HandleState::SizeKnown(ChildrenKind::Named));
    }
}
