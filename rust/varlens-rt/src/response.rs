//! Protocol-facing variable descriptors.
//!
//! [`ResponseBuilder`] turns a classified value into a [`VariableDescriptor`]
//! using only metadata that is already known. It never asks a formatter for
//! children: `indexedVariables` comes from the classification and
//! `namedVariables` only from facts that cost nothing to read.

use serde::{Deserialize, Serialize};
use varlens_core::{ChildKey, DebugValue};

use crate::children::HandleArena;
use crate::formatters::FormatterError;
use crate::inspector::{ChildrenKind, Classification};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDescriptor {
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub variables_reference: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_variables: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub named_variables: Option<usize>,
}

impl VariableDescriptor {
    /// Stand-in for a child that failed to materialize.
    pub fn placeholder(index: usize, error: &FormatterError) -> Self {
        Self {
            name: ChildKey::Index(index).to_string(),
            value: format!("<error: {}>", error),
            type_name: String::new(),
            variables_reference: 0,
            indexed_variables: None,
            named_variables: None,
        }
    }
}

pub struct ResponseBuilder<'a> {
    arena: &'a mut HandleArena,
}

impl<'a> ResponseBuilder<'a> {
    pub fn new(arena: &'a mut HandleArena) -> Self {
        Self { arena }
    }

    /// `summary` is the formatter's rendering, if it offered one.
    pub fn describe(
        &mut self,
        value: &DebugValue,
        classification: &Classification,
        summary: Option<String>,
    ) -> VariableDescriptor {
        let kind = classification.kind;
        let variables_reference = if is_expandable(value, classification) {
            let slot = self.arena.slot_for(value);
            if let Some(handle) = self.arena.handle_mut(slot) {
                handle.mark_classified(kind);
            }
            self.arena.reference(slot)
        } else {
            0
        };

        let indexed_variables = match kind {
            ChildrenKind::Indexed(n) => Some(n),
            ChildrenKind::Named | ChildrenKind::None => None,
        };
        let named_variables = match kind {
            ChildrenKind::Indexed(_) => None,
            ChildrenKind::Named | ChildrenKind::None => {
                self.cheap_named_count(value, classification)
            }
        };

        VariableDescriptor {
            name: value.name.clone(),
            value: summary.unwrap_or_else(|| value.summary.clone()),
            type_name: value.ty.name.clone(),
            variables_reference,
            indexed_variables,
            named_variables,
        }
    }

    fn cheap_named_count(
        &self,
        value: &DebugValue,
        classification: &Classification,
    ) -> Option<usize> {
        let enumerated = self
            .arena
            .slot_of(value.id)
            .and_then(|slot| self.arena.handle(slot))
            .and_then(|handle| handle.known_named_count());
        if enumerated.is_some() {
            return enumerated;
        }
        // A user formatter may synthesize members the type does not declare.
        if classification.formatter.is_native() {
            value.ty.static_field_count()
        } else {
            None
        }
    }
}

/// Whether a client should be offered a handle for `value`.
pub fn is_expandable(value: &DebugValue, classification: &Classification) -> bool {
    match classification.kind {
        ChildrenKind::Indexed(n) => n > 0,
        ChildrenKind::Named => {
            !classification.formatter.is_native() || value.ty.kind.may_have_children()
        }
        ChildrenKind::None => value.ty.kind.may_have_children(),
    }
}
