//! Built-in native introspection, used when no formatter is registered.

use varlens_core::{ChildKey, DebugValue, NativeEngine, TypeDescriptor, TypeKind};

use super::{Capabilities, Formatter, FormatterError};

/// Treats structs and pointers as named children and native arrays as a
/// known container with indexed children. Scalars have no children.
#[derive(Debug, Default)]
pub struct NativeFormatter;

impl Formatter for NativeFormatter {
    fn capabilities(&self, ty: &TypeDescriptor) -> Capabilities {
        match ty.kind {
            TypeKind::Scalar => Capabilities::NONE,
            TypeKind::Pointer | TypeKind::Struct { .. } => Capabilities::NAMED,
            TypeKind::Array { .. } => Capabilities::INDEXED,
        }
    }

    fn size(&self, value: &DebugValue, engine: &dyn NativeEngine) -> Result<usize, FormatterError> {
        match value.ty.kind {
            // The length is part of the type.
            TypeKind::Array { len } => Ok(len),
            _ => engine
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
        engine
            .child(value, key)
            .map_err(|e| FormatterError::Materialize {
                key: key.to_string(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_follow_type_kind() {
        let native = NativeFormatter;
        assert_eq!(
            native.capabilities(&TypeDescriptor::scalar("int")),
            Capabilities::NONE
        );
        assert_eq!(
            native.capabilities(&TypeDescriptor::pointer("int *")),
            Capabilities::NAMED
        );
        assert_eq!(
            native.capabilities(&TypeDescriptor::structure("Point", vec!["x".into()])),
            Capabilities::NAMED
        );
        assert_eq!(
            native.capabilities(&TypeDescriptor::array("int[4]", 4)),
            Capabilities::INDEXED
        );
    }
}
