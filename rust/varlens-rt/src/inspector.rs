//! Value classification.
//!
//! [`ValueInspector::classify`] decides whether a value exposes indexed
//! children, named children or none, consulting the formatter's declared
//! capabilities before calling anything. Only the indexed path calls the
//! formatter at all, and then only its size query, exactly once per value
//! per stop. Results are cached until [`ValueInspector::invalidate`].

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};
use varlens_core::{DebugValue, ValueId};

use crate::formatters::{FormatterRegistry, Invoker, ResolvedFormatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChildrenKind {
    Indexed(usize),
    Named,
    None,
}

/// A cached classification together with the formatter that produced it.
#[derive(Debug, Clone)]
pub struct Classification {
    pub kind: ChildrenKind,
    pub formatter: ResolvedFormatter,
}

#[derive(Debug, Default)]
pub struct ValueInspector {
    cache: HashMap<ValueId, Classification>,
}

impl ValueInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(
        &mut self,
        value: &DebugValue,
        registry: &FormatterRegistry,
        invoker: &mut Invoker<'_>,
    ) -> Classification {
        if let Some(cached) = self.cache.get(&value.id) {
            return cached.clone();
        }

        let formatter = registry.resolve(&value.ty);
        let caps = formatter.formatter.capabilities(&value.ty);
        let kind = if caps.is_indexed() {
            match invoker.size(&formatter, value) {
                Ok(count) => ChildrenKind::Indexed(count),
                Err(err) => {
                    warn!(
                        value = %value.name,
                        formatter = formatter.source.name(),
                        %err,
                        "size query failed, treating children as named"
                    );
                    ChildrenKind::Named
                }
            }
        } else if caps.provides_named_children {
            ChildrenKind::Named
        } else {
            ChildrenKind::None
        };

        debug!(
            value = %value.name,
            ty = %value.ty.name,
            formatter = formatter.source.name(),
            ?kind,
            "classified"
        );
        let classification = Classification { kind, formatter };
        self.cache.insert(value.id, classification.clone());
        classification
    }

    pub fn cached(&self, id: ValueId) -> Option<&Classification> {
        self.cache.get(&id)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drop every cached classification. Called on resume.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatters::{
        CallBudget, Capabilities, DeclarativeFormatter, Formatter, FormatterDiagnostics,
        FormatterError, TypePattern,
    };
    use std::sync::Arc;
    use varlens_core::snapshot::{RecordedFrame, RecordedStop, Snapshot, SnapshotEngine, ValueNode};
    use varlens_core::{ChildKey, NativeEngine, TypeDescriptor};

    struct FailingSize;

    impl Formatter for FailingSize {
        fn capabilities(&self, _ty: &TypeDescriptor) -> Capabilities {
            Capabilities::INDEXED
        }

        fn size(
            &self,
            _value: &DebugValue,
            _engine: &dyn NativeEngine,
        ) -> Result<usize, FormatterError> {
            Err(FormatterError::Size("script raised".into()))
        }

        fn materialize_child(
            &self,
            _value: &DebugValue,
            _key: &ChildKey,
            _engine: &dyn NativeEngine,
        ) -> Result<Option<DebugValue>, FormatterError> {
            Ok(None)
        }
    }

    fn engine() -> Arc<dyn NativeEngine> {
        let snapshot = Snapshot {
            stops: vec![RecordedStop {
                reason: Default::default(),
                frames: vec![RecordedFrame {
                    name: "main".into(),
                    locals: vec![
                        ValueNode::structure(
                            "v",
                            "Vec<int>",
                            "",
                            vec![ValueNode::scalar("[0]", "int", "1")],
                        ),
                        ValueNode::scalar("n", "int", "5"),
                        ValueNode::array("a", "int[0]", "", vec![]),
                    ],
                }],
            }],
        };
        Arc::new(SnapshotEngine::new(&snapshot))
    }

    #[test]
    fn indexed_queries_size_once() {
        let engine = engine();
        let mut registry = FormatterRegistry::new();
        registry.register(
            "vec",
            TypePattern::exact("Vec<int>"),
            Arc::new(DeclarativeFormatter::new(Capabilities::INDEXED, Some(1), None)),
        );
        let mut diagnostics = FormatterDiagnostics::new();
        let mut inspector = ValueInspector::new();
        let v = engine.locals(0).unwrap().remove(0);

        for _ in 0..3 {
            let mut invoker = Invoker::new(&engine, CallBudget::unbounded(), &mut diagnostics);
            let c = inspector.classify(&v, &registry, &mut invoker);
            assert_eq!(c.kind, ChildrenKind::Indexed(1));
        }
        assert_eq!(diagnostics.size_calls("vec"), 1);
        assert_eq!(diagnostics.materialize_calls("vec"), 0);
    }

    #[test]
    fn named_never_queries_size() {
        let engine = engine();
        let mut registry = FormatterRegistry::new();
        registry.register(
            "vec",
            TypePattern::exact("Vec<int>"),
            Arc::new(DeclarativeFormatter::new(Capabilities::NAMED, Some(1), None)),
        );
        let mut diagnostics = FormatterDiagnostics::new();
        let mut inspector = ValueInspector::new();
        let v = engine.locals(0).unwrap().remove(0);

        let mut invoker = Invoker::new(&engine, CallBudget::unbounded(), &mut diagnostics);
        assert_eq!(inspector.classify(&v, &registry, &mut invoker).kind, ChildrenKind::Named);
        assert_eq!(diagnostics.size_calls("vec"), 0);
    }

    #[test]
    fn native_fallback_kinds() {
        let engine = engine();
        let registry = FormatterRegistry::new();
        let mut diagnostics = FormatterDiagnostics::new();
        let mut inspector = ValueInspector::new();
        let locals = engine.locals(0).unwrap();

        let mut invoker = Invoker::new(&engine, CallBudget::unbounded(), &mut diagnostics);
        assert_eq!(
            inspector.classify(&locals[0], &registry, &mut invoker).kind,
            ChildrenKind::Named
        );
        assert_eq!(
            inspector.classify(&locals[1], &registry, &mut invoker).kind,
            ChildrenKind::None
        );
        assert_eq!(
            inspector.classify(&locals[2], &registry, &mut invoker).kind,
            ChildrenKind::Indexed(0)
        );
    }

    #[test]
    fn size_error_degrades_to_named() {
        let engine = engine();
        let mut registry = FormatterRegistry::new();
        registry.register("bad", TypePattern::regex("^Vec").unwrap(), Arc::new(FailingSize));
        let mut diagnostics = FormatterDiagnostics::new();
        let mut inspector = ValueInspector::new();
        let v = engine.locals(0).unwrap().remove(0);

        let mut invoker = Invoker::new(&engine, CallBudget::unbounded(), &mut diagnostics);
        let c = inspector.classify(&v, &registry, &mut invoker);
        assert_eq!(c.kind, ChildrenKind::Named);
        assert_eq!(c.formatter.source.name(), "bad");
        assert_eq!(diagnostics.size_calls("bad"), 1);
    }

    #[test]
    fn invalidate_forces_requery() {
        let engine = engine();
        let mut registry = FormatterRegistry::new();
        registry.register(
            "vec",
            TypePattern::exact("Vec<int>"),
            Arc::new(DeclarativeFormatter::new(Capabilities::INDEXED, Some(1), None)),
        );
        let mut diagnostics = FormatterDiagnostics::new();
        let mut inspector = ValueInspector::new();
        let v = engine.locals(0).unwrap().remove(0);

        {
            let mut invoker = Invoker::new(&engine, CallBudget::unbounded(), &mut diagnostics);
            inspector.classify(&v, &registry, &mut invoker);
        }
        assert!(inspector.cached(v.id).is_some());
        inspector.invalidate();
        assert!(inspector.is_empty());
        {
            let mut invoker = Invoker::new(&engine, CallBudget::unbounded(), &mut diagnostics);
            inspector.classify(&v, &registry, &mut invoker);
        }
        assert_eq!(diagnostics.size_calls("vec"), 2);
    }
}
