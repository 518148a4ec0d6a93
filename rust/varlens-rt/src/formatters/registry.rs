//! Formatter registry.
//!
//! Maps type patterns to formatters. Lookup tries every exact pattern before
//! any regex pattern; within each class the earliest registration wins.
//! Registrations may change at any time (the console can delete them), and
//! lookup always walks the live entry list.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tracing::debug;
use varlens_core::TypeDescriptor;

use super::native::NativeFormatter;
use super::{Formatter, FormatterSource, ResolvedFormatter};

#[derive(Debug, Clone)]
pub enum TypePattern {
    /// Matches one type name exactly.
    Exact(String),
    /// Matches any type name the expression finds a match in.
    Regex(Regex),
}

impl TypePattern {
    pub fn exact(name: impl Into<String>) -> Self {
        TypePattern::Exact(name.into())
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(TypePattern::Regex(Regex::new(pattern)?))
    }

    pub fn matches(&self, type_name: &str) -> bool {
        match self {
            TypePattern::Exact(name) => name == type_name,
            TypePattern::Regex(re) => re.is_match(type_name),
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, TypePattern::Exact(_))
    }
}

impl fmt::Display for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypePattern::Exact(name) => write!(f, "{}", name),
            TypePattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

#[derive(Clone)]
pub struct Registration {
    pub name: String,
    pub pattern: TypePattern,
    pub formatter: Arc<dyn Formatter>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .finish()
    }
}

pub struct FormatterRegistry {
    entries: Vec<Registration>,
    native: Arc<NativeFormatter>,
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatterRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            native: Arc::new(NativeFormatter),
        }
    }

    /// Register `formatter` under `name`. An existing registration with the
    /// same name is replaced in place (keeping its priority) and returned.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        pattern: TypePattern,
        formatter: Arc<dyn Formatter>,
    ) -> Option<Registration> {
        let registration = Registration {
            name: name.into(),
            pattern,
            formatter,
        };
        debug!(name = %registration.name, pattern = %registration.pattern, "registering formatter");
        match self.entries.iter_mut().find(|e| e.name == registration.name) {
            Some(existing) => Some(std::mem::replace(existing, registration)),
            None => {
                self.entries.push(registration);
                None
            }
        }
    }

    pub fn unregister(&mut self, name: &str) -> Option<Registration> {
        let pos = self.entries.iter().position(|e| e.name == name)?;
        debug!(name, "unregistering formatter");
        Some(self.entries.remove(pos))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.entries
    }

    /// The user formatter registered for `ty`, if any.
    pub fn lookup(&self, ty: &TypeDescriptor) -> Option<&Registration> {
        self.entries
            .iter()
            .find(|e| e.pattern.is_exact() && e.pattern.matches(&ty.name))
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|e| !e.pattern.is_exact() && e.pattern.matches(&ty.name))
            })
    }

    /// The formatter to use for `ty`: the registered one, else native
    /// introspection.
    pub fn resolve(&self, ty: &TypeDescriptor) -> ResolvedFormatter {
        match self.lookup(ty) {
            Some(reg) => ResolvedFormatter {
                source: FormatterSource::User(reg.name.clone()),
                formatter: Arc::clone(&reg.formatter),
            },
            None => self.native(),
        }
    }

    pub fn native(&self) -> ResolvedFormatter {
        let native: Arc<dyn Formatter> = self.native.clone();
        ResolvedFormatter {
            source: FormatterSource::Native,
            formatter: native,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatters::{Capabilities, DeclarativeFormatter};

    fn named() -> Arc<dyn Formatter> {
        Arc::new(DeclarativeFormatter::new(Capabilities::NAMED, None, None))
    }

    fn indexed(size: usize) -> Arc<dyn Formatter> {
        Arc::new(DeclarativeFormatter::new(Capabilities::INDEXED, Some(size), None))
    }

    fn ty(name: &str) -> TypeDescriptor {
        TypeDescriptor::structure(name, vec![])
    }

    #[test]
    fn unmatched_type_falls_back_to_native() {
        let registry = FormatterRegistry::new();
        assert!(registry.lookup(&ty("Point")).is_none());
        assert!(registry.resolve(&ty("Point")).is_native());
    }

    #[test]
    fn exact_beats_earlier_regex() {
        let mut registry = FormatterRegistry::new();
        registry.register("any-vec", TypePattern::regex("^Vec<").unwrap(), named());
        registry.register("int-vec", TypePattern::exact("Vec<int>"), indexed(2));

        assert_eq!(registry.lookup(&ty("Vec<int>")).unwrap().name, "int-vec");
        assert_eq!(registry.lookup(&ty("Vec<float>")).unwrap().name, "any-vec");
    }

    #[test]
    fn first_registration_wins_within_class() {
        let mut registry = FormatterRegistry::new();
        registry.register("first", TypePattern::regex("Map").unwrap(), named());
        registry.register("second", TypePattern::regex("^Map<").unwrap(), named());
        assert_eq!(registry.lookup(&ty("Map<int, int>")).unwrap().name, "first");
    }

    #[test]
    fn lookup_reflects_unregister() {
        let mut registry = FormatterRegistry::new();
        registry.register("vec", TypePattern::exact("Vec<int>"), indexed(1));
        assert!(!registry.resolve(&ty("Vec<int>")).is_native());

        assert!(registry.unregister("vec").is_some());
        assert!(registry.resolve(&ty("Vec<int>")).is_native());
        assert!(registry.unregister("vec").is_none());
    }

    #[test]
    fn register_same_name_replaces_in_place() {
        let mut registry = FormatterRegistry::new();
        registry.register("a", TypePattern::regex("T").unwrap(), named());
        registry.register("b", TypePattern::regex("T").unwrap(), named());
        let old = registry.register("a", TypePattern::regex("Type").unwrap(), named());
        assert!(old.is_some());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.registrations()[0].pattern.to_string(), "/Type/");
        assert_eq!(registry.lookup(&ty("Type")).unwrap().name, "a");
    }

    #[test]
    fn invalid_regex_is_rejected() {
        assert!(TypePattern::regex("Vec<(").is_err());
    }
}
