//! Variable inspection runtime.
//!
//! Classifies debugger values into indexed or named children through a
//! pluggable formatter registry, hands out generation-tagged
//! `variablesReference` handles, and builds protocol-facing descriptors
//! without materializing children that nobody asked for.
//!
//! [`session::InspectionSession`] is the entry point; the DAP server in
//! `varlens-cli` drives one per debug session.

pub mod children;
pub mod console;
pub mod error;
pub mod formatters;
pub mod inspector;
pub mod response;
pub mod session;

pub use children::{HandleArena, HandleState, Window};
pub use error::InspectError;
pub use formatters::{Capabilities, Formatter, FormatterError, FormatterRegistry, TypePattern};
pub use inspector::{ChildrenKind, Classification, ValueInspector};
pub use response::VariableDescriptor;
pub use session::{EvaluateOutcome, InspectionSession, Scope, SessionOptions, VariablesOutcome};
