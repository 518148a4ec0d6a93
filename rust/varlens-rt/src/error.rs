use thiserror::Error;
use varlens_core::{EngineError, FrameId};

use crate::formatters::FormatterError;

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("unknown variablesReference {0}; handles do not survive a resume")]
    UnknownHandle(i64),
    #[error("no variable named '{name}' in frame {frame}")]
    UnknownVariable { name: String, frame: FrameId },
    #[error("invalid expression '{0}'")]
    InvalidExpression(String),
    #[error("'{path}' has no child {key}")]
    NoSuchChild { path: String, key: String },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Formatter(#[from] FormatterError),
}
