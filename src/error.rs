use thiserror::Error;

use crate::registry::CrdtType;

/// Errors returned by CRDT and replica operations.
///
/// Convergent situations (duplicate adds, re-applied commands, removing
/// something already removed) are never errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrdtError {
    /// An argument was rejected before any state was touched.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The data type does not support this operation.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// A positional access fell outside the visible sequence.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        /// Requested position.
        index: usize,
        /// Visible length at the time of the call.
        len: usize,
    },

    /// An id is already registered with a different data type.
    #[error("crdt `{id}` is a {found:?}, not a {expected:?}")]
    TypeMismatch {
        /// The crdt id.
        id: String,
        /// The type the caller asked for.
        expected: CrdtType,
        /// The type registered under `id`.
        found: CrdtType,
    },

    /// Encoding or decoding a command failed.
    #[error("wire error: {0}")]
    Wire(String),

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CrdtError>;
