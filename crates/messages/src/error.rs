//! Codec errors.

use thiserror::Error;

/// Errors that can occur while decoding coordination messages.
///
/// Any of these means the inbound message is malformed. Callers drop the
/// message; it never drives a state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Empty strategy parameters")]
    Empty,

    #[error("Missing tag separator in {0:?}")]
    MissingTag(String),

    #[error("Unknown tag: {0}")]
    UnknownTag(String),

    #[error("Malformed key:value pair {0:?}")]
    MalformedPair(String),

    #[error("Unknown key {key} for {tag}")]
    UnknownKey { tag: &'static str, key: String },

    #[error("Duplicate key {key} for {tag}")]
    DuplicateKey { tag: &'static str, key: String },

    #[error("Missing key {key} for {tag}")]
    MissingKey {
        tag: &'static str,
        key: &'static str,
    },

    #[error("Invalid number for {key}: {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("Invalid identifier for {key}: {value:?}")]
    InvalidIdentifier { key: &'static str, value: String },

    #[error("{context} expects {expected} parameters, got {actual}")]
    ParamsMismatch {
        context: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Foreign strategy: {0}")]
    ForeignStrategy(String),
}
