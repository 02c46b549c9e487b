//! Message layer errors

use crate::Namespace;
use thiserror::Error;

/// Errors raised while building, reading or encoding a [`crate::Message`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// A required field is absent
    #[error("missing field {key:?} in namespace {namespace:?}")]
    MissingField {
        /// Namespace that was searched
        namespace: Namespace,
        /// Key that was requested
        key: String,
    },

    /// A key-value form line has no `:` separator
    #[error("malformed key-value form line {line}: {content:?}")]
    MalformedKvLine {
        /// 1-based line number
        line: usize,
        /// Offending line
        content: String,
    },

    /// A key or value cannot be represented in key-value form
    #[error("cannot encode {0:?} in key-value form")]
    UnencodableKv(String),

    /// An extension alias is declared twice with different URIs
    #[error("namespace alias {alias:?} already bound to {existing}")]
    AliasConflict {
        /// Alias being declared
        alias: String,
        /// URI the alias was already bound to
        existing: String,
    },
}

/// Result alias for the message layer
pub type Result<T> = std::result::Result<T, MessageError>;
