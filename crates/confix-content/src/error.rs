//! Error types for confix-content

/// Result type for confix-content operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in confix-content operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The target cannot be parsed at all under its grammar
    #[error("Malformed {grammar} document at line {line}: {message}")]
    Malformed {
        grammar: String,
        line: usize,
        message: String,
    },

    /// The diff cannot be expressed safely in the target grammar
    #[error("Cannot render {grammar} diff: {reason}")]
    RenderConflict { grammar: String, reason: String },

    /// A diff was applied to a document it was not derived from
    #[error("Diff derived from {expected} applied to document {actual}")]
    StaleDiff { expected: String, actual: String },

    /// A desired-state mapping could not be turned into a spec
    #[error("Invalid desired state: {message}")]
    InvalidSpec { message: String },

    /// Store-backed grammars need an injected store
    #[error("{grammar} is store-backed and has no text adapter")]
    StoreRequired { grammar: String },

    /// The grammar cannot execute store commands
    #[error("{grammar} does not execute store commands")]
    CommandsUnsupported { grammar: String },

    /// The host store rejected an operation
    #[error("Host store error: {message}")]
    Store { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn malformed(grammar: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Malformed {
            grammar: grammar.into(),
            line,
            message: message.into(),
        }
    }

    pub fn conflict(grammar: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RenderConflict {
            grammar: grammar.into(),
            reason: reason.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Whether this error means the document could not be parsed.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }

    /// Whether this error means the diff could not be rendered safely.
    pub fn is_render_conflict(&self) -> bool {
        matches!(self, Self::RenderConflict { .. })
    }
}
