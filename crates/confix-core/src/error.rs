//! Error types for confix-core

use crate::changelog::EventId;
use crate::session::SessionState;

/// Result type for confix-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in confix-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An event id was recorded twice
    #[error("Change event {id} is already recorded")]
    DuplicateEvent { id: EventId },

    /// No event with this id exists
    #[error("Change event {id} not found")]
    EventNotFound { id: EventId },

    /// Undo requested without a recoverable prior state
    #[error("Cannot undo {id}: {reason}")]
    UndoUnavailable { id: EventId, reason: String },

    /// The target no longer matches what `fix()` derived its changes from
    #[error("Target {target} changed after fix; refusing to commit")]
    TargetChanged { target: String },

    /// A session method was called in a state that forbids it
    #[error("Cannot {operation} a session in state {state}")]
    InvalidTransition {
        operation: &'static str,
        state: SessionState,
    },

    /// Error reading or writing the change-event log
    #[error("Change log error: {message}")]
    ChangeLog { message: String },

    // Transparent wrappers for underlying crate errors
    /// Filesystem error from confix-fs
    #[error(transparent)]
    Fs(#[from] confix_fs::Error),

    /// Grammar error from confix-content
    #[error(transparent)]
    Content(#[from] confix_content::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// TOML deserialization error
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

/// Failure taxonomy reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The target cannot be parsed under its grammar
    MalformedDocument,
    /// The diff cannot be expressed safely
    RenderConflict,
    /// Writing, renaming or re-attributing the target failed
    CommitIoFailure,
    /// No recoverable prior state for an undo
    UndoUnavailable,
    /// A diff was applied to a document it was not derived from
    StaleDiff,
    /// The target changed between fix and commit
    TargetChanged,
    /// The change-event log could not be read, written or queried
    EventLog,
    /// A host store rejected an operation
    Store,
    /// The desired state could not be interpreted
    InvalidSpec,
    /// Session method called out of order
    InvalidTransition,
}

impl Error {
    pub fn change_log(message: impl Into<String>) -> Self {
        Self::ChangeLog {
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn code(&self) -> ErrorCode {
        use confix_content::Error as Content;

        match self {
            Self::Content(inner) => match inner {
                Content::Malformed { .. } => ErrorCode::MalformedDocument,
                Content::RenderConflict { .. } => ErrorCode::RenderConflict,
                Content::StaleDiff { .. } => ErrorCode::StaleDiff,
                Content::InvalidSpec { .. } | Content::Json(_) => ErrorCode::InvalidSpec,
                Content::StoreRequired { .. }
                | Content::CommandsUnsupported { .. }
                | Content::Store { .. } => ErrorCode::Store,
            },
            Self::Fs(_) | Self::Io(_) => ErrorCode::CommitIoFailure,
            Self::UndoUnavailable { .. } => ErrorCode::UndoUnavailable,
            Self::TargetChanged { .. } => ErrorCode::TargetChanged,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::DuplicateEvent { .. }
            | Self::EventNotFound { .. }
            | Self::ChangeLog { .. }
            | Self::TomlDe(_)
            | Self::TomlSer(_) => ErrorCode::EventLog,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_errors_keep_their_code() {
        let err: Error = confix_content::Error::malformed("space", 3, "NUL byte").into();
        assert_eq!(err.code(), ErrorCode::MalformedDocument);

        let err: Error = confix_content::Error::conflict("tagged-block", "split block").into();
        assert_eq!(err.code(), ErrorCode::RenderConflict);
    }

    #[test]
    fn fs_errors_are_commit_failures() {
        let err: Error = confix_fs::Error::io(
            "/etc/ssh/sshd_config",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        )
        .into();
        assert_eq!(err.code(), ErrorCode::CommitIoFailure);
    }

    #[test]
    fn undo_errors_display_event_id() {
        let err = Error::UndoUnavailable {
            id: EventId::new(57, 1),
            reason: "no snapshot".into(),
        };
        assert_eq!(err.to_string(), "Cannot undo 0057001: no snapshot");
        assert_eq!(err.code(), ErrorCode::UndoUnavailable);
    }
}
