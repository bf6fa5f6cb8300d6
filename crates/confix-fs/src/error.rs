//! Error types for confix-fs

use std::path::PathBuf;

/// Result type for confix-fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in confix-fs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to rename {from} over {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to restore attributes on {path}: {source}")]
    Attributes {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} settings at {path}: {message}")]
    SettingsParse {
        path: PathBuf,
        format: String,
        message: String,
    },

    #[error("Failed to serialize {format} settings for {path}: {message}")]
    SettingsSerialize {
        path: PathBuf,
        format: String,
        message: String,
    },

    #[error("Unsupported settings format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Lock acquisition failed for {path}")]
    LockFailed { path: PathBuf },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
