//! Filesystem primitives for the confix reconciliation engine
//!
//! Provides normalized paths, content checksums, atomic file replacement
//! that restores ownership and permissions, and settings file loading.

pub mod checksum;
pub mod error;
pub mod io;
pub mod path;
pub mod settings;

pub use error::{Error, Result};
pub use io::{FileAttributes, ReplaceOutcome};
pub use path::NormalizedPath;
pub use settings::{SettingsFormat, SettingsStore};
