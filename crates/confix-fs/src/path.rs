//! Slash-normalized paths for targets, staging files and snapshots

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Path stored with `/` separators.
///
/// Derived paths (staging suffix, snapshot names, temp files) are built on
/// this form so they come out identical on every platform, and the same
/// string is what lands in `events.toml`. Use [`NormalizedPath::to_native`]
/// at I/O boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedPath {
    inner: String,
}

impl NormalizedPath {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            inner: path.as_ref().to_string_lossy().replace('\\', "/"),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn to_native(&self) -> PathBuf {
        PathBuf::from(&self.inner)
    }

    /// `self/segment`, without doubling a trailing slash.
    pub fn join(&self, segment: &str) -> Self {
        let base = self.inner.trim_end_matches('/');
        Self {
            inner: format!("{base}/{}", segment.replace('\\', "/")),
        }
    }

    /// Append to the final component: `sshd_config` becomes
    /// `sshd_config.confix-staged`.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self {
            inner: format!("{}{suffix}", self.inner.trim_end_matches('/')),
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        match self.inner.trim_end_matches('/').rsplit_once('/') {
            Some((_, name)) => Some(name),
            None => Some(self.inner.as_str()),
        }
        .filter(|name| !name.is_empty())
    }

    /// Extension of the file name; dotfiles like `.profile` have none.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name()?;
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => Some(ext),
            _ => None,
        }
    }

    pub fn exists(&self) -> bool {
        Path::new(&self.inner).exists()
    }
}

impl AsRef<Path> for NormalizedPath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.inner)
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

macro_rules! from_path_like {
    ($($ty:ty),*) => {
        $(impl From<$ty> for NormalizedPath {
            fn from(value: $ty) -> Self {
                Self::new(value)
            }
        })*
    };
}

from_path_like!(&str, String, &String, PathBuf, &PathBuf, &Path);
