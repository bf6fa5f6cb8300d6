//! [`TestTarget`] builder for reconciliation test scenarios.

use std::fs;
use std::path::{Path, PathBuf};

use confix_fs::NormalizedPath;
use tempfile::TempDir;

/// A temporary directory holding one target file and a change-log
/// directory, with helpers for setup and assertions.
///
/// # Example
///
/// ```rust,no_run
/// use confix_test_utils::TestTarget;
///
/// let target = TestTarget::with_content("sshd_config", "Port 22\n");
/// target.assert_content("Port 22\n");
/// ```
pub struct TestTarget {
    temp_dir: TempDir,
    name: String,
}

impl TestTarget {
    /// Scratch directory whose target `name` does not exist yet.
    pub fn new(name: &str) -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
            name: name.to_string(),
        }
    }

    /// Scratch directory with target `name` holding `content`.
    pub fn with_content(name: &str, content: &str) -> Self {
        let target = Self::new(name);
        target.write(content);
        target
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn path(&self) -> PathBuf {
        self.root().join(&self.name)
    }

    pub fn normalized(&self) -> NormalizedPath {
        NormalizedPath::new(self.path())
    }

    /// Directory for the change log, separate from the target.
    pub fn log_dir(&self) -> PathBuf {
        self.root().join("log")
    }

    pub fn write(&self, content: &str) {
        fs::write(self.path(), content)
            .unwrap_or_else(|e| panic!("TestTarget::write: {}: {e}", self.path().display()));
    }

    pub fn write_bytes(&self, content: &[u8]) {
        fs::write(self.path(), content)
            .unwrap_or_else(|e| panic!("TestTarget::write_bytes: {}: {e}", self.path().display()));
    }

    /// # Panics
    /// Panics if the target cannot be read.
    pub fn read(&self) -> String {
        fs::read_to_string(self.path())
            .unwrap_or_else(|e| panic!("TestTarget::read: {}: {e}", self.path().display()))
    }

    pub fn read_bytes(&self) -> Vec<u8> {
        fs::read(self.path())
            .unwrap_or_else(|e| panic!("TestTarget::read_bytes: {}: {e}", self.path().display()))
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Files in the target directory other than the target and the log
    /// directory, e.g. leftover staging or temp files.
    pub fn stray_files(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.root())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| *name != self.name && name != "log")
            .collect();
        names.sort();
        names
    }

    /// # Panics
    /// Panics if the target content differs from `expected`.
    pub fn assert_content(&self, expected: &str) {
        let actual = self.read();
        assert!(
            actual == expected,
            "Target {} has unexpected content.\nExpected: {:?}\nActual: {:?}",
            self.path().display(),
            expected,
            actual
        );
    }

    pub fn assert_missing(&self) {
        assert!(
            !self.exists(),
            "Expected target NOT to exist: {}",
            self.path().display()
        );
    }
}
