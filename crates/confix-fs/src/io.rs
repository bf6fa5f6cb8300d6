//! Atomic file replacement with ownership and permission restoration

use std::fs::{self, OpenOptions};
use std::io::Write;

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::{Error, NormalizedPath, Result};

/// Ownership and permission bits of a file.
///
/// Captured before a target is replaced and re-applied afterwards, since the
/// rename installs a freshly created inode owned by the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    /// Permission bits (`0o7777` mask on unix)
    pub mode: u32,
    /// Owning user id, when the platform exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    /// Owning group id, when the platform exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
}

impl FileAttributes {
    /// Attributes with only a permission mode set.
    pub fn with_mode(mode: u32) -> Self {
        Self {
            mode,
            uid: None,
            gid: None,
        }
    }

    /// Read the attributes of `path`, or `None` if it does not exist.
    pub fn capture(path: &NormalizedPath) -> Result<Option<Self>> {
        let native = path.to_native();
        match fs::metadata(&native) {
            Ok(meta) => Ok(Some(Self::from_metadata(&meta))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(native, e)),
        }
    }

    #[cfg(unix)]
    fn from_metadata(meta: &fs::Metadata) -> Self {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};
        Self {
            mode: meta.permissions().mode() & 0o7777,
            uid: Some(meta.uid()),
            gid: Some(meta.gid()),
        }
    }

    #[cfg(not(unix))]
    fn from_metadata(meta: &fs::Metadata) -> Self {
        let mode = if meta.permissions().readonly() { 0o444 } else { 0o644 };
        Self::with_mode(mode)
    }

    /// Apply these attributes to `path`.
    ///
    /// Ownership is only changed when it differs from the current owner, so
    /// unprivileged callers can restore files they already own.
    #[cfg(unix)]
    pub fn apply(&self, path: &NormalizedPath) -> Result<()> {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let native = path.to_native();
        let attr_err = |source| Error::Attributes {
            path: native.clone(),
            source,
        };

        let meta = fs::metadata(&native).map_err(attr_err)?;
        let uid = self.uid.filter(|uid| *uid != meta.uid());
        let gid = self.gid.filter(|gid| *gid != meta.gid());
        if uid.is_some() || gid.is_some() {
            std::os::unix::fs::chown(&native, uid, gid).map_err(attr_err)?;
        }

        if meta.permissions().mode() & 0o7777 != self.mode {
            fs::set_permissions(&native, fs::Permissions::from_mode(self.mode))
                .map_err(attr_err)?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn apply(&self, path: &NormalizedPath) -> Result<()> {
        let native = path.to_native();
        let meta = fs::metadata(&native).map_err(|source| Error::Attributes {
            path: native.clone(),
            source,
        })?;
        let mut perms = meta.permissions();
        perms.set_readonly(self.mode & 0o222 == 0);
        fs::set_permissions(&native, perms).map_err(|source| Error::Attributes {
            path: native.clone(),
            source,
        })
    }
}

/// Outcome of [`replace_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Content swapped and attributes restored (or none to restore)
    Replaced,
    /// Content swapped, but restoring ownership/permissions failed
    AttributesNotRestored { reason: String },
}

/// Read a file's bytes, returning `None` when it does not exist.
pub fn read_bytes(path: &NormalizedPath) -> Result<Option<Vec<u8>>> {
    let native = path.to_native();
    match fs::read(&native) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(native, e)),
    }
}

/// Write content atomically to a file with locking.
///
/// The content goes to a temp file in the same directory, is flushed, and is
/// then renamed over the destination. Readers see either the old or the new
/// content, never a mix.
pub fn write_atomic(path: &NormalizedPath, content: &[u8]) -> Result<()> {
    write_atomic_impl(path, content, None)
}

/// [`write_atomic`] with the permission bits of the new file fixed to
/// `mode` from the moment the temp file exists.
pub fn write_atomic_with_mode(path: &NormalizedPath, content: &[u8], mode: u32) -> Result<()> {
    write_atomic_impl(path, content, Some(mode))
}

fn write_atomic_impl(path: &NormalizedPath, content: &[u8], mode: Option<u32>) -> Result<()> {
    let native_path = path.to_native();

    if let Some(parent) = native_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or("confix"),
        std::process::id()
    );
    let temp_path = native_path.with_file_name(&temp_name);

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    let mut temp_file = options
        .open(&temp_path)
        .map_err(|e| Error::io(&temp_path, e))?;

    // A stale temp file keeps its old mode and umask may have masked bits
    if let Some(mode) = mode {
        restrict_mode(&temp_file, mode).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            Error::io(&temp_path, e)
        })?;
    }

    temp_file.lock_exclusive().map_err(|_| Error::LockFailed {
        path: native_path.clone(),
    })?;

    let written = temp_file
        .write_all(content)
        .and_then(|()| temp_file.sync_all());
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::io(&temp_path, e));
    }

    temp_file.unlock().map_err(|_| Error::LockFailed {
        path: native_path.clone(),
    })?;
    drop(temp_file);

    if let Err(source) = fs::rename(&temp_path, &native_path) {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::Rename {
            from: temp_path,
            to: native_path,
            source,
        });
    }

    Ok(())
}

#[cfg(unix)]
fn restrict_mode(file: &fs::File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restrict_mode(file: &fs::File, mode: u32) -> std::io::Result<()> {
    let mut perms = file.metadata()?.permissions();
    perms.set_readonly(mode & 0o222 == 0);
    file.set_permissions(perms)
}

/// Replace `path` with `content`, then restore `attributes` on the new file.
///
/// Errors up to and including the rename leave the destination untouched and
/// are returned as `Err`. A failure while restoring attributes happens after
/// the content swap and is reported as
/// [`ReplaceOutcome::AttributesNotRestored`].
pub fn replace_file(
    path: &NormalizedPath,
    content: &[u8],
    attributes: Option<&FileAttributes>,
) -> Result<ReplaceOutcome> {
    match attributes {
        Some(attributes) => write_atomic_with_mode(path, content, attributes.mode)?,
        None => write_atomic(path, content)?,
    }

    let Some(attributes) = attributes else {
        return Ok(ReplaceOutcome::Replaced);
    };

    match attributes.apply(path) {
        Ok(()) => Ok(ReplaceOutcome::Replaced),
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "content replaced but attributes not restored");
            Ok(ReplaceOutcome::AttributesNotRestored {
                reason: e.to_string(),
            })
        }
    }
}

/// Remove a file if it exists. Returns whether a file was removed.
pub fn remove_if_exists(path: &NormalizedPath) -> Result<bool> {
    let native = path.to_native();
    match fs::remove_file(&native) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(native, e)),
    }
}
