//! Small filesystem helpers shared by the on-disk stores.

use std::io::Write;
use std::path::Path;

use crate::error::{Result, VaultError};

/// Atomically replace the file at `path` with `data`.
///
/// The bytes are written to a temporary file in the same directory, flushed
/// to disk, restricted to the owner (mode 0600 on Unix), and then renamed
/// over the target. Readers see either the old or the new content, never a
/// partial write.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| VaultError::InvalidArgument {
        reason: format!("path has no parent directory: {}", path.display()),
    })?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))?;
    }

    tmp.persist(path).map_err(|e| VaultError::Io(e.error))?;
    Ok(())
}

/// Remove `path`, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
