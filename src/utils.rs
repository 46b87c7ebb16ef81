//! Filesystem and process-lookup helpers shared across the crate.

use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// Mode applied to every file written with `restricted = true`.
pub const OWNER_READ_WRITE: u32 = 0o600;

fn reject_symlink(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to follow symlink: {}", path.display()),
        )),
        _ => Ok(()),
    }
}

/// Open a file for reading, refusing symlinks unless `follow_symlinks` is set.
pub fn safe_open_file(path: &Path, follow_symlinks: bool) -> Result<File> {
    if !follow_symlinks {
        reject_symlink(path)?;
    }
    Ok(File::open(path)?)
}

/// Create (or truncate) a file for writing. Symlinks are never followed.
///
/// With `restricted` the file is created owner read/write only on unix.
pub fn safe_create_file(path: &Path, restricted: bool) -> Result<File> {
    reject_symlink(path)?;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    if restricted {
        options.mode(OWNER_READ_WRITE);
    }

    let file = options.open(path)?;

    // `mode` only applies on creation; tighten files that already existed.
    #[cfg(unix)]
    if restricted {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(OWNER_READ_WRITE))?;
    }

    Ok(file)
}

/// Open a file for appending, creating it if needed. Symlinks are refused.
pub fn safe_append_file(path: &Path) -> Result<File> {
    reject_symlink(path)?;
    Ok(OpenOptions::new().append(true).create(true).open(path)?)
}

/// Reject names that are not a single path component.
pub fn ensure_plain_file_name(name: &str) -> Result<()> {
    let is_plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && Path::new(name).file_name().is_some_and(|f| f == name);
    if !is_plain {
        return Err(Error::Configuration(format!(
            "'{name}' is not a plain file name"
        )));
    }
    Ok(())
}

/// Locate an executable on `PATH`, the way a shell would.
pub fn find_executable(name: &str, search_path: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let search_path = search_path?;
    std::env::split_paths(search_path)
        .map(|dir| dir.join(name))
        .find(|path| is_executable(path))
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}
