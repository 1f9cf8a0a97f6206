//! Filesystem helpers for the install directory, operating through ambient
//! `cap-std` directory handles.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs::Dir};
use color_eyre::eyre::{Context, Result};
use std::io::ErrorKind;

#[cfg(unix)]
use cap_std::fs::{Permissions, PermissionsExt};

/// Execute bits for owner, group, and other.
#[cfg(unix)]
pub(crate) const EXECUTE_BITS: u32 = 0o111;

/// Resolves a path to an ambient directory handle paired with the relative path component.
///
/// Absolute paths are opened relative to the ambient root; relative paths reuse the current
/// working directory.
pub(crate) fn ambient_dir_and_path(path: &Utf8Path) -> Result<(Dir, Utf8PathBuf)> {
    if path.has_root() {
        let stripped = path
            .strip_prefix("/")
            .map_or_else(|_| path.to_path_buf(), Utf8Path::to_path_buf);
        let dir = Dir::open_ambient_dir("/", ambient_authority())
            .context("open ambient root directory")?;
        Ok((dir, stripped))
    } else {
        let dir = Dir::open_ambient_dir(".", ambient_authority())
            .context("open ambient working directory")?;
        Ok((dir, path.to_path_buf()))
    }
}

/// Ensures the provided path exists, creating intermediate directories when required.
pub(crate) fn ensure_dir_exists(path: &Utf8Path) -> Result<()> {
    let (dir, relative) = ambient_dir_and_path(path)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }

    dir.create_dir_all(relative.as_std_path())
        .or_else(|err| {
            if err.kind() == ErrorKind::AlreadyExists {
                Ok(())
            } else {
                Err(err)
            }
        })
        .with_context(|| format!("create {path}"))
}

/// Copies `source` into `dest_dir/file_name` via a staging file and an atomic rename.
pub(crate) fn copy_into(source: &Utf8Path, dest_dir: &Utf8Path, file_name: &str) -> Result<Utf8PathBuf> {
    ensure_dir_exists(dest_dir)?;
    let destination = dest_dir.join(file_name);
    let mut reader =
        std::fs::File::open(source).with_context(|| format!("open {source}"))?;
    let mut staging = tempfile::Builder::new()
        .prefix(".pg0-copy-")
        .tempfile_in(dest_dir)
        .with_context(|| format!("create staging file in {dest_dir}"))?;
    std::io::copy(&mut reader, staging.as_file_mut())
        .with_context(|| format!("copy {source} into {dest_dir}"))?;
    staging
        .persist(&destination)
        .map_err(|err| color_eyre::eyre::eyre!("install {destination}: {}", err.error))?;
    Ok(destination)
}

/// Adds owner, group, and other execute permission to `path`.
///
/// Applied unconditionally after every acquisition rather than trusting the
/// mode bits of whatever produced the file.
#[cfg(unix)]
pub(crate) fn make_executable(path: &Utf8Path) -> Result<()> {
    let (dir, relative) = ambient_dir_and_path(path)?;
    let metadata = dir
        .metadata(relative.as_std_path())
        .with_context(|| format!("stat {path}"))?;
    let mode = metadata.permissions().mode() | EXECUTE_BITS;
    dir.set_permissions(relative.as_std_path(), Permissions::from_mode(mode))
        .with_context(|| format!("chmod {path}"))
}

#[cfg(not(unix))]
pub(crate) fn make_executable(_path: &Utf8Path) -> Result<()> {
    Ok(())
}

/// Reports whether `path` is a regular file the current user may execute.
#[cfg(unix)]
pub(crate) fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt as _;
    std::fs::metadata(path)
        .map(|m| m.is_file() && (m.permissions().mode() & EXECUTE_BITS) != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub(crate) fn is_executable(path: &std::path::Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file())
        .unwrap_or(false)
}
