//! Locates an existing engine binary on disk without acquiring one.

use camino::{Utf8Path, Utf8PathBuf};
use std::ffi::OsStr;
use std::path::PathBuf;
use tracing::debug;

use crate::fs::is_executable;
use crate::observability::LOG_TARGET;

/// Searches every directory of a `PATH`-style value for `binary_name`.
///
/// Entries that are not valid UTF-8, relative, or that do not hold an
/// executable regular file are skipped.
pub(crate) fn find_on_search_path(path_var: &OsStr, binary_name: &str) -> Option<Utf8PathBuf> {
    std::env::split_paths(path_var).find_map(|dir| candidate_in(dir, binary_name))
}

/// Searches the process `PATH` for `binary_name`.
pub(crate) fn find_on_process_path(binary_name: &str) -> Option<Utf8PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    find_on_search_path(&path_var, binary_name)
}

fn candidate_in(dir: PathBuf, binary_name: &str) -> Option<Utf8PathBuf> {
    if !dir.is_absolute() {
        return None;
    }
    let Ok(utf8_dir) = Utf8PathBuf::from_path_buf(dir) else {
        debug!(target: LOG_TARGET, "skipping non-UTF-8 PATH entry");
        return None;
    };
    existing_binary(&utf8_dir, binary_name)
}

/// Returns `dir/binary_name` when it is an executable regular file.
pub(crate) fn existing_binary(dir: &Utf8Path, binary_name: &str) -> Option<Utf8PathBuf> {
    let candidate = dir.join(binary_name);
    is_executable(candidate.as_std_path()).then_some(candidate)
}
