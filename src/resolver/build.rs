//! Builds the engine from a local source checkout.

use std::ffi::OsStr;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use super::config::ResolverConfig;
use crate::error::{ErrorKind, Pg0Error, Result};
use crate::fs::copy_into;
use crate::observability::LOG_TARGET;
use crate::process::output::render_failure;
use crate::process::run_captured;

/// Asks the engine build to embed its PostgreSQL distribution.
const BUNDLE_ENV: &str = "PG0_BUNDLE_POSTGRESQL";

/// Runs `cargo build --release` in `source_dir` and installs the artefact.
///
/// `cargo` names the toolchain driver to invoke.
pub(crate) fn build_from_source(
    cargo: &OsStr,
    source_dir: &Utf8Path,
    install_dir: &Utf8Path,
) -> Result<Utf8PathBuf> {
    info!(target: LOG_TARGET, %source_dir, "building engine from source");
    let mut command = Command::new(cargo);
    command
        .args(["build", "--release"])
        .current_dir(source_dir)
        .env(BUNDLE_ENV, "1");

    let output = run_captured(
        &mut command,
        None,
        ErrorKind::BuildFailed,
        "cargo build --release",
    )?;
    if !output.status.success() {
        return Err(render_failure(
            ErrorKind::BuildFailed,
            &format!("cargo build --release failed in {source_dir} ({})", output.status),
            &output,
        ));
    }

    let binary_name = ResolverConfig::host_binary_name();
    let artefact = source_dir.join("target").join("release").join(&binary_name);
    if !artefact.is_file() {
        return Err(Pg0Error::msg(
            ErrorKind::BuildFailed,
            format!("build succeeded but {artefact} was not produced"),
        ));
    }

    copy_into(&artefact, install_dir, &binary_name)
        .map_err(|report| Pg0Error::new(ErrorKind::EngineNotFound, report))
}
