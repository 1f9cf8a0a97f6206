//! Acquisition through the upstream shell installer.

use std::process::Command;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use super::config::ResolverConfig;
use super::discovery::existing_binary;
use super::target::OsFamily;
use crate::error::{ErrorKind, Pg0Error, Result};
use crate::observability::LOG_TARGET;
use crate::process::output::render_failure;
use crate::process::run_captured;

const PIPELINE: &str = "curl -fsSL \"$1\" | sh";

/// Rejects hosts the shell installer cannot run on.
pub(crate) fn ensure_supported(os: OsFamily) -> Result<()> {
    match os {
        OsFamily::Windows => Err(Pg0Error::msg(
            ErrorKind::InstallUnsupported,
            "the install script is not supported on Windows",
        )),
        OsFamily::Linux | OsFamily::Darwin => Ok(()),
    }
}

/// Pipes the script at `url` into `sh` and returns the installed binary.
///
/// The script must leave the engine in `install_dir`.
pub(crate) fn run_install_script(
    os: OsFamily,
    url: &str,
    timeout: Duration,
    install_dir: &Utf8Path,
) -> Result<Utf8PathBuf> {
    ensure_supported(os)?;
    info!(target: LOG_TARGET, %url, "running install script");

    let mut command = Command::new("sh");
    command.args(["-c", PIPELINE, "sh", url]);
    let output = run_captured(
        &mut command,
        Some(timeout),
        ErrorKind::EngineNotFound,
        "install script",
    )?;
    if !output.status.success() {
        return Err(render_failure(
            ErrorKind::EngineNotFound,
            &format!("install script failed ({})", output.status),
            &output,
        ));
    }

    existing_binary(install_dir, &ResolverConfig::host_binary_name()).ok_or_else(|| {
        Pg0Error::msg(
            ErrorKind::EngineNotFound,
            format!("install script finished but no engine binary exists in {install_dir}"),
        )
    })
}
