//! Runs the engine binary and applies the raising or tolerant policy.

use std::process::{Command, ExitStatus};

use camino::Utf8Path;
use tracing::{debug, info_span};

use super::args::redacted;
use super::classify::classify_failure;
use crate::error::{ErrorKind, Result};
use crate::observability::LOG_TARGET;
use crate::process::run_captured;

/// Captured result of one engine invocation.
#[derive(Debug)]
pub(crate) struct EngineOutput {
    pub(crate) status: ExitStatus,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

/// Runs `binary` with `args` to completion.
///
/// Only a failure to launch is an error here; a nonzero exit is returned as
/// captured output.
pub(crate) fn run_engine(binary: &Utf8Path, args: &[String]) -> Result<EngineOutput> {
    let verb = args.first().map_or("", String::as_str);
    let span = info_span!(target: LOG_TARGET, "engine_command", verb);
    let _entered = span.enter();
    debug!(target: LOG_TARGET, %binary, argv = %redacted(args), "invoking engine");

    let mut command = Command::new(binary.as_std_path());
    command.args(args);
    let output = run_captured(
        &mut command,
        None,
        ErrorKind::EngineNotFound,
        &format!("pg0 {verb}"),
    )?;

    let result = EngineOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!(target: LOG_TARGET, status = %result.status, "engine exited");
    Ok(result)
}

/// Runs the engine and raises a classified error on a nonzero exit.
pub(crate) fn run_checked(binary: &Utf8Path, args: &[String]) -> Result<String> {
    let output = run_engine(binary, args)?;
    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(classify_failure(output.status.code(), &output.stderr).into_error())
    }
}

/// Runs the engine and returns its output whatever the exit status.
pub(crate) fn run_tolerant(binary: &Utf8Path, args: &[String]) -> Result<EngineOutput> {
    let output = run_engine(binary, args)?;
    if !output.status.success() {
        let class = classify_failure(output.status.code(), &output.stderr);
        debug!(target: LOG_TARGET, ?class, "tolerating engine failure");
    }
    Ok(output)
}
