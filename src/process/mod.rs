//! Runs helper subprocesses (toolchains, install scripts) with bounded waits
//! and readable failure reports.

pub(crate) mod output;

use std::io::{ErrorKind as IoErrorKind, Read};
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use color_eyre::eyre::Context;
use tracing::{debug, error, warn};
use wait_timeout::ChildExt;

use self::output::{append_error_context, render_failure};
use crate::error::{ErrorKind, Pg0Error, Result};
use crate::observability::LOG_TARGET;

/// How long to wait for a pipe to reach end-of-file once the child is gone.
///
/// Grandchildren that inherited the pipe can keep it open past the child's
/// exit; their remaining output is abandoned after this grace period.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Runs `command` to completion and captures both output streams.
///
/// With `timeout` set the child is killed once the deadline passes and the
/// captured output is reported as a failure of `kind`. A child that cannot be
/// spawned is reported as a failure of `kind` as well.
pub(crate) fn run_captured(
    command: &mut Command,
    timeout: Option<Duration>,
    kind: ErrorKind,
    context: &str,
) -> Result<Output> {
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let child = command.spawn().map_err(|err| {
        error!(target: LOG_TARGET, context, error = %err, "failed to spawn helper command");
        Pg0Error::new(
            kind,
            color_eyre::Report::new(err).wrap_err(format!("{context}: failed to spawn")),
        )
    })?;

    match timeout {
        Some(limit) => wait_bounded(child, limit, kind, context),
        None => child
            .wait_with_output()
            .with_context(|| format!("{context}: failed to collect output"))
            .map_err(|report| Pg0Error::new(kind, report)),
    }
}

fn wait_bounded(mut child: Child, limit: Duration, kind: ErrorKind, context: &str) -> Result<Output> {
    // A child blocked on a full pipe never exits.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let wait_result = match child.wait_timeout(limit) {
        Ok(result) => result,
        Err(err) => return handle_wait_error(child, &err, kind),
    };
    let timed_out = wait_result.is_none();

    let status = match wait_result {
        Some(status) => status,
        None => {
            match child.kill() {
                // `InvalidInput` indicates the child has already exited.
                Ok(()) => {}
                Err(err) if err.kind() == IoErrorKind::InvalidInput => {}
                Err(err) => {
                    return Err(Pg0Error::msg(
                        kind,
                        format!("{context}: failed to terminate after {}s: {err}", limit.as_secs()),
                    ));
                }
            }
            child
                .wait()
                .with_context(|| format!("{context}: failed to reap"))
                .map_err(|report| Pg0Error::new(kind, report))?
        }
    };

    let output = Output {
        status,
        stdout: collect(&stdout),
        stderr: collect(&stderr),
    };

    if timed_out {
        let timeout_secs = limit.as_secs();
        warn!(target: LOG_TARGET, context, timeout_secs, "helper command timed out");
        return Err(render_failure(
            kind,
            &format!("{context} timed out after {timeout_secs}s"),
            &output,
        ));
    }

    Ok(output)
}

/// Reads `pipe` to end-of-file on a background thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut reader) = pipe {
            if let Err(err) = reader.read_to_end(&mut buffer) {
                debug!(target: LOG_TARGET, error = %err, "failed to drain helper output");
            }
        }
        drop(tx.send(buffer));
    });
    rx
}

fn collect(drained: &Receiver<Vec<u8>>) -> Vec<u8> {
    drained.recv_timeout(DRAIN_GRACE).unwrap_or_default()
}

fn handle_wait_error(mut child: Child, error: &std::io::Error, kind: ErrorKind) -> Result<Output> {
    let kill_result = child.kill();
    let wait_result = child.wait_with_output();
    let mut message = format!("failed to wait for helper command: {error}");
    if let Err(kill_err) = kill_result {
        append_error_context(
            &mut message,
            "additionally failed to terminate it",
            &kill_err,
            "; additionally failed to report termination error",
        );
    }
    if let Err(wait_err) = wait_result {
        append_error_context(
            &mut message,
            "additionally failed to reap its output",
            &wait_err,
            "; additionally failed to describe reap error",
        );
    }
    Err(Pg0Error::msg(kind, message))
}
