//! Maps a failed engine invocation onto the error taxonomy.

use crate::error::{ErrorKind, Pg0Error};

/// Outcome class of a nonzero engine exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FailureClass {
    AlreadyRunning(String),
    NotRunning(String),
    Failed(String),
}

impl FailureClass {
    pub(crate) fn into_error(self) -> Pg0Error {
        match self {
            Self::AlreadyRunning(message) => Pg0Error::msg(ErrorKind::AlreadyRunning, message),
            Self::NotRunning(message) => Pg0Error::msg(ErrorKind::NotRunning, message),
            Self::Failed(message) => Pg0Error::msg(ErrorKind::EngineCommandFailed, message),
        }
    }
}

/// Classifies a nonzero exit from its code and captured stderr.
///
/// `code` is `None` when the engine was terminated by a signal.
pub(crate) fn classify_failure(code: Option<i32>, stderr: &str) -> FailureClass {
    let trimmed = stderr.trim();
    let lowered = trimmed.to_lowercase();
    let message = if trimmed.is_empty() {
        code.map_or_else(
            || "pg0 command terminated by signal".to_owned(),
            |n| format!("pg0 command failed with code {n}"),
        )
    } else {
        trimmed.to_owned()
    };

    if lowered.contains("already running") {
        FailureClass::AlreadyRunning(message)
    } else if lowered.contains("no running instance") || lowered.contains("not running") {
        FailureClass::NotRunning(message)
    } else {
        FailureClass::Failed(message)
    }
}
