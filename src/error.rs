//! Domain error types for the pg0 engine client.

use color_eyre::Report;
use color_eyre::eyre::eyre;
use thiserror::Error;

/// Result alias for operations that may return a [`Pg0Error`].
pub type Result<T> = std::result::Result<T, Pg0Error>;

/// Result alias for configuration fallible operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Categorises client failures so callers can branch on structured errors.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// Represents errors without a more specific semantic meaning.
    #[default]
    Other,
    /// The operating system, architecture, or libc flavour is not recognised.
    UnsupportedPlatform,
    /// No engine binary could be located or acquired, or it could not be launched.
    EngineNotFound,
    /// A downloaded artefact did not match its published SHA-256 digest.
    ChecksumMismatch,
    /// Building the engine from source failed or produced no artefact.
    BuildFailed,
    /// The third-party install script cannot run on this platform.
    InstallUnsupported,
    /// The engine reported that the instance is already running.
    AlreadyRunning,
    /// The engine reported that no running instance exists.
    NotRunning,
    /// The engine exited unsuccessfully for any other reason.
    EngineCommandFailed,
    /// The engine produced output the client could not parse.
    InvalidOutput,
    /// Environment overrides could not be loaded.
    Config,
}

/// Error surfaced by every fallible client operation.
///
/// The [`ErrorKind`] identifies the failure class while the wrapped report
/// carries the human-readable message and any underlying cause.
#[derive(Debug, Error)]
#[error("{report}")]
pub struct Pg0Error {
    kind: ErrorKind,
    #[source]
    report: Report,
}

impl Pg0Error {
    /// Constructs a new error with the provided kind and diagnostic report.
    #[must_use]
    pub const fn new(kind: ErrorKind, report: Report) -> Self {
        Self { kind, report }
    }

    /// Builds an error of `kind` from a plain message.
    pub(crate) fn msg(kind: ErrorKind, message: impl std::fmt::Display) -> Self {
        Self::new(kind, eyre!("{message}"))
    }

    /// Returns the semantic category for this failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns `true` when the failure belongs to `kind`.
    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Extracts the underlying diagnostic report.
    pub fn into_report(self) -> Report {
        self.report
    }

    /// Re-labels the error while keeping its report chain.
    pub(crate) fn with_kind(self, kind: ErrorKind) -> Self {
        Self::new(kind, self.report)
    }
}

impl From<Report> for Pg0Error {
    fn from(report: Report) -> Self {
        Self::new(ErrorKind::Other, report)
    }
}

impl From<ConfigError> for Pg0Error {
    fn from(err: ConfigError) -> Self {
        let ConfigError(report) = err;
        Self::new(ErrorKind::Config, report)
    }
}

/// Captures configuration failures.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ConfigError(#[from] Report);
