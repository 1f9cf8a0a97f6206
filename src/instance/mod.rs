//! Lifecycle verbs for named instances, driven through the engine CLI.
//!
//! `start`, `psql`, `execute`, and `install_extension` raise classified
//! errors on a nonzero exit. `stop`, `drop`, `info`, `list`,
//! `list_extensions`, and `logs` tolerate one and report a stopped or empty
//! result instead.

mod args;
mod classify;
mod config;
mod info;
mod invoke;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{info, info_span, warn};

pub use self::config::{DEFAULT_INSTANCE_NAME, InstanceConfig, InstanceConfigBuilder};
pub use self::info::InstanceInfo;

use self::info::non_blank_lines;
use self::invoke::{EngineOutput, run_checked, run_tolerant};
use crate::error::{ErrorKind, Pg0Error, Result};
use crate::observability::LOG_TARGET;
use crate::resolver::{Resolver, default_resolver};

/// Handle on one named instance.
///
/// Holds no engine state; every query asks the engine afresh.
///
/// # Examples
///
/// ```no_run
/// use pg0_client::{Instance, InstanceConfig};
///
/// # fn main() -> pg0_client::Result<()> {
/// let instance = Instance::new(InstanceConfig::builder("app").port(5433).build())?;
/// let info = instance.start()?;
/// println!("{:?}", info.uri);
/// println!("{}", instance.execute("SELECT 1")?);
/// instance.stop()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Instance {
    config: InstanceConfig,
    resolver: Arc<Resolver>,
}

impl Instance {
    /// Creates a handle backed by the process-wide default resolver.
    ///
    /// # Errors
    ///
    /// Fails when the environment overrides cannot be loaded.
    pub fn new(config: InstanceConfig) -> Result<Self> {
        Ok(Self::with_resolver(config, default_resolver()?))
    }

    /// Creates a handle that resolves the engine through `resolver`.
    #[must_use]
    pub const fn with_resolver(config: InstanceConfig, resolver: Arc<Resolver>) -> Self {
        Self { config, resolver }
    }

    /// Configuration of this instance.
    #[must_use]
    pub const fn config(&self) -> &InstanceConfig {
        &self.config
    }

    /// Instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.config.name()
    }

    /// Starts the instance and returns its fresh status.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::AlreadyRunning`] when the instance is up,
    /// [`ErrorKind::EngineCommandFailed`] for other engine failures, and
    /// resolver errors when no engine binary is available.
    pub fn start(&self) -> Result<InstanceInfo> {
        let span = info_span!(target: LOG_TARGET, "start_instance", name = self.name());
        let _entered = span.enter();
        run_checked(self.binary()?.path(), &args::start(&self.config))?;
        info!(target: LOG_TARGET, name = self.name(), "instance started");
        self.info()
    }

    /// Stops the instance; stopping a stopped or unknown instance succeeds.
    ///
    /// # Errors
    ///
    /// Fails only when the engine binary is unavailable.
    pub fn stop(&self) -> Result<()> {
        run_tolerant(self.binary()?.path(), &args::stop(self.name()))?;
        Ok(())
    }

    /// Stops the instance and deletes its data.
    ///
    /// `force` skips the engine's confirmation prompt and should be set for
    /// programmatic use.
    ///
    /// # Errors
    ///
    /// Fails only when the engine binary is unavailable.
    pub fn drop(&self, force: bool) -> Result<()> {
        run_tolerant(self.binary()?.path(), &args::drop(self.name(), force))?;
        Ok(())
    }

    /// Queries the engine for the current status.
    ///
    /// An instance the engine knows nothing about reports as stopped.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidOutput`] when a successful query prints
    /// something other than an instance object.
    pub fn info(&self) -> Result<InstanceInfo> {
        let output = run_tolerant(self.binary()?.path(), &args::info(self.name()))?;
        parse_or(&output, "info").unwrap_or_else(|| Ok(InstanceInfo::stopped(self.name())))
    }

    /// Connection URI, when the instance runs.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`Instance::info`].
    pub fn uri(&self) -> Result<Option<String>> {
        Ok(self.info()?.uri)
    }

    /// Whether the instance currently runs.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`Instance::info`].
    pub fn is_running(&self) -> Result<bool> {
        Ok(self.info()?.running)
    }

    /// Runs `psql` against the instance with `extra` arguments and returns
    /// its raw stdout.
    ///
    /// # Errors
    ///
    /// Returns a classified error on a nonzero exit.
    pub fn psql<S: AsRef<str>>(&self, extra: &[S]) -> Result<String> {
        run_checked(self.binary()?.path(), &args::psql(self.name(), extra))
    }

    /// Runs one SQL command and returns the raw `psql` output.
    ///
    /// # Errors
    ///
    /// Returns a classified error on a nonzero exit.
    pub fn execute(&self, sql: &str) -> Result<String> {
        self.psql(&["-c", sql])
    }

    /// Returns the last `lines` server log lines, or all of them.
    ///
    /// # Errors
    ///
    /// Fails only when the engine binary is unavailable.
    pub fn logs(&self, lines: Option<usize>) -> Result<Vec<String>> {
        let output = run_tolerant(self.binary()?.path(), &args::logs(self.name(), lines))?;
        Ok(non_blank_lines(&output.stdout))
    }

    /// Installs a PostgreSQL extension such as `vector` into the instance.
    ///
    /// # Errors
    ///
    /// Returns a classified error on a nonzero exit.
    pub fn install_extension(&self, extension: &str) -> Result<()> {
        run_checked(
            self.binary()?.path(),
            &args::install_extension(self.name(), extension),
        )?;
        Ok(())
    }

    /// Starts the instance and stops it again when the guard is dropped.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`Instance::start`].
    pub fn start_scoped(&self) -> Result<InstanceGuard<'_>> {
        let info = self.start()?;
        Ok(InstanceGuard {
            instance: self,
            info,
        })
    }

    fn binary(&self) -> Result<crate::resolver::ResolvedBinary> {
        self.resolver.resolve()
    }
}

/// Keeps an instance running for the guard's lifetime.
///
/// Stop failures during drop are logged and otherwise ignored.
#[derive(Debug)]
#[must_use = "dropping the guard stops the instance immediately"]
pub struct InstanceGuard<'a> {
    instance: &'a Instance,
    info: InstanceInfo,
}

impl InstanceGuard<'_> {
    /// Status reported right after the instance started.
    #[must_use]
    pub const fn info(&self) -> &InstanceInfo {
        &self.info
    }

    /// The guarded instance.
    #[must_use]
    pub const fn instance(&self) -> &Instance {
        self.instance
    }
}

impl Drop for InstanceGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.instance.stop() {
            warn!(
                target: LOG_TARGET,
                name = self.instance.name(),
                error = %err,
                "failed to stop instance on drop"
            );
        }
    }
}

/// Parses JSON stdout of a tolerant verb.
///
/// Returns `None` when the engine failed without printing valid JSON, so the
/// caller can substitute its default. Unparsable output from a successful
/// run is an [`ErrorKind::InvalidOutput`] error.
fn parse_or<T: DeserializeOwned>(output: &EngineOutput, verb: &str) -> Option<Result<T>> {
    let stdout = output.stdout.trim();
    let parsed = serde_json::from_str::<T>(stdout);
    match parsed {
        Ok(value) => Some(Ok(value)),
        Err(_) if !output.status.success() => None,
        Err(err) => Some(Err(Pg0Error::new(
            ErrorKind::InvalidOutput,
            color_eyre::Report::new(err)
                .wrap_err(format!("pg0 {verb} printed unparsable output: {stdout:?}")),
        ))),
    }
}

/// Lists every instance the engine knows about, resolving through `resolver`.
///
/// # Errors
///
/// Returns [`ErrorKind::InvalidOutput`] when a successful listing is not a
/// JSON array, and resolver errors when no engine is available.
pub fn list_using(resolver: &Resolver) -> Result<Vec<InstanceInfo>> {
    let binary = resolver.resolve()?;
    let output = run_tolerant(binary.path(), &args::list())?;
    parse_or(&output, "list").unwrap_or_else(|| Ok(Vec::new()))
}

/// Lists extensions the engine can install, resolving through `resolver`.
///
/// # Errors
///
/// Fails only when no engine binary is available.
pub fn list_extensions_using(resolver: &Resolver) -> Result<Vec<String>> {
    let binary = resolver.resolve()?;
    let output = run_tolerant(binary.path(), &args::list_extensions())?;
    Ok(non_blank_lines(&output.stdout))
}

fn named(name: &str) -> Result<Instance> {
    Instance::new(InstanceConfig::new(name))
}

/// Starts an instance with `config` on the default resolver.
///
/// # Errors
///
/// Propagates failures from [`Instance::start`].
pub fn start(config: InstanceConfig) -> Result<InstanceInfo> {
    Instance::new(config)?.start()
}

/// Stops the instance called `name`.
///
/// # Errors
///
/// Propagates failures from [`Instance::stop`].
pub fn stop(name: &str) -> Result<()> {
    named(name)?.stop()
}

/// Stops and deletes the instance called `name`.
///
/// # Errors
///
/// Propagates failures from [`Instance::drop`].
pub fn drop(name: &str, force: bool) -> Result<()> {
    named(name)?.drop(force)
}

/// Reports the status of the instance called `name`.
///
/// # Errors
///
/// Propagates failures from [`Instance::info`].
pub fn info(name: &str) -> Result<InstanceInfo> {
    named(name)?.info()
}

/// Lists every instance on the default resolver.
///
/// # Errors
///
/// Propagates failures from [`list_using`].
pub fn list() -> Result<Vec<InstanceInfo>> {
    let resolver = default_resolver()?;
    list_using(&resolver)
}

/// Lists installable extensions on the default resolver.
///
/// # Errors
///
/// Propagates failures from [`list_extensions_using`].
pub fn list_extensions() -> Result<Vec<String>> {
    let resolver = default_resolver()?;
    list_extensions_using(&resolver)
}
