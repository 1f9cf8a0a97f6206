//! Client for the `pg0` engine, which runs named, ephemeral PostgreSQL
//! instances.
//!
//! The crate has two layers. The [`Resolver`] finds a usable engine binary,
//! downloading, building, or installing one when the host has none. An
//! [`Instance`] then drives the engine's lifecycle verbs (`start`, `stop`,
//! `drop`, `info`, `psql`, and friends) as blocking subprocess calls, turning
//! exit codes and stderr into typed [`Pg0Error`]s and JSON stdout into
//! [`InstanceInfo`] snapshots.
//!
//! ```no_run
//! use pg0_client::{Instance, InstanceConfig};
//!
//! # fn main() -> pg0_client::Result<()> {
//! let instance = Instance::new(InstanceConfig::builder("app").database("app").build())?;
//! let guard = instance.start_scoped()?;
//! println!("{:?}", guard.info().uri);
//! # Ok(())
//! # }
//! ```

mod error;
mod fs;
mod instance;
mod observability;
mod process;
mod resolver;

pub use error::{ConfigError, ConfigResult, ErrorKind, Pg0Error, Result};
pub use instance::{
    DEFAULT_INSTANCE_NAME, Instance, InstanceConfig, InstanceConfigBuilder, InstanceGuard,
    InstanceInfo, drop, info, list, list_extensions, list_extensions_using, list_using, start,
    stop,
};
pub use resolver::{
    AcquisitionStrategy, Arch, ChecksumTable, DEFAULT_INSTALL_SCRIPT_URL, DEFAULT_RELEASE_REPO,
    ENGINE_NAME, EngineTarget, HttpReleaseSource, Libc, LibcProbe, OsFamily, ReleaseSource,
    ResolvedBinary, Resolver, ResolverConfig, default_install_dir, default_resolver, release_url,
};

use camino::Utf8PathBuf;
use color_eyre::eyre::eyre;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;

/// Captures operator overrides supplied via `PG0_*` environment variables.
///
/// # Examples
/// ```
/// use pg0_client::Pg0EnvCfg;
///
/// let cfg = Pg0EnvCfg::default();
/// assert!(cfg.binary_path.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, OrthoConfig, Default)]
#[ortho_config(prefix = "PG0")]
pub struct Pg0EnvCfg {
    /// Forces the release target (`PG0_TARGET_PLATFORM`), e.g. `linux-x86_64-musl`.
    pub target_platform: Option<String>,
    /// Pre-built engine binary to install instead of downloading (`PG0_BINARY_PATH`).
    pub binary_path: Option<Utf8PathBuf>,
    /// Release tag to download (`PG0_ENGINE_VERSION`), e.g. `v0.9.0`.
    pub engine_version: Option<String>,
    /// Directory acquired binaries are installed into (`PG0_INSTALL_DIR`).
    pub install_dir: Option<Utf8PathBuf>,
    /// Engine source checkout to build from (`PG0_SOURCE_DIR`).
    pub source_dir: Option<Utf8PathBuf>,
}

impl Pg0EnvCfg {
    /// Loads configuration from environment variables without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a variable holds a value of the wrong shape.
    pub fn load() -> ConfigResult<Self> {
        let args = [OsString::from("pg0-client")];
        Self::load_from_iter(args).map_err(|err| ConfigError::from(eyre!(err)))
    }
}

/// Acquires the engine through the default resolver and returns its path.
///
/// An engine already in the install directory is kept unless `force` is set.
///
/// # Errors
///
/// Propagates failures from [`Resolver::install`].
pub fn install(version: Option<&str>, force: bool) -> Result<ResolvedBinary> {
    default_resolver()?.install(version, force)
}
