//! Locates a usable `pg0` engine binary, acquiring one when none exists.
//!
//! Resolution probes, in order, the bundled directory next to the current
//! executable, the search path, and the per-user install directory. When all
//! three come up empty exactly one acquisition strategy runs: a pre-built
//! binary, a source build, the install script, or a release download. There
//! is no fallback between acquisition strategies.

mod build;
mod checksum;
mod config;
mod discovery;
mod download;
mod install_script;
mod lock;
mod target;

use std::ffi::OsStr;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, info_span};

pub use self::checksum::ChecksumTable;
pub use self::config::{
    DEFAULT_INSTALL_SCRIPT_URL, DEFAULT_RELEASE_REPO, ResolverConfig, default_install_dir,
};
pub use self::download::{HttpReleaseSource, ReleaseSource, release_url};
pub use self::target::{Arch, ENGINE_NAME, EngineTarget, Libc, LibcProbe, OsFamily};

use self::discovery::{existing_binary, find_on_process_path, find_on_search_path};
use self::download::{DownloadRequest, download_engine};
use self::lock::InstallLock;
use crate::error::{ErrorKind, Pg0Error, Result};
use crate::fs::{copy_into, ensure_dir_exists, make_executable};
use crate::observability::LOG_TARGET;

/// Records where a resolved engine binary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquisitionStrategy {
    /// Shipped alongside the current executable.
    Bundled,
    /// Found on the executable search path.
    SearchPath,
    /// Already present in the per-user install directory.
    InstallDir,
    /// Copied from an explicitly configured pre-built binary.
    Prebuilt,
    /// Compiled from a local source checkout.
    SourceBuild,
    /// Installed by the upstream shell installer.
    InstallScript,
    /// Downloaded from the release page.
    Download,
}

impl AcquisitionStrategy {
    /// Returns a stable lowercase label for logs and CLI output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bundled => "bundled",
            Self::SearchPath => "search-path",
            Self::InstallDir => "install-dir",
            Self::Prebuilt => "prebuilt",
            Self::SourceBuild => "source-build",
            Self::InstallScript => "install-script",
            Self::Download => "download",
        }
    }
}

impl fmt::Display for AcquisitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Absolute path to an engine binary plus how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBinary {
    path: Utf8PathBuf,
    provenance: AcquisitionStrategy,
}

impl ResolvedBinary {
    pub(crate) const fn new(path: Utf8PathBuf, provenance: AcquisitionStrategy) -> Self {
        Self { path, provenance }
    }

    /// Path of the engine binary.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// How the binary was located or acquired.
    #[must_use]
    pub const fn provenance(&self) -> AcquisitionStrategy {
        self.provenance
    }

    fn still_exists(&self) -> bool {
        self.path.is_file()
    }
}

enum Acquisition<'a> {
    Prebuilt(&'a Utf8Path),
    SourceBuild(&'a Utf8Path),
    InstallScript,
    Download,
}

/// Resolves the engine binary once and caches the result for its lifetime.
///
/// A cached path that has since vanished is resolved again.
///
/// # Examples
///
/// ```no_run
/// use pg0_client::{Resolver, ResolverConfig};
///
/// # fn main() -> pg0_client::Result<()> {
/// let resolver = Resolver::new(ResolverConfig::from_env()?);
/// let binary = resolver.resolve()?;
/// println!("{} ({})", binary.path(), binary.provenance());
/// # Ok(())
/// # }
/// ```
pub struct Resolver {
    config: ResolverConfig,
    source: Box<dyn ReleaseSource>,
    cached: Mutex<Option<ResolvedBinary>>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .field("cached", &*self.cache())
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Creates a resolver that downloads releases over HTTPS.
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        Self::with_release_source(config, HttpReleaseSource)
    }

    /// Creates a resolver that fetches releases from `source`.
    #[must_use]
    pub fn with_release_source(config: ResolverConfig, source: impl ReleaseSource + 'static) -> Self {
        Self {
            config,
            source: Box::new(source),
            cached: Mutex::new(None),
        }
    }

    /// Builds a resolver from the `PG0_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`ResolverConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ResolverConfig::from_env()?))
    }

    /// Configuration this resolver was built with.
    #[must_use]
    pub const fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Returns the engine binary, locating or acquiring it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::EngineNotFound`] when nothing could be located or
    /// acquired, or the more specific kind raised by the selected acquisition
    /// strategy ([`ErrorKind::UnsupportedPlatform`],
    /// [`ErrorKind::ChecksumMismatch`], [`ErrorKind::BuildFailed`],
    /// [`ErrorKind::InstallUnsupported`]).
    pub fn resolve(&self) -> Result<ResolvedBinary> {
        let mut cached = self.cache();
        if let Some(binary) = cached.as_ref().filter(|b| b.still_exists()) {
            return Ok(binary.clone());
        }

        let span = info_span!(target: LOG_TARGET, "resolve_engine");
        let _entered = span.enter();
        let binary = match self.locate() {
            Some(found) => found,
            None => self.acquire(None, false)?,
        };
        info!(
            target: LOG_TARGET,
            path = %binary.path,
            provenance = %binary.provenance,
            "engine binary resolved"
        );
        *cached = Some(binary.clone());
        Ok(binary)
    }

    /// Acquires the engine into the install directory and returns it.
    ///
    /// An existing binary in the install directory is reused unless `force`
    /// is set. `version` pins the release tag for downloads.
    ///
    /// # Errors
    ///
    /// Returns the error of the selected acquisition strategy.
    pub fn install(&self, version: Option<&str>, force: bool) -> Result<ResolvedBinary> {
        let span = info_span!(target: LOG_TARGET, "install_engine", force);
        let _entered = span.enter();
        let binary = self.acquire(version, force)?;
        *self.cache() = Some(binary.clone());
        Ok(binary)
    }

    fn cache(&self) -> MutexGuard<'_, Option<ResolvedBinary>> {
        self.cached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn locate(&self) -> Option<ResolvedBinary> {
        let name = ResolverConfig::host_binary_name();

        if let Some(path) = self
            .config
            .bundled_dir
            .as_deref()
            .and_then(|dir| existing_binary(dir, &name))
        {
            return Some(ResolvedBinary::new(path, AcquisitionStrategy::Bundled));
        }
        debug!(target: LOG_TARGET, "no bundled engine binary");

        let on_path = match self.config.search_path.as_deref() {
            Some(search_path) => find_on_search_path(search_path, &name),
            None => find_on_process_path(&name),
        };
        if let Some(path) = on_path {
            return Some(ResolvedBinary::new(path, AcquisitionStrategy::SearchPath));
        }
        debug!(target: LOG_TARGET, "engine binary not on search path");

        if let Some(path) = existing_binary(&self.config.install_dir, &name) {
            return Some(ResolvedBinary::new(path, AcquisitionStrategy::InstallDir));
        }
        debug!(
            target: LOG_TARGET,
            install_dir = %self.config.install_dir,
            "engine binary not in install directory"
        );
        None
    }

    fn select_acquisition(&self) -> Acquisition<'_> {
        if let Some(path) = self.config.prebuilt.as_deref() {
            Acquisition::Prebuilt(path)
        } else if let Some(dir) = self.config.source_dir.as_deref() {
            Acquisition::SourceBuild(dir)
        } else if self.config.install_script {
            Acquisition::InstallScript
        } else {
            Acquisition::Download
        }
    }

    fn acquire(&self, version: Option<&str>, force: bool) -> Result<ResolvedBinary> {
        let install_dir = self.config.install_dir.as_path();
        ensure_dir_exists(install_dir).map_err(not_found)?;
        let _lock = InstallLock::acquire(install_dir).map_err(|err| {
            not_found(color_eyre::Report::new(err).wrap_err(format!("lock {install_dir}")))
        })?;

        if !force {
            if let Some(path) = existing_binary(install_dir, &ResolverConfig::host_binary_name()) {
                debug!(target: LOG_TARGET, %path, "reusing engine installed concurrently");
                return Ok(ResolvedBinary::new(path, AcquisitionStrategy::InstallDir));
            }
        }

        let (path, provenance) = match self.select_acquisition() {
            Acquisition::Prebuilt(source) => (self.install_prebuilt(source)?, AcquisitionStrategy::Prebuilt),
            Acquisition::SourceBuild(dir) => (
                build::build_from_source(OsStr::new("cargo"), dir, install_dir)?,
                AcquisitionStrategy::SourceBuild,
            ),
            Acquisition::InstallScript => (
                install_script::run_install_script(
                    host_os()?,
                    &self.config.install_script_url,
                    self.config.install_script_timeout,
                    install_dir,
                )?,
                AcquisitionStrategy::InstallScript,
            ),
            Acquisition::Download => (self.download(version)?, AcquisitionStrategy::Download),
        };

        make_executable(&path).map_err(not_found)?;
        info!(target: LOG_TARGET, %path, %provenance, "engine binary acquired");
        Ok(ResolvedBinary::new(path, provenance))
    }

    fn install_prebuilt(&self, source: &Utf8Path) -> Result<Utf8PathBuf> {
        if !source.is_file() {
            return Err(Pg0Error::msg(
                ErrorKind::EngineNotFound,
                format!("pre-built engine binary {source} does not exist"),
            ));
        }
        copy_into(
            source,
            &self.config.install_dir,
            &ResolverConfig::host_binary_name(),
        )
        .map_err(not_found)
    }

    fn download(&self, version: Option<&str>) -> Result<Utf8PathBuf> {
        let target = match self.config.target {
            Some(target) => target,
            None => EngineTarget::detect_with(
                std::env::consts::OS,
                std::env::consts::ARCH,
                &self.config.libc_probe,
            )?,
        };
        let version = match version.or(self.config.version.as_deref()) {
            Some(pinned) => pinned.to_owned(),
            None => self
                .source
                .latest_version(&self.config.repo)
                .map_err(|report| not_found(report.wrap_err("failed to look up the latest release")))?,
        };

        download_engine(
            self.source.as_ref(),
            &DownloadRequest {
                repo: &self.config.repo,
                version: &version,
                target,
                checksums: &self.config.checksums,
                install_dir: &self.config.install_dir,
            },
        )
    }
}

fn host_os() -> Result<OsFamily> {
    OsFamily::from_system_name(std::env::consts::OS).ok_or_else(|| {
        Pg0Error::msg(
            ErrorKind::UnsupportedPlatform,
            format!("unsupported platform: {}", std::env::consts::OS),
        )
    })
}

fn not_found(report: color_eyre::Report) -> Pg0Error {
    Pg0Error::new(ErrorKind::EngineNotFound, report)
}

static DEFAULT_RESOLVER: OnceLock<Arc<Resolver>> = OnceLock::new();

/// Returns the process-wide resolver built from the environment overrides.
///
/// The overrides are read on first use only.
///
/// # Errors
///
/// Propagates failures from [`Resolver::from_env`].
pub fn default_resolver() -> Result<Arc<Resolver>> {
    if let Some(resolver) = DEFAULT_RESOLVER.get() {
        return Ok(Arc::clone(resolver));
    }
    let resolver = Arc::new(Resolver::from_env()?);
    Ok(Arc::clone(DEFAULT_RESOLVER.get_or_init(|| resolver)))
}
