//! Explicit configuration for the binary resolver.
//!
//! Every operator override is folded into [`ResolverConfig`] once, so the
//! resolver never reads the environment ad hoc.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;

use super::checksum::ChecksumTable;
use super::target::{ENGINE_NAME, EngineTarget, LibcProbe};
use crate::Pg0EnvCfg;
use crate::error::Result;

/// GitHub repository publishing engine releases.
pub const DEFAULT_RELEASE_REPO: &str = "vectorize-io/pg0";

/// Upstream shell installer used by the install-script strategy.
pub const DEFAULT_INSTALL_SCRIPT_URL: &str =
    "https://raw.githubusercontent.com/vectorize-io/pg0/main/install.sh";

const DEFAULT_INSTALL_SCRIPT_TIMEOUT: Duration = Duration::from_secs(300);
const BUNDLED_SUBDIR: &str = "bin";

/// Inputs steering how the engine binary is located and acquired.
///
/// # Examples
///
/// ```
/// use pg0_client::ResolverConfig;
///
/// let config = ResolverConfig::default()
///     .with_install_dir("/opt/pg0/bin")
///     .with_version("v0.9.0");
/// assert_eq!(config.install_dir().as_str(), "/opt/pg0/bin");
/// assert_eq!(config.version(), Some("v0.9.0"));
/// ```
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub(crate) repo: String,
    pub(crate) install_dir: Utf8PathBuf,
    pub(crate) bundled_dir: Option<Utf8PathBuf>,
    pub(crate) search_path: Option<OsString>,
    pub(crate) target: Option<EngineTarget>,
    pub(crate) version: Option<String>,
    pub(crate) prebuilt: Option<Utf8PathBuf>,
    pub(crate) source_dir: Option<Utf8PathBuf>,
    pub(crate) install_script: bool,
    pub(crate) install_script_url: String,
    pub(crate) install_script_timeout: Duration,
    pub(crate) checksums: ChecksumTable,
    pub(crate) libc_probe: LibcProbe,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            repo: DEFAULT_RELEASE_REPO.to_owned(),
            install_dir: default_install_dir(),
            bundled_dir: default_bundled_dir(),
            search_path: None,
            target: None,
            version: None,
            prebuilt: None,
            source_dir: None,
            install_script: false,
            install_script_url: DEFAULT_INSTALL_SCRIPT_URL.to_owned(),
            install_script_timeout: DEFAULT_INSTALL_SCRIPT_TIMEOUT,
            checksums: ChecksumTable::default(),
            libc_probe: LibcProbe::default(),
        }
    }
}

impl ResolverConfig {
    /// Loads environment overrides and folds them into a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ErrorKind::Config`] when the overrides cannot be
    /// loaded and [`crate::ErrorKind::UnsupportedPlatform`] when
    /// `PG0_TARGET_PLATFORM` names an unknown target.
    pub fn from_env() -> Result<Self> {
        let overrides = Pg0EnvCfg::load()?;
        Self::default().with_overrides(&overrides)
    }

    /// Applies every override present in `overrides`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ErrorKind::UnsupportedPlatform`] when the target
    /// override cannot be parsed.
    pub fn with_overrides(mut self, overrides: &Pg0EnvCfg) -> Result<Self> {
        if let Some(raw) = non_blank(overrides.target_platform.as_deref()) {
            self.target = Some(raw.parse()?);
        }
        if let Some(version) = non_blank(overrides.engine_version.as_deref()) {
            self.version = Some(version.to_owned());
        }
        if let Some(ref path) = overrides.binary_path {
            self.prebuilt = Some(path.clone());
        }
        if let Some(ref dir) = overrides.install_dir {
            self.install_dir = dir.clone();
        }
        if let Some(ref dir) = overrides.source_dir {
            self.source_dir = Some(dir.clone());
        }
        Ok(self)
    }

    /// Overrides the directory acquired binaries are installed into.
    #[must_use]
    pub fn with_install_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.install_dir = dir.into();
        self
    }

    /// Overrides the directory searched for a bundled binary; `None` disables it.
    #[must_use]
    pub fn with_bundled_dir(mut self, dir: Option<Utf8PathBuf>) -> Self {
        self.bundled_dir = dir;
        self
    }

    /// Replaces the process `PATH` with `search_path` during discovery.
    ///
    /// An empty value disables search-path discovery.
    #[must_use]
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    /// Forces the artefact target instead of detecting it.
    #[must_use]
    pub const fn with_target(mut self, target: EngineTarget) -> Self {
        self.target = Some(target);
        self
    }

    /// Pins the release version to download.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Installs the pre-built binary at `path` instead of downloading one.
    #[must_use]
    pub fn with_prebuilt(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.prebuilt = Some(path.into());
        self
    }

    /// Builds the engine from the source checkout at `dir`.
    #[must_use]
    pub fn with_source_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }

    /// Acquires the engine through the upstream install script.
    #[must_use]
    pub const fn with_install_script(mut self, enabled: bool) -> Self {
        self.install_script = enabled;
        self
    }

    /// Overrides the install script location.
    #[must_use]
    pub fn with_install_script_url(mut self, url: impl Into<String>) -> Self {
        self.install_script_url = url.into();
        self
    }

    /// Bounds how long the install script may run.
    #[must_use]
    pub const fn with_install_script_timeout(mut self, timeout: Duration) -> Self {
        self.install_script_timeout = timeout;
        self
    }

    /// Overrides the GitHub repository releases are fetched from.
    #[must_use]
    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = repo.into();
        self
    }

    /// Supplies the known-good digests for downloaded artefacts.
    #[must_use]
    pub fn with_checksums(mut self, checksums: ChecksumTable) -> Self {
        self.checksums = checksums;
        self
    }

    /// Replaces the libc probe used during Linux target detection.
    #[must_use]
    pub fn with_libc_probe(mut self, probe: LibcProbe) -> Self {
        self.libc_probe = probe;
        self
    }

    /// Directory acquired binaries are installed into.
    #[must_use]
    pub const fn install_dir(&self) -> &Utf8PathBuf {
        &self.install_dir
    }

    /// Explicit release version, when one was requested.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Forced artefact target, when one was requested.
    #[must_use]
    pub const fn target(&self) -> Option<EngineTarget> {
        self.target
    }

    /// File name of the engine on the host (`pg0` or `pg0.exe`).
    pub(crate) fn host_binary_name() -> String {
        format!("{ENGINE_NAME}{}", std::env::consts::EXE_SUFFIX)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Resolves the per-user install directory.
///
/// Windows uses `%LOCALAPPDATA%\pg0\bin`; every other platform uses
/// `~/.local/bin`. Without a resolvable home directory the system temporary
/// directory is used as a last resort.
#[must_use]
pub fn default_install_dir() -> Utf8PathBuf {
    if cfg!(windows) {
        if let Some(dir) = resolve_from_local_app_data() {
            return dir;
        }
    }

    if let Some(dir) = resolve_from_home() {
        return dir;
    }

    utf8_or_lossy(std::env::temp_dir().join(ENGINE_NAME).join("bin"))
}

fn resolve_from_local_app_data() -> Option<Utf8PathBuf> {
    let base = dirs::data_local_dir()?;
    let path = Utf8PathBuf::from_path_buf(base).ok()?;
    Some(path.join(ENGINE_NAME).join("bin"))
}

fn resolve_from_home() -> Option<Utf8PathBuf> {
    let home = dirs::home_dir()?;
    let path = Utf8PathBuf::from_path_buf(home).ok()?;
    Some(path.join(".local").join("bin"))
}

fn default_bundled_dir() -> Option<Utf8PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let parent = exe.parent()?;
    let dir = Utf8PathBuf::from_path_buf(parent.to_path_buf()).ok()?;
    Some(dir.join(BUNDLED_SUBDIR))
}

fn utf8_or_lossy(path: PathBuf) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path)
        .unwrap_or_else(|raw| Utf8PathBuf::from(raw.to_string_lossy().into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn overrides_fill_every_field() -> color_eyre::Result<()> {
        let overrides = Pg0EnvCfg {
            target_platform: Some("linux-aarch64-musl".into()),
            binary_path: Some(Utf8PathBuf::from("/opt/pg0")),
            engine_version: Some("v0.9.0".into()),
            install_dir: Some(Utf8PathBuf::from("/srv/bin")),
            source_dir: Some(Utf8PathBuf::from("/src/pg0")),
        };

        let config = ResolverConfig::default().with_overrides(&overrides)?;

        assert_eq!(
            config.target().map(|t| t.to_string()).as_deref(),
            Some("linux-aarch64-musl")
        );
        assert_eq!(config.version(), Some("v0.9.0"));
        assert_eq!(config.prebuilt, Some(Utf8PathBuf::from("/opt/pg0")));
        assert_eq!(config.install_dir().as_str(), "/srv/bin");
        assert_eq!(config.source_dir, Some(Utf8PathBuf::from("/src/pg0")));
        Ok(())
    }

    #[test]
    fn blank_overrides_are_ignored() -> color_eyre::Result<()> {
        let overrides = Pg0EnvCfg {
            target_platform: Some("   ".into()),
            engine_version: Some(String::new()),
            ..Pg0EnvCfg::default()
        };

        let config = ResolverConfig::default().with_overrides(&overrides)?;

        assert!(config.target().is_none());
        assert!(config.version().is_none());
        Ok(())
    }

    #[test]
    fn unknown_target_override_is_unsupported() {
        let overrides = Pg0EnvCfg {
            target_platform: Some("plan9-mips".into()),
            ..Pg0EnvCfg::default()
        };

        let err = ResolverConfig::default()
            .with_overrides(&overrides)
            .expect_err("target should be rejected");

        assert_eq!(err.kind(), ErrorKind::UnsupportedPlatform);
    }

    #[cfg(unix)]
    #[test]
    fn install_dir_defaults_to_local_bin() {
        let dir = temp_env::with_var("HOME", Some("/home/pg0-user"), default_install_dir);
        assert_eq!(dir.as_str(), "/home/pg0-user/.local/bin");
    }
}
