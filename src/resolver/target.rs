//! Platform detection for selecting the matching engine release artefact.
//!
//! The target string (`<os>-<arch>[-<libc>]`) keys both the release asset name
//! and the checksum table, so detection must be stable across runs on the same
//! host.

use std::fmt;
use std::process::Command;
use std::str::FromStr;
use std::time::Duration;

use camino::Utf8PathBuf;
use tracing::debug;

use crate::error::{ErrorKind, Pg0Error, Result};
use crate::observability::LOG_TARGET;
use crate::process::run_captured;

/// Name of the engine executable without any platform extension.
pub const ENGINE_NAME: &str = "pg0";

const LDD_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const MUSL_LOADER_DIR: &str = "/lib";

/// Operating system family of an engine artefact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    /// Linux distributions, with glibc or musl userlands.
    Linux,
    /// macOS.
    Darwin,
    /// Windows.
    Windows,
}

impl OsFamily {
    /// Maps a runtime system name such as `linux` or `macos` onto a family.
    #[must_use]
    pub fn from_system_name(system: &str) -> Option<Self> {
        match system.trim().to_ascii_lowercase().as_str() {
            "linux" => Some(Self::Linux),
            "darwin" | "macos" => Some(Self::Darwin),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }

    /// Returns the tag used in target strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
        }
    }
}

/// CPU architecture of an engine artefact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// 64-bit x86 (`x86_64`, `amd64`).
    X86_64,
    /// 64-bit ARM (`aarch64`, `arm64`).
    Aarch64,
}

impl Arch {
    /// Normalises a raw machine-type string.
    ///
    /// `x86_64`/`amd64` collapse to [`Arch::X86_64`] and `aarch64`/`arm64` to
    /// [`Arch::Aarch64`]; anything else is unrecognised.
    #[must_use]
    pub fn normalize(machine: &str) -> Option<Self> {
        match machine.trim().to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" => Some(Self::X86_64),
            "aarch64" | "arm64" => Some(Self::Aarch64),
            _ => None,
        }
    }

    /// Returns the tag used in target strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
        }
    }
}

/// C library flavour of a Linux artefact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Libc {
    /// glibc.
    Gnu,
    /// musl.
    Musl,
}

impl Libc {
    /// Returns the tag used in target strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gnu => "gnu",
            Self::Musl => "musl",
        }
    }
}

/// Identifies which engine artefact runs on a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineTarget {
    os: OsFamily,
    arch: Arch,
    libc: Option<Libc>,
}

impl EngineTarget {
    /// Detects the target of the running host.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::UnsupportedPlatform`] when the OS family or the
    /// architecture is not one the engine ships for.
    pub fn detect() -> Result<Self> {
        Self::detect_with(
            std::env::consts::OS,
            std::env::consts::ARCH,
            &LibcProbe::default(),
        )
    }

    /// Detects a target from explicit system and machine names.
    ///
    /// macOS always maps to `aarch64` because Intel hardware runs the arm64
    /// build under Rosetta. Windows always maps to `x86_64`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::UnsupportedPlatform`] for unknown systems and for
    /// unknown Linux architectures.
    pub fn detect_with(system: &str, machine: &str, probe: &LibcProbe) -> Result<Self> {
        let os = OsFamily::from_system_name(system).ok_or_else(|| {
            Pg0Error::msg(
                ErrorKind::UnsupportedPlatform,
                format!("unsupported platform: {system}"),
            )
        })?;

        let target = match os {
            OsFamily::Darwin => Self::new(os, Arch::Aarch64, None),
            OsFamily::Windows => Self::new(os, Arch::X86_64, None),
            OsFamily::Linux => {
                let arch = Arch::normalize(machine).ok_or_else(|| {
                    Pg0Error::msg(
                        ErrorKind::UnsupportedPlatform,
                        format!("unsupported Linux architecture: {machine}"),
                    )
                })?;
                Self::new(os, arch, Some(probe.detect(arch)))
            }
        };
        debug!(target: LOG_TARGET, target = %target, "detected engine target");
        Ok(target)
    }

    const fn new(os: OsFamily, arch: Arch, libc: Option<Libc>) -> Self {
        Self { os, arch, libc }
    }

    /// Operating system family.
    #[must_use]
    pub const fn os(&self) -> OsFamily {
        self.os
    }

    /// CPU architecture.
    #[must_use]
    pub const fn arch(&self) -> Arch {
        self.arch
    }

    /// libc flavour; only present for Linux targets.
    #[must_use]
    pub const fn libc(&self) -> Option<Libc> {
        self.libc
    }

    /// Executable file extension, including the leading dot when non-empty.
    #[must_use]
    pub const fn exe_suffix(&self) -> &'static str {
        match self.os {
            OsFamily::Windows => ".exe",
            OsFamily::Linux | OsFamily::Darwin => "",
        }
    }

    /// File name of the installed engine binary (`pg0` or `pg0.exe`).
    #[must_use]
    pub fn binary_name(&self) -> String {
        format!("{ENGINE_NAME}{}", self.exe_suffix())
    }

    /// File name of the release asset, e.g. `pg0-linux-x86_64-musl`.
    #[must_use]
    pub fn asset_name(&self) -> String {
        format!("{ENGINE_NAME}-{self}{}", self.exe_suffix())
    }
}

impl fmt::Display for EngineTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch.as_str())?;
        if let Some(libc) = self.libc {
            write!(f, "-{}", libc.as_str())?;
        }
        Ok(())
    }
}

impl FromStr for EngineTarget {
    type Err = Pg0Error;

    fn from_str(raw: &str) -> Result<Self> {
        let unsupported = || {
            Pg0Error::msg(
                ErrorKind::UnsupportedPlatform,
                format!("unsupported target platform: {raw:?}"),
            )
        };
        let mut parts = raw.trim().split('-');
        let os = parts
            .next()
            .and_then(OsFamily::from_system_name)
            .ok_or_else(unsupported)?;
        let arch = parts.next().and_then(Arch::normalize).ok_or_else(unsupported)?;
        let libc = match (os, parts.next()) {
            (OsFamily::Linux, Some("gnu")) => Some(Libc::Gnu),
            (OsFamily::Linux, Some("musl")) => Some(Libc::Musl),
            (OsFamily::Darwin | OsFamily::Windows, None) => None,
            _ => return Err(unsupported()),
        };
        if parts.next().is_some() {
            return Err(unsupported());
        }
        Ok(Self::new(os, arch, libc))
    }
}

/// Detects whether the Linux userland links against musl or glibc.
///
/// The dynamic linker's own version query is tried first; when it cannot be
/// run or says nothing about musl, the musl loader file is checked instead.
/// Absence of both signals means glibc.
#[derive(Debug, Clone)]
pub struct LibcProbe {
    ldd: String,
    loader_dir: Utf8PathBuf,
    timeout: Duration,
}

impl Default for LibcProbe {
    fn default() -> Self {
        Self {
            ldd: "ldd".to_owned(),
            loader_dir: Utf8PathBuf::from(MUSL_LOADER_DIR),
            timeout: LDD_PROBE_TIMEOUT,
        }
    }
}

impl LibcProbe {
    /// Creates a probe that runs `ldd` and looks for musl loaders in `loader_dir`.
    #[must_use]
    pub fn new(ldd: impl Into<String>, loader_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            ldd: ldd.into(),
            loader_dir: loader_dir.into(),
            timeout: LDD_PROBE_TIMEOUT,
        }
    }

    /// Returns the libc flavour for `arch`.
    #[must_use]
    pub fn detect(&self, arch: Arch) -> Libc {
        if self.linker_reports_musl() || self.musl_loader_present(arch) {
            Libc::Musl
        } else {
            Libc::Gnu
        }
    }

    fn linker_reports_musl(&self) -> bool {
        let mut command = Command::new(&self.ldd);
        command.arg("--version");
        // musl's ldd exits nonzero for `--version`, so only launch and
        // timeout failures make the probe inconclusive.
        match run_captured(&mut command, Some(self.timeout), ErrorKind::Other, "ldd --version") {
            Ok(output) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                combined.to_ascii_lowercase().contains("musl")
            }
            Err(err) => {
                debug!(target: LOG_TARGET, ldd = %self.ldd, error = %err, "ldd probe inconclusive");
                false
            }
        }
    }

    fn musl_loader_present(&self, arch: Arch) -> bool {
        self.loader_dir
            .join(format!("ld-musl-{}.so.1", arch.as_str()))
            .exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::tempdir;

    fn missing_ldd_probe(loader_dir: &std::path::Path) -> color_eyre::Result<LibcProbe> {
        let dir = Utf8PathBuf::from_path_buf(loader_dir.to_path_buf())
            .map_err(|_| color_eyre::eyre::eyre!("tempdir must be UTF-8"))?;
        Ok(LibcProbe::new("pg0-test-no-such-ldd", dir))
    }

    #[rstest]
    #[case("x86_64", Arch::X86_64)]
    #[case("amd64", Arch::X86_64)]
    #[case("AMD64", Arch::X86_64)]
    #[case("aarch64", Arch::Aarch64)]
    #[case("arm64", Arch::Aarch64)]
    fn machine_strings_normalise(#[case] machine: &str, #[case] expected: Arch) {
        assert_eq!(Arch::normalize(machine), Some(expected));
    }

    #[test]
    fn amd64_and_x86_64_detect_the_same_target() -> color_eyre::Result<()> {
        let temp = tempdir()?;
        let probe = missing_ldd_probe(temp.path())?;
        let amd = EngineTarget::detect_with("Linux", "amd64", &probe)?;
        let x86 = EngineTarget::detect_with("Linux", "x86_64", &probe)?;
        assert_eq!(amd, x86);
        assert_eq!(amd.to_string(), "linux-x86_64-gnu");
        Ok(())
    }

    #[test]
    fn musl_loader_forces_musl_when_ldd_is_inconclusive() -> color_eyre::Result<()> {
        let temp = tempdir()?;
        std::fs::write(temp.path().join("ld-musl-aarch64.so.1"), b"")?;
        let probe = missing_ldd_probe(temp.path())?;

        let target = EngineTarget::detect_with("linux", "arm64", &probe)?;

        assert_eq!(target.libc(), Some(Libc::Musl));
        assert_eq!(target.to_string(), "linux-aarch64-musl");
        Ok(())
    }

    #[cfg(unix)]
    fn scripted_ldd(dir: &std::path::Path, body: &str) -> color_eyre::Result<LibcProbe> {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("ldd");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n"))?;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;
        let loader_dir = Utf8PathBuf::from_path_buf(dir.join("lib"))
            .map_err(|_| color_eyre::eyre::eyre!("tempdir must be UTF-8"))?;
        Ok(LibcProbe::new(script.to_string_lossy(), loader_dir))
    }

    #[cfg(unix)]
    #[rstest]
    #[case("echo 'musl libc (x86_64)' >&2; echo 'Version 1.2.4' >&2; exit 1", Libc::Musl)]
    #[case("echo 'ldd (GNU libc) 2.39'", Libc::Gnu)]
    #[case("head -c 200000 /dev/zero | tr '\\0' A; echo musl", Libc::Musl)]
    #[serial_test::serial]
    fn ldd_output_selects_the_libc(
        #[case] body: &str,
        #[case] expected: Libc,
    ) -> color_eyre::Result<()> {
        let temp = tempdir()?;
        let probe = scripted_ldd(temp.path(), body)?;

        assert_eq!(probe.detect(Arch::X86_64), expected);
        Ok(())
    }

    #[test]
    fn loader_for_other_arch_is_ignored() -> color_eyre::Result<()> {
        let temp = tempdir()?;
        std::fs::write(temp.path().join("ld-musl-aarch64.so.1"), b"")?;
        let probe = missing_ldd_probe(temp.path())?;

        let target = EngineTarget::detect_with("linux", "x86_64", &probe)?;

        assert_eq!(target.libc(), Some(Libc::Gnu));
        Ok(())
    }

    #[rstest]
    #[case("Darwin", "x86_64", "darwin-aarch64")]
    #[case("macos", "aarch64", "darwin-aarch64")]
    #[case("Windows", "ARM64", "windows-x86_64")]
    fn desktop_platforms_report_a_single_arch(
        #[case] system: &str,
        #[case] machine: &str,
        #[case] expected: &str,
    ) -> color_eyre::Result<()> {
        let target = EngineTarget::detect_with(system, machine, &LibcProbe::default())?;
        assert_eq!(target.to_string(), expected);
        Ok(())
    }

    #[rstest]
    #[case("freebsd", "x86_64")]
    #[case("linux", "riscv64")]
    #[case("linux", "i686")]
    fn unknown_platforms_are_rejected(#[case] system: &str, #[case] machine: &str) {
        let err = EngineTarget::detect_with(system, machine, &LibcProbe::default())
            .expect_err("platform should be unsupported");
        assert_eq!(err.kind(), ErrorKind::UnsupportedPlatform);
    }

    #[rstest]
    #[case("darwin-aarch64")]
    #[case("linux-x86_64-gnu")]
    #[case("linux-x86_64-musl")]
    #[case("linux-aarch64-gnu")]
    #[case("linux-aarch64-musl")]
    #[case("windows-x86_64")]
    fn published_target_strings_parse(#[case] raw: &str) -> color_eyre::Result<()> {
        let target: EngineTarget = raw.parse()?;
        assert_eq!(target.to_string(), raw);
        Ok(())
    }

    #[rstest]
    #[case("linux-x86_64")]
    #[case("windows-x86_64-gnu")]
    #[case("solaris-sparc")]
    #[case("linux-x86_64-musl-extra")]
    fn malformed_target_strings_are_rejected(#[case] raw: &str) {
        let err = raw
            .parse::<EngineTarget>()
            .expect_err("target should be rejected");
        assert_eq!(err.kind(), ErrorKind::UnsupportedPlatform);
    }

    #[test]
    fn windows_assets_carry_exe_suffix() -> color_eyre::Result<()> {
        let target: EngineTarget = "windows-x86_64".parse()?;
        assert_eq!(target.asset_name(), "pg0-windows-x86_64.exe");
        assert_eq!(target.binary_name(), "pg0.exe");
        Ok(())
    }
}
