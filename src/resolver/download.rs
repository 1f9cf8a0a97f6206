//! Release downloads from GitHub with checksum verification.

use std::fs::File;
use std::io::Write;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{Context, eyre};
use serde::Deserialize;
use tracing::{info, warn};

use super::checksum::{ChecksumTable, sha256_file};
use super::config::ResolverConfig;
use super::target::EngineTarget;
use crate::error::{ErrorKind, Pg0Error, Result};
use crate::fs::make_executable;
use crate::observability::LOG_TARGET;

const USER_AGENT: &str = concat!("pg0-client/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);
const STAGING_PREFIX: &str = ".pg0-download-";

/// Where engine releases come from.
///
/// The production implementation is [`HttpReleaseSource`]; tests substitute
/// a local source.
#[cfg_attr(test, mockall::automock)]
pub trait ReleaseSource: Send + Sync {
    /// Returns the tag of the latest published release of `repo`.
    ///
    /// # Errors
    ///
    /// Returns an error when the release metadata cannot be fetched.
    fn latest_version(&self, repo: &str) -> color_eyre::Result<String>;

    /// Streams the asset at `url` into `dest`, returning the bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the body cannot be written.
    fn fetch(&self, url: &str, dest: &mut File) -> color_eyre::Result<u64>;
}

/// Fetches releases over HTTPS with a blocking `reqwest` client.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpReleaseSource;

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: String,
}

impl HttpReleaseSource {
    fn client(timeout: Duration) -> color_eyre::Result<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("build HTTP client")
    }
}

impl ReleaseSource for HttpReleaseSource {
    fn latest_version(&self, repo: &str) -> color_eyre::Result<String> {
        let url = format!("https://api.github.com/repos/{repo}/releases/latest");
        let release: LatestRelease = Self::client(REQUEST_TIMEOUT)?
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .with_context(|| format!("fetch {url}"))?
            .json()
            .with_context(|| format!("parse release metadata from {url}"))?;
        Ok(release.tag_name)
    }

    fn fetch(&self, url: &str, dest: &mut File) -> color_eyre::Result<u64> {
        let mut response = Self::client(DOWNLOAD_TIMEOUT)?
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .with_context(|| format!("download {url}"))?;
        let written = response
            .copy_to(dest)
            .with_context(|| format!("write body of {url}"))?;
        dest.flush().context("flush download")?;
        Ok(written)
    }
}

/// Builds the public URL of a release asset.
#[must_use]
pub fn release_url(repo: &str, version: &str, target: EngineTarget) -> String {
    format!(
        "https://github.com/{repo}/releases/download/{version}/{}",
        target.asset_name()
    )
}

/// What to download and where to put it.
pub(crate) struct DownloadRequest<'a> {
    pub(crate) repo: &'a str,
    pub(crate) version: &'a str,
    pub(crate) target: EngineTarget,
    pub(crate) checksums: &'a ChecksumTable,
    pub(crate) install_dir: &'a Utf8Path,
}

/// Downloads the engine into a staging file inside the install directory,
/// verifies it, and renames it into place.
///
/// A checksum mismatch deletes the staging file and leaves the install
/// directory untouched.
pub(crate) fn download_engine(
    source: &dyn ReleaseSource,
    request: &DownloadRequest<'_>,
) -> Result<Utf8PathBuf> {
    let url = release_url(request.repo, request.version, request.target);
    // Lookups only probe the host's binary name, whatever target was fetched.
    let destination = request
        .install_dir
        .join(ResolverConfig::host_binary_name());
    info!(target: LOG_TARGET, %url, version = request.version, "downloading engine");

    let mut staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(request.install_dir)
        .with_context(|| format!("create staging file in {}", request.install_dir))
        .map_err(not_found)?;
    let staging_path = Utf8PathBuf::from_path_buf(staging.path().to_path_buf())
        .map_err(|path| eyre!("staging path is not UTF-8: {}", path.display()))
        .map_err(not_found)?;

    source
        .fetch(&url, staging.as_file_mut())
        .map_err(|report| not_found(report.wrap_err(format!("failed to download {url}"))))?;

    verify_checksum(request, &staging_path)?;

    make_executable(&staging_path).map_err(not_found)?;
    staging
        .persist(&destination)
        .map_err(|err| eyre!("install {destination}: {}", err.error))
        .map_err(not_found)?;
    Ok(destination)
}

fn verify_checksum(request: &DownloadRequest<'_>, staging: &Utf8Path) -> Result<()> {
    let target = request.target.to_string();
    let Some(expected) = request.checksums.expected(&target) else {
        warn!(target: LOG_TARGET, %target, "no checksum available; installing unverified");
        return Ok(());
    };

    let actual = sha256_file(staging).map_err(|err| err.with_kind(ErrorKind::EngineNotFound))?;
    if actual != expected {
        return Err(Pg0Error::msg(
            ErrorKind::ChecksumMismatch,
            format!("checksum mismatch for {target}: expected {expected}, actual {actual}"),
        ));
    }
    info!(target: LOG_TARGET, %target, "checksum verified");
    Ok(())
}

fn not_found(report: color_eyre::Report) -> Pg0Error {
    Pg0Error::new(ErrorKind::EngineNotFound, report)
}
