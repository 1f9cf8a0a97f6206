//! Status snapshots reported by the engine.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use super::config::DEFAULT_INSTANCE_NAME;

/// Point-in-time status of one instance, as reported by `pg0 info -o json`.
///
/// Every field tolerates absence; the optional fields are normally only
/// present while the instance runs.
///
/// # Examples
///
/// ```
/// use pg0_client::InstanceInfo;
///
/// let info: InstanceInfo = serde_json::from_str(r#"{"running": false}"#)?;
/// assert_eq!(info.name, "default");
/// assert!(info.uri.is_none());
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceInfo {
    /// Instance name.
    pub name: String,
    /// Whether the server process is up.
    pub running: bool,
    /// Server process id.
    pub pid: Option<u32>,
    /// Listening port.
    pub port: Option<u16>,
    /// PostgreSQL server version.
    pub version: Option<String>,
    /// Database role.
    pub username: Option<String>,
    /// Database name.
    pub database: Option<String>,
    /// Data directory.
    pub data_dir: Option<Utf8PathBuf>,
    /// Connection URI.
    pub uri: Option<String>,
}

impl Default for InstanceInfo {
    fn default() -> Self {
        Self::stopped(DEFAULT_INSTANCE_NAME)
    }
}

impl InstanceInfo {
    /// Snapshot of an instance that is not running.
    #[must_use]
    pub fn stopped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: false,
            pid: None,
            port: None,
            version: None,
            username: None,
            database: None,
            data_dir: None,
            uri: None,
        }
    }
}

/// Splits line-oriented engine output, dropping blank lines.
pub(crate) fn non_blank_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(str::to_owned)
        .collect()
}
