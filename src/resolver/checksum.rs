//! SHA-256 verification for downloaded engine artefacts.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;

use camino::Utf8Path;
use color_eyre::eyre::eyre;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Known-good SHA-256 digests keyed by target string (`linux-x86_64-gnu`, ...).
///
/// Targets without an entry are installed unverified, with a warning.
///
/// # Examples
///
/// ```
/// use pg0_client::ChecksumTable;
///
/// let table = ChecksumTable::new().with_entry("darwin-aarch64", "AB12");
/// assert_eq!(table.expected("darwin-aarch64"), Some("ab12"));
/// assert_eq!(table.expected("windows-x86_64"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumTable {
    entries: BTreeMap<String, String>,
}

impl ChecksumTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the expected hex digest for `target`.
    ///
    /// Digests are compared case-insensitively; blank digests are ignored.
    #[must_use]
    pub fn with_entry(mut self, target: impl Into<String>, sha256_hex: impl AsRef<str>) -> Self {
        let digest = sha256_hex.as_ref().trim().to_ascii_lowercase();
        if !digest.is_empty() {
            self.entries.insert(target.into(), digest);
        }
        self
    }

    /// Returns the expected digest for `target`, if one is known.
    #[must_use]
    pub fn expected(&self, target: &str) -> Option<&str> {
        self.entries.get(target).map(String::as_str)
    }
}

/// Computes the lowercase hex SHA-256 digest of a file using chunked reads.
#[expect(
    clippy::indexing_slicing,
    reason = "bytes_read is always <= buffer.len()"
)]
pub(crate) fn sha256_file(path: &Utf8Path) -> Result<String> {
    let mut file =
        fs::File::open(path).map_err(|e| eyre!("failed to open artefact '{path}': {e}"))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| eyre!("failed to read artefact '{path}': {e}"))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::tempdir;

    #[test]
    fn digest_matches_known_vector() -> color_eyre::Result<()> {
        let temp = tempdir()?;
        let path = Utf8PathBuf::from_path_buf(temp.path().join("abc"))
            .map_err(|_| eyre!("tempdir must be UTF-8"))?;
        fs::write(&path, b"abc")?;

        let digest = sha256_file(&path)?;

        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        Ok(())
    }

    #[test]
    fn blank_entries_are_not_recorded() {
        let table = ChecksumTable::new()
            .with_entry("linux-x86_64-gnu", "")
            .with_entry("linux-x86_64-musl", "  ");
        assert_eq!(table.expected("linux-x86_64-gnu"), None);
        assert_eq!(table.expected("linux-x86_64-musl"), None);
    }
}
