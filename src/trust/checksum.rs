//! SHA-256 hashing of widget files and the build-time bundled checksum table.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::core::errors::{DeckhandError, Result};

/// Streaming read buffer size for hashing.
const HASH_BUF_BYTES: usize = 8 * 1024;

/// Checksums of the widgets shipped in the bundled directory, keyed by file
/// name. Regenerated by the release packaging step whenever a bundled widget
/// changes; verification of these entries can never be configured away.
static BUILTIN: &[(&str, &str)] = &[
    (
        "sys_cpu",
        "65e92a54c468e8dca22829c3320ccc629ae9f0394351a494f921b6d623e16f68",
    ),
    (
        "sys_mem",
        "94f3daabfcbb822400157e1332a5f1b4acf59b183b3b03e2bc80d54e06789b88",
    ),
    (
        "sys_disk",
        "fcae3e84176efe12c708dcd0982badf8bed020ac7f41e49cbe9929f3e8e83367",
    ),
    (
        "net_ping",
        "6708e46b70a736e0d68ea4831bf46c97a8c037d988b32baa22eb773d20a10866",
    ),
    (
        "dkh_clock",
        "bf8cc007c11306faccdbe04220a1e094dde423ca3e072d769d4d51e6099f4dc9",
    ),
];

/// Compute the lowercase hex SHA-256 of a file's bytes.
///
/// Reads the file fresh on every call. Callers must not cache the result
/// across executions: recomputing at execution time is what catches a file
/// tampered with between two runs of the same widget.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|source| DeckhandError::io(path, source))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_BUF_BYTES];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|source| DeckhandError::io(path, source))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// The bundled-widget checksum table.
#[derive(Debug, Clone)]
pub struct BundledChecksums {
    entries: HashMap<String, String>,
}

impl BundledChecksums {
    /// Table embedded at build time.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN
                .iter()
                .map(|(name, hex)| ((*name).to_string(), (*hex).to_string()))
                .collect(),
        }
    }

    /// Construct an explicit table (tests, packaging verification).
    #[must_use]
    pub fn with_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, hex)| (name.into(), hex.into().to_ascii_lowercase()))
                .collect(),
        }
    }

    /// Expected checksum for a bundled widget file name, if known.
    #[must_use]
    pub fn expected(&self, file_name: &str) -> Option<&str> {
        self.entries.get(file_name).map(String::as_str)
    }

    /// Number of known bundled widgets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Case-insensitive hex comparison for user-supplied checksums.
#[must_use]
pub fn checksum_matches(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}
