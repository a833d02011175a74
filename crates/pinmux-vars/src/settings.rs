//! Persisted key/value settings.
//!
//! [`Settings`] is the flat string map an external serializer stores. Lookups
//! honour the legacy `$signal$` and `$$` key prefixes. [`SettingsFile`] frames
//! a map for disk:
//!
//! ```text
//! [magic "PMX\0"] [major: u8] [minor: u8] [flags: u8] [reserved: u8]
//! [entry_count: u32 LE] [payload_len: u32 LE] [json: N bytes] [sha256: 32 bytes]
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::SettingsError;

const MAGIC: [u8; 4] = *b"PMX\0";
const VERSION_MAJOR: u8 = 1;
const VERSION_MINOR: u8 = 0;
const HEADER_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

/// Flat settings map, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    entries: BTreeMap<String, String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key. If absent, a `$signal$KEY` or `$$KEY` request falls
    /// back to `KEY`, and a bare request falls back to the prefixed forms.
    pub fn get(&self, key: &str) -> Option<&str> {
        if let Some(v) = self.entries.get(key) {
            return Some(v);
        }
        let candidates = match key.strip_prefix("$signal$").or_else(|| key.strip_prefix("$$")) {
            Some(bare) => vec![bare.to_string()],
            None => vec![format!("$signal${key}"), format!("$${key}")],
        };
        candidates
            .iter()
            .find_map(|k| self.entries.get(k))
            .map(String::as_str)
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries whose key starts with `prefix`.
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.entries
            .range(prefix.to_string()..)
            .take_while(move |(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Integrity-checked on-disk envelope for [`Settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsFile {
    pub settings: Settings,
}

impl SettingsFile {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SettingsError> {
        let json = serde_json::to_vec(&self.settings).map_err(|e| SettingsError::Serialization(e.to_string()))?;

        let mut buf = Vec::with_capacity(HEADER_LEN + json.len() + DIGEST_LEN);
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&[VERSION_MAJOR, VERSION_MINOR, 0, 0]);
        buf.extend_from_slice(&(self.settings.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(json.len() as u32).to_le_bytes());
        buf.extend_from_slice(&json);

        let digest = Sha256::digest(&buf);
        buf.extend_from_slice(&digest);
        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, SettingsError> {
        let too_short = |expected| SettingsError::TooShort {
            expected,
            actual: data.len(),
        };
        if data.len() < HEADER_LEN + DIGEST_LEN {
            return Err(too_short(HEADER_LEN + DIGEST_LEN));
        }
        if data[..4] != MAGIC {
            return Err(SettingsError::InvalidMagic);
        }
        let (major, minor) = (data[4], data[5]);
        if major != VERSION_MAJOR {
            return Err(SettingsError::UnsupportedVersion { major, minor });
        }
        let entry_count = read_u32(data, 8) as usize;
        let payload_end = HEADER_LEN + read_u32(data, 12) as usize;
        if data.len() < payload_end + DIGEST_LEN {
            return Err(too_short(payload_end + DIGEST_LEN));
        }

        let stored = &data[payload_end..payload_end + DIGEST_LEN];
        let computed = Sha256::digest(&data[..payload_end]);
        if computed.as_slice() != stored {
            return Err(SettingsError::IntegrityFailed {
                expected: hex(stored),
                actual: hex(&computed),
            });
        }

        let settings: Settings = serde_json::from_slice(&data[HEADER_LEN..payload_end])
            .map_err(|e| SettingsError::Deserialization(e.to_string()))?;
        if settings.len() != entry_count {
            return Err(SettingsError::Deserialization(format!(
                "entry count mismatch: header says {entry_count}, payload has {}",
                settings.len()
            )));
        }
        tracing::debug!(entries = entry_count, "settings file decoded");
        Ok(Self { settings })
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
