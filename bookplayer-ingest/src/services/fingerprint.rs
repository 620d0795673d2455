//! File fingerprints and the persisted fingerprint table
//!
//! A fingerprint is the SHA-256 digest of a file's full contents. The
//! directory watcher keeps one per file name and persists the table as a
//! JSON object of hex digests:
//!
//! ```json
//! { "dune.m4b": "3f2a...", "emma.m4b": "9b1c..." }
//! ```

use bookplayer_common::atomic::write_atomic;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Read size used while hashing
pub const HASH_CHUNK_SIZE: usize = 1024 * 1024;

/// SHA-256 digest of a file's contents
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Digest of an in-memory buffer
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Fingerprint::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Hash a file in [`HASH_CHUNK_SIZE`] chunks (blocking)
pub fn hash_file(path: &Path) -> io::Result<Fingerprint> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Fingerprint(hasher.finalize().into()))
}

/// Hash a file on the blocking thread pool
pub async fn hash_file_blocking(path: PathBuf) -> io::Result<Fingerprint> {
    tokio::task::spawn_blocking(move || hash_file(&path))
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("Hash task failed: {}", e)))?
}

/// How a freshly computed digest relates to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Name not in the table
    New,
    /// Name present with a different digest
    Changed,
    /// Name present with the same digest
    Unchanged,
}

/// File name → digest at last observation
///
/// Entries for files that disappeared are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FingerprintTable {
    entries: BTreeMap<String, Fingerprint>,
}

impl FingerprintTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Fingerprint> {
        self.entries.get(name)
    }

    pub fn observe(&self, name: &str, fingerprint: &Fingerprint) -> Observation {
        match self.entries.get(name) {
            None => Observation::New,
            Some(known) if known == fingerprint => Observation::Unchanged,
            Some(_) => Observation::Changed,
        }
    }

    /// Record the digest seen for `name`, replacing any earlier one
    pub fn record(&mut self, name: impl Into<String>, fingerprint: Fingerprint) {
        self.entries.insert(name.into(), fingerprint);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Fingerprint)> {
        self.entries.iter().map(|(name, fp)| (name.as_str(), fp))
    }
}

/// JSON file holding a [`FingerprintTable`] between runs
#[derive(Debug, Clone)]
pub struct FingerprintStore {
    path: PathBuf,
}

impl FingerprintStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the table; a missing or unreadable file yields an empty table
    ///
    /// A corrupt file is logged and replaced at the next flush. Every file
    /// in the watched directory is then reported as new once.
    pub fn load(&self) -> FingerprintTable {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No fingerprint store; starting empty");
                return FingerprintTable::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Fingerprint store unreadable; starting empty");
                return FingerprintTable::new();
            }
        };

        match serde_json::from_slice::<FingerprintTable>(&data) {
            Ok(table) => {
                info!(path = %self.path.display(), entries = table.len(), "Loaded fingerprint store");
                table
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Fingerprint store corrupt; starting empty");
                FingerprintTable::new()
            }
        }
    }

    /// Replace the file with `table` in one atomic rename
    pub fn flush(&self, table: &FingerprintTable) -> bookplayer_common::Result<()> {
        let data = serde_json::to_vec_pretty(table).map_err(|e| {
            bookplayer_common::Error::Internal(format!("Serialize fingerprint table: {}", e))
        })?;
        write_atomic(&self.path, &data)?;
        debug!(path = %self.path.display(), entries = table.len(), "Flushed fingerprint store");
        Ok(())
    }

    /// [`FingerprintStore::flush`] on the blocking pool
    pub async fn flush_blocking(&self, table: &FingerprintTable) -> bookplayer_common::Result<()> {
        let store = self.clone();
        let table = table.clone();
        tokio::task::spawn_blocking(move || store.flush(&table))
            .await
            .map_err(|e| bookplayer_common::Error::Internal(format!("Flush task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hash_file_matches_in_memory_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.m4b");
        std::fs::write(&path, b"test content").unwrap();

        assert_eq!(hash_file(&path).unwrap(), Fingerprint::of_bytes(b"test content"));
    }

    #[test]
    fn test_hash_spans_multiple_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.m4b");
        let data: Vec<u8> = (0..HASH_CHUNK_SIZE * 2 + 17).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        assert_eq!(hash_file(&path).unwrap(), Fingerprint::of_bytes(&data));
    }

    #[tokio::test]
    async fn test_hash_missing_file_is_error() {
        let err = hash_file_blocking(PathBuf::from("/nonexistent/x.m4b"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_flush_blocking_then_load() {
        let dir = TempDir::new().unwrap();
        let store = FingerprintStore::new(dir.path().join("state").join("fingerprints.json"));
        let mut table = FingerprintTable::new();
        table.record("dune.m4b".to_string(), Fingerprint::of_bytes(b"spice"));

        store.flush_blocking(&table).await.unwrap();

        assert_eq!(store.load(), table);
    }

    #[test]
    fn test_hex_rejects_wrong_length() {
        assert!(Fingerprint::from_hex("abcd").is_err());
        let fp = Fingerprint::of_bytes(b"x");
        assert_eq!(Fingerprint::from_hex(&fp.to_hex()).unwrap(), fp);
    }

    #[test]
    fn test_observe_classifies_digests() {
        let mut table = FingerprintTable::new();
        let one = Fingerprint::of_bytes(b"one");
        let two = Fingerprint::of_bytes(b"two");

        assert_eq!(table.observe("a", &one), Observation::New);
        table.record("a", one);
        assert_eq!(table.observe("a", &one), Observation::Unchanged);
        assert_eq!(table.observe("a", &two), Observation::Changed);
    }

    #[test]
    fn test_store_file_is_name_to_hex_object() {
        let dir = TempDir::new().unwrap();
        let store = FingerprintStore::new(dir.path().join("fingerprints.json"));
        let mut table = FingerprintTable::new();
        table.record("dune.m4b", Fingerprint::of_bytes(b"dune"));

        store.flush(&table).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["dune.m4b"], Fingerprint::of_bytes(b"dune").to_hex());
        assert_eq!(store.load(), table);
    }

    #[test]
    fn test_missing_store_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = FingerprintStore::new(dir.path().join("absent.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_corrupt_store_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fingerprints.json");
        std::fs::write(&path, b"{ not json").unwrap();

        assert!(FingerprintStore::new(&path).load().is_empty());
    }
}
