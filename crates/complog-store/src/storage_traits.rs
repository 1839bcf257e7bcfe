//! Storage trait definitions for compiler logs
//!
//! These traits define the content store abstractions an archive is built on:
//! - `BlobSink`: write side, stores each content blob once per digest and each
//!   assembly blob once per module identity
//! - `BlobSource`: read side, resolves blobs and named entries
//!
//! Two key types address blobs:
//! - `ContentDigest`: SHA-256 of the bytes (sources, configs, resources)
//! - `ModuleId`: the 16-byte module version id of a binary (references, analyzers)
//!
//! In-memory fakes are provided for testing via the `fakes` module.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Entry-name prefix for content blobs.
pub const CONTENT_PREFIX: &str = "content/";

/// Entry-name prefix for assembly blobs.
pub const ASSEMBLY_PREFIX: &str = "assembly/";

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }

    /// Archive entry name holding this blob.
    pub fn entry_name(&self) -> String {
        format!("{CONTENT_PREFIX}{}", self.0)
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl From<ContentDigest> for String {
    fn from(d: ContentDigest) -> Self {
        d.0
    }
}

impl FromStr for ContentDigest {
    type Err = StorageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ContentDigest::try_from(s.to_string())
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ModuleId
// ---------------------------------------------------------------------------

/// Binary module identity: the 16-byte module version id of a reference or
/// analyzer binary.
///
/// Two binaries with the same `ModuleId` are the same module regardless of
/// the file path they were found at.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleId(Uuid);

impl ModuleId {
    /// Wrap raw module id bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        ModuleId(Uuid::from_bytes(bytes))
    }

    /// Return the raw 16 bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Archive entry name holding this module's bytes.
    pub fn entry_name(&self) -> String {
        format!("{ASSEMBLY_PREFIX}{}", self.0.hyphenated())
    }
}

impl From<Uuid> for ModuleId {
    fn from(id: Uuid) -> Self {
        ModuleId(id)
    }
}

impl TryFrom<String> for ModuleId {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ModuleId> for String {
    fn from(id: ModuleId) -> Self {
        id.to_string()
    }
}

impl FromStr for ModuleId {
    type Err = StorageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(ModuleId)
            .map_err(|_| StorageError::InvalidModuleId {
                value: s.to_string(),
            })
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleId({})", self.0.hyphenated())
    }
}

// ---------------------------------------------------------------------------
// BlobSink / BlobSource
// ---------------------------------------------------------------------------

/// Outcome of a deduplicating put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stored<K> {
    /// Address the bytes are reachable under.
    pub key: K,
    /// `true` when the bytes were already present and nothing was written.
    pub deduplicated: bool,
}

/// Write side of a content store.
///
/// Guarantees:
/// - `put_content(data)` always returns the SHA-256 digest of `data` and
///   writes the bytes at most once per digest.
/// - `put_assembly(id, data)` writes at most once per module id; later puts
///   for the same id are ignored even if their bytes differ.
pub trait BlobSink {
    /// Store content bytes, deduplicated by digest.
    fn put_content(&mut self, data: &[u8]) -> StorageResult<Stored<ContentDigest>>;

    /// Store binary bytes, deduplicated by module identity.
    fn put_assembly(&mut self, id: ModuleId, data: &[u8]) -> StorageResult<Stored<ModuleId>>;

    /// Write a named, non-blob entry. Each name may be written once.
    fn put_entry(&mut self, name: &str, data: &[u8]) -> StorageResult<()>;
}

/// Read side of a content store.
pub trait BlobSource: Send + Sync {
    /// Read a named entry. Returns `StorageError::NotFound` if absent.
    fn read_entry(&self, name: &str) -> StorageResult<Vec<u8>>;

    /// Check whether a named entry exists.
    fn contains_entry(&self, name: &str) -> bool;

    /// All entry names, in container order.
    fn entry_names(&self) -> Vec<String>;

    /// Retrieve content bytes by digest.
    fn get_content(&self, digest: &ContentDigest) -> StorageResult<Vec<u8>> {
        self.read_entry(&digest.entry_name())
    }

    /// Retrieve binary bytes by module identity.
    fn get_assembly(&self, id: &ModuleId) -> StorageResult<Vec<u8>> {
        self.read_entry(&id.entry_name())
    }

    /// Check whether a content blob exists.
    fn contains_content(&self, digest: &ContentDigest) -> bool {
        self.contains_entry(&digest.entry_name())
    }

    /// Check whether an assembly blob exists.
    fn contains_assembly(&self, id: &ModuleId) -> bool {
        self.contains_entry(&id.entry_name())
    }
}
