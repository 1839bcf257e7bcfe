//! Extracting the identity of reference and analyzer binaries.

use std::path::Path;

use complog_store::ModuleId;
use sha2::{Digest, Sha256};

use crate::domain::{AssemblyIdentity, Result};

/// Reads the module identity out of a binary.
///
/// The compiler front end owns the metadata format; an implementation
/// backed by it reads the real module version id, assembly name and
/// informational version.
pub trait IdentityReader: Send + Sync {
    fn read_identity(&self, path: &Path, bytes: &[u8]) -> Result<AssemblyIdentity>;
}

/// Identity derived from the bytes themselves.
///
/// The module id is the first 16 bytes of the SHA-256 of the binary, so
/// identical binaries share an identity whatever path they came from. The
/// assembly name is the file stem.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentIdentityReader;

impl IdentityReader for ContentIdentityReader {
    fn read_identity(&self, path: &Path, bytes: &[u8]) -> Result<AssemblyIdentity> {
        let hash = Sha256::digest(bytes);
        let mut id = [0u8; 16];
        id.copy_from_slice(&hash[..16]);
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(AssemblyIdentity {
            module_id: ModuleId::from_bytes(id),
            name,
            informational_version: None,
        })
    }
}
