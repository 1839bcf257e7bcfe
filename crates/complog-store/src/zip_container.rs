//! Zip-backed content store.
//!
//! [`ZipBlobWriter`] streams entries into a zip container and keeps the set
//! of digests and module ids already written so each blob lands exactly once.
//! [`ZipBlobReader`] serves entries back out of an existing container.
//!
//! Layout inside the container:
//! - `content/<sha256 hex>` for content blobs
//! - `assembly/<module id>` for binary blobs
//! - any other fixed names written through [`BlobSink::put_entry`]

use std::collections::HashSet;
use std::io::{Read, Seek, Write};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::StorageError;
use crate::storage_traits::*;

/// Compression applied to every entry written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    Stored,
    #[default]
    Deflated,
}

impl Compression {
    fn method(self) -> CompressionMethod {
        match self {
            Compression::Stored => CompressionMethod::Stored,
            Compression::Deflated => CompressionMethod::Deflated,
        }
    }
}

// ---------------------------------------------------------------------------
// ZipBlobWriter
// ---------------------------------------------------------------------------

/// Deduplicating writer over a zip container.
pub struct ZipBlobWriter<W: Write + Seek> {
    zip: Option<ZipWriter<W>>,
    options: SimpleFileOptions,
    contents: HashSet<ContentDigest>,
    assemblies: HashSet<ModuleId>,
    names: HashSet<String>,
}

impl<W: Write + Seek> ZipBlobWriter<W> {
    /// Start a new container on `inner`.
    pub fn new(inner: W, compression: Compression) -> Self {
        Self {
            zip: Some(ZipWriter::new(inner)),
            options: SimpleFileOptions::default()
                .compression_method(compression.method())
                .large_file(true),
            contents: HashSet::new(),
            assemblies: HashSet::new(),
            names: HashSet::new(),
        }
    }

    /// Number of distinct content blobs written so far.
    pub fn content_count(&self) -> usize {
        self.contents.len()
    }

    /// Number of distinct assembly blobs written so far.
    pub fn assembly_count(&self) -> usize {
        self.assemblies.len()
    }

    /// Whether [`finish`](Self::finish) has already run.
    pub fn is_finished(&self) -> bool {
        self.zip.is_none()
    }

    /// Write the central directory and hand back the underlying writer.
    ///
    /// Returns `StorageError::Finished` on a second call.
    pub fn finish(&mut self) -> StorageResult<W> {
        let zip = self.zip.take().ok_or(StorageError::Finished)?;
        let inner = zip.finish()?;
        debug!(
            contents = self.contents.len(),
            assemblies = self.assemblies.len(),
            entries = self.names.len(),
            "zip container finished"
        );
        Ok(inner)
    }

    fn write_named(&mut self, name: String, data: &[u8]) -> StorageResult<()> {
        let zip = self.zip.as_mut().ok_or(StorageError::Finished)?;
        if self.names.contains(&name) {
            return Err(StorageError::DuplicateEntry { name });
        }
        zip.start_file(name.as_str(), self.options)?;
        zip.write_all(data)?;
        trace!(entry = %name, bytes = data.len(), "entry written");
        self.names.insert(name);
        Ok(())
    }
}

impl<W: Write + Seek> BlobSink for ZipBlobWriter<W> {
    fn put_content(&mut self, data: &[u8]) -> StorageResult<Stored<ContentDigest>> {
        let digest = ContentDigest::from_bytes(data);
        if self.contents.contains(&digest) {
            return Ok(Stored {
                key: digest,
                deduplicated: true,
            });
        }
        self.write_named(digest.entry_name(), data)?;
        self.contents.insert(digest.clone());
        Ok(Stored {
            key: digest,
            deduplicated: false,
        })
    }

    fn put_assembly(&mut self, id: ModuleId, data: &[u8]) -> StorageResult<Stored<ModuleId>> {
        if self.assemblies.contains(&id) {
            return Ok(Stored {
                key: id,
                deduplicated: true,
            });
        }
        self.write_named(id.entry_name(), data)?;
        self.assemblies.insert(id);
        Ok(Stored {
            key: id,
            deduplicated: false,
        })
    }

    fn put_entry(&mut self, name: &str, data: &[u8]) -> StorageResult<()> {
        self.write_named(name.to_string(), data)
    }
}

// ---------------------------------------------------------------------------
// ZipBlobReader
// ---------------------------------------------------------------------------

/// Read access to a zip container.
///
/// `ZipArchive` needs `&mut` to open an entry, so the archive sits behind a
/// mutex; entry reads are serialized but callers can share the reader freely.
pub struct ZipBlobReader<R: Read + Seek + Send> {
    archive: Mutex<ZipArchive<R>>,
    names: Vec<String>,
    name_set: HashSet<String>,
}

impl<R: Read + Seek + Send> ZipBlobReader<R> {
    /// Open a container. Fails if `inner` is not a zip.
    pub fn new(inner: R) -> StorageResult<Self> {
        let archive = ZipArchive::new(inner)?;
        let names: Vec<String> = (0..archive.len())
            .filter_map(|i| archive.name_for_index(i).map(str::to_string))
            .collect();
        let name_set = names.iter().cloned().collect();
        Ok(Self {
            archive: Mutex::new(archive),
            names,
            name_set,
        })
    }

    /// Name of the first entry in container order, if any.
    pub fn first_entry_name(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }
}

/// Largest buffer reserved up front from a declared entry size. Entries
/// past it grow as they are read.
const MAX_PREALLOCATION: u64 = 1 << 20;

fn initial_capacity(declared: u64) -> usize {
    usize::try_from(declared.min(MAX_PREALLOCATION)).unwrap_or(0)
}

impl<R: Read + Seek + Send> BlobSource for ZipBlobReader<R> {
    fn read_entry(&self, name: &str) -> StorageResult<Vec<u8>> {
        let mut archive = self.archive.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = archive.by_name(name).map_err(|e| match e {
            ZipError::FileNotFound => StorageError::NotFound {
                key: name.to_string(),
            },
            other => StorageError::from(other),
        })?;
        let mut buf = Vec::with_capacity(initial_capacity(file.size()));
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn contains_entry(&self, name: &str) -> bool {
        self.name_set.contains(name)
    }

    fn entry_names(&self) -> Vec<String> {
        self.names.clone()
    }
}
