//! The archive codec.
//!
//! An archive is a zip container holding:
//! - `metadata.txt`: format version, call count, origin platform
//! - `assemblyinfo.txt`: canonical name per module id
//! - `compilations/{index}.{txt|json}`: one record per compiler call
//! - `content/{sha256}` and `assembly/{module id}`: deduplicated blobs
//!
//! [`ArchiveBuilder`] always writes the latest format. Reading goes through
//! [`decode_compilation`], which dispatches on the header version.

pub mod builder;
pub mod decode;
pub mod format;
pub mod generated;
pub mod identity;
pub mod pack;

pub use builder::ArchiveBuilder;
pub use decode::{decode_compilation, ArgumentSource, AssemblyIndex, CompilationRecord};
pub use format::{
    ArchiveMetadata, AssemblyInfo, FormatVersion, ASSEMBLY_INFO_ENTRY, LATEST_VERSION,
    METADATA_ENTRY, OLDEST_VERSION,
};
pub use generated::{
    GeneratedFile, GeneratedFilesOutProvider, GeneratedSourceProvider, GeneratedSources,
};
pub use identity::{ContentIdentityReader, IdentityReader};
