//! complog-store: content-addressed storage for compiler logs
//!
//! This crate is the persistence layer of a compiler log archive. It knows
//! nothing about compilers; it stores bytes.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: each unique blob stored exactly once, stable addressing, and a
//! single portable container file.
//!
//! ## Key Components
//!
//! - `ContentDigest`: SHA-256 address of a content blob
//! - `ModuleId`: module version id addressing a binary blob
//! - `BlobSink` / `BlobSource`: write/read traits
//! - `ZipBlobWriter` / `ZipBlobReader`: the zip container implementation

mod error;
pub mod fakes;
pub mod storage_traits;
pub mod zip_container;

pub use error::StorageError;
pub use storage_traits::{
    BlobSink, BlobSource, ContentDigest, ModuleId, StorageResult, Stored, ASSEMBLY_PREFIX,
    CONTENT_PREFIX,
};
pub use zip_container::{Compression, ZipBlobReader, ZipBlobWriter};
