//! Error types for complog-store

use thiserror::Error;

/// Errors raised by blob stores and the zip container.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No blob or entry exists under the given key
    #[error("not found: {key}")]
    NotFound { key: String },

    /// A digest string was not 64 lowercase-able hex characters
    #[error("invalid content digest: {digest}")]
    InvalidDigest { digest: String },

    /// A module id string was not a valid 16-byte identifier
    #[error("invalid module id: {value}")]
    InvalidModuleId { value: String },

    /// A named entry was written twice
    #[error("duplicate archive entry: {name}")]
    DuplicateEntry { name: String },

    /// The container was already finished; no further writes are accepted
    #[error("container already finished")]
    Finished,

    /// The zip container rejected an operation
    #[error("container error: {0}")]
    Container(String),

    /// Underlying I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for StorageError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => StorageError::Io(io),
            other => StorageError::Container(other.to_string()),
        }
    }
}
