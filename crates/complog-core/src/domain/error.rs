//! Domain-level error taxonomy for compiler logs.

use std::path::PathBuf;

use complog_store::StorageError;

use crate::hosting::BasicAnalyzerKind;

/// Compiler log errors.
///
/// Each category a caller must be able to tell apart gets its own variant:
/// a malformed container is not a version skew, and a version skew is not
/// a parse failure.
#[derive(Debug, thiserror::Error)]
pub enum ComplogError {
    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    #[error(
        "archive format version {found} was produced by a newer tool than this reader understands (supports up to {supported})"
    )]
    ArchiveTooNew { found: u32, supported: u32 },

    #[error("cannot split compiler command line `{command_line}`: {reason}")]
    CommandLineParse {
        command_line: String,
        reason: String,
    },

    #[error("missing input file: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("no compiler call at index {index} (archive holds {count})")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("compiler call was produced by a different reader")]
    ForeignCompilerCall,

    #[error("archive already finalized")]
    AlreadyFinalized,

    #[error("analyzer loading strategy `{kind}` is not supported on this runtime")]
    Capability { kind: BasicAnalyzerKind },

    #[error("analyzer host has already been disposed")]
    HostDisposed,

    #[error("generated sources unavailable: {0}")]
    GeneratorsUnavailable(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("reader has been closed")]
    ReaderClosed,

    #[error("invalid build event: {0}")]
    InvalidEvent(String),

    #[error("invalid compiler arguments: {0}")]
    InvalidArguments(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ComplogError {
    /// Whether the error reflects an archive written by a newer tool, as
    /// opposed to a damaged one.
    pub fn is_version_skew(&self) -> bool {
        matches!(self, ComplogError::ArchiveTooNew { .. })
    }
}

/// Result type for compiler log operations.
pub type Result<T> = std::result::Result<T, ComplogError>;
