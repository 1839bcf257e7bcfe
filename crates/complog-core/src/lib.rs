//! Compiler Log Core Library
//!
//! Captures every compiler call a build made, packs them with their inputs
//! into one content-addressed archive, and reads them back for replay.
//!
//! ## Layer 1 - Domain
//!
//! - [`events`]: build events correlated into ordered [`CompilerCall`]s
//! - [`archive`]: the versioned archive codec
//! - [`hosting`]: analyzer hosts shared across calls
//! - [`reader`]: the replay facade over one archive
//! - [`source`] / [`convert`]: log sniffing and the conversion pipeline
//! - [`parallel`]: concurrent hydration of many calls

pub mod archive;
pub mod args;
pub mod config;
pub mod convert;
pub mod domain;
pub mod events;
pub mod hosting;
pub mod metrics;
pub mod obs;
pub mod parallel;
pub mod reader;
pub mod source;
pub mod telemetry;

pub use archive::{
    ArchiveBuilder, ArchiveMetadata, AssemblyInfo, ContentIdentityReader, FormatVersion,
    GeneratedFilesOutProvider, GeneratedSourceProvider, IdentityReader, LATEST_VERSION,
};
pub use args::{ArgumentParser, CommandLineParser, ParsedArguments};
pub use config::{BuilderOptions, HostOptions, ReaderOptions};
pub use convert::{archive_calls, create_archive, create_archive_file, Collaborators, ConvertSummary};
pub use domain::{
    AnalyzerData, AssemblyIdentity, CompilerCall, CompilerCallKind, ComplogError, Language,
    RawContent, RawContentKind, ReferenceData, ResourceData, Result, SourceText,
};
pub use events::{correlate, correlate_log, BuildEvent, CorrelationResult, EventCorrelator};
pub use hosting::{AnalyzerHost, AnalyzerHostManager, BasicAnalyzerKind, HostLease};
pub use parallel::{hydrate_all, hydrate_all_with, ParallelConfig};
pub use reader::{CompilationData, CompilerLogReader, ReferenceImage, ResourceImage};
pub use source::{read_compiler_calls, LogKind, LogSource};

pub use complog_store::{Compression, ContentDigest, ModuleId};

pub use metrics::METRICS;
pub use obs::ArchiveSpan;
pub use telemetry::init_tracing;

/// Compiler log library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
