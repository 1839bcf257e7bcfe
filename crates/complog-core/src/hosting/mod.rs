//! Analyzer hosting for replay.
//!
//! # Modules
//!
//! - [`strategy`] — `BasicAnalyzerKind` and host fingerprints
//! - [`context`]  — `ExecutionContext` (in-memory, on-disk) and its factory
//! - [`host`]     — `AnalyzerHost`, `DiagnosticSink`, `GeneratedText`
//! - [`manager`]  — `AnalyzerHostManager`, `HostLease`, `HostInputs`

pub mod context;
pub mod host;
pub mod manager;
pub mod strategy;

pub use context::{
    ContextFactory, DefaultContextFactory, ExecutionContext, InMemoryContext, LoadedModule,
    OnDiskContext,
};
pub use host::{AnalyzerHost, DiagnosticSink, GeneratedText};
pub use manager::{AnalyzerHostManager, HostInputs, HostLease};
pub use strategy::{fingerprint, BasicAnalyzerKind};
