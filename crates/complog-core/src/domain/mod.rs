//! Domain models for compiler logs.
//!
//! Canonical definitions for the core entities:
//! - `CompilerCall`: one logical compiler invocation
//! - `ReferenceData` / `AnalyzerData` / `ResourceData` / `RawContent`: inputs
//! - `ComplogError`: the error taxonomy

pub mod call;
pub mod descriptor;
pub mod error;

// Re-export main types and errors
pub use call::{CompilerCall, CompilerCallKind, Language, OwnerToken};
pub use descriptor::{
    AnalyzerData, AssemblyIdentity, RawContent, RawContentKind, ReferenceData, ResourceData,
    SourceText,
};
pub use error::{ComplogError, Result};
