//! Per-compilation records as stored in the archive.
//!
//! Version 2 stores each compilation as a JSON [`CompilationPack`]. The
//! raw argument list lives in a content blob of its own so identical
//! command lines share storage and callers that only enumerate calls never
//! read it. Reference and analyzer entries carry only the module id; the
//! assembly name comes from the archive-wide assembly index.

use complog_store::{ContentDigest, ModuleId};
use serde::{Deserialize, Serialize};

use crate::domain::{CompilerCallKind, Language, RawContent, ResourceData};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackReference {
    pub module_id: ModuleId,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub embed_interop: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackAnalyzer {
    pub module_id: ModuleId,
    pub file_path: String,
}

/// A version 2 compilation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationPack {
    pub project_file_path: String,
    pub kind: CompilerCallKind,
    pub language: Language,
    #[serde(default)]
    pub target_framework: Option<String>,
    #[serde(default)]
    pub compiler_file_path: Option<String>,
    /// Content blob holding the JSON-encoded argument list.
    pub arguments: ContentDigest,
    #[serde(default)]
    pub contents: Vec<RawContent>,
    #[serde(default)]
    pub references: Vec<PackReference>,
    #[serde(default)]
    pub analyzers: Vec<PackAnalyzer>,
    #[serde(default)]
    pub resources: Vec<ResourceData>,
    /// Why generated sources could not be captured, if they could not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_unavailable: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_may_be_absent() {
        let digest = ContentDigest::from_bytes(b"[]");
        let json = format!(
            r#"{{"project_file_path":"/src/a.csproj","kind":"regular","language":"csharp","arguments":"{digest}"}}"#
        );
        let pack: CompilationPack = serde_json::from_str(&json).unwrap();
        assert_eq!(pack.kind, CompilerCallKind::Regular);
        assert!(pack.references.is_empty());
        assert!(pack.generated_unavailable.is_none());
    }

    #[test]
    fn bad_digest_is_rejected() {
        let json = r#"{"project_file_path":"/a","kind":"regular","language":"csharp","arguments":"xyz"}"#;
        assert!(serde_json::from_str::<CompilationPack>(json).is_err());
    }
}
