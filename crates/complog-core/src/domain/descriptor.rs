//! Descriptors for the inputs of a compiler call.
//!
//! Many descriptors may point at one stored blob: references and analyzers
//! resolve to an assembly blob by module identity, everything else to a
//! content blob by digest.

use std::fmt;
use std::sync::Arc;

use complog_store::{ContentDigest, ModuleId};
use serde::{Deserialize, Serialize};

use crate::domain::error::{ComplogError, Result};

/// Identity of a reference or analyzer binary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssemblyIdentity {
    pub module_id: ModuleId,
    /// Assembly name, e.g. `System.Runtime`.
    pub name: String,
    pub informational_version: Option<String>,
}

/// A reference as used by one compiler call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub identity: AssemblyIdentity,
    /// Path the reference had in the original build.
    pub file_path: String,
    /// Extern aliases for this use site.
    pub aliases: Vec<String>,
    /// Whether interop types are embedded (`/link:`).
    pub embed_interop: bool,
}

/// An analyzer or generator binary as used by one compiler call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerData {
    pub identity: AssemblyIdentity,
    /// Path the analyzer had in the original build.
    pub file_path: String,
}

impl AnalyzerData {
    /// File name component of the original path.
    pub fn file_name(&self) -> &str {
        file_name_of(&self.file_path)
    }
}

/// A managed resource passed to the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceData {
    pub digest: ContentDigest,
    /// Logical name of the manifest resource.
    pub name: String,
    /// File name for linked resources.
    pub file_name: Option<String>,
    pub is_public: bool,
}

/// Role a text or data file plays in a compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawContentKind {
    Source,
    AdditionalText,
    AnalyzerConfig,
    Embed,
    #[serde(rename = "ruleset")]
    RuleSet,
    KeyFile,
    SourceLink,
    GeneratedText,
}

impl fmt::Display for RawContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RawContentKind::Source => "source",
            RawContentKind::AdditionalText => "additional_text",
            RawContentKind::AnalyzerConfig => "analyzer_config",
            RawContentKind::Embed => "embed",
            RawContentKind::RuleSet => "ruleset",
            RawContentKind::KeyFile => "key_file",
            RawContentKind::SourceLink => "source_link",
            RawContentKind::GeneratedText => "generated_text",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for RawContentKind {
    type Err = ComplogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "source" => Ok(RawContentKind::Source),
            "additional_text" => Ok(RawContentKind::AdditionalText),
            "analyzer_config" => Ok(RawContentKind::AnalyzerConfig),
            "embed" => Ok(RawContentKind::Embed),
            "ruleset" => Ok(RawContentKind::RuleSet),
            "key_file" => Ok(RawContentKind::KeyFile),
            "source_link" => Ok(RawContentKind::SourceLink),
            "generated_text" => Ok(RawContentKind::GeneratedText),
            other => Err(ComplogError::MalformedArchive(format!(
                "unknown content kind `{other}`"
            ))),
        }
    }
}

/// One logical file entry pointing at a content blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawContent {
    pub kind: RawContentKind,
    /// Path the file had in the original build.
    pub file_path: String,
    pub digest: ContentDigest,
}

/// Text of a source-like input, decoded for the compiler front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    pub file_path: String,
    pub text: Arc<str>,
}

impl SourceText {
    /// Decode bytes as UTF-8, replacing invalid sequences.
    pub fn from_bytes(file_path: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            file_path: file_path.into(),
            text: Arc::from(String::from_utf8_lossy(bytes).as_ref()),
        }
    }
}

/// Last path component, accepting either separator so that archives made on
/// another platform still resolve names.
pub(crate) fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_handles_both_separators() {
        assert_eq!(file_name_of("/pkgs/gen/Gen.dll"), "Gen.dll");
        assert_eq!(file_name_of(r"C:\pkgs\gen\Gen.dll"), "Gen.dll");
        assert_eq!(file_name_of("Gen.dll"), "Gen.dll");
    }

    #[test]
    fn raw_content_kind_serializes_snake_case() {
        let json = serde_json::to_string(&RawContentKind::AnalyzerConfig).unwrap();
        assert_eq!(json, "\"analyzer_config\"");
        assert_eq!(RawContentKind::GeneratedText.to_string(), "generated_text");
        assert_eq!(
            "ruleset".parse::<RawContentKind>().unwrap(),
            RawContentKind::RuleSet
        );
    }

    #[test]
    fn source_text_replaces_invalid_utf8() {
        let text = SourceText::from_bytes("a.cs", b"class C {}\xff");
        assert_eq!(&*text.text, "class C {}\u{fffd}");
    }
}
