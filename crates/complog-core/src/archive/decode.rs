//! Version-specific decoding of compilation records.
//!
//! Each supported format version has one decode function. All of them
//! produce a [`CompilationRecord`]; the header's version alone picks which
//! one runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use complog_store::{BlobSource, ContentDigest, ModuleId, StorageError};

use crate::archive::format::{AssemblyInfo, FormatVersion};
use crate::archive::pack::CompilationPack;
use crate::domain::{
    AnalyzerData, AssemblyIdentity, CompilerCallKind, ComplogError, Language, RawContent,
    RawContentKind, ReferenceData, ResourceData, Result,
};

/// Where a record's raw argument list comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentSource {
    Inline(Arc<[String]>),
    Blob(ContentDigest),
}

impl ArgumentSource {
    /// Materialize the argument list.
    pub fn load(&self, source: &dyn BlobSource) -> Result<Vec<String>> {
        match self {
            ArgumentSource::Inline(args) => Ok(args.to_vec()),
            ArgumentSource::Blob(digest) => {
                let bytes = source.get_content(digest)?;
                Ok(serde_json::from_slice(&bytes)?)
            }
        }
    }
}

/// Version-independent view of one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationRecord {
    pub project_file_path: String,
    pub kind: CompilerCallKind,
    pub language: Language,
    pub target_framework: Option<String>,
    pub compiler_file_path: Option<String>,
    pub arguments: ArgumentSource,
    pub contents: Vec<RawContent>,
    pub references: Vec<ReferenceData>,
    pub analyzers: Vec<AnalyzerData>,
    pub resources: Vec<ResourceData>,
    /// Set when generated sources were not captured.
    pub generated_unavailable: Option<String>,
}

/// Module id to canonical identity, from the assembly index.
pub type AssemblyIndex = BTreeMap<ModuleId, AssemblyInfo>;

/// Decode the record at `index`.
pub fn decode_compilation(
    version: FormatVersion,
    source: &dyn BlobSource,
    assemblies: &AssemblyIndex,
    index: usize,
) -> Result<CompilationRecord> {
    let entry = version.compilation_entry(index);
    let bytes = source.read_entry(&entry).map_err(|e| match e {
        StorageError::NotFound { .. } => {
            ComplogError::MalformedArchive(format!("missing compilation entry {entry}"))
        }
        other => other.into(),
    })?;
    match version {
        FormatVersion::V0 | FormatVersion::V1 => decode_v1(&entry, &bytes, assemblies),
        FormatVersion::V2 => decode_v2(&entry, &bytes, assemblies),
    }
}

fn identity(assemblies: &AssemblyIndex, entry: &str, id: ModuleId) -> Result<AssemblyIdentity> {
    assemblies
        .get(&id)
        .map(|info| info.identity.clone())
        .ok_or_else(|| {
            ComplogError::MalformedArchive(format!(
                "{entry} names module {id} missing from the assembly index"
            ))
        })
}

fn decode_v2(entry: &str, bytes: &[u8], assemblies: &AssemblyIndex) -> Result<CompilationRecord> {
    let pack: CompilationPack = serde_json::from_slice(bytes)
        .map_err(|e| ComplogError::MalformedArchive(format!("{entry}: {e}")))?;

    let references = pack
        .references
        .into_iter()
        .map(|r| {
            Ok(ReferenceData {
                identity: identity(assemblies, entry, r.module_id)?,
                file_path: r.file_path,
                aliases: r.aliases,
                embed_interop: r.embed_interop,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let analyzers = pack
        .analyzers
        .into_iter()
        .map(|a| {
            Ok(AnalyzerData {
                identity: identity(assemblies, entry, a.module_id)?,
                file_path: a.file_path,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CompilationRecord {
        project_file_path: pack.project_file_path,
        kind: pack.kind,
        language: pack.language,
        target_framework: pack.target_framework,
        compiler_file_path: pack.compiler_file_path,
        arguments: ArgumentSource::Blob(pack.arguments),
        contents: pack.contents,
        references,
        analyzers,
        resources: pack.resources,
        generated_unavailable: pack.generated_unavailable,
    })
}

/// Version 1 records are `Key: value` lines:
///
/// ```text
/// Project: /src/app/app.csproj
/// Kind: regular
/// Language: csharp
/// TargetFramework: net8.0
/// Compiler: csc.dll
/// Arg: /nologo
/// Content: source <digest> <path>
/// Reference: <module id> <aliases or -> <embed interop> <path>
/// Analyzer: <module id> <path>
/// ```
fn decode_v1(entry: &str, bytes: &[u8], assemblies: &AssemblyIndex) -> Result<CompilationRecord> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| ComplogError::MalformedArchive(format!("{entry} is not UTF-8")))?;
    let bad = |n: usize, what: &str| {
        ComplogError::MalformedArchive(format!("{entry} line {}: {what}", n + 1))
    };

    let mut project = None;
    let mut kind = None;
    let mut language = None;
    let mut target_framework = None;
    let mut compiler_file_path = None;
    let mut arguments = Vec::new();
    let mut contents = Vec::new();
    let mut references = Vec::new();
    let mut analyzers = Vec::new();

    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let (key, value) = line.split_once(": ").ok_or_else(|| bad(n, "expected `Key: value`"))?;
        match key {
            "Project" => project = Some(value.to_string()),
            "Kind" => kind = Some(value.parse::<CompilerCallKind>()?),
            "Language" => language = Some(value.parse::<Language>()?),
            "TargetFramework" => target_framework = Some(value.to_string()),
            "Compiler" => compiler_file_path = Some(value.to_string()),
            "Arg" => arguments.push(value.to_string()),
            "Content" => {
                let mut parts = value.splitn(3, ' ');
                let (Some(k), Some(d), Some(path)) = (parts.next(), parts.next(), parts.next())
                else {
                    return Err(bad(n, "content needs kind, digest and path"));
                };
                contents.push(RawContent {
                    kind: k.parse::<RawContentKind>()?,
                    digest: d.parse().map_err(|_| bad(n, "bad content digest"))?,
                    file_path: path.to_string(),
                });
            }
            "Reference" => {
                let mut parts = value.splitn(4, ' ');
                let (Some(id), Some(aliases), Some(embed), Some(path)) =
                    (parts.next(), parts.next(), parts.next(), parts.next())
                else {
                    return Err(bad(n, "reference needs id, aliases, embed flag and path"));
                };
                let id: ModuleId = id.parse().map_err(|_| bad(n, "bad module id"))?;
                references.push(ReferenceData {
                    identity: identity(assemblies, entry, id)?,
                    file_path: path.to_string(),
                    aliases: match aliases {
                        "-" => Vec::new(),
                        list => list.split(',').map(str::to_string).collect(),
                    },
                    embed_interop: embed
                        .parse()
                        .map_err(|_| bad(n, "embed flag is not a bool"))?,
                });
            }
            "Analyzer" => {
                let (id, path) = value
                    .split_once(' ')
                    .ok_or_else(|| bad(n, "analyzer needs id and path"))?;
                let id: ModuleId = id.parse().map_err(|_| bad(n, "bad module id"))?;
                analyzers.push(AnalyzerData {
                    identity: identity(assemblies, entry, id)?,
                    file_path: path.to_string(),
                });
            }
            // Keys added after a version shipped are ignored by older decoders.
            _ => {}
        }
    }

    let missing = |what: &str| ComplogError::MalformedArchive(format!("{entry} has no {what}"));
    Ok(CompilationRecord {
        project_file_path: project.ok_or_else(|| missing("Project"))?,
        kind: kind.ok_or_else(|| missing("Kind"))?,
        language: language.ok_or_else(|| missing("Language"))?,
        target_framework,
        compiler_file_path,
        arguments: ArgumentSource::Inline(Arc::from(arguments)),
        contents,
        references,
        analyzers,
        resources: Vec::new(),
        generated_unavailable: Some(
            "archive format version 1 does not record generated sources".to_string(),
        ),
    })
}
