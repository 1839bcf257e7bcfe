//! The compiler invocation model.
//!
//! A [`CompilerCall`] is one logical call to a language compiler discovered
//! during a build. Its identity fields (project, kind, language, target
//! framework) are fixed at construction. Its raw argument list may be
//! materialized lazily, at most once, from whatever produced the call.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::domain::error::{ComplogError, Result};

/// How a compiler call relates to the build that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompilerCallKind {
    /// The main compilation of a project.
    Regular,
    /// Satellite (localized resource) assembly generation.
    Satellite,
    /// A throwaway compile under a temporary-assembly target (WPF markup).
    TemporaryCompile,
    /// XAML pre-compilation.
    PreCompile,
    /// A compiler task under a target that could not be classified.
    Unknown,
}

impl CompilerCallKind {
    /// Classify a target by its own name and the name of the target that
    /// scheduled it. Returns `None` for targets that never host a compiler.
    pub fn classify(target_name: &str, parent_target: Option<&str>) -> Option<Self> {
        match target_name {
            "CoreCompile" => match parent_target {
                Some("_CompileTemporaryAssembly") => Some(CompilerCallKind::TemporaryCompile),
                _ => Some(CompilerCallKind::Regular),
            },
            "CoreGenerateSatelliteAssemblies" => Some(CompilerCallKind::Satellite),
            "XamlPreCompile" => Some(CompilerCallKind::PreCompile),
            _ => None,
        }
    }
}

impl fmt::Display for CompilerCallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompilerCallKind::Regular => "regular",
            CompilerCallKind::Satellite => "satellite",
            CompilerCallKind::TemporaryCompile => "temporary_compile",
            CompilerCallKind::PreCompile => "pre_compile",
            CompilerCallKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl FromStr for CompilerCallKind {
    type Err = ComplogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "regular" => Ok(CompilerCallKind::Regular),
            "satellite" => Ok(CompilerCallKind::Satellite),
            "temporary_compile" => Ok(CompilerCallKind::TemporaryCompile),
            "pre_compile" => Ok(CompilerCallKind::PreCompile),
            "unknown" => Ok(CompilerCallKind::Unknown),
            other => Err(ComplogError::MalformedArchive(format!(
                "unknown compiler call kind `{other}`"
            ))),
        }
    }
}

/// Source language of a compiler call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[serde(rename = "csharp")]
    CSharp,
    VisualBasic,
}

impl Language {
    /// Map an MSBuild task name to the language of the compiler it runs.
    pub fn from_task_name(task_name: &str) -> Option<Self> {
        match task_name {
            "Csc" => Some(Language::CSharp),
            "Vbc" => Some(Language::VisualBasic),
            _ => None,
        }
    }

    /// File names the compiler for this language may be invoked as.
    pub fn compiler_file_names(self) -> &'static [&'static str] {
        match self {
            Language::CSharp => &["csc", "csc.exe", "csc.dll"],
            Language::VisualBasic => &["vbc", "vbc.exe", "vbc.dll"],
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::CSharp => f.write_str("csharp"),
            Language::VisualBasic => f.write_str("visual_basic"),
        }
    }
}

impl FromStr for Language {
    type Err = ComplogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "csharp" => Ok(Language::CSharp),
            "visual_basic" => Ok(Language::VisualBasic),
            other => Err(ComplogError::MalformedArchive(format!(
                "unknown language `{other}`"
            ))),
        }
    }
}

/// Identity of the reader that produced a compiler call.
///
/// Compared by pointer, never by value: two readers over the same file are
/// still different owners.
#[derive(Clone)]
pub struct OwnerToken(Arc<u64>);

impl OwnerToken {
    pub(crate) fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        OwnerToken(Arc::new(NEXT.fetch_add(1, Ordering::Relaxed)))
    }

    /// Whether both tokens belong to the same reader instance.
    pub fn same_owner(&self, other: &OwnerToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerToken({})", self.0)
    }
}

pub(crate) type ArgumentLoader = Box<dyn Fn() -> Result<Vec<String>> + Send + Sync>;

/// Single-initialization cell for the raw argument list.
struct LazyArguments {
    cell: OnceLock<Arc<[String]>>,
    loader: Option<ArgumentLoader>,
}

/// One logical call to a language compiler.
#[derive(Clone)]
pub struct CompilerCall {
    project_file_path: PathBuf,
    kind: CompilerCallKind,
    target_framework: Option<String>,
    language: Language,
    compiler_file_path: Option<String>,
    index: Option<usize>,
    arguments: Arc<LazyArguments>,
    owner: Option<OwnerToken>,
}

impl CompilerCall {
    /// Build a call whose arguments are already known.
    pub fn new(
        project_file_path: impl Into<PathBuf>,
        kind: CompilerCallKind,
        target_framework: Option<String>,
        language: Language,
        arguments: Vec<String>,
    ) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Arc::from(arguments));
        Self {
            project_file_path: project_file_path.into(),
            kind,
            target_framework,
            language,
            compiler_file_path: None,
            index: None,
            arguments: Arc::new(LazyArguments { cell, loader: None }),
            owner: None,
        }
    }

    /// Build a reader-owned call whose arguments are loaded on first access.
    pub(crate) fn lazy(
        project_file_path: PathBuf,
        kind: CompilerCallKind,
        target_framework: Option<String>,
        language: Language,
        index: usize,
        owner: OwnerToken,
        loader: ArgumentLoader,
    ) -> Self {
        Self {
            project_file_path,
            kind,
            target_framework,
            language,
            compiler_file_path: None,
            index: Some(index),
            arguments: Arc::new(LazyArguments {
                cell: OnceLock::new(),
                loader: Some(loader),
            }),
            owner: Some(owner),
        }
    }

    /// Record the compiler path the command line named.
    pub fn with_compiler_file_path(mut self, path: impl Into<String>) -> Self {
        self.compiler_file_path = Some(path.into());
        self
    }

    pub fn project_file_path(&self) -> &Path {
        &self.project_file_path
    }

    /// Directory relative paths in the arguments resolve against.
    pub fn project_directory(&self) -> &Path {
        self.project_file_path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Project file name without extension.
    pub fn project_name(&self) -> String {
        self.project_file_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn kind(&self) -> CompilerCallKind {
        self.kind
    }

    pub fn target_framework(&self) -> Option<&str> {
        self.target_framework.as_deref()
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn is_csharp(&self) -> bool {
        self.language == Language::CSharp
    }

    pub fn compiler_file_path(&self) -> Option<&str> {
        self.compiler_file_path.as_deref()
    }

    /// Position in the archive, for calls read back from one.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// The reader that produced this call, if any.
    pub fn owner(&self) -> Option<&OwnerToken> {
        self.owner.as_ref()
    }

    /// The raw argument list, materialized on first access and cached.
    ///
    /// Concurrent first accesses may each run the loader; the first result
    /// committed wins and every caller sees that one.
    pub fn arguments(&self) -> Result<Arc<[String]>> {
        if let Some(args) = self.arguments.cell.get() {
            return Ok(args.clone());
        }
        let loader = self.arguments.loader.as_ref().ok_or_else(|| {
            ComplogError::InvalidArguments("compiler call has no argument source".to_string())
        })?;
        let loaded: Arc<[String]> = Arc::from(loader()?);
        Ok(self.arguments.cell.get_or_init(|| loaded).clone())
    }

    /// `Project (tfm)` label used in diagnostics and logs.
    pub fn display_name(&self) -> String {
        match &self.target_framework {
            Some(tfm) => format!("{} ({tfm})", self.project_name()),
            None => self.project_name(),
        }
    }
}

impl fmt::Debug for CompilerCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerCall")
            .field("project_file_path", &self.project_file_path)
            .field("kind", &self.kind)
            .field("target_framework", &self.target_framework)
            .field("language", &self.language)
            .field("index", &self.index)
            .field("arguments_loaded", &self.arguments.cell.get().is_some())
            .finish()
    }
}
