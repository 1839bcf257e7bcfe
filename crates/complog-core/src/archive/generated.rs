//! Capturing generator output at archive-build time.
//!
//! When the original build asked the compiler to write generated sources
//! to disk, those files let a reader substitute the text for the
//! generators themselves. Without them a reader that does not load
//! analyzers has no generated sources at all, and says so.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::args::ParsedArguments;
use crate::domain::{CompilerCall, ComplogError, Result};

/// One generated file as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub file_path: PathBuf,
    pub bytes: Vec<u8>,
}

/// Outcome of looking for generated sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedSources {
    Available(Vec<GeneratedFile>),
    /// Generated text cannot be recovered; the reason is kept for readers.
    Unavailable(String),
}

/// Supplies generator-produced sources for a compiler call.
pub trait GeneratedSourceProvider: Send + Sync {
    fn generated_sources(
        &self,
        call: &CompilerCall,
        arguments: &ParsedArguments,
    ) -> Result<GeneratedSources>;
}

/// Reads every file under the call's `/generatedfilesout:` directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneratedFilesOutProvider;

impl GeneratedSourceProvider for GeneratedFilesOutProvider {
    fn generated_sources(
        &self,
        call: &CompilerCall,
        arguments: &ParsedArguments,
    ) -> Result<GeneratedSources> {
        if arguments.analyzers.is_empty() {
            return Ok(GeneratedSources::Available(Vec::new()));
        }
        let Some(dir) = &arguments.generated_files_out else {
            return Ok(GeneratedSources::Unavailable(format!(
                "{} was built without /generatedfilesout:",
                call.display_name()
            )));
        };
        if !dir.is_dir() {
            return Ok(GeneratedSources::Unavailable(format!(
                "generated files directory {} does not exist",
                dir.display()
            )));
        }
        let files = collect_files(dir)?;
        debug!(dir = %dir.display(), files = files.len(), "generated sources captured");
        Ok(GeneratedSources::Available(files))
    }
}

fn collect_files(dir: &Path) -> Result<Vec<GeneratedFile>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            ComplogError::Io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk loop")),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let bytes = std::fs::read(entry.path())?;
        files.push(GeneratedFile {
            file_path: entry.into_path(),
            bytes,
        });
    }
    Ok(files)
}
