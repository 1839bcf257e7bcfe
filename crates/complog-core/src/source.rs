//! Recognizing the files a compiler log can be made from.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use complog_store::{BlobSource, ZipBlobReader};
use tracing::debug;

use crate::archive::METADATA_ENTRY;
use crate::config::ReaderOptions;
use crate::domain::{CompilerCall, CompilerCallKind, ComplogError, Language, Result};
use crate::events::{correlate_log, tokenize, CorrelationResult};
use crate::reader::CompilerLogReader;

pub const EVENT_LOG_EXTENSION: &str = "eventlog";
pub const RESPONSE_FILE_EXTENSION: &str = "rsp";
pub const ARCHIVE_EXTENSION: &str = "complog";

/// What a log file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Archive,
    EventLog,
    ResponseFile,
}

impl LogKind {
    fn from_name(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            EVENT_LOG_EXTENSION => Some(LogKind::EventLog),
            RESPONSE_FILE_EXTENSION => Some(LogKind::ResponseFile),
            ARCHIVE_EXTENSION => Some(LogKind::Archive),
            _ => None,
        }
    }
}

/// A classified log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSource {
    /// A file this library can read directly.
    Direct { path: PathBuf, kind: LogKind },
    /// A zip whose first entry is the actual log.
    Wrapped {
        path: PathBuf,
        entry: String,
        kind: LogKind,
    },
}

impl LogSource {
    /// Classify `path`.
    ///
    /// `.eventlog` and `.rsp` are recognized by extension. Anything else
    /// must be a zip: an archive if it holds `metadata.txt`, otherwise a
    /// wrapper classified by its first entry.
    pub fn sniff(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(kind @ (LogKind::EventLog | LogKind::ResponseFile)) =
            path.to_str().and_then(LogKind::from_name)
        {
            return Ok(LogSource::Direct {
                path: path.to_path_buf(),
                kind,
            });
        }

        let zip = ZipBlobReader::new(BufReader::new(File::open(path)?)).map_err(|_| {
            ComplogError::MalformedArchive(format!(
                "{} is not a recognized log source",
                path.display()
            ))
        })?;
        if zip.contains_entry(METADATA_ENTRY) {
            return Ok(LogSource::Direct {
                path: path.to_path_buf(),
                kind: LogKind::Archive,
            });
        }
        let entry = zip.first_entry_name().ok_or_else(|| {
            ComplogError::MalformedArchive(format!("{} is an empty zip", path.display()))
        })?;
        let kind = LogKind::from_name(entry).ok_or_else(|| {
            ComplogError::MalformedArchive(format!(
                "{}: first entry `{entry}` is not a log",
                path.display()
            ))
        })?;
        debug!(path = %path.display(), entry, ?kind, "wrapped log source");
        Ok(LogSource::Wrapped {
            path: path.to_path_buf(),
            entry: entry.to_string(),
            kind,
        })
    }

    pub fn path(&self) -> &Path {
        match self {
            LogSource::Direct { path, .. } | LogSource::Wrapped { path, .. } => path,
        }
    }

    pub fn kind(&self) -> LogKind {
        match self {
            LogSource::Direct { kind, .. } | LogSource::Wrapped { kind, .. } => *kind,
        }
    }
}

/// Every compiler call `source` describes.
///
/// Calls read from an archive are detached from the reader that produced
/// them: their arguments are loaded up front.
pub fn read_compiler_calls(source: &LogSource, options: ReaderOptions) -> Result<CorrelationResult> {
    match source {
        LogSource::Direct { path, kind } => match kind {
            LogKind::Archive => archive_calls(File::open(path)?, options),
            LogKind::EventLog => correlate_log(BufReader::new(File::open(path)?)),
            LogKind::ResponseFile => {
                let text = std::fs::read_to_string(path)?;
                Ok(response_file_calls(path, &text))
            }
        },
        LogSource::Wrapped { path, entry, kind } => {
            let zip = ZipBlobReader::new(BufReader::new(File::open(path)?))?;
            let bytes = zip.read_entry(entry)?;
            match kind {
                LogKind::Archive => archive_calls(Cursor::new(bytes), options),
                LogKind::EventLog => correlate_log(Cursor::new(bytes)),
                LogKind::ResponseFile => {
                    let text = String::from_utf8_lossy(&bytes);
                    Ok(response_file_calls(&path.with_file_name(entry), &text))
                }
            }
        }
    }
}

fn archive_calls(
    reader: impl Read + Seek + Send + 'static,
    options: ReaderOptions,
) -> Result<CorrelationResult> {
    let reader = CompilerLogReader::from_reader(reader, options)?;
    let calls = reader
        .compiler_calls()?
        .into_iter()
        .map(|call| {
            let arguments = call.arguments()?.to_vec();
            let detached = CompilerCall::new(
                call.project_file_path(),
                call.kind(),
                call.target_framework().map(str::to_string),
                call.language(),
                arguments,
            );
            Ok(match call.compiler_file_path() {
                Some(path) => detached.with_compiler_file_path(path),
                None => detached,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    reader.close();
    Ok(CorrelationResult {
        calls,
        diagnostics: Vec::new(),
    })
}

/// A response file is one regular call whose project is the file itself.
/// Visual Basic is assumed when any `.vb` source is named.
pub fn response_file_calls(path: &Path, text: &str) -> CorrelationResult {
    let arguments = tokenize(text, true);
    let is_vb = arguments.iter().any(|a| {
        !a.starts_with('/') && !a.starts_with('-') && a.to_ascii_lowercase().ends_with(".vb")
    });
    let language = if is_vb {
        Language::VisualBasic
    } else {
        Language::CSharp
    };
    CorrelationResult {
        calls: vec![CompilerCall::new(
            path,
            CompilerCallKind::Regular,
            None,
            language,
            arguments,
        )],
        diagnostics: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use complog_store::{BlobSink, Compression, ZipBlobWriter};

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut w = ZipBlobWriter::new(File::create(path).unwrap(), Compression::Stored);
        for (name, data) in entries {
            w.put_entry(name, data).unwrap();
        }
        w.finish().unwrap();
    }

    #[test]
    fn sniffs_by_extension() {
        let source = LogSource::sniff("/logs/build.eventlog").unwrap();
        assert_eq!(source.kind(), LogKind::EventLog);
        let source = LogSource::sniff("/logs/app.RSP").unwrap();
        assert_eq!(source.kind(), LogKind::ResponseFile);
    }

    #[test]
    fn sniffs_archive_and_wrapper() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.zip");
        write_zip(&archive, &[("metadata.txt", b"Version: 2\nCount: 0\n")]);
        assert_eq!(LogSource::sniff(&archive).unwrap().kind(), LogKind::Archive);

        let wrapped = dir.path().join("w.zip");
        write_zip(&wrapped, &[("app.rsp", b"a.cs"), ("readme.txt", b"")]);
        let source = LogSource::sniff(&wrapped).unwrap();
        assert_eq!(
            source,
            LogSource::Wrapped {
                path: wrapped.clone(),
                entry: "app.rsp".to_string(),
                kind: LogKind::ResponseFile,
            }
        );
        let result = read_compiler_calls(&source, ReaderOptions::default()).unwrap();
        assert_eq!(result.calls.len(), 1);
        assert_eq!(result.calls[0].project_file_path(), dir.path().join("app.rsp"));
    }

    #[test]
    fn unrecognized_file_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();
        assert!(matches!(
            LogSource::sniff(&path),
            Err(ComplogError::MalformedArchive(_))
        ));
    }

    #[test]
    fn response_file_is_one_regular_call() {
        let text = "# comment line\n/target:library \"Program.cs\" /out:app.dll\n";
        let result = response_file_calls(Path::new("/src/app.rsp"), text);
        let call = &result.calls[0];
        assert_eq!(call.kind(), CompilerCallKind::Regular);
        assert_eq!(call.language(), Language::CSharp);
        assert_eq!(
            call.arguments().unwrap().to_vec(),
            vec!["/target:library", "Program.cs", "/out:app.dll"]
        );

        let vb = response_file_calls(Path::new("/src/app.rsp"), "Module1.vb");
        assert_eq!(vb.calls[0].language(), Language::VisualBasic);
    }
}
