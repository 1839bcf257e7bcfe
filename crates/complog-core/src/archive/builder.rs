//! Writing compiler calls into a new archive.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Seek, Write};
use std::path::Path;
use std::sync::Arc;

use complog_store::{BlobSink, ModuleId, ZipBlobWriter};
use tracing::debug;

use crate::archive::format::{
    render_assembly_index, ArchiveMetadata, AssemblyInfo, FormatVersion, ASSEMBLY_INFO_ENTRY,
    LATEST_VERSION, METADATA_ENTRY,
};
use crate::archive::generated::{
    GeneratedFilesOutProvider, GeneratedSourceProvider, GeneratedSources,
};
use crate::archive::identity::{ContentIdentityReader, IdentityReader};
use crate::archive::pack::{CompilationPack, PackAnalyzer, PackReference};
use crate::args::{ArgumentParser, CommandLineParser, ParsedArguments, ParsedReference, ParsedResource};
use crate::config::BuilderOptions;
use crate::domain::descriptor::file_name_of;
use crate::domain::{
    AssemblyIdentity, CompilerCall, ComplogError, RawContent, RawContentKind, ResourceData, Result,
};
use crate::metrics::METRICS;
use crate::obs;

/// Everything one call needs, read from disk before anything is written.
struct GatheredCall {
    arguments: Arc<[String]>,
    contents: Vec<(RawContentKind, String, Vec<u8>)>,
    references: Vec<(ParsedReference, AssemblyIdentity, Vec<u8>)>,
    analyzers: Vec<(String, AssemblyIdentity, Vec<u8>)>,
    resources: Vec<(ParsedResource, Vec<u8>)>,
    generated_unavailable: Option<String>,
}

/// Streams compiler calls into an archive.
///
/// Calls are assigned indexes in the order they are accepted. A call whose
/// inputs cannot be gathered is left out and described in
/// [`diagnostics`](Self::diagnostics); the rest of the archive is
/// unaffected. The header and assembly index are written by
/// [`finish`](Self::finish), after every call.
pub struct ArchiveBuilder<W: Write + Seek> {
    store: ZipBlobWriter<W>,
    options: BuilderOptions,
    parser: Arc<dyn ArgumentParser>,
    identities: Arc<dyn IdentityReader>,
    generated: Arc<dyn GeneratedSourceProvider>,
    assemblies: BTreeMap<ModuleId, AssemblyInfo>,
    count: usize,
    diagnostics: Vec<String>,
    finalized: bool,
}

impl<W: Write + Seek> ArchiveBuilder<W> {
    pub fn new(writer: W, options: BuilderOptions) -> Self {
        Self {
            store: ZipBlobWriter::new(writer, options.compression),
            options,
            parser: Arc::new(CommandLineParser),
            identities: Arc::new(ContentIdentityReader),
            generated: Arc::new(GeneratedFilesOutProvider),
            assemblies: BTreeMap::new(),
            count: 0,
            diagnostics: Vec::new(),
            finalized: false,
        }
    }

    pub fn with_argument_parser(mut self, parser: Arc<dyn ArgumentParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_identity_reader(mut self, reader: Arc<dyn IdentityReader>) -> Self {
        self.identities = reader;
        self
    }

    pub fn with_generated_source_provider(
        mut self,
        provider: Arc<dyn GeneratedSourceProvider>,
    ) -> Self {
        self.generated = provider;
        self
    }

    /// Number of calls accepted so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// One entry per call that was left out.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<String> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Add one call. Returns `Ok(false)` if the call was left out, with the
    /// reason recorded as a diagnostic.
    ///
    /// Errors are reserved for the archive itself: a write failure, or
    /// `AlreadyFinalized` after [`finish`](Self::finish).
    pub fn add(&mut self, call: &CompilerCall) -> Result<bool> {
        if self.finalized {
            return Err(ComplogError::AlreadyFinalized);
        }
        let gathered = match self.gather(call) {
            Ok(g) => g,
            Err(e) => {
                METRICS.inc_calls_rejected();
                obs::emit_call_rejected(&call.project_file_path().to_string_lossy(), &e);
                self.diagnostics
                    .push(format!("{}: {e}", call.display_name()));
                return Ok(false);
            }
        };
        self.write(call, gathered)?;
        Ok(true)
    }

    fn gather(&self, call: &CompilerCall) -> Result<GatheredCall> {
        let arguments = call.arguments()?;
        let parsed = self
            .parser
            .parse(call.language(), &arguments, call.project_directory())?;

        let mut contents = Vec::new();
        let singles = [
            (RawContentKind::RuleSet, &parsed.ruleset),
            (RawContentKind::KeyFile, &parsed.key_file),
            (RawContentKind::SourceLink, &parsed.source_link),
        ];
        let lists = [
            (RawContentKind::Source, &parsed.sources),
            (RawContentKind::AdditionalText, &parsed.additional_files),
            (RawContentKind::AnalyzerConfig, &parsed.analyzer_configs),
            (RawContentKind::Embed, &parsed.embedded_files),
        ];
        for (kind, paths) in lists {
            for path in paths {
                contents.push((kind, display(path), read_input(path)?));
            }
        }
        for (kind, path) in singles {
            if let Some(path) = path {
                contents.push((kind, display(path), read_input(path)?));
            }
        }

        let mut references = Vec::with_capacity(parsed.references.len());
        for reference in &parsed.references {
            let bytes = read_input(&reference.path)?;
            let identity = self.identities.read_identity(&reference.path, &bytes)?;
            references.push((reference.clone(), identity, bytes));
        }

        let mut analyzers = Vec::with_capacity(parsed.analyzers.len());
        for path in &parsed.analyzers {
            let bytes = read_input(path)?;
            let identity = self.identities.read_identity(path, &bytes)?;
            analyzers.push((display(path), identity, bytes));
        }

        let mut resources = Vec::with_capacity(parsed.resources.len());
        for resource in &parsed.resources {
            resources.push((resource.clone(), read_input(&resource.path)?));
        }

        let generated_unavailable = self.gather_generated(call, &parsed, &mut contents)?;

        Ok(GatheredCall {
            arguments,
            contents,
            references,
            analyzers,
            resources,
            generated_unavailable,
        })
    }

    fn gather_generated(
        &self,
        call: &CompilerCall,
        parsed: &ParsedArguments,
        contents: &mut Vec<(RawContentKind, String, Vec<u8>)>,
    ) -> Result<Option<String>> {
        if !self.options.capture_generated_sources {
            return Ok(Some("generated source capture was disabled".to_string()));
        }
        match self.generated.generated_sources(call, parsed)? {
            GeneratedSources::Available(files) => {
                contents.extend(
                    files
                        .into_iter()
                        .map(|f| (RawContentKind::GeneratedText, display(&f.file_path), f.bytes)),
                );
                Ok(None)
            }
            GeneratedSources::Unavailable(reason) => Ok(Some(reason)),
        }
    }

    fn write(&mut self, call: &CompilerCall, gathered: GatheredCall) -> Result<()> {
        let arguments = self
            .store
            .put_content(&serde_json::to_vec(&*gathered.arguments)?)?;
        METRICS.record_content_blob(arguments.deduplicated);

        let mut contents = Vec::with_capacity(gathered.contents.len());
        for (kind, file_path, bytes) in gathered.contents {
            let stored = self.store.put_content(&bytes)?;
            METRICS.record_content_blob(stored.deduplicated);
            contents.push(RawContent {
                kind,
                file_path,
                digest: stored.key,
            });
        }

        let mut references = Vec::with_capacity(gathered.references.len());
        for (reference, identity, bytes) in gathered.references {
            let file_path = display(&reference.path);
            let module_id = self.put_assembly(identity, &file_path, &bytes)?;
            references.push(PackReference {
                module_id,
                file_path,
                aliases: reference.aliases,
                embed_interop: reference.embed_interop,
            });
        }

        let mut analyzers = Vec::with_capacity(gathered.analyzers.len());
        for (file_path, identity, bytes) in gathered.analyzers {
            let module_id = self.put_assembly(identity, &file_path, &bytes)?;
            analyzers.push(PackAnalyzer {
                module_id,
                file_path,
            });
        }

        let mut resources = Vec::with_capacity(gathered.resources.len());
        for (resource, bytes) in gathered.resources {
            let stored = self.store.put_content(&bytes)?;
            METRICS.record_content_blob(stored.deduplicated);
            resources.push(ResourceData {
                digest: stored.key,
                file_name: resource
                    .linked
                    .then(|| file_name_of(&display(&resource.path)).to_string()),
                name: resource.name,
                is_public: resource.is_public,
            });
        }

        let pack = CompilationPack {
            project_file_path: display(call.project_file_path()),
            kind: call.kind(),
            language: call.language(),
            target_framework: call.target_framework().map(str::to_string),
            compiler_file_path: call.compiler_file_path().map(str::to_string),
            arguments: arguments.key,
            contents,
            references,
            analyzers,
            resources,
            generated_unavailable: gathered.generated_unavailable,
        };
        let entry = FormatVersion::V2.compilation_entry(self.count);
        self.store.put_entry(&entry, &serde_json::to_vec(&pack)?)?;

        METRICS.inc_calls_archived();
        obs::emit_call_archived(
            &pack.project_file_path,
            self.count,
            pack.contents.len(),
            pack.references.len() + pack.analyzers.len(),
        );
        self.count += 1;
        Ok(())
    }

    /// Store an assembly once per module id. The first path a module is
    /// seen under becomes its canonical file name.
    fn put_assembly(
        &mut self,
        identity: AssemblyIdentity,
        file_path: &str,
        bytes: &[u8],
    ) -> Result<ModuleId> {
        let module_id = identity.module_id;
        let stored = self.store.put_assembly(module_id, bytes)?;
        METRICS.record_assembly_blob(stored.deduplicated);
        self.assemblies
            .entry(module_id)
            .or_insert_with(|| AssemblyInfo {
                identity,
                file_name: file_name_of(file_path).to_string(),
            });
        Ok(module_id)
    }

    /// Write the assembly index and header, then close the container.
    ///
    /// A second call returns `AlreadyFinalized`.
    pub fn finish(&mut self) -> Result<W> {
        if self.finalized {
            return Err(ComplogError::AlreadyFinalized);
        }
        self.finalized = true;

        let index = render_assembly_index(self.assemblies.values());
        self.store.put_entry(ASSEMBLY_INFO_ENTRY, index.as_bytes())?;
        let metadata = ArchiveMetadata::new(self.count, self.options.origin_is_windows);
        debug_assert_eq!(metadata.version, LATEST_VERSION);
        self.store
            .put_entry(METADATA_ENTRY, metadata.render().as_bytes())?;

        obs::emit_archive_finalized(
            self.count,
            self.store.content_count(),
            self.store.assembly_count(),
        );
        debug!(diagnostics = self.diagnostics.len(), "archive builder finished");
        Ok(self.store.finish()?)
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ComplogError::MissingInput {
            path: path.to_path_buf(),
        },
        _ => ComplogError::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CompilerCallKind, Language};
    use complog_store::{BlobSource, ZipBlobReader, CONTENT_PREFIX};
    use std::io::Cursor;

    fn call(dir: &Path, args: &[&str]) -> CompilerCall {
        CompilerCall::new(
            dir.join("app.csproj"),
            CompilerCallKind::Regular,
            Some("net8.0".to_string()),
            Language::CSharp,
            args.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn missing_source_is_a_diagnostic_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.cs"), "class A {}").unwrap();

        let mut builder =
            ArchiveBuilder::new(Cursor::new(Vec::new()), BuilderOptions::default());
        assert!(!builder.add(&call(dir.path(), &["missing.cs"])).unwrap());
        assert!(builder.add(&call(dir.path(), &["a.cs"])).unwrap());
        assert_eq!(builder.count(), 1);
        assert_eq!(builder.diagnostics().len(), 1);
        assert!(builder.diagnostics()[0].contains("missing.cs"));
    }

    #[test]
    fn finish_writes_header_last_and_only_once() {
        let mut builder =
            ArchiveBuilder::new(Cursor::new(Vec::new()), BuilderOptions::default());
        let bytes = builder.finish().unwrap().into_inner();
        assert!(matches!(
            builder.finish(),
            Err(ComplogError::AlreadyFinalized)
        ));
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            builder.add(&call(dir.path(), &[])),
            Err(ComplogError::AlreadyFinalized)
        ));

        let reader = ZipBlobReader::new(Cursor::new(bytes)).unwrap();
        let names = reader.entry_names();
        assert_eq!(names.last().map(String::as_str), Some(METADATA_ENTRY));
        let meta = String::from_utf8(reader.read_entry(METADATA_ENTRY).unwrap()).unwrap();
        assert!(meta.starts_with("Version: 2\nCount: 0\n"));
    }

    #[test]
    fn identical_arguments_share_a_blob() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.cs"), "class A {}").unwrap();
        let mut builder =
            ArchiveBuilder::new(Cursor::new(Vec::new()), BuilderOptions::default());
        builder.add(&call(dir.path(), &["a.cs"])).unwrap();
        builder.add(&call(dir.path(), &["a.cs"])).unwrap();
        let bytes = builder.finish().unwrap().into_inner();

        let reader = ZipBlobReader::new(Cursor::new(bytes)).unwrap();
        let blobs = reader
            .entry_names()
            .iter()
            .filter(|n| n.starts_with(CONTENT_PREFIX))
            .count();
        // one source text plus one argument list
        assert_eq!(blobs, 2);
    }
}
