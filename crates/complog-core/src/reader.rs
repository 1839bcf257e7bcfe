//! Reading compiler calls and their inputs back out of an archive.
//!
//! [`CompilerLogReader`] is the one entry point consumers use. It reads the
//! header first, picks the decoder from it, and hands out
//! [`CompilerCall`]s stamped with its own [`OwnerToken`]. Every operation
//! that re-derives data for a call checks that stamp: a call produced by a
//! different reader is rejected with `ForeignCompilerCall`.
//!
//! Decoded records are cached per reader. The cache is filled without
//! holding a lock during decode; when two threads race on the same key the
//! first insert wins and both see it. Blob bytes go through a separate
//! cache bounded by [`ReaderOptions::blob_cache_bytes`].

use std::collections::HashMap;
use std::fs::File;
use std::hash::Hash;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use complog_store::{BlobSource, ContentDigest, ModuleId, StorageError, ZipBlobReader};
use moka::sync::Cache;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::archive::{
    decode_compilation, ArchiveMetadata, AssemblyIndex, AssemblyInfo, CompilationRecord,
    FormatVersion, ASSEMBLY_INFO_ENTRY, METADATA_ENTRY,
};
use crate::archive::format::parse_assembly_index;
use crate::args::{ArgumentParser, CommandLineParser, ParsedArguments};
use crate::config::ReaderOptions;
use crate::domain::{
    AnalyzerData, CompilerCall, ComplogError, OwnerToken, RawContent, RawContentKind,
    ReferenceData, ResourceData, Result, SourceText,
};
use crate::hosting::{AnalyzerHostManager, GeneratedText, HostInputs, HostLease};
use crate::obs;

/// Object-safe `Read + Seek`.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

type Container = ZipBlobReader<Box<dyn ReadSeek + Send>>;

/// Reference bytes alongside the descriptor that named them.
#[derive(Debug, Clone)]
pub struct ReferenceImage {
    pub data: ReferenceData,
    pub bytes: Arc<[u8]>,
}

#[derive(Debug, Clone)]
pub struct ResourceImage {
    pub data: ResourceData,
    pub bytes: Arc<[u8]>,
}

/// Everything the compiler front end needs to rebuild one call.
#[derive(Debug)]
pub struct CompilationData {
    pub call: CompilerCall,
    pub arguments: ParsedArguments,
    pub sources: Vec<SourceText>,
    pub additional_texts: Vec<SourceText>,
    pub analyzer_configs: Vec<SourceText>,
    /// Embedded files, ruleset, key file and source-link file.
    pub other_files: Vec<(RawContent, Arc<[u8]>)>,
    pub references: Vec<ReferenceImage>,
    pub resources: Vec<ResourceImage>,
    pub host: HostLease,
}

impl CompilationData {
    /// The call's own sources followed by any generated sources the host
    /// substitutes. Fails if the host has no generated text to offer.
    pub fn compiled_sources(&self) -> Result<Vec<SourceText>> {
        let generated = self.host.generated_sources()?;
        let mut all = Vec::with_capacity(self.sources.len() + generated.len());
        all.extend(self.sources.iter().cloned());
        all.extend(generated.iter().cloned());
        Ok(all)
    }
}

/// Memo map with compute-outside-the-lock, first-insert-wins semantics.
struct Memo<K, V> {
    map: Mutex<HashMap<K, V>>,
}

impl<K: Eq + Hash, V: Clone> Memo<K, V> {
    fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }

    fn get_or_try_insert(&self, key: K, compute: impl FnOnce() -> Result<V>) -> Result<V> {
        if let Some(v) = self.map.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            return Ok(v.clone());
        }
        let value = compute()?;
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        Ok(map.entry(key).or_insert(value).clone())
    }

    fn clear(&self) {
        self.map.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Read access to one archive.
pub struct CompilerLogReader {
    source: Arc<Container>,
    metadata: ArchiveMetadata,
    version: FormatVersion,
    assemblies: AssemblyIndex,
    records: Memo<usize, Arc<CompilationRecord>>,
    blobs: Option<Cache<String, Arc<[u8]>>>,
    owner: OwnerToken,
    options: ReaderOptions,
    parser: Arc<dyn ArgumentParser>,
    hosts: Arc<AnalyzerHostManager>,
    owns_hosts: bool,
    closed: Arc<AtomicBool>,
}

impl CompilerLogReader {
    /// Open an archive file.
    pub fn open(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self> {
        let path = path.as_ref();
        let _span = obs::ArchiveSpan::enter(&path.display().to_string());
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), options)
    }

    /// Open an archive from any seekable byte source. The reader creates
    /// and owns its analyzer host manager.
    pub fn from_reader(reader: impl Read + Seek + Send + 'static, options: ReaderOptions) -> Result<Self> {
        let hosts = Arc::new(AnalyzerHostManager::new(options.host));
        Self::build(Box::new(reader), options, hosts, true)
    }

    /// Open an archive sharing an externally owned host manager. Closing
    /// the reader leaves that manager running.
    pub fn with_host_manager(
        reader: impl Read + Seek + Send + 'static,
        options: ReaderOptions,
        hosts: Arc<AnalyzerHostManager>,
    ) -> Result<Self> {
        Self::build(Box::new(reader), options, hosts, false)
    }

    /// Replace the argument parser used to re-derive structured arguments.
    pub fn with_argument_parser(mut self, parser: Arc<dyn ArgumentParser>) -> Self {
        self.parser = parser;
        self
    }

    fn build(
        reader: Box<dyn ReadSeek + Send>,
        options: ReaderOptions,
        hosts: Arc<AnalyzerHostManager>,
        owns_hosts: bool,
    ) -> Result<Self> {
        let source = ZipBlobReader::new(reader).map_err(|e| match e {
            StorageError::Container(msg) => {
                ComplogError::MalformedArchive(format!("not a compiler log container: {msg}"))
            }
            other => other.into(),
        })?;

        let metadata = read_fixed(&source, METADATA_ENTRY)
            .and_then(|text| ArchiveMetadata::parse(&text))
            .inspect_err(|e| {
                if e.is_version_skew() {
                    obs::emit_version_rejected(e);
                }
            })?;
        let version = metadata.format_version()?;
        let assemblies = parse_assembly_index(&read_fixed(&source, ASSEMBLY_INFO_ENTRY)?)?;
        debug!(
            version = metadata.version,
            count = metadata.count,
            assemblies = assemblies.len(),
            "archive opened"
        );

        Ok(Self {
            source: Arc::new(source),
            metadata,
            version,
            assemblies,
            records: Memo::new(),
            blobs: blob_cache(options.blob_cache_bytes),
            owner: OwnerToken::new(),
            options,
            parser: Arc::new(CommandLineParser),
            hosts,
            owns_hosts,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn metadata(&self) -> &ArchiveMetadata {
        &self.metadata
    }

    pub fn format_version(&self) -> FormatVersion {
        self.version
    }

    pub fn options(&self) -> ReaderOptions {
        self.options
    }

    pub fn count(&self) -> usize {
        self.metadata.count
    }

    /// The token stamped on every call this reader produces.
    pub fn owner(&self) -> &OwnerToken {
        &self.owner
    }

    pub fn host_manager(&self) -> &Arc<AnalyzerHostManager> {
        &self.hosts
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ComplogError::ReaderClosed);
        }
        Ok(())
    }

    fn record(&self, index: usize) -> Result<Arc<CompilationRecord>> {
        self.ensure_open()?;
        if index >= self.metadata.count {
            return Err(ComplogError::IndexOutOfRange {
                index,
                count: self.metadata.count,
            });
        }
        self.records.get_or_try_insert(index, || {
            decode_compilation(self.version, &*self.source, &self.assemblies, index).map(Arc::new)
        })
    }

    /// The record behind `call`, after checking it came from this reader.
    fn record_for(&self, call: &CompilerCall) -> Result<Arc<CompilationRecord>> {
        let index = match (call.owner(), call.index()) {
            (Some(owner), Some(index)) if owner.same_owner(&self.owner) => index,
            _ => return Err(ComplogError::ForeignCompilerCall),
        };
        self.record(index)
    }

    /// Every call in the archive, in index order. Arguments load lazily.
    pub fn compiler_calls(&self) -> Result<Vec<CompilerCall>> {
        (0..self.metadata.count)
            .map(|i| self.compiler_call(i))
            .collect()
    }

    pub fn compiler_call(&self, index: usize) -> Result<CompilerCall> {
        let record = self.record(index)?;
        let source = self.source.clone();
        let arguments = record.arguments.clone();
        let closed = self.closed.clone();
        let call = CompilerCall::lazy(
            PathBuf::from(&record.project_file_path),
            record.kind,
            record.target_framework.clone(),
            record.language,
            index,
            self.owner.clone(),
            Box::new(move || {
                if closed.load(Ordering::Acquire) {
                    return Err(ComplogError::ReaderClosed);
                }
                arguments.load(&*source)
            }),
        );
        Ok(match &record.compiler_file_path {
            Some(path) => call.with_compiler_file_path(path.clone()),
            None => call,
        })
    }

    /// Structured arguments for `call`, parsed from its raw arguments.
    pub fn parsed_arguments(&self, call: &CompilerCall) -> Result<ParsedArguments> {
        self.record_for(call)?;
        let arguments = call.arguments()?;
        self.parser
            .parse(call.language(), &arguments, call.project_directory())
    }

    pub fn raw_contents(&self, call: &CompilerCall) -> Result<Vec<RawContent>> {
        Ok(self.record_for(call)?.contents.clone())
    }

    pub fn references(&self, call: &CompilerCall) -> Result<Vec<ReferenceData>> {
        Ok(self.record_for(call)?.references.clone())
    }

    pub fn analyzers(&self, call: &CompilerCall) -> Result<Vec<AnalyzerData>> {
        Ok(self.record_for(call)?.analyzers.clone())
    }

    pub fn resources(&self, call: &CompilerCall) -> Result<Vec<ResourceData>> {
        Ok(self.record_for(call)?.resources.clone())
    }

    /// Canonical identity per module id, in module id order.
    pub fn assembly_identities(&self) -> Vec<AssemblyInfo> {
        self.assemblies.values().cloned().collect()
    }

    fn blob(&self, entry: String) -> Result<Arc<[u8]>> {
        self.ensure_open()?;
        let Some(cache) = &self.blobs else {
            return Ok(Arc::from(self.source.read_entry(&entry)?));
        };
        if let Some(bytes) = cache.get(&entry) {
            return Ok(bytes);
        }
        let bytes: Arc<[u8]> = Arc::from(self.source.read_entry(&entry)?);
        Ok(cache.entry(entry).or_insert(bytes).into_value())
    }

    /// Bytes currently held by the blob cache.
    pub fn cached_blob_bytes(&self) -> u64 {
        self.blobs.as_ref().map_or(0, |cache| {
            cache.run_pending_tasks();
            cache.weighted_size()
        })
    }

    pub fn content_bytes(&self, digest: &ContentDigest) -> Result<Arc<[u8]>> {
        self.blob(digest.entry_name())
    }

    pub fn assembly_bytes(&self, id: &ModuleId) -> Result<Arc<[u8]>> {
        self.blob(id.entry_name())
    }

    /// Lease an analyzer host for `call` under the configured strategy.
    pub fn analyzer_host(&self, call: &CompilerCall) -> Result<HostLease> {
        let record = self.record_for(call)?;
        let inputs = CallInputs {
            reader: self,
            record: &record,
        };
        self.hosts
            .acquire(self.options.analyzer_kind, &record.analyzers, &inputs)
    }

    /// Materialize every input of `call`.
    ///
    /// `cancel` is checked before each file is loaded.
    pub fn compilation_data(
        &self,
        call: &CompilerCall,
        cancel: &CancellationToken,
    ) -> Result<CompilationData> {
        let check = || {
            if cancel.is_cancelled() {
                Err(ComplogError::Cancelled)
            } else {
                Ok(())
            }
        };
        check()?;
        let record = self.record_for(call)?;
        let arguments = self.parsed_arguments(call)?;

        let mut sources = Vec::new();
        let mut additional_texts = Vec::new();
        let mut analyzer_configs = Vec::new();
        let mut other_files = Vec::new();
        for content in &record.contents {
            let target = match content.kind {
                RawContentKind::Source => &mut sources,
                RawContentKind::AdditionalText => &mut additional_texts,
                RawContentKind::AnalyzerConfig => &mut analyzer_configs,
                // Substituted by the host, not compiled unconditionally.
                RawContentKind::GeneratedText => continue,
                _ => {
                    check()?;
                    other_files.push((content.clone(), self.content_bytes(&content.digest)?));
                    continue;
                }
            };
            check()?;
            let bytes = self.content_bytes(&content.digest)?;
            target.push(SourceText::from_bytes(content.file_path.clone(), &bytes));
        }

        let mut references = Vec::with_capacity(record.references.len());
        for data in &record.references {
            check()?;
            references.push(ReferenceImage {
                bytes: self.assembly_bytes(&data.identity.module_id)?,
                data: data.clone(),
            });
        }

        let mut resources = Vec::with_capacity(record.resources.len());
        for data in &record.resources {
            check()?;
            resources.push(ResourceImage {
                bytes: self.content_bytes(&data.digest)?,
                data: data.clone(),
            });
        }

        check()?;
        let host = self.analyzer_host(call)?;

        Ok(CompilationData {
            call: call.clone(),
            arguments,
            sources,
            additional_texts,
            analyzer_configs,
            other_files,
            references,
            resources,
            host,
        })
    }

    /// Release caches and, if this reader owns it, the host manager.
    /// Idempotent; also runs on drop.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.records.clear();
        if let Some(cache) = &self.blobs {
            cache.invalidate_all();
        }
        if self.owns_hosts {
            self.hosts.close();
        }
        debug!("compiler log reader closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for CompilerLogReader {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CompilerLogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerLogReader")
            .field("metadata", &self.metadata)
            .field("owner", &self.owner)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Adapts one record to what the host manager needs.
struct CallInputs<'a> {
    reader: &'a CompilerLogReader,
    record: &'a CompilationRecord,
}

impl HostInputs for CallInputs<'_> {
    fn analyzer_bytes(&self, analyzer: &AnalyzerData) -> Result<Arc<[u8]>> {
        self.reader.assembly_bytes(&analyzer.identity.module_id)
    }

    fn generated_text(&self) -> Result<GeneratedText> {
        if let Some(reason) = &self.record.generated_unavailable {
            return Ok(GeneratedText::Unavailable(reason.clone()));
        }
        let texts = self
            .record
            .contents
            .iter()
            .filter(|c| c.kind == RawContentKind::GeneratedText)
            .map(|c| {
                let bytes = self.reader.content_bytes(&c.digest)?;
                Ok(SourceText::from_bytes(c.file_path.clone(), &bytes))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(GeneratedText::Available(texts))
    }
}

fn blob_cache(max_bytes: u64) -> Option<Cache<String, Arc<[u8]>>> {
    (max_bytes > 0).then(|| {
        Cache::builder()
            .max_capacity(max_bytes)
            .weigher(|_entry: &String, bytes: &Arc<[u8]>| {
                u32::try_from(bytes.len()).unwrap_or(u32::MAX)
            })
            .build()
    })
}

fn read_fixed(source: &Container, name: &str) -> Result<String> {
    let bytes = source.read_entry(name).map_err(|e| match e {
        StorageError::NotFound { .. } => {
            ComplogError::MalformedArchive(format!("archive has no {name}"))
        }
        other => other.into(),
    })?;
    String::from_utf8(bytes)
        .map_err(|_| ComplogError::MalformedArchive(format!("{name} is not UTF-8")))
}
