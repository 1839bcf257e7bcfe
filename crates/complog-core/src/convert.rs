//! Build events in, archive out.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::archive::{
    ArchiveBuilder, ContentIdentityReader, GeneratedFilesOutProvider, GeneratedSourceProvider,
    IdentityReader,
};
use crate::args::{ArgumentParser, CommandLineParser};
use crate::config::{BuilderOptions, ReaderOptions};
use crate::domain::{CompilerCall, Result};
use crate::events::{correlate, BuildEvent, CorrelationResult};
use crate::obs;
use crate::source::{read_compiler_calls, LogSource};

/// The pluggable pieces an archive build consults.
#[derive(Clone)]
pub struct Collaborators {
    pub parser: Arc<dyn ArgumentParser>,
    pub identities: Arc<dyn IdentityReader>,
    pub generated: Arc<dyn GeneratedSourceProvider>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            parser: Arc::new(CommandLineParser),
            identities: Arc::new(ContentIdentityReader),
            generated: Arc::new(GeneratedFilesOutProvider),
        }
    }
}

/// Outcome of a conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertSummary {
    /// Calls written to the archive.
    pub archived: usize,
    /// Correlation diagnostics followed by build diagnostics.
    pub diagnostics: Vec<String>,
}

impl ConvertSummary {
    pub fn succeeded(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Correlate `events` and write every resulting call to `writer`.
pub fn create_archive<'a, W: Write + Seek>(
    events: impl IntoIterator<Item = &'a BuildEvent>,
    writer: W,
    options: BuilderOptions,
    collaborators: &Collaborators,
) -> Result<ConvertSummary> {
    archive_calls(correlate(events), writer, options, collaborators)
}

/// Write already-known calls to `writer`.
pub fn archive_calls<W: Write + Seek>(
    correlated: CorrelationResult,
    writer: W,
    options: BuilderOptions,
    collaborators: &Collaborators,
) -> Result<ConvertSummary> {
    let CorrelationResult {
        calls,
        mut diagnostics,
    } = correlated;
    let mut builder = ArchiveBuilder::new(writer, options)
        .with_argument_parser(collaborators.parser.clone())
        .with_identity_reader(collaborators.identities.clone())
        .with_generated_source_provider(collaborators.generated.clone());

    let mut archived = 0;
    for call in &calls {
        if builder.add(call)? {
            archived += 1;
        }
    }
    diagnostics.extend(builder.take_diagnostics());
    builder.finish()?;

    Ok(ConvertSummary {
        archived,
        diagnostics,
    })
}

/// Convert any recognized log source at `input` into an archive at `output`.
/// `filter` picks which calls to keep.
pub fn create_archive_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: BuilderOptions,
    collaborators: &Collaborators,
    filter: impl Fn(&CompilerCall) -> bool,
) -> Result<ConvertSummary> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let _span = obs::ArchiveSpan::enter(&output.display().to_string());

    let source = LogSource::sniff(input)?;
    let mut correlated = read_compiler_calls(&source, ReaderOptions::default())?;
    correlated.calls.retain(|call| filter(call));

    let mut writer = BufWriter::new(File::create(output)?);
    let summary = archive_calls(correlated, &mut writer, options, collaborators)?;
    writer.flush()?;

    info!(
        input = %input.display(),
        output = %output.display(),
        archived = summary.archived,
        diagnostics = summary.diagnostics.len(),
        "log converted"
    );
    Ok(summary)
}
