//! Structured lifecycle events for correlation, archiving and replay.
//!
//! - `ArchiveSpan`: RAII guard tagging everything inside with the archive path
//! - `emit_*`: one `info!`/`warn!` per lifecycle step, each with an
//!   `event = "..."` field for filtering

use tracing::{info, warn};

use crate::domain::CompilerCallKind;
use crate::hosting::BasicAnalyzerKind;

/// RAII guard that enters an archive-scoped span.
///
/// ```ignore
/// let _span = ArchiveSpan::enter("build.complog");
/// // events below carry archive = "build.complog"
/// ```
pub struct ArchiveSpan {
    _span: tracing::span::EnteredSpan,
}

impl ArchiveSpan {
    pub fn enter(archive: &str) -> Self {
        let span = tracing::info_span!("complog.archive", archive = %archive);
        Self {
            _span: span.entered(),
        }
    }
}

/// A compiler call was reconstructed from the event stream.
pub fn emit_call_correlated(project: &str, kind: CompilerCallKind) {
    info!(event = "call.correlated", project = %project, kind = %kind);
}

/// A compiler call could not be reconstructed or archived.
pub fn emit_call_rejected(project: &str, error: &dyn std::fmt::Display) {
    warn!(event = "call.rejected", project = %project, error = %error);
}

pub fn emit_call_archived(project: &str, index: usize, contents: usize, assemblies: usize) {
    info!(
        event = "call.archived",
        project = %project,
        index,
        contents,
        assemblies,
    );
}

pub fn emit_archive_finalized(count: usize, content_blobs: usize, assembly_blobs: usize) {
    info!(
        event = "archive.finalized",
        count,
        content_blobs,
        assembly_blobs,
    );
}

/// The archive header names a version this reader cannot decode.
pub fn emit_version_rejected(error: &dyn std::fmt::Display) {
    warn!(event = "archive.version_rejected", error = %error);
}

pub fn emit_host_created(kind: BasicAnalyzerKind, fingerprint: &str, analyzers: usize) {
    info!(
        event = "host.created",
        kind = %kind,
        fingerprint = %fingerprint,
        analyzers,
    );
}

pub fn emit_host_released(kind: BasicAnalyzerKind, fingerprint: &str) {
    info!(event = "host.released", kind = %kind, fingerprint = %fingerprint);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_span_enters_and_events_emit() {
        let _span = ArchiveSpan::enter("test.complog");
        emit_call_correlated("/src/a.csproj", CompilerCallKind::Regular);
        emit_call_rejected("/src/a.csproj", &"no compiler boundary");
        emit_host_created(BasicAnalyzerKind::InMemory, "abc", 2);
        emit_host_released(BasicAnalyzerKind::InMemory, "abc");
    }
}
