//! A live analyzer set for one or more compiler calls.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::domain::{ComplogError, Result, SourceText};
use crate::hosting::context::{ExecutionContext, LoadedModule};
use crate::hosting::strategy::BasicAnalyzerKind;
use crate::obs;

/// Generated sources recorded for a call at archive-build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedText {
    Available(Vec<SourceText>),
    Unavailable(String),
}

/// Append-only diagnostic list shared by concurrent analysis passes.
///
/// A snapshot holds at least everything appended before it was taken;
/// appends racing with the snapshot may land after it.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    entries: Mutex<Vec<String>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, diagnostic: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(diagnostic.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum HostState {
    Loaded {
        context: Box<dyn ExecutionContext>,
        modules: Vec<LoadedModule>,
    },
    /// No analyzers loaded; recorded generated text stands in for them.
    Generated(Vec<SourceText>),
    /// No analyzers loaded and no generated text to substitute.
    Unavailable(String),
}

/// Loaded analyzers (or their recorded output) plus a diagnostic sink.
pub struct AnalyzerHost {
    kind: BasicAnalyzerKind,
    fingerprint: String,
    state: HostState,
    diagnostics: DiagnosticSink,
    disposed: AtomicBool,
}

impl AnalyzerHost {
    pub(crate) fn loaded(
        fingerprint: String,
        context: Box<dyn ExecutionContext>,
        modules: Vec<LoadedModule>,
    ) -> Self {
        Self {
            kind: context.kind(),
            fingerprint,
            state: HostState::Loaded { context, modules },
            diagnostics: DiagnosticSink::new(),
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn without_analyzers(fingerprint: String, generated: GeneratedText) -> Self {
        let state = match generated {
            GeneratedText::Available(texts) => HostState::Generated(texts),
            GeneratedText::Unavailable(reason) => HostState::Unavailable(reason),
        };
        Self {
            kind: BasicAnalyzerKind::None,
            fingerprint,
            state,
            diagnostics: DiagnosticSink::new(),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> BasicAnalyzerKind {
        self.kind
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Modules loaded into this host's context. Empty for `None` hosts.
    pub fn modules(&self) -> &[LoadedModule] {
        match &self.state {
            HostState::Loaded { modules, .. } => modules,
            _ => &[],
        }
    }

    /// Whether generation-dependent operations can succeed.
    pub fn is_available(&self) -> bool {
        !matches!(self.state, HostState::Unavailable(_))
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.state {
            HostState::Unavailable(reason) => Some(reason),
            _ => None,
        }
    }

    /// Sources to compile in addition to the call's own.
    ///
    /// For a `None` host these are the recorded generated files. A loaded
    /// host contributes nothing here: its generators run inside the
    /// compiler front end. An unavailable host fails rather than returning
    /// a partial set.
    pub fn generated_sources(&self) -> Result<&[SourceText]> {
        match &self.state {
            HostState::Generated(texts) => Ok(texts),
            HostState::Loaded { .. } => Ok(&[]),
            HostState::Unavailable(reason) => {
                Err(ComplogError::GeneratorsUnavailable(reason.clone()))
            }
        }
    }

    pub fn diagnostics(&self) -> &DiagnosticSink {
        &self.diagnostics
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Release the execution context. Runs once; later calls do nothing.
    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let HostState::Loaded { context, .. } = &self.state {
            context.unload();
        }
        obs::emit_host_released(self.kind, &self.fingerprint);
    }
}

impl Drop for AnalyzerHost {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for AnalyzerHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerHost")
            .field("kind", &self.kind)
            .field("fingerprint", &self.fingerprint)
            .field("modules", &self.modules().len())
            .field("available", &self.is_available())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosting::context::InMemoryContext;
    use std::sync::Arc;

    #[test]
    fn unavailable_host_fails_closed() {
        let host = AnalyzerHost::without_analyzers(
            String::new(),
            GeneratedText::Unavailable("no generatedfilesout".to_string()),
        );
        assert!(!host.is_available());
        assert_eq!(host.unavailable_reason(), Some("no generatedfilesout"));
        assert!(matches!(
            host.generated_sources(),
            Err(ComplogError::GeneratorsUnavailable(_))
        ));
    }

    #[test]
    fn generated_host_substitutes_text() {
        let text = SourceText::from_bytes("Gen.g.cs", b"partial class C {}");
        let host = AnalyzerHost::without_analyzers(
            "x".to_string(),
            GeneratedText::Available(vec![text.clone()]),
        );
        assert_eq!(host.kind(), BasicAnalyzerKind::None);
        assert_eq!(host.generated_sources().unwrap(), &[text]);
    }

    #[test]
    fn dispose_unloads_once() {
        let ctx = InMemoryContext::new();
        let module = ctx.load("A.dll", Arc::from(&b"MZ"[..])).unwrap();
        let host = AnalyzerHost::loaded("fp".to_string(), Box::new(ctx), vec![module]);
        assert_eq!(host.modules().len(), 1);
        assert!(host.generated_sources().unwrap().is_empty());
        host.dispose();
        host.dispose();
        assert!(host.is_disposed());
    }

    #[test]
    fn diagnostics_accept_concurrent_appends() {
        let host = Arc::new(AnalyzerHost::without_analyzers(
            String::new(),
            GeneratedText::Available(Vec::new()),
        ));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let host = host.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        host.diagnostics().push(format!("CS{t}{i:03}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(host.diagnostics().snapshot().len(), 100);
    }
}
