//! Isolated execution contexts that analyzer modules are loaded into.
//!
//! A context is created per analyzer set and unloaded as a whole. Loading
//! the actual code is the compiler front end's business; a context owns
//! the bytes (or files) handed to it and releases them on unload.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::domain::{ComplogError, Result};
use crate::hosting::strategy::BasicAnalyzerKind;

/// Handle to one module loaded into a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    pub file_name: String,
    pub size: usize,
    /// Where the module was materialized, for on-disk contexts.
    pub path: Option<PathBuf>,
}

/// `load(bytes) -> handle`, `unload()`.
///
/// `unload` runs at most once per context; loading into an unloaded
/// context fails with `HostDisposed`.
pub trait ExecutionContext: Send + Sync {
    fn kind(&self) -> BasicAnalyzerKind;

    fn load(&self, file_name: &str, bytes: Arc<[u8]>) -> Result<LoadedModule>;

    fn unload(&self);

    fn is_unloaded(&self) -> bool;
}

/// Creates the execution context for a new host.
pub trait ContextFactory: Send + Sync {
    fn create(&self, kind: BasicAnalyzerKind, fingerprint: &str) -> Result<Box<dyn ExecutionContext>>;
}

/// Builds [`InMemoryContext`] and [`OnDiskContext`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContextFactory;

impl ContextFactory for DefaultContextFactory {
    fn create(&self, kind: BasicAnalyzerKind, fingerprint: &str) -> Result<Box<dyn ExecutionContext>> {
        match kind {
            BasicAnalyzerKind::InMemory => Ok(Box::new(InMemoryContext::new())),
            BasicAnalyzerKind::OnDisk => Ok(Box::new(OnDiskContext::new(fingerprint)?)),
            BasicAnalyzerKind::None => Err(ComplogError::Capability { kind }),
        }
    }
}

/// Keeps module images in memory.
#[derive(Debug, Default)]
pub struct InMemoryContext {
    modules: Mutex<Vec<Arc<[u8]>>>,
    unloaded: AtomicBool,
}

impl InMemoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module_count(&self) -> usize {
        self.modules.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl ExecutionContext for InMemoryContext {
    fn kind(&self) -> BasicAnalyzerKind {
        BasicAnalyzerKind::InMemory
    }

    fn load(&self, file_name: &str, bytes: Arc<[u8]>) -> Result<LoadedModule> {
        if self.is_unloaded() {
            return Err(ComplogError::HostDisposed);
        }
        let size = bytes.len();
        self.modules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(bytes);
        Ok(LoadedModule {
            file_name: file_name.to_string(),
            size,
            path: None,
        })
    }

    fn unload(&self) {
        if self.unloaded.swap(true, Ordering::AcqRel) {
            return;
        }
        self.modules.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn is_unloaded(&self) -> bool {
        self.unloaded.load(Ordering::Acquire)
    }
}

/// Writes each module into a private scratch directory.
///
/// Each module gets its own numbered subdirectory so two analyzers with
/// the same file name do not collide. The directory is deleted on unload;
/// a failure to delete (another process holding a file open) is logged and
/// otherwise ignored.
#[derive(Debug)]
pub struct OnDiskContext {
    dir: Mutex<Option<TempDir>>,
    root: PathBuf,
    loaded: Mutex<usize>,
}

impl OnDiskContext {
    pub fn new(fingerprint: &str) -> Result<Self> {
        let short: String = fingerprint.chars().filter(|c| c.is_ascii_hexdigit()).take(8).collect();
        let dir = tempfile::Builder::new()
            .prefix(&format!("complog-analyzers-{short}-"))
            .tempdir()?;
        let root = dir.path().to_path_buf();
        debug!(dir = %root.display(), "analyzer scratch directory created");
        Ok(Self {
            dir: Mutex::new(Some(dir)),
            root,
            loaded: Mutex::new(0),
        })
    }

    /// Scratch directory root. Gone after unload.
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

impl ExecutionContext for OnDiskContext {
    fn kind(&self) -> BasicAnalyzerKind {
        BasicAnalyzerKind::OnDisk
    }

    fn load(&self, file_name: &str, bytes: Arc<[u8]>) -> Result<LoadedModule> {
        let guard = self.dir.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            return Err(ComplogError::HostDisposed);
        }
        let mut loaded = self.loaded.lock().unwrap_or_else(|e| e.into_inner());
        let slot = self.root.join(loaded.to_string());
        std::fs::create_dir_all(&slot)?;
        let path = slot.join(file_name);
        std::fs::write(&path, &bytes)?;
        *loaded += 1;
        Ok(LoadedModule {
            file_name: file_name.to_string(),
            size: bytes.len(),
            path: Some(path),
        })
    }

    fn unload(&self) {
        let dir = self.dir.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(dir) = dir {
            if let Err(e) = dir.close() {
                warn!(dir = %self.root.display(), error = %e, "could not remove analyzer scratch directory");
            }
        }
    }

    fn is_unloaded(&self) -> bool {
        self.dir.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }
}
