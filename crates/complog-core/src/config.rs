//! Option structs for building and reading archives.
//!
//! Every struct has usable defaults, `with_*` builders, and serde support
//! so a front end can load them from its own config file. `from_env`
//! reads `COMPLOG_*` variables; library entry points never read the
//! environment on their own.

use complog_store::Compression;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::hosting::BasicAnalyzerKind;

/// Options for [`ArchiveBuilder`](crate::archive::ArchiveBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderOptions {
    pub compression: Compression,
    /// Recorded in the archive header; defaults to the build platform.
    pub origin_is_windows: bool,
    /// Look for generator output and store it alongside each call.
    pub capture_generated_sources: bool,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
            origin_is_windows: cfg!(windows),
            capture_generated_sources: true,
        }
    }
}

impl BuilderOptions {
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_origin_is_windows(mut self, is_windows: bool) -> Self {
        self.origin_is_windows = is_windows;
        self
    }

    pub fn with_capture_generated_sources(mut self, capture: bool) -> Self {
        self.capture_generated_sources = capture;
        self
    }

    /// Read `COMPLOG_COMPRESSION` (`stored`/`deflated`) and
    /// `COMPLOG_CAPTURE_GENERATED` through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();
        if let Some(v) = lookup("COMPLOG_COMPRESSION") {
            match v.to_ascii_lowercase().as_str() {
                "stored" => options.compression = Compression::Stored,
                "deflated" => options.compression = Compression::Deflated,
                other => warn!(value = %other, "ignoring unknown COMPLOG_COMPRESSION"),
            }
        }
        if let Some(b) = lookup_bool(&lookup, "COMPLOG_CAPTURE_GENERATED") {
            options.capture_generated_sources = b;
        }
        options
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }
}

/// Options for the analyzer host manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostOptions {
    /// Share hosts between calls with the same analyzer set.
    pub cache_hosts: bool,
    /// Whether the runtime permits loading analyzer code at all.
    pub dynamic_loading: bool,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            cache_hosts: true,
            dynamic_loading: true,
        }
    }
}

impl HostOptions {
    pub fn with_cache_hosts(mut self, cache: bool) -> Self {
        self.cache_hosts = cache;
        self
    }

    pub fn with_dynamic_loading(mut self, allowed: bool) -> Self {
        self.dynamic_loading = allowed;
        self
    }

    /// Read `COMPLOG_CACHE_HOSTS` and `COMPLOG_DYNAMIC_LOADING`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();
        if let Some(b) = lookup_bool(&lookup, "COMPLOG_CACHE_HOSTS") {
            options.cache_hosts = b;
        }
        if let Some(b) = lookup_bool(&lookup, "COMPLOG_DYNAMIC_LOADING") {
            options.dynamic_loading = b;
        }
        options
    }
}

/// Default budget for blob bytes a reader keeps decompressed.
pub const DEFAULT_BLOB_CACHE_BYTES: u64 = 64 * 1024 * 1024;

/// Options for [`CompilerLogReader`](crate::reader::CompilerLogReader).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    pub analyzer_kind: BasicAnalyzerKind,
    pub host: HostOptions,
    /// Upper bound on cached content and assembly bytes. Least recently
    /// used blobs are evicted past it; `0` disables the cache.
    pub blob_cache_bytes: u64,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            analyzer_kind: BasicAnalyzerKind::default(),
            host: HostOptions::default(),
            blob_cache_bytes: DEFAULT_BLOB_CACHE_BYTES,
        }
    }
}

impl ReaderOptions {
    pub fn with_analyzer_kind(mut self, kind: BasicAnalyzerKind) -> Self {
        self.analyzer_kind = kind;
        self
    }

    pub fn with_host(mut self, host: HostOptions) -> Self {
        self.host = host;
        self
    }

    pub fn with_blob_cache_bytes(mut self, bytes: u64) -> Self {
        self.blob_cache_bytes = bytes;
        self
    }

    /// Read `COMPLOG_ANALYZERS` (`none`/`in_memory`/`on_disk`),
    /// `COMPLOG_BLOB_CACHE_BYTES`, and the [`HostOptions`] keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self {
            host: HostOptions::from_lookup(&lookup),
            ..Self::default()
        };
        if let Some(v) = lookup("COMPLOG_ANALYZERS") {
            match v.parse() {
                Ok(kind) => options.analyzer_kind = kind,
                Err(_) => warn!(value = %v, "ignoring unknown COMPLOG_ANALYZERS"),
            }
        }
        if let Some(v) = lookup("COMPLOG_BLOB_CACHE_BYTES") {
            match v.parse() {
                Ok(bytes) => options.blob_cache_bytes = bytes,
                Err(_) => warn!(value = %v, "ignoring non-numeric COMPLOG_BLOB_CACHE_BYTES"),
            }
        }
        options
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }
}

fn lookup_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let value = lookup(key)?;
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(key, value = %value, "ignoring non-boolean setting");
            None
        }
    }
}
