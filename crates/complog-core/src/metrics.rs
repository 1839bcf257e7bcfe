//! Process-wide counters for archive building and replay.
//!
//! Counters are bumped at the call site with relaxed atomics. Call
//! [`Metrics::flush`] at a natural boundary (archive finished, reader
//! closed) to emit the current values as one `info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub calls_correlated: u64,
    pub calls_archived: u64,
    pub calls_rejected: u64,
    pub content_blobs_written: u64,
    pub content_blobs_deduplicated: u64,
    pub assembly_blobs_written: u64,
    pub assembly_blobs_deduplicated: u64,
    pub hosts_created: u64,
    pub host_cache_hits: u64,
}

pub struct Metrics {
    calls_correlated: AtomicU64,
    calls_archived: AtomicU64,
    calls_rejected: AtomicU64,
    content_blobs_written: AtomicU64,
    content_blobs_deduplicated: AtomicU64,
    assembly_blobs_written: AtomicU64,
    assembly_blobs_deduplicated: AtomicU64,
    hosts_created: AtomicU64,
    host_cache_hits: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn bump(counter: &AtomicU64, name: &'static str) {
    counter.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(metric = name, "counter incremented");
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            calls_correlated: AtomicU64::new(0),
            calls_archived: AtomicU64::new(0),
            calls_rejected: AtomicU64::new(0),
            content_blobs_written: AtomicU64::new(0),
            content_blobs_deduplicated: AtomicU64::new(0),
            assembly_blobs_written: AtomicU64::new(0),
            assembly_blobs_deduplicated: AtomicU64::new(0),
            hosts_created: AtomicU64::new(0),
            host_cache_hits: AtomicU64::new(0),
        }
    }

    pub fn inc_calls_correlated(&self) {
        bump(&self.calls_correlated, "calls_correlated");
    }

    pub fn inc_calls_archived(&self) {
        bump(&self.calls_archived, "calls_archived");
    }

    pub fn inc_calls_rejected(&self) {
        bump(&self.calls_rejected, "calls_rejected");
    }

    /// Count one content blob, either newly written or deduplicated.
    pub fn record_content_blob(&self, deduplicated: bool) {
        if deduplicated {
            bump(&self.content_blobs_deduplicated, "content_blobs_deduplicated");
        } else {
            bump(&self.content_blobs_written, "content_blobs_written");
        }
    }

    /// Count one assembly blob, either newly written or deduplicated.
    pub fn record_assembly_blob(&self, deduplicated: bool) {
        if deduplicated {
            bump(&self.assembly_blobs_deduplicated, "assembly_blobs_deduplicated");
        } else {
            bump(&self.assembly_blobs_written, "assembly_blobs_written");
        }
    }

    pub fn inc_hosts_created(&self) {
        bump(&self.hosts_created, "hosts_created");
    }

    pub fn inc_host_cache_hits(&self) {
        bump(&self.host_cache_hits, "host_cache_hits");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            calls_correlated: get(&self.calls_correlated),
            calls_archived: get(&self.calls_archived),
            calls_rejected: get(&self.calls_rejected),
            content_blobs_written: get(&self.content_blobs_written),
            content_blobs_deduplicated: get(&self.content_blobs_deduplicated),
            assembly_blobs_written: get(&self.assembly_blobs_written),
            assembly_blobs_deduplicated: get(&self.assembly_blobs_deduplicated),
            hosts_created: get(&self.hosts_created),
            host_cache_hits: get(&self.host_cache_hits),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            calls_correlated = s.calls_correlated,
            calls_archived = s.calls_archived,
            calls_rejected = s.calls_rejected,
            content_blobs_written = s.content_blobs_written,
            content_blobs_deduplicated = s.content_blobs_deduplicated,
            assembly_blobs_written = s.assembly_blobs_written,
            assembly_blobs_deduplicated = s.assembly_blobs_deduplicated,
            hosts_created = s.hosts_created,
            host_cache_hits = s.host_cache_hits,
        );
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for c in [
            &self.calls_correlated,
            &self.calls_archived,
            &self.calls_rejected,
            &self.content_blobs_written,
            &self.content_blobs_deduplicated,
            &self.assembly_blobs_written,
            &self.assembly_blobs_deduplicated,
            &self.hosts_created,
            &self.host_cache_hits,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_calls_correlated();
        m.inc_calls_correlated();
        m.record_content_blob(false);
        m.record_content_blob(true);
        m.record_content_blob(true);
        m.record_assembly_blob(false);
        m.inc_hosts_created();
        m.inc_host_cache_hits();

        let s = m.snapshot();
        assert_eq!(s.calls_correlated, 2);
        assert_eq!(s.content_blobs_written, 1);
        assert_eq!(s.content_blobs_deduplicated, 2);
        assert_eq!(s.assembly_blobs_written, 1);
        assert_eq!(s.assembly_blobs_deduplicated, 0);
        assert_eq!(s.hosts_created, 1);
        assert_eq!(s.host_cache_hits, 1);
        m.flush();
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_calls_archived();
        m.inc_calls_rejected();
        m.inc_hosts_created();
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }
}
