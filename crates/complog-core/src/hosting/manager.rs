//! Creating, sharing and tearing down analyzer hosts.
//!
//! Hosts that load code are cached per `(strategy, fingerprint)` and
//! reference-counted through [`HostLease`]s. The context behind a host is
//! unloaded exactly once, when the last lease goes away or the manager is
//! closed. `None` hosts are never cached.
//!
//! Locking: the slot map lock is only held to look up or remove a slot.
//! Host creation happens under the slot's own lock, so two callers asking
//! for the same fingerprint at once get one host between them. Release
//! takes the map lock, then the slot lock; acquire never holds a slot lock
//! while taking the map lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::HostOptions;
use crate::domain::{AnalyzerData, ComplogError, Result};
use crate::hosting::context::{ContextFactory, DefaultContextFactory};
use crate::hosting::host::{AnalyzerHost, GeneratedText};
use crate::hosting::strategy::{fingerprint, BasicAnalyzerKind};
use crate::metrics::METRICS;
use crate::obs;

/// What a host needs from the call it serves.
pub trait HostInputs {
    /// Bytes of one analyzer binary.
    fn analyzer_bytes(&self, analyzer: &AnalyzerData) -> Result<Arc<[u8]>>;

    /// Generated text recorded for the call, for `None` hosts.
    fn generated_text(&self) -> Result<GeneratedText>;
}

type HostKey = (BasicAnalyzerKind, String);

enum Slot {
    Empty,
    Live { host: Arc<AnalyzerHost>, refs: usize },
    /// Torn down; a new slot must be created for this key.
    Retired,
}

struct Shared {
    slots: Mutex<HashMap<HostKey, Arc<Mutex<Slot>>>>,
}

impl Shared {
    fn release(&self, key: &HostKey, slot: &Arc<Mutex<Slot>>) {
        let mut map = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
        let Slot::Live { host, refs } = &mut *guard else {
            return;
        };
        *refs -= 1;
        if *refs > 0 {
            return;
        }
        let host = host.clone();
        *guard = Slot::Retired;
        if map.get(key).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            map.remove(key);
        }
        drop(guard);
        drop(map);
        host.dispose();
    }

    /// Drop a slot left empty by a failed creation.
    fn discard_empty(&self, key: &HostKey, slot: &Arc<Mutex<Slot>>) {
        let mut map = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let guard = slot.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(*guard, Slot::Empty) && map.get(key).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            map.remove(key);
        }
    }
}

/// Shared use of an [`AnalyzerHost`].
///
/// Dropping the lease (or calling [`release`](Self::release)) gives up this
/// holder's reference.
pub struct HostLease {
    host: Arc<AnalyzerHost>,
    cached: Option<(Arc<Shared>, HostKey, Arc<Mutex<Slot>>)>,
    released: bool,
}

impl HostLease {
    pub fn host(&self) -> &AnalyzerHost {
        &self.host
    }

    /// Whether this lease shares a cached host.
    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }

    /// Whether two leases refer to the same host instance.
    pub fn same_host(&self, other: &HostLease) -> bool {
        Arc::ptr_eq(&self.host, &other.host)
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        match &self.cached {
            Some((shared, key, slot)) => shared.release(key, slot),
            None => self.host.dispose(),
        }
    }
}

impl std::ops::Deref for HostLease {
    type Target = AnalyzerHost;

    fn deref(&self) -> &AnalyzerHost {
        &self.host
    }
}

impl Drop for HostLease {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for HostLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostLease")
            .field("host", &self.host)
            .field("cached", &self.is_cached())
            .finish()
    }
}

/// Hands out analyzer hosts.
pub struct AnalyzerHostManager {
    options: HostOptions,
    factory: Arc<dyn ContextFactory>,
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl AnalyzerHostManager {
    pub fn new(options: HostOptions) -> Self {
        Self::with_factory(options, Arc::new(DefaultContextFactory))
    }

    pub fn with_factory(options: HostOptions, factory: Arc<dyn ContextFactory>) -> Self {
        Self {
            options,
            factory,
            shared: Arc::new(Shared {
                slots: Mutex::new(HashMap::new()),
            }),
            closed: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> HostOptions {
        self.options
    }

    /// Number of cached hosts currently alive.
    pub fn live_hosts(&self) -> usize {
        let slots: Vec<_> = self
            .shared
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        slots
            .iter()
            .filter(|s| matches!(*s.lock().unwrap_or_else(|e| e.into_inner()), Slot::Live { .. }))
            .count()
    }

    /// Get a host for `analyzers` under strategy `kind`.
    ///
    /// Fails with `Capability` if the strategy loads code and the runtime
    /// forbids it.
    pub fn acquire(
        &self,
        kind: BasicAnalyzerKind,
        analyzers: &[AnalyzerData],
        inputs: &dyn HostInputs,
    ) -> Result<HostLease> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ComplogError::HostDisposed);
        }
        if kind.loads_code() && !self.options.dynamic_loading {
            return Err(ComplogError::Capability { kind });
        }
        let fp = fingerprint(analyzers);

        if !kind.loads_code() {
            let host = AnalyzerHost::without_analyzers(fp, inputs.generated_text()?);
            return Ok(HostLease {
                host: Arc::new(host),
                cached: None,
                released: false,
            });
        }

        if !self.options.cache_hosts {
            let host = self.create(kind, fp, analyzers, inputs)?;
            return Ok(HostLease {
                host,
                cached: None,
                released: false,
            });
        }

        let key: HostKey = (kind, fp);
        loop {
            let slot = {
                let mut map = self.shared.slots.lock().unwrap_or_else(|e| e.into_inner());
                if self.closed.load(Ordering::Acquire) {
                    return Err(ComplogError::HostDisposed);
                }
                map.entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(Slot::Empty)))
                    .clone()
            };
            let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
            match &mut *guard {
                // Torn down between lookup and lock; the map no longer holds it.
                Slot::Retired => continue,
                Slot::Live { host, refs } => {
                    *refs += 1;
                    METRICS.inc_host_cache_hits();
                    debug!(kind = %kind, fingerprint = %key.1, refs = *refs, "analyzer host reused");
                    let host = host.clone();
                    drop(guard);
                    return Ok(self.lease(host, key, slot));
                }
                Slot::Empty => match self.create(kind, key.1.clone(), analyzers, inputs) {
                    Ok(host) => {
                        *guard = Slot::Live {
                            host: host.clone(),
                            refs: 1,
                        };
                        drop(guard);
                        return Ok(self.lease(host, key, slot));
                    }
                    Err(e) => {
                        drop(guard);
                        self.shared.discard_empty(&key, &slot);
                        return Err(e);
                    }
                },
            }
        }
    }

    fn lease(&self, host: Arc<AnalyzerHost>, key: HostKey, slot: Arc<Mutex<Slot>>) -> HostLease {
        HostLease {
            host,
            cached: Some((self.shared.clone(), key, slot)),
            released: false,
        }
    }

    fn create(
        &self,
        kind: BasicAnalyzerKind,
        fp: String,
        analyzers: &[AnalyzerData],
        inputs: &dyn HostInputs,
    ) -> Result<Arc<AnalyzerHost>> {
        let context = self.factory.create(kind, &fp)?;
        let mut modules = Vec::with_capacity(analyzers.len());
        for analyzer in analyzers {
            let loaded = inputs
                .analyzer_bytes(analyzer)
                .and_then(|bytes| context.load(analyzer.file_name(), bytes));
            match loaded {
                Ok(m) => modules.push(m),
                Err(e) => {
                    context.unload();
                    return Err(e);
                }
            }
        }
        METRICS.inc_hosts_created();
        obs::emit_host_created(kind, &fp, modules.len());
        Ok(Arc::new(AnalyzerHost::loaded(fp, context, modules)))
    }

    /// Dispose every cached host. Outstanding leases keep their `Arc` but
    /// the host behind it is unloaded. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let slots: Vec<_> = self
            .shared
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, slot)| slot)
            .collect();
        for slot in slots {
            let previous = std::mem::replace(
                &mut *slot.lock().unwrap_or_else(|e| e.into_inner()),
                Slot::Retired,
            );
            if let Slot::Live { host, .. } = previous {
                host.dispose();
            }
        }
        debug!("analyzer host manager closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for AnalyzerHostManager {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for AnalyzerHostManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerHostManager")
            .field("options", &self.options)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AssemblyIdentity;
    use complog_store::ModuleId;
    use std::sync::atomic::AtomicUsize;

    struct FakeInputs {
        loads: AtomicUsize,
    }

    impl FakeInputs {
        fn new() -> Self {
            Self {
                loads: AtomicUsize::new(0),
            }
        }
    }

    impl HostInputs for FakeInputs {
        fn analyzer_bytes(&self, _analyzer: &AnalyzerData) -> Result<Arc<[u8]>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::from(&b"MZ"[..]))
        }

        fn generated_text(&self) -> Result<GeneratedText> {
            Ok(GeneratedText::Unavailable("not recorded".to_string()))
        }
    }

    fn analyzers(bytes: &[u8]) -> Vec<AnalyzerData> {
        bytes
            .iter()
            .map(|b| AnalyzerData {
                identity: AssemblyIdentity {
                    module_id: ModuleId::from_bytes([*b; 16]),
                    name: format!("A{b}"),
                    informational_version: None,
                },
                file_path: format!("/pkgs/A{b}.dll"),
            })
            .collect()
    }

    #[test]
    fn same_fingerprint_shares_one_host() {
        let manager = AnalyzerHostManager::new(HostOptions::default());
        let inputs = FakeInputs::new();
        let a = manager
            .acquire(BasicAnalyzerKind::InMemory, &analyzers(&[1, 2]), &inputs)
            .unwrap();
        let b = manager
            .acquire(BasicAnalyzerKind::InMemory, &analyzers(&[2, 1]), &inputs)
            .unwrap();
        assert!(a.same_host(&b));
        assert_eq!(inputs.loads.load(Ordering::SeqCst), 2);
        assert_eq!(manager.live_hosts(), 1);

        a.release();
        assert!(!b.is_disposed());
        assert_eq!(manager.live_hosts(), 1);
        drop(b);
        assert_eq!(manager.live_hosts(), 0);
    }

    #[test]
    fn host_is_disposed_when_last_lease_goes() {
        let manager = AnalyzerHostManager::new(HostOptions::default());
        let inputs = FakeInputs::new();
        let a = manager
            .acquire(BasicAnalyzerKind::InMemory, &analyzers(&[1]), &inputs)
            .unwrap();
        let host = a.host.clone();
        drop(a);
        assert!(host.is_disposed());

        let again = manager
            .acquire(BasicAnalyzerKind::InMemory, &analyzers(&[1]), &inputs)
            .unwrap();
        assert!(!Arc::ptr_eq(&host, &again.host));
    }

    #[test]
    fn different_fingerprints_and_strategies_are_isolated() {
        let manager = AnalyzerHostManager::new(HostOptions::default());
        let inputs = FakeInputs::new();
        let a = manager
            .acquire(BasicAnalyzerKind::InMemory, &analyzers(&[1]), &inputs)
            .unwrap();
        let b = manager
            .acquire(BasicAnalyzerKind::InMemory, &analyzers(&[3]), &inputs)
            .unwrap();
        let c = manager
            .acquire(BasicAnalyzerKind::OnDisk, &analyzers(&[1]), &inputs)
            .unwrap();
        assert!(!a.same_host(&b));
        assert!(!a.same_host(&c));
        assert_eq!(c.modules()[0].path.as_ref().map(|p| p.exists()), Some(true));
    }

    #[test]
    fn none_strategy_is_never_cached() {
        let manager = AnalyzerHostManager::new(HostOptions::default());
        let inputs = FakeInputs::new();
        let a = manager
            .acquire(BasicAnalyzerKind::None, &analyzers(&[1]), &inputs)
            .unwrap();
        let b = manager
            .acquire(BasicAnalyzerKind::None, &analyzers(&[1]), &inputs)
            .unwrap();
        assert!(!a.is_cached());
        assert!(!a.same_host(&b));
        assert!(!a.is_available());
        assert_eq!(inputs.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn caching_can_be_disabled() {
        let manager = AnalyzerHostManager::new(HostOptions::default().with_cache_hosts(false));
        let inputs = FakeInputs::new();
        let a = manager
            .acquire(BasicAnalyzerKind::InMemory, &analyzers(&[1]), &inputs)
            .unwrap();
        let b = manager
            .acquire(BasicAnalyzerKind::InMemory, &analyzers(&[1]), &inputs)
            .unwrap();
        assert!(!a.same_host(&b));
        let host = a.host.clone();
        drop(a);
        assert!(host.is_disposed());
        assert!(!b.is_disposed());
    }

    #[test]
    fn loading_forbidden_is_a_capability_error() {
        let manager =
            AnalyzerHostManager::new(HostOptions::default().with_dynamic_loading(false));
        let inputs = FakeInputs::new();
        for kind in [BasicAnalyzerKind::InMemory, BasicAnalyzerKind::OnDisk] {
            let err = manager.acquire(kind, &analyzers(&[1]), &inputs).unwrap_err();
            assert!(matches!(err, ComplogError::Capability { kind: k } if k == kind));
        }
        assert!(manager
            .acquire(BasicAnalyzerKind::None, &analyzers(&[1]), &inputs)
            .is_ok());
    }

    #[test]
    fn close_disposes_outstanding_hosts() {
        let manager = AnalyzerHostManager::new(HostOptions::default());
        let inputs = FakeInputs::new();
        let lease = manager
            .acquire(BasicAnalyzerKind::InMemory, &analyzers(&[1]), &inputs)
            .unwrap();
        manager.close();
        manager.close();
        assert!(lease.is_disposed());
        drop(lease);
        assert!(matches!(
            manager.acquire(BasicAnalyzerKind::InMemory, &analyzers(&[1]), &inputs),
            Err(ComplogError::HostDisposed)
        ));
    }

    #[test]
    fn concurrent_acquires_create_one_host() {
        let manager = Arc::new(AnalyzerHostManager::new(HostOptions::default()));
        let inputs = Arc::new(FakeInputs::new());
        let leases: Vec<HostLease> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let manager = manager.clone();
                    let inputs = inputs.clone();
                    s.spawn(move || {
                        manager
                            .acquire(BasicAnalyzerKind::InMemory, &analyzers(&[5, 6]), &*inputs)
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(leases.windows(2).all(|w| w[0].same_host(&w[1])));
        assert_eq!(inputs.loads.load(Ordering::SeqCst), 2);
    }
}
