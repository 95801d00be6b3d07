//! Runtime data model: `ServiceState`, `ServiceProcess`, `Registry`, `StartedMarkers`.
//!
//! The registry is the only place where process state is authoritative at runtime (invariant 6
//! in the design: no two entries share a name, and removing an entry releases exactly one
//! "service done" ticket). `StartedMarkers` is intentionally separate so a short-lived
//! predecessor still counts as "started" for its dependents even after it has exited.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Instant, SystemTime};

use crate::config::ServiceSpec;

/// The lifecycle state of one service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceState {
    /// Declared and enabled, but still waiting on its pre-script or dependency gate; not yet
    /// registered as a live instance.
    Pending,
    /// Registered, PTY/process not yet confirmed live.
    Starting,
    /// Spawn succeeded; the child is live.
    Running,
    /// Teardown in progress (signalled or restarting).
    Stopping,
    /// Child reaped cleanly after teardown.
    Stopped,
    /// Sticky terminal failure for this instance.
    Failed,
}

/// A handle that, when invoked, requests the owning service's teardown watcher to run.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Create a fresh, un-cancelled handle.
    pub fn new() -> Self {
        CancelHandle(Arc::new(AtomicBool::new(false)))
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable runtime record for one service instance.
pub struct ServiceProcess {
    /// The service's declared name.
    pub name: String,
    /// Copy of the spec, kept around so a restart can re-invoke the runner.
    pub spec: ServiceSpec,
    state: RwLock<ServiceState>,
    last_error: RwLock<Option<String>>,
    /// When this instance was created.
    pub start_time: SystemTime,
    start_instant: Instant,
    pid: RwLock<Option<u32>>,
    /// Cancellation handle for this instance's teardown watcher.
    pub cancel: CancelHandle,
}

impl ServiceProcess {
    /// Construct a new instance in the `Starting` state.
    pub fn new(name: String, spec: ServiceSpec) -> Self {
        ServiceProcess {
            name,
            spec,
            state: RwLock::new(ServiceState::Starting),
            last_error: RwLock::new(None),
            start_time: SystemTime::now(),
            start_instant: Instant::now(),
            pid: RwLock::new(None),
            cancel: CancelHandle::new(),
        }
    }

    /// Current lifecycle state.
    pub fn get_state(&self) -> ServiceState {
        *self.state.read().expect("state lock poisoned")
    }

    /// Transition to a new state. `Stopped` and `Failed` are terminal but the setter does not
    /// enforce that here — callers (the runner/teardown watcher) only ever call it along the
    /// legal transition edges described in the data model.
    pub fn set_state(&self, state: ServiceState) {
        *self.state.write().expect("state lock poisoned") = state;
    }

    /// Record an error and move to `Failed`. Sticky: callers should only invoke this once per
    /// instance.
    pub fn set_error(&self, message: impl Into<String>) {
        *self.last_error.write().expect("error lock poisoned") = Some(message.into());
        self.set_state(ServiceState::Failed);
    }

    /// The last recorded error, if any.
    pub fn get_error(&self) -> Option<String> {
        self.last_error.read().expect("error lock poisoned").clone()
    }

    /// The live child's OS pid, if currently known.
    pub fn get_pid(&self) -> Option<u32> {
        *self.pid.read().expect("pid lock poisoned")
    }

    /// Record the child's OS pid once spawn succeeds.
    pub fn set_pid(&self, pid: Option<u32>) {
        *self.pid.write().expect("pid lock poisoned") = pid;
    }

    /// Seconds elapsed since this instance was created.
    pub fn uptime_secs(&self) -> u64 {
        self.start_instant.elapsed().as_secs()
    }
}

/// The shared map of live service instances, the single runtime source of truth for state.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RwLock<HashMap<String, Arc<ServiceProcess>>>>,
    alive: Arc<AtomicU32>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Registry {
            inner: Arc::new(RwLock::new(HashMap::new())),
            alive: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Insert a new instance, replacing any prior entry for the same name. Increments the
    /// alive counter by exactly one.
    pub fn add_active(&self, process: Arc<ServiceProcess>) {
        let name = process.name.clone();
        self.inner
            .write()
            .expect("registry lock poisoned")
            .insert(name, process);
        self.alive.fetch_add(1, Ordering::SeqCst);
    }

    /// Remove an instance after its teardown has completed. Decrements the alive counter by
    /// exactly one if an entry was present.
    pub fn remove_active(&self, name: &str) {
        let removed = self
            .inner
            .write()
            .expect("registry lock poisoned")
            .remove(name);
        if removed.is_some() {
            self.alive.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Look up a live instance by name.
    pub fn get(&self, name: &str) -> Option<Arc<ServiceProcess>> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// Snapshot every live instance. Order is unspecified.
    pub fn snapshot(&self) -> Vec<Arc<ServiceProcess>> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Number of instances currently tracked as alive.
    pub fn alive_count(&self) -> u32 {
        self.alive.load(Ordering::SeqCst)
    }

    /// Whether the registry currently holds no instances.
    pub fn is_empty(&self) -> bool {
        self.alive_count() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-service "has been launched at least once this supervisor lifetime" markers, consumed by
/// the dependency coordinator (C3) to unblock dependents even after a short-lived predecessor
/// has already exited.
#[derive(Clone)]
pub struct StartedMarkers {
    inner: Arc<Mutex<HashMap<String, bool>>>,
}

impl StartedMarkers {
    /// An empty marker set.
    pub fn new() -> Self {
        StartedMarkers {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Mark `name` as started. Set after hand-off to the runner, before waiting for exit.
    pub fn mark_started(&self, name: &str) {
        self.inner
            .lock()
            .expect("started-markers lock poisoned")
            .insert(name.to_string(), true);
    }

    /// Whether `name` has been started at least once.
    pub fn is_started(&self, name: &str) -> bool {
        self.inner
            .lock()
            .expect("started-markers lock poisoned")
            .get(name)
            .copied()
            .unwrap_or(false)
    }
}

impl Default for StartedMarkers {
    fn default() -> Self {
        Self::new()
    }
}
