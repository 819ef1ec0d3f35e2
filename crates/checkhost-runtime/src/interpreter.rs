//! Boot and teardown of the embedded runtime.

use chrono::{DateTime, Utc};
use checkhost_aggregator::SenderProvider;
use checkhost_core::config::RuntimeConfig;
use checkhost_core::status::RuntimeStatus;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::capability::{self, HostMetadata};
use crate::error::{RuntimeError, RuntimeResult};
use crate::lock::{GlobalLock, LockToken};
use crate::metrics::RuntimeMetrics;
use crate::object::{ModuleHandle, Object};
use crate::RUNTIME_VERSION;

/// Name of the built-in module holding `path` and `version`.
pub const SYS_MODULE: &str = "sys";

static NEXT_INTERPRETER_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of an [`Interpreter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Uninitialized = 0,
    Booting = 1,
    Initialized = 2,
    ShuttingDown = 3,
    Finalized = 4,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Uninitialized,
            1 => LifecycleState::Booting,
            2 => LifecycleState::Initialized,
            3 => LifecycleState::ShuttingDown,
            _ => LifecycleState::Finalized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Booting => "booting",
            LifecycleState::Initialized => "initialized",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Finalized => "finalized",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle returned by [`Interpreter::initialize`] and required by
/// [`Interpreter::shutdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedExecutionState {
    interpreter_id: u64,
    boot_thread: ThreadId,
    booted_at: DateTime<Utc>,
}

impl SavedExecutionState {
    pub fn boot_thread(&self) -> ThreadId {
        self.boot_thread
    }

    pub fn booted_at(&self) -> DateTime<Utc> {
        self.booted_at
    }
}

/// The embedded runtime.
///
/// There is one per process in practice; the host creates it explicitly and
/// shares it behind an `Arc`. Everything that touches runtime state goes
/// through a [`LockToken`] obtained from [`Interpreter::acquire`].
pub struct Interpreter {
    id: u64,
    config: RuntimeConfig,
    host: HostMetadata,
    senders: Arc<dyn SenderProvider>,
    lock: GlobalLock,
    // Read without the transition mutex so `acquire` never contends with a
    // boot or teardown in progress.
    state: AtomicU8,
    transition: Mutex<Option<SavedExecutionState>>,
    modules: RwLock<BTreeMap<String, ModuleHandle>>,
    site_disabled: AtomicBool,
    metrics: RuntimeMetrics,
}

impl Interpreter {
    pub fn new(
        config: RuntimeConfig,
        host: HostMetadata,
        senders: Arc<dyn SenderProvider>,
    ) -> Self {
        Self {
            id: NEXT_INTERPRETER_ID.fetch_add(1, Ordering::Relaxed),
            config,
            host,
            senders,
            lock: GlobalLock::new(),
            state: AtomicU8::new(LifecycleState::Uninitialized as u8),
            transition: Mutex::new(None),
            modules: RwLock::new(BTreeMap::new()),
            site_disabled: AtomicBool::new(false),
            metrics: RuntimeMetrics::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: LifecycleState) {
        trace!(interpreter = self.id, %state, "lifecycle transition");
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == LifecycleState::Initialized
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn metrics(&self) -> &RuntimeMetrics {
        &self.metrics
    }

    /// Whether site auto-configuration was turned off before boot.
    pub fn is_site_disabled(&self) -> bool {
        self.site_disabled.load(Ordering::Acquire)
    }

    /// Number of capability modules injected since creation.
    pub fn injection_count(&self) -> u64 {
        self.metrics.get_injections()
    }

    /// Boots the runtime, appends `search_paths` to its module search path
    /// and injects the capability modules.
    ///
    /// Calling it again once booted does nothing and returns the state saved
    /// by the first call. Concurrent callers wait for the boot in flight.
    pub fn initialize<S: AsRef<str>>(
        &self,
        search_paths: &[S],
    ) -> RuntimeResult<SavedExecutionState> {
        let mut saved = self.transition.lock();

        match self.state() {
            LifecycleState::Uninitialized => {}
            LifecycleState::Initialized => {
                debug!(interpreter = self.id, "runtime already initialized");
                return saved.clone().ok_or_else(|| {
                    RuntimeError::init_failure("initialized runtime has no saved state")
                });
            }
            LifecycleState::Booting => {
                return Err(RuntimeError::init_failure("runtime boot already in progress"));
            }
            LifecycleState::ShuttingDown | LifecycleState::Finalized => {
                return Err(RuntimeError::init_failure(
                    "runtime has been finalized and cannot boot again",
                ));
            }
        }

        self.set_state(LifecycleState::Booting);
        match self.boot(search_paths) {
            Ok(state) => {
                *saved = Some(state.clone());
                self.set_state(LifecycleState::Initialized);
                info!(
                    interpreter = self.id,
                    search_paths = search_paths.len(),
                    "embedded runtime initialized"
                );
                Ok(state)
            }
            Err(e) => {
                self.modules.write().clear();
                self.set_state(LifecycleState::Uninitialized);
                error!(interpreter = self.id, error = %e, "embedded runtime failed to boot");
                Err(e)
            }
        }
    }

    fn boot<S: AsRef<str>>(&self, search_paths: &[S]) -> RuntimeResult<SavedExecutionState> {
        self.site_disabled.store(true, Ordering::Release);

        if let Some(home) = &self.config.home {
            if !home.is_dir() {
                return Err(RuntimeError::init_failure(format!(
                    "runtime home {} does not exist",
                    home.display()
                )));
            }
        }

        let token = self.lock.enable();
        if !self.lock.is_enabled() || self.lock.owner() != Some(token.thread()) {
            return Err(RuntimeError::init_failure(
                "locking subsystem did not leave the lock held by the booting thread",
            ));
        }

        let sys = ModuleHandle::new(SYS_MODULE);
        sys.set_attr(&token, "path", Object::list([]));
        sys.set_attr(
            &token,
            "version",
            Object::str(format!("{} [{}]", RUNTIME_VERSION, self.config.program_name)),
        );
        sys.set_attr(&token, "executable", Object::str(&self.config.program_name));
        self.modules.write().insert(SYS_MODULE.to_string(), sys.clone());

        for path in search_paths {
            append_search_path(&token, &sys, path.as_ref())?;
            debug!(path = path.as_ref(), "appended runtime search path");
        }

        let state = SavedExecutionState {
            interpreter_id: self.id,
            boot_thread: token.thread(),
            booted_at: Utc::now(),
        };

        // Save thread state: other threads may take the lock from here on.
        drop(token);

        let senders = Arc::clone(&self.senders);
        self.inject(|token| capability::aggregator_module(token, senders));
        let host = self.host.clone();
        self.inject(|token| capability::host_agent_module(token, host));

        Ok(state)
    }

    fn inject(&self, build: impl FnOnce(&LockToken<'_>) -> ModuleHandle) {
        let token = self.acquire_unchecked();
        let module = build(&token);
        let name = module.name().to_string();
        if self.modules.write().insert(name.clone(), module).is_some() {
            warn!(module = %name, "capability module replaced an existing module");
        }
        self.metrics.record_injection(&name);
        debug!(module = %name, "injected capability module");
    }

    /// Finalizes the runtime. The module table is cleared and no further
    /// acquisition succeeds.
    pub fn shutdown(&self, state: SavedExecutionState) -> RuntimeResult<()> {
        let mut saved = self.transition.lock();

        match self.state() {
            LifecycleState::Initialized => {}
            LifecycleState::Uninitialized | LifecycleState::Booting => {
                return Err(RuntimeError::NotInitialized);
            }
            LifecycleState::ShuttingDown | LifecycleState::Finalized => {
                return Err(RuntimeError::AlreadyFinalized);
            }
        }
        if state.interpreter_id != self.id {
            return Err(RuntimeError::invalid_argument(
                "state",
                format!(
                    "saved state of interpreter {} passed to interpreter {}",
                    state.interpreter_id, self.id
                ),
            ));
        }

        self.set_state(LifecycleState::ShuttingDown);
        {
            let token = self.acquire_unchecked();
            let modules = std::mem::take(&mut *self.modules.write());
            for module in modules.values() {
                for name in module.dir(&token) {
                    module.del_attr(&token, &name);
                }
            }
            debug!(modules = modules.len(), "cleared module table");
        }
        *saved = None;
        self.set_state(LifecycleState::Finalized);

        info!(interpreter = self.id, booted_at = %state.booted_at, "embedded runtime finalized");
        Ok(())
    }

    /// Blocks until the calling thread holds the runtime lock.
    ///
    /// Fails unless the runtime is initialized, both before blocking and once
    /// the lock is held. The returned token is bound to this thread and
    /// releases the lock when dropped.
    pub fn acquire(&self) -> RuntimeResult<LockToken<'_>> {
        self.ensure_acquirable()?;
        let token = self.acquire_unchecked();
        if let Err(e) = self.ensure_acquirable() {
            // Shutdown began while this thread was waiting.
            drop(token);
            return Err(e);
        }
        Ok(token)
    }

    fn ensure_acquirable(&self) -> RuntimeResult<()> {
        let state = self.state();
        if state != LifecycleState::Initialized {
            return Err(RuntimeError::init_failure(format!(
                "cannot acquire the runtime lock while the runtime is {}",
                state
            )));
        }
        Ok(())
    }

    fn acquire_unchecked(&self) -> LockToken<'_> {
        let started = Instant::now();
        let token = self.lock.lock();
        self.metrics
            .record_acquire(started.elapsed(), token.was_contended(), token.is_nested());
        trace!(thread = ?token.thread(), nested = token.is_nested(), "runtime lock acquired");
        token
    }

    /// Runs `f` while holding the runtime lock.
    pub fn with_lock<T>(
        &self,
        f: impl FnOnce(&LockToken<'_>) -> RuntimeResult<T>,
    ) -> RuntimeResult<T> {
        let token = self.acquire()?;
        f(&token)
    }

    /// Runs `f` under the runtime lock on a dedicated blocking thread, so the
    /// whole critical section stays on one native thread whatever the async
    /// scheduler does with the calling task.
    pub async fn with_lock_blocking<F, T>(self: &Arc<Self>, f: F) -> RuntimeResult<T>
    where
        F: FnOnce(&LockToken<'_>) -> RuntimeResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run_blocking(move |interpreter| interpreter.with_lock(f)).await
    }

    /// Runs `f` on a blocking thread. Use it from async code for anything
    /// that takes the runtime lock itself, such as `initialize`, `status`
    /// or `shutdown`.
    pub async fn run_blocking<F, T>(self: &Arc<Self>, f: F) -> RuntimeResult<T>
    where
        F: FnOnce(&Interpreter) -> RuntimeResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let interpreter = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&interpreter))
            .await
            .map_err(|e| RuntimeError::TaskFailed(e.to_string()))?
    }

    /// Registers `module` in the module table, returning the one it replaces.
    pub fn add_module(&self, _token: &LockToken<'_>, module: ModuleHandle) -> Option<ModuleHandle> {
        let name = module.name().to_string();
        debug!(module = %name, "registering module");
        self.modules.write().insert(name, module)
    }

    pub fn import(&self, _token: &LockToken<'_>, name: &str) -> RuntimeResult<ModuleHandle> {
        self.modules
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::ModuleNotFound(name.to_string()))
    }

    /// Names in the module table.
    pub fn modules(&self, _token: &LockToken<'_>) -> Vec<String> {
        self.modules.read().keys().cloned().collect()
    }

    /// Current module search path, in lookup order.
    pub fn search_path(&self, token: &LockToken<'_>) -> RuntimeResult<Vec<String>> {
        let path = self.import(token, SYS_MODULE)?.get_attr(token, "path")?;
        let items = path
            .as_list()
            .ok_or_else(|| RuntimeError::TypeError(format!("sys.path is {}", path.type_name())))?;
        Ok(items
            .iter()
            .filter_map(|p| p.as_str().map(str::to_string))
            .collect())
    }

    /// Interpreter version string.
    pub fn version(&self) -> RuntimeResult<String> {
        self.with_lock(|token| {
            let version = self.import(token, SYS_MODULE)?.get_attr(token, "version")?;
            version
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| {
                    RuntimeError::TypeError(format!("sys.version is {}", version.type_name()))
                })
        })
    }

    /// Snapshot for status output. Checks are filled in by the caller.
    pub fn status(&self) -> RuntimeResult<RuntimeStatus> {
        let state = self.state();
        if state != LifecycleState::Initialized {
            return Ok(RuntimeStatus {
                state: state.to_string(),
                version: RUNTIME_VERSION.to_string(),
                ..RuntimeStatus::default()
            });
        }

        let version = self.version()?;
        self.with_lock(|token| {
            Ok(RuntimeStatus {
                state: state.to_string(),
                version,
                search_paths: self.search_path(token)?,
                modules: self.modules(token),
                checks: Vec::new(),
            })
        })
    }
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

fn append_search_path(token: &LockToken<'_>, sys: &ModuleHandle, path: &str) -> RuntimeResult<()> {
    let current = sys.get_attr(token, "path")?;
    let mut entries = current.as_list().map(<[Object]>::to_vec).unwrap_or_default();
    entries.push(Object::str(path));
    sys.set_attr(token, "path", Object::list(entries));
    Ok(())
}
