//! # Driver Affinity Module / 驱动亲和模块
//!
//! Each worker owns at most one live automation-backend handle per backend
//! type. Handles are created lazily on first use through a registered
//! [`DriverProvider`], reused for every later instance on the same worker,
//! and torn down when the worker runs out of work.
//!
//! 每个工作线程对每种后端类型最多拥有一个活动的自动化后端句柄。
//! 句柄在首次使用时通过注册的 [`DriverProvider`] 惰性创建，
//! 在同一工作线程的后续实例中复用，并在工作线程没有更多工作时销毁。
//!
//! ## Entry lifecycle / 条目生命周期
//!
//! `absent -> Initializing -> Ready -> (reused)* -> Closing -> absent`
//!
//! A failed initialization leaves a `Failed` entry behind so the worker does
//! not retry it within the same run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::core::error::{ConfigError, DriverError};
use crate::core::models::{BackendType, Step, WorkerId};
use crate::core::noop::NoopProvider;

/// Executes resolved steps against a live backend session.
/// 针对活动的后端会话执行已解析的步骤。
pub trait Driver: Send {
    /// Runs one step. `Ok` carries the step output, `Err` the failure message.
    fn perform(&mut self, step: &Step) -> Result<String, String>;
}

/// The contract every backend implementation provides.
/// 每个后端实现都需提供的契约。
pub trait DriverProvider: Send {
    fn initialize(&mut self) -> Result<(), DriverError>;
    fn driver(&mut self) -> &mut dyn Driver;
    fn close(&mut self) -> Result<(), DriverError>;
}

impl std::fmt::Debug for dyn DriverProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DriverProvider")
    }
}

/// Creates a fresh, uninitialized provider for a worker.
pub type ProviderFactory = Arc<dyn Fn(WorkerId) -> Box<dyn DriverProvider> + Send + Sync>;

/// A shared reference to an initialized provider.
pub type DriverHandle = Arc<Mutex<Box<dyn DriverProvider>>>;

/// Backend type to provider factory table.
/// 后端类型到提供者工厂的映射表。
#[derive(Clone)]
pub struct DriverRegistry {
    factories: HashMap<BackendType, ProviderFactory>,
}

impl DriverRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with the built-in no-op backend registered for `none`.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(BackendType::None, |_| -> Box<dyn DriverProvider> {
            Box::new(NoopProvider::default())
        });
        registry
    }

    pub fn register<F>(&mut self, backend: BackendType, factory: F)
    where
        F: Fn(WorkerId) -> Box<dyn DriverProvider> + Send + Sync + 'static,
    {
        self.factories.insert(backend, Arc::new(factory));
    }

    pub fn contains(&self, backend: BackendType) -> bool {
        self.factories.contains_key(&backend)
    }

    /// Fails when a backend in use has no provider. Checked while planning,
    /// before anything is scheduled.
    pub fn ensure_registered(&self, backend: BackendType) -> Result<(), ConfigError> {
        if self.contains(backend) {
            Ok(())
        } else {
            Err(ConfigError::MissingProvider(backend))
        }
    }

    fn create(&self, backend: BackendType, worker: WorkerId) -> Result<Box<dyn DriverProvider>, DriverError> {
        self.factories
            .get(&backend)
            .map(|factory| factory(worker))
            .ok_or_else(|| DriverError::Initialization(format!("no provider registered for backend '{backend}'")))
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut backends: Vec<_> = self.factories.keys().collect();
        backends.sort();
        f.debug_struct("DriverRegistry").field("backends", &backends).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Initializing,
    Ready,
    /// Initialization failed; the error is replayed on every later acquire.
    Failed,
    Closing,
}

struct CacheEntry {
    state: DriverState,
    handle: Option<DriverHandle>,
    error: Option<DriverError>,
}

type CacheKey = (WorkerId, BackendType);

/// Per-worker driver cache. Keys never overlap between workers, so the map
/// lock is only held for lookups and inserts, never across backend calls.
///
/// 按工作线程划分的驱动缓存。不同工作线程的键互不重叠，
/// 因此映射锁只在查找和插入时持有，从不跨越后端调用。
pub struct WorkerDriverCache {
    registry: DriverRegistry,
    keep_on_error: bool,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl WorkerDriverCache {
    pub fn new(registry: DriverRegistry, keep_on_error: bool) -> Self {
        Self {
            registry,
            keep_on_error,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the worker's handle for `backend`, creating and initializing it
    /// on first use.
    /// 返回工作线程对应 `backend` 的句柄，首次使用时创建并初始化。
    pub fn acquire(&self, worker: WorkerId, backend: BackendType) -> Result<DriverHandle, DriverError> {
        let key = (worker, backend);
        {
            let mut entries = self.lock();
            if let Some(entry) = entries.get(&key) {
                match entry.state {
                    DriverState::Ready => {
                        if let Some(handle) = &entry.handle {
                            return Ok(Arc::clone(handle));
                        }
                    }
                    DriverState::Failed => {
                        return Err(entry
                            .error
                            .clone()
                            .unwrap_or_else(|| DriverError::Initialization("unknown error".to_string())));
                    }
                    DriverState::Initializing | DriverState::Closing => {}
                }
            }
            entries.insert(
                key,
                CacheEntry {
                    state: DriverState::Initializing,
                    handle: None,
                    error: None,
                },
            );
        }

        debug!(%worker, %backend, "initializing driver");
        let initialized = self.registry.create(backend, worker).and_then(|mut provider| {
            provider.initialize()?;
            Ok(provider)
        });

        let mut entries = self.lock();
        match initialized {
            Ok(provider) => {
                let handle: DriverHandle = Arc::new(Mutex::new(provider));
                entries.insert(
                    key,
                    CacheEntry {
                        state: DriverState::Ready,
                        handle: Some(Arc::clone(&handle)),
                        error: None,
                    },
                );
                debug!(%worker, %backend, "driver ready");
                Ok(handle)
            }
            Err(error) => {
                warn!(%worker, %backend, %error, "driver initialization failed");
                entries.insert(
                    key,
                    CacheEntry {
                        state: DriverState::Failed,
                        handle: None,
                        error: Some(error.clone()),
                    },
                );
                Err(error)
            }
        }
    }

    /// Tears down every driver the worker holds, unless the keep-on-error
    /// policy is active and the worker's last instance failed. Retained
    /// drivers stay ready until [`WorkerDriverCache::shutdown`].
    ///
    /// 销毁工作线程持有的所有驱动，除非启用了出错保留策略且该工作线程的最后一个实例失败。
    pub fn release(&self, worker: WorkerId, last_instance_failed: bool) {
        if self.keep_on_error && last_instance_failed {
            debug!(%worker, "keeping drivers open after failure");
            return;
        }
        let closing = self.begin_closing(|(w, _)| *w == worker);
        self.finish_closing(closing);
    }

    /// Closes everything still cached, including drivers retained after a
    /// failure. Called once the run's results have been handed off.
    pub fn shutdown(&self) {
        let closing = self.begin_closing(|_| true);
        self.finish_closing(closing);
    }

    fn begin_closing<P>(&self, mut predicate: P) -> Vec<(CacheKey, Option<DriverHandle>)>
    where
        P: FnMut(&CacheKey) -> bool,
    {
        let mut entries = self.lock();
        let mut closing = Vec::new();
        for (key, entry) in entries.iter_mut() {
            if predicate(key) {
                match entry.state {
                    DriverState::Ready => {
                        entry.state = DriverState::Closing;
                        closing.push((*key, entry.handle.clone()));
                    }
                    DriverState::Failed => closing.push((*key, None)),
                    DriverState::Initializing | DriverState::Closing => {}
                }
            }
        }
        closing
    }

    fn finish_closing(&self, closing: Vec<(CacheKey, Option<DriverHandle>)>) {
        for ((worker, backend), handle) in closing {
            if let Some(handle) = handle {
                debug!(%worker, %backend, "closing driver");
                let mut provider = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if let Err(error) = provider.close() {
                    warn!(%worker, %backend, %error, "driver teardown failed");
                }
            }
            self.lock().remove(&(worker, backend));
        }
    }

    pub fn state(&self, worker: WorkerId, backend: BackendType) -> Option<DriverState> {
        self.lock().get(&(worker, backend)).map(|entry| entry.state)
    }

    /// Number of drivers currently ready.
    pub fn live_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|entry| entry.state == DriverState::Ready)
            .count()
    }
}

impl std::fmt::Debug for WorkerDriverCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerDriverCache")
            .field("registry", &self.registry)
            .field("keep_on_error", &self.keep_on_error)
            .field("live", &self.live_count())
            .finish()
    }
}
