//! Build locks for object caches.
//!
//! One lock per cache kind, shared by every collection of a [`Main`](crate::entities::Main):
//! building caches of two unrelated collections still serializes. Once built a
//! cache is reused until invalidated, so contention only hits cold caches.
//!
//! The default pair is process-wide ([`CacheGuards::global`]); single-threaded
//! tests can inject [`CacheGuards::unguarded`].

use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::entities::CacheKind;

/// Runs a cache build under mutual exclusion.
pub trait BuildLock: Send + Sync {
    fn with_lock(&self, build: &mut dyn FnMut());
}

/// Plain blocking mutex.
#[derive(Default)]
pub struct MutexLock {
    inner: Mutex<()>,
    acquired: AtomicUsize,
}

impl MutexLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many builds went through this lock.
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::Relaxed)
    }
}

impl BuildLock for MutexLock {
    fn with_lock(&self, build: &mut dyn FnMut()) {
        let _guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        self.acquired.fetch_add(1, Ordering::Relaxed);
        build();
    }
}

/// No locking at all. Only valid when a single thread touches the caches.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoopLock;

impl BuildLock for NoopLock {
    fn with_lock(&self, build: &mut dyn FnMut()) {
        build();
    }
}

/// Lock pair, one per [`CacheKind`].
pub struct CacheGuards {
    direct: Box<dyn BuildLock>,
    instanced: Box<dyn BuildLock>,
}

static GLOBAL_GUARDS: Lazy<Arc<CacheGuards>> = Lazy::new(|| Arc::new(CacheGuards::new()));

impl Default for CacheGuards {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CacheGuards {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheGuards").finish_non_exhaustive()
    }
}

impl CacheGuards {
    /// Fresh pair of blocking mutexes.
    pub fn new() -> Self {
        Self::from_locks(Box::new(MutexLock::new()), Box::new(MutexLock::new()))
    }

    pub fn from_locks(direct: Box<dyn BuildLock>, instanced: Box<dyn BuildLock>) -> Self {
        Self { direct, instanced }
    }

    /// No-op pair for deterministic single-threaded use.
    pub fn unguarded() -> Arc<Self> {
        Arc::new(Self::from_locks(Box::new(NoopLock), Box::new(NoopLock)))
    }

    /// Process-wide pair, created on first use.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_GUARDS)
    }

    pub fn lock(&self, kind: CacheKind) -> &dyn BuildLock {
        match kind {
            CacheKind::Direct => self.direct.as_ref(),
            CacheKind::Instanced => self.instanced.as_ref(),
        }
    }
}
