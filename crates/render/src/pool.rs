//! Bounded pool of rendering contexts.
//!
//! ## Design
//!
//! - Capacity is enforced by a semaphore: at most `max_contexts` renders run at once.
//! - Acquisition waits up to `acquire_timeout`, then fails with a
//!   `RenderEnvironment` error instead of queueing forever.
//! - A [`PooledContext`] guard returns its context on drop. Only contexts whose
//!   render was marked complete (and that still report healthy) are kept for
//!   reuse; failed, timed-out and cancelled renders discard theirs.
//! - The pool is an explicit `Arc` handed to whoever needs it, never a global.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use nightshift_core::{PipelineError, PipelineResult};

use crate::context::{RenderBackend, RenderContext};

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum contexts alive at once (and therefore concurrent renders).
    pub max_contexts: usize,
    /// How long `acquire` waits for a free slot.
    pub acquire_timeout: Duration,
    /// Keep cleanly finished contexts for the next render.
    pub reuse_contexts: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_contexts: 4,
            acquire_timeout: Duration::from_secs(10),
            reuse_contexts: true,
        }
    }
}

impl PoolConfig {
    pub fn with_max_contexts(mut self, max: usize) -> Self {
        self.max_contexts = max;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_reuse(mut self, reuse: bool) -> Self {
        self.reuse_contexts = reuse;
        self
    }
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub backend: &'static str,
    pub capacity: usize,
    pub in_use: usize,
    pub idle: usize,
    pub launched: u64,
    pub reused: u64,
    pub discarded: u64,
    pub closed: bool,
}

pub struct ContextPool {
    backend: Arc<dyn RenderBackend>,
    config: PoolConfig,
    capacity: usize,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Box<dyn RenderContext>>>,
    launched: AtomicU64,
    reused: AtomicU64,
    discarded: AtomicU64,
}

impl core::fmt::Debug for ContextPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ContextPool")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ContextPool {
    pub fn new(backend: Arc<dyn RenderBackend>, config: PoolConfig) -> Arc<Self> {
        let capacity = config.max_contexts.max(1);
        Arc::new(Self {
            backend,
            config,
            capacity,
            permits: Arc::new(Semaphore::new(capacity)),
            idle: Mutex::new(Vec::new()),
            launched: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Check out a context, launching one if none is idle.
    pub async fn acquire(self: &Arc<Self>) -> PipelineResult<PooledContext> {
        let wait = self.config.acquire_timeout;

        let permit = match tokio::time::timeout(wait, Arc::clone(&self.permits).acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(PipelineError::render_environment(
                    "rendering context pool is shut down",
                ));
            }
            Err(_) => {
                warn!(
                    backend = self.backend.name(),
                    capacity = self.capacity,
                    wait_ms = wait.as_millis() as u64,
                    "rendering context pool exhausted"
                );
                return Err(PipelineError::render_environment(format!(
                    "no rendering context became available within {}ms",
                    wait.as_millis()
                )));
            }
        };

        let context = match self.take_idle() {
            Some(context) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                context
            }
            None => self.launch(wait).await?,
        };

        Ok(PooledContext {
            context: Some(context),
            pool: Arc::clone(self),
            completed: false,
            _permit: permit,
        })
    }

    async fn launch(&self, wait: Duration) -> PipelineResult<Box<dyn RenderContext>> {
        let backend = self.backend.name();
        let launched = tokio::time::timeout(wait, self.backend.launch())
            .await
            .map_err(|_| {
                PipelineError::render_environment(format!(
                    "{backend} did not start within {}ms",
                    wait.as_millis()
                ))
            })
            .and_then(|r| r)
            .map_err(|e| match e {
                PipelineError::RenderEnvironment(_) => e,
                other => PipelineError::render_environment(other.to_string()),
            });

        match launched {
            Ok(context) => {
                let n = self.launched.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(backend, launched = n, "launched rendering context");
                Ok(context)
            }
            Err(e) => {
                warn!(backend, error = %e, "failed to launch rendering context");
                Err(e)
            }
        }
    }

    fn take_idle(&self) -> Option<Box<dyn RenderContext>> {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
    }

    fn release(&self, mut context: Box<dyn RenderContext>, completed: bool) {
        let reusable =
            completed && self.config.reuse_contexts && !self.is_closed() && context.is_healthy();

        if reusable {
            context.reset();
            self.idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(context);
        } else {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(
                backend = self.backend.name(),
                completed, "discarding rendering context"
            );
            drop(context);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Stop handing out contexts and drop every idle one.
    pub fn close(&self) {
        self.permits.close();
        let drained = std::mem::take(&mut *self.idle.lock().unwrap_or_else(PoisonError::into_inner));
        self.discarded
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
    }

    pub fn status(&self) -> PoolStatus {
        let available = self.permits.available_permits().min(self.capacity);
        PoolStatus {
            backend: self.backend.name(),
            capacity: self.capacity,
            in_use: self.capacity - available,
            idle: self.idle.lock().unwrap_or_else(PoisonError::into_inner).len(),
            launched: self.launched.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            closed: self.is_closed(),
        }
    }
}

/// A checked-out context. Dropping it returns the context to the pool.
pub struct PooledContext {
    context: Option<Box<dyn RenderContext>>,
    pool: Arc<ContextPool>,
    completed: bool,
    // Released after `Drop::drop` has returned the context.
    _permit: OwnedSemaphorePermit,
}

impl PooledContext {
    /// Mark the render as finished cleanly; the context becomes reusable.
    pub fn complete(&mut self) {
        self.completed = true;
    }
}

impl std::fmt::Debug for PooledContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledContext")
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

impl Deref for PooledContext {
    type Target = dyn RenderContext;

    fn deref(&self) -> &Self::Target {
        self.context.as_deref().expect("context is present until drop")
    }
}

impl DerefMut for PooledContext {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
            .as_deref_mut()
            .expect("context is present until drop")
    }
}

impl Drop for PooledContext {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            self.pool.release(context, self.completed);
        }
    }
}
