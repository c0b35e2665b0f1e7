use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use axum::http::request::Parts;
use bytes::Bytes;

use crate::context::Context;

/// Reuse pool for request contexts.
///
/// Checkout moves the instance out of the pool, so two in-flight requests
/// never share one. At most `max_idle` instances are kept between requests.
pub struct ContextPool {
    idle: Mutex<Vec<Box<Context>>>,
    max_idle: usize,
    acquired: AtomicU64,
    released: AtomicU64,
}

impl ContextPool {
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(max_idle.min(64))),
            max_idle,
            acquired: AtomicU64::new(0),
            released: AtomicU64::new(0),
        }
    }

    /// Checks out a context bound to the given request, reset to a clean state.
    pub fn acquire(
        &self,
        parts: Parts,
        body: Bytes,
        params: Vec<(String, String)>,
    ) -> PooledContext<'_> {
        let reused = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let mut ctx = reused.unwrap_or_else(|| Box::new(Context::new()));
        ctx.reset(parts, body, params);
        self.acquired.fetch_add(1, Ordering::Relaxed);
        PooledContext {
            ctx: Some(ctx),
            pool: self,
        }
    }

    fn release(&self, mut ctx: Box<Context>) {
        ctx.clear();
        self.released.fetch_add(1, Ordering::Relaxed);
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(ctx);
        }
    }

    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    /// Contexts currently checked out.
    pub fn outstanding(&self) -> u64 {
        self.acquired().saturating_sub(self.released())
    }

    pub fn idle(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Owning handle to a checked-out context; returns it to the pool on drop,
/// including while unwinding.
pub struct PooledContext<'a> {
    ctx: Option<Box<Context>>,
    pool: &'a ContextPool,
}

impl Deref for PooledContext<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        // `ctx` is only taken in `drop`
        self.ctx.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledContext<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx.as_deref_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.pool.release(ctx);
        }
    }
}
