#![forbid(unsafe_code)]

//! Hand-off queue from background threads to the owning thread.
//!
//! Any thread may [`enqueue`](MainThreadDispatcher::enqueue) a callback;
//! only the owner calls [`drain`](MainThreadDispatcher::drain), once per
//! tick. Callbacks receive `&mut C`, the owner's context, so they can touch
//! state that must never be shared with the worker.
//!
//! # Ordering
//!
//! - Callbacks run in enqueue order.
//! - `drain` takes the whole queue before running anything, so the lock is
//!   never held while a callback runs. A callback that enqueues another
//!   runs it on the *next* drain.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

type Callback<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

/// Cloneable handle to a shared FIFO of callbacks.
pub struct MainThreadDispatcher<C> {
    queue: Arc<Mutex<VecDeque<Callback<C>>>>,
}

impl<C> Clone for MainThreadDispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<C> Default for MainThreadDispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for MainThreadDispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainThreadDispatcher")
            .field("pending", &self.len())
            .finish()
    }
}

impl<C> MainThreadDispatcher<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Callback<C>>> {
        // A panicking callback never runs under the lock, so a poisoned
        // queue is still structurally sound.
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue `callback` for the next drain. Callable from any thread.
    pub fn enqueue(&self, callback: impl FnOnce(&mut C) + Send + 'static) {
        self.lock().push_back(Box::new(callback));
    }

    /// Run every queued callback against `ctx`. Returns how many ran.
    pub fn drain(&self, ctx: &mut C) -> usize {
        let batch = std::mem::take(&mut *self.lock());
        let count = batch.len();
        for callback in batch {
            callback(ctx);
        }
        if count > 0 {
            tracing::trace!(target: "blb.dispatch", count, "drained callbacks");
        }
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
