//! Execution lock discipline - global serialization of runtime-affecting code
//!
//! Design: one mutex plus a holder/depth pair. At most one thread executes
//! runtime-state-affecting code at any instant; reentrant acquires by the
//! holder succeed immediately, so native code that re-enters the runtime from
//! within an already-locked region is safe. This is a deliberately
//! coarse-grained, global serialization point and a known scalability
//! ceiling; the only sanctioned parallelism mechanism is `without_lock`,
//! which drops the lock around a region that provably never touches
//! runtime-owned state and reacquires before returning.
//!
//! No fairness/FIFO guarantee is made, only eventual progress: the final
//! release wakes one waiter. There is no cancellation primitive for an
//! in-flight acquire; callers needing bounded waits implement their own
//! timeout outside the bridge.

use crate::error::fatal_violation;
use dashmap::DashSet;
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

#[cfg(test)]
mod tests;

/// Process-wide execution lock
static EXECUTION_LOCK: Lazy<ExecutionLock> = Lazy::new(ExecutionLock::new);

/// Get the process-wide lock instance
pub fn global() -> &'static ExecutionLock {
    &EXECUTION_LOCK
}

/// Debug-build discipline check against the process-wide lock
///
/// A thread driving an isolated lock instance never registers with the
/// process-wide one and is outside its discipline, so only registered
/// threads are checked.
pub(crate) fn debug_assert_held(action: &str) {
    debug_assert!(
        !global().is_registered() || global().held_by_current_thread(),
        "{} without the execution lock",
        action
    );
}

struct LockState {
    holder: Option<ThreadId>,
    depth: usize,
}

/// Reentrant global exclusivity lock
///
/// Constructible for isolated testing; production code goes through
/// [`global`]. Lifecycle is tied to runtime start/stop, not to any single
/// component.
pub struct ExecutionLock {
    state: Mutex<LockState>,
    available: Condvar,
    registered: DashSet<ThreadId>,
    contended: AtomicUsize,
}

impl ExecutionLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                holder: None,
                depth: 0,
            }),
            available: Condvar::new(),
            registered: DashSet::new(),
            contended: AtomicUsize::new(0),
        }
    }

    /// One-time registration of the calling thread (idempotent)
    ///
    /// A thread not previously known to the runtime must register before its
    /// first acquire.
    pub fn register_thread(&self) {
        self.registered.insert(thread::current().id());
    }

    /// Check whether the calling thread has registered
    pub fn is_registered(&self) -> bool {
        self.registered.contains(&thread::current().id())
    }

    /// Acquire the lock for a boundary crossing
    ///
    /// Reentrant: if the calling thread already holds the lock, the depth is
    /// incremented and this returns immediately without blocking. Otherwise
    /// blocks until the lock is free. Acquiring from an unregistered thread
    /// is a fatal discipline violation.
    ///
    /// The returned token releases on drop, so a panic while the lock is
    /// held cannot leave it stuck; well-behaved callers release explicitly.
    #[must_use]
    pub fn acquire_for_native_call(&self) -> LockToken<'_> {
        self.acquire_raw();
        LockToken {
            lock: self,
            released: false,
        }
    }

    /// Token-less acquire, for the C ABI surface
    ///
    /// Rust callers should prefer [`acquire_for_native_call`]; a raw acquire
    /// must be paired with exactly one [`release_raw`].
    ///
    /// [`acquire_for_native_call`]: Self::acquire_for_native_call
    /// [`release_raw`]: Self::release_raw
    pub fn acquire_raw(&self) {
        let me = thread::current().id();
        if !self.registered.contains(&me) {
            fatal_violation("execution lock acquired by a thread that never registered");
        }

        let mut state = self.state.lock();
        if state.holder == Some(me) {
            state.depth += 1;
            return;
        }

        if state.holder.is_some() {
            self.contended.fetch_add(1, Ordering::Relaxed);
            crate::logging::log_lock_contended();
        }
        while state.holder.is_some() {
            self.available.wait(&mut state);
        }
        state.holder = Some(me);
        state.depth = 1;
    }

    /// Token-less release, for the C ABI surface
    ///
    /// Releasing from a thread that does not hold the lock is a fatal
    /// discipline violation.
    pub fn release_raw(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.holder != Some(me) {
            fatal_violation("execution lock released from a non-holder thread");
        }

        state.depth -= 1;
        if state.depth == 0 {
            state.holder = None;
            // Eventual progress, no FIFO guarantee
            self.available.notify_one();
        }
    }

    /// Check whether the calling thread currently holds the lock
    pub fn held_by_current_thread(&self) -> bool {
        self.state.lock().holder == Some(thread::current().id())
    }

    /// Drop the lock around a region that never touches runtime-owned state
    ///
    /// The lock is fully released (at any recursion depth), `f` runs
    /// unlocked, and the same depth is reacquired before returning - also on
    /// unwind, since resuming runtime interaction without the lock is a
    /// fatal discipline violation. This is the sanctioned mechanism for real
    /// parallelism between native work and runtime activity: long-running
    /// native computation and blocking I/O belong inside `f`.
    pub fn without_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let me = thread::current().id();
        let saved_depth;
        {
            let mut state = self.state.lock();
            if state.holder != Some(me) {
                fatal_violation("execution lock suspended by a non-holder thread");
            }
            saved_depth = state.depth;
            state.holder = None;
            state.depth = 0;
            self.available.notify_one();
        }

        // Reacquires on normal return and on unwind alike
        let _restore = Reacquire {
            lock: self,
            depth: saved_depth,
        };
        f()
    }

    /// Number of times an acquire had to block (monitoring)
    pub fn contention_count(&self) -> usize {
        self.contended.load(Ordering::Relaxed)
    }
}

impl Default for ExecutionLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-thread recursion token for one acquire
///
/// Consumed by [`LockToken::release`]; dropping an unreleased token releases
/// as a safety net so unwinding cannot wedge the lock.
pub struct LockToken<'a> {
    lock: &'a ExecutionLock,
    released: bool,
}

impl LockToken<'_> {
    /// Release the matching acquire
    pub fn release(mut self) {
        self.lock.release_raw();
        self.released = true;
    }
}

impl Drop for LockToken<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.lock.release_raw();
        }
    }
}

struct Reacquire<'a> {
    lock: &'a ExecutionLock,
    depth: usize,
}

impl Drop for Reacquire<'_> {
    fn drop(&mut self) {
        let me = thread::current().id();
        let mut state = self.lock.state.lock();
        while state.holder.is_some() {
            self.lock.available.wait(&mut state);
        }
        state.holder = Some(me);
        state.depth = self.depth;
    }
}
