//! Opaque handle registry - native resources carried through managed code
//!
//! Design: a handle wraps a native pointer plus an identifying tag and an
//! optional release function, so managed code can hold a reference to native
//! state without seeing its layout. The pointer is only handed out while the
//! handle is live and the caller's expected tag matches.
//!
//! Ownership is decided exactly once, at creation: a destructor present means
//! the registry owns the resource and will invoke the destructor exactly once
//! on release; absent means a non-owning (weak) reference whose lifetime is
//! managed elsewhere and for which no cleanup call is ever issued.
//!
//! Releasing a handle twice is a fatal discipline violation, not a silent
//! no-op: tolerating it would hide double-free bugs in the native code that
//! created the handle.

use crate::error::{fatal_violation, BridgeError};
use crate::logging::{log_handle_created, log_handle_released};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;


/// Native release function invoked exactly once for owned handles
pub type Destructor = unsafe extern "C" fn(*mut c_void);

const STATE_LIVE: u8 = 0;
const STATE_RELEASED: u8 = 1;

/// Process-wide handle registry
static HANDLES: Lazy<HandleRegistry> = Lazy::new(HandleRegistry::new);

/// Get the process-wide registry instance
pub fn global() -> &'static HandleRegistry {
    &HANDLES
}

/// Reference to native state with an identifying tag
///
/// Layout of the pointed-to resource is never exposed to the managed side.
pub struct OpaqueHandle {
    id: u64,
    tag: String,
    ptr: *mut c_void,
    destructor: Option<Destructor>,
    state: AtomicU8,
}

// Safety: the raw pointer is only dereferenced by native code that resolved
// it through a matching tag; the bridge itself never reads through it, and
// all state transitions are atomic.
unsafe impl Send for OpaqueHandle {}
unsafe impl Sync for OpaqueHandle {}

impl OpaqueHandle {
    /// Registry-assigned identifier, stable for the handle's lifetime
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Identifying tag fixed at creation
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Whether the registry owns the resource (destructor present)
    pub fn is_owned(&self) -> bool {
        self.destructor.is_some()
    }

    /// Whether the handle is still live
    pub fn is_live(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_LIVE
    }

    /// Get the native pointer, checking tag and liveness
    ///
    /// Fails `TypeMismatch` when the caller's expected tag differs from the
    /// handle's tag, and `UseAfterRelease` when the handle was released. The
    /// pointer is never returned on either failure.
    pub fn resolve(&self, expected_tag: &str) -> Result<*mut c_void, BridgeError> {
        if self.tag != expected_tag {
            return Err(BridgeError::TypeMismatch {
                expected: expected_tag.to_string(),
                actual: self.tag.clone(),
            });
        }
        if !self.is_live() {
            return Err(BridgeError::UseAfterRelease {
                what: format!("handle '{}'", self.tag),
            });
        }
        Ok(self.ptr)
    }

    /// Transition live -> released, invoking the destructor exactly once
    ///
    /// A second release is a fatal discipline violation.
    pub fn release(&self) {
        if self
            .state
            .compare_exchange(STATE_LIVE, STATE_RELEASED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            fatal_violation("opaque handle released twice");
        }

        self.run_destructor();
        log_handle_released(&self.tag, self.destructor.is_some());
    }

    #[cold]
    fn run_destructor(&self) {
        if let Some(dtor) = self.destructor {
            // Destructors may touch runtime-owned objects; callers hold the
            // execution lock across release (see registry methods).
            unsafe { dtor(self.ptr) };
        }
    }
}

impl Drop for OpaqueHandle {
    fn drop(&mut self) {
        // Finalization of the managed wrapper without an explicit release:
        // reclaim the owned resource here. The runtime runs finalizers under
        // its own lock, so no discipline check on this path.
        if self.is_live() {
            self.state.store(STATE_RELEASED, Ordering::Release);
            self.run_destructor();
        }
    }
}

impl std::fmt::Debug for OpaqueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpaqueHandle")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("owned", &self.is_owned())
            .field("live", &self.is_live())
            .finish()
    }
}

/// Registry of handles, keyed by id
///
/// Released handles stay in the map as tombstones until [`shutdown`] so that
/// misuse of a stale id is attributed to the handle rather than reported as
/// an unknown id. Constructible for isolated testing; production code goes
/// through [`global`]. Creation and release must happen while the execution
/// lock is held, because destructors may themselves touch runtime-owned
/// objects.
///
/// [`shutdown`]: Self::shutdown
pub struct HandleRegistry {
    handles: DashMap<u64, Arc<OpaqueHandle>>,
    next_id: AtomicU64,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            // 0 is the C ABI sentinel for "no handle"
            next_id: AtomicU64::new(1),
        }
    }

    /// Wrap a native pointer in a tagged handle
    ///
    /// `destructor` present transfers ownership to the registry; absent
    /// creates a weak reference. The decision is final.
    pub fn create(
        &self,
        tag: impl Into<String>,
        ptr: *mut c_void,
        destructor: Option<Destructor>,
    ) -> Arc<OpaqueHandle> {
        crate::lock::debug_assert_held("handle created");

        let tag = tag.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(OpaqueHandle {
            id,
            tag,
            ptr,
            destructor,
            state: AtomicU8::new(STATE_LIVE),
        });

        log_handle_created(&handle.tag, handle.is_owned());
        self.handles.insert(id, Arc::clone(&handle));
        handle
    }

    /// Look up a handle by registry id (C ABI surface)
    pub fn get(&self, id: u64) -> Option<Arc<OpaqueHandle>> {
        self.handles.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Resolve a handle's pointer against an expected tag
    pub fn resolve(
        &self,
        handle: &OpaqueHandle,
        expected_tag: &str,
    ) -> Result<*mut c_void, BridgeError> {
        handle.resolve(expected_tag)
    }

    /// Release a handle
    ///
    /// Invokes the destructor exactly once for owned handles. The id stays
    /// mapped to the released handle as a tombstone, so a late release or
    /// resolve by id is reported against the handle itself (fatal and
    /// `UseAfterRelease` respectively) instead of as an unknown id. A second
    /// release of the same handle is fatal.
    pub fn release(&self, handle: &OpaqueHandle) {
        crate::lock::debug_assert_held("handle released");

        handle.release();
    }

    /// Number of live handles in the registry
    pub fn live_count(&self) -> usize {
        self.handles.iter().filter(|e| e.is_live()).count()
    }

    /// Best-effort teardown: release every still-live owned handle
    ///
    /// Order is unspecified. Not guaranteed to run under abnormal
    /// termination. Returns the number of handles drained.
    pub fn shutdown(&self) -> usize {
        let ids: Vec<u64> = self.handles.iter().map(|e| *e.key()).collect();
        let mut drained = 0;
        for id in ids {
            if let Some((_, handle)) = self.handles.remove(&id) {
                if handle.is_live() {
                    handle.release();
                    drained += 1;
                }
            }
        }
        drained
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
