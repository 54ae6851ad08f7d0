//! C ABI - stable entry points for native bridge modules
//!
//! Design: null-safe wrappers with sentinel-value failure signaling:
//! 1. Bridge lifecycle (init, shutdown)
//! 2. Structured last-error retrieval (kind + message + argument index)
//! 3. Opaque handles by registry id
//! 4. Execution lock registration/acquire/release
//!
//! A failed call returns its sentinel (0, null, false) and records the
//! last-error for the calling thread; callers must check it before using
//! any other return value.

use crate::error::{self, BridgeError};
use crate::handle::{self, Destructor};
use crate::lock;
use crate::logging::{self, log_bridge_init, log_bridge_shutdown};
use std::ffi::{c_void, CStr};
use std::os::raw::c_char;

/// Initialize the bridge (called once at runtime start)
///
/// Idempotent. Registers the calling thread with the execution lock.
#[no_mangle]
pub extern "C" fn vesper_bridge_init() {
    logging::init();
    log_bridge_init();
    lock::global().register_thread();
}

/// Tear down the bridge (called at runtime stop)
///
/// Best-effort: every still-live owned handle has its destructor invoked in
/// unspecified order. Not guaranteed under abnormal termination.
#[no_mangle]
pub extern "C" fn vesper_bridge_shutdown() {
    let drained = handle::global().shutdown();
    log_bridge_shutdown(drained);
}

// ============================================================================
// Last-error channel
// ============================================================================

/// Error kind of the calling thread's last failure (0 = none)
#[no_mangle]
pub extern "C" fn vesper_last_error_kind() -> i32 {
    error::last_error().map_or(0, |err| err.kind() as i32)
}

/// Offending argument index of the last failure (-1 when not applicable)
#[no_mangle]
pub extern "C" fn vesper_last_error_index() -> i64 {
    error::last_error()
        .and_then(|err| err.argument_index())
        .map_or(-1, |index| index as i64)
}

/// Copy the last-error message into `buf`, NUL-terminated
///
/// Returns the full message length in bytes (excluding the terminator), or
/// 0 when there is no pending error. The copy is truncated to `cap - 1`
/// bytes. Null-safe: a null `buf` or zero `cap` only reports the length.
#[no_mangle]
pub extern "C" fn vesper_last_error_message(buf: *mut c_char, cap: usize) -> usize {
    let Some(err) = error::last_error() else {
        return 0;
    };
    let message = err.to_string();

    if !buf.is_null() && cap > 0 {
        let copy_len = message.len().min(cap - 1);
        // Safety: caller guarantees buf points to cap writable bytes
        unsafe {
            std::ptr::copy_nonoverlapping(message.as_ptr(), buf as *mut u8, copy_len);
            *buf.add(copy_len) = 0;
        }
    }
    message.len()
}

/// Clear the calling thread's last-error
#[no_mangle]
pub extern "C" fn vesper_clear_last_error() {
    error::clear_last_error();
}

// ============================================================================
// Opaque handles
// ============================================================================

/// Wrap a native pointer in a tagged handle
///
/// A non-null `destructor` transfers ownership to the registry. Returns the
/// registry id, or 0 with a recorded last-error on a bad tag.
///
/// # Safety
/// - `tag` must be a valid NUL-terminated UTF-8 string
/// - Must be called while the execution lock is held
#[no_mangle]
pub extern "C" fn vesper_handle_create(
    tag: *const c_char,
    ptr: *mut c_void,
    destructor: Option<Destructor>,
) -> u64 {
    let Some(tag) = read_tag(tag) else {
        return 0;
    };
    handle::global().create(tag, ptr, destructor).id()
}

/// Resolve a handle's pointer against an expected tag
///
/// Returns null with a recorded last-error on an unknown id, a tag
/// mismatch, or a released handle.
///
/// # Safety
/// - `expected_tag` must be a valid NUL-terminated UTF-8 string
#[no_mangle]
pub extern "C" fn vesper_handle_resolve(id: u64, expected_tag: *const c_char) -> *mut c_void {
    let Some(expected) = read_tag(expected_tag) else {
        return std::ptr::null_mut();
    };
    let Some(handle) = handle::global().get(id) else {
        error::set_last_error(BridgeError::UseAfterRelease {
            what: format!("handle id {}", id),
        });
        return std::ptr::null_mut();
    };

    match handle.resolve(&expected) {
        Ok(ptr) => ptr,
        Err(err) => {
            error::set_last_error(err);
            std::ptr::null_mut()
        }
    }
}

/// Release a handle, invoking its destructor when owned
///
/// Returns false with a recorded last-error on an unknown id. Releasing the
/// same live handle twice through this entry point is a fatal discipline
/// violation, exactly as in the Rust API.
///
/// # Safety
/// - Must be called while the execution lock is held
#[no_mangle]
pub extern "C-unwind" fn vesper_handle_release(id: u64) -> bool {
    let Some(handle) = handle::global().get(id) else {
        error::set_last_error(BridgeError::UseAfterRelease {
            what: format!("handle id {}", id),
        });
        return false;
    };
    handle::global().release(&handle);
    true
}

// ============================================================================
// Execution lock
// ============================================================================

/// One-time registration of the calling thread (idempotent)
#[no_mangle]
pub extern "C" fn vesper_thread_register() {
    lock::global().register_thread();
}

/// Acquire the execution lock for a boundary crossing
///
/// Reentrant for the holding thread; blocks otherwise. Every acquire must
/// be paired with exactly one `vesper_lock_release` on the same thread.
#[no_mangle]
pub extern "C" fn vesper_lock_acquire() {
    lock::global().acquire_raw();
}

/// Release one matching acquire
#[no_mangle]
pub extern "C" fn vesper_lock_release() {
    lock::global().release_raw();
}

fn read_tag(tag: *const c_char) -> Option<String> {
    if tag.is_null() {
        error::set_last_error(BridgeError::Argument {
            index: None,
            message: "tag must not be null".into(),
        });
        return None;
    }
    // Safety: caller guarantees a NUL-terminated string
    let bytes = unsafe { CStr::from_ptr(tag) };
    match bytes.to_str() {
        Ok(s) => Some(s.to_string()),
        Err(_) => {
            error::set_last_error(BridgeError::Argument {
                index: None,
                message: "tag must be valid UTF-8".into(),
            });
            None
        }
    }
}
