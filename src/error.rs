//! Error taxonomy and failure signaling
//!
//! Design: two strictly separated classes of failure:
//! 1. Recoverable errors (`BridgeError`) - returned to the immediate caller
//!    with enough context to act; they never corrupt shared state.
//! 2. Discipline violations (`fatal_violation`) - double release, lock misuse.
//!    Continuing after one risks silent corruption of runtime-internal
//!    structures, so the process terminates with a diagnostic instead.
//!
//! Native entry points signal failure through a sentinel return plus a
//! thread-local structured last-error, retrievable immediately after the call
//! (see `ffi` for the C accessors).

use std::cell::RefCell;
use std::fmt;

/// Numeric error class, stable across the C ABI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorKind {
    Argument = 1,
    TypeMismatch = 2,
    UseAfterRelease = 3,
    Buffer = 4,
    Import = 5,
}

/// Recoverable bridge failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Argument count/kind/width mismatch during marshaling.
    /// `index` is the offending argument position, when one applies.
    Argument {
        index: Option<usize>,
        message: String,
    },
    /// Opaque handle tag did not match the caller's expected tag
    TypeMismatch { expected: String, actual: String },
    /// Access to a handle or view that was already released
    UseAfterRelease { what: String },
    /// Array view negotiation failure (dimensionality, format, contiguity)
    Buffer { message: String },
    /// Capability lookup or version failure
    Import { name: String, message: String },
}

impl BridgeError {
    /// Error class for the C ABI
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Argument { .. } => ErrorKind::Argument,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::UseAfterRelease { .. } => ErrorKind::UseAfterRelease,
            Self::Buffer { .. } => ErrorKind::Buffer,
            Self::Import { .. } => ErrorKind::Import,
        }
    }

    /// Offending argument index, when applicable
    pub fn argument_index(&self) -> Option<usize> {
        match self {
            Self::Argument { index, .. } => *index,
            _ => None,
        }
    }

    /// Shorthand for a positioned argument error
    pub fn argument(index: usize, message: impl Into<String>) -> Self {
        Self::Argument {
            index: Some(index),
            message: message.into(),
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argument {
                index: Some(i),
                message,
            } => write!(f, "argument {}: {}", i, message),
            Self::Argument { index: None, message } => write!(f, "{}", message),
            Self::TypeMismatch { expected, actual } => {
                write!(f, "handle tag mismatch: expected '{}', got '{}'", expected, actual)
            }
            Self::UseAfterRelease { what } => {
                write!(f, "{} used after release", what)
            }
            Self::Buffer { message } => write!(f, "buffer: {}", message),
            Self::Import { name, message } => {
                write!(f, "capability '{}': {}", name, message)
            }
        }
    }
}

impl std::error::Error for BridgeError {}

thread_local! {
    static LAST_ERROR: RefCell<Option<BridgeError>> = RefCell::new(None);
}

/// Record the structured last-error for the current thread
pub fn set_last_error(err: BridgeError) {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(err));
}

/// Take and clear the current thread's last-error
pub fn take_last_error() -> Option<BridgeError> {
    LAST_ERROR.with(|slot| slot.borrow_mut().take())
}

/// Peek at the current thread's last-error without clearing it
pub fn last_error() -> Option<BridgeError> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

/// Clear the current thread's last-error
pub fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

/// Terminate on a discipline violation
///
/// Invoked for double release and execution-lock misuse. The diagnostic names
/// the violated invariant. Under `cfg(test)` this panics instead of aborting
/// so the policy itself stays testable with `#[should_panic]`.
#[cold]
#[inline(never)]
pub fn fatal_violation(invariant: &str) -> ! {
    tracing::error!(
        event = "fatal_violation",
        invariant = invariant,
        "bridge invariant violated, terminating"
    );

    #[cfg(test)]
    panic!("fatal bridge violation: {}", invariant);

    #[cfg(not(test))]
    {
        eprintln!("vesper-bridge: fatal: {}", invariant);
        std::process::abort();
    }
}
