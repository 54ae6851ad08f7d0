//! Array view negotiation - zero-copy access to managed array storage
//!
//! Design: native code states its requirements (accepted item formats,
//! dimensionality, contiguity) and negotiation either returns a fully
//! validated view or fails before any native access happens. Validation
//! order is fixed: dimensionality, then item format, then stride pattern,
//! each with its own diagnostic. Negotiation is all-or-nothing: any failure
//! after the source was pinned unpins it before the error returns.
//!
//! A successful view pins its source for the view's lifetime. Release unpins
//! exactly once; releasing twice is fatal, and the checked accessors report
//! `UseAfterRelease` instead of handing out a dangling pointer.

mod format;
mod source;


pub use format::Format;
pub use source::{Element, MemorySource, OwnedSource, RawDescriptor, UnsupportedSource};

use crate::error::{fatal_violation, BridgeError};
use crate::logging::{log_view_acquired, log_view_rejected, log_view_released};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Live view count across the process (monitoring)
static VIEWS_LIVE: AtomicUsize = AtomicUsize::new(0);

/// Number of array views currently holding a pin on a source
pub fn live_views() -> usize {
    VIEWS_LIVE.load(Ordering::Relaxed)
}

/// Negotiate a validated view against a managed source
///
/// Queries `source` for the contiguous-memory capability, then validates in
/// order: dimensionality equals `required_ndim`, item format is one of
/// `accepted_formats`, and, when `required_contiguous`, the stride pattern
/// is exactly the dense row-major layout for the reported shape. Only on
/// full success is the source left pinned and the view returned.
///
/// Acquisition adjusts a reference on the source object and must happen
/// while the execution lock is held; the raw memory access afterwards needs
/// no lock.
pub fn acquire(
    source: Arc<dyn MemorySource>,
    accepted_formats: &[Format],
    required_contiguous: bool,
    required_ndim: usize,
) -> Result<ArrayView, BridgeError> {
    crate::lock::debug_assert_held("view acquired");

    let desc = source.acquire_raw().map_err(|err| {
        log_view_rejected("capability unsupported");
        err
    })?;

    // From here on the source is pinned; every failure path must unpin
    // before returning so negotiation stays all-or-nothing.
    if let Err(err) = validate(&desc, accepted_formats, required_contiguous, required_ndim) {
        source.release_raw();
        return Err(err);
    }

    log_view_acquired(desc.format.code(), desc.ndim, desc.item_count());
    VIEWS_LIVE.fetch_add(1, Ordering::Relaxed);
    Ok(ArrayView {
        desc,
        source,
        released: AtomicBool::new(false),
    })
}

fn validate(
    desc: &RawDescriptor,
    accepted_formats: &[Format],
    required_contiguous: bool,
    required_ndim: usize,
) -> Result<(), BridgeError> {
    // A descriptor whose shape/strides disagree with its rank is a broken
    // adapter; reject it before any check indexes those vectors.
    if desc.shape.len() != desc.ndim || desc.strides.len() != desc.ndim {
        let message = format!(
            "descriptor rank {} does not match its shape ({} entries) and strides ({} entries)",
            desc.ndim,
            desc.shape.len(),
            desc.strides.len()
        );
        log_view_rejected(&message);
        return Err(BridgeError::Buffer { message });
    }

    if desc.ndim != required_ndim {
        let message = format!(
            "expected {} dimension(s), source has {}",
            required_ndim, desc.ndim
        );
        log_view_rejected(&message);
        return Err(BridgeError::Buffer { message });
    }

    if !accepted_formats.contains(&desc.format) {
        let accepted: String = accepted_formats.iter().map(|f| f.code()).collect();
        let message = format!(
            "item format '{}' not accepted (accepted: '{}')",
            desc.format.code(),
            accepted
        );
        log_view_rejected(&message);
        return Err(BridgeError::Buffer { message });
    }

    if required_contiguous && !desc.is_row_major_contiguous() {
        let message = format!(
            "source is not contiguous: strides {:?} do not match dense row-major layout for shape {:?}",
            desc.strides, desc.shape
        );
        log_view_rejected(&message);
        return Err(BridgeError::Buffer { message });
    }

    Ok(())
}

/// Validated, pinned descriptor of contiguous managed memory
///
/// The pointer is valid and stable only between creation and release. The
/// view keeps its source alive and pinned for exactly that window.
pub struct ArrayView {
    desc: RawDescriptor,
    source: Arc<dyn MemorySource>,
    released: AtomicBool,
}

// Safety: the descriptor's raw pointer is only exposed through accessors
// that check the released flag, and the pinned source keeps the backing
// storage stable across threads for the view's lifetime.
unsafe impl Send for ArrayView {}
unsafe impl Sync for ArrayView {}

impl ArrayView {
    /// Total length in bytes
    pub fn byte_len(&self) -> usize {
        self.desc.len
    }

    /// Total number of items
    pub fn item_count(&self) -> usize {
        self.desc.item_count()
    }

    /// Size of one item in bytes
    pub fn itemsize(&self) -> usize {
        self.desc.itemsize
    }

    /// Element format
    pub fn format(&self) -> Format {
        self.desc.format
    }

    /// Number of dimensions
    pub fn ndim(&self) -> usize {
        self.desc.ndim
    }

    /// Items per dimension
    pub fn shape(&self) -> &[usize] {
        &self.desc.shape
    }

    /// Byte strides per dimension
    pub fn strides(&self) -> &[isize] {
        &self.desc.strides
    }

    /// Whether writes through the view are forbidden
    pub fn readonly(&self) -> bool {
        self.desc.readonly
    }

    /// Whether the layout is dense row-major
    pub fn contiguous(&self) -> bool {
        self.desc.is_row_major_contiguous()
    }

    fn check_live(&self) -> Result<(), BridgeError> {
        if self.released.load(Ordering::Acquire) {
            return Err(BridgeError::UseAfterRelease {
                what: "array view".into(),
            });
        }
        Ok(())
    }

    /// Raw base pointer, checked for liveness
    pub fn as_ptr(&self) -> Result<*mut u8, BridgeError> {
        self.check_live()?;
        Ok(self.desc.ptr)
    }

    /// Borrow the whole buffer as bytes
    pub fn as_bytes(&self) -> Result<&[u8], BridgeError> {
        self.check_live()?;
        // Safety: pinned source guarantees ptr/len stay valid while live
        Ok(unsafe { std::slice::from_raw_parts(self.desc.ptr, self.desc.len) })
    }

    /// Borrow the buffer as typed items
    ///
    /// Requires a matching element format and a contiguous layout, since a
    /// strided buffer cannot be a single Rust slice.
    pub fn as_slice<T: Element>(&self) -> Result<&[T], BridgeError> {
        self.check_live()?;
        if self.desc.format != T::FORMAT {
            return Err(BridgeError::Buffer {
                message: format!(
                    "view has item format '{}', requested '{}'",
                    self.desc.format.code(),
                    T::FORMAT.code()
                ),
            });
        }
        if !self.contiguous() {
            return Err(BridgeError::Buffer {
                message: "strided view cannot be borrowed as a slice".into(),
            });
        }
        // Safety: format match guarantees T's layout; contiguity guarantees
        // item_count consecutive items starting at ptr
        Ok(unsafe {
            std::slice::from_raw_parts(self.desc.ptr as *const T, self.item_count())
        })
    }

    /// Unpin the source
    ///
    /// Exactly once per view; a second release is a fatal discipline
    /// violation. Using the view's pointer afterwards is reported as
    /// `UseAfterRelease` by the checked accessors.
    pub fn release(&self) {
        crate::lock::debug_assert_held("view released");

        if self.released.swap(true, Ordering::AcqRel) {
            fatal_violation("array view released twice");
        }
        self.source.release_raw();
        VIEWS_LIVE.fetch_sub(1, Ordering::Relaxed);
        log_view_released(self.item_count());
    }
}

impl Drop for ArrayView {
    fn drop(&mut self) {
        // Finalization of the managed wrapper without an explicit release.
        // The runtime runs finalizers under its own lock, so no discipline
        // check on this path.
        if !self.released.swap(true, Ordering::AcqRel) {
            self.source.release_raw();
            VIEWS_LIVE.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for ArrayView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayView")
            .field("format", &self.desc.format)
            .field("ndim", &self.desc.ndim)
            .field("shape", &self.desc.shape)
            .field("readonly", &self.desc.readonly)
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish()
    }
}
