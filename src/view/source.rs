//! Memory source capability - contiguous-memory exposure for array-likes
//!
//! Design: "array-like" is a capability test, not a list of known type
//! names. Any managed object whose adapter implements [`MemorySource`] can
//! negotiate a view; objects without the capability fail negotiation up
//! front. Adapters pin their backing storage for the duration of each
//! successful `acquire_raw`, so the descriptor's pointer stays valid until
//! the matching `release_raw`.

use super::format::Format;
use crate::error::{fatal_violation, BridgeError};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Low-level description of pinned contiguous memory
///
/// Valid only between the `acquire_raw` that produced it and the matching
/// `release_raw`; no other mutation of the backing storage is safe to assume
/// during that window unless the source guarantees it.
#[derive(Debug, Clone)]
pub struct RawDescriptor {
    pub ptr: *mut u8,
    /// Total length in bytes
    pub len: usize,
    pub itemsize: usize,
    pub format: Format,
    pub ndim: usize,
    /// Items per dimension
    pub shape: Vec<usize>,
    /// Byte strides per dimension
    pub strides: Vec<isize>,
    pub readonly: bool,
}

impl RawDescriptor {
    /// Total number of items across all dimensions
    pub fn item_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Check the stride pattern is exactly the dense row-major layout for
    /// the reported shape
    pub fn is_row_major_contiguous(&self) -> bool {
        let mut expected = self.itemsize as isize;
        for dim in (0..self.ndim).rev() {
            if self.strides[dim] != expected {
                return false;
            }
            expected *= self.shape[dim] as isize;
        }
        true
    }
}

/// Capability of exposing a validated contiguous-memory descriptor
///
/// Implemented explicitly by each array-like adapter. The bridge consumes
/// only this interface; it never inspects the source's concrete type.
pub trait MemorySource: Send + Sync {
    /// Pin the backing storage and describe it
    ///
    /// Fails `Buffer` when the source cannot expose contiguous memory right
    /// now. On success the caller owes exactly one `release_raw`.
    fn acquire_raw(&self) -> Result<RawDescriptor, BridgeError>;

    /// Unpin the backing storage
    ///
    /// Called exactly once per successful `acquire_raw`.
    fn release_raw(&self);

    /// Human-readable name for diagnostics
    fn source_name(&self) -> &'static str {
        "source"
    }
}

/// Scalar types usable as view elements
pub trait Element: Copy + Send + Sync + 'static {
    const FORMAT: Format;
}

macro_rules! impl_element {
    ($($ty:ty => $fmt:expr),* $(,)?) => {
        $(impl Element for $ty {
            const FORMAT: Format = $fmt;
        })*
    };
}

impl_element! {
    i8 => Format::I8,
    u8 => Format::U8,
    i16 => Format::I16,
    u16 => Format::U16,
    i32 => Format::I32,
    u32 => Format::U32,
    i64 => Format::I64,
    u64 => Format::U64,
    f32 => Format::F32,
    f64 => Format::F64,
}

/// Adapter exposing an owned buffer as a memory source
///
/// The workhorse adapter for runtime-allocated arrays. Pinning is a plain
/// counter: the buffer itself never moves while the adapter is alive, so a
/// pin only has to keep the adapter's refcount up (the negotiated view holds
/// the adapter `Arc` for exactly that reason).
pub struct OwnedSource<T: Element> {
    data: Vec<T>,
    shape: Vec<usize>,
    strides: Vec<isize>,
    readonly: bool,
    pins: AtomicUsize,
}

impl<T: Element> OwnedSource<T> {
    /// One-dimensional source over the whole buffer
    pub fn new(data: Vec<T>) -> Self {
        let len = data.len();
        Self::with_layout(data, vec![len], vec![std::mem::size_of::<T>() as isize])
    }

    /// Multi-dimensional source with dense row-major layout
    ///
    /// The shape's item count must cover exactly the buffer length.
    pub fn with_shape(data: Vec<T>, shape: Vec<usize>) -> Self {
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape does not match buffer length"
        );
        let itemsize = std::mem::size_of::<T>() as isize;
        let mut strides = vec![0isize; shape.len()];
        let mut stride = itemsize;
        for dim in (0..shape.len()).rev() {
            strides[dim] = stride;
            stride *= shape[dim] as isize;
        }
        Self::with_layout(data, shape, strides)
    }

    /// Source with an explicit (possibly non-contiguous) stride layout
    ///
    /// Used for slices of larger arrays, e.g. a column of a row-major
    /// matrix.
    pub fn with_layout(data: Vec<T>, shape: Vec<usize>, strides: Vec<isize>) -> Self {
        assert_eq!(shape.len(), strides.len(), "shape/strides rank mismatch");
        Self {
            data,
            shape,
            strides,
            readonly: true,
            pins: AtomicUsize::new(0),
        }
    }

    /// Mark the source writable through negotiated views
    pub fn writable(mut self) -> Self {
        self.readonly = false;
        self
    }

    /// Current pin count (tests and diagnostics)
    pub fn pin_count(&self) -> usize {
        self.pins.load(Ordering::Acquire)
    }
}

impl<T: Element> MemorySource for OwnedSource<T> {
    fn acquire_raw(&self) -> Result<RawDescriptor, BridgeError> {
        self.pins.fetch_add(1, Ordering::AcqRel);
        Ok(RawDescriptor {
            ptr: self.data.as_ptr() as *mut u8,
            len: self.data.len() * std::mem::size_of::<T>(),
            itemsize: std::mem::size_of::<T>(),
            format: T::FORMAT,
            ndim: self.shape.len(),
            shape: self.shape.clone(),
            strides: self.strides.clone(),
            readonly: self.readonly,
        })
    }

    fn release_raw(&self) {
        let prev = self.pins.fetch_sub(1, Ordering::AcqRel);
        if prev == 0 {
            fatal_violation("memory source unpinned more times than pinned");
        }
    }

    fn source_name(&self) -> &'static str {
        "owned buffer"
    }
}

/// An object without the contiguous-memory capability
///
/// Stand-in adapter for managed objects that are not array-like at all;
/// negotiation against it always fails up front.
pub struct UnsupportedSource;

impl MemorySource for UnsupportedSource {
    fn acquire_raw(&self) -> Result<RawDescriptor, BridgeError> {
        Err(BridgeError::Buffer {
            message: "object does not expose contiguous memory".into(),
        })
    }

    fn release_raw(&self) {}

    fn source_name(&self) -> &'static str {
        "unsupported object"
    }
}
