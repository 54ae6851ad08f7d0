//! Value representations on each side of the boundary
//!
//! `Value` is what the managed runtime hands the bridge; `NativeValue` is
//! what marshaling produces for native code (and what native code produces
//! for result building). Redesigned from an untagged union into safe enums:
//! marshaled values outlive the immediate call frame here (views pin their
//! sources), so the type must carry its own discriminant.

use crate::handle::OpaqueHandle;
use crate::view::{ArrayView, MemorySource};
use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

/// Managed-side value at the boundary
#[derive(Clone)]
pub enum Value {
    /// Managed integers are 64-bit signed; narrower native kinds are
    /// checked, not truncated
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Text(String),
    Handle(Arc<OpaqueHandle>),
    Array(Arc<dyn MemorySource>),
    Tuple(Vec<Value>),
    Unit,
}

impl Value {
    /// Kind name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Bytes(_) => "bytes",
            Self::Text(_) => "text",
            Self::Handle(_) => "handle",
            Self::Array(_) => "array",
            Self::Tuple(_) => "tuple",
            Self::Unit => "unit",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "Int({})", v),
            Self::Float(v) => write!(f, "Float({})", v),
            Self::Bool(v) => write!(f, "Bool({})", v),
            Self::Bytes(v) => write!(f, "Bytes({} bytes)", v.len()),
            Self::Text(v) => write!(f, "Text({:?})", v),
            Self::Handle(h) => write!(f, "Handle({:?})", h),
            Self::Array(s) => write!(f, "Array({})", s.source_name()),
            Self::Tuple(vs) => f.debug_tuple("Tuple").field(vs).finish(),
            Self::Unit => write!(f, "Unit"),
        }
    }
}

/// Native-typed value produced by `parse` or handed to `build`
#[derive(Debug)]
pub enum NativeValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Text(String),
    /// Resolved pointer from an opaque handle argument
    Ptr(*mut c_void),
    /// Handle produced by native code as a result
    Handle(Arc<OpaqueHandle>),
    /// Negotiated view; releasing it (or dropping it) unpins the source
    View(ArrayView),
}

impl NativeValue {
    /// Kind name for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::U8(_) => "u8",
            Self::U16(_) => "u16",
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Bool(_) => "bool",
            Self::Bytes(_) => "bytes",
            Self::Text(_) => "text",
            Self::Ptr(_) => "pointer",
            Self::Handle(_) => "handle",
            Self::View(_) => "array view",
        }
    }

    /// Widen any integer variant to i64, when it fits
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I8(v) => Some(i64::from(*v)),
            Self::I16(v) => Some(i64::from(*v)),
            Self::I32(v) => Some(i64::from(*v)),
            Self::I64(v) => Some(*v),
            Self::U8(v) => Some(i64::from(*v)),
            Self::U16(v) => Some(i64::from(*v)),
            Self::U32(v) => Some(i64::from(*v)),
            Self::U64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Widen a float variant to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F32(v) => Some(f64::from(*v)),
            Self::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrow a negotiated view
    pub fn as_view(&self) -> Option<&ArrayView> {
        match self {
            Self::View(v) => Some(v),
            _ => None,
        }
    }
}
