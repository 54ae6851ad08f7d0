//! Vesper Bridge - native interop layer for the Vesper managed runtime
//!
//! This crate sits on the boundary between the garbage-collected Vesper
//! runtime and natively compiled extension modules. It provides:
//!
//! - `marshal` - argument/result conversion with fixed per-position contracts
//! - `handle` - opaque references to native resources
//! - `view` - zero-copy negotiated views of contiguous array storage
//! - `capability` - versioned function tables shared between independently
//!   compiled bridge modules without static linkage
//! - `lock` - the reentrant global execution lock every boundary crossing
//!   must observe
//!
//! Once control crosses into native code the runtime's own safety net is
//! gone; the invariants here (no use-after-free, no type confusion, no
//! buffer overrun) are what stands in for it.

pub mod capability;
pub mod error;
pub mod ffi;
pub mod handle;
pub mod lock;
pub mod logging;
pub mod marshal;
pub mod module;
pub mod view;

// Re-export core types
pub use capability::{CapabilityFn, CapabilityRegistry, CapabilityTable};
pub use error::{BridgeError, ErrorKind};
pub use handle::{HandleRegistry, OpaqueHandle};
pub use lock::{ExecutionLock, LockToken};
pub use marshal::{NativeFunctionBinding, NativeValue, ParamKind, Signature, Value};
pub use module::BridgeModule;
pub use view::{ArrayView, Format, MemorySource, OwnedSource};
